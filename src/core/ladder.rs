use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

use crate::core::precision::{normalize_price, normalize_volume};
use crate::error::BuildError;
use crate::models::{
    Direction, Instrument, OrderRequest, OrderType, Signal, SignalKind, ZoneBounds,
};

/// How a resolved lot is spread across the rungs of one signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotPolicy {
    /// Every rung gets the full resolved lot.
    #[default]
    PerOrder,
    /// The resolved lot is divided equally between the rungs.
    EqualSplit,
}

impl FromStr for LotPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per_order" | "per-order" | "fixed" => Ok(LotPolicy::PerOrder),
            "equal_split" | "equal-split" | "split" => Ok(LotPolicy::EqualSplit),
            other => Err(format!("unknown lot policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LadderSettings {
    /// Price distance between zone rungs.
    pub step: Decimal,
    pub lot_policy: LotPolicy,
    pub max_zone_rungs: usize,
    pub fallback_lot: Decimal,
    pub magic: u64,
    pub comment_prefix: String,
}

/// Expands a signal into concrete order requests for one instrument.
pub struct LadderBuilder {
    settings: LadderSettings,
    dashboard_lot: Option<Decimal>,
}

impl LadderBuilder {
    pub fn new(settings: LadderSettings) -> Self {
        Self {
            settings,
            dashboard_lot: None,
        }
    }

    pub fn with_dashboard_lot(mut self, lot: Option<Decimal>) -> Self {
        self.dashboard_lot = lot;
        self
    }

    /// Signal lot, then dashboard lot, then configured fallback; first positive wins.
    pub fn resolve_lot(&self, signal_lot: Option<Decimal>) -> Option<Decimal> {
        [signal_lot, self.dashboard_lot, Some(self.settings.fallback_lot)]
            .into_iter()
            .flatten()
            .find(|lot| *lot > Decimal::ZERO)
    }

    fn step(&self) -> Decimal {
        if self.settings.step > Decimal::ZERO {
            self.settings.step
        } else {
            Decimal::ONE
        }
    }

    /// Number of rungs a zone expands to at the configured step.
    pub fn zone_rung_count(&self, zone: &ZoneBounds) -> usize {
        ((zone.high - zone.low) / self.step())
            .floor()
            .to_usize()
            .unwrap_or(usize::MAX)
            .saturating_add(1)
    }

    /// Rung prices: high down to low for buys, low up to high for sells.
    pub fn zone_prices(&self, zone: &ZoneBounds, direction: Direction) -> Vec<Decimal> {
        let step = self.step();
        let count = self.zone_rung_count(zone);
        (0..count)
            .map(|i| {
                let offset = step * Decimal::from(i);
                match direction {
                    Direction::Buy => zone.high - offset,
                    Direction::Sell => zone.low + offset,
                }
            })
            .collect()
    }

    pub fn build(
        &self,
        signal: &Signal,
        instrument: &Instrument,
    ) -> Result<Vec<OrderRequest>, BuildError> {
        let lot = self
            .resolve_lot(signal.lot_size)
            .ok_or(BuildError::NoPositiveLot)?;

        let legs: Vec<(Option<Decimal>, Option<Decimal>)> = match (signal.kind, signal.zone) {
            (SignalKind::Zone, Some(zone)) => {
                let count = self.zone_rung_count(&zone);
                if count > self.settings.max_zone_rungs {
                    return Err(BuildError::TooManyRungs {
                        count,
                        max: self.settings.max_zone_rungs,
                    });
                }
                let tp = signal.first_numeric_tp();
                self.zone_prices(&zone, signal.direction)
                    .into_iter()
                    .map(|price| (Some(price), tp))
                    .collect()
            }
            _ => signal
                .entries
                .iter()
                .map(|e| (e.price, e.tp.and_then(|t| t.price())))
                .collect(),
        };
        if legs.is_empty() {
            return Err(BuildError::EmptyLadder);
        }

        let per_rung = match self.settings.lot_policy {
            LotPolicy::PerOrder => lot,
            LotPolicy::EqualSplit => lot / Decimal::from(legs.len()),
        };

        let order_type = order_type_for(signal.kind);
        let c = &instrument.constraints;
        let tick = c.tick_size;
        let mut orders = Vec::with_capacity(legs.len());
        for (idx, (price, tp)) in legs.into_iter().enumerate() {
            let volume = normalize_volume(per_rung, c.volume_step, c.volume_min, c.volume_max)
                .ok_or(BuildError::InvalidVolume {
                    rung: idx + 1,
                    volume: per_rung,
                })?;
            orders.push(OrderRequest {
                symbol: instrument.name.clone(),
                direction: signal.direction,
                order_type,
                price: match order_type {
                    OrderType::Market => None,
                    _ => price.map(|p| normalize_price(p, tick)),
                },
                volume,
                stop_loss: signal.stop_loss.map(|s| normalize_price(s, tick)),
                take_profit: tp.map(|t| normalize_price(t, tick)),
                magic: self.settings.magic,
                comment: format!("{}-{}", self.settings.comment_prefix, signal.direction),
            });
        }

        debug!(
            "Built {} {} {} order(s) for {} (lot {} per rung)",
            orders.len(),
            signal.direction,
            order_type,
            instrument.name,
            per_rung
        );
        Ok(orders)
    }
}

fn order_type_for(kind: SignalKind) -> OrderType {
    match kind {
        SignalKind::Zone | SignalKind::Repeat | SignalKind::MultiEntry => OrderType::Limit,
        SignalKind::Market => OrderType::Market,
        SignalKind::StopLadder => OrderType::Stop,
    }
}
