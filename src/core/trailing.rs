use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::core::tp_store::TpLadderStore;
use crate::error::GatewayError;
use crate::gateway::{with_timeout, OrderGateway};
use crate::models::{Position, Quote, SlUpdate, Ticket};

/// Stop-loss target for `position` at `price`, if the ladder calls for a move.
///
/// Reaching `ladder[0]` moves the stop to entry; reaching `ladder[i]` moves it
/// to `ladder[i-1]`. A target is only returned when it improves the current
/// stop and would not trigger at `price`.
pub fn evaluate(position: &Position, price: Decimal, ladder: &[Decimal]) -> Option<SlUpdate> {
    let direction = position.direction;
    let reached = ladder
        .iter()
        .rposition(|level| direction.has_reached(price, *level))?;
    let target = match reached {
        0 => position.entry_price,
        i => ladder[i - 1],
    };

    if !direction.is_better_stop(target, position.current_sl) {
        return None;
    }
    if !direction.is_safe_stop(target, price) {
        debug!(
            "#{}: SL {} would trigger at {}, holding",
            position.ticket, target, price
        );
        return None;
    }
    Some(SlUpdate {
        ticket: position.ticket,
        new_sl: target,
    })
}

#[derive(Debug, Default)]
pub struct TickReport {
    pub checked: usize,
    /// Positions without a stored ladder.
    pub skipped: usize,
    pub updates: Vec<SlUpdate>,
    pub failures: Vec<(Ticket, GatewayError)>,
    /// Set when the position listing itself failed.
    pub listing_error: Option<GatewayError>,
}

impl TickReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.listing_error.is_none()
    }
}

pub struct TrailingEngine {
    magic: u64,
    call_timeout: Duration,
}

impl TrailingEngine {
    pub fn new(magic: u64, call_timeout: Duration) -> Self {
        Self {
            magic,
            call_timeout,
        }
    }

    /// One reconciliation pass over this bot's live positions.
    /// A failing position is recorded and the pass moves on to the next one.
    pub async fn reconcile(&self, gateway: &dyn OrderGateway, store: &TpLadderStore) -> TickReport {
        let mut report = TickReport::default();

        let positions = match with_timeout(
            "list_positions",
            self.call_timeout,
            gateway.list_positions(Some(self.magic)),
        )
        .await
        {
            Ok(p) => p,
            Err(e) => {
                warn!("Trailing: could not list positions: {}", e);
                report.listing_error = Some(e);
                return report;
            }
        };

        let mut quotes: HashMap<String, Result<Quote, GatewayError>> = HashMap::new();
        for position in positions {
            report.checked += 1;
            let Some(ladder) = store.get(&position.symbol, position.direction) else {
                report.skipped += 1;
                continue;
            };

            if !quotes.contains_key(&position.symbol) {
                let q = with_timeout("quote", self.call_timeout, gateway.quote(&position.symbol)).await;
                quotes.insert(position.symbol.clone(), q);
            }
            let quote = match quotes.get(&position.symbol) {
                Some(Ok(q)) => *q,
                Some(Err(e)) => {
                    report.failures.push((position.ticket, e.clone()));
                    continue;
                }
                None => continue,
            };

            let price = quote.exit_price(position.direction);
            let Some(update) = evaluate(&position, price, ladder) else {
                continue;
            };

            match with_timeout(
                "modify_sl",
                self.call_timeout,
                gateway.modify_sl(update.ticket, update.new_sl),
            )
            .await
            {
                Ok(()) => {
                    info!(
                        "Trailing SL #{} {} {}: {} -> {} (price {})",
                        position.ticket,
                        position.direction,
                        position.symbol,
                        position
                            .current_sl
                            .map(|s| s.to_string())
                            .unwrap_or_else(|| "none".into()),
                        update.new_sl,
                        price
                    );
                    report.updates.push(update);
                }
                Err(e) => {
                    warn!("Trailing SL #{} failed, retrying next tick: {}", position.ticket, e);
                    report.failures.push((position.ticket, e));
                }
            }
        }

        report
    }
}
