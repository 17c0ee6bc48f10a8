use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
    Zone,
    Repeat,
    MultiEntry,
    Market,
    StopLadder,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::Zone => write!(f, "ZONE"),
            SignalKind::Repeat => write!(f, "REPEAT"),
            SignalKind::MultiEntry => write!(f, "MULTI_ENTRY"),
            SignalKind::Market => write!(f, "MARKET"),
            SignalKind::StopLadder => write!(f, "STOP_LADDER"),
        }
    }
}

/// A take-profit target. `Open` leaves the TP unset on the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TakeProfit {
    Price(Decimal),
    Open,
}

impl TakeProfit {
    pub fn price(&self) -> Option<Decimal> {
        match self {
            TakeProfit::Price(p) => Some(*p),
            TakeProfit::Open => None,
        }
    }
}

impl fmt::Display for TakeProfit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TakeProfit::Price(p) => write!(f, "{}", p),
            TakeProfit::Open => write!(f, "open"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Absent for market entries.
    pub price: Option<Decimal>,
    pub tp: Option<TakeProfit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneBounds {
    pub low: Decimal,
    pub high: Decimal,
}

impl ZoneBounds {
    /// Bounds are order-independent: `3463/3459` and `3459/3463` are the same zone.
    pub fn new(a: Decimal, b: Decimal) -> Self {
        Self {
            low: a.min(b),
            high: a.max(b),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub direction: Direction,
    pub kind: SignalKind,
    pub lot_size: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub entries: Vec<Entry>,
    pub zone: Option<ZoneBounds>,
    /// Numeric levels ordered as they are reached (ascending for buys,
    /// descending for sells), followed by a single `Open` when one was given.
    pub tp_ladder: Vec<TakeProfit>,
    pub original_text: String,
}

impl Signal {
    pub fn numeric_tps(&self) -> Vec<Decimal> {
        self.tp_ladder.iter().filter_map(TakeProfit::price).collect()
    }

    pub fn first_numeric_tp(&self) -> Option<Decimal> {
        self.tp_ladder.iter().find_map(TakeProfit::price)
    }

    pub fn summary(&self) -> String {
        let tps: Vec<String> = self.tp_ladder.iter().map(|t| t.to_string()).collect();
        let zone = self
            .zone
            .map(|z| format!(" zone {}/{}", z.low, z.high))
            .unwrap_or_default();
        format!(
            "{} {} {}{} entries {} lot {} SL {} TPs [{}]",
            self.kind,
            self.direction,
            self.symbol,
            zone,
            self.entries.len(),
            self.lot_size.map(|l| l.to_string()).unwrap_or_else(|| "-".into()),
            self.stop_loss.map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
            tps.join(", ")
        )
    }
}

/// Build the canonical TP ladder from raw targets in signal order.
pub fn canonical_ladder(direction: Direction, targets: &[TakeProfit]) -> Vec<TakeProfit> {
    let mut numeric: Vec<Decimal> = targets.iter().filter_map(TakeProfit::price).collect();
    direction.sort_levels(&mut numeric);
    let mut ladder: Vec<TakeProfit> = numeric.into_iter().map(TakeProfit::Price).collect();
    if targets.iter().any(|t| *t == TakeProfit::Open) {
        ladder.push(TakeProfit::Open);
    }
    ladder
}
