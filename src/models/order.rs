use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Direction, OrderType};

pub type Ticket = u64;

/// Instrument trading constraints, as reported by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolConstraints {
    pub tick_size: Decimal,
    pub volume_step: Decimal,
    pub volume_min: Decimal,
    pub volume_max: Decimal,
}

/// A symbol resolved to a tradable broker instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrument {
    pub name: String,
    pub constraints: SymbolConstraints,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub direction: Direction,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub volume: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub magic: u64,
    pub comment: String,
}

impl OrderRequest {
    pub fn describe(&self) -> String {
        let price = self
            .price
            .map(|p| format!(" @ {}", p))
            .unwrap_or_default();
        format!(
            "{} {} {}{} vol {} SL {} TP {}",
            self.direction,
            self.order_type,
            self.symbol,
            price,
            self.volume,
            self.stop_loss.map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
            self.take_profit.map(|t| t.to_string()).unwrap_or_else(|| "-".into()),
        )
    }
}

/// A resting LIMIT/STOP order as listed by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub ticket: Ticket,
    pub request: OrderRequest,
}

impl PendingOrder {
    pub fn price(&self) -> Option<Decimal> {
        self.request.price
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub ticket: Ticket,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub current_sl: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub volume: Decimal,
    /// Unrealized P/L in account currency.
    pub profit: Decimal,
    pub magic: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub bid: Decimal,
    pub ask: Decimal,
}

impl Quote {
    /// The price a position of `direction` would close at.
    pub fn exit_price(&self, direction: Direction) -> Decimal {
        match direction {
            Direction::Buy => self.bid,
            Direction::Sell => self.ask,
        }
    }

    /// The price a new order of `direction` would fill at.
    pub fn entry_price(&self, direction: Direction) -> Decimal {
        match direction {
            Direction::Buy => self.ask,
            Direction::Sell => self.bid,
        }
    }
}

/// Intent to move a position's stop-loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlUpdate {
    pub ticket: Ticket,
    pub new_sl: Decimal,
}
