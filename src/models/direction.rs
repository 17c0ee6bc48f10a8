use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Direction::Buy),
            "SELL" => Ok(Direction::Sell),
            other => Err(format!("unknown direction '{}'", other)),
        }
    }
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "BUY",
            Direction::Sell => "SELL",
        }
    }

    /// True when `candidate` is a strictly better stop than `current`:
    /// higher for buys, lower for sells. An unset stop is always beaten.
    pub fn is_better_stop(self, candidate: Decimal, current: Option<Decimal>) -> bool {
        match current {
            None => true,
            Some(cur) => match self {
                Direction::Buy => candidate > cur,
                Direction::Sell => candidate < cur,
            },
        }
    }

    /// True when a stop at `stop` would not trigger immediately at `price`.
    pub fn is_safe_stop(self, stop: Decimal, price: Decimal) -> bool {
        match self {
            Direction::Buy => stop < price,
            Direction::Sell => stop > price,
        }
    }

    /// True when `price` has reached `level` in the profitable direction.
    pub fn has_reached(self, price: Decimal, level: Decimal) -> bool {
        match self {
            Direction::Buy => price >= level,
            Direction::Sell => price <= level,
        }
    }

    /// Sort take-profit levels in the order they are reached.
    pub fn sort_levels(self, levels: &mut Vec<Decimal>) {
        levels.sort();
        levels.dedup();
        if self == Direction::Sell {
            levels.reverse();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Limit,
    Stop,
    Market,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Limit => write!(f, "LIMIT"),
            OrderType::Stop => write!(f, "STOP"),
            OrderType::Market => write!(f, "MARKET"),
        }
    }
}

impl OrderType {
    pub fn is_pending(&self) -> bool {
        !matches!(self, OrderType::Market)
    }
}
