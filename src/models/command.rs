use rust_decimal::Decimal;
use std::fmt;

use crate::models::{Direction, OrderType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Cancel,
    Close,
    Kill,
    BreakEven,
    SlMove,
    ChangePrice,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Cancel => write!(f, "CANCEL"),
            CommandKind::Close => write!(f, "CLOSE"),
            CommandKind::Kill => write!(f, "KILL"),
            CommandKind::BreakEven => write!(f, "BREAK_EVEN"),
            CommandKind::SlMove => write!(f, "SL_MOVE"),
            CommandKind::ChangePrice => write!(f, "CHANGE_PRICE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SymbolFilter {
    #[default]
    All,
    Symbol(String),
}

impl SymbolFilter {
    pub fn symbol(&self) -> Option<&str> {
        match self {
            SymbolFilter::All => None,
            SymbolFilter::Symbol(s) => Some(s),
        }
    }
}

impl fmt::Display for SymbolFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolFilter::All => write!(f, "all symbols"),
            SymbolFilter::Symbol(s) => write!(f, "{}", s),
        }
    }
}

/// Selects positions by the sign of their unrealized P/L.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PnlFilter {
    #[default]
    Any,
    Profit,
    Loss,
}

impl PnlFilter {
    pub fn accepts(&self, profit: Decimal) -> bool {
        match self {
            PnlFilter::Any => true,
            PnlFilter::Profit => profit > Decimal::ZERO,
            PnlFilter::Loss => profit < Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandFilters {
    pub symbol: SymbolFilter,
    pub direction: Option<Direction>,
    pub pnl: PnlFilter,
    /// Restricts pending-order commands to one order type.
    pub order_type: Option<OrderType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandParams {
    pub from_price: Option<Decimal>,
    pub to_price: Option<Decimal>,
    /// Exact pending price for `delete order`.
    pub price: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementCommand {
    pub kind: CommandKind,
    pub filters: CommandFilters,
    pub params: CommandParams,
}

impl ManagementCommand {
    pub fn new(kind: CommandKind, symbol: SymbolFilter) -> Self {
        Self {
            kind,
            filters: CommandFilters {
                symbol,
                ..Default::default()
            },
            params: CommandParams::default(),
        }
    }

    pub fn with_direction(mut self, direction: Option<Direction>) -> Self {
        self.filters.direction = direction;
        self
    }

    pub fn with_pnl(mut self, pnl: PnlFilter) -> Self {
        self.filters.pnl = pnl;
        self
    }
}
