use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::GatewayError;
use crate::gateway::{InstrumentMetadata, OrderGateway};
use crate::models::{
    Direction, OrderRequest, OrderType, PendingOrder, Position, Quote, SymbolConstraints, Ticket,
};

/// Broker-style rejection codes used by the paper book.
pub const REJECT_INVALID_SYMBOL: u32 = 10013;
pub const REJECT_INVALID_VOLUME: u32 = 10014;
pub const REJECT_INVALID_PRICE: u32 = 10015;
pub const REJECT_INVALID_STOPS: u32 = 10016;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    StopLoss,
    TakeProfit,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub ticket: Ticket,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub volume: Decimal,
    pub pnl: Decimal,
    pub reason: CloseReason,
}

/// Something the book did on its own in response to a quote.
#[derive(Debug, Clone, PartialEq)]
pub enum PaperEvent {
    Filled { ticket: Ticket, price: Decimal },
    Closed { ticket: Ticket, price: Decimal, reason: CloseReason },
}

#[derive(Default)]
struct PaperBook {
    next_ticket: Ticket,
    instruments: HashMap<String, SymbolConstraints>,
    quotes: HashMap<String, Quote>,
    pending: BTreeMap<Ticket, PendingOrder>,
    positions: BTreeMap<Ticket, Position>,
    history: Vec<ClosedTrade>,
    rejected_prices: HashMap<Decimal, String>,
    stalled: Vec<Ticket>,
    offline: bool,
}

impl PaperBook {
    fn ticket(&mut self) -> Ticket {
        self.next_ticket += 1;
        self.next_ticket
    }

    fn online(&self) -> Result<(), GatewayError> {
        if self.offline {
            Err(GatewayError::Connectivity("paper gateway offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn open_position(&mut self, ticket: Ticket, req: &OrderRequest, price: Decimal) {
        let position = Position {
            ticket,
            symbol: req.symbol.clone(),
            direction: req.direction,
            entry_price: price,
            current_sl: req.stop_loss,
            take_profit: req.take_profit,
            volume: req.volume,
            profit: Decimal::ZERO,
            magic: req.magic,
        };
        debug!(
            "Paper fill #{} {} {} {} @ {}",
            ticket, req.direction, req.volume, req.symbol, price
        );
        self.positions.insert(ticket, position);
    }

    fn close_position(&mut self, ticket: Ticket, exit: Decimal, reason: CloseReason) -> Option<ClosedTrade> {
        let pos = self.positions.remove(&ticket)?;
        let trade = ClosedTrade {
            ticket,
            symbol: pos.symbol,
            direction: pos.direction,
            entry_price: pos.entry_price,
            exit_price: exit,
            volume: pos.volume,
            pnl: pnl(pos.direction, pos.entry_price, exit, pos.volume),
            reason,
        };
        info!(
            "Paper close #{} {} {} @ {} ({:?}) P/L {}",
            ticket, trade.direction, trade.symbol, exit, reason, trade.pnl
        );
        self.history.push(trade.clone());
        Some(trade)
    }

    /// Fill crossed pending orders, then settle SL/TP hits for `symbol`.
    fn mark(&mut self, symbol: &str, quote: Quote) -> Vec<PaperEvent> {
        let mut events = Vec::new();

        let crossed: Vec<Ticket> = self
            .pending
            .values()
            .filter(|o| o.request.symbol == symbol && is_crossed(&o.request, quote))
            .map(|o| o.ticket)
            .collect();
        for ticket in crossed {
            if let Some(order) = self.pending.remove(&ticket) {
                let price = order.price().unwrap_or_else(|| quote.entry_price(order.request.direction));
                self.open_position(ticket, &order.request, price);
                events.push(PaperEvent::Filled { ticket, price });
            }
        }

        let mut exits = Vec::new();
        for pos in self.positions.values_mut().filter(|p| p.symbol == symbol) {
            let exit = quote.exit_price(pos.direction);
            pos.profit = pnl(pos.direction, pos.entry_price, exit, pos.volume);

            let stopped = pos.current_sl.filter(|sl| match pos.direction {
                Direction::Buy => exit <= *sl,
                Direction::Sell => exit >= *sl,
            });
            let target = pos
                .take_profit
                .filter(|tp| pos.direction.has_reached(exit, *tp));
            if let Some(sl) = stopped {
                exits.push((pos.ticket, sl, CloseReason::StopLoss));
            } else if let Some(tp) = target {
                exits.push((pos.ticket, tp, CloseReason::TakeProfit));
            }
        }
        for (ticket, price, reason) in exits {
            if self.close_position(ticket, price, reason).is_some() {
                events.push(PaperEvent::Closed { ticket, price, reason });
            }
        }

        events
    }
}

fn pnl(direction: Direction, entry: Decimal, exit: Decimal, volume: Decimal) -> Decimal {
    match direction {
        Direction::Buy => (exit - entry) * volume,
        Direction::Sell => (entry - exit) * volume,
    }
}

fn is_crossed(req: &OrderRequest, quote: Quote) -> bool {
    let Some(price) = req.price else {
        return true;
    };
    let fill = quote.entry_price(req.direction);
    match (req.order_type, req.direction) {
        (OrderType::Limit, Direction::Buy) => fill <= price,
        (OrderType::Limit, Direction::Sell) => fill >= price,
        (OrderType::Stop, Direction::Buy) => fill >= price,
        (OrderType::Stop, Direction::Sell) => fill <= price,
        (OrderType::Market, _) => true,
    }
}

fn on_step(value: Decimal, step: Decimal) -> bool {
    step.is_zero() || (value % step).is_zero()
}

/// In-memory broker: pending orders, positions and quotes for any number of
/// instruments, plus hooks to make individual calls fail.
#[derive(Default)]
pub struct PaperGateway {
    book: Mutex<PaperBook>,
}

impl PaperGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_instrument(&self, symbol: &str, constraints: SymbolConstraints) {
        self.book
            .lock()
            .await
            .instruments
            .insert(symbol.to_string(), constraints);
    }

    /// Publish a quote and let the book react to it.
    pub async fn set_quote(&self, symbol: &str, bid: Decimal, ask: Decimal) -> Vec<PaperEvent> {
        let quote = Quote { bid, ask };
        let mut book = self.book.lock().await;
        book.quotes.insert(symbol.to_string(), quote);
        book.mark(symbol, quote)
    }

    /// Reject every placement at `price` with `reason`.
    pub async fn reject_price(&self, price: Decimal, reason: &str) {
        self.book
            .lock()
            .await
            .rejected_prices
            .insert(price, reason.to_string());
    }

    /// Make SL modifications for `ticket` hang until the caller's deadline.
    pub async fn stall_ticket(&self, ticket: Ticket) {
        self.book.lock().await.stalled.push(ticket);
    }

    pub async fn set_offline(&self, offline: bool) {
        self.book.lock().await.offline = offline;
    }

    pub async fn history(&self) -> Vec<ClosedTrade> {
        self.book.lock().await.history.clone()
    }

    pub async fn position(&self, ticket: Ticket) -> Option<Position> {
        self.book.lock().await.positions.get(&ticket).cloned()
    }
}

#[async_trait]
impl OrderGateway for PaperGateway {
    async fn place(&self, order: &OrderRequest) -> Result<Ticket, GatewayError> {
        let mut book = self.book.lock().await;
        book.online()?;

        let Some(c) = book.instruments.get(&order.symbol).copied() else {
            return Err(GatewayError::rejected(
                REJECT_INVALID_SYMBOL,
                format!("unknown symbol {}", order.symbol),
            ));
        };
        if order.volume < c.volume_min
            || order.volume > c.volume_max
            || !on_step(order.volume, c.volume_step)
        {
            return Err(GatewayError::rejected(
                REJECT_INVALID_VOLUME,
                format!("invalid volume {}", order.volume),
            ));
        }
        if let Some(reason) = order.price.and_then(|p| book.rejected_prices.get(&p)) {
            return Err(GatewayError::rejected(REJECT_INVALID_PRICE, reason.clone()));
        }

        let ticket = book.ticket();
        match order.order_type {
            OrderType::Market => {
                let quote = book
                    .quotes
                    .get(&order.symbol)
                    .copied()
                    .ok_or_else(|| GatewayError::NoQuote(order.symbol.clone()))?;
                book.open_position(ticket, order, quote.entry_price(order.direction));
            }
            OrderType::Limit | OrderType::Stop => {
                if order.price.is_none() {
                    return Err(GatewayError::rejected(
                        REJECT_INVALID_PRICE,
                        "pending order without a price",
                    ));
                }
                book.pending.insert(
                    ticket,
                    PendingOrder {
                        ticket,
                        request: order.clone(),
                    },
                );
                if let Some(quote) = book.quotes.get(&order.symbol).copied() {
                    book.mark(&order.symbol, quote);
                }
            }
        }
        Ok(ticket)
    }

    async fn modify_sl(&self, ticket: Ticket, new_sl: Decimal) -> Result<(), GatewayError> {
        let stalled = {
            let book = self.book.lock().await;
            book.online()?;
            book.stalled.contains(&ticket)
        };
        if stalled {
            // Never answers; the caller's timeout ends the call.
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }

        let mut book = self.book.lock().await;
        let quote = book.quotes.clone();
        let pos = book
            .positions
            .get_mut(&ticket)
            .ok_or(GatewayError::UnknownTicket(ticket))?;
        if let Some(q) = quote.get(&pos.symbol) {
            if !pos.direction.is_safe_stop(new_sl, q.exit_price(pos.direction)) {
                return Err(GatewayError::rejected(
                    REJECT_INVALID_STOPS,
                    format!("SL {} is on the wrong side of the market", new_sl),
                ));
            }
        }
        pos.current_sl = Some(new_sl);
        Ok(())
    }

    async fn modify_price(&self, ticket: Ticket, new_price: Decimal) -> Result<(), GatewayError> {
        let mut book = self.book.lock().await;
        book.online()?;
        let order = book
            .pending
            .get_mut(&ticket)
            .ok_or(GatewayError::UnknownTicket(ticket))?;
        order.request.price = Some(new_price);
        let symbol = order.request.symbol.clone();
        if let Some(quote) = book.quotes.get(&symbol).copied() {
            book.mark(&symbol, quote);
        }
        Ok(())
    }

    async fn list_positions(&self, magic: Option<u64>) -> Result<Vec<Position>, GatewayError> {
        let book = self.book.lock().await;
        book.online()?;
        Ok(book
            .positions
            .values()
            .filter(|p| magic.map_or(true, |m| p.magic == m))
            .cloned()
            .collect())
    }

    async fn list_pending(&self, magic: Option<u64>) -> Result<Vec<PendingOrder>, GatewayError> {
        let book = self.book.lock().await;
        book.online()?;
        Ok(book
            .pending
            .values()
            .filter(|o| magic.map_or(true, |m| o.request.magic == m))
            .cloned()
            .collect())
    }

    async fn cancel(&self, ticket: Ticket) -> Result<(), GatewayError> {
        let mut book = self.book.lock().await;
        book.online()?;
        book.pending
            .remove(&ticket)
            .map(|_| ())
            .ok_or(GatewayError::UnknownTicket(ticket))
    }

    async fn close(&self, ticket: Ticket) -> Result<(), GatewayError> {
        let mut book = self.book.lock().await;
        book.online()?;
        let symbol = book
            .positions
            .get(&ticket)
            .map(|p| (p.symbol.clone(), p.direction))
            .ok_or(GatewayError::UnknownTicket(ticket))?;
        let quote = book
            .quotes
            .get(&symbol.0)
            .copied()
            .ok_or_else(|| GatewayError::NoQuote(symbol.0.clone()))?;
        book.close_position(ticket, quote.exit_price(symbol.1), CloseReason::Manual);
        Ok(())
    }

    async fn quote(&self, symbol: &str) -> Result<Quote, GatewayError> {
        let book = self.book.lock().await;
        book.online()?;
        book.quotes
            .get(symbol)
            .copied()
            .ok_or_else(|| GatewayError::NoQuote(symbol.to_string()))
    }
}

#[async_trait]
impl InstrumentMetadata for PaperGateway {
    async fn constraints(&self, symbol: &str) -> Option<SymbolConstraints> {
        self.book.lock().await.instruments.get(symbol).copied()
    }
}
