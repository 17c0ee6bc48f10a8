use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{info, warn};

use crate::core::precision::prices_match;
use crate::error::GatewayError;
use crate::gateway::{with_timeout, OrderGateway};
use crate::models::{
    CommandKind, ManagementCommand, OrderRequest, PendingOrder, PnlFilter, Position,
    Ticket,
};

#[derive(Debug, Clone)]
pub struct RungFailure {
    /// 1-based position in the batch.
    pub rung: usize,
    pub order: OrderRequest,
    pub error: GatewayError,
}

/// Outcome of placing one signal's orders. Every rung is attempted.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub placed: Vec<(usize, Ticket)>,
    pub failed: Vec<RungFailure>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.placed.len() + self.failed.len()
    }

    pub fn summary(&self, orders: &[OrderRequest]) -> String {
        let head = match orders.first() {
            Some(o) => format!(
                "Placed {}/{} {} {} order(s) on {}, lot {}, SL {}.",
                self.placed.len(),
                self.total(),
                o.direction,
                o.order_type,
                o.symbol,
                o.volume,
                o.stop_loss.map(|s| s.to_string()).unwrap_or_else(|| "-".into())
            ),
            None => "No orders to place.".to_string(),
        };
        let mut lines = vec![head];
        for f in &self.failed {
            let at = f.order.price.map(|p| format!(" @ {}", p)).unwrap_or_default();
            lines.push(format!("Rung {}{} failed: {}", f.rung, at, f.error));
        }
        lines.join("\n")
    }
}

/// Place `orders` one by one; a failed rung never stops the rest.
pub async fn place_batch(
    gateway: &dyn OrderGateway,
    orders: &[OrderRequest],
    timeout: Duration,
) -> BatchReport {
    let mut report = BatchReport::default();
    for (idx, order) in orders.iter().enumerate() {
        let rung = idx + 1;
        match with_timeout("place", timeout, gateway.place(order)).await {
            Ok(ticket) => {
                info!("Rung {} placed #{}: {}", rung, ticket, order.describe());
                report.placed.push((rung, ticket));
            }
            Err(e) => {
                warn!("Rung {} failed: {} ({})", rung, order.describe(), e);
                report.failed.push(RungFailure {
                    rung,
                    order: order.clone(),
                    error: e,
                });
            }
        }
    }
    report
}

#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub kind: CommandKind,
    pub affected: usize,
    /// Orders that matched but were left alone (e.g. break-even not yet safe).
    pub skipped: usize,
    pub failures: Vec<(Ticket, GatewayError)>,
    pub message: String,
}

/// Applies management commands to the broker book.
pub struct CommandExecutor<'a> {
    gateway: &'a dyn OrderGateway,
    /// `None` acts on every order regardless of owner.
    magic: Option<u64>,
    tolerance: Decimal,
    timeout: Duration,
}

#[derive(Default)]
struct Tally {
    affected: usize,
    skipped: usize,
    failures: Vec<(Ticket, GatewayError)>,
}

impl Tally {
    fn record(&mut self, ticket: Ticket, result: Result<(), GatewayError>) {
        match result {
            Ok(()) => self.affected += 1,
            Err(e) => {
                warn!("#{}: {}", ticket, e);
                self.failures.push((ticket, e));
            }
        }
    }
}

fn symbol_matches(target: Option<&str>, symbol: &str) -> bool {
    target.map_or(true, |t| t.eq_ignore_ascii_case(symbol))
}

impl<'a> CommandExecutor<'a> {
    pub fn new(
        gateway: &'a dyn OrderGateway,
        magic: Option<u64>,
        tolerance: Decimal,
        timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            magic,
            tolerance,
            timeout,
        }
    }

    /// Run `cmd` against the book. `target` is the resolved broker symbol,
    /// `None` for commands addressed to all symbols.
    pub async fn execute(&self, cmd: &ManagementCommand, target: Option<&str>) -> CommandOutcome {
        let scope = target
            .map(|t| format!("for {}", t))
            .unwrap_or_else(|| "(all symbols)".to_string());

        let result = match cmd.kind {
            CommandKind::Cancel => self.cancel(cmd, target).await.map(|t| {
                let msg = format!("Cancelled {} pending order(s) {}.", t.affected, scope);
                (t, msg)
            }),
            CommandKind::Close => self.close(cmd, target).await.map(|t| {
                let what = match cmd.filters.pnl {
                    PnlFilter::Any => "open",
                    PnlFilter::Profit => "profitable",
                    PnlFilter::Loss => "losing",
                };
                let msg = format!("Closed {} {} position(s) {}.", t.affected, what, scope);
                (t, msg)
            }),
            CommandKind::Kill => self.kill(cmd, target).await,
            CommandKind::BreakEven => self.break_even(cmd, target).await.map(|t| {
                let msg = format!(
                    "Break-even set on {} position(s) {}, {} left unchanged.",
                    t.affected, scope, t.skipped
                );
                (t, msg)
            }),
            CommandKind::SlMove => self.sl_move(cmd, target).await.map(|t| {
                let msg = format!(
                    "SL moved {} -> {} on {} position(s) {}.",
                    price_or_dash(cmd.params.from_price),
                    price_or_dash(cmd.params.to_price),
                    t.affected,
                    scope
                );
                (t, msg)
            }),
            CommandKind::ChangePrice => self.change_price(cmd, target).await.map(|t| {
                let msg = format!(
                    "Moved {} pending order(s) {} -> {} {}.",
                    t.affected,
                    price_or_dash(cmd.params.from_price),
                    price_or_dash(cmd.params.to_price),
                    scope
                );
                (t, msg)
            }),
        };

        match result {
            Ok((tally, mut message)) => {
                if !tally.failures.is_empty() {
                    message.push_str(&format!(" {} failed.", tally.failures.len()));
                }
                info!("{} {}", cmd.kind, message);
                CommandOutcome {
                    kind: cmd.kind,
                    affected: tally.affected,
                    skipped: tally.skipped,
                    failures: tally.failures,
                    message,
                }
            }
            Err(e) => {
                warn!("{} failed: {}", cmd.kind, e);
                CommandOutcome {
                    kind: cmd.kind,
                    affected: 0,
                    skipped: 0,
                    failures: Vec::new(),
                    message: format!("{} failed: {}", title(cmd.kind), e),
                }
            }
        }
    }

    async fn positions(&self, cmd: &ManagementCommand, target: Option<&str>) -> Result<Vec<Position>, GatewayError> {
        let all = with_timeout("list_positions", self.timeout, self.gateway.list_positions(self.magic)).await?;
        let f = &cmd.filters;
        Ok(all
            .into_iter()
            .filter(|p| symbol_matches(target, &p.symbol))
            .filter(|p| f.direction.map_or(true, |d| d == p.direction))
            .filter(|p| f.pnl.accepts(p.profit))
            .collect())
    }

    async fn pending(&self, cmd: &ManagementCommand, target: Option<&str>) -> Result<Vec<PendingOrder>, GatewayError> {
        let all = with_timeout("list_pending", self.timeout, self.gateway.list_pending(self.magic)).await?;
        let f = &cmd.filters;
        Ok(all
            .into_iter()
            .filter(|o| symbol_matches(target, &o.request.symbol))
            .filter(|o| f.direction.map_or(true, |d| d == o.request.direction))
            .filter(|o| f.order_type.map_or(true, |t| t == o.request.order_type))
            .collect())
    }

    async fn cancel(&self, cmd: &ManagementCommand, target: Option<&str>) -> Result<Tally, GatewayError> {
        let mut tally = Tally::default();
        for order in self.pending(cmd, target).await? {
            if let Some(at) = cmd.params.price {
                if !order.price().is_some_and(|p| prices_match(p, at, self.tolerance)) {
                    continue;
                }
            }
            let r = with_timeout("cancel", self.timeout, self.gateway.cancel(order.ticket)).await;
            tally.record(order.ticket, r);
        }
        Ok(tally)
    }

    async fn close(&self, cmd: &ManagementCommand, target: Option<&str>) -> Result<Tally, GatewayError> {
        let mut tally = Tally::default();
        for pos in self.positions(cmd, target).await? {
            let r = with_timeout("close", self.timeout, self.gateway.close(pos.ticket)).await;
            tally.record(pos.ticket, r);
        }
        Ok(tally)
    }

    /// Close and cancel everything matching; the reply counts both.
    /// Each half runs even when the other could not list its orders.
    async fn kill(&self, cmd: &ManagementCommand, target: Option<&str>) -> Result<(Tally, String), GatewayError> {
        let closed = self.close(cmd, target).await;
        let cancelled = self.cancel(cmd, target).await;

        let (closed, cancelled) = match (closed, cancelled) {
            (Err(e), Err(_)) => return Err(e),
            halves => halves,
        };
        let mut message = format!(
            "Kill {}: closed {} positions, cancelled {} pending.",
            target.unwrap_or("all"),
            closed.as_ref().map_or(0, |t| t.affected),
            cancelled.as_ref().map_or(0, |t| t.affected)
        );
        if let Err(e) = &closed {
            warn!("Kill could not list positions: {}", e);
            message.push_str(&format!(" Listing positions failed: {}.", e));
        }
        if let Err(e) = &cancelled {
            warn!("Kill could not list pending orders: {}", e);
            message.push_str(&format!(" Listing pending failed: {}.", e));
        }

        let mut tally = closed.unwrap_or_default();
        if let Ok(cancelled) = cancelled {
            tally.affected += cancelled.affected;
            tally.failures.extend(cancelled.failures);
        }
        Ok((tally, message))
    }

    async fn break_even(&self, cmd: &ManagementCommand, target: Option<&str>) -> Result<Tally, GatewayError> {
        let mut tally = Tally::default();
        for pos in self.positions(cmd, target).await? {
            let quote = match with_timeout("quote", self.timeout, self.gateway.quote(&pos.symbol)).await {
                Ok(q) => q,
                Err(e) => {
                    tally.failures.push((pos.ticket, e));
                    continue;
                }
            };
            let price = quote.exit_price(pos.direction);
            let entry = pos.entry_price;
            if !pos.direction.is_better_stop(entry, pos.current_sl)
                || !pos.direction.is_safe_stop(entry, price)
            {
                tally.skipped += 1;
                continue;
            }
            let r = with_timeout("modify_sl", self.timeout, self.gateway.modify_sl(pos.ticket, entry)).await;
            tally.record(pos.ticket, r);
        }
        Ok(tally)
    }

    async fn sl_move(&self, cmd: &ManagementCommand, target: Option<&str>) -> Result<Tally, GatewayError> {
        let (Some(from), Some(to)) = (cmd.params.from_price, cmd.params.to_price) else {
            return Ok(Tally::default());
        };
        let mut tally = Tally::default();
        for pos in self.positions(cmd, target).await? {
            if !pos.current_sl.is_some_and(|sl| prices_match(sl, from, self.tolerance)) {
                continue;
            }
            let r = with_timeout("modify_sl", self.timeout, self.gateway.modify_sl(pos.ticket, to)).await;
            tally.record(pos.ticket, r);
        }
        Ok(tally)
    }

    async fn change_price(&self, cmd: &ManagementCommand, target: Option<&str>) -> Result<Tally, GatewayError> {
        let (Some(from), Some(to)) = (cmd.params.from_price, cmd.params.to_price) else {
            return Ok(Tally::default());
        };
        let mut tally = Tally::default();
        for order in self.pending(cmd, target).await? {
            if !order.price().is_some_and(|p| prices_match(p, from, self.tolerance)) {
                continue;
            }
            let r = with_timeout("modify_price", self.timeout, self.gateway.modify_price(order.ticket, to)).await;
            tally.record(order.ticket, r);
        }
        Ok(tally)
    }
}

fn price_or_dash(p: Option<Decimal>) -> String {
    p.map(|p| p.to_string()).unwrap_or_else(|| "-".into())
}

fn title(kind: CommandKind) -> &'static str {
    match kind {
        CommandKind::Cancel => "Cancel",
        CommandKind::Close => "Close",
        CommandKind::Kill => "Kill",
        CommandKind::BreakEven => "Break-even",
        CommandKind::SlMove => "SL move",
        CommandKind::ChangePrice => "Change price",
    }
}
