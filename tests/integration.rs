mod common;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use signal_ladder_bot::error::GatewayError;
use signal_ladder_bot::gateway::paper::CloseReason;
use signal_ladder_bot::gateway::{InstrumentMetadata, OrderGateway, PaperGateway};
use signal_ladder_bot::models::{
    CommandKind, Direction, OrderRequest, OrderType, PendingOrder, Position, Quote, SignalKind,
    SymbolConstraints, Ticket,
};
use signal_ladder_bot::replay::ReplayRunner;
use signal_ladder_bot::trading::{Desk, Outcome};

use common::*;

/// Paper book whose position listing can be made to fail a set number of times.
struct FlakyGateway {
    inner: PaperGateway,
    failing_lists: AtomicUsize,
}

impl FlakyGateway {
    async fn new() -> Self {
        let inner = PaperGateway::new();
        inner.add_instrument("XAUUSD", gold()).await;
        Self {
            inner,
            failing_lists: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl OrderGateway for FlakyGateway {
    async fn place(&self, order: &OrderRequest) -> Result<Ticket, GatewayError> {
        self.inner.place(order).await
    }

    async fn modify_sl(&self, ticket: Ticket, new_sl: Decimal) -> Result<(), GatewayError> {
        self.inner.modify_sl(ticket, new_sl).await
    }

    async fn modify_price(&self, ticket: Ticket, new_price: Decimal) -> Result<(), GatewayError> {
        self.inner.modify_price(ticket, new_price).await
    }

    async fn list_positions(&self, magic: Option<u64>) -> Result<Vec<Position>, GatewayError> {
        let left = self.failing_lists.load(Ordering::SeqCst);
        if left > 0 {
            self.failing_lists.store(left - 1, Ordering::SeqCst);
            return Err(GatewayError::Connectivity("terminal disconnected".into()));
        }
        self.inner.list_positions(magic).await
    }

    async fn list_pending(&self, magic: Option<u64>) -> Result<Vec<PendingOrder>, GatewayError> {
        self.inner.list_pending(magic).await
    }

    async fn cancel(&self, ticket: Ticket) -> Result<(), GatewayError> {
        self.inner.cancel(ticket).await
    }

    async fn close(&self, ticket: Ticket) -> Result<(), GatewayError> {
        self.inner.close(ticket).await
    }

    async fn quote(&self, symbol: &str) -> Result<Quote, GatewayError> {
        self.inner.quote(symbol).await
    }
}

#[async_trait]
impl InstrumentMetadata for FlakyGateway {
    async fn constraints(&self, symbol: &str) -> Option<SymbolConstraints> {
        self.inner.constraints(symbol).await
    }
}

async fn sl_of(gw: &dyn OrderGateway) -> Vec<Option<Decimal>> {
    gw.list_positions(None)
        .await
        .unwrap()
        .iter()
        .map(|p| p.current_sl)
        .collect()
}

#[tokio::test]
async fn zone_ladder_fills_then_manual_close() {
    let gw = paper().await;
    let mut desk = Desk::volatile(config("zone_close"), gw.clone());
    gw.set_quote("XAUUSD", d("3465.00"), d("3465.20")).await;

    desk.handle(&msg("autoplace on")).await;
    let reply = desk.handle(&msg(ZONE_BUY)).await;
    assert_eq!(
        reply.outcome,
        Outcome::Signal { kind: SignalKind::Zone, placed: 5, failed: 0 }
    );

    let pending = gw.list_pending(Some(MAGIC)).await.unwrap();
    let mut prices: Vec<Decimal> = pending.iter().filter_map(|o| o.price()).collect();
    prices.sort();
    assert_eq!(prices, vec![d("3459"), d("3460"), d("3461"), d("3462"), d("3463")]);
    for o in &pending {
        assert_eq!(o.request.order_type, OrderType::Limit);
        assert_eq!(o.request.stop_loss, Some(d("3453")));
        assert_eq!(o.request.take_profit, Some(d("3467")));
        assert_eq!(o.request.comment, "LadderBot-BUY");
    }

    // Ask 3461.00 reaches the top three rungs.
    let events = gw.set_quote("XAUUSD", d("3460.80"), d("3461.00")).await;
    assert_eq!(events.len(), 3);
    assert!(desk.tick().await.updates.is_empty());

    let reply = desk.handle(&msg("/cancel XAUUSD")).await;
    assert_eq!(reply.outcome, Outcome::Command(CommandKind::Cancel));
    assert!(gw.list_pending(None).await.unwrap().is_empty());
    // Open positions keep trailing after a cancel.
    assert!(desk.ladders().get("XAUUSD", Direction::Buy).is_some());

    let reply = desk.handle(&msg("close XAUUSD")).await;
    assert_eq!(reply.outcome, Outcome::Command(CommandKind::Close));
    assert!(gw.list_positions(None).await.unwrap().is_empty());
    let history = gw.history().await;
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|t| t.reason == CloseReason::Manual));
}

#[tokio::test]
async fn market_ladder_trails_stop_up_the_targets() {
    let gw = paper().await;
    let mut desk = Desk::volatile(config("market_trail"), gw.clone());
    gw.set_quote("XAUUSD", d("3462.00"), d("3462.20")).await;

    desk.handle(&msg("autoplace on")).await;
    let reply = desk.handle(&msg(MARKET_BUY)).await;
    assert_eq!(
        reply.outcome,
        Outcome::Signal { kind: SignalKind::Market, placed: 3, failed: 0 }
    );
    assert!(desk.tick().await.updates.is_empty());

    // TP1 closes the first position; the other two go to break-even.
    gw.set_quote("XAUUSD", d("3470.50"), d("3470.70")).await;
    let report = desk.tick().await;
    assert_eq!(report.updates.len(), 2);
    assert_eq!(sl_of(gw.as_ref()).await, vec![Some(d("3462.20")); 2]);

    // TP2 closes the second; the last one steps to TP1.
    gw.set_quote("XAUUSD", d("3475.50"), d("3475.70")).await;
    assert_eq!(desk.tick().await.updates.len(), 1);
    assert_eq!(sl_of(gw.as_ref()).await, vec![Some(d("3470"))]);
    assert!(desk.tick().await.updates.is_empty());

    // A pullback stops the runner out at TP1, still in profit.
    gw.set_quote("XAUUSD", d("3469.90"), d("3470.10")).await;
    let history = gw.history().await;
    let reasons: Vec<CloseReason> = history.iter().map(|t| t.reason).collect();
    assert_eq!(
        reasons,
        vec![CloseReason::TakeProfit, CloseReason::TakeProfit, CloseReason::StopLoss]
    );
    assert!(history.iter().all(|t| t.pnl > Decimal::ZERO));
}

#[tokio::test]
async fn ladders_and_prefs_survive_restart() {
    let cfg = config("restart");
    {
        let gw = paper().await;
        let mut desk = Desk::open(cfg.clone(), gw).unwrap();
        desk.handle(&msg("autoplace on")).await;
        desk.handle(&msg("lot 0.2")).await;
        desk.handle(&msg(ZONE_BUY)).await;
    }
    assert!(cfg.state_path("tp_ladders.json").exists());
    assert!(cfg.state_path("prefs.json").exists());

    let gw = paper().await;
    let mut desk = Desk::open(cfg.clone(), gw.clone()).unwrap();
    assert_eq!(
        desk.ladders().get("XAUUSD", Direction::Buy),
        Some(&[d("3467"), d("3470")][..])
    );
    assert!(desk.prefs().auto_place);
    assert_eq!(desk.prefs().fixed_lot, Some(d("0.2")));

    // A position opened before the restart keeps trailing from the restored ladder.
    gw.set_quote("XAUUSD", d("3462.00"), d("3462.20")).await;
    let order = OrderRequest {
        symbol: "XAUUSD".to_string(),
        direction: Direction::Buy,
        order_type: OrderType::Market,
        price: None,
        volume: d("0.20"),
        stop_loss: Some(d("3453")),
        take_profit: None,
        magic: MAGIC,
        comment: "LadderBot-BUY".to_string(),
    };
    gw.place(&order).await.unwrap();
    gw.set_quote("XAUUSD", d("3467.50"), d("3467.70")).await;
    let report = desk.tick().await;
    assert_eq!(report.updates.len(), 1);
    assert_eq!(sl_of(gw.as_ref()).await, vec![Some(d("3462.20"))]);

    let _ = std::fs::remove_dir_all(&cfg.state_dir);
}

#[tokio::test]
async fn failed_listing_is_retried_next_tick() {
    let gw = Arc::new(FlakyGateway::new().await);
    let mut desk = Desk::volatile(config("flaky"), gw.clone());
    gw.inner.set_quote("XAUUSD", d("3462.00"), d("3462.20")).await;
    desk.handle(&msg("autoplace on")).await;
    desk.handle(&msg(MARKET_BUY)).await;

    gw.failing_lists.store(1, Ordering::SeqCst);
    gw.inner.set_quote("XAUUSD", d("3470.50"), d("3470.70")).await;

    let first = desk.tick().await;
    assert!(!first.is_clean());
    assert!(matches!(first.listing_error, Some(GatewayError::Connectivity(_))));
    assert!(first.updates.is_empty());

    let second = desk.tick().await;
    assert!(second.is_clean());
    assert_eq!(second.updates.len(), 2);
}

#[tokio::test]
async fn stalled_position_does_not_hold_up_the_rest() {
    let gw = paper().await;
    let mut desk = Desk::volatile(config("stalled"), gw.clone());
    gw.set_quote("XAUUSD", d("3462.00"), d("3462.20")).await;
    desk.handle(&msg("autoplace on")).await;
    desk.handle(&msg(MARKET_BUY)).await;

    let tickets: Vec<Ticket> = gw
        .list_positions(None)
        .await
        .unwrap()
        .iter()
        .map(|p| p.ticket)
        .collect();
    assert_eq!(tickets.len(), 3);
    gw.stall_ticket(tickets[1]).await;

    gw.set_quote("XAUUSD", d("3470.50"), d("3470.70")).await;
    let report = desk.tick().await;
    assert_eq!(report.updates.len(), 1);
    assert_eq!(report.updates[0].ticket, tickets[2]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, tickets[1]);
    assert!(matches!(report.failures[0].1, GatewayError::Timeout { .. }));
    assert!(report.failures[0].1.is_transient());
}

#[tokio::test]
async fn rejected_rung_does_not_stop_the_batch() {
    let gw = paper().await;
    gw.reject_price(d("3461"), "off quotes").await;
    let mut desk = Desk::volatile(config("rejected_rung"), gw.clone());

    desk.handle(&msg("autoplace on")).await;
    let reply = desk.handle(&msg(ZONE_BUY)).await;
    assert_eq!(
        reply.outcome,
        Outcome::Signal { kind: SignalKind::Zone, placed: 4, failed: 1 }
    );
    let text = reply.text.unwrap();
    assert!(text.starts_with("Placed 4/5"));
    assert!(text.contains("Rung 3 @ 3461 failed"));
    assert_eq!(gw.list_pending(None).await.unwrap().len(), 4);
}

#[tokio::test]
async fn commands_can_be_limited_to_own_magic() {
    let gw = paper().await;
    let mut cfg = config("own_magic");
    cfg.commands_all_magics = false;
    let mut desk = Desk::volatile(cfg, gw.clone());
    gw.place(&foreign_limit(Direction::Buy, "3400", 1)).await.unwrap();

    desk.handle(&msg("autoplace on")).await;
    desk.handle(&msg(ZONE_BUY)).await;
    assert_eq!(gw.list_pending(None).await.unwrap().len(), 6);

    let reply = desk.handle(&msg("cancelall")).await;
    assert_eq!(reply.outcome, Outcome::Command(CommandKind::Cancel));
    assert!(reply.text.unwrap().contains("Cancelled 5 pending"));
    let left = gw.list_pending(None).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].request.magic, 1);
}

#[tokio::test]
async fn change_price_moves_a_pending_rung() {
    let gw = paper().await;
    let mut desk = Desk::volatile(config("change_price"), gw.clone());
    desk.handle(&msg("autoplace on")).await;
    desk.handle(&msg(ZONE_BUY)).await;

    let reply = desk.handle(&msg("/ch buylimit 3459 to 3455 XAUUSD")).await;
    assert_eq!(reply.outcome, Outcome::Command(CommandKind::ChangePrice));
    let prices: Vec<Decimal> = gw
        .list_pending(None)
        .await
        .unwrap()
        .iter()
        .filter_map(|o| o.price())
        .collect();
    assert!(prices.contains(&d("3455")));
    assert!(!prices.contains(&d("3459")));
}

#[tokio::test]
async fn replay_script_with_kill() {
    let mut runner = ReplayRunner::new(config("replay_kill")).await;
    let script = format!(
        "autoplace on\n\n{}\n\n@quote XAUUSD 3460.80 3461.00\n\nkill XAUUSD\n\nhello there\n",
        ZONE_BUY
    );
    let report = runner.run_script(&script).await.unwrap();

    assert_eq!(report.messages, 4);
    assert_eq!(report.signals, 1);
    assert_eq!(report.commands, 1);
    assert_eq!(report.ignored, 1);
    assert_eq!(report.orders_placed, 5);
    assert_eq!(report.fills, 3);
    assert_eq!(report.open_positions, 0);
    assert_eq!(report.pending_orders, 0);
    assert_eq!(report.ladders, 0);
    assert_eq!(report.closed_trades, 3);
    assert!(report.realized_pnl < Decimal::ZERO);

    let kill = report.transcript[2].reply.as_deref().unwrap();
    assert_eq!(kill, "Kill XAUUSD: closed 3 positions, cancelled 2 pending.");
    assert!(report.transcript_text().contains("> kill XAUUSD"));
}
