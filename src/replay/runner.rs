use anyhow::Result;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::gateway::paper::{CloseReason, PaperEvent};
use crate::gateway::source::InboundMessage;
use crate::gateway::{OrderGateway, PaperGateway};
use crate::models::SymbolConstraints;
use crate::trading::{Desk, Outcome};

use super::report::{ReplayReport, TranscriptEntry};
use super::script::{parse_script, ReplayStep};

/// Feeds a script of messages and quotes through a volatile desk backed by
/// the paper gateway, ticking the trailing engine after every quote.
pub struct ReplayRunner {
    pub gateway: Arc<PaperGateway>,
    desk: Desk,
    chat_id: i64,
    report: ReplayReport,
}

impl ReplayRunner {
    /// Runner with the configured default instrument registered.
    pub async fn new(config: Config) -> Self {
        let gateway = Arc::new(PaperGateway::new());
        gateway
            .add_instrument(&config.default_instrument(), config.paper_constraints)
            .await;
        let chat_id = config.chat_id.unwrap_or_default();
        Self {
            desk: Desk::volatile(config, gateway.clone()),
            gateway,
            chat_id,
            report: ReplayReport::default(),
        }
    }

    pub async fn add_instrument(&self, symbol: &str, constraints: SymbolConstraints) {
        self.gateway.add_instrument(symbol, constraints).await;
    }

    pub fn desk(&self) -> &Desk {
        &self.desk
    }

    pub async fn run_script(&mut self, text: &str) -> Result<ReplayReport> {
        let steps = parse_script(text)?;
        self.run(steps).await
    }

    /// Run every step, then snapshot the book into the report.
    pub async fn run(&mut self, steps: Vec<ReplayStep>) -> Result<ReplayReport> {
        info!("=== REPLAY START === {} step(s)", steps.len());

        for step in steps {
            match step {
                ReplayStep::Message(text) => self.message(text).await,
                ReplayStep::Quote { symbol, bid, ask } => self.quote(&symbol, bid, ask).await,
            }
        }

        self.finish().await
    }

    async fn message(&mut self, text: String) {
        self.report.messages += 1;
        let reply = self
            .desk
            .handle(&InboundMessage::new(self.chat_id, text.clone()))
            .await;

        match &reply.outcome {
            Outcome::Ignored => self.report.ignored += 1,
            Outcome::Directive => self.report.directives += 1,
            Outcome::Command(_) => self.report.commands += 1,
            Outcome::Signal { placed, failed, .. } => {
                self.report.signals += 1;
                self.report.orders_placed += placed;
                self.report.orders_failed += failed;
            }
            Outcome::Rejected => self.report.rejected += 1,
        }

        self.report.transcript.push(TranscriptEntry {
            message: text,
            reply: reply.text,
        });
    }

    async fn quote(&mut self, symbol: &str, bid: Decimal, ask: Decimal) {
        self.report.quotes += 1;
        for event in self.gateway.set_quote(symbol, bid, ask).await {
            debug!("Replay event: {:?}", event);
            match event {
                PaperEvent::Filled { .. } => self.report.fills += 1,
                PaperEvent::Closed { reason: CloseReason::StopLoss, .. } => {
                    self.report.stopped_out += 1
                }
                PaperEvent::Closed { reason: CloseReason::TakeProfit, .. } => {
                    self.report.took_profit += 1
                }
                PaperEvent::Closed { .. } => {}
            }
        }

        let tick = self.desk.tick().await;
        self.report.sl_updates += tick.updates.len();
        self.report.trailing_failures += tick.failures.len();
        if tick.listing_error.is_some() {
            self.report.trailing_failures += 1;
        }
    }

    async fn finish(&mut self) -> Result<ReplayReport> {
        let positions = self.gateway.list_positions(None).await?;
        let pending = self.gateway.list_pending(None).await?;
        let history = self.gateway.history().await;

        let mut report = std::mem::take(&mut self.report);
        report.open_positions = positions.len();
        report.pending_orders = pending.len();
        report.unrealized_pnl = positions.iter().map(|p| p.profit).sum();
        report.closed_trades = history.len();
        report.realized_pnl = history.iter().map(|t| t.pnl).sum();
        report.ladders = self.desk.ladders().len();

        info!(
            "=== REPLAY DONE === {} message(s), {} order(s) placed, {} SL update(s)",
            report.messages, report.orders_placed, report.sl_updates
        );
        Ok(report)
    }
}
