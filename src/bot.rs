use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use signal_ladder_bot::config::Config;
use signal_ladder_bot::gateway::source::{InboundMessage, MessageSource};
use signal_ladder_bot::gateway::{OrderGateway, PaperGateway};
use signal_ladder_bot::replay::{parse_script, ReplayStep};
use signal_ladder_bot::trading::Desk;

pub struct LadderBot {
    desk: Desk,
    paper: Arc<PaperGateway>,
    source: Box<dyn MessageSource>,
    trail_interval: Duration,
}

impl LadderBot {
    pub fn new(
        cfg: &Config,
        desk: Desk,
        paper: Arc<PaperGateway>,
        source: Box<dyn MessageSource>,
    ) -> Self {
        info!("{}", "=".repeat(60));
        info!("Signal ladder bot starting up (PAPER)");
        info!("Symbol: {}", cfg.default_instrument());
        info!("Magic: {} | Comment: {}-<side>", cfg.magic, cfg.comment_prefix);
        info!(
            "Ladder step: {} | Lot policy: {:?} | Fallback lot: {}",
            cfg.ladder_step, cfg.lot_policy, cfg.lot_fallback
        );
        match cfg.chat_id {
            Some(id) => info!("Listening to chat {}", id),
            None => info!("Listening to every chat"),
        }
        info!("Trailing every {}s, state in {}", cfg.trail_interval_secs, cfg.state_dir);
        info!("{}", "=".repeat(60));

        Self {
            desk,
            paper,
            source,
            trail_interval: cfg.trail_interval(),
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        info!("Bot is now running. Messages are separated by a blank line; Ctrl+C to stop.");
        self.print_status().await;

        let mut trail = tokio::time::interval(self.trail_interval);
        trail.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    self.shutdown().await;
                    return Ok(());
                }
                msg = self.source.recv() => match msg {
                    Some(msg) => self.on_message(msg).await,
                    None => {
                        info!("Input closed");
                        self.shutdown().await;
                        return Ok(());
                    }
                },
                _ = trail.tick() => self.on_tick().await,
            }
        }
    }

    async fn on_message(&mut self, msg: InboundMessage) {
        // Paper quotes can be fed inline, in the replay script syntax.
        if msg.text.trim_start().starts_with("@quote") {
            self.apply_quotes(&msg.text).await;
            return;
        }

        let reply = self.desk.handle(&msg).await;
        debug!("Outcome: {:?}", reply.outcome);
        if let Some(text) = reply.text {
            println!("{}\n", text);
        }
    }

    async fn apply_quotes(&mut self, text: &str) {
        let steps = match parse_script(text) {
            Ok(steps) => steps,
            Err(e) => {
                println!("{:#}\n", e);
                return;
            }
        };
        for step in steps {
            if let ReplayStep::Quote { symbol, bid, ask } = step {
                for event in self.paper.set_quote(&symbol, bid, ask).await {
                    println!("{:?}", event);
                }
            }
        }
        self.on_tick().await;
    }

    async fn on_tick(&mut self) {
        let report = self.desk.tick().await;
        for update in &report.updates {
            println!("SL #{} -> {}", update.ticket, update.new_sl);
        }
        if !report.is_clean() {
            warn!(
                "Trailing tick: {} failure(s){}",
                report.failures.len(),
                if report.listing_error.is_some() {
                    ", listing failed"
                } else {
                    ""
                }
            );
        }
    }

    async fn print_status(&mut self) {
        let positions = self.paper.list_positions(None).await.unwrap_or_default();
        let pending = self.paper.list_pending(None).await.unwrap_or_default();
        info!(
            "Open: {} | Pending: {} | TP ladders: {}",
            positions.len(),
            pending.len(),
            self.desk.ladders().len()
        );
        info!(
            "Auto-place: {} | Fixed lot: {}",
            if self.desk.prefs().auto_place { "on" } else { "off" },
            self.desk
                .prefs()
                .fixed_lot
                .map(|l| l.to_string())
                .unwrap_or_else(|| "off".into())
        );
        let history = self.paper.history().await;
        if !history.is_empty() {
            let pnl: rust_decimal::Decimal = history.iter().map(|t| t.pnl).sum();
            info!("Closed: {} | P/L {}", history.len(), pnl.round_dp(2));
        }
    }

    async fn shutdown(&mut self) {
        info!("Shutting down...");
        self.print_status().await;
        info!("Bot stopped.");
    }
}
