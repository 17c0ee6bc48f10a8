use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::core::commands::{CommandInterpreter, Directive};
use crate::core::ladder::LadderBuilder;
use crate::core::signal_parser::SignalParser;
use crate::core::tp_store::{JsonLadderFile, TpLadderStore, LADDER_FILE};
use crate::core::trailing::{TickReport, TrailingEngine};
use crate::error::{BuildError, CommandError, StoreError};
use crate::gateway::source::InboundMessage;
use crate::gateway::{with_timeout, InstrumentMetadata, OrderGateway, SymbolResolver};
use crate::models::{CommandKind, Instrument, ManagementCommand, Signal, SignalKind, SymbolFilter};
use crate::trading::executor::{place_batch, CommandExecutor};
use crate::trading::prefs::{DashboardPrefs, PrefsFile, PREFS_FILE};

/// What the desk did with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Wrong chat, or neither a command nor a signal.
    Ignored,
    Directive,
    Command(CommandKind),
    Signal {
        kind: SignalKind,
        placed: usize,
        failed: usize,
    },
    /// Recognised but unusable (malformed command, unknown symbol, build failure).
    Rejected,
}

#[derive(Debug, Clone)]
pub struct Reply {
    pub outcome: Outcome,
    /// Text for the operator; `None` means stay silent.
    pub text: Option<String>,
}

impl Reply {
    fn silent(outcome: Outcome) -> Self {
        Self { outcome, text: None }
    }

    fn say(outcome: Outcome, text: impl Into<String>) -> Self {
        Self {
            outcome,
            text: Some(text.into()),
        }
    }
}

/// Owns every piece of mutable state (TP ladders, operator prefs, last
/// signal) and serialises messages and trailing ticks through `&mut self`.
pub struct Desk {
    config: Config,
    gateway: Arc<dyn OrderGateway>,
    metadata: Arc<dyn InstrumentMetadata>,
    parser: SignalParser,
    interpreter: CommandInterpreter,
    resolver: SymbolResolver,
    trailing: TrailingEngine,
    ladders: TpLadderStore,
    prefs: DashboardPrefs,
    prefs_file: PrefsFile,
    last_signal: Option<(Signal, Instrument)>,
}

impl Desk {
    pub fn new(
        config: Config,
        gateway: Arc<dyn OrderGateway>,
        metadata: Arc<dyn InstrumentMetadata>,
        ladders: TpLadderStore,
        prefs_file: PrefsFile,
    ) -> Self {
        let prefs = prefs_file.load();
        Self {
            parser: SignalParser::new(&config.symbol),
            interpreter: CommandInterpreter::new(),
            resolver: SymbolResolver::new(&config.symbol_suffix, &config.default_instrument()),
            trailing: TrailingEngine::new(config.magic, config.gateway_timeout()),
            config,
            gateway,
            metadata,
            ladders,
            prefs,
            prefs_file,
            last_signal: None,
        }
    }

    /// Desk with ladders and prefs persisted under `config.state_dir`.
    pub fn open<B>(config: Config, broker: Arc<B>) -> Result<Self, StoreError>
    where
        B: OrderGateway + InstrumentMetadata + 'static,
    {
        let ladders = TpLadderStore::open(Box::new(JsonLadderFile::new(config.state_path(LADDER_FILE))))?;
        let prefs_file = PrefsFile::new(config.state_path(PREFS_FILE));
        Ok(Self::new(config, broker.clone(), broker, ladders, prefs_file))
    }

    /// Desk that keeps everything in memory.
    pub fn volatile<B>(config: Config, broker: Arc<B>) -> Self
    where
        B: OrderGateway + InstrumentMetadata + 'static,
    {
        Self::new(
            config,
            broker.clone(),
            broker,
            TpLadderStore::in_memory(),
            PrefsFile::volatile(),
        )
    }

    pub fn ladders(&self) -> &TpLadderStore {
        &self.ladders
    }

    pub fn prefs(&self) -> &DashboardPrefs {
        &self.prefs
    }

    pub fn last_signal(&self) -> Option<&Signal> {
        self.last_signal.as_ref().map(|(s, _)| s)
    }

    pub async fn handle(&mut self, msg: &InboundMessage) -> Reply {
        let text = msg.text.trim();
        if text.is_empty() {
            return Reply::silent(Outcome::Ignored);
        }

        // Answered from any chat so the operator can discover the id.
        if let Ok(Directive::GetId) = self.interpreter.parse_directive(text) {
            return Reply::say(Outcome::Directive, format!("Chat ID: {}", msg.chat_id));
        }
        if let Some(expected) = self.config.chat_id {
            if msg.chat_id != expected {
                debug!("Ignoring message from chat {}", msg.chat_id);
                return Reply::silent(Outcome::Ignored);
            }
        }

        match self.interpreter.parse_directive(text) {
            Ok(directive) => return self.directive(directive).await,
            Err(CommandError::Malformed { verb, reason }) => {
                return Reply::say(Outcome::Rejected, format!("{}: {}", verb, reason))
            }
            Err(CommandError::NotACommand) => {}
        }

        match self.interpreter.parse(text) {
            Ok(cmd) => return self.command(cmd).await,
            Err(CommandError::Malformed { verb, reason }) => {
                warn!("Malformed {} command: {}", verb, reason);
                return Reply::say(Outcome::Rejected, format!("{}: {}", verb, reason));
            }
            Err(CommandError::NotACommand) => {}
        }

        match self.parser.parse(text) {
            Ok(signal) => self.signal(signal).await,
            Err(failure) if failure.is_recognised() => {
                warn!("Signal dropped: {}", failure);
                Reply::say(Outcome::Rejected, format!("Signal not placed: {}.", failure))
            }
            Err(failure) => {
                info!("Message ignored ({})", failure);
                Reply::silent(Outcome::Ignored)
            }
        }
    }

    /// One trailing-stop reconciliation pass.
    pub async fn tick(&mut self) -> TickReport {
        self.trailing
            .reconcile(self.gateway.as_ref(), &self.ladders)
            .await
    }

    async fn signal(&mut self, signal: Signal) -> Reply {
        info!("Parsed signal: {}", signal.summary());
        let Some(instrument) = self
            .resolver
            .resolve(self.metadata.as_ref(), &signal.symbol)
            .await
        else {
            let err = BuildError::UnresolvedSymbol(signal.symbol.clone());
            warn!("{}", err);
            return Reply::say(Outcome::Rejected, format!("Symbol '{}' not found.", signal.symbol));
        };

        let tps = signal.numeric_tps();
        if !tps.is_empty() {
            self.ladders.put(&instrument.name, signal.direction, tps);
            if let Err(e) = self.ladders.persist() {
                warn!("Could not persist TP ladders: {}", e);
            }
        }

        let kind = signal.kind;
        let summary = signal.summary();
        self.last_signal = Some((signal, instrument));

        // Only zones wait for the operator; the other templates go straight out.
        if kind == SignalKind::Zone && !self.prefs.auto_place {
            return Reply::say(
                Outcome::Signal {
                    kind,
                    placed: 0,
                    failed: 0,
                },
                format!("Signal stored: {}. Send 'place' to place it.", summary),
            );
        }
        self.place_last().await
    }

    async fn place_last(&mut self) -> Reply {
        let Some((signal, instrument)) = self.last_signal.as_ref() else {
            return Reply::say(Outcome::Rejected, "No signal to place.");
        };

        let builder = LadderBuilder::new(self.config.ladder_settings())
            .with_dashboard_lot(self.prefs.fixed_lot);
        let orders = match builder.build(signal, instrument) {
            Ok(orders) => orders,
            Err(e) => {
                warn!("Order build failed for {}: {}", instrument.name, e);
                return Reply::say(Outcome::Rejected, format!("Order build failed: {}", e));
            }
        };

        let report = place_batch(self.gateway.as_ref(), &orders, self.config.gateway_timeout()).await;
        info!(
            "{} {}: {}/{} order(s) placed",
            signal.kind,
            instrument.name,
            report.placed.len(),
            report.total()
        );
        Reply::say(
            Outcome::Signal {
                kind: signal.kind,
                placed: report.placed.len(),
                failed: report.failed.len(),
            },
            report.summary(&orders),
        )
    }

    async fn command(&mut self, cmd: ManagementCommand) -> Reply {
        let target = match &cmd.filters.symbol {
            SymbolFilter::All => None,
            SymbolFilter::Symbol(raw) => {
                match self.resolver.resolve_strict(self.metadata.as_ref(), raw).await {
                    Some(inst) => Some(inst.name),
                    None => {
                        return Reply::say(Outcome::Rejected, format!("Symbol '{}' not found.", raw))
                    }
                }
            }
        };

        let executor = CommandExecutor::new(
            self.gateway.as_ref(),
            self.config.command_magic(),
            self.config.price_tolerance,
            self.config.gateway_timeout(),
        );
        let outcome = executor.execute(&cmd, target.as_deref()).await;

        if cmd.kind == CommandKind::Kill {
            let cleared = match target.as_deref() {
                Some(symbol) => self.ladders.clear_symbol(symbol),
                None => self.ladders.clear_all(),
            };
            if cleared > 0 {
                info!("Kill cleared {} TP ladder(s)", cleared);
                if let Err(e) = self.ladders.persist() {
                    warn!("Could not persist TP ladders: {}", e);
                }
            }
        }

        Reply::say(Outcome::Command(cmd.kind), outcome.message)
    }

    async fn directive(&mut self, directive: Directive) -> Reply {
        match directive {
            Directive::GetId => Reply::silent(Outcome::Directive),
            Directive::Place => self.place_last().await,
            Directive::Lot(lot) => {
                self.prefs.fixed_lot = lot;
                self.save_prefs();
                let text = match lot {
                    Some(l) => format!("Fixed lot set to {}.", l),
                    None => format!(
                        "Fixed lot off; using the signal lot or {}.",
                        self.config.lot_fallback
                    ),
                };
                Reply::say(Outcome::Directive, text)
            }
            Directive::AutoPlace(on) => {
                self.prefs.auto_place = on;
                self.save_prefs();
                info!("Auto-place on signal set to: {}", on);
                Reply::say(
                    Outcome::Directive,
                    format!("Auto-place {}.", if on { "on" } else { "off" }),
                )
            }
            Directive::Status => Reply::say(Outcome::Directive, self.status().await),
        }
    }

    fn save_prefs(&self) {
        if let Err(e) = self.prefs_file.save(&self.prefs) {
            warn!("Could not save prefs: {}", e);
        }
    }

    async fn status(&self) -> String {
        let timeout = self.config.gateway_timeout();
        let positions = with_timeout("list_positions", timeout, self.gateway.list_positions(Some(self.config.magic)))
            .await
            .map(|p| p.len().to_string())
            .unwrap_or_else(|_| "?".into());
        let pending = with_timeout("list_pending", timeout, self.gateway.list_pending(Some(self.config.magic)))
            .await
            .map(|p| p.len().to_string())
            .unwrap_or_else(|_| "?".into());
        let mut lines = vec![
            format!("Auto-place: {}", if self.prefs.auto_place { "on" } else { "off" }),
            format!(
                "Fixed lot: {}",
                self.prefs
                    .fixed_lot
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| "off".into())
            ),
            format!("Positions: {} | Pending: {}", positions, pending),
            format!("TP ladders: {}", self.ladders.len()),
        ];
        let mut ladders: Vec<String> = self
            .ladders
            .records()
            .map(|r| {
                let tps: Vec<String> = r.tps.iter().map(|t| t.to_string()).collect();
                format!("  {} {}: {}", r.symbol, r.direction, tps.join(" > "))
            })
            .collect();
        ladders.sort();
        lines.extend(ladders);
        if let Some(signal) = self.last_signal() {
            lines.push(format!("Last signal: {}", signal.summary()));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::PaperGateway;
    use crate::models::Direction;
    use crate::test_helpers::{d, paper_xauusd, test_config};

    async fn desk() -> (Desk, Arc<PaperGateway>) {
        let gw = Arc::new(paper_xauusd().await);
        (Desk::volatile(test_config(), gw.clone()), gw)
    }

    fn msg(text: &str) -> InboundMessage {
        InboundMessage::new(42, text)
    }

    const ZONE: &str = "XAUUSD LOOKING BUY THIS ZONE\n3463/3459\nSL 3453\nTP1 3467\nTP2 3470";

    #[tokio::test]
    async fn signal_is_stored_then_placed_on_request() {
        let (mut desk, gw) = desk().await;
        let reply = desk.handle(&msg(ZONE)).await;
        assert_eq!(
            reply.outcome,
            Outcome::Signal { kind: SignalKind::Zone, placed: 0, failed: 0 }
        );
        assert_eq!(
            desk.ladders().get("XAUUSD", Direction::Buy),
            Some(&[d("3467"), d("3470")][..])
        );
        assert!(gw.list_pending(None).await.unwrap().is_empty());

        let reply = desk.handle(&msg("/place")).await;
        assert_eq!(
            reply.outcome,
            Outcome::Signal { kind: SignalKind::Zone, placed: 5, failed: 0 }
        );
        assert_eq!(gw.list_pending(None).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn autoplace_and_dashboard_lot() {
        let (mut desk, gw) = desk().await;
        desk.handle(&msg("autoplace on")).await;
        desk.handle(&msg("lot 0.3")).await;
        let reply = desk.handle(&msg(ZONE)).await;
        assert!(matches!(reply.outcome, Outcome::Signal { placed: 5, .. }));
        let pending = gw.list_pending(None).await.unwrap();
        assert!(pending.iter().all(|o| o.request.volume == d("0.3")));
        assert!(pending.iter().all(|o| o.request.magic == 777001));
    }

    #[tokio::test]
    async fn chat_filter_and_getid() {
        let gw = Arc::new(paper_xauusd().await);
        let mut cfg = test_config();
        cfg.chat_id = Some(42);
        let mut desk = Desk::volatile(cfg, gw);
        let stranger = InboundMessage::new(7, ZONE);
        assert_eq!(desk.handle(&stranger).await.outcome, Outcome::Ignored);
        let reply = desk.handle(&InboundMessage::new(7, "/getid")).await;
        assert_eq!(reply.text.as_deref(), Some("Chat ID: 7"));
        assert!(matches!(desk.handle(&msg(ZONE)).await.outcome, Outcome::Signal { .. }));
    }

    #[tokio::test]
    async fn unknown_command_symbol_is_reported() {
        let (mut desk, _gw) = desk().await;
        let reply = desk.handle(&msg("/close GBPJPY")).await;
        assert_eq!(reply.outcome, Outcome::Rejected);
        assert_eq!(reply.text.as_deref(), Some("Symbol 'GBPJPY' not found."));
    }

    #[tokio::test]
    async fn kill_clears_ladders_cancel_does_not() {
        let (mut desk, _gw) = desk().await;
        desk.handle(&msg(ZONE)).await;
        desk.handle(&msg("cancel XAUUSD")).await;
        assert!(desk.ladders().get("XAUUSD", Direction::Buy).is_some());
        let reply = desk.handle(&msg("kill XAUUSD")).await;
        assert_eq!(reply.outcome, Outcome::Command(CommandKind::Kill));
        assert!(desk.ladders().is_empty());
    }

    #[tokio::test]
    async fn signal_without_numeric_tps_keeps_ladder() {
        let (mut desk, _gw) = desk().await;
        desk.handle(&msg(ZONE)).await;
        desk.handle(&msg("Lots=3\nBuy limit=3410\nTP open\nSL 3400")).await;
        assert_eq!(
            desk.ladders().get("XAUUSD", Direction::Buy),
            Some(&[d("3467"), d("3470")][..])
        );
    }

    #[tokio::test]
    async fn repeat_signal_places_without_autoplace() {
        let (mut desk, gw) = desk().await;
        assert!(!desk.prefs().auto_place);
        let reply = desk
            .handle(&msg("Lot size=0.10\nLots=3\nBuy limit= 3410\nTP 3420\nSL 3400"))
            .await;
        assert_eq!(
            reply.outcome,
            Outcome::Signal { kind: SignalKind::Repeat, placed: 3, failed: 0 }
        );
        let pending = gw.list_pending(None).await.unwrap();
        assert_eq!(pending.len(), 3);
        assert!(pending.iter().all(|o| o.request.volume == d("0.10")));
        assert!(pending.iter().all(|o| o.price() == Some(d("3410"))));
    }

    #[tokio::test]
    async fn unusable_signal_is_rejected_with_reason() {
        let (mut desk, gw) = desk().await;
        let reply = desk.handle(&msg("Lots=0\nBuy limit=3410\nTP 3420\nSL 3400")).await;
        assert_eq!(reply.outcome, Outcome::Rejected);
        let text = reply.text.unwrap();
        assert!(text.starts_with("Signal not placed: REPEAT signal rejected"));
        assert!(text.contains("at least 1"));

        let reply = desk
            .handle(&msg("Buy limit 2450 -> TP 2460\nSell limit 2455 -> TP 2442\nSL 2470"))
            .await;
        assert_eq!(reply.outcome, Outcome::Rejected);
        assert!(reply.text.unwrap().contains("mixed BUY and SELL"));
        assert!(gw.list_pending(None).await.unwrap().is_empty());
        assert!(desk.last_signal().is_none());
    }

    #[tokio::test]
    async fn chatter_is_ignored() {
        let (mut desk, _gw) = desk().await;
        let reply = desk.handle(&msg("good morning traders")).await;
        assert_eq!(reply.outcome, Outcome::Ignored);
        assert!(reply.text.is_none());
    }

    #[tokio::test]
    async fn place_without_signal() {
        let (mut desk, _gw) = desk().await;
        let reply = desk.handle(&msg("place")).await;
        assert_eq!(reply.text.as_deref(), Some("No signal to place."));
    }
}
