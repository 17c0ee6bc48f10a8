#![allow(dead_code)]

use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use signal_ladder_bot::config::Config;
use signal_ladder_bot::core::ladder::LotPolicy;
use signal_ladder_bot::gateway::source::InboundMessage;
use signal_ladder_bot::gateway::PaperGateway;
use signal_ladder_bot::models::{Direction, OrderRequest, OrderType, SymbolConstraints};

pub const CHAT: i64 = 4242;
pub const MAGIC: u64 = 777001;

pub const ZONE_BUY: &str = "XAUUSD LOOKING BUY THIS ZONE\n\
    3463/3459\n\
    SL 3453\n\
    TP1 3467\n\
    TP2 3470";

pub const MARKET_BUY: &str = "Buy Now\nLots=3\nTP1->3470\nTP2->3475\nTP3->3480\nSL 3450";

pub fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn msg(text: &str) -> InboundMessage {
    InboundMessage::new(CHAT, text)
}

pub fn gold() -> SymbolConstraints {
    SymbolConstraints {
        tick_size: d("0.01"),
        volume_step: d("0.01"),
        volume_min: d("0.01"),
        volume_max: d("100"),
    }
}

/// Empty per-test directory under the system temp dir.
pub fn state_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "signal_ladder_bot_it_{}_{}",
        std::process::id(),
        name
    ));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

pub fn config(name: &str) -> Config {
    Config {
        symbol: "XAUUSD".to_string(),
        symbol_suffix: String::new(),
        lot_fallback: d("0.10"),
        magic: MAGIC,
        comment_prefix: "LadderBot".to_string(),
        ladder_step: Decimal::ONE,
        lot_policy: LotPolicy::PerOrder,
        max_zone_rungs: 200,
        price_tolerance: Decimal::ZERO,
        commands_all_magics: true,
        chat_id: Some(CHAT),
        trail_interval_secs: 1,
        gateway_timeout_ms: 200,
        paper_constraints: gold(),
        state_dir: state_dir(name).to_string_lossy().to_string(),
        log_level: "ERROR".to_string(),
    }
}

pub async fn paper() -> Arc<PaperGateway> {
    let gw = Arc::new(PaperGateway::new());
    gw.add_instrument("XAUUSD", gold()).await;
    gw
}

/// An order that does not belong to the bot.
pub fn foreign_limit(direction: Direction, price: &str, magic: u64) -> OrderRequest {
    OrderRequest {
        symbol: "XAUUSD".to_string(),
        direction,
        order_type: OrderType::Limit,
        price: Some(d(price)),
        volume: d("0.05"),
        stop_loss: None,
        take_profit: None,
        magic,
        comment: "manual".to_string(),
    }
}
