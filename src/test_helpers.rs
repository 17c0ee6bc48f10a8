use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;

use crate::config::Config;
use crate::core::ladder::{LadderSettings, LotPolicy};
use crate::gateway::PaperGateway;
use crate::models::{Direction, Instrument, OrderRequest, OrderType, Position, SymbolConstraints};

/// Decimal literal for tests.
pub fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// Gold-like constraints: 0.01 tick, 0.01 lot step, 0.01..100 lots.
pub fn xau_constraints() -> SymbolConstraints {
    SymbolConstraints {
        tick_size: d("0.01"),
        volume_step: d("0.01"),
        volume_min: d("0.01"),
        volume_max: d("100"),
    }
}

pub fn xauusd() -> Instrument {
    Instrument {
        name: "XAUUSD".to_string(),
        constraints: xau_constraints(),
    }
}

pub fn ladder_settings() -> LadderSettings {
    LadderSettings {
        step: Decimal::ONE,
        lot_policy: LotPolicy::PerOrder,
        max_zone_rungs: 200,
        fallback_lot: d("0.10"),
        magic: 777001,
        comment_prefix: "LadderBot".to_string(),
    }
}

pub async fn paper_xauusd() -> PaperGateway {
    let gw = PaperGateway::new();
    gw.add_instrument("XAUUSD", xau_constraints()).await;
    gw
}

fn default_stop(direction: Direction) -> Decimal {
    match direction {
        Direction::Buy => d("3450"),
        Direction::Sell => d("3470"),
    }
}

pub fn market_order(direction: Direction) -> OrderRequest {
    OrderRequest {
        symbol: "XAUUSD".to_string(),
        direction,
        order_type: OrderType::Market,
        price: None,
        volume: d("0.10"),
        stop_loss: Some(default_stop(direction)),
        take_profit: None,
        magic: 777001,
        comment: format!("LadderBot-{}", direction),
    }
}

pub fn limit_order(direction: Direction, price: &str) -> OrderRequest {
    OrderRequest {
        order_type: OrderType::Limit,
        price: Some(d(price)),
        ..market_order(direction)
    }
}

pub fn position(direction: Direction, entry: &str, sl: Option<&str>) -> Position {
    Position {
        ticket: 1,
        symbol: "XAUUSD".to_string(),
        direction,
        entry_price: d(entry),
        current_sl: sl.map(d),
        take_profit: None,
        volume: d("0.10"),
        profit: Decimal::ZERO,
        magic: 777001,
    }
}

/// Fresh per-process, per-test state directory (not created).
pub fn temp_state_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "signal_ladder_bot_{}_{}",
        std::process::id(),
        name
    ));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

/// A Config suitable for testing: paper constraints, no chat filter, quiet logs.
pub fn test_config() -> Config {
    Config {
        symbol: "XAUUSD".to_string(),
        symbol_suffix: String::new(),
        lot_fallback: d("0.10"),
        magic: 777001,
        comment_prefix: "LadderBot".to_string(),
        ladder_step: Decimal::ONE,
        lot_policy: LotPolicy::PerOrder,
        max_zone_rungs: 200,
        price_tolerance: Decimal::ZERO,
        commands_all_magics: true,
        chat_id: None,
        trail_interval_secs: 1,
        gateway_timeout_ms: 200,
        paper_constraints: xau_constraints(),
        state_dir: temp_state_dir("config")
            .to_string_lossy()
            .to_string(),
        log_level: "ERROR".to_string(),
    }
}
