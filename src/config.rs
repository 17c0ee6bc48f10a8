use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::core::ladder::{LadderSettings, LotPolicy};
use crate::models::SymbolConstraints;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Instruments
    pub symbol: String,
    pub symbol_suffix: String,

    // Orders
    pub lot_fallback: Decimal,
    pub magic: u64,
    pub comment_prefix: String,
    pub ladder_step: Decimal,
    pub lot_policy: LotPolicy,
    pub max_zone_rungs: usize,

    // Commands
    /// Absolute band for `sl move` / `ch` / `delete order` price matching.
    pub price_tolerance: Decimal,
    /// Manual commands act on every order, not only this bot's magic.
    pub commands_all_magics: bool,

    // Chat
    /// Only messages from this chat are handled; `None` accepts every chat.
    pub chat_id: Option<i64>,

    // Loop
    pub trail_interval_secs: u64,
    pub gateway_timeout_ms: u64,

    // Paper instrument
    pub paper_constraints: SymbolConstraints,

    // State & logging
    pub state_dir: String,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let env = |key: &str, default: &str| -> String {
            std::env::var(key).unwrap_or_else(|_| default.to_string())
        };

        Config {
            symbol: env("SYMBOL", "XAUUSD").trim().to_string(),
            symbol_suffix: env("SYMBOL_SUFFIX", "").trim().to_string(),
            lot_fallback: env("LOT_FALLBACK", "0.10")
                .parse()
                .unwrap_or(Decimal::new(10, 2)),
            magic: env("MAGIC", "777001").parse().unwrap_or(777001),
            comment_prefix: env("ORDER_COMMENT_PREFIX", "LadderBot"),
            ladder_step: env("LADDER_STEP", "1.0").parse().unwrap_or(Decimal::ONE),
            lot_policy: env("LOT_POLICY", "per_order").parse().unwrap_or_default(),
            max_zone_rungs: env("MAX_ZONE_RUNGS", "200").parse().unwrap_or(200),
            price_tolerance: env("PRICE_TOLERANCE", "0").parse().unwrap_or(Decimal::ZERO),
            commands_all_magics: env("COMMANDS_ALL_MAGICS", "true").to_lowercase() == "true",
            chat_id: env("CHAT_ID", "").trim().parse().ok(),
            trail_interval_secs: env("TRAIL_INTERVAL_SECS", "1").parse().unwrap_or(1),
            gateway_timeout_ms: env("GATEWAY_TIMEOUT_MS", "2000").parse().unwrap_or(2000),
            paper_constraints: SymbolConstraints {
                tick_size: env("PAPER_TICK_SIZE", "0.01").parse().unwrap_or(Decimal::new(1, 2)),
                volume_step: env("PAPER_VOLUME_STEP", "0.01").parse().unwrap_or(Decimal::new(1, 2)),
                volume_min: env("PAPER_VOLUME_MIN", "0.01").parse().unwrap_or(Decimal::new(1, 2)),
                volume_max: env("PAPER_VOLUME_MAX", "100").parse().unwrap_or(Decimal::ONE_HUNDRED),
            },
            state_dir: env("STATE_DIR", "state"),
            log_level: env("LOG_LEVEL", "INFO"),
        }
    }

    pub fn ladder_settings(&self) -> LadderSettings {
        LadderSettings {
            step: self.ladder_step,
            lot_policy: self.lot_policy,
            max_zone_rungs: self.max_zone_rungs,
            fallback_lot: self.lot_fallback,
            magic: self.magic,
            comment_prefix: self.comment_prefix.clone(),
        }
    }

    /// Magic filter for manual commands; `None` means every order.
    pub fn command_magic(&self) -> Option<u64> {
        if self.commands_all_magics {
            None
        } else {
            Some(self.magic)
        }
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway_timeout_ms.max(1))
    }

    pub fn trail_interval(&self) -> Duration {
        Duration::from_secs(self.trail_interval_secs.max(1))
    }

    pub fn state_path(&self, file: &str) -> PathBuf {
        PathBuf::from(&self.state_dir).join(file)
    }

    /// Broker name of the default instrument.
    pub fn default_instrument(&self) -> String {
        format!("{}{}", self.symbol.to_uppercase(), self.symbol_suffix)
    }
}
