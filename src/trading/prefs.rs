use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::warn;

use crate::error::StoreError;

/// Operator preferences that survive restarts.
/// Zone signals are only stored, not placed, until `auto_place` is switched on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardPrefs {
    #[serde(default)]
    pub fixed_lot: Option<Decimal>,
    #[serde(default)]
    pub auto_place: bool,
}

pub const PREFS_FILE: &str = "prefs.json";

/// Preferences file next to the ladder file. `None` keeps preferences in memory only.
pub struct PrefsFile {
    path: Option<PathBuf>,
}

impl PrefsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn volatile() -> Self {
        Self { path: None }
    }

    /// Missing or unreadable files fall back to defaults.
    pub fn load(&self) -> DashboardPrefs {
        let Some(path) = &self.path else {
            return DashboardPrefs::default();
        };
        let Ok(content) = fs::read_to_string(path) else {
            return DashboardPrefs::default();
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!("Ignoring unreadable {}: {}", path.display(), e);
            DashboardPrefs::default()
        })
    }

    pub fn save(&self, prefs: &DashboardPrefs) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(prefs)?)?;
        Ok(())
    }
}
