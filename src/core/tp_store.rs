use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::models::Direction;

/// One persisted ladder: numeric take-profits for a symbol and side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TpLadderRecord {
    pub symbol: String,
    pub direction: Direction,
    pub tps: Vec<Decimal>,
    pub updated_at: DateTime<Utc>,
}

/// Backing storage for the ladder cache.
pub trait PersistentStore: Send + Sync {
    fn load(&self) -> Result<Vec<TpLadderRecord>, StoreError>;
    fn save(&self, records: &[TpLadderRecord]) -> Result<(), StoreError>;
}

pub const LADDER_FILE: &str = "tp_ladders.json";

/// Ladder JSON file, replaced through a temp file so readers never see half a write.
pub struct JsonLadderFile {
    path: PathBuf,
}

impl JsonLadderFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }


    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PersistentStore for JsonLadderFile {
    fn load(&self) -> Result<Vec<TpLadderRecord>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let raw: Vec<serde_json::Value> = serde_json::from_str(&content)?;
        let records = raw
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<TpLadderRecord>(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping unreadable ladder record in {}: {}", self.path.display(), e);
                    None
                }
            })
            .collect();
        Ok(records)
    }

    fn save(&self, records: &[TpLadderRecord]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(records)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Volatile storage for replays and tests.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<TpLadderRecord>>,
}

impl PersistentStore for MemoryStore {
    fn load(&self) -> Result<Vec<TpLadderRecord>, StoreError> {
        Ok(self.lock().clone())
    }

    fn save(&self, records: &[TpLadderRecord]) -> Result<(), StoreError> {
        *self.lock() = records.to_vec();
        Ok(())
    }
}

impl MemoryStore {
    /// The records are replaced whole, so a panicked writer cannot leave them torn.
    fn lock(&self) -> MutexGuard<'_, Vec<TpLadderRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

type LadderKey = (String, Direction);

/// Keyed cache of TP ladders, one record per `(symbol, direction)`.
pub struct TpLadderStore {
    ladders: HashMap<LadderKey, TpLadderRecord>,
    backend: Box<dyn PersistentStore>,
}

impl TpLadderStore {
    pub fn new(backend: Box<dyn PersistentStore>) -> Self {
        Self {
            ladders: HashMap::new(),
            backend,
        }
    }

    /// Create the store and immediately load whatever the backend holds.
    pub fn open(backend: Box<dyn PersistentStore>) -> Result<Self, StoreError> {
        let mut store = Self::new(backend);
        store.load_all()?;
        Ok(store)
    }

    pub fn in_memory() -> Self {
        Self::new(Box::<MemoryStore>::default())
    }

    fn key(symbol: &str, direction: Direction) -> LadderKey {
        (symbol.to_uppercase(), direction)
    }

    /// Replace the ladder for the key. Levels are sorted in the order the
    /// direction reaches them and duplicates are dropped.
    pub fn put(&mut self, symbol: &str, direction: Direction, tps: Vec<Decimal>) {
        let mut tps = tps;
        direction.sort_levels(&mut tps);
        let key = Self::key(symbol, direction);
        debug!("TP ladder {} {}: {:?}", key.0, direction, tps);
        let record = TpLadderRecord {
            symbol: key.0.clone(),
            direction,
            tps,
            updated_at: Utc::now(),
        };
        self.ladders.insert(key, record);
    }

    pub fn get(&self, symbol: &str, direction: Direction) -> Option<&[Decimal]> {
        self.ladders
            .get(&Self::key(symbol, direction))
            .map(|r| r.tps.as_slice())
            .filter(|tps| !tps.is_empty())
    }

    pub fn remove(&mut self, symbol: &str, direction: Direction) -> bool {
        self.ladders.remove(&Self::key(symbol, direction)).is_some()
    }

    /// Drop both sides of `symbol`. Returns how many ladders were removed.
    pub fn clear_symbol(&mut self, symbol: &str) -> usize {
        [Direction::Buy, Direction::Sell]
            .into_iter()
            .filter(|d| self.remove(symbol, *d))
            .count()
    }

    pub fn clear_all(&mut self) -> usize {
        let n = self.ladders.len();
        self.ladders.clear();
        n
    }

    /// Replace the in-memory cache with the backend's contents.
    pub fn load_all(&mut self) -> Result<usize, StoreError> {
        let records = self.backend.load()?;
        self.ladders.clear();
        for mut record in records {
            record.symbol = record.symbol.to_uppercase();
            record.direction.sort_levels(&mut record.tps);
            self.ladders
                .insert((record.symbol.clone(), record.direction), record);
        }
        if !self.ladders.is_empty() {
            info!("Loaded {} TP ladder(s)", self.ladders.len());
        }
        Ok(self.ladders.len())
    }

    pub fn persist(&self) -> Result<(), StoreError> {
        let mut records: Vec<TpLadderRecord> = self.ladders.values().cloned().collect();
        records.sort_by(|a, b| {
            a.symbol
                .cmp(&b.symbol)
                .then_with(|| a.direction.as_str().cmp(b.direction.as_str()))
        });
        self.backend.save(&records)
    }

    pub fn records(&self) -> impl Iterator<Item = &TpLadderRecord> {
        self.ladders.values()
    }

    pub fn len(&self) -> usize {
        self.ladders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ladders.is_empty()
    }
}
