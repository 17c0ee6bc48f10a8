use tracing::info;

use crate::gateway::InstrumentMetadata;
use crate::models::Instrument;

/// Maps signal symbols onto broker instruments: `<SYM><suffix>`, then `<SYM>`,
/// then (non-strict only) the configured default.
#[derive(Debug, Clone)]
pub struct SymbolResolver {
    suffix: String,
    default_symbol: String,
}

impl SymbolResolver {
    pub fn new(suffix: &str, default_symbol: &str) -> Self {
        Self {
            suffix: suffix.trim().to_string(),
            default_symbol: default_symbol.trim().to_string(),
        }
    }

    pub fn default_symbol(&self) -> &str {
        &self.default_symbol
    }

    fn candidates(&self, raw: &str, with_default: bool) -> Vec<String> {
        let base = raw.trim().to_uppercase();
        let mut out = Vec::with_capacity(3);
        if !base.is_empty() {
            if !self.suffix.is_empty() {
                out.push(format!("{}{}", base, self.suffix));
            }
            out.push(base);
        }
        if with_default && !self.default_symbol.is_empty() {
            out.push(self.default_symbol.clone());
        }
        out.dedup();
        out
    }

    async fn first_known(
        &self,
        meta: &dyn InstrumentMetadata,
        candidates: Vec<String>,
    ) -> Option<Instrument> {
        for name in candidates {
            if let Some(constraints) = meta.constraints(&name).await {
                return Some(Instrument { name, constraints });
            }
        }
        None
    }

    /// Resolve a signal symbol, falling back to the default instrument.
    pub async fn resolve(&self, meta: &dyn InstrumentMetadata, raw: &str) -> Option<Instrument> {
        let found = self.first_known(meta, self.candidates(raw, true)).await?;
        if !found.name.eq_ignore_ascii_case(raw.trim()) {
            info!("Symbol resolved: requested {}, using {}", raw, found.name);
        }
        Some(found)
    }

    /// Resolve an operator-typed symbol without the default fallback.
    pub async fn resolve_strict(
        &self,
        meta: &dyn InstrumentMetadata,
        raw: &str,
    ) -> Option<Instrument> {
        self.first_known(meta, self.candidates(raw, false)).await
    }
}
