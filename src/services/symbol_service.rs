//! Symbol Service
//!
//! Maps charting-platform tickers (`BTCUSDT.P`, `ETH/USD`, `SOL-PERP`) onto the
//! venue's canonical base asset.

use crate::brokers::types::InstrumentMeta;
use crate::error::{AppError, Result};
use crate::state::AppState;
use tracing::debug;

/// Quote/contract suffixes, longest spelling first within each family
const SUFFIXES: &[&str] = &[
    ".P", "-PERP", "_PERP", "PERP", "/USDT", "/USDC", "/USD", "-USDT", "-USDC", "-USD",
    "USDT", "USDC",
];

pub struct SymbolService;

impl SymbolService {
    /// Uppercase and strip quote/contract suffixes until none applies
    pub fn normalize(raw: &str) -> Result<String> {
        let mut symbol = raw.trim().to_uppercase();

        loop {
            let Some(stripped) = SUFFIXES
                .iter()
                .find_map(|suffix| symbol.strip_suffix(suffix))
                .map(|s| s.trim_end_matches(['-', '/', '_']).to_string())
            else {
                break;
            };
            if stripped.is_empty() {
                break;
            }
            symbol = stripped;
        }

        if symbol.is_empty() || SUFFIXES.contains(&symbol.as_str()) {
            return Err(AppError::Validation(format!("Invalid symbol '{}'", raw.trim())));
        }

        Ok(symbol)
    }

    /// Normalize and look up a symbol in the venue universe
    pub async fn resolve(state: &AppState, raw: &str) -> Result<InstrumentMeta> {
        let symbol = Self::normalize(raw)?;

        let meta = state
            .market
            .instrument_meta(&symbol)
            .await?
            .ok_or_else(|| AppError::SymbolNotFound(symbol.clone()))?;

        debug!("Resolved symbol '{}' -> {}", raw, meta.symbol);
        Ok(meta)
    }
}
