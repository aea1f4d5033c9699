//! Symbol universe: parse symbol lists and load every feed into memory up front.
//!
//! Symbols without usable data are skipped with a reason; only a universe
//! where every symbol was skipped is an error.

use crate::domain::error::SimError;
use crate::domain::session::SymbolData;
use crate::ports::bar_repository::BarRepository;
use chrono::NaiveDate;
use std::collections::HashSet;
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in symbol list")]
    EmptyToken,

    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(String),
}

impl From<UniverseError> for SimError {
    fn from(err: UniverseError) -> Self {
        SimError::ConfigInvalid {
            section: "backtest".into(),
            key: "symbols".into(),
            reason: err.to_string(),
        }
    }
}

/// Split a comma list into upper-cased symbols, rejecting blanks and duplicates.
pub fn parse_symbols(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut symbols = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let symbol = trimmed.to_uppercase();
        if !seen.insert(symbol.clone()) {
            return Err(UniverseError::DuplicateSymbol(symbol));
        }
        symbols.push(symbol);
    }

    Ok(symbols)
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    MissingFeed,
    InsufficientBars { bars: usize, minimum: usize },
    FetchFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingFeed => f.write_str("no data"),
            SkipReason::InsufficientBars { bars, minimum } => {
                write!(f, "only {bars} bars, minimum {minimum}")
            }
            SkipReason::FetchFailed(reason) => write!(f, "fetch failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedSymbol {
    pub symbol: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone)]
pub struct Universe {
    pub symbols: Vec<SymbolData>,
    pub skipped: Vec<SkippedSymbol>,
}

impl Universe {
    pub fn count(&self) -> usize {
        self.symbols.len()
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolData> {
        self.symbols.iter().find(|s| s.symbol == symbol)
    }
}

/// Fetch every symbol's bars before any simulation starts.
pub fn load_universe(
    repo: &dyn BarRepository,
    symbols: &[String],
    start: NaiveDate,
    end: NaiveDate,
    min_bars: usize,
) -> Result<Universe, SimError> {
    let mut loaded = Vec::new();
    let mut skipped = Vec::new();

    for symbol in symbols {
        let reason = match repo.fetch_bars(symbol, start, end) {
            Ok(bars) if bars.is_empty() => SkipReason::MissingFeed,
            Ok(bars) if bars.len() < min_bars => SkipReason::InsufficientBars {
                bars: bars.len(),
                minimum: min_bars,
            },
            Ok(bars) => {
                let data = SymbolData::new(symbol.clone(), bars);
                info!(
                    symbol = %symbol,
                    bars = data.bar_count(),
                    sessions = data.session_count(),
                    "loaded"
                );
                loaded.push(data);
                continue;
            }
            Err(SimError::MissingFeed { .. }) => SkipReason::MissingFeed,
            Err(e) => SkipReason::FetchFailed(e.to_string()),
        };
        warn!(symbol = %symbol, %reason, "skipping symbol");
        skipped.push(SkippedSymbol {
            symbol: symbol.clone(),
            reason,
        });
    }

    if loaded.is_empty() {
        return Err(SimError::InsufficientData {
            context: "universe".to_string(),
            bars: 0,
            minimum: min_bars,
        });
    }

    if !skipped.is_empty() {
        info!(
            loaded = loaded.len(),
            requested = symbols.len(),
            "universe partially loaded"
        );
    }

    Ok(Universe {
        symbols: loaded,
        skipped,
    })
}
