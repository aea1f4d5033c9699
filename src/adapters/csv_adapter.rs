//! CSV file bar repository: one `<SYMBOL>.csv` per symbol under a data directory.
//!
//! Expected header: `timestamp,open,high,low,close,volume`.

use crate::domain::error::SimError;
use crate::domain::ohlcv::{Bar, normalize_bars};
use crate::ports::bar_repository::BarRepository;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

#[derive(Debug, Deserialize)]
struct BarRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

pub struct CsvBarRepository {
    data_dir: PathBuf,
}

impl CsvBarRepository {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.data_dir.join(format!("{symbol}.csv"))
    }
}

pub fn parse_timestamp(input: &str) -> Result<NaiveDateTime, SimError> {
    let input = input.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(input, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| SimError::Data {
            reason: format!("invalid timestamp '{input}'"),
        })
}

impl BarRepository for CsvBarRepository {
    fn fetch_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, SimError> {
        let path = self.csv_path(symbol);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SimError::MissingFeed {
                    symbol: symbol.to_string(),
                });
            }
            Err(e) => {
                return Err(SimError::Data {
                    reason: format!("failed to read {}: {}", path.display(), e),
                });
            }
        };

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for (line, result) in rdr.deserialize::<BarRow>().enumerate() {
            let row = result.map_err(|e| SimError::Data {
                reason: format!("{}: CSV parse error: {}", path.display(), e),
            })?;
            let timestamp = parse_timestamp(&row.timestamp).map_err(|e| SimError::Data {
                reason: format!("{} row {}: {}", path.display(), line + 1, e),
            })?;

            let date = timestamp.date();
            if date < start || date > end {
                continue;
            }

            bars.push(Bar {
                timestamp,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            });
        }

        let raw = bars.len();
        let bars = normalize_bars(bars);
        if bars.len() != raw {
            debug!(symbol, dropped = raw - bars.len(), "duplicate timestamps removed");
        }
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, SimError> {
        let entries = fs::read_dir(&self.data_dir).map_err(|e| SimError::Data {
            reason: format!("failed to read directory {}: {}", self.data_dir.display(), e),
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "csv") {
                continue;
            }
            if let Some(stem) = path.file_stem() {
                symbols.push(stem.to_string_lossy().into_owned());
            }
        }

        symbols.sort();
        Ok(symbols)
    }
}
