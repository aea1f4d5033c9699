#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use wfsim::domain::backtest::BacktestConfig;
use wfsim::domain::error::SimError;
pub use wfsim::domain::ohlcv::Bar;
use wfsim::domain::session::SymbolData;
use wfsim::domain::walk_forward::WalkForwardConfig;
use wfsim::ports::bar_repository::BarRepository;

pub struct MockBarRepository {
    pub data: HashMap<String, Vec<Bar>>,
    pub errors: HashMap<String, String>,
}

impl MockBarRepository {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl BarRepository for MockBarRepository {
    fn fetch_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, SimError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(SimError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.session_date() >= start && b.session_date() <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_symbols(&self) -> Result<Vec<String>, SimError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// 09:30 on day `day` (counted from 2024-03-04), plus `minute` minutes.
pub fn minute(day: usize, minute: usize) -> NaiveDateTime {
    date(2024, 3, 4).and_hms_opt(9, 30, 0).unwrap()
        + Duration::days(day as i64)
        + Duration::minutes(minute as i64)
}

pub fn make_bar(timestamp: NaiveDateTime, open: f64, high: f64, low: f64, close: f64) -> Bar {
    Bar {
        timestamp,
        open,
        high,
        low,
        close,
        volume: 1000.0,
    }
}

pub fn flat_bar(timestamp: NaiveDateTime, price: f64) -> Bar {
    make_bar(timestamp, price, price, price, price)
}

/// `days` sessions of `per_day` minute bars; `close_at(k)` gives the close of the k-th bar overall.
pub fn session_bars(days: usize, per_day: usize, close_at: impl Fn(usize) -> f64) -> Vec<Bar> {
    let mut bars = Vec::with_capacity(days * per_day);
    for d in 0..days {
        for m in 0..per_day {
            let k = d * per_day + m;
            let close = close_at(k);
            bars.push(Bar {
                timestamp: minute(d, m),
                open: close - 0.02,
                high: close + 0.12,
                low: close - 0.12,
                close,
                volume: 1000.0 + ((k as f64) * 0.7).sin().abs() * 800.0,
            });
        }
    }
    bars
}

/// Two overlaid sine waves: enough movement for every feature to vary.
pub fn wave(k: usize, phase: f64) -> f64 {
    let k = k as f64;
    100.0 + (k * 0.21 + phase).sin() * 1.5 + (k * 0.05).cos() * 0.8
}

pub fn wave_symbol(symbol: &str, days: usize, per_day: usize, phase: f64) -> SymbolData {
    SymbolData::new(
        symbol.to_string(),
        session_bars(days, per_day, |k| wave(k, phase)),
    )
}

pub fn sample_config() -> BacktestConfig {
    BacktestConfig {
        walk_forward: WalkForwardConfig {
            in_sample_sessions: 2,
            out_of_sample_sessions: 1,
            min_in_sample_bars: 100,
            min_oos_bars: 50,
        },
        ..Default::default()
    }
}
