//! Per-symbol bar store split into trading sessions.

use crate::domain::ohlcv::Bar;
use chrono::NaiveDate;
use std::ops::Range;

/// One calendar date of bars, addressed by index range into the symbol's bars.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub date: NaiveDate,
    pub range: Range<usize>,
}

impl Session {
    pub fn bar_count(&self) -> usize {
        self.range.len()
    }
}

#[derive(Debug, Clone)]
pub struct SymbolData {
    pub symbol: String,
    pub bars: Vec<Bar>,
    pub sessions: Vec<Session>,
}

impl SymbolData {
    /// Bars must already be ascending and deduplicated.
    pub fn new(symbol: String, bars: Vec<Bar>) -> Self {
        let sessions = split_sessions(&bars);
        Self {
            symbol,
            bars,
            sessions,
        }
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn first_bar(&self) -> Option<&Bar> {
        self.bars.first()
    }

    pub fn last_bar(&self) -> Option<&Bar> {
        self.bars.last()
    }
}

pub fn split_sessions(bars: &[Bar]) -> Vec<Session> {
    let mut sessions: Vec<Session> = Vec::new();
    for (i, bar) in bars.iter().enumerate() {
        let date = bar.session_date();
        match sessions.last_mut() {
            Some(current) if current.date == date => current.range.end = i + 1,
            _ => sessions.push(Session {
                date,
                range: i..i + 1,
            }),
        }
    }
    sessions
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn make_bar(ts: &str, close: f64) -> Bar {
        Bar {
            timestamp: NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M").unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn split_sessions_groups_by_date() {
        let bars = vec![
            make_bar("2024-01-02 09:30", 100.0),
            make_bar("2024-01-02 09:31", 101.0),
            make_bar("2024-01-03 09:30", 102.0),
            make_bar("2024-01-03 09:31", 103.0),
            make_bar("2024-01-03 09:32", 104.0),
            make_bar("2024-01-05 09:30", 105.0),
        ];
        let sessions = split_sessions(&bars);

        assert_eq!(sessions.len(), 3);
        assert_eq!(sessions[0].range, 0..2);
        assert_eq!(sessions[1].range, 2..5);
        assert_eq!(sessions[1].bar_count(), 3);
        assert_eq!(sessions[2].date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert_eq!(sessions[2].range, 5..6);
    }

    #[test]
    fn split_sessions_empty() {
        assert!(split_sessions(&[]).is_empty());
    }

    #[test]
    fn symbol_data_new_builds_sessions() {
        let bars = vec![
            make_bar("2024-01-02 09:30", 100.0),
            make_bar("2024-01-03 09:30", 101.0),
        ];
        let data = SymbolData::new("SPY".into(), bars);

        assert_eq!(data.bar_count(), 2);
        assert_eq!(data.session_count(), 2);
        assert!((data.last_bar().unwrap().close - 101.0).abs() < f64::EPSILON);
    }
}
