//! Bar data access port.

use crate::domain::error::SimError;
use crate::domain::ohlcv::Bar;
use chrono::NaiveDate;

/// Source of historical bars. Implementations return bars ascending and deduplicated.
pub trait BarRepository: Send + Sync {
    /// Bars whose session date falls in `start..=end`.
    fn fetch_bars(&self, symbol: &str, start: NaiveDate, end: NaiveDate)
    -> Result<Vec<Bar>, SimError>;

    fn list_symbols(&self) -> Result<Vec<String>, SimError>;

    /// First date, last date and bar count, or `None` when the symbol has no bars.
    fn data_range(&self, symbol: &str) -> Result<Option<(NaiveDate, NaiveDate, usize)>, SimError> {
        let bars = self.fetch_bars(symbol, NaiveDate::MIN, NaiveDate::MAX)?;
        Ok(match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => {
                Some((first.session_date(), last.session_date(), bars.len()))
            }
            _ => None,
        })
    }
}
