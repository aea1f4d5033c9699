//! Percent deviation of the close from the session-anchored VWAP.
//!
//! VWAP resets on the first bar of each session date and accumulates
//! typical_price * volume / volume over the session so far, current bar
//! included. Sessions with no traded volume yet anchor on the close.
//! Always valid.

use crate::domain::indicator::{FeatureKind, IndicatorPoint, IndicatorSeries};
use crate::domain::ohlcv::Bar;

pub fn calculate_vwap_deviation(bars: &[Bar]) -> IndicatorSeries {
    let mut values = Vec::with_capacity(bars.len());
    let mut session = None;
    let mut cum_pv = 0.0;
    let mut cum_volume = 0.0;

    for bar in bars {
        if session != Some(bar.session_date()) {
            session = Some(bar.session_date());
            cum_pv = 0.0;
            cum_volume = 0.0;
        }
        cum_pv += bar.typical_price() * bar.volume;
        cum_volume += bar.volume;

        let vwap = if cum_volume > 0.0 {
            cum_pv / cum_volume
        } else {
            bar.close
        };
        let value = if vwap != 0.0 {
            (bar.close - vwap) / vwap * 100.0
        } else {
            0.0
        };

        values.push(IndicatorPoint {
            timestamp: bar.timestamp,
            valid: true,
            value,
        });
    }

    IndicatorSeries {
        kind: FeatureKind::VwapDeviation,
        values,
    }
}
