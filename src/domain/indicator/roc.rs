//! ROC (Rate of Change) momentum feature.
//!
//! ROC(n)[i] = ((C[i] - C[i-n]) / C[i-n]) * 100
//! If C[i-n] == 0: ROC = 0
//! Warmup: first n bars invalid.

use crate::domain::indicator::{FeatureKind, IndicatorPoint, IndicatorSeries};
use crate::domain::ohlcv::Bar;

pub fn calculate_roc(bars: &[Bar], period: usize) -> IndicatorSeries {
    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let valid = period > 0 && i >= period;
            let value = match valid {
                true if bars[i - period].close != 0.0 => {
                    let prev_close = bars[i - period].close;
                    (bar.close - prev_close) / prev_close * 100.0
                }
                _ => 0.0,
            };
            IndicatorPoint {
                timestamp: bar.timestamp,
                valid,
                value,
            }
        })
        .collect();

    IndicatorSeries {
        kind: FeatureKind::Momentum,
        values,
    }
}
