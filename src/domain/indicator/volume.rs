//! Volume z-score against the trailing lookback window.
//!
//! Z[i] = (V[i] - mean(V[i-n..i])) / stddev(V[i-n..i]); the current bar is
//! excluded from its own baseline. A flat baseline (stddev 0) reads 0.
//! Warmup: first n bars invalid.

use crate::domain::indicator::stddev::population_stddev;
use crate::domain::indicator::{FeatureKind, IndicatorPoint, IndicatorSeries};
use crate::domain::ohlcv::Bar;

pub fn calculate_volume_zscore(bars: &[Bar], lookback: usize) -> IndicatorSeries {
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let valid = lookback > 0 && i >= lookback;
            let value = if valid {
                let window = &volumes[i - lookback..i];
                let mean = window.iter().sum::<f64>() / lookback as f64;
                let sd = population_stddev(window);
                if sd > 0.0 { (bar.volume - mean) / sd } else { 0.0 }
            } else {
                0.0
            };
            IndicatorPoint {
                timestamp: bar.timestamp,
                valid,
                value,
            }
        })
        .collect();

    IndicatorSeries {
        kind: FeatureKind::VolumeZscore,
        values,
    }
}
