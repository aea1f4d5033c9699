//! Rolling standard deviation of one-bar close-to-close returns.
//!
//! STDDEV(n)[i] = population stddev of r[i-n+1..=i], r[j] = C[j] / C[j-1] - 1.
//! A zero previous close contributes a zero return.
//! Warmup: first n bars are invalid (need n returns).

use crate::domain::indicator::{FeatureKind, IndicatorPoint, IndicatorSeries};
use crate::domain::ohlcv::Bar;

pub fn calculate_return_stddev(bars: &[Bar], period: usize) -> IndicatorSeries {
    let returns: Vec<f64> = bars
        .windows(2)
        .map(|w| {
            if w[0].close != 0.0 {
                w[1].close / w[0].close - 1.0
            } else {
                0.0
            }
        })
        .collect();

    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let valid = period > 0 && i >= period;
            let value = if valid {
                // returns[j] is the return into bar j + 1
                population_stddev(&returns[i - period..i])
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
        kind: FeatureKind::VolatilityRatio,
        values,
    }
}

pub fn population_stddev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}
