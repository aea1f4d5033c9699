//! RSI (Relative Strength Index) over closing prices.
//!
//! Wilder's smoothing: the first average is the simple mean of the first n
//! changes, then avg = (prev_avg * (n-1) + current) / n.
//!
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss). A window with no losses reads
//! 100, no gains reads 0, and no movement at all reads a neutral 50.
//!
//! Warmup: first n bars are invalid (need n price changes).

use crate::domain::indicator::{FeatureKind, IndicatorPoint, IndicatorSeries};
use crate::domain::ohlcv::Bar;

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    match (avg_gain > 0.0, avg_loss > 0.0) {
        (false, false) => 50.0,
        (true, false) => 100.0,
        (false, true) => 0.0,
        (true, true) => 100.0 - 100.0 / (1.0 + avg_gain / avg_loss),
    }
}

pub fn calculate_rsi(bars: &[Bar], period: usize) -> IndicatorSeries {
    let mut values = Vec::with_capacity(bars.len());
    let mut sum_gain = 0.0;
    let mut sum_loss = 0.0;
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;

    for (i, bar) in bars.iter().enumerate() {
        let mut point = IndicatorPoint {
            timestamp: bar.timestamp,
            valid: false,
            value: 0.0,
        };

        if i > 0 && period > 0 {
            let change = bar.close - bars[i - 1].close;
            let gain = change.max(0.0);
            let loss = (-change).max(0.0);
            let n = period as f64;

            if i < period {
                sum_gain += gain;
                sum_loss += loss;
            } else if i == period {
                avg_gain = (sum_gain + gain) / n;
                avg_loss = (sum_loss + loss) / n;
            } else {
                avg_gain = (avg_gain * (n - 1.0) + gain) / n;
                avg_loss = (avg_loss * (n - 1.0) + loss) / n;
            }

            if i >= period {
                point.valid = true;
                point.value = rsi_from_averages(avg_gain, avg_loss);
            }
        }

        values.push(point);
    }

    IndicatorSeries {
        kind: FeatureKind::Rsi,
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::minute_bars;

    #[test]
    fn rsi_empty_bars() {
        let series = calculate_rsi(&[], 14);
        assert!(series.values.is_empty());
        assert_eq!(series.kind, FeatureKind::Rsi);
    }

    #[test]
    fn rsi_warmup_period() {
        let closes: Vec<f64> = (1..=15).map(|i| 100.0 + (i % 5) as f64 * 2.0).collect();
        let series = calculate_rsi(&minute_bars(&closes), 14);

        assert_eq!(series.values.len(), 15);
        for i in 0..14 {
            assert!(!series.values[i].valid, "bar {} should be invalid", i);
        }
        assert!(series.values[14].valid);
    }

    #[test]
    fn rsi_all_gains() {
        let closes: Vec<f64> = (0..15).map(|i| 100.0 + i as f64).collect();
        let series = calculate_rsi(&minute_bars(&closes), 14);
        assert!((series.values[14].value - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_all_losses() {
        let closes: Vec<f64> = (0..15).map(|i| 100.0 - i as f64).collect();
        let series = calculate_rsi(&minute_bars(&closes), 14);
        assert!(series.values[14].value.abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_flat_prices_are_neutral() {
        let series = calculate_rsi(&minute_bars(&[100.0; 20]), 14);
        assert!((series.values[19].value - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_alternating_moves_stay_near_fifty() {
        let closes: Vec<f64> = (0..40)
            .map(|i| if i % 2 == 0 { 100.0 } else { 100.1 })
            .collect();
        let series = calculate_rsi(&minute_bars(&closes), 14);
        for point in series.values.iter().filter(|p| p.valid) {
            assert!(point.value > 45.0 && point.value < 55.0, "rsi {}", point.value);
        }
    }

    #[test]
    fn rsi_zero_period_is_never_valid() {
        let series = calculate_rsi(&minute_bars(&[100.0, 101.0]), 0);
        assert!(series.values.iter().all(|p| !p.valid));
    }

    #[test]
    fn rsi_known_calculation() {
        let closes = [
            44.0, 44.25, 44.50, 43.75, 44.50, 44.25, 44.75, 45.25, 45.50, 45.25, 45.50, 46.0,
            46.25, 46.0, 46.50,
        ];
        let series = calculate_rsi(&minute_bars(&closes), 14);

        // gains 4.0, losses 1.5 over 14 changes → RS = 8/3
        assert!(series.values[14].valid);
        let expected = 100.0 - 100.0 / (1.0 + 8.0 / 3.0);
        assert!((series.values[14].value - expected).abs() < 1e-9);
    }
}
