//! Raw feature indicators feeding the signal generators.
//!
//! Every indicator value at bar `i` is a function of bars `0..=i` only, so a
//! feature series can be computed once for a whole symbol without leaking
//! future bars into any walk-forward window.
//!
//! - `IndicatorPoint`: a single point in an indicator time series
//! - `IndicatorSeries`: a time series tagged with the feature it measures
//! - `FeatureKind`: the closed set of raw features
//! - `FeatureVector`: one raw value per feature for a single bar

pub mod roc;
pub mod rsi;
pub mod stddev;
pub mod volume;
pub mod vwap;

use crate::domain::ohlcv::Bar;
use chrono::NaiveDateTime;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub timestamp: NaiveDateTime,
    pub valid: bool,
    pub value: f64,
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub kind: FeatureKind,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    pub fn value_at(&self, index: usize) -> Option<f64> {
        self.values
            .get(index)
            .filter(|p| p.valid && p.value.is_finite())
            .map(|p| p.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureKind {
    Rsi,
    VolumeZscore,
    VwapDeviation,
    VolatilityRatio,
    Momentum,
}

impl FeatureKind {
    pub const COUNT: usize = 5;

    pub const ALL: [FeatureKind; FeatureKind::COUNT] = [
        FeatureKind::Rsi,
        FeatureKind::VolumeZscore,
        FeatureKind::VwapDeviation,
        FeatureKind::VolatilityRatio,
        FeatureKind::Momentum,
    ];

    pub fn index(self) -> usize {
        match self {
            FeatureKind::Rsi => 0,
            FeatureKind::VolumeZscore => 1,
            FeatureKind::VwapDeviation => 2,
            FeatureKind::VolatilityRatio => 3,
            FeatureKind::Momentum => 4,
        }
    }

    /// Key used for this feature in configuration files.
    pub fn key(self) -> &'static str {
        match self {
            FeatureKind::Rsi => "rsi",
            FeatureKind::VolumeZscore => "volume_zscore",
            FeatureKind::VwapDeviation => "vwap_deviation",
            FeatureKind::VolatilityRatio => "volatility_ratio",
            FeatureKind::Momentum => "momentum",
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for FeatureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        FeatureKind::ALL
            .into_iter()
            .find(|k| k.key() == wanted)
            .ok_or_else(|| format!("unknown feature '{}'", s.trim()))
    }
}

/// Raw (un-normalized) feature values for one bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector([f64; FeatureKind::COUNT]);

impl FeatureVector {
    pub fn new(values: [f64; FeatureKind::COUNT]) -> Self {
        Self(values)
    }

    pub fn get(&self, kind: FeatureKind) -> f64 {
        self.0[kind.index()]
    }

    pub fn values(&self) -> &[f64; FeatureKind::COUNT] {
        &self.0
    }
}

/// Lookback periods for the feature pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureConfig {
    pub rsi_period: usize,
    pub volume_lookback: usize,
    pub vol_short: usize,
    pub vol_long: usize,
    pub momentum_period: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        FeatureConfig {
            rsi_period: 14,
            volume_lookback: 20,
            vol_short: 5,
            vol_long: 30,
            momentum_period: 10,
        }
    }
}

impl FeatureConfig {
    /// Bars needed before every feature is valid.
    pub fn warmup_bars(&self) -> usize {
        self.rsi_period
            .max(self.volume_lookback)
            .max(self.vol_long)
            .max(self.momentum_period)
    }
}

/// Compute one feature vector per bar; `None` until every feature has warmed up.
pub fn compute_features(bars: &[Bar], config: &FeatureConfig) -> Vec<Option<FeatureVector>> {
    let rsi = rsi::calculate_rsi(bars, config.rsi_period);
    let volume = volume::calculate_volume_zscore(bars, config.volume_lookback);
    let vwap = vwap::calculate_vwap_deviation(bars);
    let vol_short = stddev::calculate_return_stddev(bars, config.vol_short);
    let vol_long = stddev::calculate_return_stddev(bars, config.vol_long);
    let momentum = roc::calculate_roc(bars, config.momentum_period);

    (0..bars.len())
        .map(|i| {
            let short = vol_short.value_at(i)?;
            let long = vol_long.value_at(i)?;
            let ratio = if long > 0.0 { short / long } else { 1.0 };
            Some(FeatureVector::new([
                rsi.value_at(i)?,
                volume.value_at(i)?,
                vwap.value_at(i)?,
                ratio,
                momentum.value_at(i)?,
            ]))
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::test_support::minute_bars;
    use super::*;

    #[test]
    fn feature_kind_round_trips_through_key() {
        for kind in FeatureKind::ALL {
            assert_eq!(kind.key().parse::<FeatureKind>().unwrap(), kind);
        }
        assert!("macd".parse::<FeatureKind>().is_err());
    }

    #[test]
    fn feature_kind_indices_are_dense() {
        for (i, kind) in FeatureKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn compute_features_respects_warmup() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.7).sin()).collect();
        let bars = minute_bars(&closes);
        let config = FeatureConfig::default();
        let features = compute_features(&bars, &config);

        assert_eq!(features.len(), bars.len());
        assert!(features[..config.warmup_bars()].iter().all(|f| f.is_none()));
        assert!(features[config.warmup_bars()..].iter().all(|f| f.is_some()));
    }

    #[test]
    fn compute_features_ignores_future_bars() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + (i as f64 * 0.3).cos()).collect();
        let bars = minute_bars(&closes);
        let config = FeatureConfig::default();
        let full = compute_features(&bars, &config);
        let prefix = compute_features(&bars[..50], &config);

        assert_eq!(&full[..50], &prefix[..]);
    }

    #[test]
    fn flat_prices_give_neutral_volatility_ratio() {
        let bars = minute_bars(&[100.0; 40]);
        let features = compute_features(&bars, &FeatureConfig::default());
        let last = features.last().unwrap().unwrap();
        assert!((last.get(FeatureKind::VolatilityRatio) - 1.0).abs() < f64::EPSILON);
    }
}
