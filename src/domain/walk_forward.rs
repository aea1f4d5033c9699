//! Walk-forward window scheduling and per-window normalization.
//!
//! Sessions are split into rolling pairs: N in-sample sessions followed by M
//! out-of-sample sessions, stepping forward by M. Each window's feature ranges
//! and decision threshold are fitted on its in-sample bars only and then frozen
//! for the out-of-sample bars.

use crate::domain::indicator::{FeatureKind, FeatureVector};
use crate::domain::session::Session;
use crate::domain::signal::SignalGenerator;
use std::fmt;
use std::ops::Range;

/// Feature ranges narrower than this normalize to the neutral value.
pub const RANGE_FLOOR: f64 = 1e-6;
pub const NEUTRAL_VALUE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct WalkForwardConfig {
    pub in_sample_sessions: usize,
    pub out_of_sample_sessions: usize,
    /// In-sample bars with complete features required to fit a window.
    pub min_in_sample_bars: usize,
    pub min_oos_bars: usize,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        WalkForwardConfig {
            in_sample_sessions: 5,
            out_of_sample_sessions: 1,
            min_in_sample_bars: 100,
            min_oos_bars: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureRange {
    pub min: f64,
    pub max: f64,
}

impl FeatureRange {
    pub fn is_degenerate(&self) -> bool {
        !(self.max - self.min >= RANGE_FLOOR)
    }

    /// Min/max scale into [0, 1] (values outside the fitted range fall outside it).
    pub fn normalize(&self, value: f64) -> f64 {
        if self.is_degenerate() || !value.is_finite() {
            NEUTRAL_VALUE
        } else {
            (value - self.min) / (self.max - self.min)
        }
    }
}

/// Statistics frozen from one in-sample range.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizationStats {
    pub ranges: [FeatureRange; FeatureKind::COUNT],
    pub threshold: f64,
}

impl NormalizationStats {
    pub fn normalize(&self, kind: FeatureKind, value: f64) -> f64 {
        self.ranges[kind.index()].normalize(value)
    }

    pub fn degenerate_count(&self) -> usize {
        self.ranges.iter().filter(|r| r.is_degenerate()).count()
    }

    /// Fold feature vectors into per-feature min/max. Threshold starts neutral.
    pub fn from_features<'a>(features: impl IntoIterator<Item = &'a FeatureVector>) -> Self {
        let mut ranges = [FeatureRange {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }; FeatureKind::COUNT];

        for vector in features {
            for (range, &value) in ranges.iter_mut().zip(vector.values()) {
                if value.is_finite() {
                    range.min = range.min.min(value);
                    range.max = range.max.max(value);
                }
            }
        }

        for range in ranges.iter_mut() {
            if !range.min.is_finite() || !range.max.is_finite() {
                *range = FeatureRange { min: 0.0, max: 0.0 };
            }
        }

        NormalizationStats {
            ranges,
            threshold: NEUTRAL_VALUE,
        }
    }
}

/// A scheduled window, as bar index ranges into the symbol's bars.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowPlan {
    pub index: usize,
    pub in_sample: Range<usize>,
    pub out_of_sample: Range<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WalkForwardWindow {
    pub index: usize,
    pub in_sample: Range<usize>,
    pub out_of_sample: Range<usize>,
    pub stats: NormalizationStats,
    pub degenerate_features: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSkip {
    InsufficientInSample { bars: usize, minimum: usize },
    InsufficientOutOfSample { bars: usize, minimum: usize },
}

impl fmt::Display for WindowSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowSkip::InsufficientInSample { bars, minimum } => {
                write!(f, "{bars} in-sample feature bars, need {minimum}")
            }
            WindowSkip::InsufficientOutOfSample { bars, minimum } => {
                write!(f, "{bars} out-of-sample bars, need {minimum}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WindowOutcome {
    Fitted(WalkForwardWindow),
    Skipped { plan: WindowPlan, reason: WindowSkip },
}

/// Lay out windows in time order. The last out-of-sample block may be shorter than M.
pub fn schedule_windows(sessions: &[Session], config: &WalkForwardConfig) -> Vec<WindowPlan> {
    let n = config.in_sample_sessions;
    let m = config.out_of_sample_sessions;
    if n == 0 || m == 0 {
        return Vec::new();
    }

    (n..sessions.len())
        .step_by(m)
        .enumerate()
        .map(|(index, i)| {
            let oos_last = (i + m).min(sessions.len()) - 1;
            WindowPlan {
                index,
                in_sample: sessions[i - n].range.start..sessions[i - 1].range.end,
                out_of_sample: sessions[i].range.start..sessions[oos_last].range.end,
            }
        })
        .collect()
}

/// Fit one window from its in-sample features.
///
/// `features` is indexed like the symbol's bars; only the in-sample slice is read.
pub fn fit_window(
    plan: &WindowPlan,
    features: &[Option<FeatureVector>],
    generator: &dyn SignalGenerator,
    config: &WalkForwardConfig,
) -> WindowOutcome {
    let in_sample: Vec<&FeatureVector> = features[plan.in_sample.clone()]
        .iter()
        .flatten()
        .collect();

    if in_sample.len() < config.min_in_sample_bars {
        return WindowOutcome::Skipped {
            plan: plan.clone(),
            reason: WindowSkip::InsufficientInSample {
                bars: in_sample.len(),
                minimum: config.min_in_sample_bars,
            },
        };
    }
    if plan.out_of_sample.len() < config.min_oos_bars {
        return WindowOutcome::Skipped {
            plan: plan.clone(),
            reason: WindowSkip::InsufficientOutOfSample {
                bars: plan.out_of_sample.len(),
                minimum: config.min_oos_bars,
            },
        };
    }

    let mut stats = NormalizationStats::from_features(in_sample.iter().copied());
    let alphas: Vec<f64> = in_sample
        .iter()
        .map(|f| generator.alpha(f, &stats))
        .collect();
    stats.threshold = median(&alphas).unwrap_or(NEUTRAL_VALUE);

    let degenerate_features = stats.degenerate_count();
    WindowOutcome::Fitted(WalkForwardWindow {
        index: plan.index,
        in_sample: plan.in_sample.clone(),
        out_of_sample: plan.out_of_sample.clone(),
        stats,
        degenerate_features,
    })
}

pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::{FeatureConfig, compute_features};
    use crate::domain::ohlcv::Bar;
    use crate::domain::session::split_sessions;
    use crate::domain::signal::WeightedAlpha;
    use crate::domain::strategy::FeatureWeights;
    use chrono::{Duration, NaiveDate};

    /// `days` sessions of `per_day` one-minute bars with a deterministic wiggle.
    fn sessions_of(days: usize, per_day: usize) -> Vec<Bar> {
        let mut bars = Vec::new();
        for d in 0..days {
            let open = NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap()
                + Duration::days(d as i64);
            for m in 0..per_day {
                let k = (d * per_day + m) as f64;
                let close = 100.0 + (k * 0.37).sin() * 2.0 + k * 0.001;
                bars.push(Bar {
                    timestamp: open + Duration::minutes(m as i64),
                    open: close - 0.05,
                    high: close + 0.1,
                    low: close - 0.1,
                    close,
                    volume: 1000.0 + (k * 1.3).cos().abs() * 500.0,
                });
            }
        }
        bars
    }

    fn small_config() -> WalkForwardConfig {
        WalkForwardConfig {
            in_sample_sessions: 2,
            out_of_sample_sessions: 1,
            min_in_sample_bars: 50,
            min_oos_bars: 20,
        }
    }

    fn generator() -> WeightedAlpha {
        WeightedAlpha::new(FeatureWeights::default(), 0.0, true)
    }

    #[test]
    fn degenerate_range_normalizes_to_neutral() {
        let range = FeatureRange { min: 3.0, max: 3.0 + 1e-9 };
        assert!(range.is_degenerate());
        assert_eq!(range.normalize(42.0), NEUTRAL_VALUE);

        let range = FeatureRange { min: 0.0, max: 10.0 };
        assert!((range.normalize(2.5) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn median_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn schedules_rolling_windows_in_time_order() {
        let bars = sessions_of(5, 10);
        let sessions = split_sessions(&bars);
        let plans = schedule_windows(&sessions, &small_config());

        assert_eq!(plans.len(), 3);
        assert_eq!(plans[0].in_sample, 0..20);
        assert_eq!(plans[0].out_of_sample, 20..30);
        assert_eq!(plans[2].in_sample, 20..40);
        assert_eq!(plans[2].out_of_sample, 40..50);
        for pair in plans.windows(2) {
            assert!(pair[0].out_of_sample.start < pair[1].out_of_sample.start);
        }
        for plan in &plans {
            assert_eq!(plan.in_sample.end, plan.out_of_sample.start);
        }
    }

    #[test]
    fn steps_by_out_of_sample_length() {
        let bars = sessions_of(7, 10);
        let sessions = split_sessions(&bars);
        let config = WalkForwardConfig {
            out_of_sample_sessions: 2,
            ..small_config()
        };
        let plans = schedule_windows(&sessions, &config);
        // OOS blocks start at sessions 2, 4, 6; the last holds one session
        assert_eq!(plans.len(), 3);
        assert_eq!(plans[0].out_of_sample, 20..40);
        assert_eq!(plans[2].out_of_sample, 60..70);
    }

    #[test]
    fn too_few_sessions_yields_no_windows() {
        let bars = sessions_of(2, 10);
        let sessions = split_sessions(&bars);
        assert!(schedule_windows(&sessions, &small_config()).is_empty());
    }

    #[test]
    fn skips_window_with_short_in_sample() {
        let bars = sessions_of(3, 30);
        let sessions = split_sessions(&bars);
        let features = compute_features(&bars, &FeatureConfig::default());
        let plans = schedule_windows(&sessions, &small_config());

        // 60 in-sample bars, the first 30 still warming up
        match fit_window(&plans[0], &features, &generator(), &small_config()) {
            WindowOutcome::Skipped { reason, .. } => assert_eq!(
                reason,
                WindowSkip::InsufficientInSample {
                    bars: 30,
                    minimum: 50
                }
            ),
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[test]
    fn fitted_threshold_is_in_sample_median_alpha() {
        let bars = sessions_of(4, 60);
        let sessions = split_sessions(&bars);
        let features = compute_features(&bars, &FeatureConfig::default());
        let plans = schedule_windows(&sessions, &small_config());
        let generator = generator();

        let WindowOutcome::Fitted(window) =
            fit_window(&plans[1], &features, &generator, &small_config())
        else {
            panic!("window should fit");
        };

        let in_sample: Vec<&FeatureVector> =
            features[window.in_sample.clone()].iter().flatten().collect();
        let alphas: Vec<f64> = in_sample
            .iter()
            .map(|f| generator.alpha(f, &window.stats))
            .collect();
        assert_eq!(Some(window.stats.threshold), median(&alphas));

        for f in &in_sample {
            for kind in FeatureKind::ALL {
                let n = window.stats.normalize(kind, f.get(kind));
                assert!((0.0..=1.0).contains(&n));
            }
        }
    }

    #[test]
    fn out_of_sample_bars_do_not_affect_stats() {
        let bars = sessions_of(4, 60);
        let sessions = split_sessions(&bars);
        let config = FeatureConfig::default();
        let plans = schedule_windows(&sessions, &small_config());
        let plan = &plans[1];

        let baseline_features = compute_features(&bars, &config);
        let baseline = fit_window(plan, &baseline_features, &generator(), &small_config());

        let mut perturbed = bars.clone();
        for bar in &mut perturbed[plan.out_of_sample.start..] {
            bar.close *= 3.0;
            bar.high *= 3.0;
            bar.volume *= 10.0;
        }
        let perturbed_features = compute_features(&perturbed, &config);
        let after = fit_window(plan, &perturbed_features, &generator(), &small_config());

        assert_eq!(baseline, after);
    }
}
