//! Signal generators: raw features plus frozen window statistics in, direction out.
//!
//! Generators are pure. The only statistics they see are the ones a
//! `WalkForwardWindow` froze from its in-sample range.

use crate::domain::indicator::{FeatureKind, FeatureVector};
use crate::domain::position::Direction;
use crate::domain::strategy::{FeatureWeights, SignalSpec};
use crate::domain::walk_forward::NormalizationStats;
use chrono::NaiveDateTime;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signal {
    pub timestamp: NaiveDateTime,
    pub direction: Direction,
    /// Distance of alpha from the decision boundary; zero when flat.
    pub strength: f64,
    pub alpha: f64,
}

pub trait SignalGenerator: Send + Sync {
    fn name(&self) -> &str;

    /// Scalar alpha for one bar.
    fn alpha(&self, features: &FeatureVector, stats: &NormalizationStats) -> f64;

    fn direction(&self, alpha: f64, stats: &NormalizationStats) -> Direction;

    /// Distance from the decision boundary used for `Signal::strength`.
    fn strength(&self, alpha: f64, stats: &NormalizationStats) -> f64 {
        (alpha - stats.threshold).abs()
    }

    fn evaluate(
        &self,
        timestamp: NaiveDateTime,
        features: &FeatureVector,
        stats: &NormalizationStats,
    ) -> Signal {
        let alpha = self.alpha(features, stats);
        let direction = self.direction(alpha, stats);
        let strength = match direction {
            Direction::Flat => 0.0,
            _ => self.strength(alpha, stats),
        };
        Signal {
            timestamp,
            direction,
            strength,
            alpha,
        }
    }
}

/// Weighted sum of min/max-normalized features against the window's median alpha.
#[derive(Debug, Clone)]
pub struct WeightedAlpha {
    weights: FeatureWeights,
    band: f64,
    allow_shorting: bool,
}

impl WeightedAlpha {
    pub fn new(weights: FeatureWeights, band: f64, allow_shorting: bool) -> Self {
        WeightedAlpha {
            weights,
            band: band.max(0.0),
            allow_shorting,
        }
    }
}

impl SignalGenerator for WeightedAlpha {
    fn name(&self) -> &str {
        "weighted_alpha"
    }

    fn alpha(&self, features: &FeatureVector, stats: &NormalizationStats) -> f64 {
        FeatureKind::ALL
            .iter()
            .map(|&kind| self.weights.get(kind) * stats.normalize(kind, features.get(kind)))
            .sum()
    }

    fn direction(&self, alpha: f64, stats: &NormalizationStats) -> Direction {
        if alpha >= stats.threshold + self.band {
            Direction::Long
        } else if self.allow_shorting && alpha <= stats.threshold - self.band {
            Direction::Short
        } else {
            Direction::Flat
        }
    }
}

/// Classic RSI band rule: long above `upper`, short below `lower`.
#[derive(Debug, Clone)]
pub struct RsiBand {
    upper: f64,
    lower: f64,
    allow_shorting: bool,
}

impl RsiBand {
    pub fn new(upper: f64, lower: f64, allow_shorting: bool) -> Self {
        RsiBand {
            upper,
            lower,
            allow_shorting,
        }
    }
}

impl SignalGenerator for RsiBand {
    fn name(&self) -> &str {
        "rsi_band"
    }

    fn alpha(&self, features: &FeatureVector, _stats: &NormalizationStats) -> f64 {
        features.get(FeatureKind::Rsi)
    }

    fn direction(&self, alpha: f64, _stats: &NormalizationStats) -> Direction {
        if alpha > self.upper {
            Direction::Long
        } else if self.allow_shorting && alpha < self.lower {
            Direction::Short
        } else {
            Direction::Flat
        }
    }

    fn strength(&self, alpha: f64, _stats: &NormalizationStats) -> f64 {
        if alpha > self.upper {
            alpha - self.upper
        } else if alpha < self.lower {
            self.lower - alpha
        } else {
            0.0
        }
    }
}

pub fn build_signal_generator(spec: &SignalSpec, allow_shorting: bool) -> Box<dyn SignalGenerator> {
    match spec {
        SignalSpec::WeightedAlpha { weights, band } => {
            Box::new(WeightedAlpha::new(weights.clone(), *band, allow_shorting))
        }
        SignalSpec::RsiBand { upper, lower } => {
            Box::new(RsiBand::new(*upper, *lower, allow_shorting))
        }
    }
}
