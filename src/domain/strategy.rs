//! Strategy configuration: signal choice, exit rules, friction, risk and trading hours.

use crate::domain::error::SimError;
use crate::domain::execution::{ExecutionConfig, ExitRules};
use crate::domain::indicator::FeatureKind;
use crate::domain::risk::RiskConfig;
use chrono::NaiveTime;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Per-feature weights for the weighted-alpha signal. Must sum to 1.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureWeights([f64; FeatureKind::COUNT]);

impl FeatureWeights {
    pub fn new(weights: [f64; FeatureKind::COUNT]) -> Result<Self, SimError> {
        if let Some(kind) = FeatureKind::ALL
            .iter()
            .find(|k| !weights[k.index()].is_finite() || weights[k.index()] < 0.0)
        {
            return Err(SimError::ConfigInvalid {
                section: "strategy".into(),
                key: format!("weight_{}", kind.key()),
                reason: "weight must be a finite, non-negative number".into(),
            });
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(SimError::ConfigInvalid {
                section: "strategy".into(),
                key: "weight_*".into(),
                reason: format!("feature weights must sum to 1.0, got {sum}"),
            });
        }
        Ok(FeatureWeights(weights))
    }

    pub fn get(&self, kind: FeatureKind) -> f64 {
        self.0[kind.index()]
    }
}

impl Default for FeatureWeights {
    fn default() -> Self {
        FeatureWeights([0.2; FeatureKind::COUNT])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignalSpec {
    /// Weighted sum of normalized features compared against the window threshold.
    WeightedAlpha { weights: FeatureWeights, band: f64 },
    /// Raw RSI against fixed upper/lower levels.
    RsiBand { upper: f64, lower: f64 },
}

impl SignalSpec {
    pub fn name(&self) -> &'static str {
        match self {
            SignalSpec::WeightedAlpha { .. } => "weighted_alpha",
            SignalSpec::RsiBand { .. } => "rsi_band",
        }
    }
}

impl Default for SignalSpec {
    fn default() -> Self {
        SignalSpec::WeightedAlpha {
            weights: FeatureWeights::default(),
            band: 0.0,
        }
    }
}

/// Time-of-day interval during which new entries are allowed, inclusive of `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradingWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TradingWindow {
    pub fn contains(&self, time: NaiveTime) -> bool {
        time >= self.start && time < self.end
    }
}

/// Parse `HH:MM-HH:MM,HH:MM-HH:MM`. An empty string means "all day".
pub fn parse_trading_windows(input: &str) -> Result<Vec<TradingWindow>, SimError> {
    let invalid = |reason: String| SimError::ConfigInvalid {
        section: "strategy".into(),
        key: "trading_windows".into(),
        reason,
    };

    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|part| {
            let (start, end) = part
                .split_once('-')
                .ok_or_else(|| invalid(format!("'{part}' is not HH:MM-HH:MM")))?;
            let parse = |s: &str| {
                NaiveTime::parse_from_str(s.trim(), "%H:%M")
                    .map_err(|e| invalid(format!("'{}': {e}", s.trim())))
            };
            let window = TradingWindow {
                start: parse(start)?,
                end: parse(end)?,
            };
            if window.start >= window.end {
                return Err(invalid(format!("'{part}' ends before it starts")));
            }
            Ok(window)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    pub name: String,
    pub signal: SignalSpec,
    pub allow_shorting: bool,
    pub exits: ExitRules,
    pub execution: ExecutionConfig,
    pub risk: RiskConfig,
    /// Empty means entries are allowed at any time of day.
    pub trading_windows: Vec<TradingWindow>,
}

impl Strategy {
    pub fn allows_entry_at(&self, time: NaiveTime) -> bool {
        self.trading_windows.is_empty() || self.trading_windows.iter().any(|w| w.contains(time))
    }
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy {
            name: "default".into(),
            signal: SignalSpec::default(),
            allow_shorting: true,
            exits: ExitRules::default(),
            execution: ExecutionConfig::default(),
            risk: RiskConfig::default(),
            trading_windows: Vec::new(),
        }
    }
}
