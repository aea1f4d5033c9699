//! Performance metrics over a trade list and its equity curve.
//!
//! Every metric has a defined value on empty or degenerate input: ratios fall
//! back to 0.0 and the profit factor is capped, so a report never holds NaN.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::portfolio::EquityCurve;
use super::position::{ExitReason, Trade};

pub const PROFIT_FACTOR_CAP: f64 = 999.99;
const STD_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarInterval {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    OneDay,
}

impl BarInterval {
    pub fn minutes(self) -> u32 {
        match self {
            BarInterval::OneMinute => 1,
            BarInterval::FiveMinutes => 5,
            BarInterval::FifteenMinutes => 15,
            BarInterval::ThirtyMinutes => 30,
            BarInterval::OneHour => 60,
            BarInterval::OneDay => 1440,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BarInterval::OneMinute => "1m",
            BarInterval::FiveMinutes => "5m",
            BarInterval::FifteenMinutes => "15m",
            BarInterval::ThirtyMinutes => "30m",
            BarInterval::OneHour => "1h",
            BarInterval::OneDay => "1d",
        }
    }
}

impl fmt::Display for BarInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BarInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1m" => Ok(BarInterval::OneMinute),
            "5m" => Ok(BarInterval::FiveMinutes),
            "15m" => Ok(BarInterval::FifteenMinutes),
            "30m" => Ok(BarInterval::ThirtyMinutes),
            "1h" | "60m" => Ok(BarInterval::OneHour),
            "1d" => Ok(BarInterval::OneDay),
            other => Err(format!("unknown bar interval '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarketCalendar {
    /// 252 sessions of 390 minutes.
    Equities,
    /// Continuous trading, 365 days of 24 hours.
    Crypto,
}

impl MarketCalendar {
    fn days_per_year(self) -> f64 {
        match self {
            MarketCalendar::Equities => 252.0,
            MarketCalendar::Crypto => 365.0,
        }
    }

    fn minutes_per_day(self) -> f64 {
        match self {
            MarketCalendar::Equities => 390.0,
            MarketCalendar::Crypto => 1440.0,
        }
    }

    /// Annualization factor for per-bar returns at `interval`.
    pub fn periods_per_year(self, interval: BarInterval) -> f64 {
        match interval {
            BarInterval::OneDay => self.days_per_year(),
            intraday => {
                self.days_per_year() * self.minutes_per_day() / f64::from(intraday.minutes())
            }
        }
    }
}

impl FromStr for MarketCalendar {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "equities" | "equity" => Ok(MarketCalendar::Equities),
            "crypto" => Ok(MarketCalendar::Crypto),
            other => Err(format!("unknown market calendar '{other}'")),
        }
    }
}

/// Distinguishes "no trades happened" from "trades happened and lost money".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeOutcome {
    NoTrades,
    Profitable,
    Unprofitable,
}

impl fmt::Display for TradeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TradeOutcome::NoTrades => "no_trades",
            TradeOutcome::Profitable => "profitable",
            TradeOutcome::Unprofitable => "unprofitable",
        })
    }
}

/// Annualization and sample-size settings for the ratio metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsConfig {
    pub periods_per_year: f64,
    /// Fewer per-bar returns than this report Sharpe and Sortino as 0.0.
    pub min_samples: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig {
            periods_per_year: MarketCalendar::Equities.periods_per_year(BarInterval::OneMinute),
            min_samples: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceReport {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub total_return_pct: f64,
    pub net_pnl: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    /// Non-positive percentage.
    pub max_drawdown_pct: f64,
    pub max_drawdown_bars: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_trade_pnl_pct: f64,
    /// Mean net P&L per trade in dollars.
    pub expectancy: f64,
    pub avg_r_multiple: f64,
    pub avg_hold_bars: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub exit_reasons: BTreeMap<ExitReason, usize>,
    pub outcome: TradeOutcome,
}

impl PerformanceReport {
    pub fn compute(
        trades: &[Trade],
        equity_curve: &EquityCurve,
        initial_equity: f64,
        config: &MetricsConfig,
    ) -> Self {
        let mut equity = Vec::with_capacity(equity_curve.len() + 1);
        equity.push(initial_equity);
        equity.extend(equity_curve.points().iter().map(|p| p.equity));

        let final_equity = equity.last().copied().unwrap_or(initial_equity);
        let total_return_pct = if initial_equity > 0.0 {
            (final_equity - initial_equity) / initial_equity * 100.0
        } else {
            0.0
        };

        let (max_drawdown_pct, max_drawdown_bars) = compute_drawdown(&equity);
        let returns = period_returns(&equity);
        let (sharpe_ratio, sortino_ratio) = if returns.len() < config.min_samples {
            (0.0, 0.0)
        } else {
            compute_risk_adjusted(&returns, config.periods_per_year)
        };

        let mut winning_trades = 0usize;
        let mut losing_trades = 0usize;
        let mut gross_wins = 0.0_f64;
        let mut gross_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        let mut exit_reasons = BTreeMap::new();

        for trade in trades {
            let pnl = trade.pnl_dollars;
            if pnl > 0.0 {
                winning_trades += 1;
                gross_wins += pnl;
                largest_win = largest_win.max(pnl);
            } else if pnl < 0.0 {
                losing_trades += 1;
                gross_losses += pnl.abs();
                largest_loss = largest_loss.min(pnl);
            }
            *exit_reasons.entry(trade.exit_reason).or_insert(0) += 1;
        }

        let total_trades = trades.len();
        let net_pnl = gross_wins - gross_losses;

        let win_rate = ratio(winning_trades as f64 * 100.0, total_trades);
        let profit_factor = if gross_losses > 0.0 {
            (gross_wins / gross_losses).min(PROFIT_FACTOR_CAP)
        } else if gross_wins > 0.0 {
            PROFIT_FACTOR_CAP
        } else {
            0.0
        };

        let outcome = if total_trades == 0 {
            TradeOutcome::NoTrades
        } else if net_pnl > 0.0 {
            TradeOutcome::Profitable
        } else {
            TradeOutcome::Unprofitable
        };

        PerformanceReport {
            total_trades,
            winning_trades,
            losing_trades,
            total_return_pct,
            net_pnl,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown_pct,
            max_drawdown_bars,
            win_rate,
            profit_factor,
            avg_trade_pnl_pct: ratio(trades.iter().map(|t| t.pnl_pct).sum(), total_trades),
            expectancy: ratio(net_pnl, total_trades),
            avg_r_multiple: ratio(trades.iter().map(|t| t.r_multiple).sum(), total_trades),
            avg_hold_bars: ratio(
                trades.iter().map(|t| t.hold_bars as f64).sum(),
                total_trades,
            ),
            largest_win,
            largest_loss,
            exit_reasons,
            outcome,
        }
    }

    pub fn exit_count(&self, reason: ExitReason) -> usize {
        self.exit_reasons.get(&reason).copied().unwrap_or(0)
    }
}

fn ratio(numerator: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        numerator / count as f64
    }
}

fn period_returns(equity: &[f64]) -> Vec<f64> {
    equity
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

/// Deepest peak-to-trough decline as a non-positive percentage, and its length in bars.
fn compute_drawdown(equity: &[f64]) -> (f64, usize) {
    let Some(&first) = equity.first() else {
        return (0.0, 0);
    };

    let mut peak = first;
    let mut max_dd = 0.0_f64;
    let mut current_bars = 0usize;
    let mut max_bars = 0usize;

    for &value in equity {
        if value >= peak {
            peak = value;
            current_bars = 0;
        } else if peak > 0.0 {
            max_dd = max_dd.min((value - peak) / peak * 100.0);
            current_bars += 1;
            max_bars = max_bars.max(current_bars);
        }
    }

    (max_dd, max_bars)
}

fn compute_risk_adjusted(returns: &[f64], periods_per_year: f64) -> (f64, f64) {
    if returns.is_empty() {
        return (0.0, 0.0);
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    let annualize = periods_per_year.sqrt();

    let sharpe = if stddev > STD_EPSILON {
        mean / stddev * annualize
    } else {
        0.0
    };

    let downside_variance = returns.iter().map(|r| r.min(0.0).powi(2)).sum::<f64>() / n;
    let downside_dev = downside_variance.sqrt();
    let sortino = if downside_dev > STD_EPSILON {
        mean / downside_dev * annualize
    } else {
        0.0
    };

    (sharpe, sortino)
}
