//! Walk-forward backtest driver for one symbol and one strategy.
//!
//! Features are computed once over the whole bar series (each value only sees
//! bars at or before its own), windows are fitted in time order, and the
//! out-of-sample bars of every fitted window are replayed through a single
//! position state machine. Equity carries over from window to window.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use tracing::{debug, info};

use super::execution::BarContext;
use super::indicator::{FeatureConfig, FeatureVector, compute_features};
use super::metrics::{BarInterval, MarketCalendar, MetricsConfig, PerformanceReport};
use super::portfolio::{EquityCurve, Portfolio};
use super::position::{Direction, Trade};
use super::risk::RiskRejection;
use super::session::SymbolData;
use super::signal::{SignalGenerator, build_signal_generator};
use super::state_machine::PositionStateMachine;
use super::strategy::Strategy;
use super::walk_forward::{
    WalkForwardConfig, WalkForwardWindow, WindowOutcome, fit_window, schedule_windows,
};

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_equity: f64,
    pub walk_forward: WalkForwardConfig,
    pub features: FeatureConfig,
    pub interval: BarInterval,
    pub calendar: MarketCalendar,
    pub min_sharpe_samples: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_equity: 100_000.0,
            walk_forward: WalkForwardConfig::default(),
            features: FeatureConfig::default(),
            interval: BarInterval::OneMinute,
            calendar: MarketCalendar::Equities,
            min_sharpe_samples: 10,
        }
    }
}

impl BacktestConfig {
    pub fn metrics(&self) -> MetricsConfig {
        MetricsConfig {
            periods_per_year: self.calendar.periods_per_year(self.interval),
            min_samples: self.min_sharpe_samples,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStatus {
    Traded,
    Skipped,
}

/// One row per scheduled window, fitted or not.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSummary {
    pub index: usize,
    pub oos_start: NaiveDateTime,
    pub oos_end: NaiveDateTime,
    pub status: WindowStatus,
    /// Set for skipped windows.
    pub skip_reason: Option<String>,
    pub threshold: Option<f64>,
    pub degenerate_features: usize,
    pub trades: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolResult {
    pub symbol: String,
    pub strategy: String,
    pub trades: Vec<Trade>,
    pub equity_curve: EquityCurve,
    pub windows: Vec<WindowSummary>,
    pub rejections: HashMap<RiskRejection, usize>,
    pub report: PerformanceReport,
}

impl SymbolResult {
    pub fn windows_traded(&self) -> usize {
        self.windows
            .iter()
            .filter(|w| w.status == WindowStatus::Traded)
            .count()
    }

    pub fn windows_skipped(&self) -> usize {
        self.windows.len() - self.windows_traded()
    }
}

/// Run the full walk-forward simulation for one symbol.
pub fn run_symbol(data: &SymbolData, strategy: &Strategy, config: &BacktestConfig) -> SymbolResult {
    let features = compute_features(&data.bars, &config.features);
    let generator = build_signal_generator(&strategy.signal, strategy.allow_shorting);
    let plans = schedule_windows(&data.sessions, &config.walk_forward);

    let mut portfolio = Portfolio::new(config.initial_equity);
    let mut machine = PositionStateMachine::new(data.symbol.clone(), strategy);
    let mut windows = Vec::with_capacity(plans.len());

    for plan in &plans {
        let oos_start = data.bars[plan.out_of_sample.start].timestamp;
        let oos_end = data.bars[plan.out_of_sample.end - 1].timestamp;

        match fit_window(plan, &features, generator.as_ref(), &config.walk_forward) {
            WindowOutcome::Skipped { reason, .. } => {
                debug!(
                    symbol = %data.symbol,
                    window = plan.index,
                    start = %oos_start,
                    %reason,
                    "window skipped"
                );
                windows.push(WindowSummary {
                    index: plan.index,
                    oos_start,
                    oos_end,
                    status: WindowStatus::Skipped,
                    skip_reason: Some(reason.to_string()),
                    threshold: None,
                    degenerate_features: 0,
                    trades: 0,
                });
            }
            WindowOutcome::Fitted(window) => {
                if window.degenerate_features > 0 {
                    debug!(
                        symbol = %data.symbol,
                        window = window.index,
                        degenerate = window.degenerate_features,
                        "features with flat in-sample range normalized to neutral"
                    );
                }
                let trades = simulate_window(
                    data,
                    &window,
                    &features,
                    generator.as_ref(),
                    &mut machine,
                    &mut portfolio,
                );
                windows.push(WindowSummary {
                    index: window.index,
                    oos_start,
                    oos_end,
                    status: WindowStatus::Traded,
                    skip_reason: None,
                    threshold: Some(window.stats.threshold),
                    degenerate_features: window.degenerate_features,
                    trades,
                });
            }
        }
    }

    let report = PerformanceReport::compute(
        &portfolio.closed_trades,
        &portfolio.equity_curve,
        config.initial_equity,
        &config.metrics(),
    );

    info!(
        symbol = %data.symbol,
        strategy = %strategy.name,
        windows = windows.len(),
        trades = report.total_trades,
        return_pct = report.total_return_pct,
        sharpe = report.sharpe_ratio,
        "backtest complete"
    );

    SymbolResult {
        symbol: data.symbol.clone(),
        strategy: strategy.name.clone(),
        rejections: machine.rejections().clone(),
        trades: portfolio.closed_trades,
        equity_curve: portfolio.equity_curve,
        windows,
        report,
    }
}

/// Replay one window's out-of-sample bars. Returns the number of trades closed.
fn simulate_window(
    data: &SymbolData,
    window: &WalkForwardWindow,
    features: &[Option<FeatureVector>],
    generator: &dyn SignalGenerator,
    machine: &mut PositionStateMachine<'_>,
    portfolio: &mut Portfolio,
) -> usize {
    machine.begin_window();
    let mut closed = 0;
    let last = window.out_of_sample.end - 1;
    let session_ends: Vec<usize> = data
        .sessions
        .iter()
        .map(|s| s.range.end - 1)
        .filter(|end| window.out_of_sample.contains(end))
        .collect();

    for i in window.out_of_sample.clone() {
        let bar = &data.bars[i];
        let signal = features[i]
            .as_ref()
            .map(|f| generator.evaluate(bar.timestamp, f, &window.stats).direction)
            .unwrap_or(Direction::Flat);
        let ctx = BarContext {
            bar,
            bar_index: i,
            signal,
            is_last_bar: i == last || session_ends.binary_search(&i).is_ok(),
        };
        if machine.on_bar(&ctx, portfolio).is_some() {
            closed += 1;
        }
    }

    let ctx = BarContext {
        bar: &data.bars[last],
        bar_index: last,
        signal: Direction::Flat,
        is_last_bar: true,
    };
    if machine.force_close(&ctx, portfolio).is_some() {
        closed += 1;
    }
    closed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::Bar;
    use crate::domain::position::ExitReason;
    use crate::domain::strategy::SignalSpec;
    use chrono::{Duration, NaiveDate};

    fn trending_sessions(days: usize, per_day: usize) -> SymbolData {
        let mut bars = Vec::new();
        for d in 0..days {
            let open = NaiveDate::from_ymd_opt(2024, 3, 4)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap()
                + Duration::days(d as i64);
            for m in 0..per_day {
                let k = (d * per_day + m) as f64;
                let close = 100.0 + (k * 0.21).sin() * 1.5 + (k * 0.05).cos() * 0.8;
                bars.push(Bar {
                    timestamp: open + Duration::minutes(m as i64),
                    open: close - 0.02,
                    high: close + 0.15,
                    low: close - 0.15,
                    close,
                    volume: 1000.0 + (k * 0.7).sin().abs() * 800.0,
                });
            }
        }
        SymbolData::new("TEST".into(), bars)
    }

    fn config() -> BacktestConfig {
        BacktestConfig {
            walk_forward: WalkForwardConfig {
                in_sample_sessions: 2,
                out_of_sample_sessions: 1,
                min_in_sample_bars: 100,
                min_oos_bars: 50,
            },
            ..Default::default()
        }
    }

    #[test]
    fn produces_trades_inside_out_of_sample_windows() {
        let data = trending_sessions(5, 120);
        let result = run_symbol(&data, &Strategy::default(), &config());

        assert_eq!(result.windows.len(), 3);
        assert_eq!(result.windows_traded(), 3);
        assert!(!result.trades.is_empty());

        let first_oos = result.windows[0].oos_start;
        for trade in &result.trades {
            assert!(trade.entry_time >= first_oos);
            assert!(trade.exit_time > trade.entry_time);
            // a trade never spans two windows
            assert!(result.windows.iter().any(|w| {
                trade.entry_time >= w.oos_start && trade.exit_time <= w.oos_end
            }));
        }
        let per_window: usize = result.windows.iter().map(|w| w.trades).sum();
        assert_eq!(per_window, result.trades.len());
        assert_eq!(result.report.total_trades, result.trades.len());
    }

    #[test]
    fn window_end_closes_open_positions() {
        let data = trending_sessions(4, 120);
        // long-only with a distant stop: the only way out is the window end
        let strategy = Strategy {
            allow_shorting: false,
            exits: crate::domain::execution::ExitRules {
                stop_loss_pct: 50.0,
                take_profit_pct: 0.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let result = run_symbol(&data, &strategy, &config());
        assert!(!result.trades.is_empty());
        assert!(result.trades.iter().all(|t| t.exit_reason == ExitReason::Eod));
    }

    #[test]
    fn positions_close_at_every_session_end() {
        let data = trending_sessions(6, 120);
        let strategy = Strategy {
            allow_shorting: false,
            exits: crate::domain::execution::ExitRules {
                stop_loss_pct: 50.0,
                take_profit_pct: 0.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut config = config();
        config.walk_forward.out_of_sample_sessions = 2;

        let result = run_symbol(&data, &strategy, &config);
        assert!(!result.trades.is_empty());
        let session_close = data.bars[119].timestamp.time();
        for trade in &result.trades {
            assert_eq!(trade.entry_time.date(), trade.exit_time.date());
            assert!(trade.entry_time.time() < session_close);
            if trade.exit_reason == ExitReason::Eod {
                assert_eq!(trade.exit_time.time(), session_close);
            }
        }
    }

    #[test]
    fn short_history_yields_no_trades() {
        let data = trending_sessions(2, 120);
        let result = run_symbol(&data, &Strategy::default(), &config());
        assert!(result.windows.is_empty());
        assert!(result.trades.is_empty());
        assert!(result.equity_curve.is_empty());
        assert_eq!(result.report.total_trades, 0);
    }

    #[test]
    fn thin_windows_are_skipped() {
        let data = trending_sessions(4, 40);
        let result = run_symbol(&data, &Strategy::default(), &config());
        assert_eq!(result.windows.len(), 2);
        assert_eq!(result.windows_skipped(), 2);
        assert!(result.trades.is_empty());
        assert!(result.windows[0].skip_reason.is_some());
    }

    #[test]
    fn rsi_band_strategy_runs() {
        let data = trending_sessions(5, 120);
        let strategy = Strategy {
            name: "rsi".into(),
            signal: SignalSpec::RsiBand {
                upper: 55.0,
                lower: 45.0,
            },
            ..Default::default()
        };
        let result = run_symbol(&data, &strategy, &config());
        assert_eq!(result.strategy, "rsi");
        for trade in &result.trades {
            assert!(trade.exit_time > trade.entry_time);
        }
    }

    #[test]
    fn identical_inputs_give_identical_results() {
        let data = trending_sessions(5, 120);
        let a = run_symbol(&data, &Strategy::default(), &config());
        let b = run_symbol(&data, &Strategy::default(), &config());
        assert_eq!(a.trades, b.trades);
        assert_eq!(a.report, b.report);
    }
}
