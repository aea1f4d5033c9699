//! Parallel batch runner and parameter grid expansion.
//!
//! Every (symbol, strategy) pair is an independent job with its own state
//! machine and equity curve. Jobs run on the rayon pool and report back over an
//! `mpsc` channel; results are re-ordered by job index so the output does not
//! depend on scheduling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;

use rayon::prelude::*;
use tracing::{debug, info};

use super::backtest::{BacktestConfig, SymbolResult, run_symbol};
use super::error::SimError;
use super::session::SymbolData;
use super::strategy::{SignalSpec, Strategy};
use super::universe::{SkippedSymbol, Universe};

#[derive(Debug)]
pub struct JobResult {
    pub index: usize,
    pub symbol: String,
    pub strategy: String,
    pub outcome: Result<Box<SymbolResult>, SimError>,
}

#[derive(Debug)]
pub struct BatchReport {
    pub results: Vec<JobResult>,
    pub skipped: Vec<SkippedSymbol>,
}

impl BatchReport {
    pub fn completed(&self) -> impl Iterator<Item = &SymbolResult> {
        self.results
            .iter()
            .filter_map(|r| r.outcome.as_ref().ok().map(|b| b.as_ref()))
    }

    pub fn cancelled_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, Err(SimError::Cancelled)))
            .count()
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled_count() > 0
    }

    /// Completed runs, best Sharpe first. Ties fall back to total return, then job order.
    pub fn ranked_by_sharpe(&self) -> Vec<&SymbolResult> {
        let mut ranked: Vec<&SymbolResult> = self.completed().collect();
        ranked.sort_by(|a, b| {
            b.report
                .sharpe_ratio
                .total_cmp(&a.report.sharpe_ratio)
                .then_with(|| b.report.total_return_pct.total_cmp(&a.report.total_return_pct))
        });
        ranked
    }
}

/// Run every strategy against every loaded symbol.
///
/// `cancel` is checked before each job starts; jobs that never start report
/// `SimError::Cancelled`. A started job always runs to completion.
pub fn run_batch(
    universe: &Universe,
    strategies: &[Strategy],
    config: &BacktestConfig,
    cancel: &AtomicBool,
) -> BatchReport {
    let jobs: Vec<(usize, &SymbolData, &Strategy)> = universe
        .symbols
        .iter()
        .flat_map(|data| strategies.iter().map(move |s| (data, s)))
        .enumerate()
        .map(|(index, (data, strategy))| (index, data, strategy))
        .collect();

    info!(
        jobs = jobs.len(),
        symbols = universe.count(),
        strategies = strategies.len(),
        "starting batch"
    );

    let (tx, rx) = mpsc::channel();
    jobs.par_iter()
        .for_each_with(tx, |tx, &(index, data, strategy)| {
            let outcome = if cancel.load(Ordering::Relaxed) {
                debug!(index, symbol = %data.symbol, "job cancelled before start");
                Err(SimError::Cancelled)
            } else {
                Ok(Box::new(run_symbol(data, strategy, config)))
            };
            let _ = tx.send(JobResult {
                index,
                symbol: data.symbol.clone(),
                strategy: strategy.name.clone(),
                outcome,
            });
        });

    let mut results: Vec<JobResult> = rx.into_iter().collect();
    results.sort_by_key(|r| r.index);

    let report = BatchReport {
        results,
        skipped: universe.skipped.clone(),
    };
    info!(
        completed = report.completed().count(),
        cancelled = report.cancelled_count(),
        skipped_symbols = report.skipped.len(),
        "batch finished"
    );
    report
}

/// Value lists to sweep. An empty list keeps the base strategy's value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamGrid {
    pub stop_loss_pct: Vec<f64>,
    pub take_profit_pct: Vec<f64>,
    pub trailing_stop_pct: Vec<f64>,
    pub max_hold_bars: Vec<usize>,
    pub alpha_band: Vec<f64>,
}

impl ParamGrid {
    pub fn is_empty(&self) -> bool {
        self.stop_loss_pct.is_empty()
            && self.take_profit_pct.is_empty()
            && self.trailing_stop_pct.is_empty()
            && self.max_hold_bars.is_empty()
            && self.alpha_band.is_empty()
    }

    /// Cartesian product over `base`, dropping combinations without a positive stop.
    /// A zero target means no take-profit.
    pub fn expand(&self, base: &Strategy) -> Vec<Strategy> {
        let or_base = |values: &[f64], fallback: f64| {
            if values.is_empty() {
                vec![fallback]
            } else {
                values.to_vec()
            }
        };

        let stops = or_base(&self.stop_loss_pct, base.exits.stop_loss_pct);
        let targets = or_base(&self.take_profit_pct, base.exits.take_profit_pct);
        let trails = or_base(&self.trailing_stop_pct, base.exits.trailing_stop_pct);
        let holds = if self.max_hold_bars.is_empty() {
            vec![base.exits.max_hold_bars]
        } else {
            self.max_hold_bars.clone()
        };
        let bands = match &base.signal {
            SignalSpec::WeightedAlpha { band, .. } => or_base(&self.alpha_band, *band),
            SignalSpec::RsiBand { .. } => vec![0.0],
        };

        let mut expanded = Vec::new();
        for &stop in &stops {
            for &target in &targets {
                if stop <= 0.0 || target < 0.0 {
                    continue;
                }
                for &trail in &trails {
                    for &hold in &holds {
                        for &band in &bands {
                            expanded.push(variant(base, stop, target, trail, hold, band));
                        }
                    }
                }
            }
        }
        expanded
    }
}

fn variant(
    base: &Strategy,
    stop: f64,
    target: f64,
    trail: f64,
    hold: usize,
    band: f64,
) -> Strategy {
    let mut strategy = base.clone();
    strategy.exits.stop_loss_pct = stop;
    strategy.exits.take_profit_pct = target;
    strategy.exits.trailing_stop_pct = trail;
    strategy.exits.max_hold_bars = hold;

    let mut name = format!("{}[sl={stop},tp={target},trail={trail},hold={hold}", base.name);
    if let SignalSpec::WeightedAlpha { band: b, .. } = &mut strategy.signal {
        *b = band;
        name.push_str(&format!(",band={band}"));
    }
    name.push(']');
    strategy.name = name;
    strategy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::execution::ExitRules;
    use crate::domain::ohlcv::Bar;
    use crate::domain::universe::SkipReason;
    use crate::domain::walk_forward::WalkForwardConfig;
    use chrono::{Duration, NaiveDate};

    fn symbol(name: &str, phase: f64) -> SymbolData {
        let mut bars = Vec::new();
        for d in 0..4 {
            let open = NaiveDate::from_ymd_opt(2024, 5, 6)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap()
                + Duration::days(d);
            for m in 0..90 {
                let k = (d * 90 + m) as f64;
                let close = 50.0 + (k * 0.3 + phase).sin();
                bars.push(Bar {
                    timestamp: open + Duration::minutes(m),
                    open: close,
                    high: close + 0.05,
                    low: close - 0.05,
                    close,
                    volume: 500.0 + (k * 0.9).cos().abs() * 300.0,
                });
            }
        }
        SymbolData::new(name.into(), bars)
    }

    fn universe() -> Universe {
        Universe {
            symbols: vec![symbol("AAA", 0.0), symbol("BBB", 1.3)],
            skipped: vec![SkippedSymbol {
                symbol: "CCC".into(),
                reason: SkipReason::MissingFeed,
            }],
        }
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

    fn strategies() -> Vec<Strategy> {
        ParamGrid {
            stop_loss_pct: vec![0.2, 0.5],
            ..Default::default()
        }
        .expand(&Strategy::default())
    }

    #[test]
    fn one_result_per_job_in_job_order() {
        let report = run_batch(&universe(), &strategies(), &config(), &AtomicBool::new(false));
        assert_eq!(report.results.len(), 4);
        let order: Vec<(usize, &str)> = report
            .results
            .iter()
            .map(|r| (r.index, r.symbol.as_str()))
            .collect();
        assert_eq!(order, vec![(0, "AAA"), (1, "AAA"), (2, "BBB"), (3, "BBB")]);
        assert_eq!(report.completed().count(), 4);
        assert_eq!(report.skipped.len(), 1);
        assert!(!report.was_cancelled());
    }

    #[test]
    fn batch_matches_sequential_runs() {
        let universe = universe();
        let strategies = strategies();
        let report = run_batch(&universe, &strategies, &config(), &AtomicBool::new(false));
        let sequential = run_symbol(&universe.symbols[1], &strategies[0], &config());
        let parallel = report.results[2].outcome.as_ref().unwrap();
        assert_eq!(parallel.trades, sequential.trades);
        assert_eq!(parallel.report, sequential.report);
    }

    #[test]
    fn cancelled_batch_reports_every_job() {
        let report = run_batch(&universe(), &strategies(), &config(), &AtomicBool::new(true));
        assert_eq!(report.results.len(), 4);
        assert_eq!(report.cancelled_count(), 4);
        assert_eq!(report.completed().count(), 0);
    }

    #[test]
    fn ranking_is_descending_by_sharpe() {
        let report = run_batch(&universe(), &strategies(), &config(), &AtomicBool::new(false));
        let ranked = report.ranked_by_sharpe();
        assert_eq!(ranked.len(), 4);
        for pair in ranked.windows(2) {
            assert!(pair[0].report.sharpe_ratio >= pair[1].report.sharpe_ratio);
        }
    }

    #[test]
    fn grid_expands_cartesian_product() {
        let grid = ParamGrid {
            stop_loss_pct: vec![0.1, 0.2],
            take_profit_pct: vec![0.2, 0.4, 0.6],
            max_hold_bars: vec![0, 30],
            ..Default::default()
        };
        let expanded = grid.expand(&Strategy::default());
        assert_eq!(expanded.len(), 12);
        assert!(expanded.iter().all(|s| s.name.starts_with("default[")));
        let mut names: Vec<&str> = expanded.iter().map(|s| s.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 12);
    }

    #[test]
    fn grid_skips_non_positive_stop() {
        let grid = ParamGrid {
            stop_loss_pct: vec![0.0, 0.2],
            take_profit_pct: vec![0.0, 0.3],
            ..Default::default()
        };
        let expanded = grid.expand(&Strategy::default());
        assert_eq!(expanded.len(), 2);
        assert!(expanded.iter().all(|s| s.exits.stop_loss_pct == 0.2));
        let targets: Vec<f64> = expanded.iter().map(|s| s.exits.take_profit_pct).collect();
        assert_eq!(targets, vec![0.0, 0.3]);
    }

    #[test]
    fn zero_target_means_no_take_profit() {
        let trailing_only = Strategy {
            exits: ExitRules {
                take_profit_pct: 0.0,
                trailing_stop_pct: 0.3,
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(ParamGrid::default().expand(&trailing_only).len(), 1);

        let stops_only = ParamGrid {
            stop_loss_pct: vec![0.1, 0.2],
            ..Default::default()
        };
        let expanded = stops_only.expand(&trailing_only);
        assert_eq!(expanded.len(), 2);
        assert!(expanded.iter().all(|s| s.exits.take_profit_pct == 0.0));
    }

    #[test]
    fn grid_sets_band_only_for_weighted_alpha() {
        let grid = ParamGrid {
            alpha_band: vec![0.0, 0.05],
            ..Default::default()
        };
        assert_eq!(grid.expand(&Strategy::default()).len(), 2);

        let rsi = Strategy {
            signal: SignalSpec::RsiBand {
                upper: 55.0,
                lower: 45.0,
            },
            ..Default::default()
        };
        let expanded = grid.expand(&rsi);
        assert_eq!(expanded.len(), 1);
        assert!(!expanded[0].name.contains("band"));
    }

    #[test]
    fn empty_grid_keeps_base() {
        let grid = ParamGrid::default();
        assert!(grid.is_empty());
        let expanded = grid.expand(&Strategy::default());
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].exits, Strategy::default().exits);
    }
}
