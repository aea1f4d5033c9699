//! CSV report adapter implementing ReportPort.
//!
//! Each run lands in `<output>/<SYMBOL>_<strategy>/` as `trades.csv`,
//! `equity.csv`, `windows.csv` and a one-row `summary.csv`. A batch also
//! writes `leaderboard.csv` and `skipped.csv` at the top level.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::domain::backtest::{SymbolResult, WindowStatus, WindowSummary};
use crate::domain::batch::BatchReport;
use crate::domain::error::SimError;
use crate::domain::position::ExitReason;
use crate::ports::report_port::ReportPort;

#[derive(Serialize)]
struct SummaryRow<'a> {
    symbol: &'a str,
    strategy: &'a str,
    total_trades: usize,
    winning_trades: usize,
    losing_trades: usize,
    total_return_pct: f64,
    net_pnl: f64,
    sharpe_ratio: f64,
    sortino_ratio: f64,
    max_drawdown_pct: f64,
    max_drawdown_bars: usize,
    win_rate: f64,
    profit_factor: f64,
    avg_trade_pnl_pct: f64,
    expectancy: f64,
    avg_r_multiple: f64,
    avg_hold_bars: f64,
    largest_win: f64,
    largest_loss: f64,
    exits_stop_loss: usize,
    exits_target: usize,
    exits_trailing_stop: usize,
    exits_return_to_range: usize,
    exits_timeout: usize,
    exits_eod: usize,
    windows_traded: usize,
    windows_skipped: usize,
    risk_rejections: usize,
    outcome: String,
}

impl<'a> SummaryRow<'a> {
    fn from_result(result: &'a SymbolResult) -> Self {
        let r = &result.report;
        SummaryRow {
            symbol: &result.symbol,
            strategy: &result.strategy,
            total_trades: r.total_trades,
            winning_trades: r.winning_trades,
            losing_trades: r.losing_trades,
            total_return_pct: r.total_return_pct,
            net_pnl: r.net_pnl,
            sharpe_ratio: r.sharpe_ratio,
            sortino_ratio: r.sortino_ratio,
            max_drawdown_pct: r.max_drawdown_pct,
            max_drawdown_bars: r.max_drawdown_bars,
            win_rate: r.win_rate,
            profit_factor: r.profit_factor,
            avg_trade_pnl_pct: r.avg_trade_pnl_pct,
            expectancy: r.expectancy,
            avg_r_multiple: r.avg_r_multiple,
            avg_hold_bars: r.avg_hold_bars,
            largest_win: r.largest_win,
            largest_loss: r.largest_loss,
            exits_stop_loss: r.exit_count(ExitReason::StopLoss),
            exits_target: r.exit_count(ExitReason::Target),
            exits_trailing_stop: r.exit_count(ExitReason::TrailingStop),
            exits_return_to_range: r.exit_count(ExitReason::ReturnToRange),
            exits_timeout: r.exit_count(ExitReason::Timeout),
            exits_eod: r.exit_count(ExitReason::Eod),
            windows_traded: result.windows_traded(),
            windows_skipped: result.windows_skipped(),
            risk_rejections: result.rejections.values().sum(),
            outcome: r.outcome.to_string(),
        }
    }
}

#[derive(Serialize)]
struct WindowRow<'a> {
    index: usize,
    oos_start: String,
    oos_end: String,
    status: &'static str,
    skip_reason: &'a str,
    threshold: Option<f64>,
    degenerate_features: usize,
    trades: usize,
}

impl<'a> From<&'a WindowSummary> for WindowRow<'a> {
    fn from(w: &'a WindowSummary) -> Self {
        WindowRow {
            index: w.index,
            oos_start: w.oos_start.to_string(),
            oos_end: w.oos_end.to_string(),
            status: match w.status {
                WindowStatus::Traded => "traded",
                WindowStatus::Skipped => "skipped",
            },
            skip_reason: w.skip_reason.as_deref().unwrap_or(""),
            threshold: w.threshold,
            degenerate_features: w.degenerate_features,
            trades: w.trades,
        }
    }
}

#[derive(Serialize)]
struct LeaderboardRow<'a> {
    rank: usize,
    symbol: &'a str,
    strategy: &'a str,
    sharpe_ratio: f64,
    total_return_pct: f64,
    max_drawdown_pct: f64,
    total_trades: usize,
    win_rate: f64,
}

#[derive(Serialize)]
struct SkippedRow<'a> {
    symbol: &'a str,
    reason: String,
}

pub struct CsvReportWriter;

impl CsvReportWriter {
    /// Directory a run's files are written to.
    pub fn run_dir(output_dir: &Path, result: &SymbolResult) -> PathBuf {
        output_dir.join(format!(
            "{}_{}",
            sanitize(&result.symbol),
            sanitize(&result.strategy)
        ))
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '=') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn write_rows<T: Serialize>(
    path: &Path,
    rows: impl IntoIterator<Item = T>,
) -> Result<(), SimError> {
    let mut writer = csv::Writer::from_path(path).map_err(csv_error)?;
    for row in rows {
        writer.serialize(row).map_err(csv_error)?;
    }
    writer.flush()?;
    Ok(())
}

fn csv_error(err: csv::Error) -> SimError {
    SimError::Io(err.into())
}

impl ReportPort for CsvReportWriter {
    fn write(&self, result: &SymbolResult, output_dir: &Path) -> Result<(), SimError> {
        let dir = Self::run_dir(output_dir, result);
        fs::create_dir_all(&dir)?;

        write_rows(&dir.join("trades.csv"), &result.trades)?;
        write_rows(&dir.join("equity.csv"), result.equity_curve.points())?;
        write_rows(
            &dir.join("windows.csv"),
            result.windows.iter().map(WindowRow::from),
        )?;
        write_rows(
            &dir.join("summary.csv"),
            [SummaryRow::from_result(result)],
        )?;

        info!(path = %dir.display(), trades = result.trades.len(), "report written");
        Ok(())
    }

    fn write_batch(&self, batch: &BatchReport, output_dir: &Path) -> Result<(), SimError> {
        fs::create_dir_all(output_dir)?;
        for result in batch.completed() {
            self.write(result, output_dir)?;
        }

        let leaderboard = batch
            .ranked_by_sharpe()
            .into_iter()
            .enumerate()
            .map(|(i, r)| LeaderboardRow {
                rank: i + 1,
                symbol: &r.symbol,
                strategy: &r.strategy,
                sharpe_ratio: r.report.sharpe_ratio,
                total_return_pct: r.report.total_return_pct,
                max_drawdown_pct: r.report.max_drawdown_pct,
                total_trades: r.report.total_trades,
                win_rate: r.report.win_rate,
            });
        write_rows(&output_dir.join("leaderboard.csv"), leaderboard)?;

        let skipped = batch.skipped.iter().map(|s| SkippedRow {
            symbol: &s.symbol,
            reason: s.reason.to_string(),
        });
        write_rows(&output_dir.join("skipped.csv"), skipped)?;
        Ok(())
    }
}
