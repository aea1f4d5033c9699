//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::FmtSubscriber;

use crate::adapters::csv_adapter::CsvBarRepository;
use crate::adapters::csv_report_adapter::CsvReportWriter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{BacktestConfig, SymbolResult};
use crate::domain::batch::{BatchReport, ParamGrid, run_batch};
use crate::domain::config_validation::{
    parse_date, parse_f64_list, parse_usize_list, read_feature_weights, validate_config,
};
use crate::domain::error::SimError;
use crate::domain::execution::{ExecutionConfig, ExitRules};
use crate::domain::indicator::FeatureConfig;
use crate::domain::metrics::{BarInterval, MarketCalendar};
use crate::domain::position::ExitReason;
use crate::domain::risk::RiskConfig;
use crate::domain::strategy::{SignalSpec, Strategy, parse_trading_windows};
use crate::domain::universe::{Universe, load_universe, parse_symbols};
use crate::domain::walk_forward::WalkForwardConfig;
use crate::ports::bar_repository::BarRepository;
use crate::ports::config_port::ConfigPort;
use crate::ports::report_port::ReportPort;

const DEFAULT_OUTPUT_DIR: &str = "wfsim-output";

#[derive(Parser, Debug)]
#[command(name = "wfsim", about = "Walk-forward backtester for minute-bar strategies")]
pub struct Cli {
    /// trace, debug, info, warn or error
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a walk-forward backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Comma-separated symbols overriding [backtest] symbols
        #[arg(short, long)]
        symbol: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Sweep the [grid] parameters across every symbol
    Grid {
        #[arg(short, long)]
        config: PathBuf,
        /// Number of ranked runs to print
        #[arg(long, default_value_t = 10)]
        top: usize,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show data range for symbol(s)
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        symbol: Option<String>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    init_logging(&cli.log_level);

    let result = match cli.command {
        Command::Backtest {
            config,
            symbol,
            output,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config, symbol.as_deref())
            } else {
                run_backtest(&config, symbol.as_deref(), output.as_deref())
            }
        }
        Command::Grid {
            config,
            top,
            output,
        } => run_grid(&config, top, output.as_deref()),
        Command::Validate { config } => run_validate(&config),
        Command::Info { config, symbol } => run_info(&config, symbol.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(&e)
        }
    }
}

pub fn init_logging(level: &str) {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        debug!("global subscriber already installed");
    }
}

/// Load and validate a config file.
pub fn load_config(path: &Path) -> Result<FileConfigAdapter, SimError> {
    info!(path = %path.display(), "loading config");
    let config = FileConfigAdapter::from_file(path)?;
    validate_config(&config)?;
    Ok(config)
}

/// Everything the backtest and grid commands share.
pub struct RunSettings {
    pub data_dir: PathBuf,
    pub symbols: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub output_dir: PathBuf,
    pub backtest: BacktestConfig,
}

pub fn build_run_settings(
    config: &dyn ConfigPort,
    symbol_override: Option<&str>,
    output_override: Option<&Path>,
) -> Result<RunSettings, SimError> {
    let data_dir = config
        .get_string("backtest", "data_dir")
        .map(PathBuf::from)
        .ok_or_else(|| SimError::ConfigMissing {
            section: "backtest".into(),
            key: "data_dir".into(),
        })?;

    let output_dir = match output_override {
        Some(path) => path.to_path_buf(),
        None => config
            .get_string("backtest", "output_dir")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
    };

    Ok(RunSettings {
        data_dir,
        symbols: resolve_symbols(symbol_override, config)?,
        start_date: parse_date(config, "backtest", "start_date")?,
        end_date: parse_date(config, "backtest", "end_date")?,
        output_dir,
        backtest: build_backtest_config(config)?,
    })
}

pub fn build_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, SimError> {
    let defaults = BacktestConfig::default();
    let wf = WalkForwardConfig::default();
    let features = FeatureConfig::default();

    let interval = match config.get_string("backtest", "interval") {
        Some(s) => s.parse::<BarInterval>().map_err(|reason| SimError::ConfigInvalid {
            section: "backtest".into(),
            key: "interval".into(),
            reason,
        })?,
        None => defaults.interval,
    };
    let calendar = match config.get_string("backtest", "calendar") {
        Some(s) => s.parse::<MarketCalendar>().map_err(|reason| SimError::ConfigInvalid {
            section: "backtest".into(),
            key: "calendar".into(),
            reason,
        })?,
        None => defaults.calendar,
    };

    Ok(BacktestConfig {
        initial_equity: config.get_double("backtest", "initial_equity", defaults.initial_equity),
        walk_forward: WalkForwardConfig {
            in_sample_sessions: get_usize(
                config,
                "walk_forward",
                "in_sample_sessions",
                wf.in_sample_sessions,
            ),
            out_of_sample_sessions: get_usize(
                config,
                "walk_forward",
                "out_of_sample_sessions",
                wf.out_of_sample_sessions,
            ),
            min_in_sample_bars: get_usize(
                config,
                "walk_forward",
                "min_in_sample_bars",
                wf.min_in_sample_bars,
            ),
            min_oos_bars: get_usize(config, "walk_forward", "min_oos_bars", wf.min_oos_bars),
        },
        features: FeatureConfig {
            rsi_period: get_usize(config, "features", "rsi_period", features.rsi_period),
            volume_lookback: get_usize(
                config,
                "features",
                "volume_lookback",
                features.volume_lookback,
            ),
            vol_short: get_usize(config, "features", "vol_short", features.vol_short),
            vol_long: get_usize(config, "features", "vol_long", features.vol_long),
            momentum_period: get_usize(
                config,
                "features",
                "momentum_period",
                features.momentum_period,
            ),
        },
        interval,
        calendar,
        min_sharpe_samples: get_usize(
            config,
            "backtest",
            "min_sharpe_samples",
            defaults.min_sharpe_samples,
        ),
    })
}

pub fn build_strategy(config: &dyn ConfigPort) -> Result<Strategy, SimError> {
    let signal_name = config
        .get_string("strategy", "signal")
        .unwrap_or_else(|| "weighted_alpha".to_string())
        .to_lowercase();

    let signal = match signal_name.as_str() {
        "weighted_alpha" => SignalSpec::WeightedAlpha {
            weights: read_feature_weights(config)?,
            band: config.get_double("strategy", "alpha_band", 0.0),
        },
        "rsi_band" => SignalSpec::RsiBand {
            upper: config.get_double("strategy", "rsi_upper", 55.0),
            lower: config.get_double("strategy", "rsi_lower", 45.0),
        },
        other => {
            return Err(SimError::ConfigInvalid {
                section: "strategy".into(),
                key: "signal".into(),
                reason: format!("unknown signal '{other}'"),
            });
        }
    };

    let exit_defaults = ExitRules::default();
    let risk_defaults = RiskConfig::default();
    let trading_windows = match config.get_string("strategy", "trading_windows") {
        Some(s) => parse_trading_windows(&s)?,
        None => Vec::new(),
    };

    Ok(Strategy {
        name: config
            .get_string("strategy", "name")
            .unwrap_or_else(|| signal.name().to_string()),
        signal,
        allow_shorting: config.get_bool("strategy", "allow_shorting", true),
        exits: ExitRules {
            stop_loss_pct: config.get_double(
                "strategy",
                "stop_loss_pct",
                exit_defaults.stop_loss_pct,
            ),
            take_profit_pct: config.get_double(
                "strategy",
                "take_profit_pct",
                exit_defaults.take_profit_pct,
            ),
            trailing_stop_pct: config.get_double(
                "strategy",
                "trailing_stop_pct",
                exit_defaults.trailing_stop_pct,
            ),
            trail_activation_pct: config.get_double(
                "strategy",
                "trail_activation_pct",
                exit_defaults.trail_activation_pct,
            ),
            max_hold_bars: get_usize(
                config,
                "strategy",
                "max_hold_bars",
                exit_defaults.max_hold_bars,
            ),
            exit_on_flat: config.get_bool("strategy", "exit_on_flat", exit_defaults.exit_on_flat),
        },
        execution: ExecutionConfig {
            slippage_bps: config.get_double("strategy", "slippage_bps", 0.0),
            commission_per_trade: config.get_double("strategy", "commission_per_trade", 0.0),
            commission_pct: config.get_double("strategy", "commission_pct", 0.0),
        },
        risk: RiskConfig {
            per_trade_risk_pct: config.get_double(
                "risk",
                "per_trade_risk_pct",
                risk_defaults.per_trade_risk_pct,
            ),
            max_position_dollars: config.get_double(
                "risk",
                "max_position_dollars",
                risk_defaults.max_position_dollars,
            ),
            max_daily_loss_pct: config.get_double(
                "risk",
                "max_daily_loss_pct",
                risk_defaults.max_daily_loss_pct,
            ),
            max_trades_per_day: get_usize(
                config,
                "risk",
                "max_trades_per_day",
                risk_defaults.max_trades_per_day,
            ),
        },
        trading_windows,
    })
}

pub fn build_grid(config: &dyn ConfigPort) -> Result<ParamGrid, SimError> {
    Ok(ParamGrid {
        stop_loss_pct: parse_f64_list(config, "grid", "stop_loss_pct")?.unwrap_or_default(),
        take_profit_pct: parse_f64_list(config, "grid", "take_profit_pct")?.unwrap_or_default(),
        trailing_stop_pct: parse_f64_list(config, "grid", "trailing_stop_pct")?.unwrap_or_default(),
        max_hold_bars: parse_usize_list(config, "grid", "max_hold_bars")?.unwrap_or_default(),
        alpha_band: parse_f64_list(config, "grid", "alpha_band")?.unwrap_or_default(),
    })
}

/// `--symbol` wins over `[backtest] symbols`.
pub fn resolve_symbols(
    symbol_override: Option<&str>,
    config: &dyn ConfigPort,
) -> Result<Vec<String>, SimError> {
    let raw = match symbol_override {
        Some(s) => s.to_string(),
        None => config
            .get_string("backtest", "symbols")
            .ok_or_else(|| SimError::ConfigMissing {
                section: "backtest".into(),
                key: "symbols".into(),
            })?,
    };
    Ok(parse_symbols(&raw)?)
}

fn get_usize(config: &dyn ConfigPort, section: &str, key: &str, default: usize) -> usize {
    let value = config.get_int(section, key, default as i64);
    usize::try_from(value).unwrap_or(default)
}

fn load_settings_universe(settings: &RunSettings) -> Result<Universe, SimError> {
    let repo = CsvBarRepository::new(settings.data_dir.clone());
    load_universe(
        &repo,
        &settings.symbols,
        settings.start_date,
        settings.end_date,
        settings.backtest.walk_forward.min_in_sample_bars,
    )
}

fn run_backtest(
    config_path: &Path,
    symbol_override: Option<&str>,
    output_override: Option<&Path>,
) -> Result<(), SimError> {
    let config = load_config(config_path)?;
    let settings = build_run_settings(&config, symbol_override, output_override)?;
    let strategy = build_strategy(&config)?;

    eprintln!(
        "Running {} on {} symbols, {} to {}",
        strategy.name,
        settings.symbols.len(),
        settings.start_date,
        settings.end_date
    );

    let universe = load_settings_universe(&settings)?;
    let cancel = AtomicBool::new(false);
    let batch = run_batch(&universe, &[strategy], &settings.backtest, &cancel);

    for result in batch.completed() {
        print_summary(result);
    }
    print_skipped(&batch);

    CsvReportWriter.write_batch(&batch, &settings.output_dir)?;
    eprintln!("\nReports written to: {}", settings.output_dir.display());

    if batch.was_cancelled() {
        return Err(SimError::Cancelled);
    }
    Ok(())
}

fn run_grid(
    config_path: &Path,
    top: usize,
    output_override: Option<&Path>,
) -> Result<(), SimError> {
    let config = load_config(config_path)?;
    let settings = build_run_settings(&config, None, output_override)?;
    let base = build_strategy(&config)?;
    let grid = build_grid(&config)?;

    if grid.is_empty() {
        warn!("[grid] is empty, running the base strategy only");
    }
    let strategies = grid.expand(&base);
    if strategies.is_empty() {
        return Err(SimError::ConfigInvalid {
            section: "grid".into(),
            key: "stop_loss_pct".into(),
            reason: "no combination has a positive stop".into(),
        });
    }
    eprintln!(
        "Sweeping {} parameter sets over {} symbols",
        strategies.len(),
        settings.symbols.len()
    );

    let universe = load_settings_universe(&settings)?;
    let cancel = AtomicBool::new(false);
    let batch = run_batch(&universe, &strategies, &settings.backtest, &cancel);

    eprintln!("\n=== Top {} by Sharpe ===", top);
    for (rank, result) in batch.ranked_by_sharpe().into_iter().take(top).enumerate() {
        eprintln!(
            "{:>3}. {:<8} {:<48} sharpe {:>6.2}  return {:>7.2}%  dd {:>6.2}%  trades {}",
            rank + 1,
            result.symbol,
            result.strategy,
            result.report.sharpe_ratio,
            result.report.total_return_pct,
            result.report.max_drawdown_pct,
            result.report.total_trades,
        );
    }
    print_skipped(&batch);

    CsvReportWriter.write_batch(&batch, &settings.output_dir)?;
    eprintln!("\nReports written to: {}", settings.output_dir.display());

    if batch.was_cancelled() {
        return Err(SimError::Cancelled);
    }
    Ok(())
}

pub fn run_dry_run(config_path: &Path, symbol_override: Option<&str>) -> Result<(), SimError> {
    let config = load_config(config_path)?;
    let settings = build_run_settings(&config, symbol_override, None)?;
    let strategy = build_strategy(&config)?;
    eprintln!("Config validated successfully");

    let wf = &settings.backtest.walk_forward;
    eprintln!("\nStrategy: {} ({})", strategy.name, strategy.signal.name());
    eprintln!(
        "  stop {}%  target {}%  trail {}%  max hold {} bars  shorting {}",
        strategy.exits.stop_loss_pct,
        strategy.exits.take_profit_pct,
        strategy.exits.trailing_stop_pct,
        strategy.exits.max_hold_bars,
        strategy.allow_shorting,
    );
    eprintln!(
        "  risk {}% per trade, {} trades/day, {}% daily loss limit",
        strategy.risk.per_trade_risk_pct,
        strategy.risk.max_trades_per_day,
        strategy.risk.max_daily_loss_pct,
    );
    eprintln!(
        "\nWalk-forward: {} in-sample / {} out-of-sample sessions",
        wf.in_sample_sessions, wf.out_of_sample_sessions
    );
    eprintln!("\nUniverse:");
    eprintln!("  data_dir: {}", settings.data_dir.display());
    eprintln!("  symbols: {}", settings.symbols.join(", "));
    eprintln!("  range: {} to {}", settings.start_date, settings.end_date);

    eprintln!("\nDry run complete: configuration is valid");
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), SimError> {
    eprintln!("Validating config: {}", config_path.display());
    let config = load_config(config_path)?;
    let strategy = build_strategy(&config)?;
    let variants = build_grid(&config)?.expand(&strategy).len();

    eprintln!("  strategy: {} ({})", strategy.name, strategy.signal.name());
    eprintln!("  grid variants: {}", variants);
    eprintln!("\nConfiguration is valid.");
    Ok(())
}

fn run_info(config_path: &Path, symbol_override: Option<&str>) -> Result<(), SimError> {
    let config = FileConfigAdapter::from_file(config_path)?;
    let data_dir = config
        .get_string("backtest", "data_dir")
        .map(PathBuf::from)
        .ok_or_else(|| SimError::ConfigMissing {
            section: "backtest".into(),
            key: "data_dir".into(),
        })?;
    let repo = CsvBarRepository::new(data_dir);

    let symbols = match symbol_override {
        Some(s) => parse_symbols(s)?,
        None => match config.get_string("backtest", "symbols") {
            Some(s) => parse_symbols(&s)?,
            None => repo.list_symbols()?,
        },
    };

    for symbol in &symbols {
        match repo.data_range(symbol) {
            Ok(Some((first, last, count))) => {
                println!("{symbol}: {count} bars, {first} to {last}");
            }
            Ok(None) | Err(SimError::MissingFeed { .. }) => {
                eprintln!("{symbol}: no data found");
            }
            Err(e) => eprintln!("error querying {symbol}: {e}"),
        }
    }
    Ok(())
}

fn print_summary(result: &SymbolResult) {
    let r = &result.report;
    eprintln!("\n=== {} / {} ===", result.symbol, result.strategy);
    eprintln!(
        "Windows:          {} traded, {} skipped",
        result.windows_traded(),
        result.windows_skipped()
    );
    eprintln!("Total Return:     {:.2}%", r.total_return_pct);
    eprintln!("Net P&L:          ${:.2}", r.net_pnl);
    eprintln!("Sharpe Ratio:     {:.2}", r.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", r.sortino_ratio);
    eprintln!("Max Drawdown:     {:.2}%", r.max_drawdown_pct);
    eprintln!("Total Trades:     {} ({})", r.total_trades, r.outcome);
    eprintln!("Win Rate:         {:.1}%", r.win_rate);
    eprintln!("Profit Factor:    {:.2}", r.profit_factor);
    eprintln!("Avg R:            {:.2}", r.avg_r_multiple);

    let exits: Vec<String> = ExitReason::ALL
        .iter()
        .filter(|reason| r.exit_count(**reason) > 0)
        .map(|reason| format!("{}={}", reason, r.exit_count(*reason)))
        .collect();
    if !exits.is_empty() {
        eprintln!("Exits:            {}", exits.join(" "));
    }

    let rejected: usize = result.rejections.values().sum();
    if rejected > 0 {
        eprintln!("Risk Rejections:  {}", rejected);
    }
}

fn print_skipped(batch: &BatchReport) {
    if batch.skipped.is_empty() {
        return;
    }
    eprintln!("\n=== Skipped Symbols ===");
    for skipped in &batch.skipped {
        eprintln!("  {}: {}", skipped.symbol, skipped.reason);
    }
}
