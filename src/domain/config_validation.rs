//! Configuration validation.
//!
//! Validates every config field before a run, one check per key, so a bad
//! file fails fast with the section and key that caused it.

use crate::domain::error::SimError;
use crate::domain::indicator::FeatureKind;
use crate::domain::metrics::{BarInterval, MarketCalendar};
use crate::domain::strategy::{FeatureWeights, parse_trading_windows};
use crate::domain::universe::parse_symbols;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use std::str::FromStr;

pub const DEFAULT_FEATURE_WEIGHT: f64 = 0.2;

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), SimError> {
    validate_backtest_config(config)?;
    validate_walk_forward_config(config)?;
    validate_feature_config(config)?;
    validate_strategy_config(config)?;
    validate_risk_config(config)?;
    validate_grid_config(config)?;
    Ok(())
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), SimError> {
    required(config, "backtest", "data_dir")?;
    validate_symbols(config)?;
    validate_dates(config)?;
    positive(config, "backtest", "initial_equity", 100_000.0)?;
    parsed::<BarInterval>(config, "backtest", "interval")?;
    parsed::<MarketCalendar>(config, "backtest", "calendar")?;
    at_least(config, "backtest", "min_sharpe_samples", 10, 2)?;
    Ok(())
}

pub fn validate_walk_forward_config(config: &dyn ConfigPort) -> Result<(), SimError> {
    at_least(config, "walk_forward", "in_sample_sessions", 5, 1)?;
    at_least(config, "walk_forward", "out_of_sample_sessions", 1, 1)?;
    at_least(config, "walk_forward", "min_in_sample_bars", 100, 1)?;
    at_least(config, "walk_forward", "min_oos_bars", 50, 1)?;
    Ok(())
}

pub fn validate_feature_config(config: &dyn ConfigPort) -> Result<(), SimError> {
    at_least(config, "features", "rsi_period", 14, 2)?;
    at_least(config, "features", "volume_lookback", 20, 2)?;
    at_least(config, "features", "momentum_period", 10, 1)?;
    let short = at_least(config, "features", "vol_short", 5, 2)?;
    let long = at_least(config, "features", "vol_long", 30, 2)?;
    if short >= long {
        return Err(invalid(
            "features",
            "vol_short",
            format!("vol_short ({short}) must be shorter than vol_long ({long})"),
        ));
    }
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), SimError> {
    let signal = config
        .get_string("strategy", "signal")
        .unwrap_or_else(|| "weighted_alpha".to_string());
    match signal.to_lowercase().as_str() {
        "weighted_alpha" => {
            read_feature_weights(config)?;
            non_negative(config, "strategy", "alpha_band", 0.0)?;
        }
        "rsi_band" => validate_rsi_band(config)?,
        other => {
            return Err(invalid(
                "strategy",
                "signal",
                format!("unknown signal '{other}', expected weighted_alpha or rsi_band"),
            ));
        }
    }

    positive(config, "strategy", "stop_loss_pct", 0.2)?;
    non_negative(config, "strategy", "take_profit_pct", 0.3)?;
    non_negative(config, "strategy", "trailing_stop_pct", 0.0)?;
    non_negative(config, "strategy", "trail_activation_pct", 0.0)?;
    at_least(config, "strategy", "max_hold_bars", 0, 0)?;
    non_negative(config, "strategy", "slippage_bps", 0.0)?;
    non_negative(config, "strategy", "commission_per_trade", 0.0)?;
    non_negative(config, "strategy", "commission_pct", 0.0)?;
    if let Some(windows) = config.get_string("strategy", "trading_windows") {
        parse_trading_windows(&windows)?;
    }
    Ok(())
}

pub fn validate_risk_config(config: &dyn ConfigPort) -> Result<(), SimError> {
    let risk = config.get_double("risk", "per_trade_risk_pct", 1.0);
    if !(risk > 0.0 && risk <= 100.0) {
        return Err(invalid(
            "risk",
            "per_trade_risk_pct",
            "per_trade_risk_pct must be in (0, 100]".into(),
        ));
    }
    positive(config, "risk", "max_position_dollars", 100_000.0)?;
    non_negative(config, "risk", "max_daily_loss_pct", 2.0)?;
    at_least(config, "risk", "max_trades_per_day", 10, 1)?;
    Ok(())
}

pub fn validate_grid_config(config: &dyn ConfigPort) -> Result<(), SimError> {
    for key in [
        "stop_loss_pct",
        "take_profit_pct",
        "trailing_stop_pct",
        "alpha_band",
    ] {
        let values = parse_f64_list(config, "grid", key)?.unwrap_or_default();
        if values.iter().any(|v| *v < 0.0) {
            return Err(invalid("grid", key, "values must be non-negative".into()));
        }
    }
    parse_usize_list(config, "grid", "max_hold_bars")?;
    Ok(())
}

/// Read `weight_<feature>` for every feature; missing weights default to an equal split.
pub fn read_feature_weights(config: &dyn ConfigPort) -> Result<FeatureWeights, SimError> {
    let mut weights = [DEFAULT_FEATURE_WEIGHT; FeatureKind::COUNT];
    for kind in FeatureKind::ALL {
        weights[kind.index()] = config.get_double(
            "strategy",
            &format!("weight_{}", kind.key()),
            DEFAULT_FEATURE_WEIGHT,
        );
    }
    FeatureWeights::new(weights)
}

/// Comma-separated numbers, or `None` when the key is absent.
pub fn parse_f64_list(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<Vec<f64>>, SimError> {
    parse_list(config, section, key)
}

pub fn parse_usize_list(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<Vec<usize>>, SimError> {
    parse_list(config, section, key)
}

fn parse_list<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<Vec<T>>, SimError> {
    let Some(raw) = config.get_string(section, key) else {
        return Ok(None);
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<T>()
                .map_err(|_| invalid(section, key, format!("'{s}' is not a valid number")))
        })
        .collect::<Result<Vec<T>, SimError>>()
        .map(Some)
}

pub fn parse_date(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<NaiveDate, SimError> {
    let value = required(config, section, key)?;
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        invalid(
            section,
            key,
            format!("invalid {key} format, expected YYYY-MM-DD"),
        )
    })
}

fn validate_symbols(config: &dyn ConfigPort) -> Result<(), SimError> {
    let symbols = required(config, "backtest", "symbols")?;
    parse_symbols(&symbols)?;
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), SimError> {
    let start = parse_date(config, "backtest", "start_date")?;
    let end = parse_date(config, "backtest", "end_date")?;
    if start > end {
        return Err(invalid(
            "backtest",
            "start_date",
            "start_date must not be after end_date".into(),
        ));
    }
    Ok(())
}

fn validate_rsi_band(config: &dyn ConfigPort) -> Result<(), SimError> {
    let upper = config.get_double("strategy", "rsi_upper", 55.0);
    let lower = config.get_double("strategy", "rsi_lower", 45.0);
    if !(0.0..=100.0).contains(&upper) || !(0.0..=100.0).contains(&lower) {
        return Err(invalid(
            "strategy",
            "rsi_upper",
            "RSI levels must be within 0..=100".into(),
        ));
    }
    if lower > upper {
        return Err(invalid(
            "strategy",
            "rsi_lower",
            format!("rsi_lower ({lower}) must not exceed rsi_upper ({upper})"),
        ));
    }
    Ok(())
}

fn required(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, SimError> {
    config
        .get_string(section, key)
        .ok_or_else(|| SimError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        })
}

fn parsed<T>(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<T>, SimError>
where
    T: FromStr<Err = String>,
{
    config
        .get_string(section, key)
        .map(|v| v.parse::<T>().map_err(|reason| invalid(section, key, reason)))
        .transpose()
}

fn positive(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, SimError> {
    let value = config.get_double(section, key, default);
    if !(value > 0.0) || !value.is_finite() {
        return Err(invalid(section, key, format!("{key} must be positive")));
    }
    Ok(value)
}

fn non_negative(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, SimError> {
    let value = config.get_double(section, key, default);
    if !(value >= 0.0) || !value.is_finite() {
        return Err(invalid(section, key, format!("{key} must be non-negative")));
    }
    Ok(value)
}

fn at_least(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
    minimum: i64,
) -> Result<i64, SimError> {
    let value = config.get_int(section, key, default);
    if value < minimum {
        return Err(invalid(section, key, format!("{key} must be at least {minimum}")));
    }
    Ok(value)
}

fn invalid(section: &str, key: &str, reason: String) -> SimError {
    SimError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason,
    }
}
