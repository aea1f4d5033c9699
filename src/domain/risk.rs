//! Risk governor: entry gating and position sizing.
//!
//! Consulted once per candidate entry, before the state machine leaves FLAT.
//! Daily counters roll over on the first bar of each new session date.

use chrono::NaiveDate;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct RiskConfig {
    /// Percent of current equity put at risk per trade.
    pub per_trade_risk_pct: f64,
    /// Notional ceiling for a single position.
    pub max_position_dollars: f64,
    /// Daily realized loss, as percent of the day's starting equity, that halts new entries.
    pub max_daily_loss_pct: f64,
    pub max_trades_per_day: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            per_trade_risk_pct: 1.0,
            max_position_dollars: 100_000.0,
            max_daily_loss_pct: 2.0,
            max_trades_per_day: 10,
        }
    }
}

/// Why a candidate entry was refused. Not an error: the run continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RiskRejection {
    DailyLossLimit,
    MaxTradesPerDay,
    DegenerateStop,
    ZeroSize,
}

impl fmt::Display for RiskRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RiskRejection::DailyLossLimit => "daily loss limit reached",
            RiskRejection::MaxTradesPerDay => "max trades per day reached",
            RiskRejection::DegenerateStop => "stop distance is not positive",
            RiskRejection::ZeroSize => "position size rounds to zero",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone)]
pub struct RiskGovernor {
    config: RiskConfig,
    current_day: Option<NaiveDate>,
    day_start_equity: f64,
    daily_realized_pnl: f64,
    trades_today: usize,
}

impl RiskGovernor {
    pub fn new(config: RiskConfig) -> Self {
        RiskGovernor {
            config,
            current_day: None,
            day_start_equity: 0.0,
            daily_realized_pnl: 0.0,
            trades_today: 0,
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Reset daily counters when `date` starts a new session.
    pub fn roll_day(&mut self, date: NaiveDate, equity: f64) {
        if self.current_day != Some(date) {
            self.current_day = Some(date);
            self.day_start_equity = equity;
            self.daily_realized_pnl = 0.0;
            self.trades_today = 0;
        }
    }

    pub fn trades_today(&self) -> usize {
        self.trades_today
    }

    pub fn daily_realized_pnl(&self) -> f64 {
        self.daily_realized_pnl
    }

    /// Inactive until the first session has been rolled with positive equity.
    fn daily_loss_limit_hit(&self) -> bool {
        if self.current_day.is_none() || self.day_start_equity <= 0.0 {
            return false;
        }
        let limit = self.config.max_daily_loss_pct / 100.0 * self.day_start_equity;
        self.daily_realized_pnl <= -limit
    }

    /// Size a candidate entry, or say why it must be refused.
    pub fn evaluate(
        &self,
        equity: f64,
        entry_price: f64,
        stop_price: f64,
    ) -> Result<u64, RiskRejection> {
        if self.config.max_daily_loss_pct > 0.0 && self.daily_loss_limit_hit() {
            return Err(RiskRejection::DailyLossLimit);
        }
        if self.trades_today >= self.config.max_trades_per_day {
            return Err(RiskRejection::MaxTradesPerDay);
        }

        let stop_distance = (entry_price - stop_price).abs();
        if !(stop_distance > 0.0) || !stop_distance.is_finite() {
            return Err(RiskRejection::DegenerateStop);
        }

        let size = position_size(equity, entry_price, stop_distance, &self.config);
        if size == 0 {
            return Err(RiskRejection::ZeroSize);
        }
        Ok(size)
    }

    pub fn record_entry(&mut self) {
        self.trades_today += 1;
    }

    pub fn record_exit(&mut self, pnl_dollars: f64) {
        self.daily_realized_pnl += pnl_dollars;
    }
}

/// floor(equity * risk% / stop_distance), capped by floor(max_position_dollars / entry_price).
pub fn position_size(
    equity: f64,
    entry_price: f64,
    stop_distance: f64,
    config: &RiskConfig,
) -> u64 {
    if stop_distance <= 0.0 || entry_price <= 0.0 || equity <= 0.0 {
        return 0;
    }
    let risk_dollars = equity * config.per_trade_risk_pct / 100.0;
    let by_risk = (risk_dollars / stop_distance).floor();
    let by_notional = (config.max_position_dollars / entry_price).floor();
    by_risk.min(by_notional).max(0.0) as u64
}
