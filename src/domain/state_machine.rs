//! Per-symbol position state machine: FLAT, OPEN_LONG, OPEN_SHORT.
//!
//! Each bar is handled in a fixed order:
//! 1. roll the risk governor's daily counters on a new session date
//! 2. resolve exits for an open position (never on its entry bar)
//! 3. fold the bar into the high-water mark of a surviving position
//! 4. consider a new entry when flat
//! 5. mark equity at the bar close

use std::collections::HashMap;

use tracing::{debug, trace};

use super::execution::{
    BarContext, calculate_commission, check_exit, entry_fill, exit_fill, pnl_pct,
    protective_levels,
};
use super::portfolio::Portfolio;
use super::position::{Direction, ExitReason, Position, Trade};
use super::risk::{RiskGovernor, RiskRejection};
use super::strategy::Strategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionState {
    Flat,
    OpenLong,
    OpenShort,
}

pub struct PositionStateMachine<'a> {
    symbol: String,
    strategy: &'a Strategy,
    governor: RiskGovernor,
    position: Option<Position>,
    previous_signal: Direction,
    rejections: HashMap<RiskRejection, usize>,
}

impl<'a> PositionStateMachine<'a> {
    pub fn new(symbol: impl Into<String>, strategy: &'a Strategy) -> Self {
        PositionStateMachine {
            symbol: symbol.into(),
            strategy,
            governor: RiskGovernor::new(strategy.risk.clone()),
            position: None,
            previous_signal: Direction::Flat,
            rejections: HashMap::new(),
        }
    }

    pub fn state(&self) -> PositionState {
        match self.position.as_ref().map(|p| p.direction) {
            Some(Direction::Long) => PositionState::OpenLong,
            Some(Direction::Short) => PositionState::OpenShort,
            _ => PositionState::Flat,
        }
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    /// Entries refused by the risk governor, by reason.
    pub fn rejections(&self) -> &HashMap<RiskRejection, usize> {
        &self.rejections
    }

    /// Start a new walk-forward window: the first directional signal counts as a crossing.
    pub fn begin_window(&mut self) {
        self.previous_signal = Direction::Flat;
    }

    /// Advance one bar. Returns the trade closed on this bar, if any.
    pub fn on_bar(&mut self, ctx: &BarContext<'_>, portfolio: &mut Portfolio) -> Option<Trade> {
        let bar = ctx.bar;
        self.governor
            .roll_day(bar.session_date(), portfolio.realized_equity);

        let exit = self
            .position
            .as_ref()
            .filter(|p| ctx.bar_index > p.opened_at_bar_index)
            .and_then(|p| check_exit(p, ctx, &self.strategy.exits));
        let closed = match exit {
            Some((reason, raw_price)) => self.close(ctx, reason, raw_price, portfolio),
            None => None,
        };

        if let Some(position) = self
            .position
            .as_mut()
            .filter(|p| ctx.bar_index > p.opened_at_bar_index)
        {
            position.update_high_water_mark(bar.low, bar.high);
        }

        if self.position.is_none() && self.is_entry_candidate(ctx) {
            self.try_enter(ctx, portfolio);
        }

        self.previous_signal = ctx.signal;

        let open_pnl = self
            .position
            .as_ref()
            .map(|p| p.unrealized_pnl(bar.close) - p.entry_commission)
            .unwrap_or(0.0);
        portfolio.mark(bar.timestamp, open_pnl);

        closed
    }

    /// Close any open position at this bar's close with reason `eod`.
    pub fn force_close(
        &mut self,
        ctx: &BarContext<'_>,
        portfolio: &mut Portfolio,
    ) -> Option<Trade> {
        match self.position.as_ref() {
            Some(position) if ctx.bar_index > position.opened_at_bar_index => {
                self.close(ctx, ExitReason::Eod, ctx.bar.close, portfolio)
            }
            _ => None,
        }
    }

    fn is_entry_candidate(&self, ctx: &BarContext<'_>) -> bool {
        let crossed = ctx.signal != Direction::Flat && ctx.signal != self.previous_signal;
        let shorting_ok = ctx.signal != Direction::Short || self.strategy.allow_shorting;
        crossed
            && shorting_ok
            && !ctx.is_last_bar
            && self.strategy.allows_entry_at(ctx.bar.time_of_day())
    }

    fn try_enter(&mut self, ctx: &BarContext<'_>, portfolio: &Portfolio) {
        let direction = ctx.signal;
        let execution = &self.strategy.execution;
        let entry_price = entry_fill(direction, ctx.bar.close, execution.slippage_bps);
        let (stop_price, target_price) =
            protective_levels(direction, entry_price, &self.strategy.exits);

        let size = match self
            .governor
            .evaluate(portfolio.realized_equity, entry_price, stop_price)
        {
            Ok(size) => size,
            Err(rejection) => {
                debug!(
                    symbol = %self.symbol,
                    time = %ctx.bar.timestamp,
                    %direction,
                    %rejection,
                    "entry rejected"
                );
                *self.rejections.entry(rejection).or_insert(0) += 1;
                return;
            }
        };

        let entry_commission = calculate_commission(entry_price * size as f64, execution);
        self.governor.record_entry();
        trace!(
            symbol = %self.symbol,
            time = %ctx.bar.timestamp,
            %direction,
            entry_price,
            size,
            "position opened"
        );
        self.position = Some(Position {
            symbol: self.symbol.clone(),
            direction,
            entry_price,
            entry_time: ctx.bar.timestamp,
            size,
            stop_price,
            target_price,
            opened_at_bar_index: ctx.bar_index,
            high_water_mark: ctx.bar.close,
            initial_risk_per_share: (entry_price - stop_price).abs(),
            entry_commission,
        });
    }

    fn close(
        &mut self,
        ctx: &BarContext<'_>,
        reason: ExitReason,
        raw_price: f64,
        portfolio: &mut Portfolio,
    ) -> Option<Trade> {
        let position = self.position.take()?;
        let execution = &self.strategy.execution;
        let exit_price = exit_fill(position.direction, raw_price, execution.slippage_bps);

        let per_share = position.per_share_pnl(exit_price);
        let exit_commission = calculate_commission(exit_price * position.size as f64, execution);
        let pnl_dollars =
            per_share * position.size as f64 - position.entry_commission - exit_commission;
        let r_multiple = if position.initial_risk_per_share > 0.0 {
            per_share / position.initial_risk_per_share
        } else {
            0.0
        };

        let trade = Trade {
            symbol: position.symbol,
            direction: position.direction,
            entry_time: position.entry_time,
            exit_time: ctx.bar.timestamp,
            entry_price: position.entry_price,
            exit_price,
            size: position.size,
            pnl_pct: pnl_pct(position.direction, position.entry_price, exit_price),
            pnl_dollars,
            r_multiple,
            exit_reason: reason,
            hold_bars: ctx.bar_index - position.opened_at_bar_index,
        };

        trace!(
            symbol = %trade.symbol,
            time = %trade.exit_time,
            reason = %trade.exit_reason,
            pnl = trade.pnl_dollars,
            "position closed"
        );
        self.governor.record_exit(trade.pnl_dollars);
        portfolio.record_trade(trade.clone());
        Some(trade)
    }
}
