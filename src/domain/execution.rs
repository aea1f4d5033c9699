//! Fill simulation: slippage, commissions, protective levels and exit triggers.
//!
//! Friction is symmetric: every fill moves against the trader by
//! `slippage_bps` basis points, on both the entry and the exit leg. Stop and
//! target levels are derived from the slipped entry price.

use super::ohlcv::Bar;
use super::position::{Direction, ExitReason, Position};

/// Friction parameters applied to every simulated fill.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionConfig {
    pub slippage_bps: f64,
    pub commission_per_trade: f64,
    pub commission_pct: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            slippage_bps: 0.0,
            commission_per_trade: 0.0,
            commission_pct: 0.0,
        }
    }
}

/// Exit-side strategy parameters, all percentages of the entry price.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitRules {
    pub stop_loss_pct: f64,
    /// Zero disables the take-profit.
    pub take_profit_pct: f64,
    /// Zero disables the trailing stop.
    pub trailing_stop_pct: f64,
    /// Favourable excursion required before the trailing stop arms.
    pub trail_activation_pct: f64,
    /// Zero disables the holding-time limit.
    pub max_hold_bars: usize,
    /// Also exit when the signal returns to flat, not only on reversal.
    pub exit_on_flat: bool,
}

impl Default for ExitRules {
    fn default() -> Self {
        ExitRules {
            stop_loss_pct: 0.2,
            take_profit_pct: 0.3,
            trailing_stop_pct: 0.0,
            trail_activation_pct: 0.0,
            max_hold_bars: 0,
            exit_on_flat: false,
        }
    }
}

/// Calculate commission: flat_fee + (trade_value * pct / 100).
pub fn calculate_commission(trade_value: f64, config: &ExecutionConfig) -> f64 {
    config.commission_per_trade + (trade_value * config.commission_pct / 100.0)
}

fn bps_fraction(slippage_bps: f64) -> f64 {
    slippage_bps / 10_000.0
}

/// Long entry (buy): price * (1 + slip)
pub fn apply_slippage_long_entry(market_price: f64, slippage_bps: f64) -> f64 {
    market_price * (1.0 + bps_fraction(slippage_bps))
}

/// Short entry (sell short): price * (1 - slip)
pub fn apply_slippage_short_entry(market_price: f64, slippage_bps: f64) -> f64 {
    market_price * (1.0 - bps_fraction(slippage_bps))
}

/// Long exit (sell): price * (1 - slip)
pub fn apply_slippage_long_exit(market_price: f64, slippage_bps: f64) -> f64 {
    market_price * (1.0 - bps_fraction(slippage_bps))
}

/// Short exit (buy to cover): price * (1 + slip)
pub fn apply_slippage_short_exit(market_price: f64, slippage_bps: f64) -> f64 {
    market_price * (1.0 + bps_fraction(slippage_bps))
}

pub fn entry_fill(direction: Direction, market_price: f64, slippage_bps: f64) -> f64 {
    match direction {
        Direction::Short => apply_slippage_short_entry(market_price, slippage_bps),
        _ => apply_slippage_long_entry(market_price, slippage_bps),
    }
}

pub fn exit_fill(direction: Direction, market_price: f64, slippage_bps: f64) -> f64 {
    match direction {
        Direction::Short => apply_slippage_short_exit(market_price, slippage_bps),
        _ => apply_slippage_long_exit(market_price, slippage_bps),
    }
}

/// Percent return of a round trip on effective prices.
pub fn pnl_pct(direction: Direction, entry_price: f64, exit_price: f64) -> f64 {
    if entry_price == 0.0 {
        return 0.0;
    }
    direction.sign() * (exit_price - entry_price) / entry_price * 100.0
}

/// Stop and target prices around an effective entry. A zero target percent yields target 0.
pub fn protective_levels(direction: Direction, entry_price: f64, rules: &ExitRules) -> (f64, f64) {
    let sign = direction.sign();
    let stop = entry_price * (1.0 - sign * rules.stop_loss_pct / 100.0);
    let target = if rules.take_profit_pct > 0.0 {
        entry_price * (1.0 + sign * rules.take_profit_pct / 100.0)
    } else {
        0.0
    };
    (stop, target)
}

/// Trailing stop level for the current high-water mark, or `None` when not armed.
pub fn trailing_level(position: &Position, rules: &ExitRules) -> Option<f64> {
    if rules.trailing_stop_pct <= 0.0 {
        return None;
    }
    let excursion_pct =
        position.per_share_pnl(position.high_water_mark) / position.entry_price * 100.0;
    if excursion_pct < rules.trail_activation_pct {
        return None;
    }
    let sign = position.direction.sign();
    Some(position.high_water_mark * (1.0 - sign * rules.trailing_stop_pct / 100.0))
}

/// Raw fill for an adverse resting level (stop or trail): the level, or the open on a gap
/// through it.
fn adverse_fill(direction: Direction, level: f64, bar: &Bar) -> f64 {
    match direction {
        Direction::Short => level.max(bar.open),
        _ => level.min(bar.open),
    }
}

/// Raw fill for the target: the level, or the open when the bar gaps beyond it.
fn favourable_fill(direction: Direction, level: f64, bar: &Bar) -> f64 {
    match direction {
        Direction::Short => level.min(bar.open),
        _ => level.max(bar.open),
    }
}

/// What the state machine knows about the bar being evaluated.
#[derive(Debug, Clone, Copy)]
pub struct BarContext<'a> {
    pub bar: &'a Bar,
    pub bar_index: usize,
    pub signal: Direction,
    /// Final bar of the window: positions must not survive it.
    pub is_last_bar: bool,
}

/// Resolve the exit for an open position on one bar.
///
/// Checked in fixed priority order: stop, target, trailing stop, signal
/// reversal, holding-time limit, forced close. Returns the reason and the raw
/// (pre-slippage) fill price.
pub fn check_exit(
    position: &Position,
    ctx: &BarContext<'_>,
    rules: &ExitRules,
) -> Option<(ExitReason, f64)> {
    let bar = ctx.bar;
    let direction = position.direction;

    if position.should_stop_loss(bar.low, bar.high) {
        return Some((
            ExitReason::StopLoss,
            adverse_fill(direction, position.stop_price, bar),
        ));
    }

    if position.should_take_profit(bar.low, bar.high) {
        return Some((
            ExitReason::Target,
            favourable_fill(direction, position.target_price, bar),
        ));
    }

    if let Some(level) = trailing_level(position, rules) {
        let touched = match direction {
            Direction::Short => bar.high >= level,
            _ => bar.low <= level,
        };
        if touched {
            return Some((ExitReason::TrailingStop, adverse_fill(direction, level, bar)));
        }
    }

    let reversed = ctx.signal == direction.opposite();
    let flattened = rules.exit_on_flat && ctx.signal == Direction::Flat;
    if reversed || flattened {
        return Some((ExitReason::ReturnToRange, bar.close));
    }

    if rules.max_hold_bars > 0 && position.bars_held(ctx.bar_index) >= rules.max_hold_bars {
        return Some((ExitReason::Timeout, bar.close));
    }

    if ctx.is_last_bar {
        return Some((ExitReason::Eod, bar.close));
    }

    None
}
