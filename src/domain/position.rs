//! Open positions and closed trade records.

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
    Flat,
}

impl Direction {
    /// +1 for long, -1 for short, 0 for flat.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
            Direction::Flat => 0.0,
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
            Direction::Flat => Direction::Flat,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
            Direction::Flat => "flat",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a position was closed, in the priority order the state machine checks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    Target,
    TrailingStop,
    ReturnToRange,
    Timeout,
    Eod,
}

impl ExitReason {
    pub const ALL: [ExitReason; 6] = [
        ExitReason::StopLoss,
        ExitReason::Target,
        ExitReason::TrailingStop,
        ExitReason::ReturnToRange,
        ExitReason::Timeout,
        ExitReason::Eod,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::Target => "target",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::ReturnToRange => "return_to_range",
            ExitReason::Timeout => "timeout",
            ExitReason::Eod => "eod",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub direction: Direction,
    /// Effective (slipped) fill price.
    pub entry_price: f64,
    pub entry_time: NaiveDateTime,
    pub size: u64,
    pub stop_price: f64,
    /// Zero when the strategy has no take-profit.
    pub target_price: f64,
    pub opened_at_bar_index: usize,
    /// Most favourable price seen since entry: highest high for longs, lowest low for shorts.
    pub high_water_mark: f64,
    pub initial_risk_per_share: f64,
    pub entry_commission: f64,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.direction == Direction::Long
    }

    pub fn is_short(&self) -> bool {
        self.direction == Direction::Short
    }

    /// Per-share profit at `price`, positive when the move favours the position.
    pub fn per_share_pnl(&self, price: f64) -> f64 {
        self.direction.sign() * (price - self.entry_price)
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.size as f64 * self.per_share_pnl(price)
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.size as f64 * price
    }

    pub fn bars_held(&self, bar_index: usize) -> usize {
        bar_index.saturating_sub(self.opened_at_bar_index)
    }

    pub fn should_stop_loss(&self, low: f64, high: f64) -> bool {
        if self.stop_price <= 0.0 {
            return false;
        }
        if self.is_long() {
            low <= self.stop_price
        } else {
            high >= self.stop_price
        }
    }

    pub fn should_take_profit(&self, low: f64, high: f64) -> bool {
        if self.target_price <= 0.0 {
            return false;
        }
        if self.is_long() {
            high >= self.target_price
        } else {
            low <= self.target_price
        }
    }

    /// Fold a bar's extreme into the high-water mark.
    pub fn update_high_water_mark(&mut self, low: f64, high: f64) {
        self.high_water_mark = if self.is_long() {
            self.high_water_mark.max(high)
        } else {
            self.high_water_mark.min(low)
        };
    }
}

/// Immutable record of a closed position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub symbol: String,
    pub direction: Direction,
    pub entry_time: NaiveDateTime,
    pub exit_time: NaiveDateTime,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: u64,
    pub pnl_pct: f64,
    pub pnl_dollars: f64,
    pub r_multiple: f64,
    pub exit_reason: ExitReason,
    pub hold_bars: usize,
}

impl Trade {
    pub fn hold_duration(&self) -> Duration {
        self.exit_time - self.entry_time
    }

    pub fn is_win(&self) -> bool {
        self.pnl_dollars > 0.0
    }

    pub fn is_loss(&self) -> bool {
        self.pnl_dollars < 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn sample_long_position() -> Position {
        Position {
            symbol: "SPY".into(),
            direction: Direction::Long,
            entry_price: 100.0,
            entry_time: ts("2024-01-15 09:45"),
            size: 100,
            stop_price: 99.0,
            target_price: 102.0,
            opened_at_bar_index: 10,
            high_water_mark: 100.0,
            initial_risk_per_share: 1.0,
            entry_commission: 0.0,
        }
    }

    fn sample_short_position() -> Position {
        Position {
            direction: Direction::Short,
            stop_price: 101.0,
            target_price: 98.0,
            ..sample_long_position()
        }
    }

    #[test]
    fn direction_sign_and_opposite() {
        assert_eq!(Direction::Long.sign(), 1.0);
        assert_eq!(Direction::Short.sign(), -1.0);
        assert_eq!(Direction::Flat.sign(), 0.0);
        assert_eq!(Direction::Long.opposite(), Direction::Short);
        assert_eq!(Direction::Flat.opposite(), Direction::Flat);
    }

    #[test]
    fn exit_reason_labels() {
        let labels: Vec<&str> = ExitReason::ALL.iter().map(|r| r.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "stop_loss",
                "target",
                "trailing_stop",
                "return_to_range",
                "timeout",
                "eod"
            ]
        );
    }

    #[test]
    fn unrealized_pnl_long_and_short() {
        assert!((sample_long_position().unrealized_pnl(101.5) - 150.0).abs() < 1e-9);
        assert!((sample_short_position().unrealized_pnl(101.5) - (-150.0)).abs() < 1e-9);
    }

    #[test]
    fn stop_loss_long_uses_low() {
        let pos = sample_long_position();
        assert!(pos.should_stop_loss(98.9, 100.5));
        assert!(pos.should_stop_loss(99.0, 100.5));
        assert!(!pos.should_stop_loss(99.1, 100.5));
    }

    #[test]
    fn stop_loss_short_uses_high() {
        let pos = sample_short_position();
        assert!(pos.should_stop_loss(99.5, 101.0));
        assert!(!pos.should_stop_loss(99.5, 100.9));
    }

    #[test]
    fn take_profit_both_directions() {
        assert!(sample_long_position().should_take_profit(100.0, 102.0));
        assert!(!sample_long_position().should_take_profit(100.0, 101.9));
        assert!(sample_short_position().should_take_profit(98.0, 100.0));
        assert!(!sample_short_position().should_take_profit(98.1, 100.0));
    }

    #[test]
    fn take_profit_disabled_when_zero() {
        let mut pos = sample_long_position();
        pos.target_price = 0.0;
        assert!(!pos.should_take_profit(0.0, 1_000_000.0));
    }

    #[test]
    fn high_water_mark_tracks_favourable_extreme() {
        let mut long = sample_long_position();
        long.update_high_water_mark(99.5, 101.2);
        long.update_high_water_mark(99.0, 100.8);
        assert!((long.high_water_mark - 101.2).abs() < f64::EPSILON);

        let mut short = sample_short_position();
        short.update_high_water_mark(99.4, 100.2);
        short.update_high_water_mark(99.6, 100.1);
        assert!((short.high_water_mark - 99.4).abs() < f64::EPSILON);
    }

    #[test]
    fn bars_held_counts_from_entry() {
        let pos = sample_long_position();
        assert_eq!(pos.bars_held(10), 0);
        assert_eq!(pos.bars_held(25), 15);
    }

    #[test]
    fn trade_hold_duration() {
        let trade = Trade {
            symbol: "SPY".into(),
            direction: Direction::Long,
            entry_time: ts("2024-01-15 09:45"),
            exit_time: ts("2024-01-15 10:15"),
            entry_price: 100.0,
            exit_price: 100.5,
            size: 100,
            pnl_pct: 0.5,
            pnl_dollars: 50.0,
            r_multiple: 0.5,
            exit_reason: ExitReason::Target,
            hold_bars: 30,
        };
        assert_eq!(trade.hold_duration(), Duration::minutes(30));
        assert!(trade.is_win());
        assert!(!trade.is_loss());
    }
}
