//! Realized-equity ledger and mark-to-market equity curve.

use chrono::NaiveDateTime;
use serde::Serialize;

use super::position::Trade;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
}

/// Equity sampled once per simulated bar, strictly increasing in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EquityCurve {
    points: Vec<EquityPoint>,
}

impl EquityCurve {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a point; returns false and drops it when it is not later than the last one.
    pub fn push(&mut self, timestamp: NaiveDateTime, equity: f64) -> bool {
        if self.points.last().is_some_and(|p| timestamp <= p.timestamp) {
            return false;
        }
        self.points.push(EquityPoint { timestamp, equity });
        true
    }

    pub fn points(&self) -> &[EquityPoint] {
        &self.points
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.equity).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<&EquityPoint> {
        self.points.last()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub initial_equity: f64,
    /// Initial equity plus every realized trade's net P&L.
    pub realized_equity: f64,
    pub closed_trades: Vec<Trade>,
    pub equity_curve: EquityCurve,
}

impl Portfolio {
    pub fn new(initial_equity: f64) -> Self {
        Portfolio {
            initial_equity,
            realized_equity: initial_equity,
            closed_trades: Vec::new(),
            equity_curve: EquityCurve::new(),
        }
    }

    pub fn record_trade(&mut self, trade: Trade) {
        self.realized_equity += trade.pnl_dollars;
        self.closed_trades.push(trade);
    }

    /// Record a mark-to-market sample: realized equity plus open P&L.
    pub fn mark(&mut self, timestamp: NaiveDateTime, unrealized_pnl: f64) {
        self.equity_curve
            .push(timestamp, self.realized_equity + unrealized_pnl);
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_equity - self.initial_equity
    }

    pub fn trade_count(&self) -> usize {
        self.closed_trades.len()
    }
}
