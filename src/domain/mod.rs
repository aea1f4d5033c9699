//! Core domain types and simulation logic.

pub mod ohlcv;
pub mod session;
pub mod indicator;
pub mod position;
pub mod execution;
pub mod risk;
pub mod strategy;
pub mod signal;
pub mod walk_forward;
pub mod portfolio;
pub mod state_machine;
pub mod metrics;
pub mod backtest;
pub mod universe;
pub mod batch;
pub mod config_validation;
pub mod error;
