//! Core domain types and logic.

pub mod candle;
pub mod heikin_ashi;
pub mod indicator;
pub mod signal;
pub mod lot;
pub mod ledger;
pub mod equity;
pub mod strategy;
pub mod backtest;
pub mod metrics;
pub mod config_validation;
pub mod error;
