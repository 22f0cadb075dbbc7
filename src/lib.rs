//! kline-backtester: long-only EMA crossover backtests over raw or Heikin-Ashi derived candles.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
