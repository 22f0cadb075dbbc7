//! Candle source port trait.

use crate::domain::candle::Candle;
use crate::domain::error::BacktestError;

/// A source of ordered candle series keyed by symbol and interval.
pub trait CandlePort {
    /// Candles sorted by timestamp, at most one per timestamp.
    fn fetch_candles(&self, symbol: &str, interval: &str) -> Result<Vec<Candle>, BacktestError>;

    /// Available `(symbol, interval)` pairs, sorted.
    fn list_series(&self) -> Result<Vec<(String, String)>, BacktestError>;
}
