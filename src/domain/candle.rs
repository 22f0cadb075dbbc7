//! OHLC candle representation and series validation.

use chrono::NaiveDateTime;

use super::error::BacktestError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    /// (open + high + low + close) / 4
    pub fn ohlc_mean(&self) -> f64 {
        (self.open + self.high + self.low + self.close) / 4.0
    }

    fn prices(&self) -> [(&'static str, f64); 4] {
        [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ]
    }
}

/// Reject empty, unsorted, duplicated or non-positive input before any state is built.
pub fn validate_series(candles: &[Candle]) -> Result<(), BacktestError> {
    if candles.is_empty() {
        return Err(BacktestError::InvalidInput {
            index: None,
            reason: "candle series is empty".into(),
        });
    }

    for (i, candle) in candles.iter().enumerate() {
        for (name, value) in candle.prices() {
            if !value.is_finite() {
                return Err(BacktestError::input(i, format!("{name} is not finite")));
            }
            if value <= 0.0 {
                return Err(BacktestError::input(
                    i,
                    format!("{name} must be positive, got {value}"),
                ));
            }
        }
        if i > 0 && candle.timestamp <= candles[i - 1].timestamp {
            return Err(BacktestError::input(
                i,
                format!(
                    "timestamp {} does not follow {}",
                    candle.timestamp,
                    candles[i - 1].timestamp
                ),
            ));
        }
    }

    Ok(())
}
