//! Heikin-Ashi derived candles.
//!
//! d_close = mean(O, H, L, C), d_open[0] = mean(O[0], C[0]),
//! d_open[i] = mean(d_open[i-1], d_close[i-1]).
//! Every open depends on the previous bar, so a series can only be extended
//! from its last `(d_open, d_close)` pair or rebuilt from index 0.

use chrono::NaiveDateTime;

use super::candle::{validate_series, Candle};
use super::error::BacktestError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedCandle {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Incremental builder holding the recurrence state.
#[derive(Debug, Clone, Default)]
pub struct HeikinAshi {
    prev: Option<(f64, f64)>,
}

impl HeikinAshi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue a series whose last derived bar had this open and close.
    pub fn resume(prev_open: f64, prev_close: f64) -> Self {
        HeikinAshi {
            prev: Some((prev_open, prev_close)),
        }
    }

    /// The cached `(d_open, d_close)` of the last bar pushed.
    pub fn state(&self) -> Option<(f64, f64)> {
        self.prev
    }

    pub fn next(&mut self, candle: &Candle) -> DerivedCandle {
        let close = candle.ohlc_mean();
        let open = match self.prev {
            Some((prev_open, prev_close)) => (prev_open + prev_close) / 2.0,
            None => (candle.open + candle.close) / 2.0,
        };
        self.prev = Some((open, close));

        DerivedCandle {
            timestamp: candle.timestamp,
            open,
            high: candle.high.max(open).max(close),
            low: candle.low.min(open).min(close),
            close,
        }
    }
}

/// Validate the raw series and derive one candle per input bar.
pub fn derive_candles(candles: &[Candle]) -> Result<Vec<DerivedCandle>, BacktestError> {
    validate_series(candles)?;
    let mut builder = HeikinAshi::new();
    Ok(candles.iter().map(|c| builder.next(c)).collect())
}
