//! Exponential Moving Average indicator.
//!
//! k = 2/(n+1), seeded with the first price, then EMA[i] = EMA[i-1] + k*(P[i] - EMA[i-1]).
//! There is no warmup: EMA[0] == P[0]. A flat price leaves the average bit-exact.

use crate::domain::error::BacktestError;

pub fn smoothing_factor(period: usize) -> f64 {
    2.0 / (period as f64 + 1.0)
}

pub fn calculate_ema(prices: &[f64], period: usize) -> Result<Vec<f64>, BacktestError> {
    if period == 0 {
        return Err(BacktestError::parameter("period", "must be at least 1"));
    }

    let k = smoothing_factor(period);
    let mut values = Vec::with_capacity(prices.len());
    let mut ema = match prices.first() {
        Some(&first) => first,
        None => return Ok(values),
    };

    for &price in prices {
        ema += k * (price - ema);
        values.push(ema);
    }

    Ok(values)
}
