#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use kline_backtester::domain::backtest::BacktestConfig;
pub use kline_backtester::domain::candle::Candle;
use kline_backtester::domain::error::BacktestError;
use kline_backtester::ports::candle_port::CandlePort;
use std::collections::HashMap;
use std::path::Path;

pub struct MockCandlePort {
    pub data: HashMap<(String, String), Vec<Candle>>,
    pub errors: HashMap<String, String>,
}

impl MockCandlePort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_candles(mut self, symbol: &str, interval: &str, candles: Vec<Candle>) -> Self {
        self.data
            .insert((symbol.to_string(), interval.to_string()), candles);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl CandlePort for MockCandlePort {
    fn fetch_candles(&self, symbol: &str, interval: &str) -> Result<Vec<Candle>, BacktestError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(BacktestError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(&(symbol.to_string(), interval.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn list_series(&self) -> Result<Vec<(String, String)>, BacktestError> {
        let mut keys: Vec<_> = self.data.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

pub fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

pub fn hour(i: usize) -> NaiveDateTime {
    start() + Duration::hours(i as i64)
}

pub fn make_candle(i: usize, close: f64) -> Candle {
    Candle {
        timestamp: hour(i),
        open: close - 0.5,
        high: close + 1.0,
        low: close - 1.0,
        close,
    }
}

pub fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| make_candle(i, c))
        .collect()
}

/// `up` bars rising by `step`, then `down` bars falling by `step`.
pub fn rise_then_fall(up: usize, down: usize, start_price: f64, step: f64) -> Vec<f64> {
    let mut closes: Vec<f64> = (0..up).map(|i| start_price + step * i as f64).collect();
    let peak = closes.last().copied().unwrap_or(start_price);
    closes.extend((1..=down).map(|i| peak - step * i as f64));
    closes
}

/// Alternating rising and falling legs of `leg` bars each.
pub fn zigzag(legs: usize, leg: usize, start_price: f64, step: f64) -> Vec<f64> {
    let mut closes = vec![start_price];
    for l in 0..legs {
        let dir = if l % 2 == 0 { 1.0 } else { -1.0 };
        for _ in 0..leg {
            let last = closes[closes.len() - 1];
            closes.push(last + dir * step);
        }
    }
    closes
}

pub fn fixed_config(quantity: f64) -> BacktestConfig {
    BacktestConfig {
        fixed_lot_quantity: Some(quantity),
        ..BacktestConfig::default()
    }
}

pub fn write_series_csv(dir: &Path, symbol: &str, interval: &str, candles: &[Candle]) {
    let mut content = String::from("open_time,open,high,low,close,volume\n");
    for c in candles {
        content.push_str(&format!(
            "{},{},{},{},{},1000\n",
            c.timestamp.and_utc().timestamp_millis(),
            c.open,
            c.high,
            c.low,
            c.close
        ));
    }
    std::fs::write(dir.join(format!("{symbol}_{interval}.csv")), content).unwrap();
}
