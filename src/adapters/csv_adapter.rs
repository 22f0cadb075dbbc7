//! CSV file candle adapter.
//!
//! One file per series, named `<SYMBOL>_<INTERVAL>.csv`, with a header row
//! `open_time,open,high,low,close[,volume]`.

use crate::domain::candle::Candle;
use crate::domain::error::BacktestError;
use crate::ports::candle_port::CandlePort;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const REQUIRED_COLUMNS: [&str; 5] = ["open_time", "open", "high", "low", "close"];

pub struct CsvCandleAdapter {
    base_path: PathBuf,
}

impl CsvCandleAdapter {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn csv_path(&self, symbol: &str, interval: &str) -> PathBuf {
        self.base_path.join(format!("{}_{}.csv", symbol, interval))
    }
}

/// Epoch milliseconds, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD`.
pub fn parse_open_time(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(millis) = value.parse::<i64>() {
        return DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc());
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(ts);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn data_error(path: &Path, reason: impl std::fmt::Display) -> BacktestError {
    BacktestError::Data {
        reason: format!("{}: {}", path.display(), reason),
    }
}

fn parse_price(
    record: &csv::StringRecord,
    column: usize,
    name: &str,
    line: usize,
    path: &Path,
) -> Result<f64, BacktestError> {
    let raw = record
        .get(column)
        .ok_or_else(|| data_error(path, format!("line {line}: missing {name} column")))?;
    raw.trim()
        .parse()
        .map_err(|e| data_error(path, format!("line {line}: invalid {name} value '{raw}': {e}")))
}

/// Read candles from a CSV file, sorted by time; a repeated open_time keeps the last row.
pub fn read_candles(path: &Path) -> Result<Vec<Candle>, BacktestError> {
    let content = fs::read_to_string(path)
        .map_err(|e| data_error(path, format!("failed to read: {e}")))?;

    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    let headers = rdr
        .headers()
        .map_err(|e| data_error(path, format!("CSV header error: {e}")))?
        .clone();

    let mut columns = [0usize; 5];
    for (slot, name) in columns.iter_mut().zip(REQUIRED_COLUMNS) {
        *slot = headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .ok_or_else(|| data_error(path, format!("missing {name} column")))?;
    }
    let [time_col, open_col, high_col, low_col, close_col] = columns;

    let mut candles = Vec::new();
    for (i, result) in rdr.records().enumerate() {
        let line = i + 2;
        let record =
            result.map_err(|e| data_error(path, format!("line {line}: CSV parse error: {e}")))?;

        let time_str = record
            .get(time_col)
            .ok_or_else(|| data_error(path, format!("line {line}: missing open_time column")))?;
        let timestamp = parse_open_time(time_str).ok_or_else(|| {
            data_error(path, format!("line {line}: invalid open_time '{time_str}'"))
        })?;

        candles.push(Candle {
            timestamp,
            open: parse_price(&record, open_col, "open", line, path)?,
            high: parse_price(&record, high_col, "high", line, path)?,
            low: parse_price(&record, low_col, "low", line, path)?,
            close: parse_price(&record, close_col, "close", line, path)?,
        });
    }

    let rows = candles.len();
    let candles = sort_and_dedup(candles);
    if candles.len() < rows {
        warn!(
            path = %path.display(),
            dropped = rows - candles.len(),
            "duplicate open_time rows replaced by later rows"
        );
    }
    debug!(path = %path.display(), candles = candles.len(), "read candles");
    Ok(candles)
}

fn sort_and_dedup(mut candles: Vec<Candle>) -> Vec<Candle> {
    candles.sort_by_key(|c| c.timestamp);
    let mut out: Vec<Candle> = Vec::with_capacity(candles.len());
    for candle in candles {
        match out.last_mut() {
            Some(last) if last.timestamp == candle.timestamp => *last = candle,
            _ => out.push(candle),
        }
    }
    out
}

impl CandlePort for CsvCandleAdapter {
    fn fetch_candles(&self, symbol: &str, interval: &str) -> Result<Vec<Candle>, BacktestError> {
        read_candles(&self.csv_path(symbol, interval))
    }

    fn list_series(&self) -> Result<Vec<(String, String)>, BacktestError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| BacktestError::Data {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut series = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| BacktestError::Data {
                reason: format!("directory entry error: {}", e),
            })?;

            let name = entry.file_name();
            let name_str = name.to_string_lossy();

            if let Some(stem) = name_str.strip_suffix(".csv") {
                if let Some((symbol, interval)) = stem.rsplit_once('_') {
                    if !symbol.is_empty() && !interval.is_empty() {
                        series.push((symbol.to_string(), interval.to_string()));
                    }
                }
            }
        }

        series.sort();
        Ok(series)
    }
}
