//! CSV report adapter.
//!
//! Writes `derived.csv`, `bars.csv`, `trades.csv`, `equity.csv` and
//! `metrics.csv` into an output directory.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::BacktestError;
use crate::domain::heikin_ashi::DerivedCandle;
use crate::domain::metrics::Metrics;
use crate::ports::report_port::ReportPort;
use chrono::NaiveDateTime;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::info;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct CsvReportAdapter;

fn fmt_ts(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn csv_error(path: &Path, e: impl std::fmt::Display) -> BacktestError {
    BacktestError::Data {
        reason: format!("failed to write {}: {}", path.display(), e),
    }
}

fn write_records<W, I>(
    wtr: &mut csv::Writer<W>,
    header: &[&str],
    rows: I,
    label: &Path,
) -> Result<(), BacktestError>
where
    W: Write,
    I: IntoIterator<Item = Vec<String>>,
{
    wtr.write_record(header).map_err(|e| csv_error(label, e))?;
    for row in rows {
        wtr.write_record(&row).map_err(|e| csv_error(label, e))?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_rows<I>(path: &Path, header: &[&str], rows: I) -> Result<(), BacktestError>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut wtr = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    write_records(&mut wtr, header, rows, path)
}

const DERIVED_HEADER: [&str; 5] = ["open_time", "open", "high", "low", "close"];

fn derived_rows(derived: &[DerivedCandle]) -> impl Iterator<Item = Vec<String>> + '_ {
    derived.iter().map(|d| {
        vec![
            fmt_ts(&d.timestamp),
            d.open.to_string(),
            d.high.to_string(),
            d.low.to_string(),
            d.close.to_string(),
        ]
    })
}

/// Write a derived candle series as `open_time,open,high,low,close`.
pub fn write_derived(path: &Path, derived: &[DerivedCandle]) -> Result<(), BacktestError> {
    write_rows(path, &DERIVED_HEADER, derived_rows(derived))
}

/// Same layout as [`write_derived`], to any writer.
pub fn write_derived_to<W: Write>(
    writer: W,
    derived: &[DerivedCandle],
) -> Result<(), BacktestError> {
    let mut wtr = csv::Writer::from_writer(writer);
    write_records(&mut wtr, &DERIVED_HEADER, derived_rows(derived), Path::new("<stream>"))
}

fn write_bars(path: &Path, result: &BacktestResult) -> Result<(), BacktestError> {
    write_rows(
        path,
        &[
            "index", "timestamp", "price", "fast_ema", "slow_ema", "signal", "event", "action",
            "position", "lots", "equity",
        ],
        result.bars.iter().map(|b| {
            vec![
                b.index.to_string(),
                fmt_ts(&b.timestamp),
                b.price.to_string(),
                b.fast.to_string(),
                b.slow.to_string(),
                b.signal.to_string(),
                b.event.map(|e| e.to_string()).unwrap_or_default(),
                b.action.to_string(),
                b.position.to_string(),
                b.lot_label.clone(),
                b.equity.to_string(),
            ]
        }),
    )
}

fn write_trades(path: &Path, result: &BacktestResult) -> Result<(), BacktestError> {
    write_rows(
        path,
        &[
            "lot_id",
            "quantity",
            "entry_time",
            "entry_price",
            "exit_time",
            "exit_price",
            "realized_pnl",
            "commission",
            "net_pnl",
        ],
        result.trades.iter().map(|t| {
            vec![
                t.lot_id.to_string(),
                t.matched_quantity.to_string(),
                fmt_ts(&t.entry_timestamp),
                t.entry_price.to_string(),
                fmt_ts(&t.exit_timestamp),
                t.exit_price.to_string(),
                t.realized_pnl.to_string(),
                t.commission.to_string(),
                t.net_pnl().to_string(),
            ]
        }),
    )
}

fn write_equity(path: &Path, result: &BacktestResult) -> Result<(), BacktestError> {
    write_rows(
        path,
        &["timestamp", "equity"],
        result
            .equity_curve
            .iter()
            .map(|p| vec![fmt_ts(&p.timestamp), p.equity.to_string()]),
    )
}

fn write_metrics(path: &Path, result: &BacktestResult, m: &Metrics) -> Result<(), BacktestError> {
    let s = &result.summary;
    let rows: Vec<(&str, String)> = vec![
        ("strategy", result.strategy.to_string()),
        ("lot_quantity", result.lot_quantity.to_string()),
        ("exit_quantity", result.exit_quantity.to_string()),
        ("initial_capital", s.initial_capital.to_string()),
        ("final_equity", s.final_equity.to_string()),
        ("total_realized_pnl", s.total_realized_pnl.to_string()),
        ("total_commission", s.total_commission.to_string()),
        ("unrealized_pnl", s.unrealized_pnl.to_string()),
        ("return_pct", s.return_pct.to_string()),
        ("annualized_return", m.annualized_return.to_string()),
        ("sharpe_ratio", m.sharpe_ratio.to_string()),
        ("sortino_ratio", m.sortino_ratio.to_string()),
        ("max_drawdown", m.max_drawdown.to_string()),
        ("max_drawdown_bars", m.max_drawdown_duration.to_string()),
        ("total_trades", m.total_trades.to_string()),
        ("win_rate", m.win_rate.to_string()),
        ("profit_factor", m.profit_factor.to_string()),
        ("avg_holding_hours", m.avg_holding_hours.to_string()),
        ("open_lots", result.open_lots.len().to_string()),
    ];
    write_rows(
        path,
        &["metric", "value"],
        rows.into_iter().map(|(k, v)| vec![k.to_string(), v]),
    )
}

impl ReportPort for CsvReportAdapter {
    fn write(
        &self,
        result: &BacktestResult,
        metrics: &Metrics,
        output_dir: &Path,
    ) -> Result<(), BacktestError> {
        fs::create_dir_all(output_dir)?;

        write_derived(&output_dir.join("derived.csv"), &result.derived)?;
        write_bars(&output_dir.join("bars.csv"), result)?;
        write_trades(&output_dir.join("trades.csv"), result)?;
        write_equity(&output_dir.join("equity.csv"), result)?;
        write_metrics(&output_dir.join("metrics.csv"), result, metrics)?;

        info!(dir = %output_dir.display(), "wrote CSV reports");
        Ok(())
    }
}
