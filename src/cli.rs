//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};

use crate::adapters::csv_adapter::CsvCandleAdapter;
use crate::adapters::csv_report_adapter::{self, CsvReportAdapter};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{self as backtest_engine, BacktestConfig, BacktestResult};
use crate::domain::config_validation::{
    validate_backtest_config, validate_data_config, validate_strategy_config,
};
use crate::domain::error::BacktestError;
use crate::domain::heikin_ashi::derive_candles;
use crate::domain::metrics::Metrics;
use crate::domain::strategy::{PriceSource, Strategy, StrategyKind};
use crate::ports::candle_port::CandlePort;
use crate::ports::config_port::ConfigPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(
    name = "kline-backtester",
    about = "EMA crossover backtester over raw or Heikin-Ashi derived candles"
)]
pub struct Cli {
    /// Log level: error, warn, info, debug or trace
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        interval: Option<String>,
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// raw or derived
        #[arg(long)]
        price_source: Option<String>,
        /// Directory for CSV reports
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write the derived candle series for one symbol
    Derive {
        #[arg(long, default_value = ".")]
        data_dir: PathBuf,
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        interval: String,
        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List candle series available in a data directory
    List {
        #[arg(long, default_value = ".")]
        data_dir: PathBuf,
    },
}

/// Where candles come from, after CLI overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSettings {
    pub directory: PathBuf,
    pub symbol: String,
    pub interval: String,
}

/// CLI flags that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub symbol: Option<String>,
    pub interval: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub price_source: Option<String>,
}

pub fn run(cli: Cli) -> ExitCode {
    let outcome = match cli.command {
        Command::Backtest {
            config,
            symbol,
            interval,
            data_dir,
            price_source,
            output,
        } => {
            let overrides = Overrides {
                symbol,
                interval,
                data_dir,
                price_source,
            };
            run_backtest(&config, &overrides, output.as_deref())
        }
        Command::Derive {
            data_dir,
            symbol,
            interval,
            output,
        } => run_derive(&data_dir, &symbol, &interval, output.as_deref()),
        Command::Validate { config } => run_validate(&config),
        Command::List { data_dir } => run_list(&data_dir),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, BacktestError> {
    FileConfigAdapter::from_file(path)
}

fn validate_all(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    validate_backtest_config(config)?;
    validate_strategy_config(config)?;
    validate_data_config(config)?;
    Ok(())
}

fn optional_double(adapter: &dyn ConfigPort, key: &str) -> Option<f64> {
    adapter
        .get_string("backtest", key)
        .and_then(|s| s.trim().parse().ok())
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, BacktestError> {
    let defaults = BacktestConfig::default();
    let config = BacktestConfig {
        initial_capital: adapter.get_double(
            "backtest",
            "initial_capital",
            defaults.initial_capital,
        ),
        commission_rate: adapter.get_double(
            "backtest",
            "commission_rate",
            defaults.commission_rate,
        ),
        position_size_fraction: adapter.get_double(
            "backtest",
            "position_size_fraction",
            defaults.position_size_fraction,
        ),
        fixed_lot_quantity: optional_double(adapter, "fixed_lot_quantity"),
        exit_lot_quantity: optional_double(adapter, "exit_lot_quantity"),
        risk_free_rate: adapter.get_double("backtest", "risk_free_rate", defaults.risk_free_rate),
        periods_per_year: adapter.get_double(
            "backtest",
            "periods_per_year",
            defaults.periods_per_year,
        ),
    };
    config.validate()?;
    Ok(config)
}

fn period(adapter: &dyn ConfigPort, key: &str, default: usize) -> Result<usize, BacktestError> {
    let value = adapter.get_int("strategy", key, default as i64);
    usize::try_from(value).map_err(|_| BacktestError::ConfigInvalid {
        section: "strategy".into(),
        key: key.into(),
        reason: format!("{key} must be a positive integer, got {value}"),
    })
}

fn parse_price_source(value: &str) -> Result<PriceSource, BacktestError> {
    value
        .parse()
        .map_err(|reason: String| BacktestError::ConfigInvalid {
            section: "strategy".into(),
            key: "price_source".into(),
            reason,
        })
}

pub fn build_strategy(
    adapter: &dyn ConfigPort,
    price_source_override: Option<&str>,
) -> Result<Strategy, BacktestError> {
    let defaults = Strategy::default();

    let kind = match adapter.get_string("strategy", "name") {
        Some(name) => name
            .parse::<StrategyKind>()
            .map_err(|reason| BacktestError::ConfigInvalid {
                section: "strategy".into(),
                key: "name".into(),
                reason,
            })?,
        None => defaults.kind,
    };

    let price_source = match price_source_override
        .map(str::to_string)
        .or_else(|| adapter.get_string("strategy", "price_source"))
    {
        Some(source) => parse_price_source(&source)?,
        None => defaults.price_source,
    };

    let strategy = Strategy {
        kind,
        fast_period: period(adapter, "fast_period", defaults.fast_period)?,
        slow_period: period(adapter, "slow_period", defaults.slow_period)?,
        price_source,
    };
    strategy.validate()?;
    Ok(strategy)
}

pub fn resolve_data_settings(adapter: &dyn ConfigPort, overrides: &Overrides) -> DataSettings {
    let directory = overrides
        .data_dir
        .clone()
        .or_else(|| adapter.get_string("data", "directory").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    let symbol = overrides
        .symbol
        .clone()
        .or_else(|| adapter.get_string("data", "symbol"))
        .unwrap_or_else(|| "BTCUSDT".to_string());
    let interval = overrides
        .interval
        .clone()
        .or_else(|| adapter.get_string("data", "interval"))
        .unwrap_or_else(|| "1h".to_string());

    DataSettings {
        directory,
        symbol: symbol.trim().to_uppercase(),
        interval: interval.trim().to_string(),
    }
}

fn run_backtest(
    config_path: &Path,
    overrides: &Overrides,
    output_dir: Option<&Path>,
) -> Result<(), BacktestError> {
    // Stage 1: Load and validate config
    eprintln!("Loading config from {}", config_path.display());
    let adapter = load_config(config_path)?;
    validate_all(&adapter)?;

    // Stage 2: Build strategy, backtest config and data settings
    let strategy = build_strategy(&adapter, overrides.price_source.as_deref())?;
    let bt_config = build_backtest_config(&adapter)?;
    let data = resolve_data_settings(&adapter, overrides);
    eprintln!("Strategy: {strategy}");

    // Stages 3-6: Candle port dependent pipeline
    let candle_port = CsvCandleAdapter::new(&data.directory);
    let reporter = CsvReportAdapter;
    let report = output_dir.map(|dir| (&reporter as &dyn ReportPort, dir));
    run_backtest_pipeline(&candle_port, &data, &strategy, &bt_config, report)?;
    Ok(())
}

pub fn run_backtest_pipeline(
    candle_port: &dyn CandlePort,
    data: &DataSettings,
    strategy: &Strategy,
    bt_config: &BacktestConfig,
    report: Option<(&dyn ReportPort, &Path)>,
) -> Result<(BacktestResult, Metrics), BacktestError> {
    // Stage 3: Fetch candles
    let candles = candle_port.fetch_candles(&data.symbol, &data.interval)?;
    info!(
        symbol = %data.symbol,
        interval = %data.interval,
        candles = candles.len(),
        "loaded candles"
    );
    if let (Some(first), Some(last)) = (candles.first(), candles.last()) {
        eprintln!(
            "Running backtest: {} {}, {} bars, {} to {}",
            data.symbol,
            data.interval,
            candles.len(),
            first.timestamp,
            last.timestamp,
        );
    }

    // Stage 4: Run
    let result = backtest_engine::run_backtest(&candles, strategy, bt_config)?;

    // Stage 5: Metrics and console summary
    let metrics = Metrics::compute(&result, bt_config.risk_free_rate, bt_config.periods_per_year);
    print_summary(&result, &metrics);

    // Stage 6: Reports
    if let Some((reporter, dir)) = report {
        reporter.write(&result, &metrics, dir)?;
        eprintln!("\nReports written to: {}", dir.display());
    }

    Ok((result, metrics))
}

fn print_summary(result: &BacktestResult, metrics: &Metrics) {
    let s = &result.summary;
    eprintln!("\n=== Results ===");
    eprintln!("Lot Quantity:     {:.6}", result.lot_quantity);
    eprintln!("Initial Capital:  {:.2}", s.initial_capital);
    eprintln!("Final Equity:     {:.2}", s.final_equity);
    eprintln!("Total Return:     {:.2}%", s.return_pct);
    eprintln!(
        "Annualized:       {:.2}%",
        metrics.annualized_return * 100.0
    );
    eprintln!("Realized P&L:     {:.2}", s.total_realized_pnl);
    eprintln!("Unrealized P&L:   {:.2}", s.unrealized_pnl);
    eprintln!("Commission:       {:.2}", s.total_commission);
    eprintln!("Sharpe Ratio:     {:.2}", metrics.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", metrics.sortino_ratio);
    eprintln!(
        "Max Drawdown:     -{:.1}% over {} bars",
        metrics.max_drawdown * 100.0,
        metrics.max_drawdown_duration
    );
    eprintln!("Total Trades:     {}", metrics.total_trades);
    eprintln!("Win Rate:         {:.1}%", metrics.win_rate * 100.0);
    eprintln!("Profit Factor:    {:.2}", metrics.profit_factor);
    eprintln!("Avg Holding:      {:.1}h", metrics.avg_holding_hours);
    if !result.open_lots.is_empty() {
        eprintln!("Open Lots:        {}", result.open_lots.len());
    }
}

fn run_derive(
    data_dir: &Path,
    symbol: &str,
    interval: &str,
    output: Option<&Path>,
) -> Result<(), BacktestError> {
    let symbol = symbol.trim().to_uppercase();
    let candles = CsvCandleAdapter::new(data_dir).fetch_candles(&symbol, interval.trim())?;
    let derived = derive_candles(&candles)?;
    debug!(symbol = %symbol, candles = derived.len(), "derived candles");

    match output {
        Some(path) => {
            csv_report_adapter::write_derived(path, &derived)?;
            eprintln!("{} derived candles written to {}", derived.len(), path.display());
        }
        None => csv_report_adapter::write_derived_to(io::stdout().lock(), &derived)?,
    }
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), BacktestError> {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = load_config(config_path)?;
    validate_all(&adapter)?;

    let strategy = build_strategy(&adapter, None)?;
    let bt_config = build_backtest_config(&adapter)?;
    let data = resolve_data_settings(&adapter, &Overrides::default());

    eprintln!("\nStrategy:         {strategy}");
    eprintln!("Initial Capital:  {}", bt_config.initial_capital);
    eprintln!("Commission Rate:  {}", bt_config.commission_rate);
    match bt_config.fixed_lot_quantity {
        Some(q) => eprintln!("Lot Quantity:     {q} (fixed)"),
        None => eprintln!(
            "Lot Quantity:     {:.0}% of capital at first price",
            bt_config.position_size_fraction * 100.0
        ),
    }
    if let Some(q) = bt_config.exit_lot_quantity {
        eprintln!("Exit Quantity:    {q}");
    }
    eprintln!(
        "Data:             {}/{}_{}.csv",
        data.directory.display(),
        data.symbol,
        data.interval
    );

    eprintln!("\nConfiguration is valid.");
    Ok(())
}

fn run_list(data_dir: &Path) -> Result<(), BacktestError> {
    let series = CsvCandleAdapter::new(data_dir).list_series()?;

    if series.is_empty() {
        eprintln!("No candle series found in {}", data_dir.display());
    } else {
        for (symbol, interval) in &series {
            println!("{} {}", symbol, interval);
        }
        eprintln!("{} series found", series.len());
    }
    Ok(())
}
