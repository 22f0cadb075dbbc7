//! Backtest configuration and the single forward pass.
//!
//! raw candles → derived candles → crossover signals → FIFO ledger → equity.
//! Everything is validated before the ledger exists, so a failed run
//! returns no partial result.

use chrono::NaiveDateTime;
use tracing::{debug, info};

use super::candle::{validate_series, Candle};
use super::equity::{EquityPoint, EquitySummary, EquityTracker};
use super::error::BacktestError;
use super::heikin_ashi::{derive_candles, DerivedCandle};
use super::ledger::{PositionLedger, PositionState};
use super::lot::{ClosedTrade, Lot};
use super::signal::{detect_crossovers, CrossoverKind, SignalSeries, SignalState};
use super::strategy::{PriceSource, Strategy};

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    pub commission_rate: f64,
    pub position_size_fraction: f64,
    /// Overrides fraction sizing when set.
    pub fixed_lot_quantity: Option<f64>,
    /// Defaults to the entry lot quantity.
    pub exit_lot_quantity: Option<f64>,
    pub risk_free_rate: f64,
    pub periods_per_year: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_capital: 100_000.0,
            commission_rate: 0.0,
            position_size_fraction: 1.0,
            fixed_lot_quantity: None,
            exit_lot_quantity: None,
            risk_free_rate: 0.0,
            periods_per_year: 365.0,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), BacktestError> {
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(BacktestError::config(
                "initial_capital",
                format!("must be positive, got {}", self.initial_capital),
            ));
        }
        if !self.commission_rate.is_finite() || self.commission_rate < 0.0 {
            return Err(BacktestError::config(
                "commission_rate",
                format!("must be non-negative, got {}", self.commission_rate),
            ));
        }
        let fraction = self.position_size_fraction;
        if !fraction.is_finite() || fraction <= 0.0 || fraction > 1.0 {
            return Err(BacktestError::config(
                "position_size_fraction",
                format!("must be in (0, 1], got {fraction}"),
            ));
        }
        for (field, value) in [
            ("fixed_lot_quantity", self.fixed_lot_quantity),
            ("exit_lot_quantity", self.exit_lot_quantity),
        ] {
            if let Some(q) = value.filter(|q| !q.is_finite() || *q <= 0.0) {
                return Err(BacktestError::config(field, format!("must be positive, got {q}")));
            }
        }
        if !(0.0..1.0).contains(&self.risk_free_rate) {
            return Err(BacktestError::config(
                "risk_free_rate",
                format!("must be in [0, 1), got {}", self.risk_free_rate),
            ));
        }
        if !self.periods_per_year.is_finite() || self.periods_per_year <= 0.0 {
            return Err(BacktestError::config(
                "periods_per_year",
                format!("must be positive, got {}", self.periods_per_year),
            ));
        }
        Ok(())
    }

    /// Entry lot quantity for a run whose first signal price is `first_price`.
    pub fn lot_quantity(&self, first_price: f64) -> f64 {
        self.fixed_lot_quantity
            .unwrap_or(self.initial_capital * self.position_size_fraction / first_price)
    }
}

/// What the ledger did on a bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarAction {
    None,
    Opened,
    Closed,
    /// Exit event with nothing open.
    Ignored,
}

impl std::fmt::Display for BarAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BarAction::None => write!(f, ""),
            BarAction::Opened => write!(f, "opened"),
            BarAction::Closed => write!(f, "closed"),
            BarAction::Ignored => write!(f, "ignored"),
        }
    }
}

/// Per-bar annotation for charting and reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct BarRecord {
    pub index: usize,
    pub timestamp: NaiveDateTime,
    pub price: f64,
    pub fast: f64,
    pub slow: f64,
    pub signal: SignalState,
    pub event: Option<CrossoverKind>,
    pub action: BarAction,
    pub position: PositionState,
    /// Issued lot id on entries, matched lot ids on exits ("1,2").
    pub lot_label: String,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub strategy: Strategy,
    pub lot_quantity: f64,
    pub exit_quantity: f64,
    pub derived: Vec<DerivedCandle>,
    pub signals: SignalSeries,
    pub bars: Vec<BarRecord>,
    pub trades: Vec<ClosedTrade>,
    pub open_lots: Vec<Lot>,
    pub equity_curve: Vec<EquityPoint>,
    pub summary: EquitySummary,
}

/// Run one backtest over a complete, ordered candle series.
///
/// Each call builds its own ledger and tracker; nothing survives between runs.
pub fn run_backtest(
    candles: &[Candle],
    strategy: &Strategy,
    config: &BacktestConfig,
) -> Result<BacktestResult, BacktestError> {
    config.validate()?;
    strategy.validate()?;
    validate_series(candles)?;

    let derived = derive_candles(candles)?;
    let timestamps: Vec<NaiveDateTime> = candles.iter().map(|c| c.timestamp).collect();
    let prices: Vec<f64> = match strategy.price_source {
        PriceSource::Raw => candles.iter().map(|c| c.close).collect(),
        PriceSource::Derived => derived.iter().map(|d| d.close).collect(),
    };

    let signals = detect_crossovers(
        &timestamps,
        &prices,
        strategy.fast_period,
        strategy.slow_period,
    )?;

    let lot_quantity = config.lot_quantity(prices[0]);
    let exit_quantity = config.exit_lot_quantity.unwrap_or(lot_quantity);
    let mut ledger = PositionLedger::new(lot_quantity, exit_quantity, config.commission_rate)?;
    let mut tracker = EquityTracker::new(config.initial_capital, candles.len())?;

    info!(
        bars = candles.len(),
        %strategy,
        lot_quantity,
        exit_quantity,
        events = signals.events.len(),
        "running backtest"
    );

    let mut bars = Vec::with_capacity(candles.len());
    for (i, (&timestamp, &price)) in timestamps.iter().zip(&prices).enumerate() {
        let event = signals.event_at(i);

        let (action, lot_label) = match event {
            Some(CrossoverKind::Entry) => {
                let id = ledger.enter(price, timestamp);
                (BarAction::Opened, id.to_string())
            }
            Some(CrossoverKind::Exit) => {
                let trades = ledger.exit(price, timestamp)?;
                if trades.is_empty() {
                    (BarAction::Ignored, String::new())
                } else {
                    let label = trades
                        .iter()
                        .map(|t| t.lot_id.to_string())
                        .collect::<Vec<_>>()
                        .join(",");
                    (BarAction::Closed, label)
                }
            }
            None => (BarAction::None, String::new()),
        };

        let point = tracker.record(timestamp, price, &ledger);
        bars.push(BarRecord {
            index: i,
            timestamp,
            price,
            fast: signals.fast[i],
            slow: signals.slow[i],
            signal: signals.states[i],
            event,
            action,
            position: ledger.state(),
            lot_label,
            equity: point.equity,
        });
    }

    ledger.verify_conservation()?;
    let summary = tracker.summarize(&ledger);
    debug!(
        open_lots = ledger.open_lots().len(),
        open_quantity = ledger.open_quantity(),
        "ledger closed"
    );
    info!(
        trades = ledger.closed_trades().len(),
        final_equity = summary.final_equity,
        return_pct = summary.return_pct,
        "backtest complete"
    );

    let (trades, open_lots) = ledger.into_parts();
    Ok(BacktestResult {
        strategy: strategy.clone(),
        lot_quantity,
        exit_quantity,
        derived,
        signals,
        bars,
        trades,
        open_lots,
        equity_curve: tracker.into_points(),
        summary,
    })
}
