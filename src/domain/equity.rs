//! Equity curve and run summary.

use chrono::NaiveDateTime;

use super::error::BacktestError;
use super::ledger::PositionLedger;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EquitySummary {
    pub initial_capital: f64,
    pub final_equity: f64,
    /// Gross realized pnl over all closed trades.
    pub total_realized_pnl: f64,
    pub total_commission: f64,
    /// Mark-to-market pnl of lots still open at the last bar.
    pub unrealized_pnl: f64,
    pub return_pct: f64,
}

/// Marks the ledger to market once per bar.
#[derive(Debug, Clone, PartialEq)]
pub struct EquityTracker {
    initial_capital: f64,
    points: Vec<EquityPoint>,
    last_unrealized: f64,
}

impl EquityTracker {
    pub fn new(initial_capital: f64, expected_bars: usize) -> Result<Self, BacktestError> {
        if !initial_capital.is_finite() || initial_capital <= 0.0 {
            return Err(BacktestError::config(
                "initial_capital",
                format!("must be positive, got {initial_capital}"),
            ));
        }
        Ok(EquityTracker {
            initial_capital,
            points: Vec::with_capacity(expected_bars),
            last_unrealized: 0.0,
        })
    }

    /// capital + realized - commission + unrealized at `price`.
    pub fn record(
        &mut self,
        timestamp: NaiveDateTime,
        price: f64,
        ledger: &PositionLedger,
    ) -> EquityPoint {
        let unrealized = ledger.unrealized_pnl(price);
        let equity = self.initial_capital + ledger.realized_pnl() - ledger.total_commission()
            + unrealized;
        let point = EquityPoint { timestamp, equity };
        self.points.push(point);
        self.last_unrealized = unrealized;
        point
    }

    pub fn summarize(&self, ledger: &PositionLedger) -> EquitySummary {
        let final_equity = self
            .points
            .last()
            .map(|p| p.equity)
            .unwrap_or(self.initial_capital);

        EquitySummary {
            initial_capital: self.initial_capital,
            final_equity,
            total_realized_pnl: ledger.realized_pnl(),
            total_commission: ledger.total_commission(),
            unrealized_pnl: self.last_unrealized,
            return_pct: (final_equity - self.initial_capital) / self.initial_capital * 100.0,
        }
    }

    pub fn into_points(self) -> Vec<EquityPoint> {
        self.points
    }
}
