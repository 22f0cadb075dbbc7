//! FIFO position ledger.
//!
//! Open lots sit in a queue ordered by issue id. An exit consumes a fixed
//! quantity from the front of the queue: each lot touched yields one
//! `ClosedTrade`, a fully consumed lot is popped, and a partially consumed
//! lot keeps its place at the front with the leftover quantity. Exit quantity
//! beyond what is open is discarded; the ledger never goes short.
//!
//! A ledger belongs to exactly one run. It is not `Clone` and is consumed by
//! [`PositionLedger::into_parts`] when the run finishes.

use std::collections::VecDeque;
use std::fmt;

use chrono::NaiveDateTime;
use tracing::{debug, trace};

use super::error::BacktestError;
use super::lot::{ClosedTrade, Lot, LotId};

/// Relative slack when deciding that a lot or an exit is fully matched.
const QUANTITY_TOLERANCE: f64 = 1e-9;

/// Net directional bias. `Flat` may still hold residual lots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionState {
    Flat,
    Long,
}

impl fmt::Display for PositionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionState::Flat => write!(f, "flat"),
            PositionState::Long => write!(f, "long"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct IssuedLot {
    id: LotId,
    quantity: f64,
}

#[derive(Debug)]
pub struct PositionLedger {
    entry_quantity: f64,
    exit_quantity: f64,
    commission_rate: f64,
    next_id: u64,
    state: PositionState,
    open_lots: VecDeque<Lot>,
    closed_trades: Vec<ClosedTrade>,
    issued: Vec<IssuedLot>,
    total_commission: f64,
}

impl PositionLedger {
    pub fn new(
        entry_quantity: f64,
        exit_quantity: f64,
        commission_rate: f64,
    ) -> Result<Self, BacktestError> {
        if !entry_quantity.is_finite() || entry_quantity <= 0.0 {
            return Err(BacktestError::config(
                "fixed_lot_quantity",
                format!("must be positive, got {entry_quantity}"),
            ));
        }
        if !exit_quantity.is_finite() || exit_quantity <= 0.0 {
            return Err(BacktestError::config(
                "exit_lot_quantity",
                format!("must be positive, got {exit_quantity}"),
            ));
        }
        if !commission_rate.is_finite() || commission_rate < 0.0 {
            return Err(BacktestError::config(
                "commission_rate",
                format!("must be non-negative, got {commission_rate}"),
            ));
        }

        Ok(PositionLedger {
            entry_quantity,
            exit_quantity,
            commission_rate,
            next_id: 1,
            state: PositionState::Flat,
            open_lots: VecDeque::new(),
            closed_trades: Vec::new(),
            issued: Vec::new(),
            total_commission: 0.0,
        })
    }

    pub fn state(&self) -> PositionState {
        self.state
    }

    pub fn open_lots(&self) -> impl ExactSizeIterator<Item = &Lot> {
        self.open_lots.iter()
    }

    pub fn has_open_lots(&self) -> bool {
        !self.open_lots.is_empty()
    }

    pub fn open_quantity(&self) -> f64 {
        self.open_lots.iter().map(|lot| lot.quantity).sum()
    }

    pub fn closed_trades(&self) -> &[ClosedTrade] {
        &self.closed_trades
    }

    /// Sum of gross realized pnl over all closed trades.
    pub fn realized_pnl(&self) -> f64 {
        self.closed_trades.iter().map(|t| t.realized_pnl).sum()
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.open_lots.iter().map(|lot| lot.unrealized_pnl(price)).sum()
    }

    /// Commission charged so far, entries and exits.
    pub fn total_commission(&self) -> f64 {
        self.total_commission
    }

    fn commission(&self, quantity: f64, price: f64) -> f64 {
        self.commission_rate * quantity * price
    }

    /// Issue a new lot at `price` and move to `Long`.
    pub fn enter(&mut self, price: f64, timestamp: NaiveDateTime) -> LotId {
        let id = LotId(self.next_id);
        self.next_id += 1;

        let entry_commission = self.commission(self.entry_quantity, price);
        self.total_commission += entry_commission;

        self.open_lots.push_back(Lot {
            id,
            quantity: self.entry_quantity,
            original_quantity: self.entry_quantity,
            entry_price: price,
            entry_timestamp: timestamp,
            entry_commission,
        });
        self.issued.push(IssuedLot {
            id,
            quantity: self.entry_quantity,
        });
        self.state = PositionState::Long;

        debug!(lot = %id, quantity = self.entry_quantity, price, %timestamp, "opened lot");
        id
    }

    /// Match the fixed exit quantity against open lots, oldest first.
    ///
    /// Returns the trades recorded by this exit; empty when nothing was open.
    pub fn exit(
        &mut self,
        price: f64,
        timestamp: NaiveDateTime,
    ) -> Result<&[ClosedTrade], BacktestError> {
        self.state = PositionState::Flat;
        let first_new = self.closed_trades.len();

        if self.open_lots.is_empty() {
            debug!(price, %timestamp, "exit with no open lots ignored");
            return Ok(&self.closed_trades[first_new..]);
        }

        let exit_commission_rate = self.commission_rate;
        let mut remaining = self.exit_quantity;
        let fill_tolerance = QUANTITY_TOLERANCE * self.exit_quantity;
        while remaining > fill_tolerance {
            let Some(lot) = self.open_lots.front_mut() else {
                break;
            };
            if !lot.quantity.is_finite() || lot.quantity <= 0.0 {
                return Err(BacktestError::LedgerCorruption {
                    lot_id: lot.id.0,
                    reason: format!("open quantity {} is not positive", lot.quantity),
                });
            }

            // A lot within rounding of the remaining quantity is closed whole.
            let lot_tolerance = QUANTITY_TOLERANCE * lot.original_quantity;
            let matched = if remaining >= lot.quantity - lot_tolerance {
                lot.quantity
            } else {
                remaining
            };
            let commission =
                exit_commission_rate * matched * price + lot.entry_commission_share(matched);
            let trade = ClosedTrade {
                lot_id: lot.id,
                matched_quantity: matched,
                entry_price: lot.entry_price,
                exit_price: price,
                entry_timestamp: lot.entry_timestamp,
                exit_timestamp: timestamp,
                realized_pnl: matched * (price - lot.entry_price),
                commission,
            };

            lot.quantity -= matched;
            remaining -= matched;
            let exhausted = lot.quantity <= lot_tolerance;
            trace!(lot = %trade.lot_id, matched, left = lot.quantity, "matched lot");

            self.total_commission += exit_commission_rate * matched * price;
            self.closed_trades.push(trade);
            if exhausted {
                self.open_lots.pop_front();
            }
        }

        if remaining > fill_tolerance {
            debug!(discarded = remaining, "exit quantity exceeded open lots");
        }
        debug!(
            trades = self.closed_trades.len() - first_new,
            price,
            %timestamp,
            "closed lots"
        );
        Ok(&self.closed_trades[first_new..])
    }

    /// Check that every issued lot is fully accounted for by its open
    /// remainder and the trades matched against it.
    pub fn verify_conservation(&self) -> Result<(), BacktestError> {
        for issued in &self.issued {
            let open: f64 = self
                .open_lots
                .iter()
                .filter(|lot| lot.id == issued.id)
                .map(|lot| lot.quantity)
                .sum();
            let matched: f64 = self
                .closed_trades
                .iter()
                .filter(|t| t.lot_id == issued.id)
                .map(|t| t.matched_quantity)
                .sum();
            let tolerance = QUANTITY_TOLERANCE * issued.quantity.max(1.0);
            if (open + matched - issued.quantity).abs() > tolerance {
                return Err(BacktestError::LedgerCorruption {
                    lot_id: issued.id.0,
                    reason: format!(
                        "issued {} but {} open and {} matched",
                        issued.quantity, open, matched
                    ),
                });
            }
        }
        Ok(())
    }

    /// Consume the ledger, yielding closed trades and the lots still open.
    pub fn into_parts(self) -> (Vec<ClosedTrade>, Vec<Lot>) {
        (self.closed_trades, self.open_lots.into_iter().collect())
    }
}
