//! Lots and closed trades.

use std::fmt;

use chrono::NaiveDateTime;

/// Monotonic issue-order identity of a lot within one ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LotId(pub u64);

impl fmt::Display for LotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lot {
    pub id: LotId,
    /// Quantity still open.
    pub quantity: f64,
    /// Quantity at issue; never changes.
    pub original_quantity: f64,
    pub entry_price: f64,
    pub entry_timestamp: NaiveDateTime,
    /// Commission charged when the lot was opened, for its full original quantity.
    pub entry_commission: f64,
}

impl Lot {
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.quantity * (price - self.entry_price)
    }

    /// Share of the entry commission attributable to `quantity` units.
    pub fn entry_commission_share(&self, quantity: f64) -> f64 {
        if self.original_quantity > 0.0 {
            self.entry_commission * quantity / self.original_quantity
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub lot_id: LotId,
    pub matched_quantity: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_timestamp: NaiveDateTime,
    pub exit_timestamp: NaiveDateTime,
    /// matched_quantity * (exit_price - entry_price), before commission.
    pub realized_pnl: f64,
    /// Exit commission plus the pro-rata share of the lot's entry commission.
    pub commission: f64,
}

impl ClosedTrade {
    pub fn net_pnl(&self) -> f64 {
        self.realized_pnl - self.commission
    }

    pub fn holding_time(&self) -> chrono::Duration {
        self.exit_timestamp - self.entry_timestamp
    }
}
