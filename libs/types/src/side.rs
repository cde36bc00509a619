//! Book side types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Book side (bid or ask)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy interest
    Bid,
    /// Sell interest
    Ask,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }

    /// Infer the side from a signed wire amount.
    ///
    /// Positive amounts are bids, negative amounts are asks. Zero carries no
    /// side information.
    pub fn from_signed_amount(amount: Decimal) -> Option<Self> {
        if amount > Decimal::ZERO {
            Some(Side::Bid)
        } else if amount < Decimal::ZERO {
            Some(Side::Ask)
        } else {
            None
        }
    }
}
