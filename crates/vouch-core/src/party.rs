//! Buyer/seller roles in an escrow transaction.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The role a participant plays in a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    /// The party paying into escrow.
    Buyer,
    /// The party shipping the item and receiving the payout.
    Seller,
}

impl Party {
    /// The other side of the transaction.
    #[must_use]
    pub const fn counterpart(&self) -> Self {
        match self {
            Self::Buyer => Self::Seller,
            Self::Seller => Self::Buyer,
        }
    }

    /// The canonical string name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buyer => "buyer",
            Self::Seller => "seller",
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
