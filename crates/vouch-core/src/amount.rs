//! Money representation for escrow transactions.
//!
//! Amounts are stored in minor currency units (1 unit = 100 minor) for
//! precision. All arithmetic is integer-only; fallible operations return
//! `Option` so callers decide how to surface overflow.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// Minor units per major currency unit.
const MINOR_PER_UNIT: u64 = 100;

/// A monetary amount in minor currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Amount {
    minor: u64,
}

impl Amount {
    /// Zero.
    pub const ZERO: Self = Self { minor: 0 };

    /// Maximum representable amount.
    pub const MAX: Self = Self { minor: u64::MAX };

    /// Create an amount from minor units.
    #[must_use]
    pub const fn from_minor(minor: u64) -> Self {
        Self { minor }
    }

    /// Create an amount from whole currency units.
    ///
    /// Saturates at [`Amount::MAX`] if the value does not fit.
    #[must_use]
    pub const fn from_major(units: u64) -> Self {
        Self {
            minor: units.saturating_mul(MINOR_PER_UNIT),
        }
    }

    /// The amount in minor units.
    #[must_use]
    pub const fn minor(&self) -> u64 {
        self.minor
    }

    /// Check if the amount is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.minor == 0
    }

    /// Checked addition.
    #[must_use]
    pub const fn checked_add(&self, other: Self) -> Option<Self> {
        match self.minor.checked_add(other.minor) {
            Some(minor) => Some(Self { minor }),
            None => None,
        }
    }

    /// Checked subtraction.
    #[must_use]
    pub const fn checked_sub(&self, other: Self) -> Option<Self> {
        match self.minor.checked_sub(other.minor) {
            Some(minor) => Some(Self { minor }),
            None => None,
        }
    }

    /// Saturating addition.
    #[must_use]
    pub const fn saturating_add(&self, other: Self) -> Self {
        Self {
            minor: self.minor.saturating_add(other.minor),
        }
    }

    /// Saturating subtraction.
    #[must_use]
    pub const fn saturating_sub(&self, other: Self) -> Self {
        Self {
            minor: self.minor.saturating_sub(other.minor),
        }
    }

    /// The smaller of two amounts.
    #[must_use]
    pub const fn min(self, other: Self) -> Self {
        if self.minor <= other.minor { self } else { other }
    }

    /// The larger of two amounts.
    #[must_use]
    pub const fn max(self, other: Self) -> Self {
        if self.minor >= other.minor { self } else { other }
    }
}

impl Default for Amount {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:02}",
            self.minor / MINOR_PER_UNIT,
            self.minor % MINOR_PER_UNIT
        )
    }
}

impl Add for Amount {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            minor: self.minor + other.minor,
        }
    }
}

impl Sub for Amount {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self {
            minor: self.minor - other.minor,
        }
    }
}

impl From<u64> for Amount {
    fn from(minor: u64) -> Self {
        Self::from_minor(minor)
    }
}
