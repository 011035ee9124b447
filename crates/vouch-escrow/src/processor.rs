//! Money-movement boundary: payment capture, payouts, refunds, and the
//! seller transaction-limit predicate.
//!
//! The engine treats each call as a single awaited operation with no
//! partial progress. Failures surface as
//! [`EscrowError::ProcessorFailure`](crate::error::EscrowError) and are
//! never retried internally; retry policy belongs to the caller.
//!
//! The in-memory implementations are deterministic test doubles:
//! failures are switched on explicitly, never rolled randomly, and every
//! money movement is recorded in an inspectable ledger.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EscrowError, Result};
use vouch_core::{Amount, PartyId};

/// How the buyer pays into escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Card payment.
    Card,
    /// Bank transfer.
    BankTransfer,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Card => write!(f, "card"),
            Self::BankTransfer => write!(f, "bank_transfer"),
        }
    }
}

/// Captures buyer payments into escrow.
pub trait PaymentProcessor: Send + Sync {
    /// Charge the buyer. Succeeds fully or fails with no side effects.
    ///
    /// # Errors
    ///
    /// Returns [`EscrowError::ProcessorFailure`](crate::error::EscrowError)
    /// if the charge is declined or the gateway is unavailable.
    fn charge(
        &self,
        buyer: &PartyId,
        amount: Amount,
        method: PaymentMethod,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Executes payouts to sellers and refunds to buyers.
pub trait PayoutProcessor: Send + Sync {
    /// Pay out released funds to the seller.
    ///
    /// # Errors
    ///
    /// Returns [`EscrowError::ProcessorFailure`](crate::error::EscrowError)
    /// if the payout cannot be executed.
    fn payout(&self, seller: &PartyId, amount: Amount) -> impl Future<Output = Result<()>> + Send;

    /// Return funds to the buyer.
    ///
    /// # Errors
    ///
    /// Returns [`EscrowError::ProcessorFailure`](crate::error::EscrowError)
    /// if the refund cannot be executed.
    fn refund(&self, buyer: &PartyId, amount: Amount) -> impl Future<Output = Result<()>> + Send;
}

/// Seller transaction ceiling derived from verification level.
pub trait TransactionLimits: Send + Sync {
    /// The largest amount this seller may transact.
    fn max_allowed_amount(&self, seller: &PartyId) -> impl Future<Output = Result<Amount>> + Send;
}

/// One recorded money movement in the in-memory ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEntry {
    /// A buyer charge into escrow.
    Charge {
        /// The charged buyer.
        party: PartyId,
        /// The charged amount (price plus total fee).
        amount: Amount,
        /// Payment method used.
        method: PaymentMethod,
    },
    /// A seller payout.
    Payout {
        /// The paid seller.
        party: PartyId,
        /// Net amount paid out.
        amount: Amount,
    },
    /// A buyer refund.
    Refund {
        /// The refunded buyer.
        party: PartyId,
        /// Refunded amount.
        amount: Amount,
    },
}

/// Deterministic in-memory payment and payout processor.
///
/// Records every movement and only fails when told to, so tests can
/// script declined charges or unavailable payout rails exactly.
#[derive(Debug, Default)]
pub struct MemoryProcessor {
    ledger: parking_lot::Mutex<Vec<LedgerEntry>>,
    decline_charges: AtomicBool,
    fail_payouts: AtomicBool,
    fail_refunds: AtomicBool,
}

impl MemoryProcessor {
    /// Create a processor that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decline all subsequent charges.
    pub fn set_decline_charges(&self, decline: bool) {
        self.decline_charges.store(decline, Ordering::SeqCst);
    }

    /// Fail all subsequent payouts.
    pub fn set_fail_payouts(&self, fail: bool) {
        self.fail_payouts.store(fail, Ordering::SeqCst);
    }

    /// Fail all subsequent refunds.
    pub fn set_fail_refunds(&self, fail: bool) {
        self.fail_refunds.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of all recorded movements, oldest first.
    #[must_use]
    pub fn ledger(&self) -> Vec<LedgerEntry> {
        self.ledger.lock().clone()
    }

    /// Total paid out to a seller.
    #[must_use]
    pub fn payouts_to(&self, party: &PartyId) -> Amount {
        self.ledger
            .lock()
            .iter()
            .filter_map(|entry| match entry {
                LedgerEntry::Payout { party: p, amount } if p == party => Some(*amount),
                _ => None,
            })
            .fold(Amount::ZERO, |sum, amount| sum.saturating_add(amount))
    }

    /// Total refunded to a buyer.
    #[must_use]
    pub fn refunds_to(&self, party: &PartyId) -> Amount {
        self.ledger
            .lock()
            .iter()
            .filter_map(|entry| match entry {
                LedgerEntry::Refund { party: p, amount } if p == party => Some(*amount),
                _ => None,
            })
            .fold(Amount::ZERO, |sum, amount| sum.saturating_add(amount))
    }

    /// Total charged to a buyer.
    #[must_use]
    pub fn charges_to(&self, party: &PartyId) -> Amount {
        self.ledger
            .lock()
            .iter()
            .filter_map(|entry| match entry {
                LedgerEntry::Charge {
                    party: p, amount, ..
                } if p == party => Some(*amount),
                _ => None,
            })
            .fold(Amount::ZERO, |sum, amount| sum.saturating_add(amount))
    }
}

impl PaymentProcessor for MemoryProcessor {
    async fn charge(&self, buyer: &PartyId, amount: Amount, method: PaymentMethod) -> Result<()> {
        if self.decline_charges.load(Ordering::SeqCst) {
            return Err(EscrowError::processor_failure("charge", "card declined"));
        }
        debug!(buyer = %buyer, amount = %amount, method = %method, "charge captured");
        self.ledger.lock().push(LedgerEntry::Charge {
            party: buyer.clone(),
            amount,
            method,
        });
        Ok(())
    }
}

impl PayoutProcessor for MemoryProcessor {
    async fn payout(&self, seller: &PartyId, amount: Amount) -> Result<()> {
        if self.fail_payouts.load(Ordering::SeqCst) {
            return Err(EscrowError::processor_failure(
                "payout",
                "payout rail unavailable",
            ));
        }
        debug!(seller = %seller, amount = %amount, "payout executed");
        self.ledger.lock().push(LedgerEntry::Payout {
            party: seller.clone(),
            amount,
        });
        Ok(())
    }

    async fn refund(&self, buyer: &PartyId, amount: Amount) -> Result<()> {
        if self.fail_refunds.load(Ordering::SeqCst) {
            return Err(EscrowError::processor_failure(
                "refund",
                "refund rail unavailable",
            ));
        }
        debug!(buyer = %buyer, amount = %amount, "refund executed");
        self.ledger.lock().push(LedgerEntry::Refund {
            party: buyer.clone(),
            amount,
        });
        Ok(())
    }
}

/// Static per-seller transaction limits with a default ceiling.
#[derive(Debug)]
pub struct StaticLimits {
    default_limit: Amount,
    overrides: RwLock<HashMap<String, Amount>>,
}

impl StaticLimits {
    /// Limits that never reject any amount.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::with_default(Amount::MAX)
    }

    /// Limits with the given default ceiling.
    #[must_use]
    pub fn with_default(default_limit: Amount) -> Self {
        Self {
            default_limit,
            overrides: RwLock::new(HashMap::new()),
        }
    }

    /// Override the ceiling for one seller.
    pub fn set_limit(&self, seller: &PartyId, limit: Amount) {
        self.overrides
            .write()
            .insert(seller.as_str().to_string(), limit);
    }
}

impl TransactionLimits for StaticLimits {
    async fn max_allowed_amount(&self, seller: &PartyId) -> Result<Amount> {
        Ok(self
            .overrides
            .read()
            .get(seller.as_str())
            .copied()
            .unwrap_or(self.default_limit))
    }
}
