//! Error types for escrow operations.

use thiserror::Error;

/// Result type alias for escrow operations.
pub type Result<T> = std::result::Result<T, EscrowError>;

/// Errors that can occur in the escrow engine.
///
/// `StateConflict` and `ProcessorFailure` are deliberately distinct:
/// the former means the caller should try a different operation, the
/// latter means the same operation may be retried.
#[derive(Debug, Error)]
pub enum EscrowError {
    /// Malformed arguments (buyer equals seller, zero amount, empty tracking).
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// Description of the rejected input.
        reason: String,
    },

    /// Operation attempted from a state that does not permit it.
    #[error("cannot {operation} while in state {status}")]
    StateConflict {
        /// The rejected operation.
        operation: String,
        /// The state the record was in.
        status: String,
    },

    /// Caller is not the required party for the operation.
    #[error("{party} is not authorized to {operation}")]
    Unauthorized {
        /// The rejected operation.
        operation: String,
        /// The caller that was rejected.
        party: String,
    },

    /// Amount exceeds the seller's verified transaction ceiling.
    #[error("amount {amount} exceeds seller limit {limit}")]
    LimitExceeded {
        /// The transaction amount.
        amount: vouch_core::Amount,
        /// The seller's ceiling.
        limit: vouch_core::Amount,
    },

    /// A payment, payout, or refund call failed. State is unchanged.
    #[error("{operation} failed at processor: {reason}")]
    ProcessorFailure {
        /// The money-moving operation that failed.
        operation: String,
        /// Processor-reported reason.
        reason: String,
    },

    /// Transaction not found in the store.
    #[error("transaction not found: {id}")]
    TransactionNotFound {
        /// Transaction ID.
        id: String,
    },

    /// Dispute case not found in the store.
    #[error("dispute not found: {id}")]
    DisputeNotFound {
        /// Dispute ID.
        id: String,
    },
}

impl EscrowError {
    /// Create an invalid input error.
    #[must_use]
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Create a state conflict error.
    #[must_use]
    pub fn state_conflict(operation: impl Into<String>, status: impl Into<String>) -> Self {
        Self::StateConflict {
            operation: operation.into(),
            status: status.into(),
        }
    }

    /// Create an unauthorized error.
    #[must_use]
    pub fn unauthorized(operation: impl Into<String>, party: impl Into<String>) -> Self {
        Self::Unauthorized {
            operation: operation.into(),
            party: party.into(),
        }
    }

    /// Create a processor failure error.
    #[must_use]
    pub fn processor_failure(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ProcessorFailure {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is a state conflict (safe to treat as a
    /// superseded transition).
    #[must_use]
    pub const fn is_state_conflict(&self) -> bool {
        matches!(self, Self::StateConflict { .. })
    }
}
