//! Outbound notification boundary.
//!
//! The engine emits fire-and-forget events; delivery, batching, and
//! retry are the gateway's concern. The engine never blocks on a
//! notification and never fails an operation because one was dropped.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use vouch_core::{Amount, DisputeId, Party, PartyId, TransactionId};

/// An event emitted by the escrow engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EscrowEvent {
    /// The buyer funded escrow; the seller may ship.
    PaymentReceived {
        /// The funded transaction.
        transaction: TransactionId,
        /// The escrowed amount.
        amount: Amount,
    },
    /// The seller shipped the item.
    ItemShipped {
        /// The shipped transaction.
        transaction: TransactionId,
        /// Carrier name.
        carrier: String,
        /// Carrier tracking number.
        tracking_number: String,
    },
    /// The transaction completed.
    TransactionCompleted {
        /// The completed transaction.
        transaction: TransactionId,
    },
    /// Escrowed funds were released to the seller.
    PaymentReleased {
        /// The completed transaction.
        transaction: TransactionId,
        /// Net amount paid out.
        amount: Amount,
    },
    /// The counterparty opened a dispute.
    DisputeOpened {
        /// The disputed transaction.
        transaction: TransactionId,
        /// The dispute case.
        dispute: DisputeId,
    },
    /// A dispute was resolved.
    DisputeResolved {
        /// The transaction the ruling applies to.
        transaction: TransactionId,
        /// The resolved dispute case.
        dispute: DisputeId,
        /// The party the ruling favored.
        winner: Party,
    },
}

impl EscrowEvent {
    /// The canonical event type name.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PaymentReceived { .. } => "payment_received",
            Self::ItemShipped { .. } => "item_shipped",
            Self::TransactionCompleted { .. } => "transaction_completed",
            Self::PaymentReleased { .. } => "payment_released",
            Self::DisputeOpened { .. } => "dispute_opened",
            Self::DisputeResolved { .. } => "dispute_resolved",
        }
    }
}

/// Receives engine events for delivery to users.
///
/// Implementations must not block: queue internally and deliver on
/// their own schedule.
pub trait NotificationGateway: Send + Sync {
    /// Hand an event to the gateway for delivery to `user`.
    fn notify(&self, user: &PartyId, event: EscrowEvent);
}

/// A gateway that logs and drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullGateway;

impl NotificationGateway for NullGateway {
    fn notify(&self, user: &PartyId, event: EscrowEvent) {
        debug!(user = %user, event = event.kind(), "notification dropped (null gateway)");
    }
}

/// A gateway that records every event for inspection in tests.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<(PartyId, EscrowEvent)>>,
}

impl RecordingGateway {
    /// Create an empty recording gateway.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded notifications, oldest first.
    #[must_use]
    pub fn all(&self) -> Vec<(PartyId, EscrowEvent)> {
        self.sent.lock().clone()
    }

    /// Events delivered to one user, oldest first.
    #[must_use]
    pub fn events_for(&self, user: &PartyId) -> Vec<EscrowEvent> {
        self.sent
            .lock()
            .iter()
            .filter(|(recipient, _)| recipient == user)
            .map(|(_, event)| event.clone())
            .collect()
    }

    /// Number of recorded notifications.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sent.lock().is_empty()
    }
}

impl NotificationGateway for RecordingGateway {
    fn notify(&self, user: &PartyId, event: EscrowEvent) {
        self.sent.lock().push((user.clone(), event));
    }
}
