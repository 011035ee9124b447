//! Escrow transaction records and the status machine.
//!
//! A [`Transaction`] is the unit of serialization for the whole engine:
//! every cross-party transition reads the record, validates a guard, and
//! commits through the store's compare-and-set. The record itself owns
//! the transition table; the engine layers authorization, fee math, and
//! external calls on top.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{EscrowError, Result};
use crate::fees::{FeeBreakdown, INSURANCE_THRESHOLD};
use vouch_core::{Amount, DisputeId, Party, PartyId, TransactionId};

/// Lifecycle status of an escrow transaction.
///
/// Status machine:
/// `Pending → Funded → Shipped → Delivered → Completed`, with
/// `Shipped | Delivered → Disputed → Completed | Refunded`.
///
/// Terminal states: `Completed`, `Refunded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Created, awaiting buyer payment.
    Pending,
    /// Buyer funds held in escrow.
    Funded,
    /// Seller has handed the item to a carrier.
    Shipped,
    /// Buyer has the item; inspection window running.
    Delivered,
    /// Funds released to the seller. Terminal state.
    Completed,
    /// A dispute is open against the transaction.
    Disputed,
    /// Funds returned to the buyer. Terminal state.
    Refunded,
}

impl TransactionStatus {
    /// Checks if a transition to the target status is valid.
    #[must_use]
    pub const fn can_transition_to(&self, target: &Self) -> bool {
        use TransactionStatus::{
            Completed, Delivered, Disputed, Funded, Pending, Refunded, Shipped,
        };

        matches!(
            (self, target),
            (Pending, Funded)
                | (Funded, Shipped)
                | (Shipped, Delivered)
                | (Delivered, Completed)
                | (Shipped | Delivered, Disputed)
                | (Disputed, Completed | Refunded | Delivered)
        )
    }

    /// Whether this status is terminal (no further transitions).
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Refunded)
    }

    /// Whether the transaction still has money in flight.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Pending | Self::Funded | Self::Shipped | Self::Delivered
        )
    }

    /// The canonical string name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Funded => "funded",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Completed => "completed",
            Self::Disputed => "disputed",
            Self::Refunded => "refunded",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Carrier tracking details, attached when the seller ships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingInfo {
    /// Carrier name.
    pub carrier: String,
    /// Carrier tracking number.
    pub tracking_number: String,
    /// Last known carrier status.
    pub status: String,
    /// When the carrier status was last updated.
    pub last_update: DateTime<Utc>,
}

impl TrackingInfo {
    /// Create tracking info for a freshly shipped item.
    #[must_use]
    pub fn new(
        carrier: impl Into<String>,
        tracking_number: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            carrier: carrier.into(),
            tracking_number: tracking_number.into(),
            status: "shipped".to_string(),
            last_update: now,
        }
    }
}

/// How disputes against this transaction are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMode {
    /// Platform arbitration decides automatically on evidence.
    Automatic,
    /// A human arbitrator reviews the case.
    Manual,
}

/// Item condition and delivery details agreed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    /// Condition the item was sold as.
    pub product_condition: String,
    /// Agreed delivery method.
    pub delivery_method: String,
    /// Free-text instructions for the carrier or seller.
    pub special_instructions: Option<String>,
}

impl Default for Conditions {
    fn default() -> Self {
        Self {
            product_condition: "as described".to_string(),
            delivery_method: "courier".to_string(),
            special_instructions: None,
        }
    }
}

/// Negotiable agreement terms supplied at creation.
///
/// Everything not supplied falls back to the marketplace defaults:
/// a 7-day inspection window, seller-paid shipping, automatic dispute
/// resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementTerms {
    /// Days the buyer has to dispute after delivery.
    pub inspection_period_days: u32,
    /// Return policy text shown to both parties.
    pub return_policy: String,
    /// Which party bears shipping responsibility.
    pub shipping_responsibility: Party,
    /// How disputes are resolved.
    pub dispute_resolution: ResolutionMode,
    /// Item condition and delivery details.
    pub conditions: Conditions,
}

impl Default for AgreementTerms {
    fn default() -> Self {
        Self {
            inspection_period_days: 7,
            return_policy: "Item may be returned within the inspection period after receipt"
                .to_string(),
            shipping_responsibility: Party::Seller,
            dispute_resolution: ResolutionMode::Automatic,
            conditions: Conditions::default(),
        }
    }
}

/// The terms attached 1:1 to a transaction at creation. Immutable after
/// creation; exists to parameterize engine behavior such as the
/// inspection deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agreement {
    /// Days the buyer has to dispute after delivery.
    pub inspection_period_days: u32,
    /// Return policy text shown to both parties.
    pub return_policy: String,
    /// Which party bears shipping responsibility.
    pub shipping_responsibility: Party,
    /// Whether shipping insurance is required (derived from the amount).
    pub insurance_required: bool,
    /// How disputes are resolved.
    pub dispute_resolution: ResolutionMode,
    /// Item condition and delivery details.
    pub conditions: Conditions,
    /// When the agreement was fixed.
    pub signed_at: DateTime<Utc>,
}

impl Agreement {
    /// Fix an agreement from terms and the transaction amount.
    #[must_use]
    pub fn from_terms(terms: AgreementTerms, amount: Amount, now: DateTime<Utc>) -> Self {
        Self {
            inspection_period_days: terms.inspection_period_days,
            return_policy: terms.return_policy,
            shipping_responsibility: terms.shipping_responsibility,
            insurance_required: amount > INSURANCE_THRESHOLD,
            dispute_resolution: terms.dispute_resolution,
            conditions: terms.conditions,
            signed_at: now,
        }
    }

    /// The inspection window as a duration.
    #[must_use]
    pub fn inspection_period(&self) -> Duration {
        Duration::days(i64::from(self.inspection_period_days))
    }
}

/// An escrow transaction between a buyer and a seller.
///
/// `amount`, `fees`, `buyer`, `seller`, `listing`, and `agreement` are
/// immutable after creation. Phase timestamps are set at most once and
/// are monotone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction identifier.
    pub id: TransactionId,
    /// The buyer paying into escrow.
    pub buyer: PartyId,
    /// The seller receiving the payout.
    pub seller: PartyId,
    /// Reference to the traded listing.
    pub listing: String,
    /// Agreed amount, fixed at creation.
    pub amount: Amount,
    /// Fees computed once at creation.
    pub fees: FeeBreakdown,
    /// Current lifecycle status.
    pub status: TransactionStatus,
    /// Terms fixed at creation.
    pub agreement: Agreement,
    /// Carrier tracking, attached at shipment.
    pub tracking: Option<TrackingInfo>,
    /// Open or historical dispute against this transaction.
    pub dispute: Option<DisputeId>,
    /// Refund issued by a dispute resolution, recorded even when zero.
    pub refund_amount: Option<Amount>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// When the buyer funded escrow.
    pub funded_at: Option<DateTime<Utc>>,
    /// When the seller shipped.
    pub shipped_at: Option<DateTime<Utc>>,
    /// When delivery was confirmed.
    pub delivered_at: Option<DateTime<Utc>>,
    /// When funds were released to the seller.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Create a new pending transaction.
    #[must_use]
    pub fn new(
        buyer: PartyId,
        seller: PartyId,
        listing: String,
        amount: Amount,
        fees: FeeBreakdown,
        agreement: Agreement,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            buyer,
            seller,
            listing,
            amount,
            fees,
            status: TransactionStatus::Pending,
            agreement,
            tracking: None,
            dispute: None,
            refund_amount: None,
            created_at: now,
            updated_at: now,
            funded_at: None,
            shipped_at: None,
            delivered_at: None,
            completed_at: None,
        }
    }

    /// The role `candidate` plays in this transaction, if any.
    #[must_use]
    pub fn party_of(&self, candidate: &PartyId) -> Option<Party> {
        if *candidate == self.buyer {
            Some(Party::Buyer)
        } else if *candidate == self.seller {
            Some(Party::Seller)
        } else {
            None
        }
    }

    /// The instant the inspection window closes, once delivered.
    #[must_use]
    pub fn inspection_deadline(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
            .map(|delivered| delivered + self.agreement.inspection_period())
    }

    fn transition_to(
        &mut self,
        target: TransactionStatus,
        operation: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !self.status.can_transition_to(&target) {
            return Err(EscrowError::state_conflict(operation, self.status.as_str()));
        }
        self.status = target;
        self.updated_at = now;
        Ok(())
    }

    /// Record buyer funding. `Pending → Funded`.
    pub fn mark_funded(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition_to(TransactionStatus::Funded, "fund", now)?;
        self.funded_at = Some(now);
        Ok(())
    }

    /// Record shipment with tracking. `Funded → Shipped`.
    pub fn mark_shipped(&mut self, tracking: TrackingInfo, now: DateTime<Utc>) -> Result<()> {
        self.transition_to(TransactionStatus::Shipped, "ship", now)?;
        self.shipped_at = Some(now);
        self.tracking = Some(tracking);
        Ok(())
    }

    /// Record delivery. `Shipped → Delivered`.
    pub fn mark_delivered(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition_to(TransactionStatus::Delivered, "confirm delivery", now)?;
        self.delivered_at = Some(now);
        Ok(())
    }

    /// Record completion and funds release. `Delivered | Disputed → Completed`.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition_to(TransactionStatus::Completed, "complete", now)?;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Record an opened dispute. `Shipped | Delivered → Disputed`.
    pub fn mark_disputed(&mut self, dispute: DisputeId, now: DateTime<Utc>) -> Result<()> {
        self.transition_to(TransactionStatus::Disputed, "open dispute", now)?;
        self.dispute = Some(dispute);
        Ok(())
    }

    /// Record a buyer refund. `Disputed → Refunded`.
    pub fn mark_refunded(&mut self, refund: Amount, now: DateTime<Utc>) -> Result<()> {
        self.transition_to(TransactionStatus::Refunded, "refund", now)?;
        self.refund_amount = Some(refund);
        Ok(())
    }

    /// Return to the inspection window after a dispute is withdrawn.
    /// `Disputed → Delivered`. The dispute reference is kept for history.
    pub fn reopen_delivery(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition_to(TransactionStatus::Delivered, "reopen inspection", now)
    }
}

/// Aggregate statistics over escrow transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowStats {
    /// All transactions ever created.
    pub total_transactions: usize,
    /// Transactions with money still in flight.
    pub active_transactions: usize,
    /// Transactions completed with a seller payout.
    pub completed_transactions: usize,
    /// Transactions currently disputed.
    pub disputed_transactions: usize,
    /// Sum of all transaction amounts.
    pub total_volume: Amount,
    /// Average transaction amount.
    pub average_value: Amount,
}

impl EscrowStats {
    /// Aggregate stats over a set of transactions.
    #[must_use]
    pub fn collect(transactions: &[Transaction]) -> Self {
        let total_transactions = transactions.len();
        let active_transactions = transactions.iter().filter(|t| t.status.is_active()).count();
        let completed_transactions = transactions
            .iter()
            .filter(|t| t.status == TransactionStatus::Completed)
            .count();
        let disputed_transactions = transactions
            .iter()
            .filter(|t| t.status == TransactionStatus::Disputed)
            .count();
        let total_volume = transactions
            .iter()
            .fold(Amount::ZERO, |sum, t| sum.saturating_add(t.amount));
        let average_value = if total_transactions == 0 {
            Amount::ZERO
        } else {
            Amount::from_minor(total_volume.minor() / total_transactions as u64)
        };

        Self {
            total_transactions,
            active_transactions,
            completed_transactions,
            disputed_transactions,
            total_volume,
            average_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fees;
    use test_case::test_case;

    fn test_transaction(amount: Amount) -> Transaction {
        let now = Utc::now();
        Transaction::new(
            PartyId::new("buyer-1"),
            PartyId::new("seller-1"),
            "listing-1".to_string(),
            amount,
            fees::calculate(amount).unwrap(),
            Agreement::from_terms(AgreementTerms::default(), amount, now),
            now,
        )
    }

    #[test_case(TransactionStatus::Pending, TransactionStatus::Funded, true)]
    #[test_case(TransactionStatus::Funded, TransactionStatus::Shipped, true)]
    #[test_case(TransactionStatus::Shipped, TransactionStatus::Delivered, true)]
    #[test_case(TransactionStatus::Delivered, TransactionStatus::Completed, true)]
    #[test_case(TransactionStatus::Shipped, TransactionStatus::Disputed, true)]
    #[test_case(TransactionStatus::Delivered, TransactionStatus::Disputed, true)]
    #[test_case(TransactionStatus::Disputed, TransactionStatus::Completed, true)]
    #[test_case(TransactionStatus::Disputed, TransactionStatus::Refunded, true)]
    #[test_case(TransactionStatus::Disputed, TransactionStatus::Delivered, true)]
    #[test_case(TransactionStatus::Pending, TransactionStatus::Shipped, false)]
    #[test_case(TransactionStatus::Pending, TransactionStatus::Disputed, false)]
    #[test_case(TransactionStatus::Funded, TransactionStatus::Disputed, false)]
    #[test_case(TransactionStatus::Funded, TransactionStatus::Delivered, false)]
    #[test_case(TransactionStatus::Completed, TransactionStatus::Disputed, false)]
    #[test_case(TransactionStatus::Refunded, TransactionStatus::Funded, false)]
    #[test_case(TransactionStatus::Completed, TransactionStatus::Refunded, false)]
    fn transition_table(from: TransactionStatus, to: TransactionStatus, valid: bool) {
        assert_eq!(from.can_transition_to(&to), valid);
    }

    #[test]
    fn terminal_states() {
        assert!(TransactionStatus::Completed.is_terminal());
        assert!(TransactionStatus::Refunded.is_terminal());
        assert!(!TransactionStatus::Disputed.is_terminal());
        assert!(!TransactionStatus::Delivered.is_terminal());
    }

    #[test]
    fn new_transaction_starts_pending() {
        let txn = test_transaction(Amount::from_major(1000));
        assert_eq!(txn.status, TransactionStatus::Pending);
        assert!(txn.funded_at.is_none());
        assert!(txn.tracking.is_none());
        assert!(txn.dispute.is_none());
        assert!(txn.refund_amount.is_none());
    }

    #[test]
    fn phase_timestamps_are_monotone() {
        let mut txn = test_transaction(Amount::from_major(1000));
        let t0 = txn.created_at;

        txn.mark_funded(t0 + Duration::hours(1)).unwrap();
        txn.mark_shipped(
            TrackingInfo::new("carrier", "track-1", t0 + Duration::hours(2)),
            t0 + Duration::hours(2),
        )
        .unwrap();
        txn.mark_delivered(t0 + Duration::hours(3)).unwrap();
        txn.mark_completed(t0 + Duration::hours(4)).unwrap();

        let funded = txn.funded_at.unwrap();
        let shipped = txn.shipped_at.unwrap();
        let delivered = txn.delivered_at.unwrap();
        let completed = txn.completed_at.unwrap();
        assert!(funded <= shipped && shipped <= delivered && delivered <= completed);
    }

    #[test]
    fn invalid_transition_is_rejected_without_side_effects() {
        let mut txn = test_transaction(Amount::from_major(1000));
        let result = txn.mark_shipped(
            TrackingInfo::new("carrier", "track-1", Utc::now()),
            Utc::now(),
        );
        assert!(result.is_err());
        assert_eq!(txn.status, TransactionStatus::Pending);
        assert!(txn.shipped_at.is_none());
        assert!(txn.tracking.is_none());
    }

    #[test]
    fn insurance_derived_from_amount() {
        let cheap = test_transaction(Amount::from_major(1000));
        let expensive = test_transaction(Amount::from_major(20_000));
        assert!(!cheap.agreement.insurance_required);
        assert!(expensive.agreement.insurance_required);
    }

    #[test]
    fn inspection_deadline_follows_delivery() {
        let mut txn = test_transaction(Amount::from_major(1000));
        assert!(txn.inspection_deadline().is_none());

        let now = Utc::now();
        txn.mark_funded(now).unwrap();
        txn.mark_shipped(TrackingInfo::new("carrier", "track-1", now), now)
            .unwrap();
        txn.mark_delivered(now).unwrap();

        assert_eq!(txn.inspection_deadline(), Some(now + Duration::days(7)));
    }

    #[test]
    fn party_of_identifies_roles() {
        let txn = test_transaction(Amount::from_major(1000));
        assert_eq!(txn.party_of(&PartyId::new("buyer-1")), Some(Party::Buyer));
        assert_eq!(txn.party_of(&PartyId::new("seller-1")), Some(Party::Seller));
        assert_eq!(txn.party_of(&PartyId::new("stranger")), None);
    }

    #[test]
    fn stats_aggregate_counts_and_volume() {
        let mut completed = test_transaction(Amount::from_major(100));
        let now = Utc::now();
        completed.mark_funded(now).unwrap();
        completed
            .mark_shipped(TrackingInfo::new("c", "t", now), now)
            .unwrap();
        completed.mark_delivered(now).unwrap();
        completed.mark_completed(now).unwrap();

        let pending = test_transaction(Amount::from_major(300));

        let stats = EscrowStats::collect(&[completed, pending]);
        assert_eq!(stats.total_transactions, 2);
        assert_eq!(stats.active_transactions, 1);
        assert_eq!(stats.completed_transactions, 1);
        assert_eq!(stats.disputed_transactions, 0);
        assert_eq!(stats.total_volume, Amount::from_major(400));
        assert_eq!(stats.average_value, Amount::from_major(200));
    }

    #[test]
    fn stats_of_empty_set() {
        let stats = EscrowStats::collect(&[]);
        assert_eq!(stats.total_transactions, 0);
        assert_eq!(stats.average_value, Amount::ZERO);
    }

    #[test]
    fn transaction_serialization_roundtrip() {
        let txn = test_transaction(Amount::from_major(1000));
        let json = serde_json::to_string(&txn).unwrap();
        let parsed: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(txn.id, parsed.id);
        assert_eq!(txn.status, parsed.status);
        assert_eq!(txn.fees, parsed.fees);
    }
}
