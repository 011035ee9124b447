//! Dispute cases raised against in-flight escrow transactions.
//!
//! A dispute is created only while the owning transaction is shipped or
//! delivered. Its resolution feeds exactly one follow-up mutation back
//! into the transaction: a buyer win refunds, a seller win completes
//! with a (possibly zero) partial refund recorded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{EscrowError, Result};
use vouch_core::{Amount, DisputeId, Party, TransactionId};

/// Lifecycle status of a dispute case.
///
/// `Open → Investigating → Resolved`, or `Open → Closed` when withdrawn
/// without a ruling. Terminal states: `Resolved`, `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    /// Filed, awaiting review.
    Open,
    /// Under active investigation.
    Investigating,
    /// Ruled with a resolution payload. Terminal state.
    Resolved,
    /// Withdrawn without a ruling. Terminal state.
    Closed,
}

impl DisputeStatus {
    /// Checks if a transition to the target status is valid.
    #[must_use]
    pub const fn can_transition_to(&self, target: &Self) -> bool {
        use DisputeStatus::{Closed, Investigating, Open, Resolved};

        matches!(
            (self, target),
            (Open, Investigating | Resolved | Closed) | (Investigating, Resolved)
        )
    }

    /// Whether this status is terminal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Closed)
    }

    /// The canonical string name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Investigating => "investigating",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of evidence attached to a dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    /// Photo evidence.
    Image,
    /// Document evidence (receipt, appraisal).
    Document,
    /// Conversation excerpt between the parties.
    Message,
}

/// A single piece of evidence attached to a dispute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// What kind of evidence this is.
    pub kind: EvidenceKind,
    /// Reference to the stored artifact.
    pub reference: String,
    /// Submitter's note about the evidence.
    pub note: String,
}

impl EvidenceItem {
    /// Create an evidence item.
    #[must_use]
    pub fn new(kind: EvidenceKind, reference: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            kind,
            reference: reference.into(),
            note: note.into(),
        }
    }
}

/// The arbitration ruling attached to a resolved dispute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// The party the ruling favors.
    pub winner: Party,
    /// Refund issued to the buyer, `0 ≤ refund ≤ transaction amount`.
    pub refund_amount: Amount,
    /// Arbitrator's reasoning.
    pub reason: String,
}

/// A dispute case against an escrow transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisputeCase {
    /// Unique dispute identifier.
    pub id: DisputeId,
    /// The transaction under dispute.
    pub transaction_id: TransactionId,
    /// Which party filed the dispute.
    pub initiated_by: Party,
    /// Short reason category.
    pub reason: String,
    /// Free-text description of the problem.
    pub description: String,
    /// Evidence submitted with the filing.
    pub evidence: Vec<EvidenceItem>,
    /// Current case status.
    pub status: DisputeStatus,
    /// Ruling, present once resolved.
    pub resolution: Option<Resolution>,
    /// When the dispute was filed.
    pub created_at: DateTime<Utc>,
    /// When the dispute was resolved.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl DisputeCase {
    /// File a new dispute in the `Open` status.
    #[must_use]
    pub fn open(
        transaction_id: TransactionId,
        initiated_by: Party,
        reason: impl Into<String>,
        description: impl Into<String>,
        evidence: Vec<EvidenceItem>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DisputeId::new(),
            transaction_id,
            initiated_by,
            reason: reason.into(),
            description: description.into(),
            evidence,
            status: DisputeStatus::Open,
            resolution: None,
            created_at: now,
            resolved_at: None,
        }
    }

    fn transition_to(&mut self, target: DisputeStatus, operation: &str) -> Result<()> {
        if !self.status.can_transition_to(&target) {
            return Err(EscrowError::state_conflict(operation, self.status.as_str()));
        }
        self.status = target;
        Ok(())
    }

    /// Move the case into active investigation. `Open → Investigating`.
    pub fn begin_investigation(&mut self) -> Result<()> {
        self.transition_to(DisputeStatus::Investigating, "begin investigation")
    }

    /// Attach a ruling. `Open | Investigating → Resolved`.
    ///
    /// A dispute can be resolved exactly once; a second attempt fails
    /// with a state conflict.
    pub fn resolve(&mut self, resolution: Resolution, now: DateTime<Utc>) -> Result<()> {
        self.transition_to(DisputeStatus::Resolved, "resolve dispute")?;
        self.resolution = Some(resolution);
        self.resolved_at = Some(now);
        Ok(())
    }

    /// Withdraw the case without a ruling. `Open → Closed`.
    pub fn close(&mut self) -> Result<()> {
        self.transition_to(DisputeStatus::Closed, "close dispute")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn test_case_open() -> DisputeCase {
        DisputeCase::open(
            TransactionId::new(),
            Party::Buyer,
            "item_not_as_described",
            "screen has a crack not shown in the listing",
            vec![EvidenceItem::new(
                EvidenceKind::Image,
                "media/crack.jpg",
                "front of device",
            )],
            Utc::now(),
        )
    }

    #[test_case(DisputeStatus::Open, DisputeStatus::Investigating, true)]
    #[test_case(DisputeStatus::Open, DisputeStatus::Resolved, true)]
    #[test_case(DisputeStatus::Open, DisputeStatus::Closed, true)]
    #[test_case(DisputeStatus::Investigating, DisputeStatus::Resolved, true)]
    #[test_case(DisputeStatus::Investigating, DisputeStatus::Closed, false)]
    #[test_case(DisputeStatus::Resolved, DisputeStatus::Open, false)]
    #[test_case(DisputeStatus::Resolved, DisputeStatus::Closed, false)]
    #[test_case(DisputeStatus::Closed, DisputeStatus::Resolved, false)]
    fn transition_table(from: DisputeStatus, to: DisputeStatus, valid: bool) {
        assert_eq!(from.can_transition_to(&to), valid);
    }

    #[test]
    fn filing_starts_open_with_evidence() {
        let case = test_case_open();
        assert_eq!(case.status, DisputeStatus::Open);
        assert_eq!(case.evidence.len(), 1);
        assert!(case.resolution.is_none());
        assert!(case.resolved_at.is_none());
    }

    #[test]
    fn resolve_attaches_ruling() {
        let mut case = test_case_open();
        case.resolve(
            Resolution {
                winner: Party::Buyer,
                refund_amount: Amount::from_major(500),
                reason: "evidence supports the claim".to_string(),
            },
            Utc::now(),
        )
        .unwrap();

        assert_eq!(case.status, DisputeStatus::Resolved);
        assert!(case.resolved_at.is_some());
        let resolution = case.resolution.unwrap();
        assert_eq!(resolution.winner, Party::Buyer);
        assert_eq!(resolution.refund_amount, Amount::from_major(500));
    }

    #[test]
    fn resolve_twice_is_rejected() {
        let mut case = test_case_open();
        let ruling = Resolution {
            winner: Party::Seller,
            refund_amount: Amount::ZERO,
            reason: "no fault found".to_string(),
        };
        case.resolve(ruling.clone(), Utc::now()).unwrap();

        let second = case.resolve(ruling, Utc::now());
        assert!(second.is_err());
        assert_eq!(case.status, DisputeStatus::Resolved);
    }

    #[test]
    fn resolve_after_investigation() {
        let mut case = test_case_open();
        case.begin_investigation().unwrap();
        assert_eq!(case.status, DisputeStatus::Investigating);

        case.resolve(
            Resolution {
                winner: Party::Seller,
                refund_amount: Amount::ZERO,
                reason: "claim unsupported".to_string(),
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(case.status, DisputeStatus::Resolved);
    }

    #[test]
    fn close_only_from_open() {
        let mut case = test_case_open();
        case.begin_investigation().unwrap();
        assert!(case.close().is_err());

        let mut fresh = test_case_open();
        fresh.close().unwrap();
        assert_eq!(fresh.status, DisputeStatus::Closed);
        assert!(fresh.resolved_at.is_none());
    }

    #[test]
    fn dispute_serialization_roundtrip() {
        let case = test_case_open();
        let json = serde_json::to_string(&case).unwrap();
        let parsed: DisputeCase = serde_json::from_str(&json).unwrap();
        assert_eq!(case.id, parsed.id);
        assert_eq!(case.status, parsed.status);
        assert_eq!(case.evidence, parsed.evidence);
    }
}
