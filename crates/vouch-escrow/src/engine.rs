//! The escrow state machine.
//!
//! [`EscrowEngine`] owns the transaction lifecycle. Every operation
//! follows the same shape: read the current record, validate guards
//! (state, authorization, input), perform at most one money-moving call,
//! and commit the new record through the store's compare-and-set. A
//! compare-and-set that loses a race surfaces as a state conflict, never
//! as a silent no-op or a forced transition.
//!
//! All collaborators are injected at construction, so tests substitute
//! deterministic in-memory doubles for the store, processors, limits,
//! and notification gateway.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::dispute::{DisputeCase, DisputeStatus, EvidenceItem, Resolution};
use crate::error::{EscrowError, Result};
use crate::fees;
use crate::notify::{EscrowEvent, NotificationGateway};
use crate::processor::{PaymentMethod, PaymentProcessor, PayoutProcessor, TransactionLimits};
use crate::scheduler::{DueTask, WorkQueue};
use crate::store::{DisputeStore, TransactionStore};
use crate::transaction::{
    Agreement, AgreementTerms, EscrowStats, TrackingInfo, Transaction, TransactionStatus,
};
use vouch_core::{Amount, DisputeId, Party, PartyId, TransactionId};

/// Who is confirming delivery of a shipment.
#[derive(Debug, Clone)]
pub enum DeliverySignal {
    /// The buyer confirms receipt.
    Buyer(PartyId),
    /// An automated carrier delivery event.
    Carrier,
}

/// The escrow state machine with its injected collaborators.
pub struct EscrowEngine<S, D, Q, P, R, L, N> {
    store: Arc<S>,
    disputes: Arc<D>,
    queue: Arc<Q>,
    payments: Arc<P>,
    payouts: Arc<R>,
    limits: Arc<L>,
    notifier: Arc<N>,
}

impl<S, D, Q, P, R, L, N> EscrowEngine<S, D, Q, P, R, L, N>
where
    S: TransactionStore,
    D: DisputeStore,
    Q: WorkQueue,
    P: PaymentProcessor,
    R: PayoutProcessor,
    L: TransactionLimits,
    N: NotificationGateway,
{
    /// Build an engine from its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        disputes: Arc<D>,
        queue: Arc<Q>,
        payments: Arc<P>,
        payouts: Arc<R>,
        limits: Arc<L>,
        notifier: Arc<N>,
    ) -> Self {
        Self {
            store,
            disputes,
            queue,
            payments,
            payouts,
            limits,
            notifier,
        }
    }

    /// The due-work queue feeding the inspection worker.
    #[must_use]
    pub fn work_queue(&self) -> &Arc<Q> {
        &self.queue
    }

    /// Create a new escrow transaction in `Pending`.
    ///
    /// Fees are computed here, once; the agreement is fixed alongside.
    ///
    /// # Errors
    ///
    /// Returns [`EscrowError::InvalidInput`] for a zero amount or when
    /// buyer and seller are the same party.
    pub async fn create(
        &self,
        buyer: PartyId,
        seller: PartyId,
        listing: impl Into<String> + Send,
        amount: Amount,
        terms: AgreementTerms,
    ) -> Result<Transaction> {
        if amount.is_zero() {
            return Err(EscrowError::invalid_input(
                "transaction amount must be positive",
            ));
        }
        if buyer == seller {
            return Err(EscrowError::invalid_input(
                "buyer and seller must be distinct parties",
            ));
        }

        let fees = fees::calculate(amount)?;
        let now = Utc::now();
        let agreement = Agreement::from_terms(terms, amount, now);
        let txn = Transaction::new(buyer, seller, listing.into(), amount, fees, agreement, now);

        self.store.create(txn.clone()).await?;
        info!(transaction = %txn.id, amount = %txn.amount, "escrow transaction created");
        Ok(txn)
    }

    /// Fund a pending transaction. Buyer only.
    ///
    /// Charges `amount + total_fee` through the payment processor. A
    /// failed charge leaves the record untouched apart from a logged
    /// attempt; the caller may retry while the transaction is still
    /// pending.
    ///
    /// # Errors
    ///
    /// [`EscrowError::Unauthorized`] if the caller is not the buyer,
    /// [`EscrowError::StateConflict`] outside `Pending`,
    /// [`EscrowError::LimitExceeded`] above the seller's ceiling,
    /// [`EscrowError::ProcessorFailure`] on a declined charge.
    pub async fn fund(
        &self,
        id: &TransactionId,
        caller: &PartyId,
        method: PaymentMethod,
    ) -> Result<Transaction> {
        let txn = self.store.get_by_id(id).await?;
        if txn.buyer != *caller {
            return Err(EscrowError::unauthorized("fund", caller.as_str()));
        }
        if txn.status != TransactionStatus::Pending {
            return Err(EscrowError::state_conflict("fund", txn.status.as_str()));
        }

        let limit = self.limits.max_allowed_amount(&txn.seller).await?;
        if txn.amount > limit {
            return Err(EscrowError::LimitExceeded {
                amount: txn.amount,
                limit,
            });
        }

        let charge_total = txn
            .amount
            .checked_add(txn.fees.total_fee)
            .ok_or_else(|| EscrowError::invalid_input("charge amount overflows"))?;
        if let Err(err) = self.payments.charge(caller, charge_total, method).await {
            warn!(
                transaction = %txn.id,
                error = %err,
                "charge attempt failed; transaction remains pending"
            );
            return Err(err);
        }

        let mut updated = txn;
        updated.mark_funded(Utc::now())?;
        self.store
            .compare_and_set(TransactionStatus::Pending, updated.clone())
            .await?;

        self.notifier.notify(
            &updated.seller,
            EscrowEvent::PaymentReceived {
                transaction: updated.id.clone(),
                amount: updated.amount,
            },
        );
        info!(transaction = %updated.id, "escrow transaction funded");
        Ok(updated)
    }

    /// Record shipment with tracking details. Seller only.
    ///
    /// # Errors
    ///
    /// [`EscrowError::InvalidInput`] on empty carrier or tracking number,
    /// [`EscrowError::Unauthorized`] if the caller is not the seller,
    /// [`EscrowError::StateConflict`] outside `Funded`.
    pub async fn ship(
        &self,
        id: &TransactionId,
        caller: &PartyId,
        carrier: impl Into<String> + Send,
        tracking_number: impl Into<String> + Send,
    ) -> Result<Transaction> {
        let carrier = carrier.into();
        let tracking_number = tracking_number.into();
        if carrier.trim().is_empty() || tracking_number.trim().is_empty() {
            return Err(EscrowError::invalid_input(
                "carrier and tracking number are required",
            ));
        }

        let txn = self.store.get_by_id(id).await?;
        if txn.seller != *caller {
            return Err(EscrowError::unauthorized("ship", caller.as_str()));
        }

        let now = Utc::now();
        let tracking = TrackingInfo::new(carrier, tracking_number, now);
        let expected = txn.status;
        let mut updated = txn;
        updated.mark_shipped(tracking.clone(), now)?;
        self.store.compare_and_set(expected, updated.clone()).await?;

        self.notifier.notify(
            &updated.buyer,
            EscrowEvent::ItemShipped {
                transaction: updated.id.clone(),
                carrier: tracking.carrier,
                tracking_number: tracking.tracking_number,
            },
        );
        info!(transaction = %updated.id, "escrow transaction shipped");
        Ok(updated)
    }

    /// Confirm delivery, starting the inspection window.
    ///
    /// Accepted from the owning buyer or an automated carrier signal.
    /// On success a single auto-complete task is scheduled for
    /// `now + inspection period`.
    ///
    /// # Errors
    ///
    /// [`EscrowError::Unauthorized`] if a buyer signal names anyone but
    /// the owning buyer, [`EscrowError::StateConflict`] outside `Shipped`.
    pub async fn confirm_delivery(
        &self,
        id: &TransactionId,
        signal: DeliverySignal,
    ) -> Result<Transaction> {
        self.confirm_delivery_at(id, signal, Utc::now()).await
    }

    /// [`confirm_delivery`](Self::confirm_delivery) at an explicit
    /// instant, for deterministic scheduling in tests.
    pub async fn confirm_delivery_at(
        &self,
        id: &TransactionId,
        signal: DeliverySignal,
        now: DateTime<Utc>,
    ) -> Result<Transaction> {
        let txn = self.store.get_by_id(id).await?;
        match &signal {
            DeliverySignal::Buyer(party) if *party == txn.buyer => {}
            DeliverySignal::Buyer(party) => {
                return Err(EscrowError::unauthorized(
                    "confirm delivery",
                    party.as_str(),
                ));
            }
            DeliverySignal::Carrier => {}
        }

        let expected = txn.status;
        let mut updated = txn;
        updated.mark_delivered(now)?;
        self.store.compare_and_set(expected, updated.clone()).await?;

        let due_at = now + updated.agreement.inspection_period();
        self.queue
            .schedule(DueTask::auto_complete(updated.id.clone(), due_at))
            .await?;

        info!(
            transaction = %updated.id,
            deadline = %due_at,
            "delivery confirmed, inspection window open"
        );
        Ok(updated)
    }

    /// Release funds to the seller once the inspection window closes.
    ///
    /// Re-reads current status first: anything other than `Delivered`
    /// (a dispute opened in the interim, or an already completed
    /// transaction) is a state conflict the scheduler treats as a
    /// superseded task. The completion is committed before money moves,
    /// so a concurrent dispute cannot interleave between payout and
    /// commit; a failed payout restores the delivered record and leaves
    /// an operator path to retry or escalate.
    ///
    /// # Errors
    ///
    /// [`EscrowError::StateConflict`] outside `Delivered`,
    /// [`EscrowError::ProcessorFailure`] when the payout fails.
    pub async fn auto_complete(&self, id: &TransactionId) -> Result<Transaction> {
        self.auto_complete_at(id, Utc::now()).await
    }

    /// [`auto_complete`](Self::auto_complete) at an explicit instant.
    pub async fn auto_complete_at(
        &self,
        id: &TransactionId,
        now: DateTime<Utc>,
    ) -> Result<Transaction> {
        let txn = self.store.get_by_id(id).await?;
        if txn.status != TransactionStatus::Delivered {
            return Err(EscrowError::state_conflict(
                "auto-complete",
                txn.status.as_str(),
            ));
        }

        let payout = txn.amount.saturating_sub(txn.fees.platform_fee);
        let snapshot = txn.clone();
        let mut updated = txn;
        updated.mark_completed(now)?;
        self.store
            .compare_and_set(TransactionStatus::Delivered, updated.clone())
            .await?;

        if let Err(err) = self.payouts.payout(&updated.seller, payout).await {
            let mut restored = snapshot;
            restored.updated_at = now;
            if let Err(restore_err) = self
                .store
                .compare_and_set(TransactionStatus::Completed, restored)
                .await
            {
                warn!(
                    transaction = %updated.id,
                    error = %restore_err,
                    "failed to restore delivered record after payout failure"
                );
            }
            warn!(
                transaction = %updated.id,
                error = %err,
                "payout failed at auto-complete; transaction remains delivered"
            );
            return Err(err);
        }

        self.notifier.notify(
            &updated.buyer,
            EscrowEvent::TransactionCompleted {
                transaction: updated.id.clone(),
            },
        );
        self.notifier.notify(
            &updated.seller,
            EscrowEvent::PaymentReleased {
                transaction: updated.id.clone(),
                amount: payout,
            },
        );
        info!(transaction = %updated.id, payout = %payout, "escrow transaction completed");
        Ok(updated)
    }

    /// Open a dispute against a shipped or delivered transaction.
    ///
    /// The caller must be the owning buyer or seller; the filing forces
    /// the transaction into `Disputed` and notifies the counterparty. A
    /// transaction carries at most one open dispute.
    ///
    /// # Errors
    ///
    /// [`EscrowError::InvalidInput`] on an empty reason,
    /// [`EscrowError::Unauthorized`] for a third party,
    /// [`EscrowError::StateConflict`] outside `Shipped`/`Delivered`
    /// (including an already disputed transaction).
    pub async fn open_dispute(
        &self,
        id: &TransactionId,
        caller: &PartyId,
        reason: impl Into<String> + Send,
        description: impl Into<String> + Send,
        evidence: Vec<EvidenceItem>,
    ) -> Result<DisputeCase> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(EscrowError::invalid_input("dispute reason is required"));
        }

        let txn = self.store.get_by_id(id).await?;
        let role = txn
            .party_of(caller)
            .ok_or_else(|| EscrowError::unauthorized("open dispute", caller.as_str()))?;

        let now = Utc::now();
        let case = DisputeCase::open(
            txn.id.clone(),
            role,
            reason,
            description.into(),
            evidence,
            now,
        );

        let expected = txn.status;
        let mut updated = txn;
        updated.mark_disputed(case.id.clone(), now)?;
        self.store.compare_and_set(expected, updated.clone()).await?;
        self.disputes.create(case.clone()).await?;

        let counterparty = match role {
            Party::Buyer => &updated.seller,
            Party::Seller => &updated.buyer,
        };
        self.notifier.notify(
            counterparty,
            EscrowEvent::DisputeOpened {
                transaction: updated.id.clone(),
                dispute: case.id.clone(),
            },
        );
        info!(
            transaction = %updated.id,
            dispute = %case.id,
            initiated_by = %role,
            "dispute opened"
        );
        Ok(case)
    }

    /// Move an open dispute into active investigation.
    ///
    /// # Errors
    ///
    /// [`EscrowError::StateConflict`] unless the case is `Open`.
    pub async fn begin_investigation(&self, dispute_id: &DisputeId) -> Result<DisputeCase> {
        let case = self.disputes.get_by_id(dispute_id).await?;
        let expected = case.status;
        let mut updated = case;
        updated.begin_investigation()?;
        self.disputes
            .compare_and_set(expected, updated.clone())
            .await?;
        debug!(dispute = %updated.id, "dispute under investigation");
        Ok(updated)
    }

    /// Resolve a dispute with an arbitration ruling.
    ///
    /// The ruling is claimed on the dispute record first, which makes
    /// resolution exactly-once; then money moves; then the transaction
    /// takes its terminal state. If the refund or payout fails, the
    /// dispute is restored so the same resolution can be retried.
    ///
    /// - buyer wins: refund of `refund_amount`, transaction `Refunded`;
    /// - seller wins: payout of `amount − refund_amount − platform_fee`,
    ///   transaction `Completed`. `refund_amount` is recorded either
    ///   way, including zero.
    ///
    /// # Errors
    ///
    /// [`EscrowError::InvalidInput`] if the refund exceeds the amount,
    /// [`EscrowError::StateConflict`] on double resolution or when the
    /// transaction is not disputed,
    /// [`EscrowError::ProcessorFailure`] when money movement fails.
    pub async fn resolve_dispute(
        &self,
        dispute_id: &DisputeId,
        winner: Party,
        refund_amount: Amount,
        reason: impl Into<String> + Send,
    ) -> Result<Transaction> {
        let case = self.disputes.get_by_id(dispute_id).await?;
        let txn = self.store.get_by_id(&case.transaction_id).await?;

        if refund_amount > txn.amount {
            return Err(EscrowError::invalid_input(format!(
                "refund {refund_amount} exceeds transaction amount {}",
                txn.amount
            )));
        }
        if txn.status != TransactionStatus::Disputed {
            return Err(EscrowError::state_conflict(
                "resolve dispute",
                txn.status.as_str(),
            ));
        }

        let now = Utc::now();
        let prior_status = case.status;
        let snapshot = case.clone();
        let mut resolved = case;
        resolved.resolve(
            Resolution {
                winner,
                refund_amount,
                reason: reason.into(),
            },
            now,
        )?;
        self.disputes
            .compare_and_set(prior_status, resolved.clone())
            .await?;

        let money_moved = match winner {
            Party::Buyer => self.payouts.refund(&txn.buyer, refund_amount).await,
            Party::Seller => {
                let payout = txn
                    .amount
                    .saturating_sub(refund_amount)
                    .saturating_sub(txn.fees.platform_fee);
                self.payouts.payout(&txn.seller, payout).await
            }
        };
        if let Err(err) = money_moved {
            if let Err(restore_err) = self
                .disputes
                .compare_and_set(DisputeStatus::Resolved, snapshot)
                .await
            {
                warn!(
                    dispute = %dispute_id,
                    error = %restore_err,
                    "failed to restore dispute after processor failure"
                );
            }
            warn!(
                dispute = %dispute_id,
                error = %err,
                "resolution aborted, dispute restored for retry"
            );
            return Err(err);
        }

        let mut updated = txn;
        match winner {
            Party::Buyer => updated.mark_refunded(refund_amount, now)?,
            Party::Seller => {
                updated.mark_completed(now)?;
                updated.refund_amount = Some(refund_amount);
            }
        }
        self.store
            .compare_and_set(TransactionStatus::Disputed, updated.clone())
            .await?;

        for party in [&updated.buyer, &updated.seller] {
            self.notifier.notify(
                party,
                EscrowEvent::DisputeResolved {
                    transaction: updated.id.clone(),
                    dispute: resolved.id.clone(),
                    winner,
                },
            );
        }
        info!(
            transaction = %updated.id,
            dispute = %resolved.id,
            winner = %winner,
            refund = %refund_amount,
            "dispute resolved"
        );
        Ok(updated)
    }

    /// Withdraw an open dispute without a ruling.
    ///
    /// The transaction returns to `Delivered` with its original
    /// inspection deadline intact; if that deadline has already passed,
    /// completion becomes due immediately.
    ///
    /// # Errors
    ///
    /// [`EscrowError::StateConflict`] unless the case is `Open` and the
    /// transaction `Disputed`.
    pub async fn close_dispute(&self, dispute_id: &DisputeId) -> Result<Transaction> {
        self.close_dispute_at(dispute_id, Utc::now()).await
    }

    /// [`close_dispute`](Self::close_dispute) at an explicit instant.
    pub async fn close_dispute_at(
        &self,
        dispute_id: &DisputeId,
        now: DateTime<Utc>,
    ) -> Result<Transaction> {
        let case = self.disputes.get_by_id(dispute_id).await?;
        let txn = self.store.get_by_id(&case.transaction_id).await?;

        let prior_status = case.status;
        let mut closed = case;
        closed.close()?;
        self.disputes.compare_and_set(prior_status, closed).await?;

        let mut updated = txn;
        updated.reopen_delivery(now)?;
        self.store
            .compare_and_set(TransactionStatus::Disputed, updated.clone())
            .await?;

        let due_at = updated
            .inspection_deadline()
            .map_or(now, |deadline| deadline.max(now));
        self.queue
            .schedule(DueTask::auto_complete(updated.id.clone(), due_at))
            .await?;

        info!(
            transaction = %updated.id,
            dispute = %dispute_id,
            deadline = %due_at,
            "dispute withdrawn, inspection window resumed"
        );
        Ok(updated)
    }

    /// Fetch a transaction by ID.
    pub async fn transaction(&self, id: &TransactionId) -> Result<Transaction> {
        self.store.get_by_id(id).await
    }

    /// Fetch a dispute case by ID.
    pub async fn dispute(&self, id: &DisputeId) -> Result<DisputeCase> {
        self.disputes.get_by_id(id).await
    }

    /// All transactions where `party` plays `role`, newest first.
    pub async fn transactions_for_party(
        &self,
        party: &PartyId,
        role: Party,
    ) -> Result<Vec<Transaction>> {
        self.store.query_by_party(party, role).await
    }

    /// Aggregate statistics over all transactions.
    pub async fn stats(&self) -> Result<EscrowStats> {
        let transactions = self.store.list_all().await?;
        Ok(EscrowStats::collect(&transactions))
    }
}
