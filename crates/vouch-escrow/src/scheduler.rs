//! Deferred auto-completion of delivered transactions.
//!
//! Instead of a timer callback, entering `Delivered` persists a due-work
//! record; a polling worker drains records whose deadline has passed and
//! invokes the engine's auto-complete. The engine re-reads current
//! status before acting, so a dispute opened in the interim turns the
//! fired task into a harmless state conflict — that re-check is the sole
//! correctness mechanism for the dispute/auto-complete race, and it
//! makes the race testable without wall-clock waits.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::engine::EscrowEngine;
use crate::error::Result;
use crate::notify::NotificationGateway;
use crate::processor::{PaymentProcessor, PayoutProcessor, TransactionLimits};
use crate::store::{DisputeStore, TransactionStore};
use vouch_core::TransactionId;

/// The deferred action a due task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DueAction {
    /// Release funds to the seller after the inspection window.
    AutoComplete,
}

/// A persisted unit of deferred work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DueTask {
    /// The transaction the action applies to.
    pub transaction_id: TransactionId,
    /// What to do when due.
    pub action: DueAction,
    /// When the action becomes due.
    pub due_at: DateTime<Utc>,
}

impl DueTask {
    /// A deferred auto-complete for `transaction_id` at `due_at`.
    #[must_use]
    pub fn auto_complete(transaction_id: TransactionId, due_at: DateTime<Utc>) -> Self {
        Self {
            transaction_id,
            action: DueAction::AutoComplete,
            due_at,
        }
    }
}

/// Persisted queue of deferred work.
///
/// There is no cancellation API: a task whose transaction has moved on
/// is cancelled implicitly by the status re-check at fire time.
pub trait WorkQueue: Send + Sync {
    /// Persist a task for later execution.
    fn schedule(&self, task: DueTask) -> impl Future<Output = Result<()>> + Send;

    /// Remove and return every task due at or before `now`, oldest
    /// deadline first.
    fn take_due(&self, now: DateTime<Utc>) -> impl Future<Output = Result<Vec<DueTask>>> + Send;

    /// Number of tasks still scheduled.
    fn pending(&self) -> impl Future<Output = Result<usize>> + Send;
}

/// In-memory work queue.
#[derive(Debug, Default)]
pub struct MemoryWorkQueue {
    tasks: Mutex<Vec<DueTask>>,
}

impl MemoryWorkQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkQueue for MemoryWorkQueue {
    async fn schedule(&self, task: DueTask) -> Result<()> {
        debug!(
            transaction = %task.transaction_id,
            due_at = %task.due_at,
            "due task scheduled"
        );
        self.tasks.lock().push(task);
        Ok(())
    }

    async fn take_due(&self, now: DateTime<Utc>) -> Result<Vec<DueTask>> {
        let mut tasks = self.tasks.lock();
        let mut due: Vec<DueTask> = Vec::new();
        tasks.retain(|task| {
            if task.due_at <= now {
                due.push(task.clone());
                false
            } else {
                true
            }
        });
        due.sort_by_key(|task| task.due_at);
        Ok(due)
    }

    async fn pending(&self) -> Result<usize> {
        Ok(self.tasks.lock().len())
    }
}

/// Polling worker that drives scheduled auto-completions.
pub struct InspectionWorker<S, D, Q, P, R, L, N> {
    engine: Arc<EscrowEngine<S, D, Q, P, R, L, N>>,
    poll_interval: Duration,
}

impl<S, D, Q, P, R, L, N> InspectionWorker<S, D, Q, P, R, L, N>
where
    S: TransactionStore,
    D: DisputeStore,
    Q: WorkQueue,
    P: PaymentProcessor,
    R: PayoutProcessor,
    L: TransactionLimits,
    N: NotificationGateway,
{
    /// Create a worker polling the engine's queue at `poll_interval`.
    #[must_use]
    pub fn new(engine: Arc<EscrowEngine<S, D, Q, P, R, L, N>>, poll_interval: Duration) -> Self {
        Self {
            engine,
            poll_interval,
        }
    }

    /// Drain and execute every task due at `now`.
    ///
    /// Returns how many transactions were completed. A task whose
    /// transaction is no longer delivered is a superseded no-op; a
    /// processor failure is logged and dropped — the transaction stays
    /// delivered for an operator to retry or escalate.
    ///
    /// # Errors
    ///
    /// Returns an error only if the queue itself fails.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<usize> {
        let due = self.engine.work_queue().take_due(now).await?;
        let mut completed = 0;
        for task in due {
            match task.action {
                DueAction::AutoComplete => {
                    match self.engine.auto_complete_at(&task.transaction_id, now).await {
                        Ok(_) => completed += 1,
                        Err(err) if err.is_state_conflict() => {
                            debug!(
                                transaction = %task.transaction_id,
                                "scheduled auto-complete superseded"
                            );
                        }
                        Err(err) => {
                            warn!(
                                transaction = %task.transaction_id,
                                error = %err,
                                "scheduled auto-complete failed"
                            );
                        }
                    }
                }
            }
        }
        Ok(completed)
    }

    /// Poll forever at the configured interval.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            interval.tick().await;
            match self.run_once(Utc::now()).await {
                Ok(completed) if completed > 0 => {
                    info!(completed, "inspection worker released escrow funds");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %err, "inspection worker poll failed");
                }
            }
        }
    }
}
