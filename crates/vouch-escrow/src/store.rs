//! Storage boundary for transaction and dispute records.
//!
//! The store is the engine's only correctness-critical shared resource:
//! every transition is committed through [`TransactionStore::compare_and_set`],
//! which must reject the write when the stored status no longer matches
//! what the caller observed. That per-id conditional write is what
//! serializes concurrent transitions without any distributed lock.
//!
//! In-memory implementations back tests and development; production
//! deployments implement these traits over a durable database.

use std::collections::HashMap;
use std::future::Future;

use tokio::sync::RwLock;

use crate::dispute::{DisputeCase, DisputeStatus};
use crate::error::{EscrowError, Result};
use crate::transaction::{Transaction, TransactionStatus};
use vouch_core::{DisputeId, Party, PartyId, TransactionId};

/// Durable keyed storage for transaction records.
pub trait TransactionStore: Send + Sync {
    /// Persist a freshly created record.
    ///
    /// # Errors
    ///
    /// Returns an error if a record with the same ID already exists.
    fn create(&self, record: Transaction) -> impl Future<Output = Result<()>> + Send;

    /// Fetch a record by ID.
    ///
    /// # Errors
    ///
    /// Returns [`EscrowError::TransactionNotFound`] if absent.
    fn get_by_id(&self, id: &TransactionId) -> impl Future<Output = Result<Transaction>> + Send;

    /// Conditionally replace a record.
    ///
    /// The write succeeds only if the stored record's status equals
    /// `expected`; otherwise the caller lost a race and must re-read.
    ///
    /// # Errors
    ///
    /// Returns [`EscrowError::StateConflict`] if the stored status moved.
    fn compare_and_set(
        &self,
        expected: TransactionStatus,
        record: Transaction,
    ) -> impl Future<Output = Result<()>> + Send;

    /// All transactions where `party` plays `role`, newest first.
    fn query_by_party(
        &self,
        party: &PartyId,
        role: Party,
    ) -> impl Future<Output = Result<Vec<Transaction>>> + Send;

    /// Every stored transaction (feeds aggregate statistics).
    fn list_all(&self) -> impl Future<Output = Result<Vec<Transaction>>> + Send;
}

/// Durable keyed storage for dispute cases.
pub trait DisputeStore: Send + Sync {
    /// Persist a freshly filed case.
    ///
    /// # Errors
    ///
    /// Returns an error if a case with the same ID already exists.
    fn create(&self, case: DisputeCase) -> impl Future<Output = Result<()>> + Send;

    /// Fetch a case by ID.
    ///
    /// # Errors
    ///
    /// Returns [`EscrowError::DisputeNotFound`] if absent.
    fn get_by_id(&self, id: &DisputeId) -> impl Future<Output = Result<DisputeCase>> + Send;

    /// Conditionally replace a case; same semantics as the transaction
    /// store. Serializes double-resolution attempts.
    ///
    /// # Errors
    ///
    /// Returns [`EscrowError::StateConflict`] if the stored status moved.
    fn compare_and_set(
        &self,
        expected: DisputeStatus,
        case: DisputeCase,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// In-memory transaction store.
#[derive(Debug, Default)]
pub struct MemoryTransactionStore {
    records: RwLock<HashMap<String, Transaction>>,
}

impl MemoryTransactionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TransactionStore for MemoryTransactionStore {
    async fn create(&self, record: Transaction) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(record.id.as_str()) {
            return Err(EscrowError::invalid_input(format!(
                "transaction {} already exists",
                record.id
            )));
        }
        records.insert(record.id.as_str().to_string(), record);
        Ok(())
    }

    async fn get_by_id(&self, id: &TransactionId) -> Result<Transaction> {
        self.records
            .read()
            .await
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| EscrowError::TransactionNotFound {
                id: id.to_string(),
            })
    }

    async fn compare_and_set(
        &self,
        expected: TransactionStatus,
        record: Transaction,
    ) -> Result<()> {
        let mut records = self.records.write().await;
        let stored =
            records
                .get(record.id.as_str())
                .ok_or_else(|| EscrowError::TransactionNotFound {
                    id: record.id.to_string(),
                })?;
        if stored.status != expected {
            return Err(EscrowError::state_conflict(
                "commit transition",
                stored.status.as_str(),
            ));
        }
        records.insert(record.id.as_str().to_string(), record);
        Ok(())
    }

    async fn query_by_party(&self, party: &PartyId, role: Party) -> Result<Vec<Transaction>> {
        let records = self.records.read().await;
        let mut matches: Vec<Transaction> = records
            .values()
            .filter(|t| match role {
                Party::Buyer => t.buyer == *party,
                Party::Seller => t.seller == *party,
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matches)
    }

    async fn list_all(&self) -> Result<Vec<Transaction>> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}

/// In-memory dispute store.
#[derive(Debug, Default)]
pub struct MemoryDisputeStore {
    records: RwLock<HashMap<String, DisputeCase>>,
}

impl MemoryDisputeStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DisputeStore for MemoryDisputeStore {
    async fn create(&self, case: DisputeCase) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(case.id.as_str()) {
            return Err(EscrowError::invalid_input(format!(
                "dispute {} already exists",
                case.id
            )));
        }
        records.insert(case.id.as_str().to_string(), case);
        Ok(())
    }

    async fn get_by_id(&self, id: &DisputeId) -> Result<DisputeCase> {
        self.records
            .read()
            .await
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| EscrowError::DisputeNotFound { id: id.to_string() })
    }

    async fn compare_and_set(&self, expected: DisputeStatus, case: DisputeCase) -> Result<()> {
        let mut records = self.records.write().await;
        let stored = records
            .get(case.id.as_str())
            .ok_or_else(|| EscrowError::DisputeNotFound {
                id: case.id.to_string(),
            })?;
        if stored.status != expected {
            return Err(EscrowError::state_conflict(
                "commit transition",
                stored.status.as_str(),
            ));
        }
        records.insert(case.id.as_str().to_string(), case);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fees;
    use crate::transaction::{Agreement, AgreementTerms};
    use chrono::Utc;
    use vouch_core::Amount;

    fn test_transaction(buyer: &str, seller: &str) -> Transaction {
        let amount = Amount::from_major(1000);
        let now = Utc::now();
        Transaction::new(
            PartyId::new(buyer),
            PartyId::new(seller),
            "listing-1".to_string(),
            amount,
            fees::calculate(amount).unwrap(),
            Agreement::from_terms(AgreementTerms::default(), amount, now),
            now,
        )
    }

    #[tokio::test]
    async fn create_and_get_roundtrip() {
        let store = MemoryTransactionStore::new();
        let txn = test_transaction("buyer-1", "seller-1");

        store.create(txn.clone()).await.unwrap();
        let fetched = store.get_by_id(&txn.id).await.unwrap();
        assert_eq!(fetched.id, txn.id);
        assert_eq!(fetched.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn duplicate_create_rejected() {
        let store = MemoryTransactionStore::new();
        let txn = test_transaction("buyer-1", "seller-1");

        store.create(txn.clone()).await.unwrap();
        assert!(store.create(txn).await.is_err());
    }

    #[tokio::test]
    async fn missing_record_is_not_found() {
        let store = MemoryTransactionStore::new();
        let result = store.get_by_id(&TransactionId::new()).await;
        assert!(matches!(
            result,
            Err(EscrowError::TransactionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn compare_and_set_commits_on_matching_status() {
        let store = MemoryTransactionStore::new();
        let txn = test_transaction("buyer-1", "seller-1");
        store.create(txn.clone()).await.unwrap();

        let mut updated = txn;
        updated.mark_funded(Utc::now()).unwrap();
        store
            .compare_and_set(TransactionStatus::Pending, updated.clone())
            .await
            .unwrap();

        let fetched = store.get_by_id(&updated.id).await.unwrap();
        assert_eq!(fetched.status, TransactionStatus::Funded);
    }

    #[tokio::test]
    async fn compare_and_set_rejects_stale_status() {
        let store = MemoryTransactionStore::new();
        let txn = test_transaction("buyer-1", "seller-1");
        store.create(txn.clone()).await.unwrap();

        let mut first = txn.clone();
        first.mark_funded(Utc::now()).unwrap();
        store
            .compare_and_set(TransactionStatus::Pending, first)
            .await
            .unwrap();

        // A second writer still holding the pending snapshot must lose.
        let mut second = txn;
        second.mark_funded(Utc::now()).unwrap();
        let result = store
            .compare_and_set(TransactionStatus::Pending, second)
            .await;
        assert!(matches!(result, Err(EscrowError::StateConflict { .. })));
    }

    #[tokio::test]
    async fn query_by_party_filters_role() {
        let store = MemoryTransactionStore::new();
        let as_buyer = test_transaction("alice", "bob");
        let as_seller = test_transaction("carol", "alice");
        let unrelated = test_transaction("dave", "erin");
        store.create(as_buyer.clone()).await.unwrap();
        store.create(as_seller.clone()).await.unwrap();
        store.create(unrelated).await.unwrap();

        let buying = store
            .query_by_party(&PartyId::new("alice"), Party::Buyer)
            .await
            .unwrap();
        assert_eq!(buying.len(), 1);
        assert_eq!(buying[0].id, as_buyer.id);

        let selling = store
            .query_by_party(&PartyId::new("alice"), Party::Seller)
            .await
            .unwrap();
        assert_eq!(selling.len(), 1);
        assert_eq!(selling[0].id, as_seller.id);
    }

    #[tokio::test]
    async fn dispute_store_cas_serializes_resolution() {
        use crate::dispute::Resolution;

        let store = MemoryDisputeStore::new();
        let case = DisputeCase::open(
            TransactionId::new(),
            Party::Buyer,
            "damaged",
            "arrived broken",
            vec![],
            Utc::now(),
        );
        store.create(case.clone()).await.unwrap();

        let ruling = Resolution {
            winner: Party::Buyer,
            refund_amount: Amount::from_major(100),
            reason: "confirmed".to_string(),
        };

        let mut first = case.clone();
        first.resolve(ruling.clone(), Utc::now()).unwrap();
        store
            .compare_and_set(DisputeStatus::Open, first)
            .await
            .unwrap();

        let mut second = case;
        second.resolve(ruling, Utc::now()).unwrap();
        let result = store.compare_and_set(DisputeStatus::Open, second).await;
        assert!(matches!(result, Err(EscrowError::StateConflict { .. })));
    }
}
