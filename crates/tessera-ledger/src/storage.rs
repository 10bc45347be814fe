//! Transaction storage and dependency resolution
//!
//! **Effect Classification**: Infrastructure. The in-memory store is shared
//! across flows, guarded by a short `parking_lot` lock that is never held
//! across an await point.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use tessera_core::SecureHash;
use tracing::debug;

use crate::error::{LedgerError, Result};
use crate::SignedTransaction;

/// A transaction together with every transaction its inputs depend on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTransaction {
    /// The requested transaction
    pub transaction: SignedTransaction,
    /// Transitive dependencies, producers before consumers
    pub dependencies: Vec<SignedTransaction>,
}

/// Looks up a transaction and its dependency chain
#[async_trait]
pub trait TransactionResolver: Send + Sync {
    /// Resolve `tx_id` and everything its inputs transitively reference
    async fn resolve(&self, tx_id: &SecureHash) -> Result<ResolvedTransaction>;
}

#[async_trait]
impl<T: TransactionResolver + ?Sized> TransactionResolver for Arc<T> {
    async fn resolve(&self, tx_id: &SecureHash) -> Result<ResolvedTransaction> {
        (**self).resolve(tx_id).await
    }
}

/// Keyed store of validated transactions
pub trait TransactionStorage: Send + Sync {
    /// Store a transaction; returns false if it was already present
    fn add_transaction(&self, stx: SignedTransaction) -> bool;

    /// Fetch by id
    fn get_transaction(&self, tx_id: &SecureHash) -> Option<SignedTransaction>;
}

/// In-memory transaction store that also resolves dependency chains
#[derive(Debug, Default, Clone)]
pub struct InMemoryTransactionStorage {
    transactions: Arc<RwLock<HashMap<SecureHash, SignedTransaction>>>,
}

impl InMemoryTransactionStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored transactions
    pub fn len(&self) -> usize {
        self.transactions.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.transactions.read().is_empty()
    }
}

impl TransactionStorage for InMemoryTransactionStorage {
    fn add_transaction(&self, stx: SignedTransaction) -> bool {
        let id = stx.id();
        let inserted = self.transactions.write().insert(id, stx).is_none();
        debug!(tx_id = %id, inserted, "Stored transaction");
        inserted
    }

    fn get_transaction(&self, tx_id: &SecureHash) -> Option<SignedTransaction> {
        self.transactions.read().get(tx_id).cloned()
    }
}

#[async_trait]
impl TransactionResolver for InMemoryTransactionStorage {
    async fn resolve(&self, tx_id: &SecureHash) -> Result<ResolvedTransaction> {
        let transactions = self.transactions.read();
        let transaction = transactions
            .get(tx_id)
            .cloned()
            .ok_or(LedgerError::UnknownTransaction { tx_id: *tx_id })?;

        // Breadth-first walk over input producers; reversed so that
        // producers come before their consumers.
        let mut visited = BTreeSet::from([*tx_id]);
        let mut queue: VecDeque<SecureHash> =
            transaction.tx().inputs().iter().map(|i| i.tx_id).collect();
        let mut chain = Vec::new();
        while let Some(next) = queue.pop_front() {
            if !visited.insert(next) {
                continue;
            }
            let dependency = transactions
                .get(&next)
                .ok_or(LedgerError::UnknownTransaction { tx_id: next })?;
            queue.extend(dependency.tx().inputs().iter().map(|i| i.tx_id));
            chain.push(dependency.clone());
        }
        chain.reverse();

        debug!(tx_id = %tx_id, dependencies = chain.len(), "Resolved transaction");
        Ok(ResolvedTransaction {
            transaction,
            dependencies: chain,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TransactionKind, TransactionState, WireTransaction};
    use assert_matches::assert_matches;
    use tessera_core::{DigitalSignature, Party, PartyName, PublicKey};

    fn notary() -> Party {
        Party::new(PartyName::new("Notary").unwrap(), PublicKey([9; 32]))
    }

    fn signed(tx: WireTransaction) -> SignedTransaction {
        SignedTransaction::new(tx, vec![DigitalSignature::new(PublicKey([1; 32]), vec![0; 64])])
            .unwrap()
    }

    fn chain_of_three() -> (SignedTransaction, SignedTransaction, SignedTransaction) {
        let n = notary();
        let state = TransactionState::new("cash", vec![], n.clone());
        let issue = WireTransaction::new(
            vec![],
            vec![state.clone()],
            vec![],
            None,
            None,
            TransactionKind::General,
        )
        .unwrap();
        let move1 = WireTransaction::new(
            vec![issue.output_ref(0)],
            vec![state.clone()],
            vec![],
            Some(n.clone()),
            None,
            TransactionKind::General,
        )
        .unwrap();
        let move2 = WireTransaction::new(
            vec![move1.output_ref(0)],
            vec![state],
            vec![],
            Some(n),
            None,
            TransactionKind::General,
        )
        .unwrap();
        (signed(issue), signed(move1), signed(move2))
    }

    #[tokio::test]
    async fn test_resolve_returns_transitive_chain() {
        let (issue, move1, move2) = chain_of_three();
        let storage = InMemoryTransactionStorage::new();
        assert!(storage.add_transaction(issue.clone()));
        assert!(storage.add_transaction(move1.clone()));
        assert!(storage.add_transaction(move2.clone()));
        assert!(!storage.add_transaction(move2.clone()));

        let resolved = storage.resolve(&move2.id()).await.unwrap();
        assert_eq!(resolved.transaction, move2);
        assert_eq!(resolved.dependencies, vec![issue, move1]);
    }

    #[tokio::test]
    async fn test_resolve_reports_missing_dependency() {
        let (_, move1, move2) = chain_of_three();
        let storage = InMemoryTransactionStorage::new();
        storage.add_transaction(move1.clone());
        storage.add_transaction(move2.clone());

        assert_matches!(
            storage.resolve(&move2.id()).await,
            Err(LedgerError::UnknownTransaction { .. })
        );
        assert_matches!(
            storage.resolve(&SecureHash::ZERO).await,
            Err(LedgerError::UnknownTransaction { tx_id }) if tx_id == SecureHash::ZERO
        );
    }
}
