//! Signature verification errors

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tessera_core::{CompositeKey, PublicKey, SecureHash};
use tessera_ledger::MalformedTransaction;

/// Why a signed transaction is not sufficiently authorized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum SignatureError {
    /// Required signing policies left unsatisfied
    #[error("Transaction {tx_id} is missing signatures for {}", join_keys(.missing))]
    SignaturesMissing {
        /// Transaction being checked
        tx_id: SecureHash,
        /// Each unsatisfied top-level requirement, whole
        missing: BTreeSet<CompositeKey>,
    },

    /// A signature that does not verify over the transaction id
    #[error("Invalid signature by {key} on transaction {tx_id}")]
    InvalidSignature {
        /// Transaction being checked
        tx_id: SecureHash,
        /// Key the bad signature claims to be from
        key: PublicKey,
    },

    /// The transaction cannot have its requirements computed
    #[error(transparent)]
    Malformed(#[from] MalformedTransaction),
}

fn join_keys(keys: &BTreeSet<CompositeKey>) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result alias for signature checks
pub type Result<T> = std::result::Result<T, SignatureError>;
