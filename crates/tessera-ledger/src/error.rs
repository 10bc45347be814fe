//! Ledger error types

use serde::{Deserialize, Serialize};
use tessera_core::{PartyName, SecureHash, TesseraError};

use crate::StateRef;

/// Structural defects detected when a transaction value is built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum MalformedTransaction {
    /// The same state is consumed twice
    #[error("Duplicate input {state_ref}")]
    DuplicateInput {
        /// The repeated reference
        state_ref: StateRef,
    },

    /// A general transaction moves a state to a different notary
    #[error("Notary change from {expected} to {found} requires a notary change transaction")]
    NotaryChangeInWrongTransactionType {
        /// Notary the transaction is bound to
        expected: PartyName,
        /// Notary named by the offending state
        found: PartyName,
    },

    /// Inputs or a time window are present but no notary is named
    #[error("Transaction consumes inputs or has a time window but names no notary")]
    MissingNotary,

    /// A signed transaction with an empty signature list
    #[error("Signed transaction must carry at least one signature")]
    NoSignatures,

    /// A notary change transaction that does not only re-point its inputs
    #[error("Invalid notary change: {reason}")]
    InvalidNotaryChange {
        /// What is wrong with it
        reason: String,
    },
}

impl MalformedTransaction {
    /// Create an invalid notary change error
    pub fn invalid_notary_change(reason: impl Into<String>) -> Self {
        Self::InvalidNotaryChange {
            reason: reason.into(),
        }
    }
}

/// Errors from building, resolving or storing transactions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Structural defect
    #[error(transparent)]
    Malformed(#[from] MalformedTransaction),

    /// An input whose producing output could not be found
    #[error("Unresolved input {state_ref}")]
    UnresolvedInput {
        /// The input that could not be resolved
        state_ref: StateRef,
    },

    /// A transaction id absent from storage
    #[error("Unknown transaction {tx_id}")]
    UnknownTransaction {
        /// The missing id
        tx_id: SecureHash,
    },

    /// Foundation failure (encoding, signing)
    #[error(transparent)]
    Core(#[from] TesseraError),
}

/// Result alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

impl From<bincode::Error> for LedgerError {
    fn from(err: bincode::Error) -> Self {
        Self::Core(TesseraError::from(err))
    }
}
