//! Notary errors
//!
//! [`NotaryError`] is what a notary tells a requester; it is part of the wire
//! protocol. [`NotaryException`] is what the requesting flow fails with.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tessera_core::{PartyName, PhysicalTime, SecureHash, TimeWindow};
use tessera_flow::{FlowError, FlowFailure};
use tessera_ledger::{MalformedTransaction, StateRef};
use tessera_signature::SignatureError;

/// The transaction that consumed a state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumingTx {
    /// Consuming transaction
    pub tx_id: SecureHash,
    /// Position of the state among that transaction's inputs
    pub input_index: u32,
    /// Party that requested the notarisation
    pub requesting_party: PartyName,
}

/// Why a notary refused to sign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum NotaryError {
    /// The transaction failed validation
    #[error("Transaction invalid: {reason}")]
    TransactionInvalid {
        /// What was wrong
        reason: String,
    },

    /// Inputs were already consumed by another transaction
    #[error("Input states of {tx_id} already consumed: {}", join_refs(.conflicts))]
    Conflict {
        /// Transaction whose notarisation was refused
        tx_id: SecureHash,
        /// Each conflicting input and its consumer
        conflicts: BTreeMap<StateRef, ConsumingTx>,
    },

    /// The notary's clock is outside the transaction's time window
    #[error("Current time {current_time} is outside the time window {window}")]
    TimeWindowInvalid {
        /// Notary time when checked
        current_time: PhysicalTime,
        /// The transaction's window
        window: TimeWindow,
    },

    /// An internal failure; details stay on the notary
    #[error("Notary failure: {reason}")]
    General {
        /// Public description
        reason: String,
    },
}

fn join_refs(conflicts: &BTreeMap<StateRef, ConsumingTx>) -> String {
    conflicts
        .keys()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl NotaryError {
    /// Validation failure
    pub fn transaction_invalid(reason: impl Into<String>) -> Self {
        Self::TransactionInvalid {
            reason: reason.into(),
        }
    }

    /// Internal failure with a public description
    pub fn general(reason: impl Into<String>) -> Self {
        Self::General {
            reason: reason.into(),
        }
    }
}

/// Failure of a notarisation request
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotaryException {
    /// The notary refused
    #[error("Notarisation refused: {0}")]
    Notary(#[from] NotaryError),

    /// The transaction is not signed well enough to send to the notary
    #[error(transparent)]
    Signatures(#[from] SignatureError),

    /// The transaction cannot be notarised at all
    #[error(transparent)]
    Malformed(#[from] MalformedTransaction),

    /// The notary answered with a signature that is not its own or is invalid
    #[error("Notary {notary} returned an invalid signature")]
    InvalidNotarySignature {
        /// Notary that answered
        notary: PartyName,
    },

    /// Session or runtime failure
    #[error(transparent)]
    Flow(#[from] FlowError),
}

impl FlowFailure for NotaryException {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_message_names_refs() {
        let tx_id = SecureHash::of(b"tx");
        let consumed = StateRef::new(SecureHash::of(b"issue"), 0);
        let err = NotaryError::Conflict {
            tx_id,
            conflicts: BTreeMap::from([(
                consumed,
                ConsumingTx {
                    tx_id: SecureHash::of(b"other"),
                    input_index: 0,
                    requesting_party: PartyName::new("Bob").unwrap(),
                },
            )]),
        };
        assert!(err.to_string().contains(&consumed.to_string()));
    }

    #[test]
    fn test_notary_failures_are_not_forwarded() {
        let err = NotaryException::from(NotaryError::general("store offline"));
        assert_eq!(err.declared_reason(), None);
    }
}
