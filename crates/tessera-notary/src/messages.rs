//! Notarisation wire messages

use serde::{Deserialize, Serialize};
use tessera_core::{DigitalSignature, SecureHash, TimeWindow};
use tessera_ledger::{ResolvedTransaction, SignedTransaction, StateRef};

use crate::error::NotaryError;

/// Protocol name of notarisation sessions
pub const NOTARY_PROTOCOL: &str = "tessera.notary";

/// Request for a notary signature
///
/// A non-validating notary only needs the identifying parts. A validating
/// notary also needs the transaction and its dependency chain in `payload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotarisationRequest {
    /// Transaction to notarise
    pub tx_id: SecureHash,
    /// Its inputs, in order
    pub inputs: Vec<StateRef>,
    /// Its time window
    pub time_window: Option<TimeWindow>,
    /// Full transaction and dependencies, for validating notaries
    pub payload: Option<ResolvedTransaction>,
}

impl NotarisationRequest {
    /// Request carrying only the identifying parts of `stx`
    pub fn identifying(stx: &SignedTransaction) -> Self {
        Self {
            tx_id: stx.id(),
            inputs: stx.tx().inputs().to_vec(),
            time_window: stx.tx().time_window().copied(),
            payload: None,
        }
    }

    /// Request carrying `stx` and its dependencies
    pub fn validating(stx: &SignedTransaction, dependencies: Vec<SignedTransaction>) -> Self {
        Self {
            payload: Some(ResolvedTransaction {
                transaction: stx.clone(),
                dependencies,
            }),
            ..Self::identifying(stx)
        }
    }
}

/// The notary's answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotarisationResponse {
    /// Signature over the transaction id
    Signed(DigitalSignature),
    /// Typed refusal
    Rejected(NotaryError),
}
