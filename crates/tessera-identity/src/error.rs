//! Identity errors

use tessera_core::{PartyName, TesseraError};
use tessera_flow::{FlowError, FlowFailure};

/// Identity registry failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// The node holds no private key for the party's well-known key
    #[error("{party} is not an identity of this node")]
    NotOurIdentity {
        /// Party asked for
        party: PartyName,
    },

    /// A certificate path that does not bind the key to the party
    #[error("Invalid certificate path: {reason}")]
    InvalidCertificate {
        /// Verification failure
        reason: String,
    },

    /// Key generation or signing failed
    #[error(transparent)]
    Core(#[from] TesseraError),
}

/// Failure of an identity exchange
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityExchangeError {
    /// The counterparty presented an identity for a different name
    #[error("Expected an identity for {expected} but received one for {actual}")]
    IdentityMismatch {
        /// Counterparty the session is with
        expected: PartyName,
        /// Name on the received identity
        actual: PartyName,
    },

    /// Registry failure
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Session or runtime failure
    #[error(transparent)]
    Flow(#[from] FlowError),
}

impl FlowFailure for IdentityExchangeError {
    fn declared_reason(&self) -> Option<String> {
        match self {
            IdentityExchangeError::IdentityMismatch { .. } => Some(self.to_string()),
            _ => None,
        }
    }
}
