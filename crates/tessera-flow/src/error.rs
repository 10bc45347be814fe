//! Flow runtime errors

use std::fmt;
use tessera_core::{PartyName, TesseraError};

use crate::session::SessionId;

/// Failures raised by the flow runtime and session operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    /// No message arrived within the receive timeout; the session is closed
    #[error("Session {session} with {counterparty} timed out after {after_ms}ms")]
    Timeout {
        /// Session that timed out
        session: SessionId,
        /// Counterparty that never answered
        counterparty: PartyName,
        /// Timeout that elapsed
        after_ms: u64,
    },

    /// The counterparty flow failed and reported a reason
    #[error("Counterparty {counterparty} failed: {reason}")]
    CounterpartyError {
        /// Counterparty that failed
        counterparty: PartyName,
        /// Reason it declared
        reason: String,
    },

    /// The counterparty finished and closed the session
    #[error("Session {session} was ended by the counterparty")]
    SessionEnded {
        /// Closed session
        session: SessionId,
    },

    /// A payload that does not decode to the expected type
    #[error("Unexpected message on session {session}: {reason}")]
    UnexpectedMessage {
        /// Session the message arrived on
        session: SessionId,
        /// Decode failure
        reason: String,
    },

    /// `initiate` called from a flow that is not an initiating protocol
    #[error("Flow {flow} is not an initiating flow")]
    NotInitiating {
        /// Name of the flow
        flow: String,
    },

    /// The counterparty has no responder for the protocol
    #[error("No responder registered for protocol {protocol}")]
    NoResponder {
        /// Protocol that was requested
        protocol: String,
    },

    /// A failure whose reason the flow chooses to share with counterparties
    #[error("{reason}")]
    Declared {
        /// Shared reason
        reason: String,
    },

    /// Message delivery failed
    #[error("Transport error: {message}")]
    Transport {
        /// Failure description
        message: String,
    },

    /// Payload encoding failed
    #[error("Serialization error: {message}")]
    Serialization {
        /// Failure description
        message: String,
    },

    /// Checkpoint could not be saved or restored
    #[error("Checkpoint error: {message}")]
    Checkpoint {
        /// Failure description
        message: String,
    },

    /// A node service the flow needs is not installed or failed
    #[error("Service error: {message}")]
    Service {
        /// Failure description
        message: String,
    },

    /// The flow was aborted before completing
    #[error("Flow cancelled")]
    Cancelled,
}

impl FlowError {
    /// Create a declared failure
    pub fn declared(reason: impl Into<String>) -> Self {
        Self::Declared {
            reason: reason.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a checkpoint error
    pub fn checkpoint(message: impl Into<String>) -> Self {
        Self::Checkpoint {
            message: message.into(),
        }
    }

    /// Create a service error
    pub fn service(message: impl Into<String>) -> Self {
        Self::Service {
            message: message.into(),
        }
    }
}

impl From<bincode::Error> for FlowError {
    fn from(err: bincode::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<TesseraError> for FlowError {
    fn from(err: TesseraError) -> Self {
        match err {
            TesseraError::Serialization { message } => Self::Serialization { message },
            TesseraError::Storage { message } => Self::Checkpoint { message },
            other => Self::service(other.to_string()),
        }
    }
}

/// Decides what of a flow failure may be told to counterparties
///
/// When a flow fails, every open session is sent an error. Only a declared
/// reason is forwarded; anything else is replaced by a generic message.
pub trait FlowFailure: fmt::Display {
    /// Reason safe to share, if any
    fn declared_reason(&self) -> Option<String> {
        None
    }
}

impl FlowFailure for FlowError {
    fn declared_reason(&self) -> Option<String> {
        match self {
            FlowError::Declared { reason } => Some(reason.clone()),
            _ => None,
        }
    }
}

/// Reason sent to counterparties when a flow fails without declaring one
pub const GENERIC_FAILURE_REASON: &str = "Counterparty flow failed";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_declared_reasons_cross_boundary() {
        assert_eq!(
            FlowError::declared("bad input").declared_reason(),
            Some("bad input".to_string())
        );
        assert_eq!(FlowError::transport("socket closed").declared_reason(), None);
        assert_eq!(FlowError::Cancelled.declared_reason(), None);
    }

    #[test]
    fn test_core_error_conversion() {
        let err = FlowError::from(TesseraError::storage("disk full"));
        assert!(matches!(err, FlowError::Checkpoint { .. }));
    }
}
