//! Flow and session identifiers and the session wire format

use serde::{Deserialize, Serialize};
use std::fmt;
use tessera_core::Party;
use uuid::Uuid;

/// Unique id of a flow instance on a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowId(pub Uuid);

impl FlowId {
    /// Fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FlowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flow-{}", self.0)
    }
}

/// Session id, chosen by the node that opened the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// A flow's handle on one session with one counterparty
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowSession {
    /// Session id
    pub id: SessionId,
    /// The other side
    pub counterparty: Party,
}

/// Which side of a session a flow is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionRole {
    /// Opened the session
    Initiator,
    /// Was started by an incoming session
    Responder,
}

impl SessionRole {
    /// The role of the other side
    pub fn opposite(self) -> Self {
        match self {
            SessionRole::Initiator => SessionRole::Responder,
            SessionRole::Responder => SessionRole::Initiator,
        }
    }
}

/// Body of a session message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionMessage {
    /// Opens the session and starts the responder for `protocol`
    Init {
        /// Initiating protocol name
        protocol: String,
        /// The initiating party
        initiator: Party,
        /// First payload, when the session is opened by a send
        payload: Option<Vec<u8>>,
    },
    /// An application payload
    Data(Vec<u8>),
    /// The sender's flow failed
    Error {
        /// Reason the sender chose to share
        reason: String,
    },
    /// No responder is registered for the requested protocol
    Reject {
        /// Protocol that was requested
        protocol: String,
    },
    /// The sender's flow finished
    End,
}

/// A session message addressed to one side of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEnvelope {
    /// Session the message belongs to
    pub session_id: SessionId,
    /// Side that sent it; the message is for the opposite side
    pub sender_role: SessionRole,
    /// Message body
    pub body: SessionMessage,
}

impl SessionEnvelope {
    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self.body {
            SessionMessage::Init { .. } => "init",
            SessionMessage::Data(_) => "data",
            SessionMessage::Error { .. } => "error",
            SessionMessage::Reject { .. } => "reject",
            SessionMessage::End => "end",
        }
    }
}
