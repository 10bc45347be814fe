//! Flow checkpoints
//!
//! A checkpoint does not capture a call stack. It records the flow's initial
//! serialized state, the results of effects run through
//! [`FlowContext::record`](crate::FlowContext::record) and, per session, the
//! digests of the payloads sent and the payloads consumed. Restoring re-runs
//! the flow from its initial state, feeding it the recorded results and
//! consumed payloads and suppressing the sends it already made, until it
//! catches up with the point where it was suspended. A replayed send whose
//! payload differs from the recorded one fails the restore.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tessera_core::{Party, SecureHash};

use crate::error::FlowError;
use crate::router::RouteKey;
use crate::session::{FlowId, SessionId, SessionRole};

/// Where a flow was when its checkpoint was written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuspensionPoint {
    /// Started, no session operation yet
    Started,
    /// After a send
    Send {
        /// Session sent on
        session: SessionId,
    },
    /// Waiting for a message
    Receive {
        /// Session being read
        session: SessionId,
    },
    /// Entering a sub-flow
    SubFlowEntry {
        /// Sub-flow name
        name: String,
    },
    /// Returned from a sub-flow
    SubFlowExit {
        /// Sub-flow name
        name: String,
    },
    /// After a recorded effect
    Effect {
        /// Effect name
        name: String,
    },
}

/// Result of a local effect, replayed instead of re-running the effect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedEffect {
    /// Name the flow gave the effect
    pub name: String,
    /// Serialized result
    pub value: Vec<u8>,
}

/// Persisted record of one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCheckpoint {
    /// Session id
    pub session_id: SessionId,
    /// Counterparty
    pub counterparty: Party,
    /// Our side of the session
    pub role: SessionRole,
    /// Protocol the session was opened for
    pub protocol: String,
    /// Whether the opening message was sent (initiator only)
    pub init_sent: bool,
    /// Digests of the payloads sent, in order
    pub sent: Vec<SecureHash>,
    /// Payloads consumed, in order
    pub received: Vec<Vec<u8>>,
}

impl SessionCheckpoint {
    pub(crate) fn route(&self) -> RouteKey {
        RouteKey {
            peer: self.counterparty.name.clone(),
            session: self.session_id,
            role: self.role,
        }
    }
}

/// Everything needed to resume a flow after a restart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Flow id, kept across restarts
    pub flow_id: FlowId,
    /// Registered flow name used to find the restorer
    pub flow_name: String,
    /// Serialized flow value as it was started
    pub initial_state: Vec<u8>,
    /// Sessions in the order they were opened
    pub sessions: Vec<SessionCheckpoint>,
    /// Recorded effect results, in order
    pub effects: Vec<RecordedEffect>,
    /// Last suspension point
    pub suspension: SuspensionPoint,
    /// Last reported progress step
    pub progress: Option<String>,
}

/// Durable checkpoint store
pub trait CheckpointStorage: Send + Sync {
    /// Insert or replace the checkpoint for its flow
    fn save(&self, checkpoint: &Checkpoint) -> Result<(), FlowError>;

    /// Delete a flow's checkpoint
    fn remove(&self, flow_id: &FlowId);

    /// Every stored checkpoint
    fn load_all(&self) -> Result<Vec<Checkpoint>, FlowError>;
}

/// Checkpoint store holding bincode-encoded checkpoints in memory
///
/// Clones share storage, so a store handed to a restarted runtime sees what
/// the previous runtime wrote.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCheckpointStorage {
    checkpoints: Arc<RwLock<HashMap<FlowId, Vec<u8>>>>,
}

impl InMemoryCheckpointStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored checkpoints
    pub fn len(&self) -> usize {
        self.checkpoints.read().len()
    }

    /// Whether no checkpoint is stored
    pub fn is_empty(&self) -> bool {
        self.checkpoints.read().is_empty()
    }
}

impl CheckpointStorage for InMemoryCheckpointStorage {
    fn save(&self, checkpoint: &Checkpoint) -> Result<(), FlowError> {
        let bytes = bincode::serialize(checkpoint)
            .map_err(|e| FlowError::checkpoint(format!("encode {}: {e}", checkpoint.flow_id)))?;
        self.checkpoints.write().insert(checkpoint.flow_id, bytes);
        Ok(())
    }

    fn remove(&self, flow_id: &FlowId) {
        self.checkpoints.write().remove(flow_id);
    }

    fn load_all(&self) -> Result<Vec<Checkpoint>, FlowError> {
        self.checkpoints
            .read()
            .iter()
            .map(|(id, bytes)| {
                bincode::deserialize(bytes)
                    .map_err(|e| FlowError::checkpoint(format!("decode {id}: {e}")))
            })
            .collect()
    }
}
