//! # Tessera Flow
//!
//! Runs multi-party protocols as suspendable, checkpointed flows over
//! point-to-point sessions.
//!
//! A flow implements [`FlowLogic`] and is started on a [`FlowRuntime`]. It
//! talks to counterparties through sessions obtained from
//! [`FlowContext::initiate`]; the counterparty node starts the responder
//! registered for the initiating protocol. Messages on one session are
//! delivered in order, and a flow's failure reaches its counterparties as a
//! declared reason or a generic one.
//!
//! ## Effect Classification
//!
//! - **Category**: Orchestration
//! - **Effects**: messaging, checkpoint storage, node services
//! - **Layering**: above `tessera-core`, below the notary and identity flows

#![forbid(unsafe_code)]

pub mod checkpoint;
pub mod config;
pub mod context;
pub mod error;
pub mod logic;
pub mod network_map;
mod router;
pub mod runtime;
pub mod services;
pub mod session;
pub mod transport;

pub use checkpoint::{
    Checkpoint, CheckpointStorage, InMemoryCheckpointStorage, RecordedEffect, SessionCheckpoint,
    SuspensionPoint,
};
pub use config::FlowRuntimeConfig;
pub use context::FlowContext;
pub use error::{FlowError, FlowFailure, GENERIC_FAILURE_REASON};
pub use logic::FlowLogic;
pub use network_map::{NetworkMapCache, NodeInfo, NotaryKind};
pub use runtime::{FlowHandle, FlowRuntime, RestoredFlow};
pub use services::ServiceHub;
pub use session::{FlowId, FlowSession, SessionEnvelope, SessionId, SessionMessage, SessionRole};
pub use transport::{InMemoryEndpoint, InMemoryNetwork, InboundReceiver, MessagingService};

/// Re-exported so flow implementations need not depend on it directly
pub use async_trait::async_trait;
