//! # Tessera Notary
//!
//! Uniqueness consensus: a notary certifies that a transaction is the first
//! to consume each of its inputs and signs its id.
//!
//! - [`NotaryClientFlow`] checks every signature other than the notary's,
//!   sends the request (with the full transaction and dependency chain when
//!   the notary validates) and appends the returned signature.
//! - [`NotaryServiceFlow`] validates, checks and commits the inputs in the
//!   node's [`UniquenessProvider`], then signs. Every refusal is a typed
//!   [`NotaryError`] reply; internal failures never cross the session.
//!
//! ## Effect Classification
//!
//! - **Category**: Protocol
//! - **Effects**: signing (`CryptoEffects`), clock (`PhysicalTimeEffects`),
//!   uniqueness store, transaction resolution
//! - **Layering**: above `tessera-flow` and `tessera-signature`

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod flows;
pub mod messages;
pub mod service;
pub mod uniqueness;

pub use config::NotaryConfig;
pub use error::{ConsumingTx, NotaryError, NotaryException};
pub use flows::{NotaryClientFlow, NotaryServiceFlow, ServicePhase, AWAIT_RESPONSE, BUILD_REQUEST};
pub use messages::{NotarisationRequest, NotarisationResponse, NOTARY_PROTOCOL};
pub use service::{NotaryService, UniquenessCheck};
pub use uniqueness::{CommitResult, ShardedUniquenessStore, UniquenessProvider};
