//! # Tessera Testkit
//!
//! Shared test infrastructure: a [`MockNetwork`] of fully wired nodes over
//! an in-process transport, a [`ControllableClock`], deterministic key
//! fixtures, transaction fixtures and proptest strategies.
//!
//! ```rust,no_run
//! use tessera_testkit::*;
//! use tessera_notary::{NotaryClientFlow, NotaryConfig};
//!
//! # async fn example() {
//! let network = MockNetwork::new();
//! let notary = network.create_notary_node("Notary", NotaryConfig::default());
//! let alice = network.create_node("Alice");
//!
//! let issued = issue(&alice, notary.party(), b"token").await;
//! let stx = spend(&alice, &[issued.tx().output_ref(0)], notary.party(), None).await;
//! let notarised = alice
//!     .start_flow(NotaryClientFlow::new(stx))
//!     .unwrap()
//!     .result()
//!     .await
//!     .unwrap();
//! # }
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod clock;
pub mod fixtures;
pub mod keys;
pub mod network;
pub mod strategies;
mod tracing_setup;

pub use clock::ControllableClock;
pub use fixtures::{issue, move_builder, spend, TOKEN_CONTRACT};
pub use keys::{test_party, test_public_key, KeyFixture};
pub use network::{MockNetwork, MockNode, NETWORK_EPOCH};
pub use tracing_setup::init_test_tracing;
