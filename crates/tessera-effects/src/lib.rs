//! # Tessera Effects
//!
//! Production implementations of the effect traits declared in
//! `tessera-core`. Handlers here are the only place that touches key
//! material, randomness or the system clock; deterministic test doubles live
//! in `tessera-testkit`.

#![forbid(unsafe_code)]

pub mod crypto;
pub mod time;

pub use crypto::Ed25519CryptoHandler;
pub use time::RealTimeHandler;
