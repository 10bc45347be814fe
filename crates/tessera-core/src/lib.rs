//! # Tessera Core
//!
//! Foundation types shared by every Tessera crate. Nothing in here performs
//! I/O or holds key material; signing and clocks are reached through the
//! effect traits, which are implemented by `tessera-effects` and the testkit.
//!
//! - **crypto**: public keys, signatures, pure verification, composite keys
//! - **identity**: parties, anonymous identities, certificate paths
//! - **time**: timestamps and transaction time windows
//! - **effects**: `CryptoEffects`, `PhysicalTimeEffects`
//! - **config**: TOML-backed configuration trait

#![forbid(unsafe_code)]

pub mod config;
pub mod crypto;
pub mod effects;
pub mod errors;
pub mod hash;
pub mod identity;
pub mod time;

pub use config::TesseraConfig;
pub use crypto::{
    CompositeKey, CompositeKeyBuilder, DigitalSignature, Ed25519Verifier, PublicKey,
    SignatureVerifier,
};
pub use errors::{Result, TesseraError};
pub use hash::SecureHash;
pub use identity::{
    AnonymousParty, CertPath, Certificate, Party, PartyName, VerifiedAnonymousIdentity,
};
pub use time::{PhysicalTime, TimeWindow};
