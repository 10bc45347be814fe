//! Effect trait definitions
//!
//! Effects are the node services flows reach outside themselves for: signing
//! with held keys and reading the clock. Handlers live in `tessera-effects`
//! (production) and `tessera-testkit` (deterministic). Domain-specific services
//! (uniqueness, identity, transaction resolution) are declared in their own crates.

pub mod crypto;
pub mod time;

pub use crypto::CryptoEffects;
pub use time::{PhysicalTimeEffects, TimeError};
