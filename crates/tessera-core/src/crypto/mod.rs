//! Cryptographic domain types
//!
//! Signing itself is an effect (see [`crate::effects::CryptoEffects`]); the
//! types here are plain values and pure checks over them.

pub mod composite;
pub mod keys;

pub use composite::{missing, CompositeKey, CompositeKeyBuilder, CompositeNode, WeightedKey};
pub use keys::{DigitalSignature, Ed25519Verifier, PublicKey, SignatureVerifier};
