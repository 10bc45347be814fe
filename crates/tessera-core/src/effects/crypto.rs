//! Signing and key management effects
//!
//! # Effect Classification
//!
//! - **Category**: Infrastructure Effect
//! - **Implementation**: `tessera-effects` (Ed25519 key manager)
//! - **Usage**: notarising signatures, certificate issuance, fresh identities

use async_trait::async_trait;
use std::sync::Arc;

use crate::crypto::{DigitalSignature, PublicKey};
use crate::Result;

/// Node key management and signing
///
/// Keys are referenced by their public half; private material never leaves
/// the handler.
#[async_trait]
pub trait CryptoEffects: Send + Sync {
    /// Sign `message` with the private key behind `key`
    async fn sign(&self, message: &[u8], key: &PublicKey) -> Result<DigitalSignature>;

    /// Verify a signature over `message`
    async fn verify(&self, message: &[u8], signature: &DigitalSignature) -> Result<bool>;

    /// Generate and retain a new key pair, returning its public key
    async fn fresh_key(&self) -> Result<PublicKey>;

    /// Whether this handler holds the private key for `key`
    fn owns_key(&self, key: &PublicKey) -> bool;
}

#[async_trait]
impl<T: CryptoEffects + ?Sized> CryptoEffects for Arc<T> {
    async fn sign(&self, message: &[u8], key: &PublicKey) -> Result<DigitalSignature> {
        (**self).sign(message, key).await
    }

    async fn verify(&self, message: &[u8], signature: &DigitalSignature) -> Result<bool> {
        (**self).verify(message, signature).await
    }

    async fn fresh_key(&self) -> Result<PublicKey> {
        (**self).fresh_key().await
    }

    fn owns_key(&self, key: &PublicKey) -> bool {
        (**self).owns_key(key)
    }
}
