//! Public keys, signatures and pure signature verification

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Result, TesseraError};

/// An Ed25519 verifying key
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    /// Wrap raw key bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse into a dalek verifying key
    pub fn to_verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(&self.0)
            .map_err(|e| TesseraError::crypto(format!("invalid public key: {e}")))
    }
}

impl From<VerifyingKey> for PublicKey {
    fn from(key: VerifyingKey) -> Self {
        Self(key.to_bytes())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({self})")
    }
}

/// A signature together with the key that produced it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DigitalSignature {
    /// Key that claims to have signed
    pub by: PublicKey,
    /// Raw signature bytes
    pub bytes: Vec<u8>,
}

impl DigitalSignature {
    /// Create a signature record
    pub fn new(by: PublicKey, bytes: Vec<u8>) -> Self {
        Self { by, bytes }
    }
}

/// Pure signature verification
///
/// Verification needs no key material or randomness, so unlike signing it is
/// not an effect. Implementations must be deterministic.
pub trait SignatureVerifier: Send + Sync {
    /// Check `signature` over `message`. Malformed keys or signatures are
    /// reported as `Ok(false)`, not as errors.
    fn verify(&self, message: &[u8], signature: &DigitalSignature) -> bool;
}

/// Ed25519 verifier backed by ed25519-dalek
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, message: &[u8], signature: &DigitalSignature) -> bool {
        let Ok(key) = signature.by.to_verifying_key() else {
            return false;
        };
        let Ok(sig) = Signature::from_slice(&signature.bytes) else {
            return false;
        };
        key.verify(message, &sig).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn signing_key(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; 32])
    }

    #[test]
    fn test_verify_valid_signature() {
        let key = signing_key(7);
        let message = b"tx-id";
        let sig = DigitalSignature::new(
            key.verifying_key().into(),
            key.sign(message).to_bytes().to_vec(),
        );
        assert!(Ed25519Verifier.verify(message, &sig));
    }

    #[test]
    fn test_verify_rejects_wrong_message_and_key() {
        let key = signing_key(7);
        let other = signing_key(8);
        let sig_bytes = key.sign(b"tx-id").to_bytes().to_vec();

        let wrong_message = DigitalSignature::new(key.verifying_key().into(), sig_bytes.clone());
        assert!(!Ed25519Verifier.verify(b"other", &wrong_message));

        let wrong_key = DigitalSignature::new(other.verifying_key().into(), sig_bytes);
        assert!(!Ed25519Verifier.verify(b"tx-id", &wrong_key));
    }

    #[test]
    fn test_verify_rejects_garbage_bytes() {
        let key = signing_key(1);
        let sig = DigitalSignature::new(key.verifying_key().into(), vec![1, 2, 3]);
        assert!(!Ed25519Verifier.verify(b"tx-id", &sig));
    }
}
