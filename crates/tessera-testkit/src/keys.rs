//! Deterministic key fixtures

use ed25519_dalek::SigningKey;
use sha2::{Digest, Sha256};
use tessera_core::{Party, PartyName, PublicKey};

/// A signing key derived from a seed string
#[derive(Debug, Clone)]
pub struct KeyFixture {
    signing_key: SigningKey,
}

impl KeyFixture {
    /// Same seed, same key
    pub fn from_seed(seed: &str) -> Self {
        let digest: [u8; 32] = Sha256::digest(seed.as_bytes()).into();
        Self {
            signing_key: SigningKey::from_bytes(&digest),
        }
    }

    /// The private half
    pub fn signing_key(&self) -> SigningKey {
        self.signing_key.clone()
    }

    /// The public half
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from(self.signing_key.verifying_key())
    }
}

/// Public key for `seed`, for tests that never sign
pub fn test_public_key(seed: &str) -> PublicKey {
    KeyFixture::from_seed(seed).public_key()
}

/// Party named `name` owning the key derived from its name
///
/// Panics on an invalid name; fixtures use literal names.
pub fn test_party(name: &str) -> Party {
    let party_name = PartyName::new(name).expect("fixture party names are valid");
    Party::new(party_name, test_public_key(name))
}
