//! Ed25519 signing handler
//!
//! Keeps generated signing keys in memory, indexed by public key. Key
//! generation draws from a ChaCha20 stream seeded either from the operating
//! system or, for reproducible runs, from a caller-supplied seed.

use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};
use parking_lot::{Mutex, RwLock};
use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;
use std::collections::HashMap;
use std::fmt;
use tessera_core::effects::CryptoEffects;
use tessera_core::{
    DigitalSignature, Ed25519Verifier, PublicKey, Result, SignatureVerifier, TesseraError,
};
use tracing::debug;

/// In-memory Ed25519 key store implementing [`CryptoEffects`]
pub struct Ed25519CryptoHandler {
    keys: RwLock<HashMap<PublicKey, SigningKey>>,
    rng: Mutex<ChaCha20Rng>,
}

impl fmt::Debug for Ed25519CryptoHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519CryptoHandler")
            .field("keys", &self.keys.read().len())
            .finish_non_exhaustive()
    }
}

impl Default for Ed25519CryptoHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl Ed25519CryptoHandler {
    /// Handler whose key generation is seeded by the operating system
    pub fn new() -> Self {
        Self::with_rng(ChaCha20Rng::from_seed(rand::random()))
    }

    /// Handler that generates the same keys for the same seed
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(ChaCha20Rng::seed_from_u64(seed))
    }

    fn with_rng(rng: ChaCha20Rng) -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            rng: Mutex::new(rng),
        }
    }

    /// Take ownership of an existing signing key
    pub fn import_key(&self, key: SigningKey) -> PublicKey {
        let public = PublicKey::from(key.verifying_key());
        self.keys.write().insert(public, key);
        public
    }

    /// Number of keys held
    pub fn key_count(&self) -> usize {
        self.keys.read().len()
    }
}

#[async_trait]
impl CryptoEffects for Ed25519CryptoHandler {
    async fn sign(&self, message: &[u8], key: &PublicKey) -> Result<DigitalSignature> {
        let keys = self.keys.read();
        let signing_key = keys
            .get(key)
            .ok_or_else(|| TesseraError::crypto(format!("no private key for {key}")))?;
        let signature = signing_key.sign(message);
        Ok(DigitalSignature::new(*key, signature.to_bytes().to_vec()))
    }

    async fn verify(&self, message: &[u8], signature: &DigitalSignature) -> Result<bool> {
        Ok(Ed25519Verifier.verify(message, signature))
    }

    async fn fresh_key(&self) -> Result<PublicKey> {
        let signing_key = SigningKey::generate(&mut *self.rng.lock());
        let public = self.import_key(signing_key);
        debug!(key = %public, "Generated signing key");
        Ok(public)
    }

    fn owns_key(&self, key: &PublicKey) -> bool {
        self.keys.read().contains_key(key)
    }
}
