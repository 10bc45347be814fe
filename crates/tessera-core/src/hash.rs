//! Content hashing
//!
//! Hashing is pure and synchronous, so it lives outside the effect traits. This
//! module is the single place that names the digest algorithm; everything else
//! goes through [`hash`] and [`hasher`].
//!
//! Current algorithm: **SHA-256** (32-byte output)

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::TesseraError;

/// A 32-byte content hash, used for transaction ids and commitments
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SecureHash(pub [u8; 32]);

impl SecureHash {
    /// The all-zero hash
    pub const ZERO: SecureHash = SecureHash([0u8; 32]);

    /// Hash arbitrary bytes
    pub fn of(data: &[u8]) -> Self {
        Self(hash(data))
    }

    /// Borrow the raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex encoding
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for SecureHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for SecureHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureHash({})", &self.to_hex()[..16])
    }
}

impl FromStr for SecureHash {
    type Err = TesseraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| TesseraError::invalid(format!("bad hash hex: {e}")))?;
        let digest: [u8; 32] = bytes
            .try_into()
            .map_err(|_| TesseraError::invalid("hash must be 32 bytes"))?;
        Ok(Self(digest))
    }
}

/// Hash bytes to a 32-byte digest
pub fn hash(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Incremental hasher for multi-part input
pub struct Hasher(Sha256);

impl Hasher {
    /// Feed more data
    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    /// Finish and return the digest
    pub fn finalize(self) -> [u8; 32] {
        self.0.finalize().into()
    }
}

/// Create an incremental hasher
pub fn hasher() -> Hasher {
    Hasher(Sha256::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        assert_eq!(SecureHash::of(b"tessera"), SecureHash::of(b"tessera"));
        assert_ne!(SecureHash::of(b"tessera"), SecureHash::of(b"tesserae"));
    }

    #[test]
    fn test_incremental_matches_oneshot() {
        let mut h = hasher();
        h.update(b"hello ");
        h.update(b"world");
        assert_eq!(h.finalize(), hash(b"hello world"));
    }

    #[test]
    fn test_hex_roundtrip() {
        let h = SecureHash::of(b"roundtrip");
        let parsed: SecureHash = h.to_hex().parse().unwrap();
        assert_eq!(parsed, h);
        assert!("abcd".parse::<SecureHash>().is_err());
    }
}
