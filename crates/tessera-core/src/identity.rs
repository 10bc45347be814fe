//! Parties, anonymous identities and certificate paths

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::{DigitalSignature, PublicKey, SignatureVerifier};
use crate::{Result, TesseraError};

/// Well-known legal name of a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartyName(String);

impl PartyName {
    /// Create a name; it must be non-empty and free of surrounding whitespace
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.trim() != name {
            return Err(TesseraError::invalid(format!("invalid party name {name:?}")));
        }
        Ok(Self(name))
    }

    /// Borrow the name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PartyName {
    type Error = TesseraError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PartyName> for String {
    fn from(name: PartyName) -> Self {
        name.0
    }
}

impl fmt::Display for PartyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A well-known party: legal name plus owning key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Party {
    /// Legal name
    pub name: PartyName,
    /// Well-known identity key
    pub owning_key: PublicKey,
}

impl Party {
    /// Create a party
    pub fn new(name: PartyName, owning_key: PublicKey) -> Self {
        Self { name, owning_key }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A party known only by key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnonymousParty {
    /// Key the party signs with
    pub owning_key: PublicKey,
}

/// Binding of a subject name and key, signed by an issuer key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    /// Name the subject key is bound to
    pub subject: PartyName,
    /// Certified key
    pub subject_key: PublicKey,
    /// Key that vouches for the binding
    pub issuer_key: PublicKey,
    /// Issuer's signature over [`Certificate::signing_payload`]
    pub signature: DigitalSignature,
}

impl Certificate {
    /// Canonical bytes an issuer signs for a binding
    pub fn signing_payload(
        subject: &PartyName,
        subject_key: &PublicKey,
        issuer_key: &PublicKey,
    ) -> Result<Vec<u8>> {
        let mut payload = b"TESSERA_CERT".to_vec();
        payload.extend(bincode::serialize(&(subject, subject_key, issuer_key))?);
        Ok(payload)
    }

    fn verify(&self, verifier: &dyn SignatureVerifier) -> Result<()> {
        if self.signature.by != self.issuer_key {
            return Err(TesseraError::crypto(format!(
                "certificate for {} signed by {} instead of issuer {}",
                self.subject, self.signature.by, self.issuer_key
            )));
        }
        let payload = Self::signing_payload(&self.subject, &self.subject_key, &self.issuer_key)?;
        if !verifier.verify(&payload, &self.signature) {
            return Err(TesseraError::crypto(format!(
                "certificate signature for {} does not verify",
                self.subject
            )));
        }
        Ok(())
    }
}

/// Chain of certificates from a trusted root key to a subject key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertPath {
    /// Certificates ordered from the root outward
    pub certificates: Vec<Certificate>,
}

impl CertPath {
    /// Verify that the chain links `root` to `(subject, subject_key)`
    pub fn verify(
        &self,
        verifier: &dyn SignatureVerifier,
        root: &PublicKey,
        subject: &PartyName,
        subject_key: &PublicKey,
    ) -> Result<()> {
        let Some(last) = self.certificates.last() else {
            return Err(TesseraError::crypto("empty certificate path"));
        };

        let mut expected_issuer = *root;
        for cert in &self.certificates {
            if cert.issuer_key != expected_issuer {
                return Err(TesseraError::crypto(format!(
                    "certificate path broken at {}: issuer {} expected {}",
                    cert.subject, cert.issuer_key, expected_issuer
                )));
            }
            if cert.subject != *subject {
                return Err(TesseraError::crypto(format!(
                    "certificate names {} but path is for {}",
                    cert.subject, subject
                )));
            }
            cert.verify(verifier)?;
            expected_issuer = cert.subject_key;
        }

        if last.subject_key != *subject_key {
            return Err(TesseraError::crypto("certificate path ends at a different key"));
        }
        Ok(())
    }
}

/// A freshly generated key bound to a well-known name by a certificate path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedAnonymousIdentity {
    /// Well-known name the key belongs to
    pub name: PartyName,
    /// Freshly generated key
    pub key: PublicKey,
    /// Proof of the binding, rooted at the owner's well-known key
    pub cert_path: CertPath,
}

impl VerifiedAnonymousIdentity {
    /// The anonymous party this identity signs as
    pub fn party(&self) -> AnonymousParty {
        AnonymousParty {
            owning_key: self.key,
        }
    }

    /// Verify the certificate path against the claimed owner
    pub fn verify_against(&self, verifier: &dyn SignatureVerifier, owner: &Party) -> Result<()> {
        if self.name != owner.name {
            return Err(TesseraError::invalid(format!(
                "identity claims {} but owner is {}",
                self.name, owner.name
            )));
        }
        self.cert_path
            .verify(verifier, &owner.owning_key, &self.name, &self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Ed25519Verifier;
    use ed25519_dalek::{Signer, SigningKey};

    fn issue(issuer: &SigningKey, subject: &PartyName, subject_key: PublicKey) -> Certificate {
        let issuer_key = PublicKey::from(issuer.verifying_key());
        let payload = Certificate::signing_payload(subject, &subject_key, &issuer_key).unwrap();
        Certificate {
            subject: subject.clone(),
            subject_key,
            issuer_key,
            signature: DigitalSignature::new(issuer_key, issuer.sign(&payload).to_bytes().to_vec()),
        }
    }

    #[test]
    fn test_party_name_validation() {
        assert!(PartyName::new("Alice Corp").is_ok());
        assert!(PartyName::new("").is_err());
        assert!(PartyName::new(" padded").is_err());
    }

    #[test]
    fn test_cert_path_verifies_and_rejects_wrong_root() {
        let well_known = SigningKey::from_bytes(&[1; 32]);
        let fresh = PublicKey::from(SigningKey::from_bytes(&[2; 32]).verifying_key());
        let name = PartyName::new("Alice").unwrap();
        let owner = Party::new(name.clone(), well_known.verifying_key().into());

        let identity = VerifiedAnonymousIdentity {
            name: name.clone(),
            key: fresh,
            cert_path: CertPath {
                certificates: vec![issue(&well_known, &name, fresh)],
            },
        };
        assert!(identity.verify_against(&Ed25519Verifier, &owner).is_ok());

        let impostor = Party::new(
            name,
            SigningKey::from_bytes(&[3; 32]).verifying_key().into(),
        );
        assert!(identity.verify_against(&Ed25519Verifier, &impostor).is_err());
    }

    #[test]
    fn test_cert_path_rejects_name_mismatch() {
        let well_known = SigningKey::from_bytes(&[1; 32]);
        let fresh = PublicKey::from(SigningKey::from_bytes(&[2; 32]).verifying_key());
        let alice = PartyName::new("Alice").unwrap();
        let bob = PartyName::new("Bob").unwrap();

        let identity = VerifiedAnonymousIdentity {
            name: bob.clone(),
            key: fresh,
            cert_path: CertPath {
                certificates: vec![issue(&well_known, &alice, fresh)],
            },
        };
        let owner = Party::new(bob, well_known.verifying_key().into());
        assert!(identity.verify_against(&Ed25519Verifier, &owner).is_err());
    }
}
