//! Identity registry
//!
//! **Effect Classification**: Infrastructure. Mints anonymous identities for
//! the node's own parties through `CryptoEffects` and records verified
//! identities received from counterparties. Shared by every flow on a node.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tessera_core::effects::CryptoEffects;
use tessera_core::{
    AnonymousParty, CertPath, Certificate, Ed25519Verifier, Party, PartyName, PublicKey,
    VerifiedAnonymousIdentity,
};
use tracing::{debug, warn};

use crate::error::IdentityError;

/// Well-known and anonymous identities known to a node
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Generate a key and a certificate binding it to `owner`
    ///
    /// `owner` must be an identity whose key this node holds.
    async fn fresh_identity(&self, owner: &Party) -> Result<VerifiedAnonymousIdentity, IdentityError>;

    /// Record a well-known party
    fn register_identity(&self, party: Party);

    /// Verify `identity` is certified by `expected` and record it
    fn register_verified(
        &self,
        identity: &VerifiedAnonymousIdentity,
        expected: &Party,
    ) -> Result<(), IdentityError>;

    /// The well-known party behind an anonymous one, if registered
    fn well_known_party_from_anonymous(&self, party: &AnonymousParty) -> Option<Party>;

    /// Look up a well-known party by name
    fn party_from_name(&self, name: &PartyName) -> Option<Party>;
}

#[async_trait]
impl<T: IdentityService + ?Sized> IdentityService for Arc<T> {
    async fn fresh_identity(&self, owner: &Party) -> Result<VerifiedAnonymousIdentity, IdentityError> {
        (**self).fresh_identity(owner).await
    }

    fn register_identity(&self, party: Party) {
        (**self).register_identity(party);
    }

    fn register_verified(
        &self,
        identity: &VerifiedAnonymousIdentity,
        expected: &Party,
    ) -> Result<(), IdentityError> {
        (**self).register_verified(identity, expected)
    }

    fn well_known_party_from_anonymous(&self, party: &AnonymousParty) -> Option<Party> {
        (**self).well_known_party_from_anonymous(party)
    }

    fn party_from_name(&self, name: &PartyName) -> Option<Party> {
        (**self).party_from_name(name)
    }
}

#[derive(Debug, Default)]
struct Registry {
    well_known: HashMap<PartyName, Party>,
    /// Anonymous key to its owner and proof
    anonymous: HashMap<PublicKey, (Party, VerifiedAnonymousIdentity)>,
}

/// In-memory [`IdentityService`]
pub struct InMemoryIdentityService {
    crypto: Arc<dyn CryptoEffects>,
    registry: RwLock<Registry>,
}

impl std::fmt::Debug for InMemoryIdentityService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.read();
        f.debug_struct("InMemoryIdentityService")
            .field("well_known", &registry.well_known.len())
            .field("anonymous", &registry.anonymous.len())
            .finish()
    }
}

impl InMemoryIdentityService {
    /// Registry minting identities with `crypto`
    pub fn new(crypto: Arc<dyn CryptoEffects>) -> Self {
        Self {
            crypto,
            registry: RwLock::new(Registry::default()),
        }
    }

    /// Number of anonymous identities recorded
    pub fn anonymous_count(&self) -> usize {
        self.registry.read().anonymous.len()
    }
}

#[async_trait]
impl IdentityService for InMemoryIdentityService {
    async fn fresh_identity(&self, owner: &Party) -> Result<VerifiedAnonymousIdentity, IdentityError> {
        if !self.crypto.owns_key(&owner.owning_key) {
            return Err(IdentityError::NotOurIdentity {
                party: owner.name.clone(),
            });
        }
        let key = self.crypto.fresh_key().await?;
        let payload = Certificate::signing_payload(&owner.name, &key, &owner.owning_key)?;
        let signature = self.crypto.sign(&payload, &owner.owning_key).await?;
        let identity = VerifiedAnonymousIdentity {
            name: owner.name.clone(),
            key,
            cert_path: CertPath {
                certificates: vec![Certificate {
                    subject: owner.name.clone(),
                    subject_key: key,
                    issuer_key: owner.owning_key,
                    signature,
                }],
            },
        };

        self.registry
            .write()
            .anonymous
            .insert(key, (owner.clone(), identity.clone()));
        debug!(owner = %owner, key = %key, "Minted anonymous identity");
        Ok(identity)
    }

    fn register_identity(&self, party: Party) {
        self.registry
            .write()
            .well_known
            .insert(party.name.clone(), party);
    }

    fn register_verified(
        &self,
        identity: &VerifiedAnonymousIdentity,
        expected: &Party,
    ) -> Result<(), IdentityError> {
        identity
            .verify_against(&Ed25519Verifier, expected)
            .map_err(|e| {
                warn!(expected = %expected, key = %identity.key, error = %e, "Rejected anonymous identity");
                IdentityError::InvalidCertificate {
                    reason: e.to_string(),
                }
            })?;

        let mut registry = self.registry.write();
        registry
            .well_known
            .entry(expected.name.clone())
            .or_insert_with(|| expected.clone());
        registry
            .anonymous
            .insert(identity.key, (expected.clone(), identity.clone()));
        debug!(owner = %expected, key = %identity.key, "Registered anonymous identity");
        Ok(())
    }

    fn well_known_party_from_anonymous(&self, party: &AnonymousParty) -> Option<Party> {
        self.registry
            .read()
            .anonymous
            .get(&party.owning_key)
            .map(|(owner, _)| owner.clone())
    }

    fn party_from_name(&self, name: &PartyName) -> Option<Party> {
        self.registry.read().well_known.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tessera_effects::Ed25519CryptoHandler;

    async fn node(name: &str, seed: u64) -> (Party, InMemoryIdentityService) {
        let crypto = Arc::new(Ed25519CryptoHandler::seeded(seed));
        let key = crypto.fresh_key().await.unwrap();
        let party = Party::new(PartyName::new(name).unwrap(), key);
        (party, InMemoryIdentityService::new(crypto))
    }

    #[tokio::test]
    async fn test_fresh_identity_is_certified_by_owner() {
        let (alice, alice_ids) = node("Alice", 1).await;
        let (_, bob_ids) = node("Bob", 2).await;

        let identity = alice_ids.fresh_identity(&alice).await.unwrap();
        assert_ne!(identity.key, alice.owning_key);
        assert_eq!(identity.name, alice.name);

        bob_ids.register_verified(&identity, &alice).unwrap();
        assert_eq!(
            bob_ids.well_known_party_from_anonymous(&identity.party()),
            Some(alice.clone())
        );
        assert_eq!(bob_ids.party_from_name(&alice.name), Some(alice));
    }

    #[tokio::test]
    async fn test_register_rejects_wrong_owner() {
        let (alice, alice_ids) = node("Alice", 1).await;
        let (bob, bob_ids) = node("Bob", 2).await;

        let identity = alice_ids.fresh_identity(&alice).await.unwrap();
        let impostor = Party::new(alice.name.clone(), bob.owning_key);
        assert_matches!(
            bob_ids.register_verified(&identity, &impostor),
            Err(IdentityError::InvalidCertificate { .. })
        );
        assert_eq!(bob_ids.anonymous_count(), 0);
    }

    #[tokio::test]
    async fn test_cannot_mint_for_foreign_party() {
        let (_, alice_ids) = node("Alice", 1).await;
        let (bob, _) = node("Bob", 2).await;
        assert_matches!(
            alice_ids.fresh_identity(&bob).await,
            Err(IdentityError::NotOurIdentity { .. })
        );
    }
}
