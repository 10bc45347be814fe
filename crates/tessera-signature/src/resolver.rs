//! Required-signer resolution
//!
//! The required set of a transaction is every command's signing policies plus
//! the notary's key when the transaction consumes inputs or carries a time
//! window. A signed transaction is authorized when each required policy is
//! satisfied by the keys whose signatures verify over the transaction id.

use std::collections::BTreeSet;
use tessera_core::crypto::missing;
use tessera_core::{CompositeKey, Ed25519Verifier, PublicKey, SignatureVerifier};
use tessera_ledger::{MalformedTransaction, SignedTransaction, WireTransaction};
use tracing::{debug, warn};

use crate::error::{Result, SignatureError};

/// Treatment of signatures that fail verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerificationPolicy {
    /// Any invalid signature fails the check
    #[default]
    Strict,
    /// Invalid signatures are ignored and contribute no signer
    Lenient,
}

/// Computes and checks the signing requirements of transactions
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureRequirementResolver<V = Ed25519Verifier> {
    verifier: V,
    policy: VerificationPolicy,
}

impl<V: SignatureVerifier> SignatureRequirementResolver<V> {
    /// Strict resolver over `verifier`
    pub fn new(verifier: V) -> Self {
        Self {
            verifier,
            policy: VerificationPolicy::Strict,
        }
    }

    /// Same resolver with a different verification policy
    #[must_use]
    pub fn with_policy(mut self, policy: VerificationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Every policy that must be satisfied for `tx`
    pub fn required_signers(&self, tx: &WireTransaction) -> Result<BTreeSet<CompositeKey>> {
        let mut required: BTreeSet<CompositeKey> = tx
            .commands()
            .iter()
            .flat_map(|c| c.signers.iter().cloned())
            .collect();

        if !tx.inputs().is_empty() || tx.time_window().is_some() {
            let notary = tx.notary().ok_or(MalformedTransaction::MissingNotary)?;
            required.insert(CompositeKey::Leaf(notary.owning_key));
        }
        Ok(required)
    }

    /// Keys whose attached signature verifies over the transaction id
    pub fn verified_signers(&self, stx: &SignedTransaction) -> Result<BTreeSet<PublicKey>> {
        let tx_id = stx.id();
        let mut verified = BTreeSet::new();
        for sig in stx.sigs() {
            if self.verifier.verify(tx_id.as_bytes(), sig) {
                verified.insert(sig.by);
                continue;
            }
            match self.policy {
                VerificationPolicy::Strict => {
                    warn!(tx_id = %tx_id, key = %sig.by, "Rejecting invalid signature");
                    return Err(SignatureError::InvalidSignature { tx_id, key: sig.by });
                }
                VerificationPolicy::Lenient => {
                    debug!(tx_id = %tx_id, key = %sig.by, "Ignoring invalid signature");
                }
            }
        }
        Ok(verified)
    }

    /// Check every required policy is satisfied
    pub fn verify_required_signatures(&self, stx: &SignedTransaction) -> Result<()> {
        self.verify_signatures_except(stx, &BTreeSet::new())
    }

    /// Check every required policy except those that are themselves in `excluded`
    ///
    /// Exclusion is by whole structure: a required policy that merely shares
    /// keys with an excluded one is still evaluated in full.
    pub fn verify_signatures_except(
        &self,
        stx: &SignedTransaction,
        excluded: &BTreeSet<CompositeKey>,
    ) -> Result<()> {
        let required = self.required_signers(stx.tx())?;
        let signed = self.verified_signers(stx)?;
        let remaining = required.iter().filter(|r| !excluded.contains(*r));
        let missing = missing(remaining, &signed);

        if missing.is_empty() {
            debug!(tx_id = %stx.id(), signers = signed.len(), "Signatures verified");
            return Ok(());
        }
        debug!(tx_id = %stx.id(), missing = missing.len(), "Signatures missing");
        Err(SignatureError::SignaturesMissing {
            tx_id: stx.id(),
            missing,
        })
    }
}

/// Ed25519 signature checks directly on a signed transaction
pub trait SignedTransactionExt {
    /// See [`SignatureRequirementResolver::verify_required_signatures`]
    fn verify_required_signatures(&self) -> Result<()>;

    /// See [`SignatureRequirementResolver::verify_signatures_except`]
    fn verify_signatures_except(&self, excluded: &BTreeSet<CompositeKey>) -> Result<()>;
}

impl SignedTransactionExt for SignedTransaction {
    fn verify_required_signatures(&self) -> Result<()> {
        SignatureRequirementResolver::new(Ed25519Verifier).verify_required_signatures(self)
    }

    fn verify_signatures_except(&self, excluded: &BTreeSet<CompositeKey>) -> Result<()> {
        SignatureRequirementResolver::new(Ed25519Verifier).verify_signatures_except(self, excluded)
    }
}
