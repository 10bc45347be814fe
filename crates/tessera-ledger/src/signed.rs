//! Signed transactions

use serde::{Deserialize, Serialize};
use tessera_core::{DigitalSignature, PublicKey, SecureHash};

use crate::error::{MalformedTransaction, Result};
use crate::WireTransaction;

/// A wire transaction plus the signatures collected over its id
///
/// Adding a signature yields a new value; the wrapped transaction never
/// changes. Validity of the signatures is checked by the signature resolver,
/// not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SignedTransactionSerde")]
pub struct SignedTransaction {
    tx: WireTransaction,
    sigs: Vec<DigitalSignature>,
}

#[derive(Debug, Clone, Deserialize)]
struct SignedTransactionSerde {
    tx: WireTransaction,
    sigs: Vec<DigitalSignature>,
}

impl TryFrom<SignedTransactionSerde> for SignedTransaction {
    type Error = crate::LedgerError;

    fn try_from(value: SignedTransactionSerde) -> std::result::Result<Self, Self::Error> {
        Self::new(value.tx, value.sigs)
    }
}

impl SignedTransaction {
    /// Wrap a transaction with at least one signature
    pub fn new(tx: WireTransaction, sigs: Vec<DigitalSignature>) -> Result<Self> {
        if sigs.is_empty() {
            return Err(MalformedTransaction::NoSignatures.into());
        }
        Ok(Self { tx, sigs })
    }

    /// Id of the wrapped transaction
    pub fn id(&self) -> SecureHash {
        self.tx.id()
    }

    /// The wrapped transaction
    pub fn tx(&self) -> &WireTransaction {
        &self.tx
    }

    /// Attached signatures, in the order they were added
    pub fn sigs(&self) -> &[DigitalSignature] {
        &self.sigs
    }

    /// Keys that claim to have signed
    pub fn signing_keys(&self) -> impl Iterator<Item = &PublicKey> {
        self.sigs.iter().map(|s| &s.by)
    }

    /// A copy with `sig` appended
    #[must_use]
    pub fn with_signature(&self, sig: DigitalSignature) -> Self {
        let mut sigs = self.sigs.clone();
        sigs.push(sig);
        Self {
            tx: self.tx.clone(),
            sigs,
        }
    }

    /// A copy with every signature in `extra` appended
    #[must_use]
    pub fn with_signatures(&self, extra: impl IntoIterator<Item = DigitalSignature>) -> Self {
        let mut sigs = self.sigs.clone();
        sigs.extend(extra);
        Self {
            tx: self.tx.clone(),
            sigs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LedgerError, TransactionKind};
    use assert_matches::assert_matches;

    fn empty_tx() -> WireTransaction {
        WireTransaction::new(vec![], vec![], vec![], None, None, TransactionKind::General).unwrap()
    }

    fn sig(seed: u8) -> DigitalSignature {
        DigitalSignature::new(PublicKey([seed; 32]), vec![seed; 64])
    }

    #[test]
    fn test_requires_a_signature() {
        assert_matches!(
            SignedTransaction::new(empty_tx(), vec![]),
            Err(LedgerError::Malformed(MalformedTransaction::NoSignatures))
        );
    }

    #[test]
    fn test_with_signature_leaves_original_untouched() {
        let stx = SignedTransaction::new(empty_tx(), vec![sig(1)]).unwrap();
        let extended = stx.with_signature(sig(2));
        assert_eq!(stx.sigs().len(), 1);
        assert_eq!(extended.sigs().len(), 2);
        assert_eq!(stx.id(), extended.id());
        assert_eq!(extended.signing_keys().count(), 2);
    }
}
