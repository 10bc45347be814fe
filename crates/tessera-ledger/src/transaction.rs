//! Wire transactions
//!
//! A [`WireTransaction`] is immutable once built. Its id is a hash of its
//! canonical encoding, and every structural invariant is checked in
//! [`WireTransaction::new`], which deserialization also goes through.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tessera_core::hash::hasher;
use tessera_core::{Party, SecureHash, TimeWindow};

use crate::error::{MalformedTransaction, Result};
use crate::{Command, StateRef, TransactionState};

const WIRE_TX_DOMAIN: &[u8] = b"TESSERA_WIRE_TX";

/// What a transaction is allowed to do with its inputs' notary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Ordinary transaction; inputs and outputs stay with one notary
    #[default]
    General,
    /// Moves its inputs, unchanged, to a new notary
    NotaryChange,
}

/// An immutable, content-addressed transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireTransactionSerde", into = "WireTransactionSerde")]
pub struct WireTransaction {
    inputs: Vec<StateRef>,
    outputs: Vec<TransactionState>,
    commands: Vec<Command>,
    notary: Option<Party>,
    time_window: Option<TimeWindow>,
    kind: TransactionKind,
    id: SecureHash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireTransactionSerde {
    inputs: Vec<StateRef>,
    outputs: Vec<TransactionState>,
    commands: Vec<Command>,
    notary: Option<Party>,
    time_window: Option<TimeWindow>,
    kind: TransactionKind,
}

impl TryFrom<WireTransactionSerde> for WireTransaction {
    type Error = crate::LedgerError;

    fn try_from(value: WireTransactionSerde) -> std::result::Result<Self, Self::Error> {
        Self::new(
            value.inputs,
            value.outputs,
            value.commands,
            value.notary,
            value.time_window,
            value.kind,
        )
    }
}

impl From<WireTransaction> for WireTransactionSerde {
    fn from(tx: WireTransaction) -> Self {
        Self {
            inputs: tx.inputs,
            outputs: tx.outputs,
            commands: tx.commands,
            notary: tx.notary,
            time_window: tx.time_window,
            kind: tx.kind,
        }
    }
}

impl WireTransaction {
    /// Build a transaction, rejecting structural defects
    ///
    /// Inputs must be pairwise distinct. A general transaction with inputs may
    /// only produce outputs under its own notary; with no inputs the outputs
    /// may name any notaries.
    pub fn new(
        inputs: Vec<StateRef>,
        outputs: Vec<TransactionState>,
        commands: Vec<Command>,
        notary: Option<Party>,
        time_window: Option<TimeWindow>,
        kind: TransactionKind,
    ) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for input in &inputs {
            if !seen.insert(*input) {
                return Err(MalformedTransaction::DuplicateInput { state_ref: *input }.into());
            }
        }

        match kind {
            TransactionKind::General => {
                if let (false, Some(tx_notary)) = (inputs.is_empty(), notary.as_ref()) {
                    if let Some(moved) = outputs.iter().find(|o| o.notary != *tx_notary) {
                        return Err(MalformedTransaction::NotaryChangeInWrongTransactionType {
                            expected: tx_notary.name.clone(),
                            found: moved.notary.name.clone(),
                        }
                        .into());
                    }
                }
            }
            TransactionKind::NotaryChange => {
                if inputs.is_empty() {
                    return Err(MalformedTransaction::invalid_notary_change("no inputs").into());
                }
                if notary.is_none() {
                    return Err(MalformedTransaction::MissingNotary.into());
                }
                if outputs.len() != inputs.len() {
                    return Err(MalformedTransaction::invalid_notary_change(format!(
                        "{} inputs but {} outputs",
                        inputs.len(),
                        outputs.len()
                    ))
                    .into());
                }
                if let Some(first) = outputs.first() {
                    if outputs.iter().any(|o| o.notary != first.notary) {
                        return Err(MalformedTransaction::invalid_notary_change(
                            "outputs name more than one new notary",
                        )
                        .into());
                    }
                }
            }
        }

        let id = compute_id(&inputs, &outputs, &commands, &notary, &time_window, kind)?;
        Ok(Self {
            inputs,
            outputs,
            commands,
            notary,
            time_window,
            kind,
            id,
        })
    }

    /// Content hash identifying this transaction
    pub fn id(&self) -> SecureHash {
        self.id
    }

    /// Consumed states, in order
    pub fn inputs(&self) -> &[StateRef] {
        &self.inputs
    }

    /// Produced states, in order
    pub fn outputs(&self) -> &[TransactionState] {
        &self.outputs
    }

    /// Output at `index`
    pub fn output(&self, index: u32) -> Option<&TransactionState> {
        self.outputs.get(usize::try_from(index).ok()?)
    }

    /// Reference to the output at `index`
    pub fn output_ref(&self, index: u32) -> StateRef {
        StateRef::new(self.id, index)
    }

    /// Commands, in order
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Notary this transaction is submitted to
    pub fn notary(&self) -> Option<&Party> {
        self.notary.as_ref()
    }

    /// Validity window
    pub fn time_window(&self) -> Option<&TimeWindow> {
        self.time_window.as_ref()
    }

    /// Transaction kind
    pub fn kind(&self) -> TransactionKind {
        self.kind
    }
}

fn compute_id(
    inputs: &[StateRef],
    outputs: &[TransactionState],
    commands: &[Command],
    notary: &Option<Party>,
    time_window: &Option<TimeWindow>,
    kind: TransactionKind,
) -> Result<SecureHash> {
    let encoded = bincode::serialize(&(inputs, outputs, commands, notary, time_window, kind))?;
    let mut h = hasher();
    h.update(WIRE_TX_DOMAIN);
    h.update(&encoded);
    Ok(SecureHash(h.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LedgerError;
    use assert_matches::assert_matches;
    use tessera_core::{PartyName, PublicKey};

    fn party(name: &str, seed: u8) -> Party {
        Party::new(PartyName::new(name).unwrap(), PublicKey([seed; 32]))
    }

    fn state(notary: &Party) -> TransactionState {
        TransactionState::new("cash", vec![1, 2, 3], notary.clone())
    }

    fn input(seed: u8) -> StateRef {
        StateRef::new(SecureHash::of(&[seed]), 0)
    }

    #[test]
    fn test_duplicate_inputs_rejected_at_construction() {
        let notary = party("Notary", 9);
        let result = WireTransaction::new(
            vec![input(1), input(2), input(1)],
            vec![state(&notary)],
            vec![],
            Some(notary),
            None,
            TransactionKind::General,
        );
        assert_matches!(
            result,
            Err(LedgerError::Malformed(MalformedTransaction::DuplicateInput { state_ref })) if state_ref == input(1)
        );
    }

    #[test]
    fn test_issuance_may_name_any_notaries() {
        let n1 = party("Notary1", 8);
        let n2 = party("Notary2", 9);
        let tx = WireTransaction::new(
            vec![],
            vec![state(&n1), state(&n2)],
            vec![],
            None,
            None,
            TransactionKind::General,
        );
        assert!(tx.is_ok());
    }

    #[test]
    fn test_general_transaction_cannot_change_notary() {
        let n1 = party("Notary1", 8);
        let n2 = party("Notary2", 9);
        let result = WireTransaction::new(
            vec![input(1)],
            vec![state(&n2)],
            vec![],
            Some(n1.clone()),
            None,
            TransactionKind::General,
        );
        assert_matches!(
            result,
            Err(LedgerError::Malformed(MalformedTransaction::NotaryChangeInWrongTransactionType { .. }))
        );

        let change = WireTransaction::new(
            vec![input(1)],
            vec![state(&n2)],
            vec![],
            Some(n1),
            None,
            TransactionKind::NotaryChange,
        );
        assert!(change.is_ok());
    }

    #[test]
    fn test_id_is_content_derived() {
        let notary = party("Notary", 9);
        let build = |data: u8| {
            WireTransaction::new(
                vec![input(1)],
                vec![TransactionState::new("cash", vec![data], notary.clone())],
                vec![],
                Some(notary.clone()),
                None,
                TransactionKind::General,
            )
            .unwrap()
        };
        assert_eq!(build(1).id(), build(1).id());
        assert_ne!(build(1).id(), build(2).id());
    }

    #[test]
    fn test_deserialization_rechecks_invariants() {
        let notary = party("Notary", 9);
        let bad = WireTransactionSerde {
            inputs: vec![input(1), input(1)],
            outputs: vec![],
            commands: vec![],
            notary: Some(notary.clone()),
            time_window: None,
            kind: TransactionKind::General,
        };
        let bytes = bincode::serialize(&bad).unwrap();
        assert!(bincode::deserialize::<WireTransaction>(&bytes).is_err());

        let good = WireTransaction::new(
            vec![input(1)],
            vec![state(&notary)],
            vec![],
            Some(notary),
            None,
            TransactionKind::General,
        )
        .unwrap();
        let decoded: WireTransaction =
            bincode::deserialize(&bincode::serialize(&good).unwrap()).unwrap();
        assert_eq!(decoded.id(), good.id());
    }
}
