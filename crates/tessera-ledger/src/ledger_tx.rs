//! Transactions with resolved inputs

use std::collections::BTreeMap;
use tessera_core::{Party, SecureHash, TimeWindow};

use crate::error::{LedgerError, MalformedTransaction, Result};
use crate::{Command, StateAndRef, TransactionKind, TransactionState, WireTransaction};

/// A wire transaction whose inputs have been looked up
///
/// Construction checks the rules that need the consumed states: a general
/// transaction must consume states under its own notary, and a notary change
/// must move states without altering them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTransaction {
    id: SecureHash,
    inputs: Vec<StateAndRef>,
    outputs: Vec<TransactionState>,
    commands: Vec<Command>,
    notary: Option<Party>,
    time_window: Option<TimeWindow>,
    kind: TransactionKind,
}

impl LedgerTransaction {
    /// Resolve `tx`'s inputs from the outputs of `dependencies`
    pub fn resolve<'a, I>(tx: &WireTransaction, dependencies: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a WireTransaction>,
    {
        let by_id: BTreeMap<SecureHash, &WireTransaction> =
            dependencies.into_iter().map(|d| (d.id(), d)).collect();

        let inputs = tx
            .inputs()
            .iter()
            .map(|input| {
                by_id
                    .get(&input.tx_id)
                    .and_then(|producer| producer.output(input.index))
                    .map(|state| StateAndRef {
                        state: state.clone(),
                        reference: *input,
                    })
                    .ok_or(LedgerError::UnresolvedInput { state_ref: *input })
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(tx, inputs)
    }

    /// Combine `tx` with already resolved inputs
    pub fn new(tx: &WireTransaction, inputs: Vec<StateAndRef>) -> Result<Self> {
        let mismatch = tx
            .inputs()
            .iter()
            .enumerate()
            .find(|(i, wanted)| inputs.get(*i).map(|r| r.reference) != Some(**wanted))
            .map(|(_, wanted)| *wanted)
            .or_else(|| inputs.get(tx.inputs().len()).map(|extra| extra.reference));
        if let Some(state_ref) = mismatch {
            return Err(LedgerError::UnresolvedInput { state_ref });
        }

        if (!inputs.is_empty() || tx.time_window().is_some()) && tx.notary().is_none() {
            return Err(MalformedTransaction::MissingNotary.into());
        }

        match tx.kind() {
            TransactionKind::General => check_general(tx, &inputs)?,
            TransactionKind::NotaryChange => check_notary_change(tx, &inputs)?,
        }

        Ok(Self {
            id: tx.id(),
            inputs,
            outputs: tx.outputs().to_vec(),
            commands: tx.commands().to_vec(),
            notary: tx.notary().cloned(),
            time_window: tx.time_window().copied(),
            kind: tx.kind(),
        })
    }

    /// Transaction id
    pub fn id(&self) -> SecureHash {
        self.id
    }

    /// Consumed states
    pub fn inputs(&self) -> &[StateAndRef] {
        &self.inputs
    }

    /// Produced states
    pub fn outputs(&self) -> &[TransactionState] {
        &self.outputs
    }

    /// Commands
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Notary
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

fn check_general(tx: &WireTransaction, inputs: &[StateAndRef]) -> Result<()> {
    let Some(notary) = tx.notary() else {
        return Ok(());
    };
    for input in inputs {
        if input.state.notary != *notary {
            return Err(MalformedTransaction::NotaryChangeInWrongTransactionType {
                expected: input.state.notary.name.clone(),
                found: notary.name.clone(),
            }
            .into());
        }
    }
    Ok(())
}

fn check_notary_change(tx: &WireTransaction, inputs: &[StateAndRef]) -> Result<()> {
    let Some(notary) = tx.notary() else {
        return Err(MalformedTransaction::MissingNotary.into());
    };
    for (input, output) in inputs.iter().zip(tx.outputs()) {
        if input.state.notary != *notary {
            return Err(MalformedTransaction::invalid_notary_change(format!(
                "input {} is not held by {}",
                input.reference, notary
            ))
            .into());
        }
        if input.state.with_notary(output.notary.clone()) != *output {
            return Err(MalformedTransaction::invalid_notary_change(format!(
                "output for {} alters the state",
                input.reference
            ))
            .into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StateRef;
    use assert_matches::assert_matches;
    use tessera_core::{PartyName, PublicKey};

    fn party(name: &str, seed: u8) -> Party {
        Party::new(PartyName::new(name).unwrap(), PublicKey([seed; 32]))
    }

    fn issue(notary: &Party, data: u8) -> WireTransaction {
        WireTransaction::new(
            vec![],
            vec![TransactionState::new("cash", vec![data], notary.clone())],
            vec![],
            None,
            None,
            TransactionKind::General,
        )
        .unwrap()
    }

    #[test]
    fn test_resolves_inputs_from_dependencies() {
        let notary = party("Notary", 9);
        let issuance = issue(&notary, 1);
        let spend = WireTransaction::new(
            vec![issuance.output_ref(0)],
            vec![TransactionState::new("cash", vec![2], notary.clone())],
            vec![],
            Some(notary),
            None,
            TransactionKind::General,
        )
        .unwrap();

        let ltx = LedgerTransaction::resolve(&spend, [&issuance]).unwrap();
        assert_eq!(ltx.inputs().len(), 1);
        assert_eq!(ltx.inputs()[0].state.data, vec![1]);

        let missing = LedgerTransaction::resolve(&spend, []);
        assert_matches!(missing, Err(LedgerError::UnresolvedInput { .. }));
    }

    #[test]
    fn test_general_transaction_cannot_consume_other_notarys_state() {
        let n1 = party("Notary1", 8);
        let n2 = party("Notary2", 9);
        let issuance = issue(&n1, 1);
        let spend = WireTransaction::new(
            vec![issuance.output_ref(0)],
            vec![TransactionState::new("cash", vec![1], n2.clone())],
            vec![],
            Some(n2),
            None,
            TransactionKind::General,
        )
        .unwrap();

        assert_matches!(
            LedgerTransaction::resolve(&spend, [&issuance]),
            Err(LedgerError::Malformed(
                MalformedTransaction::NotaryChangeInWrongTransactionType { .. }
            ))
        );
    }

    #[test]
    fn test_notary_change_moves_state_unchanged() {
        let n1 = party("Notary1", 8);
        let n2 = party("Notary2", 9);
        let issuance = issue(&n1, 1);
        let moved = issuance.outputs()[0].with_notary(n2.clone());
        let change = WireTransaction::new(
            vec![issuance.output_ref(0)],
            vec![moved],
            vec![],
            Some(n1.clone()),
            None,
            TransactionKind::NotaryChange,
        )
        .unwrap();
        assert!(LedgerTransaction::resolve(&change, [&issuance]).is_ok());

        let altered = WireTransaction::new(
            vec![issuance.output_ref(0)],
            vec![TransactionState::new("cash", vec![7], n2)],
            vec![],
            Some(n1),
            None,
            TransactionKind::NotaryChange,
        )
        .unwrap();
        assert_matches!(
            LedgerTransaction::resolve(&altered, [&issuance]),
            Err(LedgerError::Malformed(MalformedTransaction::InvalidNotaryChange { .. }))
        );
    }

    #[test]
    fn test_inputs_without_notary_rejected() {
        let notary = party("Notary", 9);
        let issuance = issue(&notary, 1);
        let spend = WireTransaction::new(
            vec![StateRef::new(issuance.id(), 0)],
            vec![],
            vec![],
            None,
            None,
            TransactionKind::General,
        )
        .unwrap();
        assert_matches!(
            LedgerTransaction::resolve(&spend, [&issuance]),
            Err(LedgerError::Malformed(MalformedTransaction::MissingNotary))
        );
    }
}
