//! Incremental transaction assembly

use tessera_core::effects::CryptoEffects;
use tessera_core::{Party, PublicKey, TimeWindow};

use crate::error::{MalformedTransaction, Result};
use crate::{Command, SignedTransaction, StateRef, TransactionKind, TransactionState, WireTransaction};

/// Mutable staging area for a transaction
///
/// Nothing is validated until [`TransactionBuilder::to_wire_transaction`].
#[derive(Debug, Clone, Default)]
pub struct TransactionBuilder {
    kind: TransactionKind,
    notary: Option<Party>,
    inputs: Vec<StateRef>,
    outputs: Vec<TransactionState>,
    commands: Vec<Command>,
    time_window: Option<TimeWindow>,
}

impl TransactionBuilder {
    /// A general transaction under `notary`
    pub fn new(notary: Option<Party>) -> Self {
        Self {
            notary,
            ..Self::default()
        }
    }

    /// A notary change transaction currently held by `notary`
    pub fn notary_change(notary: Party) -> Self {
        Self {
            kind: TransactionKind::NotaryChange,
            notary: Some(notary),
            ..Self::default()
        }
    }

    /// Consume a state
    pub fn add_input_state(&mut self, input: StateRef) -> &mut Self {
        self.inputs.push(input);
        self
    }

    /// Produce a state
    pub fn add_output_state(&mut self, output: TransactionState) -> &mut Self {
        self.outputs.push(output);
        self
    }

    /// Add a command
    pub fn add_command(&mut self, command: Command) -> &mut Self {
        self.commands.push(command);
        self
    }

    /// Set the validity window
    pub fn set_time_window(&mut self, window: TimeWindow) -> &mut Self {
        self.time_window = Some(window);
        self
    }

    /// Set the notary
    pub fn set_notary(&mut self, notary: Party) -> &mut Self {
        self.notary = Some(notary);
        self
    }

    /// Validate and freeze
    pub fn to_wire_transaction(&self) -> Result<WireTransaction> {
        WireTransaction::new(
            self.inputs.clone(),
            self.outputs.clone(),
            self.commands.clone(),
            self.notary.clone(),
            self.time_window,
            self.kind,
        )
    }

    /// Validate, freeze and sign with each of `keys`
    pub async fn sign_with(
        &self,
        crypto: &dyn CryptoEffects,
        keys: &[PublicKey],
    ) -> Result<SignedTransaction> {
        if keys.is_empty() {
            return Err(MalformedTransaction::NoSignatures.into());
        }
        let tx = self.to_wire_transaction()?;
        let mut sigs = Vec::with_capacity(keys.len());
        for key in keys {
            sigs.push(crypto.sign(tx.id().as_bytes(), key).await?);
        }
        SignedTransaction::new(tx, sigs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LedgerError;
    use assert_matches::assert_matches;
    use tessera_core::{PartyName, SecureHash};

    #[test]
    fn test_builder_validates_on_freeze() {
        let notary = Party::new(PartyName::new("Notary").unwrap(), PublicKey([9; 32]));
        let input = StateRef::new(SecureHash::of(b"prev"), 0);

        let mut builder = TransactionBuilder::new(Some(notary.clone()));
        builder
            .add_input_state(input)
            .add_output_state(TransactionState::new("cash", vec![], notary));
        assert!(builder.to_wire_transaction().is_ok());

        builder.add_input_state(input);
        assert_matches!(
            builder.to_wire_transaction(),
            Err(LedgerError::Malformed(MalformedTransaction::DuplicateInput { .. }))
        );
    }
}
