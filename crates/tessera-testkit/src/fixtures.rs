//! Transaction fixtures
//!
//! Issued states carry an opaque token contract; nothing here runs contract
//! logic, only the structural and signature rules of the ledger.

use tessera_core::{Party, PublicKey, TimeWindow};
use tessera_ledger::{
    Command, SignedTransaction, StateRef, TransactionBuilder, TransactionState,
};

use crate::network::MockNode;

/// Contract named by fixture states
pub const TOKEN_CONTRACT: &str = "tessera.test.token";

/// Issue one token state owned by `owner` under `notary` and record it on `owner`
pub async fn issue(owner: &MockNode, notary: &Party, data: &[u8]) -> SignedTransaction {
    let key = owner.party().owning_key;
    let mut builder = TransactionBuilder::new(Some(notary.clone()));
    builder
        .add_output_state(TransactionState::new(TOKEN_CONTRACT, data.to_vec(), notary.clone()))
        .add_command(Command::new("Issue", Vec::new(), vec![key.into()]));
    let stx = builder
        .sign_with(&**owner.crypto(), &[key])
        .await
        .expect("issuer holds its own key");
    owner.record(stx.clone());
    stx
}

/// Builder moving `inputs` to a single new token state under `notary`
pub fn move_builder(signer: PublicKey, inputs: &[StateRef], notary: &Party) -> TransactionBuilder {
    let mut builder = TransactionBuilder::new(Some(notary.clone()));
    for input in inputs {
        builder.add_input_state(*input);
    }
    builder
        .add_output_state(TransactionState::new(TOKEN_CONTRACT, b"moved".to_vec(), notary.clone()))
        .add_command(Command::new("Move", Vec::new(), vec![signer.into()]));
    builder
}

/// Spend `inputs` as `owner`, signed by the owner only
pub async fn spend(
    owner: &MockNode,
    inputs: &[StateRef],
    notary: &Party,
    time_window: Option<TimeWindow>,
) -> SignedTransaction {
    let key = owner.party().owning_key;
    let mut builder = move_builder(key, inputs, notary);
    if let Some(window) = time_window {
        builder.set_time_window(window);
    }
    builder
        .sign_with(&**owner.crypto(), &[key])
        .await
        .expect("spender holds its own key")
}
