//! States, state references and commands

use serde::{Deserialize, Serialize};
use std::fmt;
use tessera_core::{CompositeKey, Party, SecureHash};

/// Reference to one output of a prior transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateRef {
    /// Id of the transaction that produced the output
    pub tx_id: SecureHash,
    /// Position of the output in that transaction
    pub index: u32,
}

impl StateRef {
    /// Create a reference
    pub fn new(tx_id: SecureHash, index: u32) -> Self {
        Self { tx_id, index }
    }
}

impl fmt::Display for StateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.tx_id, self.index)
    }
}

/// An output state
///
/// Contract semantics are opaque here; `contract` names the rules that apply
/// and `data` carries the encoded state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionState {
    /// Contract identifier
    pub contract: String,
    /// Encoded state body
    pub data: Vec<u8>,
    /// Notary that must approve consumption of this state
    pub notary: Party,
}

impl TransactionState {
    /// Create a state
    pub fn new(contract: impl Into<String>, data: Vec<u8>, notary: Party) -> Self {
        Self {
            contract: contract.into(),
            data,
            notary,
        }
    }

    /// Same state body under another notary
    pub fn with_notary(&self, notary: Party) -> Self {
        Self {
            contract: self.contract.clone(),
            data: self.data.clone(),
            notary,
        }
    }
}

/// A resolved input: the state together with where it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateAndRef {
    /// The referenced state
    pub state: TransactionState,
    /// Where the state was produced
    pub reference: StateRef,
}

/// An instruction in a transaction together with who must sign for it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Command {
    /// Command name, for logs and contract dispatch
    pub name: String,
    /// Encoded command body
    pub payload: Vec<u8>,
    /// Signing policies that must all be satisfied
    pub signers: Vec<CompositeKey>,
}

impl Command {
    /// Create a command
    pub fn new(name: impl Into<String>, payload: Vec<u8>, signers: Vec<CompositeKey>) -> Self {
        Self {
            name: name.into(),
            payload,
            signers,
        }
    }
}
