//! # Tessera Ledger
//!
//! The transaction data model: state references, outputs and commands, the
//! content-addressed [`WireTransaction`], [`SignedTransaction`], the
//! input-resolved [`LedgerTransaction`], and transaction storage with
//! dependency-chain resolution.
//!
//! Structural invariants (distinct inputs, single notary unless the
//! transaction is a notary change, at least one signature) are enforced when
//! values are constructed or deserialized, before any protocol runs.

#![forbid(unsafe_code)]

pub mod builder;
pub mod error;
pub mod ledger_tx;
pub mod signed;
pub mod state;
pub mod storage;
pub mod transaction;

pub use builder::TransactionBuilder;
pub use error::{LedgerError, MalformedTransaction, Result};
pub use ledger_tx::LedgerTransaction;
pub use signed::SignedTransaction;
pub use state::{Command, StateAndRef, StateRef, TransactionState};
pub use storage::{
    InMemoryTransactionStorage, ResolvedTransaction, TransactionResolver, TransactionStorage,
};
pub use transaction::{TransactionKind, WireTransaction};
