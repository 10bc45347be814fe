//! # Tessera Signature
//!
//! Decides whether a signed transaction carries enough valid authorization.
//! Requirements are composite keys; missing requirements are reported as the
//! outermost unsatisfied structures, never as leaf-by-leaf differences.

#![forbid(unsafe_code)]

pub mod error;
pub mod resolver;

pub use error::{Result, SignatureError};
pub use resolver::{SignatureRequirementResolver, SignedTransactionExt, VerificationPolicy};
