//! # Tessera Identity
//!
//! Confidential identities: fresh keys certified by a party's well-known
//! key, so transactions can name anonymous parties that only the
//! counterparties can link back.
//!
//! ## Effect Classification
//!
//! - **Category**: Protocol
//! - **Effects**: key generation and signing (`CryptoEffects`)
//! - **Layering**: above `tessera-flow`

#![forbid(unsafe_code)]

pub mod error;
pub mod flows;
pub mod service;

pub use error::{IdentityError, IdentityExchangeError};
pub use flows::{
    install, IdentityExchangeFlow, IdentityExchangeResponder, AWAITING_KEY, FRESH_IDENTITY_EFFECT,
    IDENTITY_EXCHANGE_PROTOCOL,
};
pub use service::{IdentityService, InMemoryIdentityService};
