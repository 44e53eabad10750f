//! BUIDL BUXX Ledger Core
//!
//! Allowlist-gated token ledger with owner-controlled issuance.
//!
//! # Entry points
//!
//! - **mint**: owner only, increases supply
//! - **claim**: owner or allowlisted caller, increases supply
//! - **transfer**: open to anyone, gated on the sender's balance
//!
//! # Invariants
//!
//! - Supply conservation: total_supply == Σ(balances) for all time
//! - Non-negativity: no balance is ever driven below zero
//! - Atomicity: a rejected operation leaves the ledger untouched

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod token;
pub mod crypto;
pub mod error;
pub mod config;

// Re-exports
pub use error::{Error, Result};
pub use types::{AccountId, Amount, NativeAmount, TokenOp, TransferEvent, TransferKind};
pub use token::TokenLedger;
pub use config::TokenConfig;
pub use crypto::{KeyPair, Signature};
