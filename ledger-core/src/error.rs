//! Error types for the ledger

use crate::types::Amount;
use thiserror::Error;

/// Revert reason for owner-only entry points
pub const NOT_OWNER: &str = "Ownable: caller is not the owner";

/// Revert reason for `claim` by an account that is neither owner nor allowlisted
pub const NOT_ALLOWLISTED_OR_OWNER: &str = "Not allowlisted or owner";

/// Revert reason for handing ownership to the zero address
pub const ZERO_OWNER: &str = "Ownable: new owner is the zero address";

/// Revert reason for a transfer to the zero address
pub const ZERO_RECIPIENT_TRANSFER: &str = "ERC20: transfer to the zero address";

/// Revert reason for minting or claiming to the zero address
pub const ZERO_RECIPIENT_MINT: &str = "ERC20: mint to the zero address";

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Caller lacks the role required by the entry point
    #[error("{0}")]
    Unauthorized(String),

    /// Debit would drive a balance negative
    #[error("ERC20: transfer amount exceeds balance (have {have}, need {need})")]
    InsufficientBalance {
        /// Current balance
        have: Amount,
        /// Requested debit
        need: Amount,
    },

    /// Credit would overflow
    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    /// Malformed argument (bad address, zero owner, ...)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invariant violation (supply conservation, etc.)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Signature verification failed
    #[error("Signature verification failed: {0}")]
    SignatureError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Owner-only rejection
    pub fn not_owner() -> Self {
        Error::Unauthorized(NOT_OWNER.to_string())
    }
}
