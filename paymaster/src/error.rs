//! Error types for the policy engine

use crate::types::RejectReason;
use thiserror::Error;

/// Policy engine error
#[derive(Debug, Error)]
pub enum Error {
    /// Sponsorship refused during validation
    #[error("Paymaster validation error: {0}")]
    Rejected(#[from] RejectReason),

    /// Caller is not the owner
    #[error("{0}")]
    Unauthorized(String),

    /// Reservation could not be closed out
    #[error("Settlement error: {0}")]
    Settlement(String),

    /// Funds accounting would overflow
    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
