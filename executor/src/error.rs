//! Error types for the execution environment

use ledger_core::{AccountId, NativeAmount};
use paymaster::RejectReason;
use thiserror::Error;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Runtime errors
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger rejected the operation
    #[error(transparent)]
    Ledger(#[from] ledger_core::Error),

    /// Policy engine rejected the operation
    #[error(transparent)]
    Paymaster(#[from] paymaster::Error),

    /// Initiator cannot cover a self-paid fee or a native transfer
    #[error("Insufficient native balance for {account}: have {have}, need {need}")]
    InsufficientNativeBalance {
        /// Debited account
        account: AccountId,
        /// Current balance
        have: NativeAmount,
        /// Requested debit
        need: NativeAmount,
    },

    /// Gas limit below the gas the call consumes
    #[error("Out of gas: limit {limit}, required {required}")]
    OutOfGas {
        /// Declared limit
        limit: u64,
        /// Gas the call needs
        required: u64,
    },

    /// No contract deployed at the address
    #[error("Unknown contract: {0}")]
    UnknownContract(AccountId),

    /// Operation does not belong to the target contract
    #[error("Operation {operation} is not supported by contract {target}")]
    UnsupportedOperation {
        /// Called contract
        target: AccountId,
        /// Operation name
        operation: &'static str,
    },

    /// Signed call replayed or out of order
    #[error("Invalid nonce for {account}: expected {expected}, got {got}")]
    InvalidNonce {
        /// Initiator
        account: AccountId,
        /// Next accepted nonce
        expected: u64,
        /// Nonce carried by the call
        got: u64,
    },

    /// Signature does not authorize the declared initiator
    #[error("Signature verification failed: {0}")]
    SignatureError(String),

    /// Native arithmetic would overflow
    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invariant violation (supply or funds conservation)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

/// Caller-facing error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller lacks the required role
    Unauthorized,
    /// Token debit exceeds the balance
    InsufficientBalance,
    /// Sponsorship switched off
    PolicyDisabled,
    /// Sponsored call targets another contract
    UnsupportedTarget,
    /// Sponsored call is not a transfer to an allowed destination
    UnsupportedDestination,
    /// Sponsored transfer of zero tokens
    ZeroAmountRejected,
    /// Payer holds none of the sponsored token
    NotAHolder,
    /// Sponsor funds cannot cover the fee bound
    InsufficientReserve,
    /// Self-paid fee or native transfer exceeds the native balance
    InsufficientNativeBalance,
    /// Gas limit too low
    OutOfGas,
    /// Malformed call (unknown contract, bad nonce, bad signature, overflow)
    InvalidCall,
    /// Storage, serialization or actor failure
    Internal,
}

impl ErrorKind {
    /// Stable label for metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::InsufficientBalance => "insufficient_balance",
            ErrorKind::PolicyDisabled => "policy_disabled",
            ErrorKind::UnsupportedTarget => "unsupported_target",
            ErrorKind::UnsupportedDestination => "unsupported_destination",
            ErrorKind::ZeroAmountRejected => "zero_amount_rejected",
            ErrorKind::NotAHolder => "not_a_holder",
            ErrorKind::InsufficientReserve => "insufficient_reserve",
            ErrorKind::InsufficientNativeBalance => "insufficient_native_balance",
            ErrorKind::OutOfGas => "out_of_gas",
            ErrorKind::InvalidCall => "invalid_call",
            ErrorKind::Internal => "internal",
        }
    }
}

impl From<&RejectReason> for ErrorKind {
    fn from(reason: &RejectReason) -> Self {
        match reason {
            RejectReason::PolicyDisabled => ErrorKind::PolicyDisabled,
            RejectReason::UnsupportedTarget => ErrorKind::UnsupportedTarget,
            RejectReason::UnsupportedDestination => ErrorKind::UnsupportedDestination,
            RejectReason::ZeroAmountRejected => ErrorKind::ZeroAmountRejected,
            RejectReason::NotAHolder { .. } => ErrorKind::NotAHolder,
            RejectReason::InsufficientReserve { .. } => ErrorKind::InsufficientReserve,
        }
    }
}

impl Error {
    /// Fold into the caller-facing taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Ledger(err) => match err {
                ledger_core::Error::Unauthorized(_) => ErrorKind::Unauthorized,
                ledger_core::Error::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
                ledger_core::Error::Overflow(_)
                | ledger_core::Error::InvalidArgument(_)
                | ledger_core::Error::SignatureError(_) => ErrorKind::InvalidCall,
                _ => ErrorKind::Internal,
            },
            Error::Paymaster(err) => match err {
                paymaster::Error::Rejected(reason) => ErrorKind::from(reason),
                paymaster::Error::Unauthorized(_) => ErrorKind::Unauthorized,
                paymaster::Error::Overflow(_) | paymaster::Error::InvalidArgument(_) => {
                    ErrorKind::InvalidCall
                }
                paymaster::Error::Settlement(_) => ErrorKind::Internal,
            },
            Error::InsufficientNativeBalance { .. } => ErrorKind::InsufficientNativeBalance,
            Error::OutOfGas { .. } => ErrorKind::OutOfGas,
            Error::UnknownContract(_)
            | Error::UnsupportedOperation { .. }
            | Error::InvalidNonce { .. }
            | Error::SignatureError(_)
            | Error::Overflow(_) => ErrorKind::InvalidCall,
            Error::Storage(_)
            | Error::Serialization(_)
            | Error::Json(_)
            | Error::InvariantViolation(_)
            | Error::Concurrency(_)
            | Error::Config(_)
            | Error::Metrics(_)
            | Error::Io(_) => ErrorKind::Internal,
        }
    }

    /// Sponsorship rejection reason, if this is one
    pub fn rejection(&self) -> Option<&RejectReason> {
        match self {
            Error::Paymaster(paymaster::Error::Rejected(reason)) => Some(reason),
            _ => None,
        }
    }
}
