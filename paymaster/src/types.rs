//! Core types for the policy engine

use ledger_core::{AccountId, NativeAmount, TokenOp};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// What the environment asks the engine to sponsor
#[derive(Debug, Clone, Copy)]
pub struct SponsorshipRequest<'a> {
    /// Account whose fee would be covered (the call's initiator)
    pub payer: AccountId,

    /// Contract the call targets
    pub target: AccountId,

    /// Ledger operation the call performs on `target` (`None` for any
    /// other kind of call)
    pub operation: Option<&'a TokenOp>,

    /// Upper bound on the fee (gas limit × gas price)
    pub max_fee: NativeAmount,
}

/// Reason a sponsorship request was turned down
///
/// Variants are listed in evaluation order; the first failing check wins.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RejectReason {
    /// The engine is switched off
    #[error("Paymaster is not enabled at this point in time")]
    PolicyDisabled,

    /// Call targets a contract other than the sponsored ledger
    #[error("Contract called is not supported by this Paymaster")]
    UnsupportedTarget,

    /// Call is not a transfer to an allowed destination
    #[error("Destination is not supported by this Paymaster")]
    UnsupportedDestination,

    /// Transfer of zero tokens
    #[error("Paymaster won't honor a transfer of 0 tokens")]
    ZeroAmountRejected,

    /// Payer holds none of the sponsored token
    #[error("Account do not hold {token_name}")]
    NotAHolder {
        /// Name of the sponsored token
        token_name: String,
    },

    /// Funds cannot cover the fee bound
    #[error("Paymaster reserve cannot cover the fee")]
    InsufficientReserve {
        /// Funds currently available
        available: NativeAmount,
        /// Fee bound requested
        required: NativeAmount,
    },
}

impl RejectReason {
    /// Stable machine-readable reason code
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::PolicyDisabled => "policy_disabled",
            RejectReason::UnsupportedTarget => "unsupported_target",
            RejectReason::UnsupportedDestination => "unsupported_destination",
            RejectReason::ZeroAmountRejected => "zero_amount_rejected",
            RejectReason::NotAHolder { .. } => "not_a_holder",
            RejectReason::InsufficientReserve { .. } => "insufficient_reserve",
        }
    }
}

/// Fee earmarked for one in-flight sponsored call
///
/// Only produced by an accepted validation and consumed exactly once by
/// `settle` or `release`.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a reservation must be settled or released"]
pub struct Reservation {
    id: Uuid,
    paymaster: AccountId,
    payer: AccountId,
    amount: NativeAmount,
}

impl Reservation {
    pub(crate) fn new(paymaster: AccountId, payer: AccountId, amount: NativeAmount) -> Self {
        Self {
            id: Uuid::now_v7(),
            paymaster,
            payer,
            amount,
        }
    }

    /// Reservation ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Engine holding the funds
    pub fn paymaster(&self) -> AccountId {
        self.paymaster
    }

    /// Account whose fee is covered
    pub fn payer(&self) -> AccountId {
        self.payer
    }

    /// Amount earmarked
    pub fn amount(&self) -> NativeAmount {
        self.amount
    }
}

/// Outcome of `validate_sponsorship`
#[derive(Debug)]
#[must_use]
pub enum Decision {
    /// Sponsorship granted; the fee bound is reserved
    Accept(Reservation),
    /// Sponsorship refused; nothing was reserved
    Reject(RejectReason),
}

impl Decision {
    /// Convert into a `Result`, mapping rejections to `Error::Rejected`
    pub fn into_result(self) -> crate::Result<Reservation> {
        match self {
            Decision::Accept(reservation) => Ok(reservation),
            Decision::Reject(reason) => Err(crate::Error::Rejected(reason)),
        }
    }
}

/// Closed-out reservation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// Reservation this settles
    pub reservation_id: Uuid,

    /// Amount that was earmarked
    pub reserved: NativeAmount,

    /// Fee actually paid out of the engine's funds
    pub charged: NativeAmount,

    /// Amount returned to the engine's funds
    pub refunded: NativeAmount,
}

/// Owner-facing engine operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymasterOp {
    /// Switch sponsorship on or off
    SetPaymasterEnabled {
        /// New state
        enabled: bool,
    },
    /// Extend the destination allowlist
    AddAllowedDestination {
        /// Destinations to insert
        accounts: Vec<AccountId>,
    },
    /// Shrink the destination allowlist
    RemoveAllowedDestination {
        /// Destinations to remove
        accounts: Vec<AccountId>,
    },
    /// Sweep all funds to the owner
    Withdraw,
    /// Hand over ownership
    TransferOwnership {
        /// Incoming owner
        new_owner: AccountId,
    },
}

impl PaymasterOp {
    /// Short operation name for logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            PaymasterOp::SetPaymasterEnabled { .. } => "set_paymaster_enabled",
            PaymasterOp::AddAllowedDestination { .. } => "add_allowed_destination",
            PaymasterOp::RemoveAllowedDestination { .. } => "remove_allowed_destination",
            PaymasterOp::Withdraw => "withdraw",
            PaymasterOp::TransferOwnership { .. } => "transfer_ownership",
        }
    }
}
