//! Deterministic gas metering

use ledger_core::{NativeAmount, TokenOp};
use paymaster::PaymasterOp;
use serde::{Deserialize, Serialize};

use crate::types::{Call, Operation};

/// Gas cost table and price
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasSchedule {
    /// Charged for every call
    pub base: u64,

    /// Mint and claim
    pub issuance: u64,

    /// Token transfer
    pub transfer: u64,

    /// Allowlist edit (ledger or engine), plus `per_account` per entry
    pub allow_list: u64,

    /// Per account touched by an allowlist edit
    pub per_account: u64,

    /// Ownership handover, switch toggle, withdraw
    pub admin: u64,

    /// Extra gas for running the sponsorship checks
    pub sponsorship: u64,

    /// Native units per gas
    pub gas_price: u64,
}

impl Default for GasSchedule {
    fn default() -> Self {
        Self {
            base: 21_000,
            issuance: 30_000,
            transfer: 25_000,
            allow_list: 20_000,
            per_account: 5_000,
            admin: 10_000,
            sponsorship: 15_000,
            gas_price: 1_000,
        }
    }
}

impl GasSchedule {
    /// Exact gas `call` consumes
    pub fn gas_for(&self, call: &Call) -> u64 {
        let operation = match &call.operation {
            Operation::Token(op) => match op {
                TokenOp::Mint { .. } | TokenOp::Claim { .. } => self.issuance,
                TokenOp::Transfer { .. } => self.transfer,
                TokenOp::AddToAllowList { accounts } | TokenOp::RemoveFromAllowList { accounts } => {
                    self.allow_list_cost(accounts.len())
                }
                TokenOp::TransferOwnership { .. } => self.admin,
            },
            Operation::Paymaster(op) => match op {
                PaymasterOp::AddAllowedDestination { accounts }
                | PaymasterOp::RemoveAllowedDestination { accounts } => {
                    self.allow_list_cost(accounts.len())
                }
                PaymasterOp::SetPaymasterEnabled { .. }
                | PaymasterOp::Withdraw
                | PaymasterOp::TransferOwnership { .. } => self.admin,
            },
        };

        let sponsorship = if call.paymaster.is_some() {
            self.sponsorship
        } else {
            0
        };

        self.base
            .saturating_add(operation)
            .saturating_add(sponsorship)
    }

    /// Fee for `gas` units at the schedule's price
    pub fn fee(&self, gas: u64) -> NativeAmount {
        NativeAmount::from(gas) * NativeAmount::from(self.gas_price)
    }

    /// Upper bound on the fee of `call` (`gas_limit * gas_price`)
    pub fn max_fee(&self, call: &Call) -> NativeAmount {
        self.fee(call.gas_limit)
    }

    fn allow_list_cost(&self, accounts: usize) -> u64 {
        let per_account = self
            .per_account
            .saturating_mul(u64::try_from(accounts).unwrap_or(u64::MAX));
        self.allow_list.saturating_add(per_account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::AccountId;

    fn call(op: impl Into<Operation>) -> Call {
        Call::new(AccountId::from_bytes([1; 20]), AccountId::from_bytes([2; 20]), op)
    }

    #[test]
    fn test_transfer_gas() {
        let schedule = GasSchedule::default();
        let plain = call(TokenOp::Transfer {
            to: AccountId::ZERO,
            amount: 1,
        });
        assert_eq!(schedule.gas_for(&plain), 46_000);

        let sponsored = plain.sponsored_by(AccountId::from_bytes([3; 20]));
        assert_eq!(schedule.gas_for(&sponsored), 61_000);
        assert_eq!(schedule.fee(61_000), 61_000_000);
    }

    #[test]
    fn test_allow_list_scales_with_accounts() {
        let schedule = GasSchedule::default();
        let one = call(TokenOp::AddToAllowList {
            accounts: vec![AccountId::ZERO],
        });
        let three = call(TokenOp::AddToAllowList {
            accounts: vec![AccountId::ZERO; 3],
        });
        assert_eq!(schedule.gas_for(&three) - schedule.gas_for(&one), 10_000);
    }

    #[test]
    fn test_max_fee_uses_limit() {
        let schedule = GasSchedule::default();
        let c = call(PaymasterOp::Withdraw).with_gas_limit(50_000);
        assert_eq!(schedule.max_fee(&c), 50_000 * 1_000);
    }
}
