//! Native-currency balances

use ledger_core::{AccountId, NativeAmount};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Error, Result};

/// Native balances plus the account that collects fees
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeBank {
    balances: BTreeMap<AccountId, NativeAmount>,
    fee_collector: AccountId,
}

impl NativeBank {
    /// Empty bank
    pub fn new(fee_collector: AccountId) -> Self {
        Self {
            balances: BTreeMap::new(),
            fee_collector,
        }
    }

    /// Rebuild from persisted balances
    pub fn restore(
        fee_collector: AccountId,
        balances: impl IntoIterator<Item = (AccountId, NativeAmount)>,
    ) -> Self {
        Self {
            balances: balances.into_iter().filter(|(_, b)| *b > 0).collect(),
            fee_collector,
        }
    }

    /// Fee collector account
    pub fn fee_collector(&self) -> AccountId {
        self.fee_collector
    }

    /// Balance of `account`
    pub fn balance_of(&self, account: &AccountId) -> NativeAmount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Sum of all balances
    pub fn total(&self) -> Option<NativeAmount> {
        self.balances
            .values()
            .try_fold(0u128, |acc, b| acc.checked_add(*b))
    }

    /// Add funds to `account`
    pub fn credit(&mut self, account: AccountId, amount: NativeAmount) -> Result<()> {
        let balance = self
            .balance_of(&account)
            .checked_add(amount)
            .ok_or_else(|| Error::Overflow(format!("native balance of {} overflows", account)))?;
        self.set_balance(account, balance);
        Ok(())
    }

    /// Take funds from `account`
    pub fn debit(&mut self, account: AccountId, amount: NativeAmount) -> Result<()> {
        let have = self.balance_of(&account);
        if have < amount {
            return Err(Error::InsufficientNativeBalance {
                account,
                have,
                need: amount,
            });
        }
        self.set_balance(account, have - amount);
        Ok(())
    }

    fn set_balance(&mut self, account: AccountId, balance: NativeAmount) {
        if balance == 0 {
            self.balances.remove(&account);
        } else {
            self.balances.insert(account, balance);
        }
    }
}
