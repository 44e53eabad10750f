//! Allowlist-gated token ledger
//!
//! `TokenLedger` is a plain state machine: every mutating method takes the
//! verified caller explicitly, validates everything it needs, and only then
//! writes. A method that returns `Err` has not touched any field.
//!
//! The three issuance/movement entry points carry different authorization
//! predicates and are kept separate:
//!
//! | Entry point | Who may call             | Supply       |
//! |-------------|--------------------------|--------------|
//! | `mint`      | owner                    | increases    |
//! | `claim`     | owner or allowlisted     | increases    |
//! | `transfer`  | anyone holding `amount`  | unchanged    |

use crate::{
    config::TokenConfig,
    error::{NOT_ALLOWLISTED_OR_OWNER, ZERO_OWNER, ZERO_RECIPIENT_MINT, ZERO_RECIPIENT_TRANSFER},
    types::{AccountId, Amount, TokenOp, TransferEvent, TransferKind},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Token ledger state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenLedger {
    /// Contract address of this ledger
    address: AccountId,

    /// Token name
    name: String,

    /// Token symbol
    symbol: String,

    /// Implied decimal places
    decimals: u8,

    /// Privileged account
    owner: AccountId,

    /// Non-zero balances only
    balances: BTreeMap<AccountId, Amount>,

    /// Always equal to the sum of `balances`
    total_supply: Amount,

    /// Accounts allowed to call `claim`
    allow_list: BTreeSet<AccountId>,
}

impl TokenLedger {
    /// Deploy a new ledger, minting the genesis supply to `owner`
    pub fn deploy(
        address: AccountId,
        owner: AccountId,
        config: &TokenConfig,
    ) -> Result<(Self, TransferEvent)> {
        config.validate()?;
        if owner.is_zero() {
            return Err(Error::InvalidArgument(ZERO_OWNER.to_string()));
        }

        let genesis = config.genesis_units()?;

        let mut ledger = Self {
            address,
            name: config.name.clone(),
            symbol: config.symbol.clone(),
            decimals: config.decimals,
            owner,
            balances: BTreeMap::new(),
            total_supply: 0,
            allow_list: BTreeSet::new(),
        };
        let event = ledger.issue(TransferKind::Mint, owner, genesis)?;

        tracing::info!(
            token = %address,
            owner = %owner,
            genesis_supply = genesis,
            "Token ledger deployed"
        );

        Ok((ledger, event))
    }

    // Read accessors

    /// Contract address
    pub fn address(&self) -> AccountId {
        self.address
    }

    /// Token name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Token symbol
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Implied decimal places
    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// Current owner
    pub fn owner(&self) -> AccountId {
        self.owner
    }

    /// Total supply in smallest units
    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Balance of an account (zero if never credited)
    pub fn balance_of(&self, account: &AccountId) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Whether `account` may call `claim` through the allowlist
    pub fn is_allow_listed(&self, account: &AccountId) -> bool {
        self.allow_list.contains(account)
    }

    /// Recompute Σ balances and compare it with `total_supply`
    pub fn check_supply_conservation(&self) -> bool {
        self.balances
            .values()
            .try_fold(0u128, |acc, balance| acc.checked_add(*balance))
            == Some(self.total_supply)
    }

    // Mutations

    /// Owner-only issuance
    pub fn mint(&mut self, caller: &AccountId, to: AccountId, amount: Amount) -> Result<TransferEvent> {
        self.require_owner(caller)?;
        self.issue(TransferKind::Mint, to, amount)
    }

    /// Allowlisted-or-owner issuance
    ///
    /// Claimed tokens are newly issued: `total_supply` grows by `amount`.
    pub fn claim(&mut self, caller: &AccountId, to: AccountId, amount: Amount) -> Result<TransferEvent> {
        if *caller != self.owner && !self.allow_list.contains(caller) {
            return Err(Error::Unauthorized(NOT_ALLOWLISTED_OR_OWNER.to_string()));
        }
        self.issue(TransferKind::Claim, to, amount)
    }

    /// Move `amount` from `from` to `to`
    ///
    /// Open to any caller; gated only on the sender's balance.
    pub fn transfer(&mut self, from: &AccountId, to: AccountId, amount: Amount) -> Result<TransferEvent> {
        if to.is_zero() {
            return Err(Error::InvalidArgument(ZERO_RECIPIENT_TRANSFER.to_string()));
        }

        let from_balance = self.balance_of(from);
        if from_balance < amount {
            return Err(Error::InsufficientBalance {
                have: from_balance,
                need: amount,
            });
        }

        if *from != to {
            let new_to_balance = self
                .balance_of(&to)
                .checked_add(amount)
                .ok_or_else(|| Error::Overflow(format!("balance of {} overflows", to)))?;

            self.set_balance(*from, from_balance - amount);
            self.set_balance(to, new_to_balance);
        }

        tracing::debug!(
            token = %self.address,
            from = %from,
            to = %to,
            amount,
            "Transfer"
        );

        Ok(TransferEvent::new(
            self.address,
            TransferKind::Transfer,
            *from,
            to,
            amount,
        ))
    }

    /// Owner-only, idempotent allowlist insertion
    pub fn add_to_allow_list(&mut self, caller: &AccountId, accounts: &[AccountId]) -> Result<()> {
        self.require_owner(caller)?;
        self.allow_list.extend(accounts.iter().copied());
        tracing::debug!(token = %self.address, count = accounts.len(), "Allowlist extended");
        Ok(())
    }

    /// Owner-only, idempotent allowlist removal
    pub fn remove_from_allow_list(&mut self, caller: &AccountId, accounts: &[AccountId]) -> Result<()> {
        self.require_owner(caller)?;
        for account in accounts {
            self.allow_list.remove(account);
        }
        tracing::debug!(token = %self.address, count = accounts.len(), "Allowlist reduced");
        Ok(())
    }

    /// Owner-only ownership handover
    pub fn transfer_ownership(&mut self, caller: &AccountId, new_owner: AccountId) -> Result<()> {
        self.require_owner(caller)?;
        if new_owner.is_zero() {
            return Err(Error::InvalidArgument(ZERO_OWNER.to_string()));
        }

        tracing::info!(
            token = %self.address,
            previous_owner = %self.owner,
            new_owner = %new_owner,
            "Ownership transferred"
        );
        self.owner = new_owner;
        Ok(())
    }

    /// Dispatch an operation on behalf of `caller`
    ///
    /// Returns the `Transfer` events the operation emitted, in emission order.
    pub fn apply(&mut self, caller: &AccountId, op: &TokenOp) -> Result<Vec<TransferEvent>> {
        match op {
            TokenOp::Mint { to, amount } => self.mint(caller, *to, *amount).map(|e| vec![e]),
            TokenOp::Claim { to, amount } => self.claim(caller, *to, *amount).map(|e| vec![e]),
            TokenOp::Transfer { to, amount } => {
                self.transfer(caller, *to, *amount).map(|e| vec![e])
            }
            TokenOp::AddToAllowList { accounts } => {
                self.add_to_allow_list(caller, accounts).map(|_| vec![])
            }
            TokenOp::RemoveFromAllowList { accounts } => {
                self.remove_from_allow_list(caller, accounts).map(|_| vec![])
            }
            TokenOp::TransferOwnership { new_owner } => {
                self.transfer_ownership(caller, *new_owner).map(|_| vec![])
            }
        }
    }

    fn require_owner(&self, caller: &AccountId) -> Result<()> {
        if *caller != self.owner {
            return Err(Error::not_owner());
        }
        Ok(())
    }

    /// Credit `to` and grow supply; both sums are checked before either write
    fn issue(&mut self, kind: TransferKind, to: AccountId, amount: Amount) -> Result<TransferEvent> {
        if to.is_zero() {
            return Err(Error::InvalidArgument(ZERO_RECIPIENT_MINT.to_string()));
        }
        let new_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or_else(|| Error::Overflow("total supply overflows".to_string()))?;
        let new_balance = self
            .balance_of(&to)
            .checked_add(amount)
            .ok_or_else(|| Error::Overflow(format!("balance of {} overflows", to)))?;

        self.total_supply = new_supply;
        self.set_balance(to, new_balance);

        tracing::debug!(
            token = %self.address,
            kind = ?kind,
            to = %to,
            amount,
            total_supply = new_supply,
            "Tokens issued"
        );

        Ok(TransferEvent::new(self.address, kind, AccountId::ZERO, to, amount))
    }

    fn set_balance(&mut self, account: AccountId, balance: Amount) {
        if balance == 0 {
            self.balances.remove(&account);
        } else {
            self.balances.insert(account, balance);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NOT_OWNER;

    fn account(byte: u8) -> AccountId {
        AccountId::from_bytes([byte; 20])
    }

    fn deploy() -> (TokenLedger, AccountId) {
        let owner = account(1);
        let (ledger, _) = TokenLedger::deploy(account(0xee), owner, &TokenConfig::default()).unwrap();
        (ledger, owner)
    }

    #[test]
    fn test_genesis_premint() {
        let (ledger, owner) = deploy();

        assert_eq!(ledger.name(), "BUIDL BUXX");
        assert_eq!(ledger.symbol(), "BUXX");
        assert_eq!(ledger.decimals(), 2);
        assert_eq!(ledger.total_supply(), 100_000 * 10u128.pow(2));
        assert_eq!(ledger.balance_of(&owner), ledger.total_supply());
        assert!(ledger.check_supply_conservation());
    }

    #[test]
    fn test_genesis_event_is_issuance() {
        let owner = account(1);
        let (_, event) = TokenLedger::deploy(account(0xee), owner, &TokenConfig::default()).unwrap();
        assert!(event.is_issuance());
        assert_eq!(event.to, owner);
        assert_eq!(event.kind, TransferKind::Mint);
    }

    #[test]
    fn test_mint_only_owner() {
        let (mut ledger, owner) = deploy();
        let holder = account(3);

        ledger.mint(&owner, holder, 20 * 100).unwrap();
        assert_eq!(ledger.total_supply(), 100_020 * 100);
        assert_eq!(ledger.balance_of(&holder), 2000);

        let before = ledger.clone();
        let err = ledger.mint(&account(2), account(2), 1).unwrap_err();
        assert_eq!(err.to_string(), NOT_OWNER);
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_claim_by_owner_and_allowlisted() {
        let (mut ledger, owner) = deploy();
        let allowlisted = account(3);
        ledger.add_to_allow_list(&owner, &[allowlisted]).unwrap();

        ledger.claim(&owner, allowlisted, 2000).unwrap();
        assert_eq!(ledger.balance_of(&allowlisted), 2000);

        // Self-claim by the allowlisted account
        ledger.claim(&allowlisted, allowlisted, 2000).unwrap();
        assert_eq!(ledger.balance_of(&allowlisted), 4000);
        assert_eq!(ledger.total_supply(), 100_000 * 100 + 4000);
        assert!(ledger.check_supply_conservation());
    }

    #[test]
    fn test_claim_rejected_for_outsider() {
        let (mut ledger, owner) = deploy();
        let outsider = account(2);
        ledger.claim(&owner, outsider, 20 * 100).unwrap();

        let before = ledger.clone();
        let err = ledger.claim(&outsider, owner, 5 * 100).unwrap_err();
        assert_eq!(err.to_string(), "Not allowlisted or owner");
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_transfer_moves_balance() {
        let (mut ledger, owner) = deploy();
        let sender = account(2);
        let receiver = account(3);
        ledger.claim(&owner, sender, 20 * 100).unwrap();
        let supply = ledger.total_supply();

        let event = ledger.transfer(&sender, receiver, 5 * 100).unwrap();
        assert_eq!(event.kind, TransferKind::Transfer);
        assert_eq!((event.from, event.to, event.amount), (sender, receiver, 500));

        assert_eq!(ledger.balance_of(&sender), 15 * 100);
        assert_eq!(ledger.balance_of(&receiver), 5 * 100);
        assert_eq!(ledger.total_supply(), supply);
    }

    #[test]
    fn test_transfer_insufficient_balance() {
        let (mut ledger, owner) = deploy();
        let sender = account(2);
        ledger.claim(&owner, sender, 100).unwrap();

        let before = ledger.clone();
        let err = ledger.transfer(&sender, account(3), 101).unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { have: 100, need: 101 }));
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_transfer_to_zero_rejected() {
        let (mut ledger, owner) = deploy();
        let before = ledger.clone();

        let err = ledger.transfer(&owner, AccountId::ZERO, 10).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(ref reason) if reason == ZERO_RECIPIENT_TRANSFER));

        // Recipient check comes before the balance check
        let err = ledger.transfer(&account(9), AccountId::ZERO, 10).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_issue_to_zero_rejected() {
        let (mut ledger, owner) = deploy();
        let before = ledger.clone();

        for op in [
            TokenOp::Mint { to: AccountId::ZERO, amount: 1 },
            TokenOp::Claim { to: AccountId::ZERO, amount: 1 },
        ] {
            let err = ledger.apply(&owner, &op).unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(ref reason) if reason == ZERO_RECIPIENT_MINT));
        }
        assert_eq!(ledger, before);
        assert!(ledger.check_supply_conservation());
    }

    #[test]
    fn test_transfer_not_gated_by_allowlist() {
        let (mut ledger, owner) = deploy();
        let sender = account(2);
        ledger.mint(&owner, sender, 100).unwrap();
        assert!(!ledger.is_allow_listed(&sender));
        assert!(ledger.transfer(&sender, account(3), 100).is_ok());
        assert_eq!(ledger.balance_of(&sender), 0);
    }

    #[test]
    fn test_self_transfer_keeps_balance() {
        let (mut ledger, owner) = deploy();
        let before = ledger.balance_of(&owner);
        let event = ledger.transfer(&owner, owner, 10).unwrap();
        assert_eq!(event.from, event.to);
        assert_eq!(ledger.balance_of(&owner), before);
        assert!(ledger.transfer(&owner, owner, before + 1).is_err());
    }

    #[test]
    fn test_allow_list_add_remove_idempotent() {
        let (mut ledger, owner) = deploy();
        let a = account(2);
        let b = account(3);

        ledger.add_to_allow_list(&owner, &[a]).unwrap();
        let snapshot = ledger.clone();
        ledger.add_to_allow_list(&owner, &[a]).unwrap();
        assert_eq!(ledger, snapshot);

        ledger.add_to_allow_list(&owner, &[b]).unwrap();
        ledger.remove_from_allow_list(&owner, &[b, a]).unwrap();
        assert!(!ledger.is_allow_listed(&a));
        assert!(!ledger.is_allow_listed(&b));

        // Removing an absent account is a no-op
        ledger.remove_from_allow_list(&owner, &[a]).unwrap();
    }

    #[test]
    fn test_allow_list_owner_only() {
        let (mut ledger, _) = deploy();
        let outsider = account(2);
        assert!(matches!(
            ledger.add_to_allow_list(&outsider, &[outsider]),
            Err(Error::Unauthorized(_))
        ));
        assert!(!ledger.is_allow_listed(&outsider));
    }

    #[test]
    fn test_transfer_ownership() {
        let (mut ledger, owner) = deploy();
        let successor = account(9);

        assert!(ledger.transfer_ownership(&owner, AccountId::ZERO).is_err());
        ledger.transfer_ownership(&owner, successor).unwrap();
        assert_eq!(ledger.owner(), successor);

        // Old owner lost its privileges immediately
        assert!(ledger.mint(&owner, owner, 1).is_err());
        assert!(ledger.mint(&successor, successor, 1).is_ok());
    }

    #[test]
    fn test_mint_overflow_is_atomic() {
        let (mut ledger, owner) = deploy();
        let before = ledger.clone();
        assert!(matches!(
            ledger.mint(&owner, account(2), u128::MAX),
            Err(Error::Overflow(_))
        ));
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_apply_dispatch() {
        let (mut ledger, owner) = deploy();
        let holder = account(4);

        let events = ledger
            .apply(&owner, &TokenOp::Claim { to: holder, amount: 7 })
            .unwrap();
        assert_eq!(events.len(), 1);

        let events = ledger
            .apply(&owner, &TokenOp::AddToAllowList { accounts: vec![holder] })
            .unwrap();
        assert!(events.is_empty());
        assert!(ledger.is_allow_listed(&holder));
    }
}
