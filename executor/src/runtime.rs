//! Execution environment
//!
//! The runtime owns every ledger, every policy engine and the native bank,
//! and runs calls in three phases:
//!
//! 1. **Pre-execution**: either the named paymaster validates the call and
//!    reserves `gas_limit * gas_price` from its funds, or the same bound is
//!    debited from the initiator's native balance.
//! 2. **Execution**: the ledger or engine operation runs.
//! 3. **Settlement**: the actual fee (`gas_used * gas_price`) goes to the fee
//!    collector and the unused part of the bound is refunded.
//!
//! All three phases run against a [`Staging`] overlay of the committed state.
//! Only a call that clears every phase is written, first to RocksDB in one
//! batch and then to memory; any error leaves both untouched.

use chrono::Utc;
use ledger_core::{
    types::to_decimal, AccountId, NativeAmount, TokenConfig, TokenLedger, TransferEvent,
};
use paymaster::{Paymaster, PaymasterOp, Reservation, SponsorshipRequest};
use std::collections::{btree_map::Entry, BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::{
    bank::NativeBank,
    config::Config,
    gas::GasSchedule,
    metrics::Metrics,
    storage::{ChangeSet, Storage},
    types::{Call, EventRecord, FeePayer, Operation, Receipt, SignedCall},
    Error, Result,
};

/// Committed contract and account state
#[derive(Debug, Clone)]
struct State {
    tokens: BTreeMap<AccountId, TokenLedger>,
    paymasters: BTreeMap<AccountId, Paymaster>,
    bank: NativeBank,
    nonces: BTreeMap<AccountId, u64>,
}

impl State {
    fn missing_contract(&self, target: AccountId, operation: &'static str) -> Error {
        if self.tokens.contains_key(&target) || self.paymasters.contains_key(&target) {
            Error::UnsupportedOperation { target, operation }
        } else {
            Error::UnknownContract(target)
        }
    }
}

/// Copy-on-write view of [`State`] for one call
#[derive(Debug)]
struct Staging<'a> {
    base: &'a State,
    tokens: BTreeMap<AccountId, TokenLedger>,
    paymasters: BTreeMap<AccountId, Paymaster>,
    bank: Option<NativeBank>,
    native_touched: BTreeSet<AccountId>,
}

impl<'a> Staging<'a> {
    fn new(base: &'a State) -> Self {
        Self {
            base,
            tokens: BTreeMap::new(),
            paymasters: BTreeMap::new(),
            bank: None,
            native_touched: BTreeSet::new(),
        }
    }

    fn token_mut(&mut self, address: AccountId, operation: &'static str) -> Result<&mut TokenLedger> {
        match self.tokens.entry(address) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let committed = self
                    .base
                    .tokens
                    .get(&address)
                    .ok_or_else(|| self.base.missing_contract(address, operation))?;
                Ok(entry.insert(committed.clone()))
            }
        }
    }

    fn paymaster_mut(&mut self, address: AccountId, operation: &'static str) -> Result<&mut Paymaster> {
        match self.paymasters.entry(address) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let committed = self
                    .base
                    .paymasters
                    .get(&address)
                    .ok_or_else(|| self.base.missing_contract(address, operation))?;
                Ok(entry.insert(committed.clone()))
            }
        }
    }

    fn bank_mut(&mut self) -> &mut NativeBank {
        let base = self.base;
        self.bank.get_or_insert_with(|| base.bank.clone())
    }

    fn debit(&mut self, account: AccountId, amount: NativeAmount) -> Result<()> {
        self.bank_mut().debit(account, amount)?;
        self.native_touched.insert(account);
        Ok(())
    }

    fn credit(&mut self, account: AccountId, amount: NativeAmount) -> Result<()> {
        self.bank_mut().credit(account, amount)?;
        self.native_touched.insert(account);
        Ok(())
    }

    fn collect_fee(&mut self, amount: NativeAmount) -> Result<()> {
        let collector = self.base.bank.fee_collector();
        self.credit(collector, amount)
    }

    /// Check the conservation identities of everything touched
    fn verify_invariants(&self) -> Result<()> {
        for token in self.tokens.values() {
            if !token.check_supply_conservation() {
                return Err(Error::InvariantViolation(format!(
                    "supply of {} does not match its balances",
                    token.address()
                )));
            }
        }

        for paymaster in self.paymasters.values() {
            if paymaster.in_flight() != 0 || !paymaster.check_funds_conservation() {
                return Err(Error::InvariantViolation(format!(
                    "funds of paymaster {} do not reconcile",
                    paymaster.address()
                )));
            }
        }

        Ok(())
    }

    fn into_commit(self, events: Vec<EventRecord>, nonce: Option<(AccountId, u64)>) -> Commit {
        let native = match &self.bank {
            Some(bank) => self
                .native_touched
                .iter()
                .map(|account| (*account, bank.balance_of(account)))
                .collect(),
            None => Vec::new(),
        };

        Commit {
            changes: ChangeSet {
                tokens: self.tokens.into_values().collect(),
                paymasters: self.paymasters.into_values().collect(),
                native,
                nonces: nonce.into_iter().collect(),
                next_sequence: events.last().map(|record| record.sequence + 1),
                events,
                contract_nonce: None,
                genesis_applied: false,
            },
            bank: self.bank,
        }
    }
}

/// Staged writes ready to be committed
#[derive(Debug)]
struct Commit {
    changes: ChangeSet,
    bank: Option<NativeBank>,
}

/// Where the fee bound of a call was taken from
enum FeeSource {
    Sponsored {
        paymaster: AccountId,
        reservation: Reservation,
    },
    SelfPaid {
        reserved: NativeAmount,
    },
}

/// Single-writer execution environment
#[derive(Debug)]
pub struct Runtime {
    state: State,
    /// Event log of a volatile runtime; a durable one reads events from storage
    events: Vec<EventRecord>,
    next_sequence: u64,
    contract_nonce: u64,
    gas: GasSchedule,
    storage: Option<Storage>,
    metrics: Metrics,
}

impl Runtime {
    /// Volatile runtime (nothing is persisted)
    pub fn in_memory(config: &Config) -> Result<Self> {
        let mut runtime = Self::empty(config, None)?;
        runtime.apply_genesis(config)?;
        Ok(runtime)
    }

    /// Open or create a durable runtime under `config.data_dir`
    pub fn open(config: &Config) -> Result<Self> {
        let storage = Storage::open(config)?;
        let persisted = storage.load()?;
        let genesis_applied = persisted.genesis_applied;

        let mut runtime = Self::empty(config, Some(storage))?;
        runtime.state.tokens = persisted
            .tokens
            .into_iter()
            .map(|token| (token.address(), token))
            .collect();
        runtime.state.paymasters = persisted
            .paymasters
            .into_iter()
            .map(|paymaster| (paymaster.address(), paymaster))
            .collect();
        runtime.state.bank = NativeBank::restore(config.fee_collector, persisted.native);
        runtime.state.nonces = persisted.nonces.into_iter().collect();
        runtime.next_sequence = persisted.next_sequence;
        runtime.contract_nonce = persisted.contract_nonce;

        if persisted.last_event != runtime.next_sequence.checked_sub(1) {
            return Err(Error::InvariantViolation(format!(
                "newest stored event is {:?} but next sequence is {}",
                persisted.last_event, runtime.next_sequence
            )));
        }

        for paymaster in runtime.state.paymasters.values() {
            runtime
                .metrics
                .set_paymaster_reserve(&paymaster.address(), paymaster.reserved_funds());
        }

        if !genesis_applied {
            runtime.apply_genesis(config)?;
        }

        tracing::info!(
            tokens = runtime.state.tokens.len(),
            paymasters = runtime.state.paymasters.len(),
            next_sequence = runtime.next_sequence,
            "Runtime restored"
        );

        Ok(runtime)
    }

    fn empty(config: &Config, storage: Option<Storage>) -> Result<Self> {
        Ok(Self {
            state: State {
                tokens: BTreeMap::new(),
                paymasters: BTreeMap::new(),
                bank: NativeBank::new(config.fee_collector),
                nonces: BTreeMap::new(),
            },
            events: Vec::new(),
            next_sequence: 0,
            contract_nonce: 0,
            gas: config.gas.clone(),
            storage,
            metrics: Metrics::new()?,
        })
    }

    fn apply_genesis(&mut self, config: &Config) -> Result<()> {
        let mut bank = self.state.bank.clone();
        let mut native = Vec::with_capacity(config.genesis.len());

        for allocation in &config.genesis {
            bank.credit(allocation.account, allocation.native_amount())?;
            native.push((allocation.account, bank.balance_of(&allocation.account)));
        }

        self.apply(Commit {
            changes: ChangeSet {
                native,
                genesis_applied: true,
                ..ChangeSet::default()
            },
            bank: Some(bank),
        })?;

        tracing::info!(allocations = config.genesis.len(), "Genesis allocations applied");
        Ok(())
    }

    // Deployment (initialisation only)

    /// Deploy a ledger owned by `deployer`; mints the genesis supply to it
    pub fn deploy_token(&mut self, deployer: AccountId, config: &TokenConfig) -> Result<AccountId> {
        config.validate()?;

        let address = AccountId::derive_contract(&deployer, self.contract_nonce);
        let (token, event) = TokenLedger::deploy(address, deployer, config)?;
        let supply = to_decimal(token.total_supply(), token.decimals());
        let events = self.sequence(vec![event]);

        self.apply(Commit {
            changes: ChangeSet {
                tokens: vec![token],
                next_sequence: events.last().map(|record| record.sequence + 1),
                events,
                contract_nonce: Some(self.contract_nonce + 1),
                ..ChangeSet::default()
            },
            bank: None,
        })?;

        tracing::info!(
            token = %address,
            owner = %deployer,
            symbol = %config.symbol,
            supply = ?supply,
            "Token deployed"
        );
        Ok(address)
    }

    /// Deploy a policy engine bound to an existing ledger
    pub fn deploy_paymaster(&mut self, deployer: AccountId, sponsor_token: AccountId) -> Result<AccountId> {
        if !self.state.tokens.contains_key(&sponsor_token) {
            return Err(Error::UnknownContract(sponsor_token));
        }

        let address = AccountId::derive_contract(&deployer, self.contract_nonce);
        let paymaster = Paymaster::deploy(address, deployer, sponsor_token);

        self.apply(Commit {
            changes: ChangeSet {
                paymasters: vec![paymaster],
                contract_nonce: Some(self.contract_nonce + 1),
                ..ChangeSet::default()
            },
            bank: None,
        })?;

        Ok(address)
    }

    /// Move native funds from `funder` into a paymaster's funds
    pub fn fund_paymaster(&mut self, funder: AccountId, paymaster: AccountId, amount: NativeAmount) -> Result<()> {
        let mut staging = Staging::new(&self.state);
        staging.debit(funder, amount)?;
        staging.paymaster_mut(paymaster, "deposit")?.deposit(amount)?;
        staging.verify_invariants()?;

        let commit = staging.into_commit(Vec::new(), None);
        self.apply(commit)
    }

    /// Plain native transfer between accounts
    pub fn transfer_native(&mut self, from: AccountId, to: AccountId, amount: NativeAmount) -> Result<()> {
        let mut staging = Staging::new(&self.state);
        staging.debit(from, amount)?;
        staging.credit(to, amount)?;

        let commit = staging.into_commit(Vec::new(), None);
        self.apply(commit)
    }

    // Calls

    /// Run a call whose initiator the caller has already authenticated
    pub fn execute(&mut self, call: Call) -> Result<Receipt> {
        let result = self.run(&call, None);
        self.observe(&call, result)
    }

    /// Verify and run a signed call; its nonce must be the initiator's next
    pub fn execute_signed(&mut self, signed: SignedCall) -> Result<Receipt> {
        let result = signed.verify().and_then(|()| {
            let expected = self.nonce_of(&signed.call.initiator);
            if signed.nonce != expected {
                return Err(Error::InvalidNonce {
                    account: signed.call.initiator,
                    expected,
                    got: signed.nonce,
                });
            }
            self.run(&signed.call, Some(signed.nonce))
        });
        self.observe(&signed.call, result)
    }

    /// Gas `call` would consume
    pub fn estimate_gas(&self, call: &Call) -> u64 {
        self.gas.gas_for(call)
    }

    fn run(&mut self, call: &Call, nonce: Option<u64>) -> Result<Receipt> {
        let (commit, receipt) = self.stage(call, nonce)?;
        self.apply(commit)?;
        Ok(receipt)
    }

    fn stage(&self, call: &Call, nonce: Option<u64>) -> Result<(Commit, Receipt)> {
        let gas_used = self.gas.gas_for(call);
        if call.gas_limit < gas_used {
            return Err(Error::OutOfGas {
                limit: call.gas_limit,
                required: gas_used,
            });
        }

        let max_fee = self.gas.max_fee(call);
        let actual_fee = self.gas.fee(gas_used);
        let mut staging = Staging::new(&self.state);

        // Phase 1: pre-execution
        let source = match call.paymaster {
            Some(address) => {
                let paymaster = staging.paymaster_mut(address, "validate_sponsorship")?;
                let token = self
                    .state
                    .tokens
                    .get(&paymaster.sponsor_token())
                    .ok_or_else(|| Error::UnknownContract(paymaster.sponsor_token()))?;

                let request = SponsorshipRequest {
                    payer: call.initiator,
                    target: call.target,
                    operation: match &call.operation {
                        Operation::Token(op) => Some(op),
                        Operation::Paymaster(_) => None,
                    },
                    max_fee,
                };

                FeeSource::Sponsored {
                    paymaster: address,
                    reservation: paymaster.validate_sponsorship(&request, token).into_result()?,
                }
            }
            None => {
                staging.debit(call.initiator, max_fee)?;
                FeeSource::SelfPaid { reserved: max_fee }
            }
        };

        // Phase 2: execution
        let outcome = match Self::execute_operation(&mut staging, call) {
            Ok(outcome) => outcome,
            Err(err) => {
                if let FeeSource::Sponsored {
                    paymaster,
                    reservation,
                } = source
                {
                    staging
                        .paymaster_mut(paymaster, "release")?
                        .release(reservation)?;
                    tracing::debug!(paymaster = %paymaster, "Reservation released after failed execution");
                }
                return Err(err);
            }
        };

        // Phase 3: settlement
        let (fee_payer, settlement) = match source {
            FeeSource::Sponsored {
                paymaster,
                reservation,
            } => {
                let settlement = staging
                    .paymaster_mut(paymaster, "settle")?
                    .settle(reservation, actual_fee)?;
                (FeePayer::Paymaster(paymaster), Some(settlement))
            }
            FeeSource::SelfPaid { reserved } => {
                // gas_limit >= gas_used, so the bound covers the fee
                staging.credit(call.initiator, reserved - actual_fee)?;
                (FeePayer::Initiator(call.initiator), None)
            }
        };
        staging.collect_fee(actual_fee)?;
        staging.verify_invariants()?;

        let nonce = match nonce {
            Some(current) => {
                let next = current
                    .checked_add(1)
                    .ok_or_else(|| Error::Overflow(format!("nonce of {} overflows", call.initiator)))?;
                Some((call.initiator, next))
            }
            None => None,
        };

        let events = self.sequence(outcome.events);
        let receipt = Receipt {
            receipt_id: Uuid::now_v7(),
            initiator: call.initiator,
            target: call.target,
            operation: call.operation.name().to_string(),
            gas_used,
            fee: actual_fee,
            fee_payer,
            settlement,
            withdrawn: outcome.withdrawn,
            events: events.clone(),
            committed_at: Utc::now(),
        };

        Ok((staging.into_commit(events, nonce), receipt))
    }

    fn execute_operation(staging: &mut Staging<'_>, call: &Call) -> Result<Outcome> {
        let operation = call.operation.name();

        match &call.operation {
            Operation::Token(op) => {
                let events = staging
                    .token_mut(call.target, operation)?
                    .apply(&call.initiator, op)?;
                Ok(Outcome {
                    events,
                    withdrawn: None,
                })
            }
            Operation::Paymaster(op) => {
                let caller = &call.initiator;
                let paymaster = staging.paymaster_mut(call.target, operation)?;

                let swept = match op {
                    PaymasterOp::SetPaymasterEnabled { enabled } => {
                        paymaster.set_paymaster_enabled(caller, *enabled)?;
                        None
                    }
                    PaymasterOp::AddAllowedDestination { accounts } => {
                        paymaster.add_allowed_destination(caller, accounts)?;
                        None
                    }
                    PaymasterOp::RemoveAllowedDestination { accounts } => {
                        paymaster.remove_allowed_destination(caller, accounts)?;
                        None
                    }
                    PaymasterOp::TransferOwnership { new_owner } => {
                        paymaster.transfer_ownership(caller, *new_owner)?;
                        None
                    }
                    PaymasterOp::Withdraw => {
                        let amount = paymaster.withdraw(caller)?;
                        Some((paymaster.owner(), amount))
                    }
                };

                if let Some((owner, amount)) = swept {
                    staging.credit(owner, amount)?;
                }

                Ok(Outcome {
                    events: Vec::new(),
                    withdrawn: swept.map(|(_, amount)| amount),
                })
            }
        }
    }

    /// Assign global sequence numbers following the last committed event
    fn sequence(&self, events: Vec<TransferEvent>) -> Vec<EventRecord> {
        (self.next_sequence..)
            .zip(events)
            .map(|(sequence, event)| EventRecord { sequence, event })
            .collect()
    }

    /// Write staged changes to storage, then to memory
    fn apply(&mut self, commit: Commit) -> Result<()> {
        if let Some(storage) = &self.storage {
            storage.commit(&commit.changes)?;
        }

        let ChangeSet {
            tokens,
            paymasters,
            nonces,
            events,
            next_sequence,
            contract_nonce,
            ..
        } = commit.changes;

        for token in tokens {
            self.state.tokens.insert(token.address(), token);
        }
        for paymaster in paymasters {
            self.metrics
                .set_paymaster_reserve(&paymaster.address(), paymaster.reserved_funds());
            self.state.paymasters.insert(paymaster.address(), paymaster);
        }
        if let Some(bank) = commit.bank {
            self.state.bank = bank;
        }
        self.state.nonces.extend(nonces);
        if self.storage.is_none() {
            self.events.extend(events);
        }
        if let Some(next) = next_sequence {
            self.next_sequence = next;
        }
        if let Some(nonce) = contract_nonce {
            self.contract_nonce = nonce;
        }

        Ok(())
    }

    fn observe(&self, call: &Call, result: Result<Receipt>) -> Result<Receipt> {
        match &result {
            Ok(receipt) => {
                self.metrics.record_call(&receipt.operation, receipt.gas_used);
                if receipt.is_sponsored() {
                    self.metrics.record_sponsored(receipt.fee);
                }
                tracing::debug!(
                    receipt_id = %receipt.receipt_id,
                    initiator = %receipt.initiator,
                    target = %receipt.target,
                    operation = %receipt.operation,
                    gas_used = receipt.gas_used,
                    fee = receipt.fee,
                    sponsored = receipt.is_sponsored(),
                    events = receipt.events.len(),
                    "Call committed"
                );
            }
            Err(err) => {
                let kind = err.kind();
                self.metrics.record_failure(kind);
                if let Some(reason) = err.rejection() {
                    self.metrics.record_rejection(reason.code());
                }
                tracing::warn!(
                    initiator = %call.initiator,
                    target = %call.target,
                    operation = call.operation.name(),
                    kind = kind.as_str(),
                    error = %err,
                    "Call aborted"
                );
            }
        }
        result
    }

    // Reads

    /// Ledger at `address`
    pub fn token(&self, address: &AccountId) -> Option<&TokenLedger> {
        self.state.tokens.get(address)
    }

    /// Policy engine at `address`
    pub fn paymaster(&self, address: &AccountId) -> Option<&Paymaster> {
        self.state.paymasters.get(address)
    }

    /// Token balance of `account` on ledger `token` (zero if either is unknown)
    pub fn token_balance(&self, token: &AccountId, account: &AccountId) -> u128 {
        self.token(token).map_or(0, |ledger| ledger.balance_of(account))
    }

    /// Native balance of `account`
    pub fn native_balance(&self, account: &AccountId) -> NativeAmount {
        self.state.bank.balance_of(account)
    }

    /// Account receiving charged fees
    pub fn fee_collector(&self) -> AccountId {
        self.state.bank.fee_collector()
    }

    /// Next nonce accepted from `account`
    pub fn nonce_of(&self, account: &AccountId) -> u64 {
        self.state.nonces.get(account).copied().unwrap_or(0)
    }

    /// At most `limit` committed events with `sequence >= from`, in order
    pub fn events_since(&self, from: u64, limit: usize) -> Result<Vec<EventRecord>> {
        if let Some(storage) = &self.storage {
            return storage.events_since(from, limit);
        }

        let events = usize::try_from(from)
            .ok()
            .and_then(|start| self.events.get(start..))
            .unwrap_or(&[]);
        Ok(events.iter().take(limit).cloned().collect())
    }

    /// Sequence the next committed event will receive
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Native currency in existence: bank balances plus paymaster funds
    pub fn total_native(&self) -> Option<NativeAmount> {
        self.state
            .paymasters
            .values()
            .map(|paymaster| paymaster.reserved_funds())
            .try_fold(self.state.bank.total()?, |acc, funds| acc.checked_add(funds))
    }

    /// Active gas schedule
    pub fn gas_schedule(&self) -> &GasSchedule {
        &self.gas
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Whether commits reach RocksDB
    pub fn is_durable(&self) -> bool {
        self.storage.is_some()
    }
}

/// Result of the execution phase
struct Outcome {
    events: Vec<TransferEvent>,
    withdrawn: Option<NativeAmount>,
}
