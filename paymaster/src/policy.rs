//! Sponsorship policy and funds accounting

use crate::{
    types::{Decision, RejectReason, Reservation, Settlement, SponsorshipRequest},
    Error, Result,
};
use ledger_core::{
    error::{NOT_OWNER, ZERO_OWNER},
    AccountId, Amount, NativeAmount, TokenLedger, TokenOp,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Read-only view of the ledger a paymaster sponsors
pub trait SponsoredToken {
    /// Contract address of the ledger
    fn address(&self) -> AccountId;

    /// Token name, used in the not-a-holder rejection
    fn name(&self) -> &str;

    /// Balance of `account`
    fn balance_of(&self, account: &AccountId) -> Amount;
}

impl SponsoredToken for TokenLedger {
    fn address(&self) -> AccountId {
        TokenLedger::address(self)
    }

    fn name(&self) -> &str {
        TokenLedger::name(self)
    }

    fn balance_of(&self, account: &AccountId) -> Amount {
        TokenLedger::balance_of(self, account)
    }
}

/// Fee-sponsorship policy engine bound to one token ledger
///
/// Funds identity, holding at every commit point:
/// `total_deposited == reserved_funds + in_flight + total_sponsored + total_withdrawn`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paymaster {
    /// Contract address of this engine
    address: AccountId,

    /// Privileged account
    owner: AccountId,

    /// The only ledger this engine sponsors (immutable)
    sponsor_token: AccountId,

    /// Recipients eligible for sponsored transfers
    allowed_destinations: BTreeSet<AccountId>,

    /// Master switch (off at deploy)
    enabled: bool,

    /// Native funds available for new reservations
    reserved_funds: NativeAmount,

    /// Funds earmarked by open reservations
    in_flight: NativeAmount,

    /// Lifetime deposits
    total_deposited: NativeAmount,

    /// Lifetime fees paid on behalf of payers
    total_sponsored: NativeAmount,

    /// Lifetime withdrawals
    total_withdrawn: NativeAmount,

    /// Number of settled sponsorships
    sponsored_count: u64,
}

impl Paymaster {
    /// Deploy a disabled, unfunded engine bound to `sponsor_token`
    pub fn deploy(address: AccountId, owner: AccountId, sponsor_token: AccountId) -> Self {
        tracing::info!(
            paymaster = %address,
            owner = %owner,
            sponsor_token = %sponsor_token,
            "Paymaster deployed"
        );

        Self {
            address,
            owner,
            sponsor_token,
            allowed_destinations: BTreeSet::new(),
            enabled: false,
            reserved_funds: 0,
            in_flight: 0,
            total_deposited: 0,
            total_sponsored: 0,
            total_withdrawn: 0,
            sponsored_count: 0,
        }
    }

    // Read accessors

    /// Contract address
    pub fn address(&self) -> AccountId {
        self.address
    }

    /// Current owner
    pub fn owner(&self) -> AccountId {
        self.owner
    }

    /// Sponsored ledger
    pub fn sponsor_token(&self) -> AccountId {
        self.sponsor_token
    }

    /// Whether sponsorship is switched on
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether `account` may receive sponsored transfers
    pub fn is_allowed_destination(&self, account: &AccountId) -> bool {
        self.allowed_destinations.contains(account)
    }

    /// Funds available for new reservations
    pub fn reserved_funds(&self) -> NativeAmount {
        self.reserved_funds
    }

    /// Funds earmarked by open reservations
    pub fn in_flight(&self) -> NativeAmount {
        self.in_flight
    }

    /// Lifetime fees paid on behalf of payers
    pub fn total_sponsored(&self) -> NativeAmount {
        self.total_sponsored
    }

    /// Number of settled sponsorships
    pub fn sponsored_count(&self) -> u64 {
        self.sponsored_count
    }

    /// Check the funds identity
    pub fn check_funds_conservation(&self) -> bool {
        [self.in_flight, self.total_sponsored, self.total_withdrawn]
            .iter()
            .try_fold(self.reserved_funds, |acc, v| acc.checked_add(*v))
            == Some(self.total_deposited)
    }

    // Owner operations

    /// Switch sponsorship on or off
    pub fn set_paymaster_enabled(&mut self, caller: &AccountId, enabled: bool) -> Result<()> {
        self.require_owner(caller)?;
        self.enabled = enabled;
        tracing::info!(paymaster = %self.address, enabled, "Paymaster switch changed");
        Ok(())
    }

    /// Extend the destination allowlist (idempotent)
    pub fn add_allowed_destination(&mut self, caller: &AccountId, accounts: &[AccountId]) -> Result<()> {
        self.require_owner(caller)?;
        self.allowed_destinations.extend(accounts.iter().copied());
        Ok(())
    }

    /// Shrink the destination allowlist (idempotent)
    pub fn remove_allowed_destination(&mut self, caller: &AccountId, accounts: &[AccountId]) -> Result<()> {
        self.require_owner(caller)?;
        for account in accounts {
            self.allowed_destinations.remove(account);
        }
        Ok(())
    }

    /// Sweep all available funds; returns the amount owed to the owner
    pub fn withdraw(&mut self, caller: &AccountId) -> Result<NativeAmount> {
        self.require_owner(caller)?;

        let amount = self.reserved_funds;
        let total_withdrawn = self
            .total_withdrawn
            .checked_add(amount)
            .ok_or_else(|| Error::Overflow("total withdrawn overflows".to_string()))?;

        self.reserved_funds = 0;
        self.total_withdrawn = total_withdrawn;

        tracing::info!(paymaster = %self.address, owner = %self.owner, amount, "Funds withdrawn");
        Ok(amount)
    }

    /// Hand over ownership
    pub fn transfer_ownership(&mut self, caller: &AccountId, new_owner: AccountId) -> Result<()> {
        self.require_owner(caller)?;
        if new_owner.is_zero() {
            return Err(Error::InvalidArgument(ZERO_OWNER.to_string()));
        }
        self.owner = new_owner;
        Ok(())
    }

    /// Add externally supplied native funds
    pub fn deposit(&mut self, amount: NativeAmount) -> Result<()> {
        let reserved_funds = self.reserved_funds.checked_add(amount);
        let total_deposited = self.total_deposited.checked_add(amount);

        match (reserved_funds, total_deposited) {
            (Some(funds), Some(total)) => {
                self.reserved_funds = funds;
                self.total_deposited = total;
                tracing::debug!(paymaster = %self.address, amount, funds, "Paymaster funded");
                Ok(())
            }
            _ => Err(Error::Overflow("paymaster funds overflow".to_string())),
        }
    }

    // Sponsorship

    /// Decide whether to cover the fee of `request`
    ///
    /// Checks run in a fixed order and stop at the first failure:
    /// enabled, target, destination, amount, holder, then reserve. A
    /// rejection leaves the engine unchanged; an acceptance moves
    /// `request.max_fee` from the available funds into the reservation.
    pub fn validate_sponsorship(
        &mut self,
        request: &SponsorshipRequest<'_>,
        token: &dyn SponsoredToken,
    ) -> Decision {
        let outcome = self
            .check_eligibility(request, token)
            .and_then(|()| self.reserve(request));

        match outcome {
            Ok(reservation) => {
                tracing::debug!(
                    paymaster = %self.address,
                    payer = %request.payer,
                    reservation_id = %reservation.id(),
                    reserved = reservation.amount(),
                    "Sponsorship accepted"
                );
                Decision::Accept(reservation)
            }
            Err(reason) => {
                tracing::warn!(
                    paymaster = %self.address,
                    payer = %request.payer,
                    target = %request.target,
                    reason = reason.code(),
                    "Sponsorship rejected"
                );
                Decision::Reject(reason)
            }
        }
    }

    /// Close out a reservation once the actual fee is known
    ///
    /// The unused part returns to the available funds exactly.
    pub fn settle(&mut self, reservation: Reservation, actual_fee: NativeAmount) -> Result<Settlement> {
        self.require_own_reservation(&reservation)?;

        let reserved = reservation.amount();
        if actual_fee > reserved {
            return Err(Error::Settlement(format!(
                "actual fee {} exceeds reservation {} of {}",
                actual_fee,
                reserved,
                reservation.id()
            )));
        }

        let refunded = reserved - actual_fee;
        let total_sponsored = self
            .total_sponsored
            .checked_add(actual_fee)
            .ok_or_else(|| Error::Overflow("total sponsored overflows".to_string()))?;

        self.in_flight -= reserved;
        self.reserved_funds += refunded;
        self.total_sponsored = total_sponsored;
        self.sponsored_count += 1;

        tracing::debug!(
            paymaster = %self.address,
            reservation_id = %reservation.id(),
            charged = actual_fee,
            refunded,
            "Reservation settled"
        );

        Ok(Settlement {
            reservation_id: reservation.id(),
            reserved,
            charged: actual_fee,
            refunded,
        })
    }

    /// Return the whole reservation (the sponsored call did not run)
    pub fn release(&mut self, reservation: Reservation) -> Result<Settlement> {
        self.require_own_reservation(&reservation)?;

        let reserved = reservation.amount();
        self.in_flight -= reserved;
        self.reserved_funds += reserved;

        Ok(Settlement {
            reservation_id: reservation.id(),
            reserved,
            charged: 0,
            refunded: reserved,
        })
    }

    fn check_eligibility(
        &self,
        request: &SponsorshipRequest<'_>,
        token: &dyn SponsoredToken,
    ) -> std::result::Result<(), RejectReason> {
        // Check 1: switch
        if !self.enabled {
            return Err(RejectReason::PolicyDisabled);
        }

        // Check 2: target is the sponsored ledger
        if request.target != self.sponsor_token || token.address() != self.sponsor_token {
            return Err(RejectReason::UnsupportedTarget);
        }

        // Check 3: transfer to an allowed destination
        let (destination, amount) = request
            .operation
            .and_then(TokenOp::as_transfer)
            .ok_or(RejectReason::UnsupportedDestination)?;
        if !self.allowed_destinations.contains(destination) {
            return Err(RejectReason::UnsupportedDestination);
        }

        // Check 4: non-zero amount
        if amount == 0 {
            return Err(RejectReason::ZeroAmountRejected);
        }

        // Check 5: payer holds the token
        if token.balance_of(&request.payer) == 0 {
            return Err(RejectReason::NotAHolder {
                token_name: token.name().to_string(),
            });
        }

        Ok(())
    }

    fn reserve(&mut self, request: &SponsorshipRequest<'_>) -> std::result::Result<Reservation, RejectReason> {
        if self.reserved_funds < request.max_fee {
            return Err(RejectReason::InsufficientReserve {
                available: self.reserved_funds,
                required: request.max_fee,
            });
        }

        // in_flight + reserved_funds never exceeds total_deposited, so no overflow
        self.reserved_funds -= request.max_fee;
        self.in_flight += request.max_fee;

        Ok(Reservation::new(self.address, request.payer, request.max_fee))
    }

    fn require_owner(&self, caller: &AccountId) -> Result<()> {
        if *caller != self.owner {
            return Err(Error::Unauthorized(NOT_OWNER.to_string()));
        }
        Ok(())
    }

    fn require_own_reservation(&self, reservation: &Reservation) -> Result<()> {
        if reservation.paymaster() != self.address || reservation.amount() > self.in_flight {
            return Err(Error::Settlement(format!(
                "reservation {} is not open on paymaster {}",
                reservation.id(),
                self.address
            )));
        }
        Ok(())
    }
}
