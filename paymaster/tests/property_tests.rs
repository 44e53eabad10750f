//! Property-based tests for the sponsorship engine
//!
//! - Funds identity: deposited == available + in flight + sponsored + withdrawn
//! - Rejections leave the engine untouched
//! - Check order: the earliest failing check names the rejection

use ledger_core::{AccountId, NativeAmount, TokenConfig, TokenLedger, TokenOp};
use paymaster::{Decision, Paymaster, RejectReason, SponsorshipRequest};
use proptest::prelude::*;

const ACCOUNTS: u8 = 5;

fn account(index: u8) -> AccountId {
    AccountId::from_bytes([index + 1; 20])
}

fn owner() -> AccountId {
    account(0)
}

/// Accounts 1 and 2 hold tokens; accounts 3 and 4 are allowed destinations
fn setup() -> (TokenLedger, Paymaster) {
    let (mut token, _) =
        TokenLedger::deploy(AccountId::from_bytes([0xaa; 20]), owner(), &TokenConfig::default())
            .unwrap();
    token.claim(&owner(), account(1), 500).unwrap();
    token.claim(&owner(), account(2), 1).unwrap();

    let mut paymaster = Paymaster::deploy(AccountId::from_bytes([0xbb; 20]), owner(), token.address());
    paymaster
        .add_allowed_destination(&owner(), &[account(3), account(4)])
        .unwrap();
    paymaster.set_paymaster_enabled(&owner(), true).unwrap();
    (token, paymaster)
}

#[derive(Debug, Clone)]
enum Step {
    Deposit(NativeAmount),
    Sponsor {
        payer: AccountId,
        to: AccountId,
        amount: u128,
        max_fee: NativeAmount,
        /// Percentage of the bound actually charged; `None` aborts
        charged_pct: Option<u8>,
    },
    Toggle(bool),
    Withdraw,
}

fn account_strategy() -> impl Strategy<Value = AccountId> {
    (0..ACCOUNTS).prop_map(account)
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0u128..1_000_000).prop_map(Step::Deposit),
        (
            account_strategy(),
            account_strategy(),
            prop_oneof![Just(0u128), 1u128..1_000],
            0u128..200_000,
            prop::option::of(0u8..=100),
        )
            .prop_map(|(payer, to, amount, max_fee, charged_pct)| Step::Sponsor {
                payer,
                to,
                amount,
                max_fee,
                charged_pct,
            }),
        any::<bool>().prop_map(Step::Toggle),
        Just(Step::Withdraw),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: the funds identity holds and nothing stays in flight after each step
    #[test]
    fn prop_funds_identity(steps in prop::collection::vec(step_strategy(), 1..40)) {
        let (token, mut paymaster) = setup();

        for step in steps {
            match step {
                Step::Deposit(amount) => paymaster.deposit(amount).unwrap(),
                Step::Toggle(enabled) => paymaster.set_paymaster_enabled(&owner(), enabled).unwrap(),
                Step::Withdraw => {
                    let before = paymaster.reserved_funds();
                    prop_assert_eq!(paymaster.withdraw(&owner()).unwrap(), before);
                    prop_assert_eq!(paymaster.reserved_funds(), 0);
                }
                Step::Sponsor { payer, to, amount, max_fee, charged_pct } => {
                    let op = TokenOp::Transfer { to, amount };
                    let request = SponsorshipRequest {
                        payer,
                        target: token.address(),
                        operation: Some(&op),
                        max_fee,
                    };
                    let available = paymaster.reserved_funds();

                    if let Decision::Accept(reservation) = paymaster.validate_sponsorship(&request, &token) {
                        prop_assert_eq!(reservation.amount(), max_fee);
                        prop_assert_eq!(paymaster.in_flight(), max_fee);
                        prop_assert!(paymaster.check_funds_conservation());

                        match charged_pct {
                            Some(pct) => {
                                let fee = max_fee * NativeAmount::from(pct) / 100;
                                let settlement = paymaster.settle(reservation, fee).unwrap();
                                prop_assert_eq!(settlement.charged, fee);
                                prop_assert_eq!(settlement.charged + settlement.refunded, max_fee);
                                prop_assert_eq!(paymaster.reserved_funds(), available - fee);
                            }
                            None => {
                                paymaster.release(reservation).unwrap();
                                prop_assert_eq!(paymaster.reserved_funds(), available);
                            }
                        }
                    }
                }
            }

            prop_assert_eq!(paymaster.in_flight(), 0);
            prop_assert!(paymaster.check_funds_conservation());
        }
    }

    /// Property: a rejected request changes nothing
    #[test]
    fn prop_rejection_is_side_effect_free(
        payer in account_strategy(),
        to in account_strategy(),
        amount in prop_oneof![Just(0u128), 1u128..1_000],
        funds in 0u128..10_000,
        max_fee in 0u128..20_000,
        enabled in any::<bool>(),
    ) {
        let (token, mut paymaster) = setup();
        paymaster.deposit(funds).unwrap();
        paymaster.set_paymaster_enabled(&owner(), enabled).unwrap();
        let before = paymaster.clone();

        let op = TokenOp::Transfer { to, amount };
        let request = SponsorshipRequest {
            payer,
            target: token.address(),
            operation: Some(&op),
            max_fee,
        };

        match paymaster.validate_sponsorship(&request, &token) {
            Decision::Reject(_) => prop_assert_eq!(&paymaster, &before),
            Decision::Accept(reservation) => {
                paymaster.release(reservation).unwrap();
                prop_assert_eq!(paymaster.reserved_funds(), before.reserved_funds());
            }
        }
    }

    /// Property: the first failing check in order decides the reason
    #[test]
    fn prop_check_order(
        payer in account_strategy(),
        to in account_strategy(),
        amount in prop_oneof![Just(0u128), 1u128..1_000],
        funds in 0u128..10_000,
        max_fee in 0u128..20_000,
        enabled in any::<bool>(),
        right_target in any::<bool>(),
    ) {
        let (token, mut paymaster) = setup();
        paymaster.deposit(funds).unwrap();
        paymaster.set_paymaster_enabled(&owner(), enabled).unwrap();

        let target = if right_target { token.address() } else { AccountId::from_bytes([0xcc; 20]) };
        let op = TokenOp::Transfer { to, amount };
        let request = SponsorshipRequest {
            payer,
            target,
            operation: Some(&op),
            max_fee,
        };

        let expected = if !enabled {
            Some(RejectReason::PolicyDisabled)
        } else if !right_target {
            Some(RejectReason::UnsupportedTarget)
        } else if !paymaster.is_allowed_destination(&to) {
            Some(RejectReason::UnsupportedDestination)
        } else if amount == 0 {
            Some(RejectReason::ZeroAmountRejected)
        } else if token.balance_of(&payer) == 0 {
            Some(RejectReason::NotAHolder { token_name: token.name().to_string() })
        } else if funds < max_fee {
            Some(RejectReason::InsufficientReserve { available: funds, required: max_fee })
        } else {
            None
        };

        match paymaster.validate_sponsorship(&request, &token) {
            Decision::Reject(reason) => prop_assert_eq!(Some(reason), expected),
            Decision::Accept(reservation) => {
                prop_assert_eq!(expected, None);
                paymaster.release(reservation).unwrap();
            }
        }
    }
}

#[test]
fn test_non_token_operation_rejected_as_destination() {
    let (token, mut paymaster) = setup();
    paymaster.deposit(10_000).unwrap();

    let request = SponsorshipRequest {
        payer: account(1),
        target: token.address(),
        operation: None,
        max_fee: 1_000,
    };

    match paymaster.validate_sponsorship(&request, &token) {
        Decision::Reject(reason) => assert_eq!(reason, RejectReason::UnsupportedDestination),
        Decision::Accept(r) => panic!("expected rejection, got {:?}", r),
    }
}

#[test]
fn test_mint_operation_rejected_as_destination() {
    let (token, mut paymaster) = setup();
    paymaster.deposit(10_000).unwrap();

    let op = TokenOp::Mint {
        to: account(3),
        amount: 10,
    };
    let request = SponsorshipRequest {
        payer: account(1),
        target: token.address(),
        operation: Some(&op),
        max_fee: 1_000,
    };

    match paymaster.validate_sponsorship(&request, &token) {
        Decision::Reject(reason) => assert_eq!(reason, RejectReason::UnsupportedDestination),
        Decision::Accept(r) => panic!("expected rejection, got {:?}", r),
    }
    assert_eq!(paymaster.reserved_funds(), 10_000);
}
