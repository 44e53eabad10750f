//! Property-based tests for the execution environment
//!
//! - Native conservation: bank balances plus paymaster funds never change
//! - Reserve accounting: the reserve moves by exactly the sponsored fees
//! - Atomicity: an aborted call leaves every observable balance unchanged

use executor::{config::GenesisAllocation, Call, Config, Runtime};
use ledger_core::{AccountId, NativeAmount, TokenConfig, TokenOp};
use paymaster::PaymasterOp;
use proptest::prelude::*;

const ACCOUNTS: u8 = 5;

fn account(index: u8) -> AccountId {
    AccountId::from_bytes([index + 1; 20])
}

fn owner() -> AccountId {
    account(0)
}

struct World {
    runtime: Runtime,
    token: AccountId,
    paymaster: AccountId,
}

/// Everyone has native funds; accounts 1 and 2 hold tokens; 3 and 4 are allowed destinations
fn world() -> World {
    let config = Config {
        genesis: (0..ACCOUNTS)
            .map(|index| GenesisAllocation {
                account: account(index),
                amount: 1_000_000_000_000,
            })
            .collect(),
        ..Config::default()
    };

    let mut runtime = Runtime::in_memory(&config).unwrap();
    let token = runtime.deploy_token(owner(), &TokenConfig::default()).unwrap();
    let paymaster = runtime.deploy_paymaster(owner(), token).unwrap();
    runtime.fund_paymaster(owner(), paymaster, 500_000_000).unwrap();

    let setup: Vec<Call> = vec![
        Call::new(owner(), token, TokenOp::Claim { to: account(1), amount: 1_000 }),
        Call::new(owner(), token, TokenOp::Claim { to: account(2), amount: 10 }),
        Call::new(
            owner(),
            paymaster,
            PaymasterOp::AddAllowedDestination {
                accounts: vec![account(3), account(4)],
            },
        ),
        Call::new(owner(), paymaster, PaymasterOp::SetPaymasterEnabled { enabled: true }),
    ];
    for call in setup {
        runtime.execute(call).unwrap();
    }

    World {
        runtime,
        token,
        paymaster,
    }
}

#[derive(Debug, Clone)]
struct Attempt {
    initiator: AccountId,
    to: AccountId,
    amount: u128,
    sponsored: bool,
    gas_limit: u64,
}

fn attempt_strategy() -> impl Strategy<Value = Attempt> {
    (
        (0..ACCOUNTS).prop_map(account),
        (0..ACCOUNTS).prop_map(account),
        prop_oneof![Just(0u128), 1u128..50, 1_000u128..5_000],
        any::<bool>(),
        prop_oneof![Just(100_000u64), 0u64..100_000, 1_000_000u64..10_000_000],
    )
        .prop_map(|(initiator, to, amount, sponsored, gas_limit)| Attempt {
            initiator,
            to,
            amount,
            sponsored,
            gas_limit,
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: native currency is neither created nor destroyed by calls
    #[test]
    fn prop_native_conservation(attempts in prop::collection::vec(attempt_strategy(), 1..25)) {
        let mut w = world();
        let total = w.runtime.total_native();
        prop_assert!(total.is_some());

        for attempt in attempts {
            let mut call = Call::new(
                attempt.initiator,
                w.token,
                TokenOp::Transfer { to: attempt.to, amount: attempt.amount },
            )
            .with_gas_limit(attempt.gas_limit);
            if attempt.sponsored {
                call = call.sponsored_by(w.paymaster);
            }

            let _ = w.runtime.execute(call);
            prop_assert_eq!(w.runtime.total_native(), total);
        }
    }

    /// Property: the reserve drops by exactly the fees of committed sponsored calls
    #[test]
    fn prop_reserve_tracks_sponsored_fees(attempts in prop::collection::vec(attempt_strategy(), 1..25)) {
        let mut w = world();
        let initial = w.runtime.paymaster(&w.paymaster).unwrap().reserved_funds();
        let mut charged: NativeAmount = 0;

        for attempt in attempts {
            let call = Call::new(
                attempt.initiator,
                w.token,
                TokenOp::Transfer { to: attempt.to, amount: attempt.amount },
            )
            .with_gas_limit(attempt.gas_limit)
            .sponsored_by(w.paymaster);

            let payer_native = w.runtime.native_balance(&attempt.initiator);
            let before = w.runtime.paymaster(&w.paymaster).unwrap().clone();

            match w.runtime.execute(call) {
                Ok(receipt) => {
                    prop_assert!(receipt.is_sponsored());
                    charged += receipt.fee;
                    prop_assert_eq!(w.runtime.native_balance(&attempt.initiator), payer_native);
                }
                Err(_) => {
                    prop_assert_eq!(w.runtime.paymaster(&w.paymaster).unwrap(), &before);
                    prop_assert_eq!(w.runtime.native_balance(&attempt.initiator), payer_native);
                }
            }

            let engine = w.runtime.paymaster(&w.paymaster).unwrap();
            prop_assert_eq!(engine.in_flight(), 0);
            prop_assert!(engine.check_funds_conservation());
            prop_assert_eq!(engine.reserved_funds(), initial - charged);
            prop_assert_eq!(engine.total_sponsored(), charged);
        }
    }

    /// Property: token supply is untouched by transfers, accepted or not
    #[test]
    fn prop_transfers_preserve_supply(attempts in prop::collection::vec(attempt_strategy(), 1..25)) {
        let mut w = world();
        let supply = w.runtime.token(&w.token).unwrap().total_supply();

        for attempt in attempts {
            let mut call = Call::new(
                attempt.initiator,
                w.token,
                TokenOp::Transfer { to: attempt.to, amount: attempt.amount },
            )
            .with_gas_limit(attempt.gas_limit);
            if attempt.sponsored {
                call = call.sponsored_by(w.paymaster);
            }
            let _ = w.runtime.execute(call);

            let ledger = w.runtime.token(&w.token).unwrap();
            prop_assert_eq!(ledger.total_supply(), supply);
            prop_assert!(ledger.check_supply_conservation());
        }
    }
}
