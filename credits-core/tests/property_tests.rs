//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Balances never go negative, no matter the operation sequence
//! - Transfers conserve value: gross == net + fee, fee is platform revenue
//! - The monthly cap bounds cap-counted earnings under either policy
//! - The transaction log always sums to the live balance
//! - Idempotency tokens make retries apply at most once

use credits_core::{
    AccountId, CapPolicy, Config, CreditLedger, HistoryFilter, IdempotencyKey, TransactionKind,
};
use proptest::prelude::*;
use rust_decimal::Decimal;

fn create_test_ledger(configure: impl FnOnce(&mut Config)) -> (CreditLedger, tempfile::TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();
    configure(&mut config);
    // The tempdir must outlive the ledger, so it is returned to the caller
    (CreditLedger::open(config).unwrap(), temp_dir)
}

/// One step of a random single-account workload
#[derive(Debug, Clone)]
enum Op {
    Credit(i64),
    Debit(i64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1i64..200).prop_map(Op::Credit),
        (1i64..200).prop_map(Op::Debit),
    ]
}

fn fee_rate_strategy() -> impl Strategy<Value = Decimal> {
    // Hundredths in [0, 1): covers the tip and subscription rates and more
    (0u32..100).prop_map(|hundredths| Decimal::new(hundredths as i64, 2))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: no operation sequence can drive a balance negative, and a
    /// failed debit changes nothing.
    #[test]
    fn prop_balance_never_negative(ops in prop::collection::vec(op_strategy(), 1..30)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _temp) = create_test_ledger(|config| {
                config.limits.monthly_earning_cap = i64::MAX;
            });
            let account = AccountId::new("alice");
            let mut expected = 0i64;

            for op in &ops {
                match *op {
                    Op::Credit(amount) => {
                        let receipt = ledger
                            .credit(
                                account.clone(),
                                amount,
                                TransactionKind::Post,
                                None,
                                None,
                                IdempotencyKey::generate(),
                            )
                            .await
                            .unwrap();
                        expected += amount;
                        prop_assert_eq!(receipt.balance_after, expected);
                    }
                    Op::Debit(amount) => {
                        let result = ledger
                            .debit(
                                account.clone(),
                                amount,
                                TransactionKind::OpportunityUnlock,
                                None,
                                None,
                                IdempotencyKey::generate(),
                            )
                            .await;
                        if amount <= expected {
                            expected -= amount;
                            prop_assert_eq!(result.unwrap().balance_after, expected);
                        } else {
                            prop_assert_eq!(result.unwrap_err().code(), "insufficient_balance");
                        }
                    }
                }
                let balance = ledger.get_balance(&account).await.unwrap();
                prop_assert!(balance >= 0);
                prop_assert_eq!(balance, expected);
            }

            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }

    /// Property: a transfer debits exactly the gross, credits exactly the
    /// floored net, and the difference is the fee.
    #[test]
    fn prop_transfer_conserves_value(
        gross in 1i64..10_000,
        fee_rate in fee_rate_strategy(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _temp) = create_test_ledger(|_| {});
            let alice = AccountId::new("alice");
            let bob = AccountId::new("bob");

            // Non-revenue funding kind keeps the revenue assertion exact
            ledger
                .credit(
                    alice.clone(),
                    gross,
                    TransactionKind::SignupBonus,
                    None,
                    None,
                    IdempotencyKey::generate(),
                )
                .await
                .unwrap();

            let receipt = ledger
                .transfer(credits_core::actor::TransferParams {
                    payer: alice.clone(),
                    payee: bob.clone(),
                    gross,
                    fee_rate,
                    payer_kind: TransactionKind::TipSent,
                    payee_kind: TransactionKind::TipReceived,
                    related_entity: None,
                    description: None,
                    idempotency: IdempotencyKey::generate(),
                })
                .await
                .unwrap();

            prop_assert_eq!(receipt.gross, gross);
            prop_assert_eq!(receipt.gross, receipt.net + receipt.fee);
            prop_assert!(receipt.fee >= 0);
            prop_assert!(receipt.net >= 0);

            // Floored net, never rounded up
            let exact = Decimal::from(gross) * (Decimal::ONE - fee_rate);
            prop_assert!(Decimal::from(receipt.net) <= exact);
            prop_assert!(exact - Decimal::from(receipt.net) < Decimal::ONE);

            prop_assert_eq!(ledger.get_balance(&alice).await.unwrap(), 0);
            prop_assert_eq!(ledger.get_balance(&bob).await.unwrap(), receipt.net);
            prop_assert_eq!(ledger.platform_revenue().await.unwrap(), receipt.fee);

            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }

    /// Property: under the rejecting policy, cap-counted earnings in one
    /// period never exceed the cap; every grant is all-or-nothing.
    #[test]
    fn prop_cap_bounds_earnings_reject(
        amounts in prop::collection::vec(1i64..60, 1..20),
        cap in 50i64..200,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _temp) = create_test_ledger(|config| {
                config.limits.monthly_earning_cap = cap;
                config.limits.cap_policy = CapPolicy::Reject;
            });
            let account = AccountId::new("alice");
            let mut earned = 0i64;

            for &amount in &amounts {
                let result = ledger
                    .credit(
                        account.clone(),
                        amount,
                        TransactionKind::Post,
                        None,
                        None,
                        IdempotencyKey::generate(),
                    )
                    .await;
                match result {
                    Ok(receipt) => {
                        prop_assert_eq!(receipt.granted, amount);
                        earned += amount;
                    }
                    Err(error) => {
                        prop_assert_eq!(error.code(), "cap_exceeded");
                        prop_assert!(earned + amount > cap);
                    }
                }
                prop_assert!(earned <= cap);
            }
            prop_assert_eq!(ledger.get_balance(&account).await.unwrap(), earned);

            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }

    /// Property: under the clamping policy, earnings land exactly on the cap
    /// and never overshoot.
    #[test]
    fn prop_cap_bounds_earnings_clamp(
        amounts in prop::collection::vec(1i64..60, 1..20),
        cap in 50i64..200,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _temp) = create_test_ledger(|config| {
                config.limits.monthly_earning_cap = cap;
                config.limits.cap_policy = CapPolicy::Clamp;
            });
            let account = AccountId::new("alice");
            let mut earned = 0i64;

            for &amount in &amounts {
                let result = ledger
                    .credit(
                        account.clone(),
                        amount,
                        TransactionKind::CheckIn,
                        None,
                        None,
                        IdempotencyKey::generate(),
                    )
                    .await;
                match result {
                    Ok(receipt) => {
                        prop_assert!(receipt.granted <= amount);
                        prop_assert!(receipt.granted > 0);
                        earned += receipt.granted;
                    }
                    Err(error) => {
                        // Only fails once the allowance is fully exhausted
                        prop_assert_eq!(error.code(), "cap_exceeded");
                        prop_assert_eq!(earned, cap);
                    }
                }
                prop_assert!(earned <= cap);
            }

            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }

    /// Property: the exported log always sums to the live balance.
    #[test]
    fn prop_log_sums_to_balance(ops in prop::collection::vec(op_strategy(), 1..25)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _temp) = create_test_ledger(|config| {
                config.limits.monthly_earning_cap = i64::MAX;
            });
            let account = AccountId::new("alice");

            for op in &ops {
                match *op {
                    Op::Credit(amount) => {
                        ledger
                            .credit(
                                account.clone(),
                                amount,
                                TransactionKind::Rating,
                                None,
                                None,
                                IdempotencyKey::generate(),
                            )
                            .await
                            .unwrap();
                    }
                    Op::Debit(amount) => {
                        // Over-balance debits fail and append nothing
                        let _ = ledger
                            .debit(
                                account.clone(),
                                amount,
                                TransactionKind::OpportunityUnlock,
                                None,
                                None,
                                IdempotencyKey::generate(),
                            )
                            .await;
                    }
                }
            }

            let rows = ledger
                .export_transactions(&account, &HistoryFilter::default())
                .await
                .unwrap();
            let logged: i64 = rows.iter().map(|row| row.amount).sum();
            prop_assert_eq!(logged, ledger.get_balance(&account).await.unwrap());

            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }

    /// Property: replaying one token any number of times applies the
    /// mutation exactly once and always returns the original receipt.
    #[test]
    fn prop_idempotent_replay(amount in 1i64..500, replays in 1usize..6) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _temp) = create_test_ledger(|config| {
                config.limits.monthly_earning_cap = i64::MAX;
            });
            let account = AccountId::new("alice");
            let key = IdempotencyKey::generate();

            let first = ledger
                .credit(
                    account.clone(),
                    amount,
                    TransactionKind::Post,
                    None,
                    None,
                    key,
                )
                .await
                .unwrap();

            for _ in 0..replays {
                let replayed = ledger
                    .credit(
                        account.clone(),
                        amount,
                        TransactionKind::Post,
                        None,
                        None,
                        key,
                    )
                    .await
                    .unwrap();
                prop_assert_eq!(&replayed, &first);
            }

            prop_assert_eq!(ledger.get_balance(&account).await.unwrap(), amount);
            let history = ledger
                .get_transaction_history(&account, &HistoryFilter::default(), 100)
                .await
                .unwrap();
            prop_assert_eq!(history.len(), 1);

            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }
}
