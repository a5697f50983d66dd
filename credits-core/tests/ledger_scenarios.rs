//! End-to-end scenarios exercising the full ledger surface

use credits_core::{
    types::{InMemoryDirectory, Opportunity},
    AccountId, Config, CreditLedger, HistoryFilter, IdempotencyKey, PayoutOutcome, PayoutStatus,
    SubscriptionTier, TransactionKind,
};
use std::sync::Arc;
use uuid::Uuid;

fn open_ledger(temp_dir: &tempfile::TempDir) -> CreditLedger {
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();
    CreditLedger::open(config).unwrap()
}

// Fund with a non-earning, non-revenue kind: bypasses the cap and stays out
// of the platform revenue reconciliation
async fn fund(ledger: &CreditLedger, account: &str, amount: i64) {
    ledger
        .credit(
            AccountId::new(account),
            amount,
            TransactionKind::SignupBonus,
            None,
            None,
            IdempotencyKey::generate(),
        )
        .await
        .unwrap();
}

/// Tip then cash out: A tips B 100 credits at the 5% fee, B withdraws the
/// proceeds, and every intermediate balance matches.
#[tokio::test]
async fn tip_then_payout_flow() {
    let temp_dir = tempfile::tempdir().unwrap();
    let ledger = open_ledger(&temp_dir);

    fund(&ledger, "author_a", 200).await;

    let tip = ledger
        .tip(
            AccountId::new("author_a"),
            AccountId::new("author_b"),
            100,
            Some(Uuid::now_v7()),
            Some("great post".to_string()),
            IdempotencyKey::generate(),
        )
        .await
        .unwrap();
    assert_eq!(tip.transfer.net, 95);
    assert_eq!(ledger.get_balance(&AccountId::new("author_a")).await.unwrap(), 100);
    assert_eq!(ledger.get_balance(&AccountId::new("author_b")).await.unwrap(), 95);
    assert_eq!(ledger.platform_revenue().await.unwrap(), 5);

    // 95 is below the 100 minimum
    let err = ledger
        .request_payout(
            AccountId::new("author_b"),
            95,
            "paypal".into(),
            "b@example.com".into(),
            IdempotencyKey::generate(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "validation");

    fund(&ledger, "author_b", 10).await;
    let payout = ledger
        .request_payout(
            AccountId::new("author_b"),
            100,
            "paypal".into(),
            "b@example.com".into(),
            IdempotencyKey::generate(),
        )
        .await
        .unwrap();
    assert_eq!(payout.balance_after, 5);

    let pending = ledger.pending_payouts().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].status, PayoutStatus::Pending);

    ledger.shutdown().await.unwrap();
}

/// Racing unlocks of the same opportunity: exactly one succeeds and the
/// account pays exactly once.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_unlock_single_purchase() {
    let temp_dir = tempfile::tempdir().unwrap();
    let directory = Arc::new(InMemoryDirectory::new());
    let opportunity = Uuid::now_v7();
    directory.put(Opportunity { id: opportunity, is_active: true, credit_cost: 25 });
    let ledger = Arc::new(open_ledger(&temp_dir).with_directory(directory));

    fund(&ledger, "alice", 500).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger
                .unlock(AccountId::new("alice"), opportunity, IdempotencyKey::generate())
                .await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(error) => assert_eq!(error.code(), "already_unlocked"),
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(ledger.get_balance(&AccountId::new("alice")).await.unwrap(), 475);
    assert!(ledger.has_unlocked(&AccountId::new("alice"), opportunity).await.unwrap());

    ledger.shutdown().await.unwrap();
}

/// A rejected payout refunds the hold with a reversal entry; the resolution
/// is terminal either way.
#[tokio::test]
async fn payout_rejection_refunds() {
    let temp_dir = tempfile::tempdir().unwrap();
    let ledger = open_ledger(&temp_dir);

    fund(&ledger, "bob", 400).await;

    let payout = ledger
        .request_payout(
            AccountId::new("bob"),
            300,
            "bank_transfer".into(),
            "DE89370400440532013000".into(),
            IdempotencyKey::generate(),
        )
        .await
        .unwrap();
    assert_eq!(payout.balance_after, 100);

    let resolved = ledger
        .resolve_payout(payout.payout_id, PayoutOutcome::Rejected)
        .await
        .unwrap();
    assert_eq!(resolved.status, PayoutStatus::Rejected);
    assert!(resolved.processed_at.is_some());
    assert_eq!(ledger.get_balance(&AccountId::new("bob")).await.unwrap(), 400);

    let history = ledger
        .get_transaction_history(&AccountId::new("bob"), &HistoryFilter::default(), 10)
        .await
        .unwrap();
    assert_eq!(history[0].kind, TransactionKind::PayoutReversal);
    assert_eq!(history[0].amount, 300);

    // Terminal: a second resolution of either outcome fails
    let err = ledger
        .resolve_payout(payout.payout_id, PayoutOutcome::Processed)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "payout_already_resolved");
    assert_eq!(ledger.get_balance(&AccountId::new("bob")).await.unwrap(), 400);

    ledger.shutdown().await.unwrap();
}

/// Subscribing again after cancelling reactivates the same row and charges
/// the new tier price.
#[tokio::test]
async fn resubscribe_reactivates() {
    let temp_dir = tempfile::tempdir().unwrap();
    let ledger = open_ledger(&temp_dir);

    fund(&ledger, "fan", 500).await;

    let first = ledger
        .subscribe(
            AccountId::new("fan"),
            AccountId::new("creator"),
            SubscriptionTier::Basic,
            IdempotencyKey::generate(),
        )
        .await
        .unwrap();

    ledger
        .cancel_subscription(AccountId::new("fan"), AccountId::new("creator"))
        .await
        .unwrap();

    let second = ledger
        .subscribe(
            AccountId::new("fan"),
            AccountId::new("creator"),
            SubscriptionTier::Premium,
            IdempotencyKey::generate(),
        )
        .await
        .unwrap();
    assert_eq!(second.subscription_id, first.subscription_id);
    assert_eq!(second.transfer.gross, 100);

    // 50 + 100 charged in total
    assert_eq!(ledger.get_balance(&AccountId::new("fan")).await.unwrap(), 350);
    // Creator nets 45 + 90
    assert_eq!(ledger.get_balance(&AccountId::new("creator")).await.unwrap(), 135);

    ledger.shutdown().await.unwrap();
}

/// Everything survives a restart: balances, history, unlocks, and pending
/// payout requests.
#[tokio::test]
async fn state_survives_restart() {
    let temp_dir = tempfile::tempdir().unwrap();
    let directory = Arc::new(InMemoryDirectory::new());
    let opportunity = Uuid::now_v7();
    directory.put(Opportunity { id: opportunity, is_active: true, credit_cost: 10 });

    let payout_id;
    {
        let ledger = open_ledger(&temp_dir).with_directory(directory.clone());
        fund(&ledger, "alice", 300).await;
        ledger
            .unlock(AccountId::new("alice"), opportunity, IdempotencyKey::generate())
            .await
            .unwrap();
        payout_id = ledger
            .request_payout(
                AccountId::new("alice"),
                150,
                "paypal".into(),
                "a@example.com".into(),
                IdempotencyKey::generate(),
            )
            .await
            .unwrap()
            .payout_id;
        ledger.shutdown().await.unwrap();
    }

    let ledger = open_ledger(&temp_dir).with_directory(directory);
    assert_eq!(ledger.get_balance(&AccountId::new("alice")).await.unwrap(), 140);
    assert!(ledger.has_unlocked(&AccountId::new("alice"), opportunity).await.unwrap());

    let pending = ledger.pending_payouts().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].payout_id, payout_id);

    let history = ledger
        .get_transaction_history(&AccountId::new("alice"), &HistoryFilter::default(), 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 3);

    // The unlock gate still holds across the restart
    let err = ledger
        .unlock(AccountId::new("alice"), opportunity, IdempotencyKey::generate())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "already_unlocked");

    ledger.shutdown().await.unwrap();
}
