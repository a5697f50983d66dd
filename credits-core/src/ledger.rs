//! Credit ledger facade
//!
//! [`CreditLedger`] is the public surface of the crate: it validates inputs,
//! routes every mutation through the single-writer actor, serves reads
//! straight from storage, and fires post-commit notifications.

use crate::{
    actor::{
        spawn_ledger_actor, CreditParams, DebitParams, LedgerHandle, PayoutParams,
        SubscribeParams, TipParams, TransferParams, UnlockParams,
    },
    cap::PERIOD_DAYS,
    metrics::Metrics,
    types::{
        Account, AccountId, CreditReceipt, CreditStats, DebitReceipt, ExportRow, HistoryFilter,
        IdempotencyKey, NotificationDispatcher, NotificationKind, OpportunityDirectory,
        PayoutOutcome, PayoutReceipt, PayoutRequest, PayoutStatus, Subscription,
        SubscriptionReceipt, SubscriptionTier, TipReceipt, TransactionEntry, TransactionKind,
        TransferReceipt, UnlockReceipt,
    },
    Config, Error, Result, Storage,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Transaction kinds whose entry amounts net out to platform revenue.
///
/// A transfer pair sums to minus the fee; an unlock debit has no payee at
/// all. Payout holds are disbursements, not revenue, and are excluded.
const REVENUE_KINDS: [TransactionKind; 5] = [
    TransactionKind::TipSent,
    TransactionKind::TipReceived,
    TransactionKind::Subscription,
    TransactionKind::SubscriptionEarnings,
    TransactionKind::OpportunityUnlock,
];

/// The credit ledger service
pub struct CreditLedger {
    storage: Arc<Storage>,
    handle: LedgerHandle,
    metrics: Arc<Metrics>,
    config: Config,
    directory: Option<Arc<dyn OpportunityDirectory>>,
    notifier: Option<Arc<dyn NotificationDispatcher>>,
}

impl CreditLedger {
    /// Open the ledger at the configured data directory and start the writer
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let storage = Arc::new(Storage::open(&config)?);
        let metrics = Arc::new(Metrics::new()?);
        let handle = spawn_ledger_actor(storage.clone(), &config);

        metrics
            .pending_payouts
            .set(storage.pending_payouts()?.len() as i64);

        tracing::info!(
            data_dir = %config.data_dir.display(),
            cap = config.limits.monthly_earning_cap,
            "Credit ledger opened"
        );
        Ok(Self {
            storage,
            handle,
            metrics,
            config,
            directory: None,
            notifier: None,
        })
    }

    /// Attach the opportunity directory used by [`CreditLedger::unlock`]
    pub fn with_directory(mut self, directory: Arc<dyn OpportunityDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Attach a post-commit notification sink
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationDispatcher>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Metrics handle
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    fn track<T>(&self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.metrics.record_rejection();
        }
        result
    }

    fn notify(&self, account: &AccountId, kind: NotificationKind, payload: serde_json::Value) {
        if let Some(notifier) = &self.notifier {
            if let Err(error) = notifier.dispatch(account, kind, payload) {
                // Never let a notification failure surface to the caller;
                // the financial commit already happened.
                tracing::warn!(account = %account, ?kind, %error, "Notification dispatch failed");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Accounts
    // -----------------------------------------------------------------------

    /// Ensure an account exists, applying the configured signup bonus once
    pub async fn register_account(&self, account_id: AccountId) -> Result<Account> {
        self.track(account_id.validate())?;
        let result = self.handle.register(account_id).await;
        self.track(result)
    }

    /// Current balance
    pub async fn get_balance(&self, account_id: &AccountId) -> Result<i64> {
        Ok(self.get_account(account_id).await?.balance)
    }

    /// Full account row
    pub async fn get_account(&self, account_id: &AccountId) -> Result<Account> {
        account_id.validate()?;
        self.storage
            .get_account(account_id)?
            .ok_or_else(|| Error::AccountNotFound(account_id.to_string()))
    }

    // -----------------------------------------------------------------------
    // Credits and debits
    // -----------------------------------------------------------------------

    /// Grant credits to an account.
    ///
    /// Earning kinds (posts, ratings, check-ins) run through the monthly cap;
    /// every other kind bypasses it.
    pub async fn credit(
        &self,
        account_id: AccountId,
        amount: i64,
        kind: TransactionKind,
        related_entity: Option<Uuid>,
        description: Option<String>,
        idempotency: IdempotencyKey,
    ) -> Result<CreditReceipt> {
        self.track(account_id.validate())?;
        let result = self
            .handle
            .credit(CreditParams {
                account_id,
                amount,
                kind,
                related_entity,
                description,
                idempotency,
            })
            .await;
        let applied = self.track(result)?;
        if !applied.replayed {
            self.metrics
                .credits_granted_total
                .inc_by(applied.receipt.granted.max(0) as u64);
        }
        Ok(applied.receipt)
    }

    /// Spend credits from an account
    pub async fn debit(
        &self,
        account_id: AccountId,
        amount: i64,
        kind: TransactionKind,
        related_entity: Option<Uuid>,
        description: Option<String>,
        idempotency: IdempotencyKey,
    ) -> Result<DebitReceipt> {
        self.track(account_id.validate())?;
        let result = self
            .handle
            .debit(DebitParams {
                account_id,
                amount,
                kind,
                related_entity,
                description,
                idempotency,
            })
            .await;
        let applied = self.track(result)?;
        if !applied.replayed {
            self.metrics
                .credits_debited_total
                .inc_by(applied.receipt.amount.max(0) as u64);
        }
        Ok(applied.receipt)
    }

    // -----------------------------------------------------------------------
    // Transfers
    // -----------------------------------------------------------------------

    /// Fee-splitting transfer with an explicit rate and entry kinds
    pub async fn transfer(&self, params: TransferParams) -> Result<TransferReceipt> {
        self.track(params.payer.validate().and_then(|_| params.payee.validate()))?;
        let result = self.handle.transfer(params).await;
        let applied = self.track(result)?;
        if !applied.replayed {
            self.metrics
                .record_transfer(applied.receipt.gross, applied.receipt.fee);
        }
        Ok(applied.receipt)
    }

    /// Tip another account.
    ///
    /// The amount must lie within the configured bounds, and self-tipping is
    /// rejected. The payee receives the gross minus the tip fee, rounded
    /// down; the recipient is notified after the commit.
    pub async fn tip(
        &self,
        from: AccountId,
        to: AccountId,
        amount: i64,
        content_id: Option<Uuid>,
        message: Option<String>,
        idempotency: IdempotencyKey,
    ) -> Result<TipReceipt> {
        self.track(from.validate().and_then(|_| to.validate()))?;
        let limits = &self.config.limits;
        if amount < limits.tip_min || amount > limits.tip_max {
            return self.track(Err(Error::Validation(format!(
                "tip amount {} outside allowed range [{}, {}]",
                amount, limits.tip_min, limits.tip_max
            ))));
        }
        if from == to {
            return self.track(Err(Error::Validation(
                "cannot tip your own account".to_string(),
            )));
        }

        let result = self
            .handle
            .tip(TipParams {
                from: from.clone(),
                to: to.clone(),
                amount,
                fee_rate: self.config.fees.tip_fee,
                content_id,
                message,
                idempotency,
            })
            .await;
        let applied = self.track(result)?;
        let receipt = applied.receipt;
        if !applied.replayed {
            self.metrics
                .record_transfer(receipt.transfer.gross, receipt.transfer.fee);
            self.notify(
                &to,
                NotificationKind::TipReceived,
                serde_json::json!({
                    "tip_id": receipt.tip_id,
                    "from": from.as_str(),
                    "gross": receipt.transfer.gross,
                    "net": receipt.transfer.net,
                }),
            );
        }
        Ok(receipt)
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    /// Subscribe to a creator at the given tier.
    ///
    /// Charges the tier price immediately; re-subscribing updates the
    /// existing row. The creator receives the price minus the subscription
    /// fee, rounded down.
    pub async fn subscribe(
        &self,
        subscriber: AccountId,
        creator: AccountId,
        tier: SubscriptionTier,
        idempotency: IdempotencyKey,
    ) -> Result<SubscriptionReceipt> {
        self.track(subscriber.validate().and_then(|_| creator.validate()))?;
        if subscriber == creator {
            return self.track(Err(Error::Validation(
                "cannot subscribe to your own account".to_string(),
            )));
        }

        let result = self
            .handle
            .subscribe(SubscribeParams {
                subscriber,
                creator,
                tier,
                fee_rate: self.config.fees.subscription_fee,
                idempotency,
            })
            .await;
        let applied = self.track(result)?;
        if !applied.replayed {
            self.metrics
                .record_transfer(applied.receipt.transfer.gross, applied.receipt.transfer.fee);
        }
        Ok(applied.receipt)
    }

    /// Stop renewals on an existing subscription; no refund is issued
    pub async fn cancel_subscription(
        &self,
        subscriber: AccountId,
        creator: AccountId,
    ) -> Result<Subscription> {
        self.track(subscriber.validate().and_then(|_| creator.validate()))?;
        let result = self.handle.cancel_subscription(subscriber, creator).await;
        self.track(result)
    }

    /// Current subscription row for the pair, if any
    pub async fn get_subscription(
        &self,
        subscriber: &AccountId,
        creator: &AccountId,
    ) -> Result<Option<Subscription>> {
        subscriber.validate()?;
        creator.validate()?;
        self.storage.get_subscription(subscriber, creator)
    }

    // -----------------------------------------------------------------------
    // Opportunity unlocks
    // -----------------------------------------------------------------------

    /// Unlock an opportunity, paying its listed price.
    ///
    /// The listing must exist and be active; each account can unlock a given
    /// opportunity at most once, ever. The cost is platform revenue.
    pub async fn unlock(
        &self,
        account_id: AccountId,
        opportunity_id: Uuid,
        idempotency: IdempotencyKey,
    ) -> Result<UnlockReceipt> {
        self.track(account_id.validate())?;
        let directory = self.directory.as_ref().ok_or_else(|| {
            Error::Config("no opportunity directory configured".to_string())
        })?;
        let opportunity = match directory.lookup(opportunity_id)? {
            Some(opportunity) => opportunity,
            None => {
                return self.track(Err(Error::OpportunityNotFound(opportunity_id.to_string())))
            }
        };
        if !opportunity.is_active {
            return self.track(Err(Error::OpportunityInactive(opportunity_id.to_string())));
        }
        // A non-positive listing price would mint credits through the debit path
        if opportunity.credit_cost <= 0 {
            return self.track(Err(Error::Validation(format!(
                "opportunity {} has a non-positive cost of {}",
                opportunity_id, opportunity.credit_cost
            ))));
        }

        let result = self
            .handle
            .unlock(UnlockParams {
                account_id,
                opportunity_id,
                cost: opportunity.credit_cost,
                idempotency,
            })
            .await;
        let applied = self.track(result)?;
        if !applied.replayed {
            self.metrics.unlocks_total.inc();
            self.metrics
                .credits_debited_total
                .inc_by(applied.receipt.cost.max(0) as u64);
        }
        Ok(applied.receipt)
    }

    /// Whether the account has already unlocked the opportunity
    pub async fn has_unlocked(
        &self,
        account_id: &AccountId,
        opportunity_id: Uuid,
    ) -> Result<bool> {
        account_id.validate()?;
        self.storage.unlock_exists(account_id, opportunity_id)
    }

    // -----------------------------------------------------------------------
    // Payouts
    // -----------------------------------------------------------------------

    /// Request a payout, holding the funds until resolution
    pub async fn request_payout(
        &self,
        account_id: AccountId,
        amount: i64,
        method: String,
        details: String,
        idempotency: IdempotencyKey,
    ) -> Result<PayoutReceipt> {
        self.track(account_id.validate())?;
        let minimum = self.config.limits.minimum_payout;
        if amount < minimum {
            return self.track(Err(Error::Validation(format!(
                "payout amount {} below the minimum of {}",
                amount, minimum
            ))));
        }

        let result = self
            .handle
            .request_payout(PayoutParams {
                account_id,
                amount,
                method,
                details,
                idempotency,
            })
            .await;
        let applied = self.track(result)?;
        if !applied.replayed {
            self.metrics.payout_requests_total.inc();
            self.metrics.pending_payouts.inc();
        }
        Ok(applied.receipt)
    }

    /// Resolve a pending payout.
    ///
    /// Processing keeps the held funds out of the ledger; rejection returns
    /// them in the same commit. Either way the request is terminal and the
    /// account is notified.
    pub async fn resolve_payout(
        &self,
        payout_id: Uuid,
        outcome: PayoutOutcome,
    ) -> Result<PayoutRequest> {
        let result = self.handle.resolve_payout(payout_id, outcome).await;
        let payout = self.track(result)?;
        self.metrics.pending_payouts.dec();

        self.notify(
            &payout.account_id,
            NotificationKind::PayoutResolved,
            serde_json::json!({
                "payout_id": payout.payout_id,
                "amount": payout.amount,
                "status": match payout.status {
                    PayoutStatus::Processed => "processed",
                    PayoutStatus::Rejected => "rejected",
                    PayoutStatus::Pending => "pending",
                },
            }),
        );
        Ok(payout)
    }

    /// All payout requests still awaiting resolution
    pub async fn pending_payouts(&self) -> Result<Vec<PayoutRequest>> {
        self.storage.pending_payouts()
    }

    /// Single payout request by id
    pub async fn get_payout(&self, payout_id: Uuid) -> Result<PayoutRequest> {
        self.storage
            .get_payout(payout_id)?
            .ok_or_else(|| Error::PayoutNotFound(payout_id.to_string()))
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Transaction history, newest first, filtered and capped at `limit`
    pub async fn get_transaction_history(
        &self,
        account_id: &AccountId,
        filter: &HistoryFilter,
        limit: usize,
    ) -> Result<Vec<TransactionEntry>> {
        account_id.validate()?;
        let entries = self.storage.account_entries(account_id)?;
        Ok(entries
            .into_iter()
            .rev()
            .filter(|entry| filter.matches(entry))
            .take(limit)
            .collect())
    }

    /// Aggregate statistics for one account
    pub async fn get_credit_stats(&self, account_id: &AccountId) -> Result<CreditStats> {
        let account = self.get_account(account_id).await?;
        let entries = self.storage.account_entries(account_id)?;

        let mut total_earned = 0i64;
        let mut total_spent = 0i64;
        let mut earned_by_type: HashMap<String, i64> = HashMap::new();
        for entry in &entries {
            if entry.kind == TransactionKind::PayoutReversal {
                // A refund undoes a hold; it reduces lifetime spend rather
                // than counting as new income.
                total_spent -= entry.amount;
            } else if entry.amount >= 0 {
                total_earned += entry.amount;
                *earned_by_type.entry(entry.kind.as_str().to_string()).or_insert(0) +=
                    entry.amount;
            } else {
                total_spent += -entry.amount;
            }
        }

        // The cap rolls over lazily on write; a read after the period end
        // reports the rolled-over view without mutating the account.
        let now = Utc::now();
        let (monthly_earned, days_until_reset) = if now >= account.monthly_cap_reset_at {
            (0, 0)
        } else {
            (
                account.monthly_earned,
                (account.monthly_cap_reset_at - now).num_days().clamp(0, PERIOD_DAYS),
            )
        };
        let monthly_limit = self.config.limits.monthly_earning_cap;

        Ok(CreditStats {
            current_balance: account.balance,
            total_earned,
            total_spent,
            monthly_earned,
            monthly_limit,
            monthly_remaining: (monthly_limit - monthly_earned).max(0),
            days_until_reset,
            earned_by_type,
        })
    }

    /// Flat export of an account's history, oldest first
    pub async fn export_transactions(
        &self,
        account_id: &AccountId,
        filter: &HistoryFilter,
    ) -> Result<Vec<ExportRow>> {
        account_id.validate()?;
        let entries = self.storage.account_entries(account_id)?;
        Ok(entries
            .into_iter()
            .filter(|entry| filter.matches(entry))
            .map(|entry| ExportRow {
                date: entry.created_at,
                kind: entry.kind.as_str().to_string(),
                amount: entry.amount,
                description: entry
                    .description
                    .unwrap_or_else(|| entry.kind.as_str().to_string()),
            })
            .collect())
    }

    /// Total platform revenue accumulated across the whole ledger.
    ///
    /// Reconciliation read over the entry log: each transfer pair nets to
    /// minus its fee, and unlock debits have no payee. Assumes transfer-kind
    /// entries are only ever written by transfers.
    pub async fn platform_revenue(&self) -> Result<i64> {
        let entries = self.storage.all_entries()?;
        let net: i64 = entries
            .iter()
            .filter(|entry| REVENUE_KINDS.contains(&entry.kind))
            .map(|entry| entry.amount)
            .sum();
        Ok(-net)
    }

    /// Storage-level statistics
    pub fn storage_stats(&self) -> Result<crate::storage::StorageStats> {
        self.storage.get_stats()
    }

    /// Stop the writer; pending commands finish first
    pub async fn shutdown(&self) -> Result<()> {
        self.handle.shutdown().await
    }
}
