//! Actor-based concurrency for the credit ledger
//!
//! All mutating commands flow through one single-writer task:
//! - One logical writer serializes every read-modify-write of account state,
//!   so concurrent callers can never interleave on the same balance.
//! - Each command commits one RocksDB `WriteBatch` before its response is
//!   sent; readers never observe half an operation.
//! - Idempotency tokens are checked against storage before any mutation and
//!   written in the same batch as the mutation itself.
//!
//! Reads do not pass through the actor; they go straight to storage.

use crate::{
    cap::{self, CapPolicy},
    fees,
    storage::TransferSide,
    types::{
        Account, AccountId, CreditReceipt, DebitReceipt, IdempotencyKey, PayoutOutcome,
        PayoutReceipt, PayoutRequest, PayoutStatus, StoredOutcome, Subscription,
        SubscriptionReceipt, SubscriptionStatus, SubscriptionTier, Tip, TipReceipt,
        TransactionEntry, TransactionKind, TransferReceipt, UnlockReceipt, UnlockRecord,
    },
    Config, Error, Result, Storage,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Parameters for a standalone credit
#[derive(Debug, Clone)]
pub struct CreditParams {
    /// Account to credit
    pub account_id: AccountId,
    /// Amount in credits
    pub amount: i64,
    /// Kind of credit; earning kinds run the cap enforcer
    pub kind: TransactionKind,
    /// Related entity, if any
    pub related_entity: Option<Uuid>,
    /// Statement description
    pub description: Option<String>,
    /// Client idempotency token
    pub idempotency: IdempotencyKey,
}

/// Parameters for a standalone debit
#[derive(Debug, Clone)]
pub struct DebitParams {
    /// Account to debit
    pub account_id: AccountId,
    /// Amount in credits
    pub amount: i64,
    /// Kind of debit
    pub kind: TransactionKind,
    /// Related entity, if any
    pub related_entity: Option<Uuid>,
    /// Statement description
    pub description: Option<String>,
    /// Client idempotency token
    pub idempotency: IdempotencyKey,
}

/// Parameters for a fee-splitting transfer
#[derive(Debug, Clone)]
pub struct TransferParams {
    /// Paying account
    pub payer: AccountId,
    /// Receiving account
    pub payee: AccountId,
    /// Gross amount debited from the payer
    pub gross: i64,
    /// Platform fee rate in [0, 1)
    pub fee_rate: Decimal,
    /// Kind recorded on the payer entry
    pub payer_kind: TransactionKind,
    /// Kind recorded on the payee entry
    pub payee_kind: TransactionKind,
    /// Related entity recorded on both entries
    pub related_entity: Option<Uuid>,
    /// Statement description
    pub description: Option<String>,
    /// Client idempotency token
    pub idempotency: IdempotencyKey,
}

/// Parameters for a tip (validated by the facade before dispatch)
#[derive(Debug, Clone)]
pub struct TipParams {
    /// Sender
    pub from: AccountId,
    /// Recipient
    pub to: AccountId,
    /// Gross tip amount
    pub amount: i64,
    /// Platform fee rate for tips
    pub fee_rate: Decimal,
    /// Content the tip is attached to
    pub content_id: Option<Uuid>,
    /// Optional message
    pub message: Option<String>,
    /// Client idempotency token
    pub idempotency: IdempotencyKey,
}

/// Parameters for a subscription purchase or renewal
#[derive(Debug, Clone)]
pub struct SubscribeParams {
    /// Paying account
    pub subscriber: AccountId,
    /// Receiving creator
    pub creator: AccountId,
    /// Tier to purchase
    pub tier: SubscriptionTier,
    /// Platform fee rate for subscriptions
    pub fee_rate: Decimal,
    /// Client idempotency token
    pub idempotency: IdempotencyKey,
}

/// Parameters for an opportunity unlock (cost resolved by the facade)
#[derive(Debug, Clone)]
pub struct UnlockParams {
    /// Purchasing account
    pub account_id: AccountId,
    /// Opportunity to unlock
    pub opportunity_id: Uuid,
    /// Resolved unlock price
    pub cost: i64,
    /// Client idempotency token
    pub idempotency: IdempotencyKey,
}

/// Parameters for a payout request (minimum validated by the facade)
#[derive(Debug, Clone)]
pub struct PayoutParams {
    /// Requesting account
    pub account_id: AccountId,
    /// Amount to withdraw
    pub amount: i64,
    /// Payment method
    pub method: String,
    /// Method details
    pub details: String,
    /// Client idempotency token
    pub idempotency: IdempotencyKey,
}

/// A receipt plus how it was produced.
///
/// `replayed` is true when the receipt was served from the idempotency
/// store rather than freshly committed; callers must not count a replay
/// as a new mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied<T> {
    /// The operation's receipt
    pub receipt: T,
    /// Whether this is a stored receipt from an earlier application
    pub replayed: bool,
}

impl<T> Applied<T> {
    fn fresh(receipt: T) -> Self {
        Self { receipt, replayed: false }
    }

    fn replay(receipt: T) -> Self {
        Self { receipt, replayed: true }
    }
}

/// Message sent to the ledger actor
pub enum LedgerCommand {
    /// Ensure an account exists, applying the signup bonus on creation
    Register {
        account_id: AccountId,
        response: oneshot::Sender<Result<Account>>,
    },

    /// Standalone credit (cap-enforced for earning kinds)
    Credit {
        params: CreditParams,
        response: oneshot::Sender<Result<Applied<CreditReceipt>>>,
    },

    /// Standalone debit
    Debit {
        params: DebitParams,
        response: oneshot::Sender<Result<Applied<DebitReceipt>>>,
    },

    /// Two-sided fee-splitting transfer
    Transfer {
        params: TransferParams,
        response: oneshot::Sender<Result<Applied<TransferReceipt>>>,
    },

    /// Tip: transfer plus tip record
    Tip {
        params: TipParams,
        response: oneshot::Sender<Result<Applied<TipReceipt>>>,
    },

    /// Subscription: transfer plus row upsert
    Subscribe {
        params: SubscribeParams,
        response: oneshot::Sender<Result<Applied<SubscriptionReceipt>>>,
    },

    /// Stop renewals on an existing subscription
    CancelSubscription {
        subscriber: AccountId,
        creator: AccountId,
        response: oneshot::Sender<Result<Subscription>>,
    },

    /// One-time opportunity unlock
    Unlock {
        params: UnlockParams,
        response: oneshot::Sender<Result<Applied<UnlockReceipt>>>,
    },

    /// Payout request (hold funds)
    RequestPayout {
        params: PayoutParams,
        response: oneshot::Sender<Result<Applied<PayoutReceipt>>>,
    },

    /// Back-office payout resolution
    ResolvePayout {
        payout_id: Uuid,
        outcome: PayoutOutcome,
        response: oneshot::Sender<Result<PayoutRequest>>,
    },

    /// Shutdown actor; acknowledged once the storage handle is released
    Shutdown { response: oneshot::Sender<()> },
}

/// Actor that processes ledger commands
pub struct LedgerActor {
    storage: Arc<Storage>,
    mailbox: mpsc::Receiver<LedgerCommand>,
    monthly_cap: i64,
    cap_policy: CapPolicy,
    signup_bonus: i64,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(storage: Arc<Storage>, mailbox: mpsc::Receiver<LedgerCommand>, config: &Config) -> Self {
        Self {
            storage,
            mailbox,
            monthly_cap: config.limits.monthly_earning_cap,
            cap_policy: config.limits.cap_policy,
            signup_bonus: config.limits.signup_bonus,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        let ack = loop {
            match self.mailbox.recv().await {
                Some(LedgerCommand::Shutdown { response }) => break Some(response),
                Some(command) => self.handle_command(command),
                None => break None,
            }
        };
        // Release the storage handle before acknowledging, so a caller that
        // awaited shutdown can reopen the database immediately
        drop(self);
        tracing::debug!("Ledger actor stopped");
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }

    fn handle_command(&mut self, command: LedgerCommand) {
        match command {
            LedgerCommand::Register { account_id, response } => {
                let _ = response.send(self.handle_register(account_id));
            }
            LedgerCommand::Credit { params, response } => {
                let _ = response.send(self.handle_credit(params));
            }
            LedgerCommand::Debit { params, response } => {
                let _ = response.send(self.handle_debit(params));
            }
            LedgerCommand::Transfer { params, response } => {
                let _ = response.send(self.handle_transfer(params));
            }
            LedgerCommand::Tip { params, response } => {
                let _ = response.send(self.handle_tip(params));
            }
            LedgerCommand::Subscribe { params, response } => {
                let _ = response.send(self.handle_subscribe(params));
            }
            LedgerCommand::CancelSubscription { subscriber, creator, response } => {
                let _ = response.send(self.handle_cancel_subscription(&subscriber, &creator));
            }
            LedgerCommand::Unlock { params, response } => {
                let _ = response.send(self.handle_unlock(params));
            }
            LedgerCommand::RequestPayout { params, response } => {
                let _ = response.send(self.handle_request_payout(params));
            }
            LedgerCommand::ResolvePayout { payout_id, outcome, response } => {
                let _ = response.send(self.handle_resolve_payout(payout_id, outcome));
            }
            // Handled in the run loop
            LedgerCommand::Shutdown { .. } => {}
        }
    }

    // Account helpers

    fn load_account(&self, account_id: &AccountId) -> Result<Account> {
        self.storage
            .get_account(account_id)?
            .ok_or_else(|| Error::AccountNotFound(account_id.to_string()))
    }

    fn load_or_create(&self, account_id: &AccountId, now: DateTime<Utc>) -> Result<Account> {
        match self.storage.get_account(account_id)? {
            Some(account) => Ok(account),
            None => Ok(Account::new(account_id.clone(), now)),
        }
    }

    fn new_entry(
        account_id: &AccountId,
        amount: i64,
        kind: TransactionKind,
        related_entity: Option<Uuid>,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> TransactionEntry {
        TransactionEntry {
            entry_id: Uuid::now_v7(),
            account_id: account_id.clone(),
            amount,
            kind,
            related_entity,
            description,
            created_at: now,
        }
    }

    /// Replay guard: a seen token returns the stored receipt without
    /// reapplying; a token reused for a different operation is rejected.
    fn replay(&self, key: &IdempotencyKey) -> Result<Option<StoredOutcome>> {
        self.storage.get_stored_outcome(key)
    }

    fn replay_mismatch(key: &IdempotencyKey) -> Error {
        Error::Validation(format!("idempotency key {} reused for a different operation", key))
    }

    // Command handlers

    fn handle_register(&self, account_id: AccountId) -> Result<Account> {
        if let Some(existing) = self.storage.get_account(&account_id)? {
            return Ok(existing);
        }

        let now = Utc::now();
        let mut account = Account::new(account_id, now);
        if self.signup_bonus > 0 {
            account.apply_credit(self.signup_bonus)?;
            let entry = Self::new_entry(
                &account.id,
                self.signup_bonus,
                TransactionKind::SignupBonus,
                None,
                Some("Signup bonus".to_string()),
                now,
            );
            self.storage.commit_balance_change(&account, &entry, None)?;
        } else {
            self.storage.put_account(&account)?;
        }

        tracing::info!(account = %account.id, bonus = self.signup_bonus, "Account registered");
        Ok(account)
    }

    fn handle_credit(&self, params: CreditParams) -> Result<Applied<CreditReceipt>> {
        if let Some(outcome) = self.replay(&params.idempotency)? {
            return match outcome {
                StoredOutcome::Credit(receipt) => Ok(Applied::replay(receipt)),
                _ => Err(Self::replay_mismatch(&params.idempotency)),
            };
        }
        if params.amount <= 0 {
            return Err(Error::Validation(format!(
                "credit amount must be positive, got {}",
                params.amount
            )));
        }

        let now = Utc::now();
        let mut account = self.load_or_create(&params.account_id, now)?;

        // Earning-type credits run the cap enforcer first; everything else
        // bypasses the cap entirely.
        let granted = if params.kind.is_earning() {
            cap::apply_earning(&mut account, params.amount, now, self.monthly_cap, self.cap_policy)?
        } else {
            params.amount
        };
        account.apply_credit(granted)?;

        let entry = Self::new_entry(
            &params.account_id,
            granted,
            params.kind,
            params.related_entity,
            params.description,
            now,
        );
        let receipt = CreditReceipt {
            entry_id: entry.entry_id,
            account_id: account.id.clone(),
            granted,
            balance_after: account.balance,
        };
        let outcome = StoredOutcome::Credit(receipt.clone());
        self.storage
            .commit_balance_change(&account, &entry, Some((&params.idempotency, &outcome)))?;

        Ok(Applied::fresh(receipt))
    }

    fn handle_debit(&self, params: DebitParams) -> Result<Applied<DebitReceipt>> {
        if let Some(outcome) = self.replay(&params.idempotency)? {
            return match outcome {
                StoredOutcome::Debit(receipt) => Ok(Applied::replay(receipt)),
                _ => Err(Self::replay_mismatch(&params.idempotency)),
            };
        }
        if params.amount <= 0 {
            return Err(Error::Validation(format!(
                "debit amount must be positive, got {}",
                params.amount
            )));
        }

        let now = Utc::now();
        let mut account = self.load_account(&params.account_id)?;
        account.apply_debit(params.amount)?;

        let entry = Self::new_entry(
            &params.account_id,
            -params.amount,
            params.kind,
            params.related_entity,
            params.description,
            now,
        );
        let receipt = DebitReceipt {
            entry_id: entry.entry_id,
            account_id: account.id.clone(),
            amount: params.amount,
            balance_after: account.balance,
        };
        let outcome = StoredOutcome::Debit(receipt.clone());
        self.storage
            .commit_balance_change(&account, &entry, Some((&params.idempotency, &outcome)))?;

        Ok(Applied::fresh(receipt))
    }

    fn handle_transfer(&self, params: TransferParams) -> Result<Applied<TransferReceipt>> {
        if let Some(outcome) = self.replay(&params.idempotency)? {
            return match outcome {
                StoredOutcome::Transfer(receipt) => Ok(Applied::replay(receipt)),
                _ => Err(Self::replay_mismatch(&params.idempotency)),
            };
        }
        let (receipt, _) = self.execute_transfer(&params, None, StoredOutcome::Transfer)?;
        Ok(Applied::fresh(receipt))
    }

    fn handle_tip(&self, params: TipParams) -> Result<Applied<TipReceipt>> {
        if let Some(outcome) = self.replay(&params.idempotency)? {
            return match outcome {
                StoredOutcome::Tip(receipt) => Ok(Applied::replay(receipt)),
                _ => Err(Self::replay_mismatch(&params.idempotency)),
            };
        }

        let tip_id = Uuid::now_v7();
        let tip = Tip {
            tip_id,
            from: params.from.clone(),
            to: params.to.clone(),
            amount: params.amount,
            content_id: params.content_id,
            message: params.message.clone(),
            created_at: Utc::now(),
        };

        let transfer = TransferParams {
            payer: params.from,
            payee: params.to,
            gross: params.amount,
            fee_rate: params.fee_rate,
            payer_kind: TransactionKind::TipSent,
            payee_kind: TransactionKind::TipReceived,
            related_entity: Some(tip_id),
            description: params.message,
            idempotency: params.idempotency,
        };
        let (receipt, _) = self.execute_transfer(
            &transfer,
            Some(TransferSide::Tip(tip)),
            move |t| StoredOutcome::Tip(TipReceipt { tip_id, transfer: t }),
        )?;

        Ok(Applied::fresh(TipReceipt { tip_id, transfer: receipt }))
    }

    fn handle_subscribe(&self, params: SubscribeParams) -> Result<Applied<SubscriptionReceipt>> {
        if let Some(outcome) = self.replay(&params.idempotency)? {
            return match outcome {
                StoredOutcome::Subscription(receipt) => Ok(Applied::replay(receipt)),
                _ => Err(Self::replay_mismatch(&params.idempotency)),
            };
        }

        let now = Utc::now();
        // Re-subscribing updates the single (subscriber, creator) row;
        // the id and created_at survive across renewals.
        let existing = self.storage.get_subscription(&params.subscriber, &params.creator)?;
        let subscription = match existing {
            Some(mut row) => {
                row.tier = params.tier;
                row.status = SubscriptionStatus::Active;
                row.renews_at = now + Duration::days(30);
                row.updated_at = now;
                row
            }
            None => Subscription {
                subscription_id: Uuid::now_v7(),
                subscriber: params.subscriber.clone(),
                creator: params.creator.clone(),
                tier: params.tier,
                status: SubscriptionStatus::Active,
                renews_at: now + Duration::days(30),
                created_at: now,
                updated_at: now,
            },
        };
        let subscription_id = subscription.subscription_id;
        let tier = params.tier;

        let transfer = TransferParams {
            payer: params.subscriber,
            payee: params.creator,
            gross: tier.price(),
            fee_rate: params.fee_rate,
            payer_kind: TransactionKind::Subscription,
            payee_kind: TransactionKind::SubscriptionEarnings,
            related_entity: Some(subscription_id),
            description: None,
            idempotency: params.idempotency,
        };
        // The transfer and the row upsert commit in one batch: an over-budget
        // subscriber fails the transfer and never touches the row.
        let (receipt, _) = self.execute_transfer(
            &transfer,
            Some(TransferSide::Subscription(subscription)),
            move |t| {
                StoredOutcome::Subscription(SubscriptionReceipt {
                    subscription_id,
                    tier,
                    transfer: t,
                })
            },
        )?;

        Ok(Applied::fresh(SubscriptionReceipt { subscription_id, tier, transfer: receipt }))
    }

    fn handle_cancel_subscription(
        &self,
        subscriber: &AccountId,
        creator: &AccountId,
    ) -> Result<Subscription> {
        let mut subscription = self
            .storage
            .get_subscription(subscriber, creator)?
            .ok_or_else(|| Error::SubscriptionNotFound {
                subscriber: subscriber.to_string(),
                creator: creator.to_string(),
            })?;
        // Cancelling is not a refund; it only stops renewals
        subscription.status = SubscriptionStatus::Cancelled;
        subscription.updated_at = Utc::now();
        self.storage.put_subscription(&subscription)?;

        tracing::info!(subscriber = %subscriber, creator = %creator, "Subscription cancelled");
        Ok(subscription)
    }

    /// Shared transfer core: balance check, debit, floored net, credit,
    /// entry pair, optional side row and the idempotency receipt, committed
    /// as one indivisible batch.
    fn execute_transfer(
        &self,
        params: &TransferParams,
        side: Option<TransferSide>,
        wrap: impl FnOnce(TransferReceipt) -> StoredOutcome,
    ) -> Result<(TransferReceipt, StoredOutcome)> {
        if params.payer == params.payee {
            return Err(Error::Validation("payer and payee must differ".to_string()));
        }
        let net = fees::net_after_fee(params.gross, params.fee_rate)?;

        let now = Utc::now();
        let mut payer = self.load_account(&params.payer)?;
        let mut payee = self.load_or_create(&params.payee, now)?;

        payer.apply_debit(params.gross)?;
        // Transfer receipts never touch the cap
        payee.apply_credit(net)?;

        let payer_entry = Self::new_entry(
            &params.payer,
            -params.gross,
            params.payer_kind,
            params.related_entity,
            params.description.clone(),
            now,
        );
        let payee_entry = Self::new_entry(
            &params.payee,
            net,
            params.payee_kind,
            params.related_entity,
            params.description.clone(),
            now,
        );

        let receipt = TransferReceipt {
            transfer_id: Uuid::now_v7(),
            payer: params.payer.clone(),
            payee: params.payee.clone(),
            gross: params.gross,
            net,
            fee: params.gross - net,
            payer_entry_id: payer_entry.entry_id,
            payee_entry_id: payee_entry.entry_id,
        };
        let outcome = wrap(receipt.clone());
        self.storage.commit_transfer(
            &payer,
            &payee,
            &payer_entry,
            &payee_entry,
            side.as_ref(),
            Some((&params.idempotency, &outcome)),
        )?;

        tracing::info!(
            payer = %params.payer,
            payee = %params.payee,
            gross = params.gross,
            net,
            fee = receipt.fee,
            "Transfer applied"
        );
        Ok((receipt, outcome))
    }

    fn handle_unlock(&self, params: UnlockParams) -> Result<Applied<UnlockReceipt>> {
        if let Some(outcome) = self.replay(&params.idempotency)? {
            return match outcome {
                StoredOutcome::Unlock(receipt) => Ok(Applied::replay(receipt)),
                _ => Err(Self::replay_mismatch(&params.idempotency)),
            };
        }

        // The unlock key is the (account, opportunity) pair and this check
        // runs on the single writer, so two racing unlocks cannot both pass.
        if self.storage.unlock_exists(&params.account_id, params.opportunity_id)? {
            return Err(Error::AlreadyUnlocked {
                account: params.account_id.to_string(),
                opportunity: params.opportunity_id.to_string(),
            });
        }

        let now = Utc::now();
        let mut account = self.load_account(&params.account_id)?;
        // No payee: the cost is platform revenue
        account.apply_debit(params.cost)?;

        let entry = Self::new_entry(
            &params.account_id,
            -params.cost,
            TransactionKind::OpportunityUnlock,
            Some(params.opportunity_id),
            Some(format!("Unlocked opportunity {}", params.opportunity_id)),
            now,
        );
        let record = UnlockRecord {
            account_id: params.account_id.clone(),
            opportunity_id: params.opportunity_id,
            cost: params.cost,
            created_at: now,
        };
        let receipt = UnlockReceipt {
            account_id: account.id.clone(),
            opportunity_id: params.opportunity_id,
            cost: params.cost,
            entry_id: entry.entry_id,
            balance_after: account.balance,
        };
        let outcome = StoredOutcome::Unlock(receipt.clone());
        self.storage
            .commit_unlock(&account, &entry, &record, Some((&params.idempotency, &outcome)))?;

        tracing::info!(
            account = %params.account_id,
            opportunity = %params.opportunity_id,
            cost = params.cost,
            "Opportunity unlocked"
        );
        Ok(Applied::fresh(receipt))
    }

    fn handle_request_payout(&self, params: PayoutParams) -> Result<Applied<PayoutReceipt>> {
        if let Some(outcome) = self.replay(&params.idempotency)? {
            return match outcome {
                StoredOutcome::Payout(receipt) => Ok(Applied::replay(receipt)),
                _ => Err(Self::replay_mismatch(&params.idempotency)),
            };
        }

        let now = Utc::now();
        let mut account = self.load_account(&params.account_id)?;
        // Funds are held immediately: unavailable for spending while pending
        account.apply_debit(params.amount)?;

        let payout = PayoutRequest {
            payout_id: Uuid::now_v7(),
            account_id: params.account_id.clone(),
            amount: params.amount,
            method: params.method,
            details: params.details,
            status: PayoutStatus::Pending,
            requested_at: now,
            processed_at: None,
        };
        let entry = Self::new_entry(
            &params.account_id,
            -params.amount,
            TransactionKind::PayoutRequest,
            Some(payout.payout_id),
            Some(format!("Payout request via {}", payout.method)),
            now,
        );
        let receipt = PayoutReceipt {
            payout_id: payout.payout_id,
            amount: params.amount,
            entry_id: entry.entry_id,
            balance_after: account.balance,
        };
        let outcome = StoredOutcome::Payout(receipt.clone());
        self.storage
            .commit_payout_request(&account, &entry, &payout, Some((&params.idempotency, &outcome)))?;

        tracing::info!(
            account = %params.account_id,
            payout_id = %payout.payout_id,
            amount = params.amount,
            "Payout requested"
        );
        Ok(Applied::fresh(receipt))
    }

    fn handle_resolve_payout(
        &self,
        payout_id: Uuid,
        outcome: PayoutOutcome,
    ) -> Result<PayoutRequest> {
        let now = Utc::now();
        let mut payout = self
            .storage
            .get_payout(payout_id)?
            .ok_or_else(|| Error::PayoutNotFound(payout_id.to_string()))?;
        payout.resolve(outcome, now)?;

        // A rejected payout returns the held funds; a processed one leaves
        // them gone (they were disbursed externally).
        let refund = match outcome {
            PayoutOutcome::Rejected => {
                let mut account = self.load_account(&payout.account_id)?;
                account.apply_credit(payout.amount)?;
                let entry = Self::new_entry(
                    &payout.account_id,
                    payout.amount,
                    TransactionKind::PayoutReversal,
                    Some(payout_id),
                    Some("Payout rejected, funds returned".to_string()),
                    now,
                );
                Some((account, entry))
            }
            PayoutOutcome::Processed => None,
        };
        self.storage.commit_payout_resolution(
            &payout,
            refund.as_ref().map(|(account, entry)| (account, entry)),
        )?;

        tracing::info!(
            payout_id = %payout_id,
            outcome = ?outcome,
            "Payout resolved"
        );
        Ok(payout)
    }
}

/// Handle for sending commands to the actor
#[derive(Clone)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerCommand>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerCommand>) -> Self {
        Self { sender }
    }

    async fn send<T>(
        &self,
        command: LedgerCommand,
        receiver: oneshot::Receiver<Result<T>>,
    ) -> Result<T> {
        self.sender
            .send(command)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        receiver
            .await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Ensure an account exists
    pub async fn register(&self, account_id: AccountId) -> Result<Account> {
        let (tx, rx) = oneshot::channel();
        self.send(LedgerCommand::Register { account_id, response: tx }, rx).await
    }

    /// Apply a standalone credit
    pub async fn credit(&self, params: CreditParams) -> Result<Applied<CreditReceipt>> {
        let (tx, rx) = oneshot::channel();
        self.send(LedgerCommand::Credit { params, response: tx }, rx).await
    }

    /// Apply a standalone debit
    pub async fn debit(&self, params: DebitParams) -> Result<Applied<DebitReceipt>> {
        let (tx, rx) = oneshot::channel();
        self.send(LedgerCommand::Debit { params, response: tx }, rx).await
    }

    /// Apply a fee-splitting transfer
    pub async fn transfer(&self, params: TransferParams) -> Result<Applied<TransferReceipt>> {
        let (tx, rx) = oneshot::channel();
        self.send(LedgerCommand::Transfer { params, response: tx }, rx).await
    }

    /// Apply a tip
    pub async fn tip(&self, params: TipParams) -> Result<Applied<TipReceipt>> {
        let (tx, rx) = oneshot::channel();
        self.send(LedgerCommand::Tip { params, response: tx }, rx).await
    }

    /// Apply a subscription purchase
    pub async fn subscribe(&self, params: SubscribeParams) -> Result<Applied<SubscriptionReceipt>> {
        let (tx, rx) = oneshot::channel();
        self.send(LedgerCommand::Subscribe { params, response: tx }, rx).await
    }

    /// Cancel an existing subscription
    pub async fn cancel_subscription(
        &self,
        subscriber: AccountId,
        creator: AccountId,
    ) -> Result<Subscription> {
        let (tx, rx) = oneshot::channel();
        self.send(
            LedgerCommand::CancelSubscription { subscriber, creator, response: tx },
            rx,
        )
        .await
    }

    /// Apply an opportunity unlock
    pub async fn unlock(&self, params: UnlockParams) -> Result<Applied<UnlockReceipt>> {
        let (tx, rx) = oneshot::channel();
        self.send(LedgerCommand::Unlock { params, response: tx }, rx).await
    }

    /// Request a payout
    pub async fn request_payout(&self, params: PayoutParams) -> Result<Applied<PayoutReceipt>> {
        let (tx, rx) = oneshot::channel();
        self.send(LedgerCommand::RequestPayout { params, response: tx }, rx).await
    }

    /// Resolve a pending payout
    pub async fn resolve_payout(
        &self,
        payout_id: Uuid,
        outcome: PayoutOutcome,
    ) -> Result<PayoutRequest> {
        let (tx, rx) = oneshot::channel();
        self.send(LedgerCommand::ResolvePayout { payout_id, outcome, response: tx }, rx)
            .await
    }

    /// Shutdown actor, waiting until it has released its resources
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LedgerCommand::Shutdown { response: tx })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        let _ = rx.await;
        Ok(())
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(storage: Arc<Storage>, config: &Config) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(1000); // Bounded channel for backpressure
    let actor = LedgerActor::new(storage, rx, config);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}
