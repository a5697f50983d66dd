//! Core types for the credit ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (integral credits, `Decimal` fee rates)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Account identifier (platform user id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reject ids that cannot be used safely.
    ///
    /// Storage keys join components with `|`, so an id containing the
    /// separator would alias another account's keys. Checked at every
    /// ledger entry point before any write.
    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(Error::Validation("account id must not be empty".to_string()));
        }
        if self.0.contains('|') {
            return Err(Error::Validation(format!(
                "account id must not contain '|': {}",
                self.0
            )));
        }
        Ok(())
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Idempotency token supplied by the client with every mutation
///
/// A retried call carrying the same token replays the stored receipt
/// instead of applying the mutation a second time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(Uuid);

impl IdempotencyKey {
    /// Generate a fresh token
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Raw bytes for use as a storage key
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of value movement recorded in the transaction log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransactionKind {
    /// Credit earned by posting content
    Post = 1,
    /// Credit earned by rating content
    Rating = 2,
    /// Credit earned by a daily check-in
    CheckIn = 3,
    /// One-time signup bonus on account creation
    SignupBonus = 4,
    /// Tip paid out of this account
    TipSent = 5,
    /// Tip received into this account
    TipReceived = 6,
    /// Subscription paid out of this account
    Subscription = 7,
    /// Subscription revenue received into this account
    SubscriptionEarnings = 8,
    /// One-time opportunity unlock purchase
    OpportunityUnlock = 9,
    /// Funds held for a pending payout request
    PayoutRequest = 10,
    /// Held funds returned after a rejected payout
    PayoutReversal = 11,
}

impl TransactionKind {
    /// Whether credits of this kind count toward the monthly earning cap.
    ///
    /// Only direct user contributions are cap-counted; tip and subscription
    /// receipts, bonuses and payout reversals bypass the cap.
    pub fn is_earning(&self) -> bool {
        matches!(
            self,
            TransactionKind::Post | TransactionKind::Rating | TransactionKind::CheckIn
        )
    }

    /// Stable string label (export rows, stats buckets)
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Post => "post",
            TransactionKind::Rating => "rating",
            TransactionKind::CheckIn => "check_in",
            TransactionKind::SignupBonus => "signup_bonus",
            TransactionKind::TipSent => "tip_sent",
            TransactionKind::TipReceived => "tip_received",
            TransactionKind::Subscription => "subscription",
            TransactionKind::SubscriptionEarnings => "subscription_earnings",
            TransactionKind::OpportunityUnlock => "opportunity_unlock",
            TransactionKind::PayoutRequest => "payout_request",
            TransactionKind::PayoutReversal => "payout_reversal",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One signed value movement in the append-only transaction log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEntry {
    /// Unique entry ID (UUIDv7 for time-ordering)
    pub entry_id: Uuid,

    /// Account the movement applies to
    pub account_id: AccountId,

    /// Signed amount: positive = credit, negative = debit
    pub amount: i64,

    /// Kind of movement
    pub kind: TransactionKind,

    /// Related entity (tip id, subscription id, opportunity id, payout id)
    pub related_entity: Option<Uuid>,

    /// Free-form description for statements and export
    pub description: Option<String>,

    /// Entry timestamp
    pub created_at: DateTime<Utc>,
}

/// Account state: the only place balances live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Account ID
    pub id: AccountId,

    /// Current balance in credits, never negative
    pub balance: i64,

    /// Cap-counted credits earned in the current period
    pub monthly_earned: i64,

    /// When the current earning period ends
    pub monthly_cap_reset_at: DateTime<Utc>,

    /// Account creation time
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Fresh account with zero balance and a full earning period ahead
    pub fn new(id: AccountId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            balance: 0,
            monthly_earned: 0,
            monthly_cap_reset_at: now + chrono::Duration::days(30),
            created_at: now,
        }
    }

    /// Increase the balance, guarding against overflow.
    ///
    /// Zero is allowed (a fully-fee'd transfer nets 0); negative amounts are
    /// not — a debit must never be smuggled in as a credit.
    pub fn apply_credit(&mut self, amount: i64) -> Result<()> {
        if amount < 0 {
            return Err(Error::Validation(format!(
                "credit amount must not be negative, got {}",
                amount
            )));
        }
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or_else(|| Error::Validation("balance overflow".to_string()))?;
        Ok(())
    }

    /// Decrease the balance; the balance invariant (>= 0) is enforced here.
    ///
    /// Negative amounts are rejected: `balance -= amount` would mint credits.
    pub fn apply_debit(&mut self, amount: i64) -> Result<()> {
        if amount < 0 {
            return Err(Error::Validation(format!(
                "debit amount must not be negative, got {}",
                amount
            )));
        }
        if amount > self.balance {
            return Err(Error::InsufficientBalance {
                account: self.id.to_string(),
                requested: amount,
                available: self.balance,
            });
        }
        self.balance -= amount;
        Ok(())
    }
}

/// Subscription tier with its fixed price schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SubscriptionTier {
    /// Basic tier
    Basic = 1,
    /// Premium tier
    Premium = 2,
    /// VIP tier
    Vip = 3,
}

impl SubscriptionTier {
    /// Price in credits per renewal period
    pub fn price(&self) -> i64 {
        match self {
            SubscriptionTier::Basic => 50,
            SubscriptionTier::Premium => 100,
            SubscriptionTier::Vip => 200,
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "basic" => Some(SubscriptionTier::Basic),
            "premium" => Some(SubscriptionTier::Premium),
            "vip" => Some(SubscriptionTier::Vip),
            _ => None,
        }
    }
}

/// Subscription status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SubscriptionStatus {
    /// Renewing subscription
    Active = 1,
    /// Cancelled, no further renewals
    Cancelled = 2,
}

/// Subscription row, unique per (subscriber, creator) pair
///
/// Re-subscribing updates the existing row rather than inserting a duplicate;
/// the storage key is the pair itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// Subscription ID (stable across re-subscribes)
    pub subscription_id: Uuid,

    /// Paying account
    pub subscriber: AccountId,

    /// Receiving creator account
    pub creator: AccountId,

    /// Current tier
    pub tier: SubscriptionTier,

    /// Current status
    pub status: SubscriptionStatus,

    /// Next renewal time
    pub renews_at: DateTime<Utc>,

    /// First subscribed
    pub created_at: DateTime<Utc>,

    /// Last modified
    pub updated_at: DateTime<Utc>,
}

/// Immutable record of a single tip event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tip {
    /// Tip ID
    pub tip_id: Uuid,

    /// Sender
    pub from: AccountId,

    /// Recipient
    pub to: AccountId,

    /// Gross amount before the platform fee
    pub amount: i64,

    /// Content the tip is attached to, if any
    pub content_id: Option<Uuid>,

    /// Optional message to the recipient
    pub message: Option<String>,

    /// Tip timestamp
    pub created_at: DateTime<Utc>,
}

/// Proof of a one-time opportunity purchase
///
/// The storage key is the (user, opportunity) pair, so at most one record
/// can ever exist per pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnlockRecord {
    /// Purchasing account
    pub account_id: AccountId,

    /// Unlocked opportunity
    pub opportunity_id: Uuid,

    /// Credits paid (platform revenue; there is no payee)
    pub cost: i64,

    /// Purchase timestamp
    pub created_at: DateTime<Utc>,
}

/// Payout request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PayoutStatus {
    /// Funds held, awaiting back-office resolution
    Pending = 1,
    /// Disbursed externally (terminal)
    Processed = 2,
    /// Declined; held funds returned (terminal)
    Rejected = 3,
}

impl PayoutStatus {
    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, PayoutStatus::Processed | PayoutStatus::Rejected)
    }
}

/// Terminal outcome reported by the back office
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayoutOutcome {
    /// Disbursement succeeded
    Processed,
    /// Disbursement declined
    Rejected,
}

/// Withdrawal request holding funds until resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutRequest {
    /// Payout ID
    pub payout_id: Uuid,

    /// Requesting account
    pub account_id: AccountId,

    /// Held amount in credits
    pub amount: i64,

    /// Payment method (opaque to the core)
    pub method: String,

    /// Method details (account number, wallet address, ...)
    pub details: String,

    /// Current status
    pub status: PayoutStatus,

    /// Request timestamp
    pub requested_at: DateTime<Utc>,

    /// Resolution timestamp, set exactly once
    pub processed_at: Option<DateTime<Utc>>,
}

impl PayoutRequest {
    /// Apply the terminal transition. Fails if already resolved.
    pub fn resolve(&mut self, outcome: PayoutOutcome, now: DateTime<Utc>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(Error::PayoutAlreadyResolved(self.payout_id.to_string()));
        }
        self.status = match outcome {
            PayoutOutcome::Processed => PayoutStatus::Processed,
            PayoutOutcome::Rejected => PayoutStatus::Rejected,
        };
        self.processed_at = Some(now);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Receipts
//
// Every mutation returns a receipt; receipts are persisted against the
// idempotency key and replayed verbatim on a retried call.
// ---------------------------------------------------------------------------

/// Receipt for a standalone credit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditReceipt {
    /// Ledger entry written
    pub entry_id: Uuid,
    /// Credited account
    pub account_id: AccountId,
    /// Amount actually granted (may be clamped by the cap policy)
    pub granted: i64,
    /// Balance after the credit
    pub balance_after: i64,
}

/// Receipt for a standalone debit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebitReceipt {
    /// Ledger entry written
    pub entry_id: Uuid,
    /// Debited account
    pub account_id: AccountId,
    /// Amount removed
    pub amount: i64,
    /// Balance after the debit
    pub balance_after: i64,
}

/// Receipt for a two-sided transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// Transfer ID
    pub transfer_id: Uuid,
    /// Paying account
    pub payer: AccountId,
    /// Receiving account
    pub payee: AccountId,
    /// Gross amount debited from the payer
    pub gross: i64,
    /// Net amount credited to the payee
    pub net: i64,
    /// Platform fee retained (gross - net), credited to no account
    pub fee: i64,
    /// Payer-side ledger entry
    pub payer_entry_id: Uuid,
    /// Payee-side ledger entry
    pub payee_entry_id: Uuid,
}

/// Receipt for a tip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TipReceipt {
    /// Tip ID
    pub tip_id: Uuid,
    /// Underlying transfer
    pub transfer: TransferReceipt,
}

/// Receipt for a subscription purchase or renewal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionReceipt {
    /// Subscription row ID
    pub subscription_id: Uuid,
    /// Tier purchased
    pub tier: SubscriptionTier,
    /// Underlying transfer
    pub transfer: TransferReceipt,
}

/// Receipt for an opportunity unlock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnlockReceipt {
    /// Purchasing account
    pub account_id: AccountId,
    /// Unlocked opportunity
    pub opportunity_id: Uuid,
    /// Credits paid
    pub cost: i64,
    /// Ledger entry written
    pub entry_id: Uuid,
    /// Balance after the purchase
    pub balance_after: i64,
}

/// Receipt for a payout request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutReceipt {
    /// Created payout request
    pub payout_id: Uuid,
    /// Held amount
    pub amount: i64,
    /// Ledger entry written
    pub entry_id: Uuid,
    /// Balance after the hold
    pub balance_after: i64,
}

/// Stored outcome of an applied mutation, keyed by idempotency token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoredOutcome {
    /// Applied credit
    Credit(CreditReceipt),
    /// Applied debit
    Debit(DebitReceipt),
    /// Applied transfer
    Transfer(TransferReceipt),
    /// Applied tip
    Tip(TipReceipt),
    /// Applied subscription
    Subscription(SubscriptionReceipt),
    /// Applied unlock
    Unlock(UnlockReceipt),
    /// Applied payout request
    Payout(PayoutReceipt),
}

// ---------------------------------------------------------------------------
// Query surface
// ---------------------------------------------------------------------------

/// Filters for transaction history queries
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// Restrict to these kinds; empty = all
    pub kinds: Vec<TransactionKind>,
    /// Entries at or after this time
    pub since: Option<DateTime<Utc>>,
    /// Entries before this time
    pub until: Option<DateTime<Utc>>,
}

impl HistoryFilter {
    /// Whether the entry passes this filter
    pub fn matches(&self, entry: &TransactionEntry) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&entry.kind) {
            return false;
        }
        if let Some(since) = self.since {
            if entry.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if entry.created_at >= until {
                return false;
            }
        }
        true
    }
}

/// Aggregate credit statistics for one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditStats {
    /// Current balance
    pub current_balance: i64,
    /// Sum of all credits ever received
    pub total_earned: i64,
    /// Sum of all debits ever paid
    pub total_spent: i64,
    /// Cap-counted credits in the current period
    pub monthly_earned: i64,
    /// Configured monthly cap
    pub monthly_limit: i64,
    /// Allowance left in the current period
    pub monthly_remaining: i64,
    /// Whole days until the period resets
    pub days_until_reset: i64,
    /// Credits received, bucketed by kind label
    pub earned_by_type: HashMap<String, i64>,
}

/// One row of a CSV-style transaction export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    /// Entry timestamp
    pub date: DateTime<Utc>,
    /// Kind label
    pub kind: String,
    /// Signed amount
    pub amount: i64,
    /// Description (entry description, or the kind label)
    pub description: String,
}

// ---------------------------------------------------------------------------
// External collaborators
// ---------------------------------------------------------------------------

/// Opportunity listing as supplied by the external directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    /// Opportunity ID
    pub id: Uuid,
    /// Whether the listing is still offered
    pub is_active: bool,
    /// Unlock price in credits
    pub credit_cost: i64,
}

/// Read-only view of the opportunity directory.
///
/// The unlock gate only reads active-status and cost; it never owns the
/// opportunity lifecycle.
pub trait OpportunityDirectory: Send + Sync {
    /// Look up an opportunity by ID
    fn lookup(&self, id: Uuid) -> Result<Option<Opportunity>>;
}

/// In-memory directory backed by a map, for tests and embedding
#[derive(Default)]
pub struct InMemoryDirectory {
    listings: parking_lot::RwLock<HashMap<Uuid, Opportunity>>,
}

impl InMemoryDirectory {
    /// Empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a listing
    pub fn put(&self, opportunity: Opportunity) {
        self.listings.write().insert(opportunity.id, opportunity);
    }
}

impl OpportunityDirectory for InMemoryDirectory {
    fn lookup(&self, id: Uuid) -> Result<Option<Opportunity>> {
        Ok(self.listings.read().get(&id).cloned())
    }
}

/// Notification template kinds dispatched after commits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    /// Payee received a tip
    TipReceived,
    /// Payout request reached a terminal state
    PayoutResolved,
}

/// Fire-and-forget notification sink.
///
/// Dispatch happens strictly after the financial commit; failure here is
/// logged and never rolls anything back.
pub trait NotificationDispatcher: Send + Sync {
    /// Deliver one notification
    fn dispatch(
        &self,
        account: &AccountId,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_earning_kinds() {
        assert!(TransactionKind::Post.is_earning());
        assert!(TransactionKind::Rating.is_earning());
        assert!(TransactionKind::CheckIn.is_earning());
        assert!(!TransactionKind::TipReceived.is_earning());
        assert!(!TransactionKind::SubscriptionEarnings.is_earning());
        assert!(!TransactionKind::SignupBonus.is_earning());
        assert!(!TransactionKind::PayoutReversal.is_earning());
    }

    #[test]
    fn test_tier_prices() {
        assert_eq!(SubscriptionTier::Basic.price(), 50);
        assert_eq!(SubscriptionTier::Premium.price(), 100);
        assert_eq!(SubscriptionTier::Vip.price(), 200);
        assert_eq!(SubscriptionTier::parse("vip"), Some(SubscriptionTier::Vip));
        assert_eq!(SubscriptionTier::parse("gold"), None);
    }

    #[test]
    fn test_account_id_validation() {
        assert!(AccountId::new("alice").validate().is_ok());
        assert!(AccountId::new("user_42").validate().is_ok());

        assert_eq!(AccountId::new("").validate().unwrap_err().code(), "validation");
        assert_eq!(
            AccountId::new("alice|mallory").validate().unwrap_err().code(),
            "validation"
        );
    }

    #[test]
    fn test_negative_amounts_rejected() {
        let mut account = Account::new(AccountId::new("alice"), Utc::now());
        account.apply_credit(100).unwrap();

        assert_eq!(account.apply_debit(-50).unwrap_err().code(), "validation");
        assert_eq!(account.apply_credit(-50).unwrap_err().code(), "validation");
        assert_eq!(account.balance, 100);

        // Zero credit is a legal no-op (a fully-fee'd transfer nets 0)
        account.apply_credit(0).unwrap();
        assert_eq!(account.balance, 100);
    }

    #[test]
    fn test_account_debit_never_negative() {
        let mut account = Account::new(AccountId::new("alice"), Utc::now());
        account.apply_credit(100).unwrap();

        let err = account.apply_debit(101).unwrap_err();
        assert_eq!(err.code(), "insufficient_balance");
        assert_eq!(account.balance, 100);

        account.apply_debit(100).unwrap();
        assert_eq!(account.balance, 0);
    }

    #[test]
    fn test_payout_resolves_exactly_once() {
        let mut payout = PayoutRequest {
            payout_id: Uuid::now_v7(),
            account_id: AccountId::new("bob"),
            amount: 150,
            method: "bank_transfer".into(),
            details: "DE89...".into(),
            status: PayoutStatus::Pending,
            requested_at: Utc::now(),
            processed_at: None,
        };

        payout.resolve(PayoutOutcome::Processed, Utc::now()).unwrap();
        assert_eq!(payout.status, PayoutStatus::Processed);
        assert!(payout.processed_at.is_some());
        assert!(payout.status.is_terminal());

        let err = payout.resolve(PayoutOutcome::Rejected, Utc::now()).unwrap_err();
        assert_eq!(err.code(), "payout_already_resolved");
        assert_eq!(payout.status, PayoutStatus::Processed);
    }

    #[test]
    fn test_history_filter() {
        let entry = TransactionEntry {
            entry_id: Uuid::now_v7(),
            account_id: AccountId::new("alice"),
            amount: -100,
            kind: TransactionKind::TipSent,
            related_entity: None,
            description: None,
            created_at: Utc::now(),
        };

        assert!(HistoryFilter::default().matches(&entry));

        let kind_filter = HistoryFilter {
            kinds: vec![TransactionKind::TipSent],
            ..Default::default()
        };
        assert!(kind_filter.matches(&entry));

        let other_kind = HistoryFilter {
            kinds: vec![TransactionKind::Post],
            ..Default::default()
        };
        assert!(!other_kind.matches(&entry));

        let future_only = HistoryFilter {
            since: Some(entry.created_at + chrono::Duration::hours(1)),
            ..Default::default()
        };
        assert!(!future_only.matches(&entry));
    }

    #[test]
    fn test_in_memory_directory() {
        let directory = InMemoryDirectory::new();
        let id = Uuid::now_v7();
        directory.put(Opportunity {
            id,
            is_active: true,
            credit_cost: 25,
        });

        let found = directory.lookup(id).unwrap().unwrap();
        assert_eq!(found.credit_cost, 25);
        assert!(directory.lookup(Uuid::now_v7()).unwrap().is_none());
    }
}
