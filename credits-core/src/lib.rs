//! Credits Core
//!
//! Internal credit ledger for the platform: account balances, an append-only
//! transaction log, fee-splitting transfers (tips and subscriptions), one-time
//! opportunity unlocks, a monthly earning cap, and a payout request pipeline.
//!
//! # Architecture
//!
//! - **Single Writer**: every mutation flows through one actor, so balance
//!   checks and commits can never interleave
//! - **Atomic Commits**: each operation is one RocksDB write batch; readers
//!   never observe half an operation
//! - **Append-only Log**: every balance change leaves a signed entry; the
//!   log is never rewritten
//!
//! # Invariants
//!
//! - Balances never go negative
//! - A transfer debits the gross and credits the floored net; the difference
//!   is platform revenue
//! - Each (account, opportunity) pair unlocks at most once, ever
//! - A payout request resolves exactly once

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod actor;
pub mod cap;
pub mod config;
pub mod error;
pub mod fees;
pub mod ledger;
pub mod metrics;
pub mod storage;
pub mod types;

// Re-exports
pub use cap::CapPolicy;
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::CreditLedger;
pub use storage::Storage;
pub use types::{
    Account, AccountId, CreditStats, HistoryFilter, IdempotencyKey, NotificationDispatcher,
    NotificationKind, Opportunity, OpportunityDirectory, PayoutOutcome, PayoutRequest,
    PayoutStatus, Subscription, SubscriptionStatus, SubscriptionTier, Tip, TransactionEntry,
    TransactionKind,
};
