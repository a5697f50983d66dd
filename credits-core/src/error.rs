//! Error types for the credit ledger

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Credit ledger errors
///
/// Every rejection carries a stable machine-readable code (see [`Error::code`])
/// plus the human-readable message from `Display`. Presentation layers decide
/// how to surface them.
#[derive(Error, Debug)]
pub enum Error {
    /// Input rejected before any state change (out-of-range tip, payout below minimum, ...)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Debit exceeds the account balance; no partial effect
    #[error("Insufficient balance on {account}: requested {requested}, available {available}")]
    InsufficientBalance {
        /// Account that was short
        account: String,
        /// Amount the operation needed
        requested: i64,
        /// Balance at the time of the check
        available: i64,
    },

    /// Monthly earning cap reached
    #[error("Monthly earning cap reached on {account}: {remaining} of {cap} credits remaining")]
    CapExceeded {
        /// Account at the cap
        account: String,
        /// Configured monthly cap
        cap: i64,
        /// Allowance left in the current period
        remaining: i64,
    },

    /// Unlock already purchased for this (user, opportunity) pair
    #[error("Opportunity {opportunity} already unlocked by {account}")]
    AlreadyUnlocked {
        /// Purchasing account
        account: String,
        /// Opportunity in question
        opportunity: String,
    },

    /// Opportunity exists but is no longer offered
    #[error("Opportunity {0} is not active")]
    OpportunityInactive(String),

    /// Account not found
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Opportunity not found in the directory
    #[error("Opportunity not found: {0}")]
    OpportunityNotFound(String),

    /// Payout request not found
    #[error("Payout request not found: {0}")]
    PayoutNotFound(String),

    /// No subscription row for the (subscriber, creator) pair
    #[error("No subscription from {subscriber} to {creator}")]
    SubscriptionNotFound {
        /// Paying account
        subscriber: String,
        /// Creator account
        creator: String,
    },

    /// Transaction entry not found
    #[error("Transaction entry not found: {0}")]
    EntryNotFound(String),

    /// Payout request already in a terminal state
    #[error("Payout {0} already resolved")]
    PayoutAlreadyResolved(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable machine-readable reason code
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::InsufficientBalance { .. } => "insufficient_balance",
            Error::CapExceeded { .. } => "cap_exceeded",
            Error::AlreadyUnlocked { .. } => "already_unlocked",
            Error::OpportunityInactive(_) => "opportunity_inactive",
            Error::AccountNotFound(_)
            | Error::OpportunityNotFound(_)
            | Error::PayoutNotFound(_)
            | Error::SubscriptionNotFound { .. }
            | Error::EntryNotFound(_) => "not_found",
            Error::PayoutAlreadyResolved(_) => "payout_already_resolved",
            Error::Storage(_) => "storage",
            Error::Serialization(_) => "serialization",
            Error::Concurrency(_) => "concurrency",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
