//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `accounts` - Account balances and cap counters (key: account id)
//! - `entries` - Append-only transaction log (key: entry_id, UUIDv7)
//! - `unlocks` - Unlock records (key: account|opportunity — the key IS the uniqueness constraint)
//! - `subscriptions` - Subscription rows (key: subscriber|creator, one row per pair)
//! - `tips` - Tip records (key: tip_id)
//! - `payouts` - Payout requests (key: payout_id)
//! - `indices` - Secondary indices (account|entry ordering, pending payouts)
//! - `idempotency` - Stored receipts keyed by idempotency token
//!
//! Every mutating operation commits one `WriteBatch`: either every row of an
//! operation lands, or none do.

use crate::{
    error::{Error, Result},
    types::{
        Account, AccountId, IdempotencyKey, PayoutRequest, StoredOutcome, Subscription, Tip,
        TransactionEntry, UnlockRecord,
    },
    Config,
};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode,
    Options, WriteBatch, DB,
};
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_ACCOUNTS: &str = "accounts";
const CF_ENTRIES: &str = "entries";
const CF_UNLOCKS: &str = "unlocks";
const CF_SUBSCRIPTIONS: &str = "subscriptions";
const CF_TIPS: &str = "tips";
const CF_PAYOUTS: &str = "payouts";
const CF_INDICES: &str = "indices";
const CF_IDEMPOTENCY: &str = "idempotency";

/// Non-ledger row carried inside a transfer commit
#[derive(Debug, Clone)]
pub enum TransferSide {
    /// Tip record persisted with the transfer
    Tip(Tip),
    /// Subscription row upserted with the transfer
    Subscription(Subscription),
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        // Universal compaction for the append-heavy entry log
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_ACCOUNTS, Self::cf_options_hot()),
            ColumnFamilyDescriptor::new(CF_ENTRIES, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_UNLOCKS, Self::cf_options_hot()),
            ColumnFamilyDescriptor::new(CF_SUBSCRIPTIONS, Self::cf_options_hot()),
            ColumnFamilyDescriptor::new(CF_TIPS, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_PAYOUTS, Self::cf_options_hot()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
            ColumnFamilyDescriptor::new(CF_IDEMPOTENCY, Self::cf_options_log()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = %path.display(), "Opened RocksDB credit store");

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_log() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_hot() -> Options {
        let mut opts = Options::default();
        // Frequently read rows, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        // Indices benefit from bloom filters
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false); // 10 bits per key
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    // Helper: get column family handle

    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Key construction

    fn key_unlock(account: &AccountId, opportunity_id: Uuid) -> Vec<u8> {
        let mut key = account.as_str().as_bytes().to_vec();
        key.push(b'|');
        key.extend_from_slice(opportunity_id.as_bytes());
        key
    }

    fn key_subscription(subscriber: &AccountId, creator: &AccountId) -> Vec<u8> {
        let mut key = subscriber.as_str().as_bytes().to_vec();
        key.push(b'|');
        key.extend_from_slice(creator.as_str().as_bytes());
        key
    }

    fn idx_prefix_account(account: &AccountId) -> Vec<u8> {
        let mut key = b"a|".to_vec();
        key.extend_from_slice(account.as_str().as_bytes());
        key.push(b'|');
        key
    }

    /// Index: a|account|entry_id — entry ids are UUIDv7, so a forward scan
    /// over this prefix yields the account's entries in chronological order.
    fn idx_account_entry(account: &AccountId, entry_id: Uuid) -> Vec<u8> {
        let mut key = Self::idx_prefix_account(account);
        key.extend_from_slice(entry_id.as_bytes());
        key
    }

    /// Index: p|payout_id — present only while the payout is Pending
    fn idx_pending_payout(payout_id: Uuid) -> Vec<u8> {
        let mut key = b"p|".to_vec();
        key.extend_from_slice(payout_id.as_bytes());
        key
    }

    // Account operations

    /// Get account by ID
    pub fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>> {
        let cf = self.cf(CF_ACCOUNTS)?;
        match self.db.get_cf(&cf, account_id.as_str().as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Put account (unbatched; used for test seeding and registration)
    pub fn put_account(&self, account: &Account) -> Result<()> {
        let cf = self.cf(CF_ACCOUNTS)?;
        let value = bincode::serialize(account)?;
        self.db.put_cf(&cf, account.id.as_str().as_bytes(), value)?;
        Ok(())
    }

    // Entry operations

    /// Get entry by ID
    pub fn get_entry(&self, entry_id: Uuid) -> Result<TransactionEntry> {
        let cf = self.cf(CF_ENTRIES)?;
        let value = self
            .db
            .get_cf(&cf, entry_id.as_bytes())?
            .ok_or_else(|| Error::EntryNotFound(entry_id.to_string()))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Get all entries for an account, oldest first
    pub fn account_entries(&self, account_id: &AccountId) -> Result<Vec<TransactionEntry>> {
        let cf_indices = self.cf(CF_INDICES)?;
        let prefix = Self::idx_prefix_account(account_id);

        let iter = self
            .db
            .iterator_cf(&cf_indices, IteratorMode::From(&prefix, Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let entry_id_bytes: [u8; 16] = key[prefix.len()..]
                .try_into()
                .map_err(|_| Error::Storage("Malformed account-entry index key".to_string()))?;
            entries.push(self.get_entry(Uuid::from_bytes(entry_id_bytes))?);
        }

        Ok(entries)
    }

    /// Iterate the entire entry log (reconciliation reads)
    pub fn all_entries(&self) -> Result<Vec<TransactionEntry>> {
        let cf = self.cf(CF_ENTRIES)?;
        let iter = self.db.iterator_cf(&cf, IteratorMode::Start);

        let mut entries = Vec::new();
        for item in iter {
            let (_, value) = item?;
            entries.push(bincode::deserialize(&value)?);
        }
        Ok(entries)
    }

    // Unlock operations

    /// Whether an unlock record exists for the pair
    pub fn unlock_exists(&self, account_id: &AccountId, opportunity_id: Uuid) -> Result<bool> {
        let cf = self.cf(CF_UNLOCKS)?;
        let key = Self::key_unlock(account_id, opportunity_id);
        Ok(self.db.get_cf(&cf, key)?.is_some())
    }

    /// Get an unlock record
    pub fn get_unlock(
        &self,
        account_id: &AccountId,
        opportunity_id: Uuid,
    ) -> Result<Option<UnlockRecord>> {
        let cf = self.cf(CF_UNLOCKS)?;
        let key = Self::key_unlock(account_id, opportunity_id);
        match self.db.get_cf(&cf, key)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    // Subscription operations

    /// Get the single subscription row for a (subscriber, creator) pair
    pub fn get_subscription(
        &self,
        subscriber: &AccountId,
        creator: &AccountId,
    ) -> Result<Option<Subscription>> {
        let cf = self.cf(CF_SUBSCRIPTIONS)?;
        let key = Self::key_subscription(subscriber, creator);
        match self.db.get_cf(&cf, key)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Put subscription row (unbatched; cancellation path)
    pub fn put_subscription(&self, subscription: &Subscription) -> Result<()> {
        let cf = self.cf(CF_SUBSCRIPTIONS)?;
        let key = Self::key_subscription(&subscription.subscriber, &subscription.creator);
        self.db.put_cf(&cf, key, bincode::serialize(subscription)?)?;
        Ok(())
    }

    // Tip operations

    /// Get tip by ID
    pub fn get_tip(&self, tip_id: Uuid) -> Result<Option<Tip>> {
        let cf = self.cf(CF_TIPS)?;
        match self.db.get_cf(&cf, tip_id.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    // Payout operations

    /// Get payout request by ID
    pub fn get_payout(&self, payout_id: Uuid) -> Result<Option<PayoutRequest>> {
        let cf = self.cf(CF_PAYOUTS)?;
        match self.db.get_cf(&cf, payout_id.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// All payout requests still pending, for the back office
    pub fn pending_payouts(&self) -> Result<Vec<PayoutRequest>> {
        let cf_indices = self.cf(CF_INDICES)?;
        let prefix: &[u8] = b"p|";

        let iter = self
            .db
            .iterator_cf(&cf_indices, IteratorMode::From(prefix, Direction::Forward));

        let mut payouts = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            let payout_id_bytes: [u8; 16] = key[prefix.len()..]
                .try_into()
                .map_err(|_| Error::Storage("Malformed pending-payout index key".to_string()))?;
            let payout_id = Uuid::from_bytes(payout_id_bytes);
            let payout = self
                .get_payout(payout_id)?
                .ok_or_else(|| Error::PayoutNotFound(payout_id.to_string()))?;
            payouts.push(payout);
        }

        Ok(payouts)
    }

    // Idempotency

    /// Stored receipt for a previously applied mutation, if any
    pub fn get_stored_outcome(&self, key: &IdempotencyKey) -> Result<Option<StoredOutcome>> {
        let cf = self.cf(CF_IDEMPOTENCY)?;
        match self.db.get_cf(&cf, key.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    // Batch helpers

    fn batch_account(&self, batch: &mut WriteBatch, account: &Account) -> Result<()> {
        let cf = self.cf(CF_ACCOUNTS)?;
        batch.put_cf(&cf, account.id.as_str().as_bytes(), bincode::serialize(account)?);
        Ok(())
    }

    fn batch_entry(&self, batch: &mut WriteBatch, entry: &TransactionEntry) -> Result<()> {
        let cf_entries = self.cf(CF_ENTRIES)?;
        batch.put_cf(&cf_entries, entry.entry_id.as_bytes(), bincode::serialize(entry)?);

        let cf_indices = self.cf(CF_INDICES)?;
        let idx = Self::idx_account_entry(&entry.account_id, entry.entry_id);
        batch.put_cf(&cf_indices, idx, b"");
        Ok(())
    }

    fn batch_idempotency(
        &self,
        batch: &mut WriteBatch,
        key: &IdempotencyKey,
        outcome: &StoredOutcome,
    ) -> Result<()> {
        let cf = self.cf(CF_IDEMPOTENCY)?;
        batch.put_cf(&cf, key.as_bytes(), bincode::serialize(outcome)?);
        Ok(())
    }

    // Atomic commits, one per operation shape

    /// Commit a standalone credit or debit: account + entry + receipt
    pub fn commit_balance_change(
        &self,
        account: &Account,
        entry: &TransactionEntry,
        idempotency: Option<(&IdempotencyKey, &StoredOutcome)>,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.batch_account(&mut batch, account)?;
        self.batch_entry(&mut batch, entry)?;
        if let Some((key, outcome)) = idempotency {
            self.batch_idempotency(&mut batch, key, outcome)?;
        }
        self.db.write(batch)?;

        tracing::debug!(
            account = %account.id,
            entry_id = %entry.entry_id,
            amount = entry.amount,
            kind = %entry.kind,
            "Balance change committed"
        );
        Ok(())
    }

    /// Commit a two-sided transfer: both accounts, both entries, the optional
    /// tip or subscription row, and the receipt — all or nothing.
    #[allow(clippy::too_many_arguments)]
    pub fn commit_transfer(
        &self,
        payer: &Account,
        payee: &Account,
        payer_entry: &TransactionEntry,
        payee_entry: &TransactionEntry,
        side: Option<&TransferSide>,
        idempotency: Option<(&IdempotencyKey, &StoredOutcome)>,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.batch_account(&mut batch, payer)?;
        self.batch_account(&mut batch, payee)?;
        self.batch_entry(&mut batch, payer_entry)?;
        self.batch_entry(&mut batch, payee_entry)?;

        match side {
            Some(TransferSide::Tip(tip)) => {
                let cf = self.cf(CF_TIPS)?;
                batch.put_cf(&cf, tip.tip_id.as_bytes(), bincode::serialize(tip)?);
            }
            Some(TransferSide::Subscription(subscription)) => {
                let cf = self.cf(CF_SUBSCRIPTIONS)?;
                let key = Self::key_subscription(&subscription.subscriber, &subscription.creator);
                batch.put_cf(&cf, key, bincode::serialize(subscription)?);
            }
            None => {}
        }

        if let Some((key, outcome)) = idempotency {
            self.batch_idempotency(&mut batch, key, outcome)?;
        }
        self.db.write(batch)?;

        tracing::debug!(
            payer = %payer.id,
            payee = %payee.id,
            debit = payer_entry.amount,
            credit = payee_entry.amount,
            "Transfer committed"
        );
        Ok(())
    }

    /// Commit an unlock purchase: account + entry + unlock record + receipt
    pub fn commit_unlock(
        &self,
        account: &Account,
        entry: &TransactionEntry,
        record: &UnlockRecord,
        idempotency: Option<(&IdempotencyKey, &StoredOutcome)>,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.batch_account(&mut batch, account)?;
        self.batch_entry(&mut batch, entry)?;

        let cf = self.cf(CF_UNLOCKS)?;
        let key = Self::key_unlock(&record.account_id, record.opportunity_id);
        batch.put_cf(&cf, key, bincode::serialize(record)?);

        if let Some((key, outcome)) = idempotency {
            self.batch_idempotency(&mut batch, key, outcome)?;
        }
        self.db.write(batch)?;

        tracing::debug!(
            account = %account.id,
            opportunity = %record.opportunity_id,
            cost = record.cost,
            "Unlock committed"
        );
        Ok(())
    }

    /// Commit a payout request: account (held debit) + entry + Pending row
    pub fn commit_payout_request(
        &self,
        account: &Account,
        entry: &TransactionEntry,
        payout: &PayoutRequest,
        idempotency: Option<(&IdempotencyKey, &StoredOutcome)>,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.batch_account(&mut batch, account)?;
        self.batch_entry(&mut batch, entry)?;

        let cf_payouts = self.cf(CF_PAYOUTS)?;
        batch.put_cf(&cf_payouts, payout.payout_id.as_bytes(), bincode::serialize(payout)?);

        let cf_indices = self.cf(CF_INDICES)?;
        batch.put_cf(&cf_indices, Self::idx_pending_payout(payout.payout_id), b"");

        if let Some((key, outcome)) = idempotency {
            self.batch_idempotency(&mut batch, key, outcome)?;
        }
        self.db.write(batch)?;

        tracing::debug!(
            account = %account.id,
            payout_id = %payout.payout_id,
            amount = payout.amount,
            "Payout request committed"
        );
        Ok(())
    }

    /// Commit a payout resolution: terminal row, pending index removal, and
    /// for rejections the refund credit + reversal entry in the same batch.
    pub fn commit_payout_resolution(
        &self,
        payout: &PayoutRequest,
        refund: Option<(&Account, &TransactionEntry)>,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();

        let cf_payouts = self.cf(CF_PAYOUTS)?;
        batch.put_cf(&cf_payouts, payout.payout_id.as_bytes(), bincode::serialize(payout)?);

        let cf_indices = self.cf(CF_INDICES)?;
        batch.delete_cf(&cf_indices, Self::idx_pending_payout(payout.payout_id));

        if let Some((account, entry)) = refund {
            self.batch_account(&mut batch, account)?;
            self.batch_entry(&mut batch, entry)?;
        }
        self.db.write(batch)?;

        tracing::debug!(
            payout_id = %payout.payout_id,
            status = ?payout.status,
            refunded = refund.is_some(),
            "Payout resolution committed"
        );
        Ok(())
    }

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            total_accounts: self.approximate_count(CF_ACCOUNTS)?,
            total_entries: self.approximate_count(CF_ENTRIES)?,
            total_payouts: self.approximate_count(CF_PAYOUTS)?,
        })
    }

    fn approximate_count(&self, cf_name: &str) -> Result<u64> {
        let cf = self.cf(cf_name)?;
        // RocksDB property for approximate count
        let prop = self
            .db
            .property_int_value_cf(&cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);
        Ok(prop)
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Approximate account count
    pub total_accounts: u64,
    /// Approximate entry count
    pub total_entries: u64,
    /// Approximate payout request count
    pub total_payouts: u64,
}
