//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `entries` - Append-only ledger rows (key: entry id, big-endian u64)
//! - `payouts` - Payout records (key: payout uuid)
//! - `indices` - Secondary indices for scans
//!
//! # Index layout
//!
//! All indices live in one column family, disambiguated by a one-byte tag:
//!
//! - `'u' || user_id || entry_id` - entries per user, insertion order
//! - `'o' || order_id` -> entry_id - contribution uniqueness per order
//! - `'s' || status || created_at_nanos || payout_id` - payouts per status,
//!   oldest first
//! - `'p' || user_id || created_at_nanos || payout_id` - payouts per user
//!
//! Every multi-row commit goes through a single `WriteBatch`: either all
//! rows land or none do.

use crate::{
    error::{Error, Result},
    types::{EntryId, EntryReason, LedgerEntry, Payout, PayoutStatus, UserId},
    Config,
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    WriteBatch, DB,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_ENTRIES: &str = "entries";
const CF_PAYOUTS: &str = "payouts";
const CF_INDICES: &str = "indices";

/// Index tags
const IDX_USER_ENTRY: u8 = b'u';
const IDX_ORDER: u8 = b'o';
const IDX_PAYOUT_STATUS: u8 = b's';
const IDX_USER_PAYOUT: u8 = b'p';

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,

    /// Next entry id; seeded from the highest existing key at open
    next_entry_id: AtomicU64,
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
            ColumnFamilyDescriptor::new(CF_ENTRIES, Self::cf_options_entries()),
            ColumnFamilyDescriptor::new(CF_PAYOUTS, Self::cf_options_payouts()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        let storage = Self {
            db: Arc::new(db),
            next_entry_id: AtomicU64::new(1),
        };
        storage.seed_entry_sequence()?;

        tracing::info!(path = ?path, "Opened ledger storage");

        Ok(storage)
    }

    fn cf_options_entries() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_payouts() -> Options {
        let mut opts = Options::default();
        // Payout rows are frequently re-read, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    /// Seed the entry id sequence from the last key in the entries CF
    fn seed_entry_sequence(&self) -> Result<()> {
        let cf = self.cf_handle(CF_ENTRIES)?;
        let mut iter = self.db.iterator_cf(cf, IteratorMode::End);

        if let Some(item) = iter.next() {
            let (key, _) = item?;
            if key.len() == 8 {
                let last = u64::from_be_bytes(key[..8].try_into().unwrap());
                self.next_entry_id.store(last + 1, Ordering::SeqCst);
            }
        }

        Ok(())
    }

    /// Allocate the next insertion-order entry id
    pub fn allocate_entry_id(&self) -> EntryId {
        EntryId::new(self.next_entry_id.fetch_add(1, Ordering::SeqCst))
    }

    // Key helpers

    fn entry_key(id: EntryId) -> [u8; 8] {
        id.get().to_be_bytes()
    }

    fn user_entry_key(user_id: UserId, entry_id: u64) -> Vec<u8> {
        let mut key = Vec::with_capacity(17);
        key.push(IDX_USER_ENTRY);
        key.extend_from_slice(&user_id.get().to_be_bytes());
        key.extend_from_slice(&entry_id.to_be_bytes());
        key
    }

    fn user_entry_prefix(user_id: UserId) -> Vec<u8> {
        let mut key = Vec::with_capacity(9);
        key.push(IDX_USER_ENTRY);
        key.extend_from_slice(&user_id.get().to_be_bytes());
        key
    }

    fn order_key(order_id: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(1 + order_id.len());
        key.push(IDX_ORDER);
        key.extend_from_slice(order_id.as_bytes());
        key
    }

    fn payout_status_key(payout: &Payout, status: PayoutStatus) -> Vec<u8> {
        let nanos = payout.created_at.timestamp_nanos_opt().unwrap_or(0);
        let mut key = Vec::with_capacity(26);
        key.push(IDX_PAYOUT_STATUS);
        key.push(status as u8);
        key.extend_from_slice(&nanos.to_be_bytes());
        key.extend_from_slice(payout.id.as_bytes());
        key
    }

    fn payout_status_prefix(status: PayoutStatus) -> [u8; 2] {
        [IDX_PAYOUT_STATUS, status as u8]
    }

    fn user_payout_key(payout: &Payout) -> Vec<u8> {
        let nanos = payout.created_at.timestamp_nanos_opt().unwrap_or(0);
        let mut key = Vec::with_capacity(33);
        key.push(IDX_USER_PAYOUT);
        key.extend_from_slice(&payout.user_id.get().to_be_bytes());
        key.extend_from_slice(&nanos.to_be_bytes());
        key.extend_from_slice(payout.id.as_bytes());
        key
    }

    fn user_payout_prefix(user_id: UserId) -> Vec<u8> {
        let mut key = Vec::with_capacity(9);
        key.push(IDX_USER_PAYOUT);
        key.extend_from_slice(&user_id.get().to_be_bytes());
        key
    }

    /// Stage an entry plus its indices into a batch
    fn stage_entry(&self, batch: &mut WriteBatch, entry: &LedgerEntry) -> Result<()> {
        let cf_entries = self.cf_handle(CF_ENTRIES)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let value = bincode::serialize(entry)?;
        batch.put_cf(cf_entries, Self::entry_key(entry.id), &value);
        batch.put_cf(
            cf_indices,
            Self::user_entry_key(entry.user_id, entry.id.get()),
            [],
        );

        // Contribution credits claim their order id
        if entry.reason == EntryReason::ContributionReceived {
            if let Some(order_id) = entry.order_id() {
                batch.put_cf(
                    cf_indices,
                    Self::order_key(order_id),
                    entry.id.get().to_be_bytes(),
                );
            }
        }

        Ok(())
    }

    // Entry operations

    /// Append a single entry with its indices (atomic)
    pub fn append_entry(&self, entry: &LedgerEntry) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.stage_entry(&mut batch, entry)?;
        self.db.write(batch)?;

        tracing::debug!(
            entry_id = %entry.id,
            user_id = %entry.user_id,
            reason = entry.reason.as_str(),
            "Entry appended"
        );

        Ok(())
    }

    /// Get entry by ID
    pub fn get_entry(&self, id: EntryId) -> Result<LedgerEntry> {
        let cf = self.cf_handle(CF_ENTRIES)?;

        let value = self
            .db
            .get_cf(cf, Self::entry_key(id))?
            .ok_or_else(|| Error::EntryNotFound(id.get()))?;

        let entry: LedgerEntry = bincode::deserialize(&value)?;
        Ok(entry)
    }

    /// Find the entry id holding a contribution for this order, if any
    pub fn find_contribution(&self, order_id: &str) -> Result<Option<EntryId>> {
        let cf = self.cf_handle(CF_INDICES)?;

        match self.db.get_cf(cf, Self::order_key(order_id))? {
            Some(value) if value.len() == 8 => Ok(Some(EntryId::new(u64::from_be_bytes(
                value[..8].try_into().unwrap(),
            )))),
            Some(_) => Err(Error::Storage("Corrupt order index value".to_string())),
            None => Ok(None),
        }
    }

    /// Entries for a user, oldest first
    pub fn entries_for_user(&self, user_id: UserId) -> Result<Vec<LedgerEntry>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let prefix = Self::user_entry_prefix(user_id);

        let iter = self.db.iterator_cf(
            cf_indices,
            IteratorMode::From(&prefix, Direction::Forward),
        );

        let mut entries = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let entry_id = u64::from_be_bytes(key[9..17].try_into().unwrap());
            entries.push(self.get_entry(EntryId::new(entry_id))?);
        }

        Ok(entries)
    }

    /// Entries for a user, newest first, paginated by exclusive cursor
    pub fn entries_for_user_desc(
        &self,
        user_id: UserId,
        limit: usize,
        before: Option<EntryId>,
    ) -> Result<Vec<LedgerEntry>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let prefix = Self::user_entry_prefix(user_id);

        // Start just below the cursor; u64::MAX when no cursor is given
        let start_id = match before {
            Some(id) if id.get() == 0 => return Ok(Vec::new()),
            Some(id) => id.get() - 1,
            None => u64::MAX,
        };
        let start = Self::user_entry_key(user_id, start_id);

        let iter = self
            .db
            .iterator_cf(cf_indices, IteratorMode::From(&start, Direction::Reverse));

        let mut entries = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            if entries.len() >= limit {
                break;
            }
            let entry_id = u64::from_be_bytes(key[9..17].try_into().unwrap());
            entries.push(self.get_entry(EntryId::new(entry_id))?);
        }

        Ok(entries)
    }

    /// Sum of credits minus debits for a user
    ///
    /// Zero for a user with no entries.
    pub fn balance_of(&self, user_id: UserId) -> Result<rust_decimal::Decimal> {
        let entries = self.entries_for_user(user_id)?;

        Ok(entries
            .iter()
            .map(LedgerEntry::signed_amount)
            .sum::<rust_decimal::Decimal>())
    }

    // Payout operations

    /// Create a payout together with its reservation debit (atomic)
    pub fn create_payout(&self, payout: &Payout, reservation: &LedgerEntry) -> Result<()> {
        let cf_payouts = self.cf_handle(CF_PAYOUTS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let mut batch = WriteBatch::default();

        let value = bincode::serialize(payout)?;
        batch.put_cf(cf_payouts, payout.id.as_bytes(), &value);
        batch.put_cf(cf_indices, Self::payout_status_key(payout, payout.status), []);
        batch.put_cf(cf_indices, Self::user_payout_key(payout), []);

        self.stage_entry(&mut batch, reservation)?;

        self.db.write(batch)?;

        tracing::debug!(
            payout_id = %payout.id,
            user_id = %payout.user_id,
            amount = %payout.amount,
            "Payout created with reservation debit"
        );

        Ok(())
    }

    /// Rewrite a payout row, moving its status index (atomic)
    ///
    /// When `reversal` is given the credit entry lands in the same batch,
    /// so a failed/cancelled payout and its balance restoration are
    /// indivisible.
    pub fn update_payout(
        &self,
        previous_status: PayoutStatus,
        payout: &Payout,
        reversal: Option<&LedgerEntry>,
    ) -> Result<()> {
        let cf_payouts = self.cf_handle(CF_PAYOUTS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let mut batch = WriteBatch::default();

        let value = bincode::serialize(payout)?;
        batch.put_cf(cf_payouts, payout.id.as_bytes(), &value);

        if previous_status != payout.status {
            batch.delete_cf(cf_indices, Self::payout_status_key(payout, previous_status));
            batch.put_cf(cf_indices, Self::payout_status_key(payout, payout.status), []);
        }

        if let Some(entry) = reversal {
            self.stage_entry(&mut batch, entry)?;
        }

        self.db.write(batch)?;

        Ok(())
    }

    /// Get payout by ID
    pub fn get_payout(&self, id: Uuid) -> Result<Payout> {
        let cf = self.cf_handle(CF_PAYOUTS)?;

        let value = self
            .db
            .get_cf(cf, id.as_bytes())?
            .ok_or(Error::PayoutNotFound(id))?;

        let payout: Payout = bincode::deserialize(&value)?;
        Ok(payout)
    }

    /// Payouts in a status, ordered by creation time ascending
    pub fn payouts_by_status(&self, status: PayoutStatus) -> Result<Vec<Payout>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let prefix = Self::payout_status_prefix(status);

        let iter = self.db.iterator_cf(
            cf_indices,
            IteratorMode::From(&prefix, Direction::Forward),
        );

        let mut payouts = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let id_bytes: [u8; 16] = key[10..26].try_into().unwrap();
            payouts.push(self.get_payout(Uuid::from_bytes(id_bytes))?);
        }

        Ok(payouts)
    }

    /// Payouts for a user, newest first
    pub fn payouts_for_user(&self, user_id: UserId, limit: usize) -> Result<Vec<Payout>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let prefix = Self::user_payout_prefix(user_id);

        // Upper bound: prefix with all-ones tail
        let mut start = prefix.clone();
        start.extend_from_slice(&[0xff; 24]);

        let iter = self
            .db
            .iterator_cf(cf_indices, IteratorMode::From(&start, Direction::Reverse));

        let mut payouts = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            if payouts.len() >= limit {
                break;
            }
            let id_bytes: [u8; 16] = key[17..33].try_into().unwrap();
            payouts.push(self.get_payout(Uuid::from_bytes(id_bytes))?);
        }

        Ok(payouts)
    }

    /// Aggregate payout figures across the whole store
    pub fn payout_statistics(&self) -> Result<crate::types::PayoutStatistics> {
        let cf = self.cf_handle(CF_PAYOUTS)?;
        let iter = self.db.iterator_cf(cf, IteratorMode::Start);

        let mut stats = crate::types::PayoutStatistics::default();
        for item in iter {
            let (_, value) = item?;
            let payout: Payout = bincode::deserialize(&value)?;

            stats.total_payouts += 1;
            stats.total_amount += payout.amount;
            stats.total_fees += payout.fee;
            if payout.status == PayoutStatus::Completed {
                stats.completed_count += 1;
                stats.completed_amount += payout.amount;
            }
        }

        Ok(stats)
    }

    /// Approximate number of entries (fast, for stats)
    pub fn entry_count_estimate(&self) -> Result<u64> {
        let cf = self.cf_handle(CF_ENTRIES)?;
        let count = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);
        Ok(count)
    }
}
