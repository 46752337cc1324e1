//! Main ledger orchestration layer
//!
//! This module ties storage, validation, and locking together into the
//! high-level API the payout and contribution components consume.
//!
//! # Concurrency
//!
//! Readers never lock: writers only append, so a concurrent balance scan
//! simply may or may not see the newest row. Every check-then-write
//! sequence that makes a financial decision (reserving a payout, claiming
//! an order id, moving a payout status) runs under a per-user or
//! per-payout lock, and its rows land in a single atomic batch.
//!
//! # Example
//!
//! ```no_run
//! use ledger_core::{Config, Ledger, NewEntry};
//! use ledger_core::types::{EntryReason, UserId};
//! use rust_decimal::Decimal;
//!
//! fn main() -> ledger_core::Result<()> {
//!     let ledger = Ledger::open(Config::default())?;
//!
//!     let entry = ledger.record(NewEntry::credit(
//!         UserId::new(42),
//!         Decimal::from(25_000),
//!         EntryReason::ContributionReceived,
//!     ))?;
//!     assert_eq!(ledger.balance_of(entry.user_id)?, Decimal::from(25_000));
//!
//!     Ok(())
//! }
//! ```

use crate::{
    metrics::Metrics,
    types::{
        Currency, EntryId, EntryKind, EntryReason, LedgerEntry, Payout, PayoutStatistics,
        PayoutStatus, UserId,
    },
    Config, Error, Result, Storage,
};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Default currency for entries that do not specify one
pub const DEFAULT_CURRENCY: Currency = Currency::CLP;

/// A not-yet-booked ledger entry
#[derive(Debug, Clone)]
pub struct NewEntry {
    /// Owning account
    pub user_id: UserId,

    /// Credit or debit
    pub kind: EntryKind,

    /// Positive amount
    pub amount: Decimal,

    /// Currency
    pub currency: Currency,

    /// Why the entry is booked
    pub reason: EntryReason,

    /// Related payout, if any
    pub payout_ref: Option<Uuid>,

    /// Opaque annotations
    pub metadata: HashMap<String, String>,
}

impl NewEntry {
    /// Credit in the default currency
    pub fn credit(user_id: UserId, amount: Decimal, reason: EntryReason) -> Self {
        Self {
            user_id,
            kind: EntryKind::Credit,
            amount,
            currency: DEFAULT_CURRENCY,
            reason,
            payout_ref: None,
            metadata: HashMap::new(),
        }
    }

    /// Debit in the default currency
    pub fn debit(user_id: UserId, amount: Decimal, reason: EntryReason) -> Self {
        Self {
            user_id,
            kind: EntryKind::Debit,
            amount,
            currency: DEFAULT_CURRENCY,
            reason,
            payout_ref: None,
            metadata: HashMap::new(),
        }
    }

    /// Set currency
    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    /// Link to a payout
    pub fn with_payout_ref(mut self, payout_id: Uuid) -> Self {
        self.payout_ref = Some(payout_id);
        self
    }

    /// Add a metadata annotation
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Main ledger interface
pub struct Ledger {
    /// Storage backend
    storage: Arc<Storage>,

    /// Serializes check-then-write sequences per user
    user_locks: DashMap<UserId, Arc<Mutex<()>>>,

    /// Serializes status transitions per payout
    payout_locks: DashMap<Uuid, Arc<Mutex<()>>>,

    /// Per-user write counters, bumped on every append; lets balance
    /// caches detect staleness without a storage read
    user_versions: DashMap<UserId, Arc<AtomicU64>>,

    /// Metrics collector
    metrics: Metrics,
}

impl Ledger {
    /// Open ledger with configuration
    pub fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let metrics = Metrics::new().map_err(|e| Error::Other(e.to_string()))?;

        Ok(Self {
            storage,
            user_locks: DashMap::new(),
            payout_locks: DashMap::new(),
            user_versions: DashMap::new(),
            metrics,
        })
    }

    /// Metrics collector handle
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    fn user_lock(&self, user_id: UserId) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn payout_lock(&self, payout_id: Uuid) -> Arc<Mutex<()>> {
        self.payout_locks
            .entry(payout_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn bump_user_version(&self, user_id: UserId) {
        self.user_versions
            .entry(user_id)
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .fetch_add(1, Ordering::SeqCst);
    }

    /// Current write version for a user (for read-through caches)
    pub fn user_version(&self, user_id: UserId) -> u64 {
        self.user_versions
            .get(&user_id)
            .map(|v| v.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    fn build_entry(&self, new: NewEntry) -> LedgerEntry {
        LedgerEntry {
            id: self.storage.allocate_entry_id(),
            user_id: new.user_id,
            kind: new.kind,
            amount: new.amount,
            currency: new.currency,
            reason: new.reason,
            payout_ref: new.payout_ref,
            metadata: new.metadata,
            created_at: Utc::now(),
        }
    }

    // Entry operations

    /// Append one immutable entry
    ///
    /// Fails with `InvalidAmount` for non-positive amounts and with
    /// `DuplicateContribution` when a `ContributionReceived` entry names
    /// an order id that is already booked. Never mutates existing rows.
    pub fn record(&self, new: NewEntry) -> Result<LedgerEntry> {
        if new.amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount(new.amount));
        }

        let lock = self.user_lock(new.user_id);
        let _guard = lock.lock();

        // The order id claim must be checked under the lock so two
        // concurrent recordings of one order cannot both pass
        if new.reason == EntryReason::ContributionReceived {
            if let Some(order_id) = new.metadata.get(crate::types::META_ORDER_ID) {
                if self.storage.find_contribution(order_id)?.is_some() {
                    return Err(Error::DuplicateContribution {
                        order_id: order_id.clone(),
                    });
                }
            }
        }

        let entry = self.build_entry(new);
        let started = std::time::Instant::now();
        self.storage.append_entry(&entry)?;
        self.metrics
            .record_append_duration(started.elapsed().as_secs_f64());
        self.metrics.record_entry_append();
        self.bump_user_version(entry.user_id);

        tracing::info!(
            entry_id = %entry.id,
            user_id = %entry.user_id,
            kind = ?entry.kind,
            amount = %entry.amount,
            reason = entry.reason.as_str(),
            "Ledger entry recorded"
        );

        Ok(entry)
    }

    /// Current balance: sum of credits minus sum of debits
    ///
    /// Zero for a user with no entries, never an error.
    pub fn balance_of(&self, user_id: UserId) -> Result<Decimal> {
        self.storage.balance_of(user_id)
    }

    /// Entry history, newest first
    ///
    /// `before` is an exclusive cursor: pass the id of the last entry of
    /// the previous page. Cursors stay correct under concurrent inserts
    /// because ids are insertion-ordered.
    pub fn history(
        &self,
        user_id: UserId,
        limit: usize,
        before: Option<EntryId>,
    ) -> Result<Vec<LedgerEntry>> {
        self.storage.entries_for_user_desc(user_id, limit, before)
    }

    /// Get entry by ID
    pub fn entry(&self, id: EntryId) -> Result<LedgerEntry> {
        self.storage.get_entry(id)
    }

    /// The contribution entry already booked for an order, if any
    pub fn find_contribution(&self, order_id: &str) -> Result<Option<LedgerEntry>> {
        match self.storage.find_contribution(order_id)? {
            Some(id) => Ok(Some(self.storage.get_entry(id)?)),
            None => Ok(None),
        }
    }

    // Payout primitives
    //
    // The payout state machine itself lives in the payout engine; these
    // primitives guarantee that each of its moves is atomic against the
    // store.

    /// Reserve funds for a payout
    ///
    /// Under the user lock: recomputes the balance, rejects an overdraw
    /// with `InsufficientBalance`, then writes the payout row and its
    /// reservation debit in one batch. A payout can never exist without
    /// its reservation debit.
    pub fn reserve_payout(&self, payout: Payout) -> Result<(Payout, LedgerEntry)> {
        if payout.amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount(payout.amount));
        }

        let lock = self.user_lock(payout.user_id);
        let _guard = lock.lock();

        let available = self.storage.balance_of(payout.user_id)?;
        if payout.amount > available {
            return Err(Error::InsufficientBalance {
                available,
                requested: payout.amount,
            });
        }

        let reservation = self.build_entry(
            NewEntry::debit(payout.user_id, payout.amount, EntryReason::PayoutRequested)
                .with_currency(payout.currency)
                .with_payout_ref(payout.id),
        );

        self.storage.create_payout(&payout, &reservation)?;
        self.metrics.record_entry_append();
        self.metrics.record_payout_created();
        self.bump_user_version(payout.user_id);

        tracing::info!(
            payout_id = %payout.id,
            user_id = %payout.user_id,
            amount = %payout.amount,
            net_amount = %payout.net_amount,
            "Payout reserved"
        );

        Ok((payout, reservation))
    }

    /// Compare-and-set a payout status
    ///
    /// Exactly one of several concurrent callers can move a payout from
    /// `from` to `to`; the others get `InvalidTransition` carrying the
    /// status they actually observed.
    pub fn transition_payout(
        &self,
        payout_id: Uuid,
        from: PayoutStatus,
        to: PayoutStatus,
    ) -> Result<Payout> {
        let lock = self.payout_lock(payout_id);
        let _guard = lock.lock();

        let mut payout = self.storage.get_payout(payout_id)?;
        if payout.status != from || !from.can_transition(to) {
            return Err(Error::InvalidTransition {
                payout_id,
                from: payout.status,
                to,
            });
        }

        let previous = payout.status;
        payout.status = to;
        payout.updated_at = Utc::now();
        self.storage.update_payout(previous, &payout, None)?;

        tracing::info!(
            payout_id = %payout_id,
            from = %previous,
            to = %to,
            "Payout transitioned"
        );

        Ok(payout)
    }

    /// Settle a payout: Processing -> Completed
    ///
    /// Stores the provider transaction id and stamps `completed_at`.
    pub fn complete_payout(&self, payout_id: Uuid, gateway_transaction_id: &str) -> Result<Payout> {
        let lock = self.payout_lock(payout_id);
        let _guard = lock.lock();

        let mut payout = self.storage.get_payout(payout_id)?;
        if payout.status != PayoutStatus::Processing {
            return Err(Error::InvalidTransition {
                payout_id,
                from: payout.status,
                to: PayoutStatus::Completed,
            });
        }

        let previous = payout.status;
        let now = Utc::now();
        payout.status = PayoutStatus::Completed;
        payout.gateway_transaction_id = Some(gateway_transaction_id.to_string());
        payout.updated_at = now;
        payout.completed_at = Some(now);
        self.storage.update_payout(previous, &payout, None)?;

        tracing::info!(
            payout_id = %payout_id,
            gateway_transaction_id,
            "Payout completed"
        );

        Ok(payout)
    }

    /// Release a reservation: CAS plus reversal credit in one batch
    ///
    /// Used for Pending -> Cancelled (`PayoutCancelled`) and
    /// Processing -> Failed (`PayoutFailed`). The reversal restores the
    /// user's balance to its pre-reservation value.
    pub fn release_payout(
        &self,
        payout_id: Uuid,
        from: PayoutStatus,
        to: PayoutStatus,
        reason: EntryReason,
    ) -> Result<(Payout, LedgerEntry)> {
        let lock = self.payout_lock(payout_id);
        let _guard = lock.lock();

        let mut payout = self.storage.get_payout(payout_id)?;
        if payout.status != from || !from.can_transition(to) {
            return Err(Error::InvalidTransition {
                payout_id,
                from: payout.status,
                to,
            });
        }

        let reversal = self.build_entry(
            NewEntry::credit(payout.user_id, payout.amount, reason)
                .with_currency(payout.currency)
                .with_payout_ref(payout.id),
        );

        let previous = payout.status;
        payout.status = to;
        payout.updated_at = Utc::now();
        self.storage
            .update_payout(previous, &payout, Some(&reversal))?;
        self.metrics.record_entry_append();
        self.bump_user_version(payout.user_id);

        tracing::info!(
            payout_id = %payout_id,
            from = %previous,
            to = %to,
            reversal_entry = %reversal.id,
            "Payout released, balance restored"
        );

        Ok((payout, reversal))
    }

    /// Record one more transfer attempt against a payout
    pub fn note_payout_attempt(&self, payout_id: Uuid) -> Result<Payout> {
        let lock = self.payout_lock(payout_id);
        let _guard = lock.lock();

        let mut payout = self.storage.get_payout(payout_id)?;
        let previous = payout.status;
        payout.attempts += 1;
        payout.updated_at = Utc::now();
        self.storage.update_payout(previous, &payout, None)?;

        Ok(payout)
    }

    /// Flag a payout for operator review
    pub fn flag_manual_review(&self, payout_id: Uuid) -> Result<Payout> {
        let lock = self.payout_lock(payout_id);
        let _guard = lock.lock();

        let mut payout = self.storage.get_payout(payout_id)?;
        let previous = payout.status;
        payout.manual_review = true;
        payout.updated_at = Utc::now();
        self.storage.update_payout(previous, &payout, None)?;

        tracing::warn!(payout_id = %payout_id, "Payout flagged for manual review");

        Ok(payout)
    }

    /// Get payout by ID
    pub fn payout(&self, payout_id: Uuid) -> Result<Payout> {
        self.storage.get_payout(payout_id)
    }

    /// Payouts in a status, oldest first
    pub fn payouts_with_status(&self, status: PayoutStatus) -> Result<Vec<Payout>> {
        self.storage.payouts_by_status(status)
    }

    /// Withdrawal history for a user, newest first
    pub fn payouts_for_user(&self, user_id: UserId, limit: usize) -> Result<Vec<Payout>> {
        self.storage.payouts_for_user(user_id, limit)
    }

    /// Aggregate payout figures for reporting
    pub fn payout_statistics(&self) -> Result<PayoutStatistics> {
        self.storage.payout_statistics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BankAccount;

    fn test_ledger() -> (Ledger, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Ledger::open(config).unwrap(), temp_dir)
    }

    fn test_destination() -> BankAccount {
        BankAccount {
            holder_name: "Camila Rojas".to_string(),
            rut: "12.345.678-5".to_string(),
            bank_name: "Banco de Chile".to_string(),
            account_number: "001234567890".to_string(),
        }
    }

    fn fund(ledger: &Ledger, user: UserId, amount: i64) {
        ledger
            .record(NewEntry::credit(
                user,
                Decimal::from(amount),
                EntryReason::ContributionReceived,
            ))
            .unwrap();
    }

    #[test]
    fn test_record_and_balance() {
        let (ledger, _temp) = test_ledger();
        let user = UserId::new(1);

        fund(&ledger, user, 30_000);
        ledger
            .record(NewEntry::debit(
                user,
                Decimal::from(12_000),
                EntryReason::AdjustmentManual,
            ))
            .unwrap();

        assert_eq!(ledger.balance_of(user).unwrap(), Decimal::from(18_000));
    }

    #[test]
    fn test_record_rejects_non_positive_amount() {
        let (ledger, _temp) = test_ledger();
        let user = UserId::new(1);

        let zero = ledger.record(NewEntry::credit(
            user,
            Decimal::ZERO,
            EntryReason::AdjustmentManual,
        ));
        assert!(matches!(zero, Err(Error::InvalidAmount(_))));

        let negative = ledger.record(NewEntry::credit(
            user,
            Decimal::from(-100),
            EntryReason::AdjustmentManual,
        ));
        assert!(matches!(negative, Err(Error::InvalidAmount(_))));

        assert_eq!(ledger.balance_of(user).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_duplicate_contribution_rejected() {
        let (ledger, _temp) = test_ledger();
        let user = UserId::new(1);

        let entry = NewEntry::credit(
            user,
            Decimal::from(25_000),
            EntryReason::ContributionReceived,
        )
        .with_metadata(crate::types::META_ORDER_ID, "wc-1001");

        ledger.record(entry.clone()).unwrap();
        let dup = ledger.record(entry);
        assert!(matches!(
            dup,
            Err(Error::DuplicateContribution { ref order_id }) if order_id == "wc-1001"
        ));

        assert_eq!(ledger.balance_of(user).unwrap(), Decimal::from(25_000));
    }

    #[test]
    fn test_balance_zero_for_unknown_user() {
        let (ledger, _temp) = test_ledger();
        assert_eq!(ledger.balance_of(UserId::new(404)).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_reserve_payout_insufficient_balance() {
        let (ledger, _temp) = test_ledger();
        let user = UserId::new(1);
        fund(&ledger, user, 10_000);

        let payout = Payout::new(
            user,
            Decimal::from(20_000),
            Decimal::from(400),
            Currency::CLP,
            test_destination(),
        );
        let payout_id = payout.id;
        let result = ledger.reserve_payout(payout);
        assert!(matches!(
            result,
            Err(Error::InsufficientBalance { available, requested })
                if available == Decimal::from(10_000) && requested == Decimal::from(20_000)
        ));

        // No side effects: balance intact, no payout row
        assert_eq!(ledger.balance_of(user).unwrap(), Decimal::from(10_000));
        assert!(matches!(
            ledger.payout(payout_id),
            Err(Error::PayoutNotFound(_))
        ));
        assert!(ledger.history(user, 10, None).unwrap().len() == 1);
    }

    #[test]
    fn test_reserve_payout_books_debit() {
        let (ledger, _temp) = test_ledger();
        let user = UserId::new(1);
        fund(&ledger, user, 50_000);

        let payout = Payout::new(
            user,
            Decimal::from(20_000),
            Decimal::from(400),
            Currency::CLP,
            test_destination(),
        );
        let (payout, reservation) = ledger.reserve_payout(payout).unwrap();

        assert_eq!(reservation.kind, EntryKind::Debit);
        assert_eq!(reservation.reason, EntryReason::PayoutRequested);
        assert_eq!(reservation.payout_ref, Some(payout.id));
        assert_eq!(ledger.balance_of(user).unwrap(), Decimal::from(30_000));
    }

    #[test]
    fn test_transition_cas_single_winner() {
        let (ledger, _temp) = test_ledger();
        let user = UserId::new(1);
        fund(&ledger, user, 50_000);

        let payout = Payout::new(
            user,
            Decimal::from(20_000),
            Decimal::from(400),
            Currency::CLP,
            test_destination(),
        );
        let (payout, _) = ledger.reserve_payout(payout).unwrap();

        let first = ledger.transition_payout(payout.id, PayoutStatus::Pending, PayoutStatus::Processing);
        assert!(first.is_ok());

        let second = ledger.transition_payout(payout.id, PayoutStatus::Pending, PayoutStatus::Processing);
        assert!(matches!(
            second,
            Err(Error::InvalidTransition { from: PayoutStatus::Processing, .. })
        ));
    }

    #[test]
    fn test_release_restores_balance() {
        let (ledger, _temp) = test_ledger();
        let user = UserId::new(1);
        fund(&ledger, user, 50_000);

        let payout = Payout::new(
            user,
            Decimal::from(20_000),
            Decimal::from(400),
            Currency::CLP,
            test_destination(),
        );
        let (payout, _) = ledger.reserve_payout(payout).unwrap();
        assert_eq!(ledger.balance_of(user).unwrap(), Decimal::from(30_000));

        let (released, reversal) = ledger
            .release_payout(
                payout.id,
                PayoutStatus::Pending,
                PayoutStatus::Cancelled,
                EntryReason::PayoutCancelled,
            )
            .unwrap();

        assert_eq!(released.status, PayoutStatus::Cancelled);
        assert_eq!(reversal.kind, EntryKind::Credit);
        assert_eq!(ledger.balance_of(user).unwrap(), Decimal::from(50_000));
    }

    #[test]
    fn test_release_rejects_wrong_state() {
        let (ledger, _temp) = test_ledger();
        let user = UserId::new(1);
        fund(&ledger, user, 50_000);

        let payout = Payout::new(
            user,
            Decimal::from(20_000),
            Decimal::from(400),
            Currency::CLP,
            test_destination(),
        );
        let (payout, _) = ledger.reserve_payout(payout).unwrap();
        ledger
            .transition_payout(payout.id, PayoutStatus::Pending, PayoutStatus::Processing)
            .unwrap();

        // Cancelling a Processing payout is illegal
        let result = ledger.release_payout(
            payout.id,
            PayoutStatus::Pending,
            PayoutStatus::Cancelled,
            EntryReason::PayoutCancelled,
        );
        assert!(matches!(result, Err(Error::InvalidTransition { .. })));
        assert_eq!(ledger.balance_of(user).unwrap(), Decimal::from(30_000));
    }

    #[test]
    fn test_complete_payout_records_transaction_id() {
        let (ledger, _temp) = test_ledger();
        let user = UserId::new(1);
        fund(&ledger, user, 50_000);

        let payout = Payout::new(
            user,
            Decimal::from(20_000),
            Decimal::from(400),
            Currency::CLP,
            test_destination(),
        );
        let (payout, _) = ledger.reserve_payout(payout).unwrap();
        ledger
            .transition_payout(payout.id, PayoutStatus::Pending, PayoutStatus::Processing)
            .unwrap();

        let completed = ledger.complete_payout(payout.id, "TBK-9988").unwrap();
        assert_eq!(completed.status, PayoutStatus::Completed);
        assert_eq!(completed.gateway_transaction_id.as_deref(), Some("TBK-9988"));
        assert!(completed.completed_at.is_some());

        // Balance unchanged by completion: the debit was booked at request time
        assert_eq!(ledger.balance_of(user).unwrap(), Decimal::from(30_000));
    }

    #[test]
    fn test_user_version_bumps_on_writes() {
        let (ledger, _temp) = test_ledger();
        let user = UserId::new(1);

        assert_eq!(ledger.user_version(user), 0);
        fund(&ledger, user, 10_000);
        assert_eq!(ledger.user_version(user), 1);
        fund(&ledger, user, 10_000);
        assert_eq!(ledger.user_version(user), 2);
    }

    #[test]
    fn test_note_attempt_and_manual_review() {
        let (ledger, _temp) = test_ledger();
        let user = UserId::new(1);
        fund(&ledger, user, 50_000);

        let payout = Payout::new(
            user,
            Decimal::from(20_000),
            Decimal::from(400),
            Currency::CLP,
            test_destination(),
        );
        let (payout, _) = ledger.reserve_payout(payout).unwrap();

        assert_eq!(ledger.note_payout_attempt(payout.id).unwrap().attempts, 1);
        assert_eq!(ledger.note_payout_attempt(payout.id).unwrap().attempts, 2);

        let flagged = ledger.flag_manual_review(payout.id).unwrap();
        assert!(flagged.manual_review);
    }
}
