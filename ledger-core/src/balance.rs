//! Balance resolution with read-through caching
//!
//! Balance is never stored; it is derived from the ledger on demand. The
//! resolver caches the derived value keyed by the ledger's per-user write
//! version, so a cached balance can never survive a write to that user's
//! entries.
//!
//! The resolver's answers are advisory for payout creation: the
//! authoritative overdraw check runs inside `Ledger::reserve_payout`,
//! under the same lock as the write.

use crate::{
    types::UserId,
    Ledger, Result,
};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Derives and caches user balances
pub struct BalanceResolver {
    ledger: Arc<Ledger>,

    /// Withdrawal floor applied by `can_withdraw`
    min_withdrawal: Decimal,

    /// user -> (ledger version at compute time, balance)
    cache: DashMap<UserId, (u64, Decimal)>,
}

impl BalanceResolver {
    /// Create a resolver over a ledger
    pub fn new(ledger: Arc<Ledger>, min_withdrawal: Decimal) -> Self {
        Self {
            ledger,
            min_withdrawal,
            cache: DashMap::new(),
        }
    }

    /// Withdrawal floor
    pub fn min_withdrawal(&self) -> Decimal {
        self.min_withdrawal
    }

    /// Available balance for a user
    ///
    /// Zero for a user with no entries. Recomputed whenever the ledger
    /// has been written for this user since the cached value.
    pub fn available_balance(&self, user_id: UserId) -> Result<Decimal> {
        let version = self.ledger.user_version(user_id);

        if let Some(cached) = self.cache.get(&user_id) {
            let (cached_version, balance) = *cached;
            if cached_version == version {
                return Ok(balance);
            }
        }

        let balance = self.ledger.balance_of(user_id)?;
        self.cache.insert(user_id, (version, balance));
        Ok(balance)
    }

    /// Whether a withdrawal of `amount` would be accepted
    ///
    /// True when the amount meets the floor and does not exceed the
    /// available balance.
    pub fn can_withdraw(&self, user_id: UserId, amount: Decimal) -> Result<bool> {
        if amount < self.min_withdrawal {
            return Ok(false);
        }
        Ok(amount <= self.available_balance(user_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntryReason;
    use crate::{Config, NewEntry};

    fn test_resolver(min: i64) -> (Arc<Ledger>, BalanceResolver, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        let ledger = Arc::new(Ledger::open(config).unwrap());
        let resolver = BalanceResolver::new(ledger.clone(), Decimal::from(min));
        (ledger, resolver, temp_dir)
    }

    #[test]
    fn test_available_balance_tracks_writes() {
        let (ledger, resolver, _temp) = test_resolver(5_000);
        let user = UserId::new(1);

        assert_eq!(resolver.available_balance(user).unwrap(), Decimal::ZERO);

        ledger
            .record(NewEntry::credit(
                user,
                Decimal::from(30_000),
                EntryReason::ContributionReceived,
            ))
            .unwrap();

        // Cache is invalidated by the version bump, not by time
        assert_eq!(
            resolver.available_balance(user).unwrap(),
            Decimal::from(30_000)
        );

        ledger
            .record(NewEntry::debit(
                user,
                Decimal::from(10_000),
                EntryReason::AdjustmentManual,
            ))
            .unwrap();

        assert_eq!(
            resolver.available_balance(user).unwrap(),
            Decimal::from(20_000)
        );
    }

    #[test]
    fn test_can_withdraw_floor_and_balance() {
        let (ledger, resolver, _temp) = test_resolver(5_000);
        let user = UserId::new(1);

        ledger
            .record(NewEntry::credit(
                user,
                Decimal::from(10_000),
                EntryReason::ContributionReceived,
            ))
            .unwrap();

        // Below the floor
        assert!(!resolver.can_withdraw(user, Decimal::from(4_999)).unwrap());
        // Within floor and balance
        assert!(resolver.can_withdraw(user, Decimal::from(5_000)).unwrap());
        assert!(resolver.can_withdraw(user, Decimal::from(10_000)).unwrap());
        // Above balance
        assert!(!resolver.can_withdraw(user, Decimal::from(10_001)).unwrap());
    }

    #[test]
    fn test_cache_serves_repeat_reads() {
        let (ledger, resolver, _temp) = test_resolver(5_000);
        let user = UserId::new(1);

        ledger
            .record(NewEntry::credit(
                user,
                Decimal::from(12_000),
                EntryReason::ContributionReceived,
            ))
            .unwrap();

        let first = resolver.available_balance(user).unwrap();
        let second = resolver.available_balance(user).unwrap();
        assert_eq!(first, second);
    }
}
