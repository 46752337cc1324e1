//! Contribution recorder
//!
//! Converts a settled commerce order into a ledger credit. The guest pays
//! the gift amount plus the platform's service fee at checkout, so the
//! list owner is credited the full gross amount; the fee is the
//! operator's revenue and never touches any user ledger. It is reported
//! in the receipt for the order record.

use crate::{directory::ListDirectory, Error, Result};
use event_bus::{Event, EventPublisher, Notification};
use ledger_core::{
    types::{META_LIST_ID, META_ORDER_ID},
    Currency, EntryReason, Ledger, LedgerEntry, NewEntry,
};
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;

/// Result of recording a contribution
#[derive(Debug, Clone)]
pub struct ContributionReceipt {
    /// The credit entry (the existing one when `duplicate` is set)
    pub entry: LedgerEntry,

    /// Amount credited to the list owner
    pub host_amount: Decimal,

    /// Fee retained by the platform, for the order record only
    pub platform_fee: Decimal,

    /// True when this order had already been recorded
    pub duplicate: bool,
}

/// Records settled gift orders into the ledger
pub struct ContributionRecorder {
    ledger: Arc<Ledger>,
    directory: Arc<dyn ListDirectory>,
    publisher: Arc<dyn EventPublisher>,
    currency: Currency,
}

impl ContributionRecorder {
    /// Create a recorder over its collaborators
    pub fn new(
        ledger: Arc<Ledger>,
        directory: Arc<dyn ListDirectory>,
        publisher: Arc<dyn EventPublisher>,
        currency: Currency,
    ) -> Self {
        Self {
            ledger,
            directory,
            publisher,
            currency,
        }
    }

    /// Record one settled order
    ///
    /// Idempotent per `order_id`: the commerce collaborator is expected to
    /// call exactly once per order, but a replayed webhook returns the
    /// original entry with `duplicate = true`, books nothing, and emits
    /// no second event.
    pub async fn record_contribution(
        &self,
        list_id: u64,
        order_id: &str,
        gross_amount: Decimal,
        platform_fee_rate: Decimal,
    ) -> Result<ContributionReceipt> {
        if gross_amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount(gross_amount));
        }

        let owner = self
            .directory
            .owner_of(list_id)
            .await
            .ok_or(Error::UnknownList(list_id))?;

        let platform_fee = (gross_amount * platform_fee_rate).round_dp_with_strategy(
            self.currency.minor_units(),
            RoundingStrategy::MidpointAwayFromZero,
        );

        let new_entry = NewEntry::credit(owner, gross_amount, EntryReason::ContributionReceived)
            .with_currency(self.currency)
            .with_metadata(META_ORDER_ID, order_id)
            .with_metadata(META_LIST_ID, list_id.to_string());

        let entry = match self.ledger.record(new_entry) {
            Ok(entry) => entry,
            Err(ledger_core::Error::DuplicateContribution { .. }) => {
                let existing = self
                    .ledger
                    .find_contribution(order_id)?
                    .ok_or_else(|| Error::Other(format!("Lost contribution for {}", order_id)))?;

                tracing::info!(
                    order_id,
                    entry_id = %existing.id,
                    "Contribution replay ignored"
                );

                return Ok(ContributionReceipt {
                    host_amount: existing.amount,
                    platform_fee,
                    entry: existing,
                    duplicate: true,
                });
            }
            Err(e) => return Err(e.into()),
        };

        self.publisher
            .publish(Notification::new(Event::ContributionReceived {
                contribution_id: entry.id.get(),
                list_id,
                amount: gross_amount,
            }))
            .await;

        tracing::info!(
            order_id,
            list_id,
            owner = %owner,
            amount = %gross_amount,
            platform_fee = %platform_fee,
            "Contribution credited"
        );

        Ok(ContributionReceipt {
            entry,
            host_amount: gross_amount,
            platform_fee,
            duplicate: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::StaticListDirectory;
    use event_bus::MemoryPublisher;
    use ledger_core::{Config, UserId};

    struct Setup {
        ledger: Arc<Ledger>,
        publisher: Arc<MemoryPublisher>,
        recorder: ContributionRecorder,
        _temp: tempfile::TempDir,
    }

    fn setup() -> Setup {
        let temp = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp.path().to_path_buf();
        let ledger = Arc::new(Ledger::open(config).unwrap());

        let directory = Arc::new(StaticListDirectory::new());
        directory.insert(12, UserId::new(7));

        let publisher = Arc::new(MemoryPublisher::new());
        let recorder = ContributionRecorder::new(
            ledger.clone(),
            directory,
            publisher.clone(),
            Currency::CLP,
        );

        Setup {
            ledger,
            publisher,
            recorder,
            _temp: temp,
        }
    }

    #[tokio::test]
    async fn test_credits_owner_full_gross() {
        let s = setup();

        let receipt = s
            .recorder
            .record_contribution(12, "wc-1001", Decimal::from(25_000), Decimal::new(10, 2))
            .await
            .unwrap();

        assert!(!receipt.duplicate);
        assert_eq!(receipt.host_amount, Decimal::from(25_000));
        // 10% service fee, reported but not credited anywhere
        assert_eq!(receipt.platform_fee, Decimal::from(2_500));

        assert_eq!(
            s.ledger.balance_of(UserId::new(7)).unwrap(),
            Decimal::from(25_000)
        );
    }

    #[tokio::test]
    async fn test_duplicate_order_credits_once() {
        let s = setup();

        let first = s
            .recorder
            .record_contribution(12, "wc-1001", Decimal::from(25_000), Decimal::new(10, 2))
            .await
            .unwrap();
        let second = s
            .recorder
            .record_contribution(12, "wc-1001", Decimal::from(25_000), Decimal::new(10, 2))
            .await
            .unwrap();

        assert!(!first.duplicate);
        assert!(second.duplicate);
        assert_eq!(second.entry.id, first.entry.id);

        // Credited exactly once
        assert_eq!(
            s.ledger.balance_of(UserId::new(7)).unwrap(),
            Decimal::from(25_000)
        );
        // And announced exactly once
        assert_eq!(s.publisher.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_list_rejected() {
        let s = setup();

        let result = s
            .recorder
            .record_contribution(99, "wc-1002", Decimal::from(10_000), Decimal::new(10, 2))
            .await;
        assert!(matches!(result, Err(Error::UnknownList(99))));
    }

    #[tokio::test]
    async fn test_non_positive_amount_rejected() {
        let s = setup();

        let result = s
            .recorder
            .record_contribution(12, "wc-1003", Decimal::ZERO, Decimal::new(10, 2))
            .await;
        assert!(matches!(result, Err(Error::InvalidAmount(_))));
        assert_eq!(s.ledger.balance_of(UserId::new(7)).unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_fee_rounds_half_up() {
        let s = setup();

        // 3335 * 10% = 333.5 -> 334 whole pesos
        let receipt = s
            .recorder
            .record_contribution(12, "wc-1004", Decimal::from(3_335), Decimal::new(10, 2))
            .await
            .unwrap();
        assert_eq!(receipt.platform_fee, Decimal::from(334));
        // The owner still receives the full gross
        assert_eq!(receipt.host_amount, Decimal::from(3_335));
    }

    #[tokio::test]
    async fn test_event_carries_entry_id() {
        let s = setup();

        let receipt = s
            .recorder
            .record_contribution(12, "wc-1005", Decimal::from(8_000), Decimal::new(10, 2))
            .await
            .unwrap();

        let events = s.publisher.published();
        assert_eq!(events.len(), 1);
        match &events[0].event {
            Event::ContributionReceived {
                contribution_id,
                list_id,
                amount,
            } => {
                assert_eq!(*contribution_id, receipt.entry.id.get());
                assert_eq!(*list_id, 12);
                assert_eq!(*amount, Decimal::from(8_000));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_metadata_links_order_and_list() {
        let s = setup();

        let receipt = s
            .recorder
            .record_contribution(12, "wc-1006", Decimal::from(5_000), Decimal::new(10, 2))
            .await
            .unwrap();

        assert_eq!(receipt.entry.order_id(), Some("wc-1006"));
        assert_eq!(
            receipt.entry.metadata.get(META_LIST_ID).map(String::as_str),
            Some("12")
        );
    }
}
