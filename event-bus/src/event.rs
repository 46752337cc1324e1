//! Event payloads and the notification envelope

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A state change the notification collaborator may care about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A withdrawal was requested and funds were reserved
    PayoutRequested {
        /// Payout id
        payout_id: Uuid,
        /// Requesting account
        user_id: u64,
        /// Gross requested amount
        amount: Decimal,
    },

    /// The gateway confirmed settlement
    PayoutCompleted {
        /// Payout id
        payout_id: Uuid,
        /// Requesting account
        user_id: u64,
    },

    /// The payout failed and the hold was reversed
    PayoutFailed {
        /// Payout id
        payout_id: Uuid,
        /// Requesting account
        user_id: u64,
    },

    /// The user withdrew the request before processing
    PayoutCancelled {
        /// Payout id
        payout_id: Uuid,
        /// Requesting account
        user_id: u64,
    },

    /// A guest contribution was credited to a list owner
    ContributionReceived {
        /// Ledger entry id of the credit
        contribution_id: u64,
        /// Funded gift list
        list_id: u64,
        /// Credited amount
        amount: Decimal,
    },
}

impl Event {
    /// Routing subject for this event
    pub fn subject(&self) -> &'static str {
        match self {
            Event::PayoutRequested { .. } => "registry.payout.requested",
            Event::PayoutCompleted { .. } => "registry.payout.completed",
            Event::PayoutFailed { .. } => "registry.payout.failed",
            Event::PayoutCancelled { .. } => "registry.payout.cancelled",
            Event::ContributionReceived { .. } => "registry.contribution.received",
        }
    }
}

/// Notification envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Notification ID (UUIDv7 for ordering)
    pub id: Uuid,

    /// The event payload
    pub event: Event,

    /// Emission timestamp
    pub emitted_at: DateTime<Utc>,
}

impl Notification {
    /// Wrap an event in a fresh envelope
    pub fn new(event: Event) -> Self {
        Self {
            id: Uuid::now_v7(),
            event,
            emitted_at: Utc::now(),
        }
    }

    /// Routing subject for this notification
    pub fn subject(&self) -> &'static str {
        self.event.subject()
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_routing() {
        let event = Event::PayoutRequested {
            payout_id: Uuid::new_v4(),
            user_id: 7,
            amount: Decimal::from(10_000),
        };
        assert_eq!(event.subject(), "registry.payout.requested");

        let event = Event::ContributionReceived {
            contribution_id: 3,
            list_id: 12,
            amount: Decimal::from(25_000),
        };
        assert_eq!(event.subject(), "registry.contribution.received");
    }

    #[test]
    fn test_notification_round_trip() {
        let notification = Notification::new(Event::PayoutCompleted {
            payout_id: Uuid::new_v4(),
            user_id: 42,
        });

        let bytes = notification.to_bytes().unwrap();
        let decoded = Notification::from_bytes(&bytes).unwrap();

        assert_eq!(decoded.id, notification.id);
        assert_eq!(decoded.event, notification.event);
    }

    #[test]
    fn test_notification_ids_are_ordered() {
        let first = Notification::new(Event::PayoutCancelled {
            payout_id: Uuid::new_v4(),
            user_id: 1,
        });
        let second = Notification::new(Event::PayoutCancelled {
            payout_id: Uuid::new_v4(),
            user_id: 1,
        });

        // UUIDv7 is time-ordered
        assert!(second.id > first.id);
    }
}
