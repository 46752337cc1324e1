//! Event publisher implementations
//!
//! The `EventPublisher` contract is fire-and-forget: `publish` does not
//! return a `Result`. Implementations log and swallow their own failures
//! so a dead notification channel can never roll back a ledger write.

use crate::event::Notification;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Outbound event sink
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Hand a notification to the collaborator. Must not fail the caller.
    async fn publish(&self, notification: Notification);
}

/// Publisher backed by a tokio channel
///
/// The receiving half goes to the host's notification collaborator; the
/// channel is unbounded so emission never blocks a financial operation.
pub struct ChannelPublisher {
    sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelPublisher {
    /// Create a publisher and the receiver for the collaborator side
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl EventPublisher for ChannelPublisher {
    async fn publish(&self, notification: Notification) {
        let subject = notification.subject();
        if self.sender.send(notification).is_err() {
            // Receiver dropped; notifications are best-effort by contract
            warn!(subject, "Notification receiver gone, event dropped");
        } else {
            debug!(subject, "Notification published");
        }
    }
}

/// Publisher that drops everything (embedding without notifications)
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, _notification: Notification) {}
}

/// Publisher that records notifications in memory (test double)
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    published: Mutex<Vec<Notification>>,
}

impl MemoryPublisher {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, in order
    pub fn published(&self) -> Vec<Notification> {
        self.published.lock().clone()
    }

    /// Number of notifications published
    pub fn len(&self) -> usize {
        self.published.lock().len()
    }

    /// True when nothing was published
    pub fn is_empty(&self) -> bool {
        self.published.lock().is_empty()
    }
}

#[async_trait]
impl EventPublisher for MemoryPublisher {
    async fn publish(&self, notification: Notification) {
        self.published.lock().push(notification);
    }
}
