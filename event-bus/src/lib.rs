//! Regalo Event Bus
//!
//! Outbound notification events for the ledger and payout core. The core
//! emits an event after each durable state change; delivery to the actual
//! notification channels (email, admin feeds) is the host's concern.
//!
//! Publishing is fire-and-forget by contract: a publisher failure is
//! logged and swallowed, and must never roll back the ledger or payout
//! state change that produced the event.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod error;
pub mod event;
pub mod publisher;

// Re-exports
pub use error::{Error, Result};
pub use event::{Event, Notification};
pub use publisher::{ChannelPublisher, EventPublisher, MemoryPublisher, NoopPublisher};
