//! Regalo Payout Engine
//!
//! The withdrawal side of the gift-registry platform: list owners turn
//! their earned balance into bank transfers. The engine owns the payout
//! state machine, the fee policy, and the conversation with the external
//! payment gateway; the ledger-core crate guarantees that every move is
//! atomic against the store.
//!
//! # Lifecycle
//!
//! ```text
//! Pending ──> Processing ──> Completed
//!    │             │
//!    └> Cancelled  └> Failed
//! ```
//!
//! Terminal states are never mutated. A failed payout is retried by
//! creating a fresh one, which keeps the audit trail intact.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod config;
pub mod error;
pub mod fees;
pub mod gateway;
pub mod manager;
pub mod metrics;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use fees::{processing_fee, split, FeeBreakdown};
pub use gateway::{
    GatewayError, MockGateway, PaymentGateway, RemoteStatus, TransferApproval, TransferRequest,
};
pub use manager::{BatchReport, PayoutManager, ReconcileReport};
