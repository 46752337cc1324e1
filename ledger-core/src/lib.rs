//! Regalo Ledger Core
//!
//! Append-only money ledger for the gift-registry platform: contribution
//! credits, payout reservation debits, and derived balances.
//!
//! # Architecture
//!
//! - **Append-only**: entries are never modified or deleted; corrections
//!   are new offsetting entries
//! - **Derived balance**: balance is computed from entries on every read,
//!   never stored
//! - **Atomic pairs**: a payout row and its reservation debit land in one
//!   storage batch, or not at all
//! - **Per-user serialization**: check-then-write sequences run under a
//!   per-user lock, closing the double-spend window
//!
//! # Invariants
//!
//! - balance(user) == Σ(credits) - Σ(debits) over that user's entries
//! - A payout never exists without its reservation debit
//! - One contribution credit per commerce order id

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod balance;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod storage;
pub mod types;

// Re-exports
pub use balance::BalanceResolver;
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::{Ledger, NewEntry};
pub use storage::Storage;
pub use types::{
    BankAccount, Currency, EntryId, EntryKind, EntryReason, LedgerEntry, Payout, PayoutStatistics,
    PayoutStatus, UserId,
};
