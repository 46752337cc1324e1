//! Error types for the ledger

use crate::types::PayoutStatus;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Amount must be strictly positive
    #[error("Invalid amount: {0}")]
    InvalidAmount(Decimal),

    /// Entry not found
    #[error("Entry not found: {0}")]
    EntryNotFound(u64),

    /// Payout not found
    #[error("Payout not found: {0}")]
    PayoutNotFound(Uuid),

    /// A contribution for this order id is already booked
    #[error("Contribution already recorded for order {order_id}")]
    DuplicateContribution {
        /// Commerce order id that collided
        order_id: String,
    },

    /// Reservation would overdraw the account
    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance {
        /// Balance at the time of the check
        available: Decimal,
        /// Requested gross amount
        requested: Decimal,
    },

    /// Compare-and-set on payout status lost the race or was illegal
    #[error("Invalid payout transition for {payout_id}: {from} -> {to}")]
    InvalidTransition {
        /// Payout whose transition was rejected
        payout_id: Uuid,
        /// Actual status at the time of the attempt
        from: PayoutStatus,
        /// Requested target status
        to: PayoutStatus,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
