//! Error types for contribution intake

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for contribution operations
pub type Result<T> = std::result::Result<T, Error>;

/// Contribution errors
#[derive(Error, Debug)]
pub enum Error {
    /// Gross amount must be strictly positive
    #[error("Invalid contribution amount: {0}")]
    InvalidAmount(Decimal),

    /// No owner is registered for the gift list
    #[error("Unknown gift list: {0}")]
    UnknownList(u64),

    /// Underlying ledger failure
    #[error("Ledger error: {0}")]
    Ledger(#[from] ledger_core::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}
