//! Error types for the payout engine

use ledger_core::types::PayoutStatus;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Result type for payout operations
pub type Result<T> = std::result::Result<T, Error>;

/// Payout errors
///
/// Validation variants are reported to the caller synchronously and are
/// never retried automatically; `InvalidState` means a concurrent actor
/// got there first and the caller must re-read; gateway trouble surfaces
/// either as an immediate failure (decline) or not at all (transient,
/// handled by reconciliation).
#[derive(Error, Debug)]
pub enum Error {
    /// Requested amount is under the withdrawal floor
    #[error("Amount {requested} is below the minimum withdrawal of {minimum}")]
    BelowMinimum {
        /// Configured withdrawal floor
        minimum: Decimal,
        /// Requested gross amount
        requested: Decimal,
    },

    /// Requested amount exceeds the available balance
    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance {
        /// Balance at the time of the check
        available: Decimal,
        /// Requested gross amount
        requested: Decimal,
    },

    /// The user has no registered bank account
    #[error("No bank account on file")]
    MissingBankAccount,

    /// The destination snapshot failed validation
    #[error("Invalid bank account: {0}")]
    InvalidBankAccount(String),

    /// The payout is not in a status that allows the operation
    #[error("Payout {payout_id} is {status}, operation not allowed")]
    InvalidState {
        /// Payout in the wrong state
        payout_id: Uuid,
        /// Status actually observed
        status: PayoutStatus,
    },

    /// Payout not found
    #[error("Payout not found: {0}")]
    NotFound(Uuid),

    /// The gateway could not be reached for a status query
    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Underlying ledger failure
    #[error("Ledger error: {0}")]
    Ledger(#[from] ledger_core::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
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
