//! Payment gateway adapter contract
//!
//! Translates internal payout requests into provider transfer calls and
//! normalizes provider responses. The production implementation lives with
//! the host; this crate ships the contract and a mock.
//!
//! Every call carries an idempotency key (the payout id) so a retry after
//! a network timeout cannot create a second transfer. Implementations
//! must return the original outcome when they see a key again.

pub mod mock;

use async_trait::async_trait;
use ledger_core::{BankAccount, Currency};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use mock::MockGateway;

/// A transfer the engine wants executed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Caller-supplied dedup token; always the payout id
    pub idempotency_key: Uuid,

    /// Net amount to move
    pub amount: Decimal,

    /// Currency
    pub currency: Currency,

    /// Destination bank details (snapshot)
    pub destination: BankAccount,

    /// Human-readable reference shown on the bank statement
    pub reference: String,
}

/// Successful transfer outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferApproval {
    /// Provider transaction id
    pub transaction_id: String,

    /// Amount the provider confirmed
    pub settled_amount: Decimal,
}

/// Gateway failure, split by retryability
///
/// Only `Transient` may be retried; a `Rejected` decline is final and the
/// payout must fail immediately.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The provider declined the transfer (fatal)
    #[error("Transfer rejected ({code}): {message}")]
    Rejected {
        /// Provider decline code
        code: String,
        /// Provider message
        message: String,
    },

    /// Network trouble, timeout, or provider 5xx (retryable)
    #[error("Transient gateway error: {0}")]
    Transient(String),
}

impl GatewayError {
    /// Whether the caller may retry this failure
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }
}

/// Provider-side view of a transfer, for reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    /// The provider settled the transfer
    Settled {
        /// Provider transaction id
        transaction_id: String,
    },

    /// The provider declined the transfer
    Declined {
        /// Provider decline code
        code: String,
        /// Provider message
        message: String,
    },

    /// The provider is still working on it
    InFlight,

    /// The provider has never seen this idempotency key
    Unknown,
}

/// External payment collaborator
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Execute (or re-request) a transfer
    ///
    /// Repeating a call with the same idempotency key must yield the
    /// original outcome without a second side effect.
    async fn transfer(
        &self,
        request: &TransferRequest,
    ) -> std::result::Result<TransferApproval, GatewayError>;

    /// Ask the provider what became of a transfer
    async fn transfer_status(
        &self,
        idempotency_key: Uuid,
    ) -> std::result::Result<RemoteStatus, GatewayError>;
}
