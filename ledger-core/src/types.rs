//! Core types for the ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (Decimal for money)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Platform account identifier (host user id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(u64);

impl UserId {
    /// Create new user ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get as raw u64
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ledger entry identifier
///
/// Assigned by storage in insertion order; later entries always compare
/// greater, which is what makes cursor pagination stable under
/// concurrent inserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(u64);

impl EntryId {
    /// Create from raw sequence number
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get as raw u64
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ISO 4217 currency code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Currency {
    /// Chilean Peso (platform currency)
    CLP,
    /// US Dollar
    USD,
    /// Euro
    EUR,
}

impl Currency {
    /// ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::CLP => "CLP",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
        }
    }

    /// Minor-unit exponent (decimal places of the smallest unit)
    ///
    /// CLP is a zero-decimal currency; amounts are whole pesos.
    pub fn minor_units(&self) -> u32 {
        match self {
            Currency::CLP => 0,
            Currency::USD => 2,
            Currency::EUR => 2,
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CLP" => Some(Currency::CLP),
            "USD" => Some(Currency::USD),
            "EUR" => Some(Currency::EUR),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Direction of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntryKind {
    /// Adds to the user's balance
    Credit = 1,
    /// Removes from the user's balance
    Debit = 2,
}

/// Why an entry was booked
///
/// Closed set: every consumption site matches exhaustively, there is no
/// "unknown reason" branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntryReason {
    /// A guest funded a gift list; credit to the list owner
    ContributionReceived = 1,
    /// Reservation debit booked when a withdrawal is requested
    PayoutRequested = 2,
    /// Reversal credit for a cancelled payout
    PayoutCancelled = 3,
    /// Reversal credit for a failed payout
    PayoutFailed = 4,
    /// Operator correction
    AdjustmentManual = 5,
}

impl EntryReason {
    /// Stable string tag (used in logs and metadata)
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryReason::ContributionReceived => "contribution_received",
            EntryReason::PayoutRequested => "payout_requested",
            EntryReason::PayoutCancelled => "payout_cancelled",
            EntryReason::PayoutFailed => "payout_failed",
            EntryReason::AdjustmentManual => "adjustment_manual",
        }
    }
}

/// Metadata key carrying the commerce order id on contribution credits
pub const META_ORDER_ID: &str = "order_id";

/// Metadata key carrying the gift list id on contribution credits
pub const META_LIST_ID: &str = "list_id";

/// One immutable row of the money log
///
/// Entries are never updated or deleted. Corrections are new offsetting
/// entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Insertion-order id
    pub id: EntryId,

    /// Owning account
    pub user_id: UserId,

    /// Credit or debit
    pub kind: EntryKind,

    /// Positive amount (exact decimal)
    pub amount: Decimal,

    /// Currency
    pub currency: Currency,

    /// Why the entry exists
    pub reason: EntryReason,

    /// Back-reference to a payout when the reason relates to one
    pub payout_ref: Option<Uuid>,

    /// Opaque annotations (source order id, operator notes)
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Booking timestamp, immutable
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Commerce order id, when present
    pub fn order_id(&self) -> Option<&str> {
        self.metadata.get(META_ORDER_ID).map(String::as_str)
    }

    /// Signed contribution of this entry to the owner's balance
    pub fn signed_amount(&self) -> Decimal {
        match self.kind {
            EntryKind::Credit => self.amount,
            EntryKind::Debit => -self.amount,
        }
    }
}

/// Payout lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PayoutStatus {
    /// Requested, funds reserved, not yet sent to the gateway
    Pending = 1,
    /// Handed to the payment gateway
    Processing = 2,
    /// Gateway confirmed settlement (terminal)
    Completed = 3,
    /// Withdrawn by the user before processing (terminal)
    Cancelled = 4,
    /// Gateway declined or gave up (terminal)
    Failed = 5,
}

impl PayoutStatus {
    /// Check if status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PayoutStatus::Completed | PayoutStatus::Cancelled | PayoutStatus::Failed
        )
    }

    /// Legal state-machine moves
    pub fn can_transition(&self, to: PayoutStatus) -> bool {
        matches!(
            (self, to),
            (PayoutStatus::Pending, PayoutStatus::Processing)
                | (PayoutStatus::Pending, PayoutStatus::Cancelled)
                | (PayoutStatus::Processing, PayoutStatus::Completed)
                | (PayoutStatus::Processing, PayoutStatus::Failed)
        )
    }

    /// Stable string tag
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Processing => "processing",
            PayoutStatus::Completed => "completed",
            PayoutStatus::Cancelled => "cancelled",
            PayoutStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Destination bank details, snapshotted at request time
///
/// A snapshot, never a live reference: the payout's audit history stays
/// intact even if the user later changes banks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccount {
    /// Account holder name
    pub holder_name: String,

    /// Chilean tax id (RUT), with or without dots/hyphen
    pub rut: String,

    /// Bank name
    pub bank_name: String,

    /// Account number
    pub account_number: String,
}

impl BankAccount {
    /// Validate that the snapshot is usable as a transfer destination
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.holder_name.trim().is_empty() {
            return Err("holder name is empty".to_string());
        }
        if self.bank_name.trim().is_empty() {
            return Err("bank name is empty".to_string());
        }
        if self.account_number.trim().is_empty() {
            return Err("account number is empty".to_string());
        }
        if !validate_rut(&self.rut) {
            return Err(format!("invalid RUT: {}", self.rut));
        }
        Ok(())
    }
}

/// Validate a Chilean RUT check digit (mod-11)
pub fn validate_rut(rut: &str) -> bool {
    let rut: String = rut.chars().filter(|c| *c != '.' && *c != '-').collect();
    if rut.len() < 8 {
        return false;
    }

    let (body, dv) = rut.split_at(rut.len() - 1);
    if !body.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    let mut sum = 0u32;
    let mut multiplier = 2u32;
    for c in body.chars().rev() {
        sum += c.to_digit(10).unwrap() * multiplier;
        multiplier += 1;
        if multiplier > 7 {
            multiplier = 2;
        }
    }

    let expected = match 11 - (sum % 11) {
        11 => "0".to_string(),
        10 => "K".to_string(),
        n => n.to_string(),
    };

    dv.to_uppercase() == expected
}

/// One withdrawal request tracked through its lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payout {
    /// Payout id; doubles as the gateway idempotency key
    pub id: Uuid,

    /// Requesting account
    pub user_id: UserId,

    /// Gross requested amount
    pub amount: Decimal,

    /// Processing fee withheld
    pub fee: Decimal,

    /// Amount actually transferred: amount - fee
    pub net_amount: Decimal,

    /// Currency
    pub currency: Currency,

    /// Lifecycle status
    pub status: PayoutStatus,

    /// Destination snapshot taken at request time
    pub destination: BankAccount,

    /// Provider transaction id, set once settlement succeeds
    pub gateway_transaction_id: Option<String>,

    /// Transfer attempts issued so far
    pub attempts: u32,

    /// Set when retries are exhausted and an operator must resolve
    pub manual_review: bool,

    /// Request timestamp
    pub created_at: DateTime<Utc>,

    /// Last status change
    pub updated_at: DateTime<Utc>,

    /// Settlement timestamp (terminal success only)
    pub completed_at: Option<DateTime<Utc>>,
}

impl Payout {
    /// Build a new pending payout
    pub fn new(
        user_id: UserId,
        amount: Decimal,
        fee: Decimal,
        currency: Currency,
        destination: BankAccount,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            amount,
            fee,
            net_amount: amount - fee,
            currency,
            status: PayoutStatus::Pending,
            destination,
            gateway_transaction_id: None,
            attempts: 0,
            manual_review: false,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

/// Aggregate payout figures for operator reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PayoutStatistics {
    /// Payouts ever requested
    pub total_payouts: u64,

    /// Gross amount across all payouts
    pub total_amount: Decimal,

    /// Fees withheld across all payouts
    pub total_fees: Decimal,

    /// Payouts settled
    pub completed_count: u64,

    /// Gross amount of settled payouts
    pub completed_amount: Decimal,
}
