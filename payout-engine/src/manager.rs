//! Payout manager: the withdrawal state machine
//!
//! Owns the lifecycle `Pending -> Processing -> Completed` with the
//! side-branches `Pending -> Cancelled` and `Processing -> Failed`.
//! Terminal states are never mutated; retrying a failed payout means
//! creating a fresh one, which keeps the audit trail append-only.
//!
//! Every gateway call carries the payout id as its idempotency key, and
//! the status compare-and-set in `advance_to_processing` runs before the
//! call goes out. Between the two, a crash or a racing worker can delay a
//! transfer but never duplicate it.

use crate::{
    config::Config,
    fees,
    gateway::{GatewayError, PaymentGateway, RemoteStatus, TransferRequest},
    metrics::Metrics,
    Error, Result,
};
use chrono::Utc;
use event_bus::{Event, EventPublisher, Notification};
use ledger_core::{
    BalanceResolver, BankAccount, EntryReason, Ledger, Payout, PayoutStatistics, PayoutStatus,
    UserId,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Outcome counts of one `batch_process_pending` run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Pending payouts picked up
    pub attempted: usize,

    /// Settled in this run
    pub completed: usize,

    /// Declined and reversed in this run
    pub failed: usize,

    /// Left in Processing (transient gateway trouble)
    pub deferred: usize,

    /// Skipped because another worker got there first, or errored
    pub skipped: usize,
}

/// Outcome counts of one `reconcile_processing` run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Stale Processing payouts examined
    pub examined: usize,

    /// Found settled provider-side and completed
    pub settled: usize,

    /// Found declined provider-side, failed and reversed
    pub declined: usize,

    /// Still in flight provider-side, left alone
    pub in_flight: usize,

    /// Unknown to the provider, transfer re-issued
    pub retried: usize,

    /// Retries exhausted, escalated to manual review
    pub escalated: usize,
}

/// Coordinates the ledger, the balance resolver, and the gateway
pub struct PayoutManager {
    ledger: Arc<Ledger>,
    resolver: Arc<BalanceResolver>,
    gateway: Arc<dyn PaymentGateway>,
    publisher: Arc<dyn EventPublisher>,
    config: Config,
    metrics: Metrics,
}

impl PayoutManager {
    /// Create a manager over its collaborators
    pub fn new(
        ledger: Arc<Ledger>,
        resolver: Arc<BalanceResolver>,
        gateway: Arc<dyn PaymentGateway>,
        publisher: Arc<dyn EventPublisher>,
        config: Config,
    ) -> Result<Self> {
        config.validate()?;
        let metrics = Metrics::new().map_err(|e| Error::Other(e.to_string()))?;

        Ok(Self {
            ledger,
            resolver,
            gateway,
            publisher,
            config,
            metrics,
        })
    }

    /// Metrics collector handle
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Request a withdrawal
    ///
    /// Validations run in order: floor, balance, destination. On success
    /// the payout row and its reservation debit are created atomically
    /// and a `PayoutRequested` event is emitted. Returns the payout id.
    pub async fn create_payout_request(
        &self,
        user_id: UserId,
        amount: Decimal,
        destination: Option<BankAccount>,
    ) -> Result<Uuid> {
        if amount < self.config.min_withdrawal {
            return Err(Error::BelowMinimum {
                minimum: self.config.min_withdrawal,
                requested: amount,
            });
        }

        // Advisory fast-fail; the authoritative check runs inside
        // reserve_payout under the user lock
        if !self.resolver.can_withdraw(user_id, amount)? {
            let available = self.resolver.available_balance(user_id)?;
            return Err(Error::InsufficientBalance {
                available,
                requested: amount,
            });
        }

        let destination = destination.ok_or(Error::MissingBankAccount)?;
        destination
            .validate()
            .map_err(Error::InvalidBankAccount)?;

        let breakdown = fees::split(amount, self.config.processing_fee_rate, self.config.currency);
        let payout = Payout::new(
            user_id,
            amount,
            breakdown.fee,
            self.config.currency,
            destination,
        );

        let (payout, _reservation) = self.ledger.reserve_payout(payout).map_err(|e| match e {
            ledger_core::Error::InsufficientBalance {
                available,
                requested,
            } => Error::InsufficientBalance {
                available,
                requested,
            },
            other => Error::Ledger(other),
        })?;

        self.metrics.requested_total.inc();
        self.publisher
            .publish(Notification::new(Event::PayoutRequested {
                payout_id: payout.id,
                user_id: user_id.get(),
                amount,
            }))
            .await;

        tracing::info!(
            payout_id = %payout.id,
            user_id = %user_id,
            amount = %amount,
            fee = %payout.fee,
            "Payout requested"
        );

        Ok(payout.id)
    }

    /// Hand a pending payout to the gateway
    ///
    /// Moves Pending -> Processing with a compare-and-set before the
    /// external call goes out, so a crash after the call still leaves a
    /// record that the transfer may exist, and a concurrent caller loses
    /// the CAS and never reaches the gateway. Returns the status the
    /// payout ended up in.
    pub async fn advance_to_processing(&self, payout_id: Uuid) -> Result<PayoutStatus> {
        let payout = self
            .ledger
            .transition_payout(payout_id, PayoutStatus::Pending, PayoutStatus::Processing)
            .map_err(|e| match e {
                ledger_core::Error::InvalidTransition { from, .. } => Error::InvalidState {
                    payout_id,
                    status: from,
                },
                ledger_core::Error::PayoutNotFound(id) => Error::NotFound(id),
                other => Error::Ledger(other),
            })?;

        self.ledger.note_payout_attempt(payout_id)?;
        self.issue_transfer(&payout).await
    }

    /// Issue the gateway transfer for a payout already in Processing
    async fn issue_transfer(&self, payout: &Payout) -> Result<PayoutStatus> {
        let request = TransferRequest {
            idempotency_key: payout.id,
            amount: payout.net_amount,
            currency: payout.currency,
            destination: payout.destination.clone(),
            reference: format!("Regalo retiro {}", payout.id),
        };

        let started = Instant::now();
        let outcome =
            tokio::time::timeout(self.config.gateway_timeout(), self.gateway.transfer(&request))
                .await;
        self.metrics
            .transfer_duration
            .observe(started.elapsed().as_secs_f64());

        match outcome {
            Ok(Ok(approval)) => {
                self.on_gateway_success(payout.id, &approval.transaction_id)
                    .await?;
                Ok(PayoutStatus::Completed)
            }
            Ok(Err(GatewayError::Rejected { code, message })) => {
                self.on_gateway_failure(payout.id, &code, &message).await?;
                Ok(PayoutStatus::Failed)
            }
            Ok(Err(GatewayError::Transient(message))) => {
                self.metrics.transient_errors_total.inc();
                tracing::warn!(
                    payout_id = %payout.id,
                    message = %message,
                    "Transient gateway failure, payout stays in Processing"
                );
                Ok(PayoutStatus::Processing)
            }
            Err(_) => {
                self.metrics.transient_errors_total.inc();
                tracing::warn!(
                    payout_id = %payout.id,
                    timeout_secs = self.config.gateway_timeout_secs,
                    "Gateway call timed out, payout stays in Processing"
                );
                Ok(PayoutStatus::Processing)
            }
        }
    }

    /// Settle a payout the gateway approved
    pub async fn on_gateway_success(
        &self,
        payout_id: Uuid,
        gateway_transaction_id: &str,
    ) -> Result<()> {
        let payout = self
            .ledger
            .complete_payout(payout_id, gateway_transaction_id)?;

        self.metrics.completed_total.inc();
        self.publisher
            .publish(Notification::new(Event::PayoutCompleted {
                payout_id,
                user_id: payout.user_id.get(),
            }))
            .await;

        tracing::info!(
            payout_id = %payout_id,
            gateway_transaction_id,
            "Payout settled"
        );

        Ok(())
    }

    /// Fail a payout the gateway declined, restoring the balance
    pub async fn on_gateway_failure(
        &self,
        payout_id: Uuid,
        code: &str,
        message: &str,
    ) -> Result<()> {
        let (payout, _reversal) = self.ledger.release_payout(
            payout_id,
            PayoutStatus::Processing,
            PayoutStatus::Failed,
            EntryReason::PayoutFailed,
        )?;

        self.metrics.failed_total.inc();
        self.publisher
            .publish(Notification::new(Event::PayoutFailed {
                payout_id,
                user_id: payout.user_id.get(),
            }))
            .await;

        tracing::warn!(
            payout_id = %payout_id,
            code,
            message,
            "Payout failed, funds returned to balance"
        );

        Ok(())
    }

    /// Cancel a payout that has not been handed to the gateway
    ///
    /// Only legal from `Pending`; the reversal credit restores the
    /// balance to exactly its pre-request value.
    pub async fn cancel_payout(&self, payout_id: Uuid) -> Result<()> {
        let (payout, _reversal) = self
            .ledger
            .release_payout(
                payout_id,
                PayoutStatus::Pending,
                PayoutStatus::Cancelled,
                EntryReason::PayoutCancelled,
            )
            .map_err(|e| match e {
                ledger_core::Error::InvalidTransition { from, .. } => Error::InvalidState {
                    payout_id,
                    status: from,
                },
                ledger_core::Error::PayoutNotFound(id) => Error::NotFound(id),
                other => Error::Ledger(other),
            })?;

        self.publisher
            .publish(Notification::new(Event::PayoutCancelled {
                payout_id,
                user_id: payout.user_id.get(),
            }))
            .await;

        tracing::info!(payout_id = %payout_id, "Payout cancelled");

        Ok(())
    }

    /// Process every pending payout, oldest first
    ///
    /// Each payout is handled independently: a decline, a transient
    /// error, or a racing worker on one payout never aborts the rest.
    pub async fn batch_process_pending(&self) -> Result<BatchReport> {
        let pending = self.ledger.payouts_with_status(PayoutStatus::Pending)?;
        let mut report = BatchReport::default();

        for payout in pending {
            report.attempted += 1;
            match self.advance_to_processing(payout.id).await {
                Ok(PayoutStatus::Completed) => report.completed += 1,
                Ok(PayoutStatus::Failed) => report.failed += 1,
                Ok(_) => report.deferred += 1,
                Err(Error::InvalidState { .. }) => {
                    // Another worker picked it up between the scan and the CAS
                    report.skipped += 1;
                }
                Err(e) => {
                    report.skipped += 1;
                    tracing::error!(
                        payout_id = %payout.id,
                        error = %e,
                        "Payout processing failed, continuing batch"
                    );
                }
            }
        }

        tracing::info!(
            attempted = report.attempted,
            completed = report.completed,
            failed = report.failed,
            deferred = report.deferred,
            skipped = report.skipped,
            "Pending batch processed"
        );

        Ok(report)
    }

    /// Recover payouts stuck in Processing
    ///
    /// A transfer that timed out may still have settled provider-side,
    /// so recovery asks the gateway instead of rolling back. Unknown
    /// transfers are re-issued under the same idempotency key while
    /// attempts remain; after that the payout fails with a manual-review
    /// flag and no automatic reversal (an operator decides whether the
    /// funds moved).
    pub async fn reconcile_processing(&self) -> Result<ReconcileReport> {
        let processing = self.ledger.payouts_with_status(PayoutStatus::Processing)?;
        let threshold = Utc::now() - self.config.reconcile_after();
        let mut report = ReconcileReport::default();

        for payout in processing {
            if payout.updated_at > threshold {
                continue;
            }
            report.examined += 1;

            match self.gateway.transfer_status(payout.id).await {
                Ok(RemoteStatus::Settled { transaction_id }) => {
                    self.on_gateway_success(payout.id, &transaction_id).await?;
                    report.settled += 1;
                }
                Ok(RemoteStatus::Declined { code, message }) => {
                    self.on_gateway_failure(payout.id, &code, &message).await?;
                    report.declined += 1;
                }
                Ok(RemoteStatus::InFlight) => {
                    report.in_flight += 1;
                }
                Ok(RemoteStatus::Unknown) => {
                    if payout.attempts < self.config.max_transfer_attempts {
                        let payout = self.ledger.note_payout_attempt(payout.id)?;
                        self.issue_transfer(&payout).await?;
                        report.retried += 1;
                    } else {
                        self.escalate_manual_review(&payout).await?;
                        report.escalated += 1;
                    }
                }
                Err(e) => {
                    // Status query itself failed; try again next cycle
                    tracing::warn!(
                        payout_id = %payout.id,
                        error = %e,
                        "Reconciliation status query failed"
                    );
                }
            }
        }

        tracing::info!(
            examined = report.examined,
            settled = report.settled,
            declined = report.declined,
            in_flight = report.in_flight,
            retried = report.retried,
            escalated = report.escalated,
            "Processing reconciliation finished"
        );

        Ok(report)
    }

    /// Give up on a payout and hand it to an operator
    ///
    /// No reversal credit is booked here: the transfer may have settled
    /// provider-side, and restoring the balance automatically could pay
    /// the user twice. The operator books an adjustment after review.
    async fn escalate_manual_review(&self, payout: &Payout) -> Result<()> {
        self.ledger.flag_manual_review(payout.id)?;
        self.ledger.transition_payout(
            payout.id,
            PayoutStatus::Processing,
            PayoutStatus::Failed,
        )?;

        self.metrics.failed_total.inc();
        self.publisher
            .publish(Notification::new(Event::PayoutFailed {
                payout_id: payout.id,
                user_id: payout.user_id.get(),
            }))
            .await;

        tracing::error!(
            payout_id = %payout.id,
            attempts = payout.attempts,
            "Transfer attempts exhausted, payout escalated to manual review"
        );

        Ok(())
    }

    /// Get a payout by id
    pub fn payout(&self, payout_id: Uuid) -> Result<Payout> {
        self.ledger.payout(payout_id).map_err(|e| match e {
            ledger_core::Error::PayoutNotFound(id) => Error::NotFound(id),
            other => Error::Ledger(other),
        })
    }

    /// Withdrawal history for a user, newest first
    pub fn payout_history(&self, user_id: UserId, limit: usize) -> Result<Vec<Payout>> {
        Ok(self.ledger.payouts_for_user(user_id, limit)?)
    }

    /// Aggregate payout figures for reporting
    pub fn statistics(&self) -> Result<PayoutStatistics> {
        Ok(self.ledger.payout_statistics()?)
    }
}
