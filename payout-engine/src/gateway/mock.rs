//! Mock payment gateway
//!
//! In-memory stand-in for the provider: scripted outcomes, simulated
//! latency, and a faithful idempotency cache. A repeated idempotency key
//! returns the stored approval without executing a second transfer, which
//! is exactly the behavior the engine's retry paths rely on.

use super::{GatewayError, PaymentGateway, RemoteStatus, TransferApproval, TransferRequest};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Scripted outcome for the next unseen transfer
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Approve and settle
    Approve,
    /// Decline with a code
    Reject {
        /// Decline code
        code: String,
        /// Decline message
        message: String,
    },
    /// Fail with a retryable error; the transfer does not execute
    Transient(String),
    /// Fail with a retryable error, but execute the transfer anyway
    /// (the "timeout after the money moved" case reconciliation exists for)
    TransientAfterExecute(String),
}

#[derive(Debug, Clone)]
enum RecordedOutcome {
    Settled(TransferApproval),
    Declined { code: String, message: String },
}

/// In-memory mock of the external payment provider
pub struct MockGateway {
    latency: Duration,

    /// Probability of a random transient failure per call (soak testing)
    transient_rate: f64,

    /// Outcomes consumed front-to-back for unseen keys; default approve
    script: Mutex<VecDeque<MockOutcome>>,

    /// Idempotency cache: key -> outcome of the first execution
    executed: Mutex<HashMap<Uuid, RecordedOutcome>>,

    /// Transfer calls per key (including deduplicated ones)
    calls: Mutex<HashMap<Uuid, u32>>,

    /// Monotonic id source for mock transaction ids
    next_txn: Mutex<u64>,
}

impl MockGateway {
    /// Create a mock with no latency
    pub fn new() -> Self {
        Self::with_latency(Duration::ZERO)
    }

    /// Create a mock that sleeps before answering
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            transient_rate: 0.0,
            script: Mutex::new(VecDeque::new()),
            executed: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            next_txn: Mutex::new(1),
        }
    }

    /// Fail randomly with a transient error at the given rate (0.0 - 1.0)
    pub fn with_transient_rate(mut self, rate: f64) -> Self {
        self.transient_rate = rate;
        self
    }

    /// Queue an outcome for the next unseen transfer
    pub fn push_outcome(&self, outcome: MockOutcome) {
        self.script.lock().push_back(outcome);
    }

    /// Transfer calls observed for a key
    pub fn calls_for(&self, idempotency_key: Uuid) -> u32 {
        self.calls.lock().get(&idempotency_key).copied().unwrap_or(0)
    }

    /// Number of transfers actually executed (side effects)
    pub fn executed_count(&self) -> usize {
        self.executed.lock().len()
    }

    fn hit_random_failure(&self) -> bool {
        if self.transient_rate <= 0.0 {
            return false;
        }
        let mut rng = rand::thread_rng();
        rng.gen::<f64>() < self.transient_rate
    }

    fn mint_transaction_id(&self) -> String {
        let mut next = self.next_txn.lock();
        let id = *next;
        *next += 1;
        format!("MOCK-{:08}", id)
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn transfer(
        &self,
        request: &TransferRequest,
    ) -> std::result::Result<TransferApproval, GatewayError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        *self.calls.lock().entry(request.idempotency_key).or_insert(0) += 1;

        // Idempotency: a seen key replays the recorded outcome
        if let Some(recorded) = self.executed.lock().get(&request.idempotency_key) {
            return match recorded.clone() {
                RecordedOutcome::Settled(approval) => {
                    info!(
                        idempotency_key = %request.idempotency_key,
                        "Mock gateway: replaying settled transfer"
                    );
                    Ok(approval)
                }
                RecordedOutcome::Declined { code, message } => {
                    Err(GatewayError::Rejected { code, message })
                }
            };
        }

        // Random soak-test failures, on top of any scripted outcomes
        if self.hit_random_failure() {
            warn!(
                idempotency_key = %request.idempotency_key,
                "Mock gateway: random transient failure"
            );
            return Err(GatewayError::Transient("simulated outage".to_string()));
        }

        let outcome = self
            .script
            .lock()
            .pop_front()
            .unwrap_or(MockOutcome::Approve);

        match outcome {
            MockOutcome::Approve => {
                let approval = TransferApproval {
                    transaction_id: self.mint_transaction_id(),
                    settled_amount: request.amount,
                };
                self.executed.lock().insert(
                    request.idempotency_key,
                    RecordedOutcome::Settled(approval.clone()),
                );
                info!(
                    idempotency_key = %request.idempotency_key,
                    transaction_id = %approval.transaction_id,
                    amount = %request.amount,
                    "Mock gateway: transfer settled"
                );
                Ok(approval)
            }
            MockOutcome::Reject { code, message } => {
                self.executed.lock().insert(
                    request.idempotency_key,
                    RecordedOutcome::Declined {
                        code: code.clone(),
                        message: message.clone(),
                    },
                );
                warn!(
                    idempotency_key = %request.idempotency_key,
                    code = %code,
                    "Mock gateway: transfer declined"
                );
                Err(GatewayError::Rejected { code, message })
            }
            MockOutcome::Transient(message) => {
                warn!(
                    idempotency_key = %request.idempotency_key,
                    "Mock gateway: transient failure before execution"
                );
                Err(GatewayError::Transient(message))
            }
            MockOutcome::TransientAfterExecute(message) => {
                // The provider settled but the response was lost
                let approval = TransferApproval {
                    transaction_id: self.mint_transaction_id(),
                    settled_amount: request.amount,
                };
                self.executed
                    .lock()
                    .insert(request.idempotency_key, RecordedOutcome::Settled(approval));
                warn!(
                    idempotency_key = %request.idempotency_key,
                    "Mock gateway: settled but response dropped"
                );
                Err(GatewayError::Transient(message))
            }
        }
    }

    async fn transfer_status(
        &self,
        idempotency_key: Uuid,
    ) -> std::result::Result<RemoteStatus, GatewayError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency / 2).await;
        }

        match self.executed.lock().get(&idempotency_key) {
            Some(RecordedOutcome::Settled(approval)) => Ok(RemoteStatus::Settled {
                transaction_id: approval.transaction_id.clone(),
            }),
            Some(RecordedOutcome::Declined { code, message }) => Ok(RemoteStatus::Declined {
                code: code.clone(),
                message: message.clone(),
            }),
            None => Ok(RemoteStatus::Unknown),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::{BankAccount, Currency};
    use rust_decimal::Decimal;

    fn test_request(key: Uuid) -> TransferRequest {
        TransferRequest {
            idempotency_key: key,
            amount: Decimal::from(9_800),
            currency: Currency::CLP,
            destination: BankAccount {
                holder_name: "Camila Rojas".to_string(),
                rut: "12.345.678-5".to_string(),
                bank_name: "Banco de Chile".to_string(),
                account_number: "001234567890".to_string(),
            },
            reference: "Regalo payout".to_string(),
        }
    }

    #[tokio::test]
    async fn test_default_approves() {
        let gateway = MockGateway::new();
        let approval = gateway.transfer(&test_request(Uuid::new_v4())).await.unwrap();
        assert_eq!(approval.settled_amount, Decimal::from(9_800));
        assert!(approval.transaction_id.starts_with("MOCK-"));
    }

    #[tokio::test]
    async fn test_idempotent_replay_single_side_effect() {
        let gateway = MockGateway::new();
        let key = Uuid::new_v4();

        let first = gateway.transfer(&test_request(key)).await.unwrap();
        let second = gateway.transfer(&test_request(key)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(gateway.executed_count(), 1);
        assert_eq!(gateway.calls_for(key), 2);
    }

    #[tokio::test]
    async fn test_scripted_rejection_is_sticky() {
        let gateway = MockGateway::new();
        let key = Uuid::new_v4();
        gateway.push_outcome(MockOutcome::Reject {
            code: "51".to_string(),
            message: "account closed".to_string(),
        });

        let first = gateway.transfer(&test_request(key)).await;
        assert!(matches!(first, Err(GatewayError::Rejected { .. })));

        // Replaying the key yields the same decline, not an approval
        let second = gateway.transfer(&test_request(key)).await;
        assert!(matches!(second, Err(GatewayError::Rejected { .. })));
    }

    #[tokio::test]
    async fn test_transient_leaves_no_record() {
        let gateway = MockGateway::new();
        let key = Uuid::new_v4();
        gateway.push_outcome(MockOutcome::Transient("timeout".to_string()));

        let result = gateway.transfer(&test_request(key)).await;
        assert!(matches!(result, Err(GatewayError::Transient(_))));
        assert_eq!(gateway.transfer_status(key).await.unwrap(), RemoteStatus::Unknown);

        // Retry with the same key succeeds
        let retry = gateway.transfer(&test_request(key)).await;
        assert!(retry.is_ok());
    }

    #[tokio::test]
    async fn test_transient_after_execute_visible_in_status() {
        let gateway = MockGateway::new();
        let key = Uuid::new_v4();
        gateway.push_outcome(MockOutcome::TransientAfterExecute("timeout".to_string()));

        let result = gateway.transfer(&test_request(key)).await;
        assert!(matches!(result, Err(GatewayError::Transient(_))));

        // The money moved; status exposes it
        assert!(matches!(
            gateway.transfer_status(key).await.unwrap(),
            RemoteStatus::Settled { .. }
        ));
    }
}
