//! Metrics collection for the payout engine
//!
//! # Metrics
//!
//! - `payouts_requested_total` - Payout requests accepted
//! - `payouts_completed_total` - Payouts settled by the gateway
//! - `payouts_failed_total` - Payouts that ended in Failed
//! - `gateway_transient_errors_total` - Retryable gateway failures
//! - `gateway_transfer_duration_seconds` - Histogram of transfer call latencies

use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Payout requests accepted
    pub requested_total: IntCounter,

    /// Payouts settled
    pub completed_total: IntCounter,

    /// Payouts failed
    pub failed_total: IntCounter,

    /// Retryable gateway failures
    pub transient_errors_total: IntCounter,

    /// Transfer call latency histogram
    pub transfer_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let requested_total = IntCounter::with_opts(Opts::new(
            "payouts_requested_total",
            "Payout requests accepted",
        ))?;
        registry.register(Box::new(requested_total.clone()))?;

        let completed_total = IntCounter::with_opts(Opts::new(
            "payouts_completed_total",
            "Payouts settled by the gateway",
        ))?;
        registry.register(Box::new(completed_total.clone()))?;

        let failed_total = IntCounter::with_opts(Opts::new(
            "payouts_failed_total",
            "Payouts that ended in Failed",
        ))?;
        registry.register(Box::new(failed_total.clone()))?;

        let transient_errors_total = IntCounter::with_opts(Opts::new(
            "gateway_transient_errors_total",
            "Retryable gateway failures",
        ))?;
        registry.register(Box::new(transient_errors_total.clone()))?;

        let transfer_duration = Histogram::with_opts(
            HistogramOpts::new(
                "gateway_transfer_duration_seconds",
                "Histogram of transfer call latencies",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;
        registry.register(Box::new(transfer_duration.clone()))?;

        Ok(Self {
            requested_total,
            completed_total,
            failed_total,
            transient_errors_total,
            transfer_duration,
            registry,
        })
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.requested_total.get(), 0);
        assert_eq!(metrics.completed_total.get(), 0);
        assert_eq!(metrics.failed_total.get(), 0);
    }
}
