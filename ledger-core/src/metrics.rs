//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `ledger_entries_total` - Total number of entries appended
//! - `ledger_payouts_total` - Total number of payouts created
//! - `ledger_append_duration_seconds` - Histogram of append latencies

use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Total entries appended
    pub entries_total: IntCounter,

    /// Total payouts created
    pub payouts_total: IntCounter,

    /// Append duration histogram
    pub append_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let entries_total = IntCounter::with_opts(Opts::new(
            "ledger_entries_total",
            "Total number of entries appended",
        ))?;
        registry.register(Box::new(entries_total.clone()))?;

        let payouts_total = IntCounter::with_opts(Opts::new(
            "ledger_payouts_total",
            "Total number of payouts created",
        ))?;
        registry.register(Box::new(payouts_total.clone()))?;

        let append_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_append_duration_seconds",
                "Histogram of append latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(append_duration.clone()))?;

        Ok(Self {
            entries_total,
            payouts_total,
            append_duration,
            registry,
        })
    }

    /// Record entry append
    pub fn record_entry_append(&self) {
        self.entries_total.inc();
    }

    /// Record payout creation
    pub fn record_payout_created(&self) {
        self.payouts_total.inc();
    }

    /// Record append duration
    pub fn record_append_duration(&self, duration_seconds: f64) {
        self.append_duration.observe(duration_seconds);
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
        assert_eq!(metrics.entries_total.get(), 0);
        assert_eq!(metrics.payouts_total.get(), 0);
    }

    #[test]
    fn test_record_entry_append() {
        let metrics = Metrics::new().unwrap();
        metrics.record_entry_append();
        assert_eq!(metrics.entries_total.get(), 1);

        metrics.record_entry_append();
        assert_eq!(metrics.entries_total.get(), 2);
    }

    #[test]
    fn test_record_payout_created() {
        let metrics = Metrics::new().unwrap();
        metrics.record_payout_created();
        assert_eq!(metrics.payouts_total.get(), 1);
    }
}
