//! Prometheus metrics for the credit ledger
//!
//! Metrics are registered against an owned [`Registry`] so that multiple
//! ledger instances in one process never collide.

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder};

use crate::{Error, Result};

/// Ledger metrics
pub struct Metrics {
    registry: Registry,

    /// Total credits granted (sum of granted amounts)
    pub credits_granted_total: IntCounter,

    /// Total credits debited
    pub credits_debited_total: IntCounter,

    /// Completed transfers (tips, subscriptions, generic)
    pub transfers_total: IntCounter,

    /// Platform fee revenue collected from transfers
    pub fee_revenue_total: IntCounter,

    /// Opportunity unlocks completed
    pub unlocks_total: IntCounter,

    /// Payout requests accepted
    pub payout_requests_total: IntCounter,

    /// Operations rejected with a domain error
    pub rejections_total: IntCounter,

    /// Payout requests currently pending
    pub pending_payouts: IntGauge,

    /// Mutation latency through the writer, in seconds
    pub operation_duration: Histogram,
}

impl Metrics {
    /// Create and register all metrics
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let credits_granted_total = IntCounter::with_opts(Opts::new(
            "credits_granted_total",
            "Total credits granted across all accounts",
        ))
        .map_err(|e| Error::Config(format!("Failed to create metric: {}", e)))?;

        let credits_debited_total = IntCounter::with_opts(Opts::new(
            "credits_debited_total",
            "Total credits debited across all accounts",
        ))
        .map_err(|e| Error::Config(format!("Failed to create metric: {}", e)))?;

        let transfers_total = IntCounter::with_opts(Opts::new(
            "transfers_total",
            "Total completed account-to-account transfers",
        ))
        .map_err(|e| Error::Config(format!("Failed to create metric: {}", e)))?;

        let fee_revenue_total = IntCounter::with_opts(Opts::new(
            "fee_revenue_total",
            "Total platform fee revenue from transfers",
        ))
        .map_err(|e| Error::Config(format!("Failed to create metric: {}", e)))?;

        let unlocks_total = IntCounter::with_opts(Opts::new(
            "unlocks_total",
            "Total opportunity unlocks",
        ))
        .map_err(|e| Error::Config(format!("Failed to create metric: {}", e)))?;

        let payout_requests_total = IntCounter::with_opts(Opts::new(
            "payout_requests_total",
            "Total accepted payout requests",
        ))
        .map_err(|e| Error::Config(format!("Failed to create metric: {}", e)))?;

        let rejections_total = IntCounter::with_opts(Opts::new(
            "rejections_total",
            "Total operations rejected with a domain error",
        ))
        .map_err(|e| Error::Config(format!("Failed to create metric: {}", e)))?;

        let pending_payouts = IntGauge::with_opts(Opts::new(
            "pending_payouts",
            "Payout requests currently awaiting resolution",
        ))
        .map_err(|e| Error::Config(format!("Failed to create metric: {}", e)))?;

        let operation_duration = Histogram::with_opts(
            HistogramOpts::new("operation_duration_seconds", "Mutation latency in seconds")
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )
        .map_err(|e| Error::Config(format!("Failed to create metric: {}", e)))?;

        for collector in [
            Box::new(credits_granted_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(credits_debited_total.clone()),
            Box::new(transfers_total.clone()),
            Box::new(fee_revenue_total.clone()),
            Box::new(unlocks_total.clone()),
            Box::new(payout_requests_total.clone()),
            Box::new(rejections_total.clone()),
            Box::new(pending_payouts.clone()),
            Box::new(operation_duration.clone()),
        ] {
            registry
                .register(collector)
                .map_err(|e| Error::Config(format!("Failed to register metric: {}", e)))?;
        }

        Ok(Self {
            registry,
            credits_granted_total,
            credits_debited_total,
            transfers_total,
            fee_revenue_total,
            unlocks_total,
            payout_requests_total,
            rejections_total,
            pending_payouts,
            operation_duration,
        })
    }

    /// Record a completed transfer
    pub fn record_transfer(&self, gross: i64, fee: i64) {
        self.transfers_total.inc();
        self.credits_debited_total.inc_by(gross.max(0) as u64);
        self.credits_granted_total.inc_by((gross - fee).max(0) as u64);
        self.fee_revenue_total.inc_by(fee.max(0) as u64);
    }

    /// Record a rejected operation
    pub fn record_rejection(&self) {
        self.rejections_total.inc();
    }

    /// Render all metrics in Prometheus text exposition format
    pub fn export(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| Error::Config(format!("Failed to encode metrics: {}", e)))?;
        String::from_utf8(buffer)
            .map_err(|e| Error::Config(format!("Metrics are not valid UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.transfers_total.get(), 0);
        assert_eq!(metrics.pending_payouts.get(), 0);
    }

    #[test]
    fn test_two_instances_do_not_collide() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.transfers_total.inc();
        assert_eq!(a.transfers_total.get(), 1);
        assert_eq!(b.transfers_total.get(), 0);
    }

    #[test]
    fn test_record_transfer() {
        let metrics = Metrics::new().unwrap();
        metrics.record_transfer(100, 5);
        assert_eq!(metrics.transfers_total.get(), 1);
        assert_eq!(metrics.credits_debited_total.get(), 100);
        assert_eq!(metrics.credits_granted_total.get(), 95);
        assert_eq!(metrics.fee_revenue_total.get(), 5);
    }

    #[test]
    fn test_export_contains_metrics() {
        let metrics = Metrics::new().unwrap();
        metrics.unlocks_total.inc();
        let text = metrics.export().unwrap();
        assert!(text.contains("unlocks_total 1"));
        assert!(text.contains("pending_payouts"));
    }
}
