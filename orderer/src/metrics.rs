//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the orderer.
//! Every [`Metrics`] owns its registry; nothing is registered process-wide.
//!
//! # Metrics
//!
//! - `orderer_transactions_received_total` - Transactions accepted for ordering
//! - `orderer_transactions_rejected_total` - Broadcast requests answered `INVALID`
//! - `orderer_batches_total` - Batches cut by the sequencer
//! - `orderer_batch_size` - Histogram of batch sizes
//! - `orderer_tree_build_duration_seconds` - Histogram of tree build latencies
//! - `orderer_deliver_streams` - Open deliver streams

use crate::Result;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::fmt;
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Transactions accepted for ordering
    pub transactions_received: IntCounter,

    /// Broadcast requests rejected
    pub transactions_rejected: IntCounter,

    /// Batches cut
    pub batches_total: IntCounter,

    /// Batch size histogram
    pub batch_size: Histogram,

    /// Tree build duration histogram
    pub tree_build_duration: Histogram,

    /// Open deliver streams
    pub deliver_streams: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let transactions_received = IntCounter::new(
            "orderer_transactions_received_total",
            "Total number of transactions accepted for ordering",
        )?;
        registry.register(Box::new(transactions_received.clone()))?;

        let transactions_rejected = IntCounter::new(
            "orderer_transactions_rejected_total",
            "Total number of broadcast requests rejected",
        )?;
        registry.register(Box::new(transactions_rejected.clone()))?;

        let batches_total =
            IntCounter::new("orderer_batches_total", "Total number of batches cut")?;
        registry.register(Box::new(batches_total.clone()))?;

        let batch_size = Histogram::with_opts(
            HistogramOpts::new("orderer_batch_size", "Histogram of batch sizes")
                .buckets(vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0]),
        )?;
        registry.register(Box::new(batch_size.clone()))?;

        let tree_build_duration = Histogram::with_opts(
            HistogramOpts::new(
                "orderer_tree_build_duration_seconds",
                "Histogram of merkle tree build latencies",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.010, 0.050, 0.100, 0.500]),
        )?;
        registry.register(Box::new(tree_build_duration.clone()))?;

        let deliver_streams =
            IntGauge::new("orderer_deliver_streams", "Number of open deliver streams")?;
        registry.register(Box::new(deliver_streams.clone()))?;

        Ok(Self {
            transactions_received,
            transactions_rejected,
            batches_total,
            batch_size,
            tree_build_duration,
            deliver_streams,
            registry,
        })
    }

    /// Record accepted transaction
    pub fn record_transaction_received(&self) {
        self.transactions_received.inc();
    }

    /// Record rejected broadcast request
    pub fn record_transaction_rejected(&self) {
        self.transactions_rejected.inc();
    }

    /// Record batch cut
    pub fn record_batch(&self, batch_size: usize, build_seconds: f64) {
        self.batches_total.inc();
        self.batch_size.observe(batch_size as f64);
        self.tree_build_duration.observe(build_seconds);
    }

    /// Record deliver stream opened
    pub fn deliver_stream_opened(&self) {
        self.deliver_streams.inc();
    }

    /// Record deliver stream closed
    pub fn deliver_stream_closed(&self) {
        self.deliver_streams.dec();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn encode_text(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metrics")
            .field("transactions_received", &self.transactions_received.get())
            .field("transactions_rejected", &self.transactions_rejected.get())
            .field("batches_total", &self.batches_total.get())
            .field("deliver_streams", &self.deliver_streams.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.transactions_received.get(), 0);
        assert_eq!(metrics.batches_total.get(), 0);
        assert_eq!(metrics.deliver_streams.get(), 0);
    }

    #[test]
    fn test_instances_are_independent() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();

        first.record_transaction_received();
        assert_eq!(first.transactions_received.get(), 1);
        assert_eq!(second.transactions_received.get(), 0);
    }

    #[test]
    fn test_record_batch() {
        let metrics = Metrics::new().unwrap();
        metrics.record_batch(10, 0.002);
        metrics.record_batch(3, 0.001);

        assert_eq!(metrics.batches_total.get(), 2);
        assert_eq!(metrics.batch_size.get_sample_count(), 2);
        assert_eq!(metrics.batch_size.get_sample_sum(), 13.0);
    }

    #[test]
    fn test_deliver_stream_gauge() {
        let metrics = Metrics::new().unwrap();
        metrics.deliver_stream_opened();
        metrics.deliver_stream_opened();
        metrics.deliver_stream_closed();
        assert_eq!(metrics.deliver_streams.get(), 1);
    }

    #[test]
    fn test_encode_text() {
        let metrics = Metrics::new().unwrap();
        metrics.record_transaction_rejected();

        let text = metrics.encode_text().unwrap();
        assert!(text.contains("# TYPE orderer_transactions_rejected_total counter"));
        assert!(text.contains("orderer_transactions_rejected_total 1"));
        assert!(text.contains("orderer_batch_size_bucket"));
    }
}
