//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `brewtab_entries_committed_total` - Entries committed by `apply`
//! - `brewtab_entries_duplicate_total` - Replays answered from the existing entry
//! - `brewtab_apply_rejected_total` - Rejections by reason
//! - `brewtab_apply_duration_seconds` - Histogram of apply latencies
//! - `brewtab_sync_batch_size` - Histogram of offline batch sizes
//! - `brewtab_cache_hits_total` / `brewtab_cache_misses_total` - Projection cache
//! - `brewtab_audit_runs_total` - Completed auditor passes
//! - `brewtab_audit_corrections_total` - Balances rewritten by the auditor

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
///
/// Each instance owns its registry, so several engines can live in one
/// process (tests, embedded use) without name clashes.
#[derive(Clone, Debug)]
pub struct Metrics {
    /// Entries committed
    pub entries_committed: IntCounter,

    /// Duplicate replays
    pub entries_duplicate: IntCounter,

    /// Rejections, labelled by reason
    pub apply_rejected: IntCounterVec,

    /// Apply duration histogram
    pub apply_duration: Histogram,

    /// Offline batch size histogram
    pub sync_batch_size: Histogram,

    /// Projection cache hits
    pub cache_hits: IntCounter,

    /// Projection cache misses
    pub cache_misses: IntCounter,

    /// Completed auditor passes
    pub audit_runs: IntCounter,

    /// Balances corrected by the auditor
    pub audit_corrections: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let entries_committed = IntCounter::new(
            "brewtab_entries_committed_total",
            "Total number of ledger entries committed",
        )?;
        registry.register(Box::new(entries_committed.clone()))?;

        let entries_duplicate = IntCounter::new(
            "brewtab_entries_duplicate_total",
            "Total number of replays answered with an existing entry",
        )?;
        registry.register(Box::new(entries_duplicate.clone()))?;

        let apply_rejected = IntCounterVec::new(
            Opts::new("brewtab_apply_rejected_total", "Rejected apply calls by reason"),
            &["reason"],
        )?;
        registry.register(Box::new(apply_rejected.clone()))?;

        let apply_duration = Histogram::with_opts(
            HistogramOpts::new("brewtab_apply_duration_seconds", "Histogram of apply latencies")
                .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5]),
        )?;
        registry.register(Box::new(apply_duration.clone()))?;

        let sync_batch_size = Histogram::with_opts(
            HistogramOpts::new("brewtab_sync_batch_size", "Histogram of offline batch sizes")
                .buckets(vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0]),
        )?;
        registry.register(Box::new(sync_batch_size.clone()))?;

        let cache_hits = IntCounter::new("brewtab_cache_hits_total", "Projection cache hits")?;
        registry.register(Box::new(cache_hits.clone()))?;

        let cache_misses =
            IntCounter::new("brewtab_cache_misses_total", "Projection cache misses")?;
        registry.register(Box::new(cache_misses.clone()))?;

        let audit_runs =
            IntCounter::new("brewtab_audit_runs_total", "Completed consistency audit passes")?;
        registry.register(Box::new(audit_runs.clone()))?;

        let audit_corrections = IntCounter::new(
            "brewtab_audit_corrections_total",
            "Balances corrected by the consistency auditor",
        )?;
        registry.register(Box::new(audit_corrections.clone()))?;

        Ok(Self {
            entries_committed,
            entries_duplicate,
            apply_rejected,
            apply_duration,
            sync_batch_size,
            cache_hits,
            cache_misses,
            audit_runs,
            audit_corrections,
            registry,
        })
    }

    /// Record a committed entry
    pub fn record_committed(&self) {
        self.entries_committed.inc();
    }

    /// Record a duplicate replay
    pub fn record_duplicate(&self) {
        self.entries_duplicate.inc();
    }

    /// Record a rejection
    pub fn record_rejected(&self, reason: &str) {
        self.apply_rejected.with_label_values(&[reason]).inc();
    }

    /// Record apply duration
    pub fn record_apply_duration(&self, duration_seconds: f64) {
        self.apply_duration.observe(duration_seconds);
    }

    /// Record an offline batch
    pub fn record_sync_batch(&self, batch_size: usize) {
        self.sync_batch_size.observe(batch_size as f64);
    }

    /// Record a cache lookup
    pub fn record_cache_lookup(&self, hit: bool) {
        if hit {
            self.cache_hits.inc();
        } else {
            self.cache_misses.inc();
        }
    }

    /// Record a completed auditor pass
    pub fn record_audit_run(&self) {
        self.audit_runs.inc();
    }

    /// Record an auditor correction
    pub fn record_audit_correction(&self) {
        self.audit_corrections.inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.entries_committed.get(), 0);
        assert_eq!(metrics.audit_corrections.get(), 0);
    }

    #[test]
    fn test_independent_registries() {
        // Two collectors in one process must not collide
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();
        first.record_committed();
        assert_eq!(first.entries_committed.get(), 1);
        assert_eq!(second.entries_committed.get(), 0);
    }

    #[test]
    fn test_record_rejected_by_reason() {
        let metrics = Metrics::new().unwrap();
        metrics.record_rejected("insufficient_balance");
        metrics.record_rejected("insufficient_balance");
        metrics.record_rejected("account_not_found");
        assert_eq!(
            metrics
                .apply_rejected
                .with_label_values(&["insufficient_balance"])
                .get(),
            2
        );
    }

    #[test]
    fn test_cache_lookup() {
        let metrics = Metrics::new().unwrap();
        metrics.record_cache_lookup(true);
        metrics.record_cache_lookup(false);
        metrics.record_cache_lookup(false);
        assert_eq!(metrics.cache_hits.get(), 1);
        assert_eq!(metrics.cache_misses.get(), 2);
    }
}
