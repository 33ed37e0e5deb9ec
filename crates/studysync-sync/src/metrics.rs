//! Prometheus metrics for the sync subsystem
//!
//! Counts queue item outcomes, processor passes and cache refreshes, and
//! tracks the size of the pending queue.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

/// Registry holding every sync metric
pub struct SyncMetrics {
    registry: Registry,
    /// Counter: queue items by (kind, outcome)
    pub items_total: IntCounterVec,
    /// Counter: processor passes by result
    pub passes_total: IntCounterVec,
    /// Histogram: pass duration in seconds
    pub pass_duration_seconds: HistogramVec,
    /// Counter: question cache refreshes by result
    pub cache_refreshes_total: IntCounterVec,
    /// Gauge: items waiting in the queue after the last pass
    pub pending_items: IntGauge,
}

impl SyncMetrics {
    /// Creates a registry with all metrics registered
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new_custom(Some("studysync".to_string()), None)?;

        let items_total = IntCounterVec::new(
            Opts::new("sync_items_total", "Queue items processed by outcome"),
            &["kind", "outcome"],
        )?;
        registry.register(Box::new(items_total.clone()))?;

        let passes_total = IntCounterVec::new(
            Opts::new("sync_passes_total", "Queue processing passes"),
            &["result"],
        )?;
        registry.register(Box::new(passes_total.clone()))?;

        let pass_duration_seconds = HistogramVec::new(
            HistogramOpts::new("sync_pass_duration_seconds", "Queue pass duration in seconds")
                .buckets(vec![0.1, 1.0, 10.0, 60.0, f64::INFINITY]),
            &["result"],
        )?;
        registry.register(Box::new(pass_duration_seconds.clone()))?;

        let cache_refreshes_total = IntCounterVec::new(
            Opts::new("cache_refreshes_total", "Question cache refreshes"),
            &["result"],
        )?;
        registry.register(Box::new(cache_refreshes_total.clone()))?;

        let pending_items = IntGauge::with_opts(Opts::new(
            "sync_pending_items",
            "Items waiting in the sync queue",
        ))?;
        registry.register(Box::new(pending_items.clone()))?;

        Ok(Self {
            registry,
            items_total,
            passes_total,
            pass_duration_seconds,
            cache_refreshes_total,
            pending_items,
        })
    }

    // ========================================================================
    // Recording helpers
    // ========================================================================

    /// Record the outcome of one queue item
    pub fn record_item(&self, kind: &str, outcome: &str) {
        self.items_total.with_label_values(&[kind, outcome]).inc();
    }

    /// Record a finished pass and its duration
    pub fn record_pass(&self, result: &str, duration_secs: f64) {
        self.passes_total.with_label_values(&[result]).inc();
        self.pass_duration_seconds
            .with_label_values(&[result])
            .observe(duration_secs);
    }

    /// Record a cache refresh outcome
    pub fn record_cache_refresh(&self, result: &str) {
        self.cache_refreshes_total.with_label_values(&[result]).inc();
    }

    pub fn set_pending(&self, count: u64) {
        self.pending_items
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    /// Encode all metrics in Prometheus text exposition format
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
