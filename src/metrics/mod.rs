use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec,
    IntGauge, Opts, Registry,
};

// ============================================================================
// Metrics - Prometheus metrics for the ingestion and read paths
// ============================================================================
//
// - Ingestion outcomes (persisted, rejected by stage, persistence failures)
// - Store write latency
// - Cache hits, misses and size
// - Offset commits
//
// Scraped via /metrics on the HTTP server.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Ingestion
    pub messages_received: IntCounter,
    pub messages_persisted: IntCounter,
    pub messages_rejected: IntCounterVec,
    pub messages_failed: IntCounterVec,
    pub offsets_committed: IntCounter,
    pub persist_duration: HistogramVec,

    // Cache
    pub cache_hits: IntCounter,
    pub cache_misses: IntCounter,
    pub cache_entries: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let messages_received = IntCounter::new(
            "order_messages_received_total",
            "Order messages received from the stream",
        )?;
        registry.register(Box::new(messages_received.clone()))?;

        let messages_persisted = IntCounter::new(
            "order_messages_persisted_total",
            "Order messages persisted and acknowledged",
        )?;
        registry.register(Box::new(messages_persisted.clone()))?;

        let messages_rejected = IntCounterVec::new(
            Opts::new("order_messages_rejected_total", "Order messages skipped as malformed or invalid"),
            &["stage"],
        )?;
        registry.register(Box::new(messages_rejected.clone()))?;

        let messages_failed = IntCounterVec::new(
            Opts::new("order_messages_failed_total", "Order messages left unacknowledged after store failures"),
            &["reason"],
        )?;
        registry.register(Box::new(messages_failed.clone()))?;

        let offsets_committed = IntCounter::new(
            "order_offsets_committed_total",
            "Offsets committed back to the broker",
        )?;
        registry.register(Box::new(offsets_committed.clone()))?;

        let persist_duration = HistogramVec::new(
            HistogramOpts::new("order_persist_duration_seconds", "Order aggregate write duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["outcome"],
        )?;
        registry.register(Box::new(persist_duration.clone()))?;

        let cache_hits = IntCounter::new("order_cache_hits_total", "Order lookups served from cache")?;
        registry.register(Box::new(cache_hits.clone()))?;

        let cache_misses = IntCounter::new("order_cache_misses_total", "Order lookups that fell through to the store")?;
        registry.register(Box::new(cache_misses.clone()))?;

        let cache_entries = IntGauge::new("order_cache_entries", "Orders currently cached")?;
        registry.register(Box::new(cache_entries.clone()))?;

        Ok(Self {
            registry,
            messages_received,
            messages_persisted,
            messages_rejected,
            messages_failed,
            offsets_committed,
            persist_duration,
            cache_hits,
            cache_misses,
            cache_entries,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_persist(&self, duration_secs: f64, success: bool) {
        let outcome = if success { "ok" } else { "error" };
        self.persist_duration.with_label_values(&[outcome]).observe(duration_secs);
        if success {
            self.messages_persisted.inc();
        }
    }

    pub fn record_rejected(&self, stage: &str) {
        self.messages_rejected.with_label_values(&[stage]).inc();
    }

    pub fn record_failed(&self, reason: &str) {
        self.messages_failed.with_label_values(&[reason]).inc();
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        if hit {
            self.cache_hits.inc();
        } else {
            self.cache_misses.inc();
        }
    }

    pub fn set_cache_entries(&self, entries: usize) {
        self.cache_entries.set(entries as i64);
    }
}
