use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::time::Instant;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Storage metrics
    pub static ref STORE_READS: IntCounter = IntCounter::new(
        "store_reads_total",
        "Total number of ephemeral store read operations"
    ).unwrap();

    pub static ref STORE_WRITES: IntCounter = IntCounter::new(
        "store_writes_total",
        "Total number of ephemeral store write operations"
    ).unwrap();

    pub static ref TTL_KEYS_EXPIRED: IntCounter = IntCounter::new(
        "ttl_keys_expired_total",
        "Total number of keys dropped on TTL expiry (lazy read or sweep)"
    ).unwrap();

    pub static ref MALFORMED_ENTRIES_SKIPPED: IntCounter = IntCounter::new(
        "malformed_entries_skipped_total",
        "Total number of undecodable persisted entries skipped during bulk reads"
    ).unwrap();

    // Bubble lifecycle metrics
    pub static ref BUBBLES_CREATED: IntCounterVec = IntCounterVec::new(
        Opts::new("bubbles_created_total", "Total bubbles accepted, by origin"),
        &["origin"]
    ).unwrap();

    pub static ref SUBMISSIONS_REJECTED: IntCounterVec = IntCounterVec::new(
        Opts::new("submissions_rejected_total", "Total submissions rejected, by reason"),
        &["reason"]
    ).unwrap();

    pub static ref SIDE_EFFECT_FAILURES: IntCounter = IntCounter::new(
        "side_effect_failures_total",
        "Total best-effort bookkeeping failures swallowed after a live bubble write"
    ).unwrap();

    pub static ref HISTORY_TRIMMED: IntCounter = IntCounter::new(
        "history_trimmed_total",
        "Total history entries removed by the append-time length bound"
    ).unwrap();

    // Fanout metrics
    pub static ref CONNECTED_VIEWERS: IntGauge = IntGauge::new(
        "connected_viewers",
        "Current number of connected viewers"
    ).unwrap();

    pub static ref PEAK_VIEWERS: IntGauge = IntGauge::new(
        "peak_viewers",
        "Highest number of concurrently connected viewers seen by this process"
    ).unwrap();

    pub static ref EVENTS_BROADCAST: IntCounterVec = IntCounterVec::new(
        Opts::new("events_broadcast_total", "Total events fanned out, by audience"),
        &["audience"]
    ).unwrap();

    pub static ref REPLAYED_BUBBLES: IntCounter = IntCounter::new(
        "replayed_bubbles_total",
        "Total live bubbles replayed to newly connected viewers"
    ).unwrap();

    // Seeder metrics
    pub static ref SEED_BATCHES: IntCounter = IntCounter::new(
        "seed_batches_total",
        "Total seed injection rounds that actually ran"
    ).unwrap();

    // Latency metrics (in seconds)
    pub static ref READ_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "store_read_duration_seconds",
            "Ephemeral store read latency in seconds"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0])
    ).unwrap();

    pub static ref WRITE_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "store_write_duration_seconds",
            "Ephemeral store write latency in seconds"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0])
    ).unwrap();

    pub static ref SUBMIT_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "submit_duration_seconds",
            "End-to-end bubble submit latency in seconds"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0])
    ).unwrap();
}

/// Initialize metrics registry
pub fn init_metrics() {
    REGISTRY.register(Box::new(STORE_READS.clone())).unwrap();
    REGISTRY.register(Box::new(STORE_WRITES.clone())).unwrap();
    REGISTRY.register(Box::new(TTL_KEYS_EXPIRED.clone())).unwrap();
    REGISTRY.register(Box::new(MALFORMED_ENTRIES_SKIPPED.clone())).unwrap();

    REGISTRY.register(Box::new(BUBBLES_CREATED.clone())).unwrap();
    REGISTRY.register(Box::new(SUBMISSIONS_REJECTED.clone())).unwrap();
    REGISTRY.register(Box::new(SIDE_EFFECT_FAILURES.clone())).unwrap();
    REGISTRY.register(Box::new(HISTORY_TRIMMED.clone())).unwrap();

    REGISTRY.register(Box::new(CONNECTED_VIEWERS.clone())).unwrap();
    REGISTRY.register(Box::new(PEAK_VIEWERS.clone())).unwrap();
    REGISTRY.register(Box::new(EVENTS_BROADCAST.clone())).unwrap();
    REGISTRY.register(Box::new(REPLAYED_BUBBLES.clone())).unwrap();

    REGISTRY.register(Box::new(SEED_BATCHES.clone())).unwrap();

    REGISTRY.register(Box::new(READ_LATENCY.clone())).unwrap();
    REGISTRY.register(Box::new(WRITE_LATENCY.clone())).unwrap();
    REGISTRY.register(Box::new(SUBMIT_LATENCY.clone())).unwrap();

    tracing::info!("Metrics registry initialized with {} collectors", REGISTRY.gather().len());
}

/// Helper struct for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration_seconds(&self, histogram: &Histogram) {
        let duration = self.start.elapsed();
        histogram.observe(duration.as_secs_f64());
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Export metrics in Prometheus format
pub fn export_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
