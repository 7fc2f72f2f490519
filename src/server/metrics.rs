//! Prometheus metrics definitions.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter_vec, register_int_gauge, Histogram, IntCounterVec,
    IntGauge,
};

/// Priming requests sent to the inference server, by outcome.
pub static PRIMING_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "prewarm_priming_requests_total",
        "Priming requests sent to the inference server",
        &["outcome"]
    )
    .unwrap()
});

/// Files not sent for priming, by reason.
pub static PRIMING_SKIPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "prewarm_priming_skipped_total",
        "Files skipped instead of primed",
        &["reason"]
    )
    .unwrap()
});

/// Priming request latency histogram.
pub static PRIMING_LATENCY: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "prewarm_priming_duration_seconds",
        "Priming request latency in seconds",
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap()
});

/// Files waiting in the priming queue.
pub static QUEUE_DEPTH: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "prewarm_queue_depth",
        "Number of files waiting to be primed"
    )
    .unwrap()
});

/// Files tracked in the index.
pub static FILES_TRACKED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("prewarm_files_tracked", "Total number of tracked files").unwrap()
});

/// Initialize all metrics (call once at startup).
pub fn init_metrics() {
    // Access lazy statics to register them
    let _ = &*PRIMING_REQUESTS;
    let _ = &*PRIMING_SKIPPED;
    let _ = &*PRIMING_LATENCY;
    let _ = &*QUEUE_DEPTH;
    let _ = &*FILES_TRACKED;

    tracing::debug!("Prometheus metrics initialized");
}
