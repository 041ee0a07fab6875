use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};

// Prometheus metrics (default registry)
pub static BACKEND_OPS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "hexmap_backend_ops_total",
        "Backend operations by backend, operation and outcome",
        &["backend", "op", "outcome"]
    )
    .expect("register backend_ops_total")
});

pub static BACKEND_OP_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "hexmap_backend_op_duration_seconds",
        "Backend operation duration in seconds, lock wait excluded",
        &["backend", "op"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("register backend_op_duration")
});

pub fn record_op(backend: &str, op: &str, outcome: &str, elapsed_secs: f64) {
    BACKEND_OPS_TOTAL.with_label_values(&[backend, op, outcome]).inc();
    BACKEND_OP_DURATION.with_label_values(&[backend, op]).observe(elapsed_secs);
}

/// Text exposition of the default registry.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}
