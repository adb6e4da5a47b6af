use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, register_int_gauge, IntCounterVec, IntGauge};

// Prometheus metrics (default registry)
pub static LIFECYCLE_OPERATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "file_server_lifecycle_operations_total",
        "Lifecycle operations by protocol, operation and outcome",
        &["protocol", "operation", "outcome"]
    )
    .expect("register lifecycle_operations_total")
});

pub static JOBS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "file_server_lifecycle_jobs_in_flight",
        "Background install/uninstall jobs queued or running"
    )
    .expect("register jobs_in_flight")
});

pub fn record(protocol: &str, operation: &str, outcome: &str) {
    LIFECYCLE_OPERATIONS_TOTAL.with_label_values(&[protocol, operation, outcome]).inc();
}
