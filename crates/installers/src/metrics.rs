use once_cell::sync::Lazy;
use prometheus::{register_int_counter, IntCounter};

pub static COMMAND_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "file_server_command_failures_total",
        "Host commands that exited non-zero, timed out or failed to spawn"
    )
    .expect("register command_failures_total")
});
