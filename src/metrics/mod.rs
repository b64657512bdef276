// Metrics module for Prometheus observability
// Author: kelexine (https://github.com/kelexine)

mod registry;

pub use registry::{
    gather_metrics,
    BLOB_STORE_WRITES,
    CHAT_REQUESTS,
    CHAT_REQUEST_DURATION,
    GEMINI_API_CALLS,
    GEMINI_API_DURATION,
};

/// Helper to record chat request metrics
pub fn record_chat_request(outcome: &str, status_code: u16, duration_secs: f64) {
    CHAT_REQUESTS
        .with_label_values(&[outcome, &status_code.to_string()])
        .inc();

    CHAT_REQUEST_DURATION
        .with_label_values(&[outcome])
        .observe(duration_secs);
}

/// Helper to record Gemini API call metrics
pub fn record_gemini_call(model: &str, success: bool, duration_secs: f64) {
    let status = if success { "success" } else { "failure" };
    GEMINI_API_CALLS
        .with_label_values(&[model, status])
        .inc();

    GEMINI_API_DURATION
        .with_label_values(&[model])
        .observe(duration_secs);
}

/// Helper to record blob store writes
pub fn record_blob_write(success: bool) {
    let status = if success { "success" } else { "failure" };
    BLOB_STORE_WRITES.with_label_values(&[status]).inc();
}
