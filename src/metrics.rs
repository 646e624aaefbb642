/// Metrics and telemetry for the admin gate
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - Two-step authentication outcomes per step
/// - Privilege gate decisions
/// - Seller application decisions
/// - Background housekeeping runs

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter_vec, register_int_gauge, Encoder, IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // ========== Authentication Metrics ==========

    /// Two-step attempts by step and outcome (success, failed, rate_limited)
    pub static ref AUTH_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "admin_auth_attempts_total",
        "Total number of admin passphrase attempts",
        &["step", "outcome"]
    )
    .unwrap();

    /// Privilege gate decisions by role and decision
    pub static ref GATE_DECISIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "privilege_gate_decisions_total",
        "Total number of privilege gate decisions",
        &["role", "decision"]
    )
    .unwrap();

    // ========== Application Metrics ==========

    /// Seller application decisions
    pub static ref APPLICATION_DECISIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "seller_application_decisions_total",
        "Total number of seller application decisions",
        &["decision"]
    )
    .unwrap();

    // ========== Background Job Metrics ==========

    /// Background job executions by job type and status
    pub static ref BACKGROUND_JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "background_jobs_total",
        "Total number of background job executions",
        &["job_type", "status"]
    )
    .unwrap();

    /// Rows removed by the last housekeeping pass
    pub static ref HOUSEKEEPING_LAST_PURGED: IntGauge = register_int_gauge!(
        "housekeeping_last_purged",
        "Rows removed by the most recent housekeeping pass"
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Record a background job execution
pub fn record_background_job(job_type: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    BACKGROUND_JOBS_TOTAL
        .with_label_values(&[job_type, status])
        .inc();
}
