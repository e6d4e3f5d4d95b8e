use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Business Metrics
    pub static ref PROGRESS_EVENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "progress_events_total",
        "Total number of progress events recorded",
        &["content_type"]
    )
    .unwrap();

    pub static ref COURSE_PROGRESS_COMPUTATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "course_progress_computations_total",
        "Total number of course progress aggregations",
        &["source"]
    )
    .unwrap();

    pub static ref ATTEMPTS_STARTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "attempts_started_total",
        "Total number of assessment attempts started",
        &["resumed"]
    )
    .unwrap();

    pub static ref ATTEMPTS_SUBMITTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "attempts_submitted_total",
        "Total number of assessment attempts submitted",
        &["passed"]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_registered_metrics() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/health", "200"])
            .inc();

        let output = render_metrics().unwrap();
        assert!(output.contains("http_requests_total"));
    }

    #[test]
    fn business_counters_accept_labels() {
        PROGRESS_EVENTS_TOTAL.with_label_values(&["video"]).inc();
        ATTEMPTS_SUBMITTED_TOTAL
            .with_label_values(&["true"])
            .inc();
    }
}
