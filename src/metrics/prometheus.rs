//! Prometheus metrics for outbound search traffic

use once_cell::sync::Lazy;
use prometheus::{
    opts, register_histogram, register_int_counter, Encoder, Histogram, HistogramOpts, IntCounter, TextEncoder,
};

use crate::models::{SearchError, SearchResult};

static SEARCH_REQUESTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!("esgf_search_requests_total", "Total number of search requests"))
        .expect("Failed to create search requests counter")
});

static SCRIPT_REQUESTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "esgf_script_requests_total",
        "Total number of download script requests"
    ))
    .expect("Failed to create script requests counter")
});

static SHARD_PROBES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!("esgf_shard_probes_total", "Total number of shard list probes"))
        .expect("Failed to create shard probes counter")
});

static RESULT_PAGES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!("esgf_result_pages_total", "Total number of result pages fetched"))
        .expect("Failed to create result pages counter")
});

static REQUEST_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!("esgf_request_errors_total", "Total number of failed requests"))
        .expect("Failed to create request errors counter")
});

static REQUEST_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(HistogramOpts::new(
        "esgf_request_duration_seconds",
        "Search service request duration in seconds"
    ))
    .expect("Failed to create request duration histogram")
});

/// Initialize all metrics
pub fn init_metrics() {
    Lazy::force(&SEARCH_REQUESTS_TOTAL);
    Lazy::force(&SCRIPT_REQUESTS_TOTAL);
    Lazy::force(&SHARD_PROBES_TOTAL);
    Lazy::force(&RESULT_PAGES_TOTAL);
    Lazy::force(&REQUEST_ERRORS_TOTAL);
    Lazy::force(&REQUEST_DURATION);
}

pub fn record_search_request() {
    SEARCH_REQUESTS_TOTAL.inc();
}

pub fn record_script_request() {
    SCRIPT_REQUESTS_TOTAL.inc();
}

pub fn record_shard_probe() {
    SHARD_PROBES_TOTAL.inc();
}

pub fn record_result_page() {
    RESULT_PAGES_TOTAL.inc();
}

pub fn record_request_error() {
    REQUEST_ERRORS_TOTAL.inc();
}

/// Record request duration
pub fn record_request_duration(duration_secs: f64) {
    REQUEST_DURATION.observe(duration_secs);
}

/// Render all registered metrics in the Prometheus text format
pub fn gather_metrics() -> SearchResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| SearchError::SerializationError(format!("Failed to encode metrics: {}", e)))?;

    String::from_utf8(buffer).map_err(|e| SearchError::SerializationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        init_metrics();

        record_search_request();
        record_shard_probe();
        record_request_duration(0.1);

        let text = gather_metrics().unwrap();
        assert!(text.contains("esgf_search_requests_total"));
        assert!(text.contains("esgf_request_duration_seconds"));
    }
}
