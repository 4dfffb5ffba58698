//! Metrics and observability utilities
//!
//! Prometheus metrics with standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all CiteWeave metrics
pub const METRICS_PREFIX: &str = "citeweave";

/// Buckets for job wait latency (seconds); the production budget is 60s
pub const JOB_WAIT_BUCKETS: &[f64] = &[
    1.5,   // one simulated interval
    2.0,   // one production interval
    3.0,   // simulated budget
    5.0,
    10.0,
    20.0,
    30.0,
    45.0,
    60.0,  // production budget
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Expansion metrics
    describe_counter!(
        format!("{}_expansions_total", METRICS_PREFIX),
        Unit::Count,
        "Node expansions by outcome"
    );

    describe_histogram!(
        format!("{}_expansion_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end node expansion latency in seconds"
    );

    // Job metrics
    describe_counter!(
        format!("{}_job_polls_total", METRICS_PREFIX),
        Unit::Count,
        "Total search job status checks"
    );

    describe_counter!(
        format!("{}_jobs_total", METRICS_PREFIX),
        Unit::Count,
        "Search jobs by terminal outcome"
    );

    describe_histogram!(
        format!("{}_job_wait_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Time spent waiting for a search job"
    );

    // Relationship store metrics
    describe_counter!(
        format!("{}_store_hits_total", METRICS_PREFIX),
        Unit::Count,
        "Relationship lookups that found an entry"
    );

    describe_counter!(
        format!("{}_store_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Relationship lookups that found nothing"
    );

    describe_counter!(
        format!("{}_store_write_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Relationship writes that failed"
    );

    // Layout metrics
    describe_histogram!(
        format!("{}_layout_iterations", METRICS_PREFIX),
        Unit::Count,
        "Collision resolution iterations per layout"
    );

    describe_counter!(
        format!("{}_layout_settle_moves_total", METRICS_PREFIX),
        Unit::Count,
        "Nodes moved by the final settle sweep"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record a finished expansion
pub fn record_expansion(duration_secs: f64, outcome: &str) {
    counter!(
        format!("{}_expansions_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_expansion_duration_seconds", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .record(duration_secs);
}

/// Helper to record a single job status check
pub fn record_job_poll(job_type: &str, status: &str) {
    counter!(
        format!("{}_job_polls_total", METRICS_PREFIX),
        "job_type" => job_type.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Helper to record a job reaching an outcome (success, error, timeout)
pub fn record_job_outcome(wait_secs: f64, profile: &str, outcome: &str) {
    counter!(
        format!("{}_jobs_total", METRICS_PREFIX),
        "profile" => profile.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_job_wait_seconds", METRICS_PREFIX),
        "profile" => profile.to_string()
    )
    .record(wait_secs);
}

/// Helper to record relationship store lookups
pub fn record_store_lookup(hit: bool, backend: &str) {
    if hit {
        counter!(
            format!("{}_store_hits_total", METRICS_PREFIX),
            "backend" => backend.to_string()
        )
        .increment(1);
    } else {
        counter!(
            format!("{}_store_misses_total", METRICS_PREFIX),
            "backend" => backend.to_string()
        )
        .increment(1);
    }
}

/// Helper to record a failed relationship write
pub fn record_store_write_failure(backend: &str) {
    counter!(
        format!("{}_store_write_failures_total", METRICS_PREFIX),
        "backend" => backend.to_string()
    )
    .increment(1);
}

/// Helper to record layout work
pub fn record_layout(iterations: usize, settle_moves: usize) {
    histogram!(format!("{}_layout_iterations", METRICS_PREFIX)).record(iterations as f64);

    if settle_moves > 0 {
        counter!(format!("{}_layout_settle_moves_total", METRICS_PREFIX))
            .increment(settle_moves as u64);
    }
}
