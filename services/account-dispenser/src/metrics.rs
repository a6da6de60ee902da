//! Prometheus metrics exposition
//!
//! The pool crate emits its own series through the `metrics` facade
//! (`account_pool_*`). This module installs the recorder that collects them
//! and adds the request-level series:
//!
//! - `dispenser_requests_total` (counter): labels `route`, `status`
//! - `dispenser_request_duration_seconds` (histogram): label `route`

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

const REQUEST_DURATION: &str = "dispenser_request_duration_seconds";

/// Bucket boundaries from 1ms to 5s. A request holds the pool lock for at
/// most two file rewrites.
const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(REQUEST_DURATION.to_string()), DURATION_BUCKETS)
}

/// Install the global Prometheus recorder and return a handle for rendering.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Record a completed request on a public route.
pub fn record_request(route: &'static str, status: u16, duration_secs: f64) {
    metrics::counter!("dispenser_requests_total", "route" => route, "status" => status.to_string())
        .increment(1);
    metrics::histogram!(REQUEST_DURATION, "route" => route).record(duration_secs);
}

#[cfg(test)]
pub(crate) fn isolated_recorder() -> (
    metrics_exporter_prometheus::PrometheusRecorder,
    PrometheusHandle,
) {
    let recorder = builder().unwrap().build_recorder();
    let handle = recorder.handle();
    (recorder, handle)
}
