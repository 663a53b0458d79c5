//! Prometheus metrics for the courier service.
//!
//! Exposes a standard `/metrics` endpoint that Prometheus can scrape. Request
//! metrics are recorded by [`track_requests`]; handlers count successful deliveries.

use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use once_cell::sync::Lazy;
use prometheus::{
    opts, register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    Encoder, HistogramVec, TextEncoder,
};

/// All metrics are registered in the global default registry.
pub struct CourierMetrics {
    passwords_total: Counter,
    certificates_total: Counter,
    requests_total: CounterVec,
    request_duration_seconds: HistogramVec,
}

static METRICS: Lazy<CourierMetrics> = Lazy::new(CourierMetrics::new);

impl CourierMetrics {
    fn new() -> Self {
        let passwords_total = register_counter!(opts!(
            "courier_passwords_total",
            "Number of PKCS12 passwords successfully posted to courier"
        ))
        .expect("failed to register courier_passwords_total");

        let certificates_total = register_counter!(opts!(
            "courier_certificates_total",
            "Number of certificates successfully delivered to courier"
        ))
        .expect("failed to register courier_certificates_total");

        let requests_total = register_counter_vec!(
            opts!(
                "courier_requests_total",
                "Number of HTTP requests processed, partitioned by status code and method"
            ),
            &["code", "method", "path"]
        )
        .expect("failed to register courier_requests_total");

        let request_duration_seconds = register_histogram_vec!(
            prometheus::histogram_opts!(
                "courier_request_duration_seconds",
                "Request latencies in seconds",
                vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
            ),
            &["code", "method", "path"]
        )
        .expect("failed to register courier_request_duration_seconds");

        Self {
            passwords_total,
            certificates_total,
            requests_total,
            request_duration_seconds,
        }
    }
}

pub fn metrics() -> &'static CourierMetrics {
    &METRICS
}

pub fn record_password() {
    METRICS.passwords_total.inc();
}

pub fn record_certificate() {
    METRICS.certificates_total.inc();
}

/// Route layer recording a counter and latency histogram per request. The `path`
/// label is the matched route template so ids never become label values.
pub async fn track_requests(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());

    let resp = next.run(req).await;

    let code = resp.status().as_u16().to_string();
    let labels = [code.as_str(), method.as_str(), path.as_str()];
    METRICS.requests_total.with_label_values(&labels).inc();
    METRICS
        .request_duration_seconds
        .with_label_values(&labels)
        .observe(start.elapsed().as_secs_f64());

    resp
}

/// Encode all registered metrics as Prometheus text format.
/// Called by the `/metrics` HTTP handler.
pub fn encode_metrics() -> String {
    // Touch the lazy registration so the courier metrics are always exported.
    let _ = metrics();

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap_or_default();
    String::from_utf8(buffer).unwrap_or_default()
}
