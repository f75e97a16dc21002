use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Histogram bucket boundaries for latency metrics (seconds).
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Thin handle around the global metrics recorder.
///
/// After `Metrics::install()` the `metrics` crate macros (`counter!`, `gauge!`,
/// `histogram!`) can be used anywhere in the codebase. The `PrometheusHandle`
/// is retained solely for rendering the `/metrics` endpoint.
#[derive(Clone)]
pub struct Metrics {
    handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and register metric descriptions.
    ///
    /// Must be called **once** at startup before any `counter!` / `gauge!` /
    /// `histogram!` calls.
    pub fn install() -> Self {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                metrics_exporter_prometheus::Matcher::Suffix("_duration_seconds".to_string()),
                LATENCY_BUCKETS,
            )
            .expect("valid matcher")
            .install_recorder()
            .expect("failed to install metrics recorder");

        describe_counter!(
            "tunnel_http_requests_total",
            Unit::Count,
            "Total front-door HTTP requests proxied to a peer"
        );
        describe_histogram!(
            "tunnel_http_request_duration_seconds",
            Unit::Seconds,
            "Round-trip duration of a proxied request, from front-door receipt to response delivery"
        );
        describe_counter!(
            "tunnel_http_requests_no_such_peer_total",
            Unit::Count,
            "Requests rejected because the target peer id was not registered"
        );
        describe_counter!(
            "tunnel_http_requests_timed_out_total",
            Unit::Count,
            "Requests that exceeded the response deadline waiting on a peer"
        );
        describe_counter!(
            "tunnel_http_requests_gateway_closed_total",
            Unit::Count,
            "Requests that failed because the peer's Proxier was closed mid-flight"
        );

        describe_gauge!(
            "tunnel_peers_registered",
            Unit::Count,
            "Number of peers currently registered, across all tenants"
        );
        describe_counter!(
            "tunnel_peer_registrations_total",
            Unit::Count,
            "Total Register RPCs accepted"
        );
        describe_counter!(
            "tunnel_peer_displacements_total",
            Unit::Count,
            "Total registrations that displaced an existing peer at the same id"
        );
        describe_gauge!(
            "tunnel_proxier_pending_requests",
            Unit::Count,
            "Sum of in-flight (unacknowledged) requests across all Proxiers"
        );

        Self { handle }
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
