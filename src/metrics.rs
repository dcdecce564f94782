//! Prometheus metrics registry and an axum `/metrics` endpoint exposing
//! it as the standard text exposition format.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use prometheus::{CounterVec, Encoder, HistogramVec, IntGauge, Registry, TextEncoder, histogram_opts, opts};

pub struct Metrics {
    registry: Registry,
    pub queries_total: CounterVec,
    pub query_duration: HistogramVec,
    pub cache_hits: CounterVec,
    pub cache_misses: CounterVec,
    pub upstream_requests: CounterVec,
    pub upstream_errors: CounterVec,
    pub active_connections: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let queries_total = CounterVec::new(
            opts!("waypoint_queries_total", "Total queries handled by protocol"),
            &["protocol"],
        )?;
        let query_duration = HistogramVec::new(
            histogram_opts!("waypoint_query_duration_seconds", "Query handling latency"),
            &["protocol"],
        )?;
        let cache_hits = CounterVec::new(
            opts!("waypoint_cache_hits_total", "Cache hits by freshness"),
            &["kind"],
        )?;
        let cache_misses = CounterVec::new(opts!("waypoint_cache_misses_total", "Cache misses"), &["kind"])?;
        let upstream_requests = CounterVec::new(
            opts!("waypoint_upstream_requests_total", "Requests sent upstream"),
            &["upstream"],
        )?;
        let upstream_errors = CounterVec::new(
            opts!("waypoint_upstream_errors_total", "Upstream exchange errors"),
            &["upstream"],
        )?;
        let active_connections = IntGauge::new(
            "waypoint_active_connections",
            "Currently open stream-oriented client connections",
        )?;

        registry.register(Box::new(queries_total.clone()))?;
        registry.register(Box::new(query_duration.clone()))?;
        registry.register(Box::new(cache_hits.clone()))?;
        registry.register(Box::new(cache_misses.clone()))?;
        registry.register(Box::new(upstream_requests.clone()))?;
        registry.register(Box::new(upstream_errors.clone()))?;
        registry.register(Box::new(active_connections.clone()))?;

        Ok(Self {
            registry,
            queries_total,
            query_duration,
            cache_hits,
            cache_misses,
            upstream_requests,
            upstream_errors,
            active_connections,
        })
    }

    fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        if encoder.encode(&metric_families, &mut buf).is_err() {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

pub fn router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/metrics", get(handle_metrics))
        .with_state(metrics)
}

async fn handle_metrics(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    (StatusCode::OK, metrics.gather())
}
