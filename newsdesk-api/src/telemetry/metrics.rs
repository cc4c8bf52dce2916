//! Prometheus Metrics Definitions
//!
//! Defines the dashboard pipeline metrics and exposes a /metrics endpoint
//! for Prometheus scraping.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use newsdesk_storage::CacheStats;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec,
    CounterVec, Encoder, Gauge, GaugeVec, HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};
use crate::state::CachedStore;

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<DashboardMetrics>> = Lazy::new(DashboardMetrics::new);

/// Get the registered metrics, or `None` if registration failed.
pub fn metrics() -> Option<&'static DashboardMetrics> {
    METRICS.as_ref().ok()
}

/// Container for all Newsdesk metrics.
#[derive(Clone)]
pub struct DashboardMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Currently open dashboard streams
    pub stream_sessions: Gauge,

    /// Events published on the bus - labels: event_type
    pub events_published_total: CounterVec,

    /// Events handed to stream sessions - labels: event_type, source (tick/bus)
    pub events_delivered_total: CounterVec,

    /// Events a session dropped because its buffer was full - labels: event_type
    pub events_dropped_total: CounterVec,

    /// Snapshot producer failures - labels: producer
    pub producer_failures_total: CounterVec,

    /// Bus subscriber failures - labels: kind (error/panic)
    pub subscriber_failures_total: CounterVec,

    /// Push relay deliveries - labels: status (success/failure)
    pub relay_deliveries_total: CounterVec,

    /// Query cache counters - labels: stat (hits/misses/evictions/invalidations/entries)
    pub query_cache: GaugeVec,
}

impl DashboardMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "newsdesk_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_requests_total: {}", e)))?,

            http_request_duration_seconds: register_histogram_vec!(
                "newsdesk_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_request_duration_seconds: {}", e)))?,

            stream_sessions: register_gauge!(
                "newsdesk_stream_sessions",
                "Number of open dashboard stream sessions"
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register stream_sessions: {}", e)))?,

            events_published_total: register_counter_vec!(
                "newsdesk_events_published_total",
                "Total number of events published on the event bus",
                &["event_type"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register events_published_total: {}", e)))?,

            events_delivered_total: register_counter_vec!(
                "newsdesk_events_delivered_total",
                "Total number of events queued to stream sessions",
                &["event_type", "source"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register events_delivered_total: {}", e)))?,

            events_dropped_total: register_counter_vec!(
                "newsdesk_events_dropped_total",
                "Total number of bus events dropped by a full session buffer",
                &["event_type"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register events_dropped_total: {}", e)))?,

            producer_failures_total: register_counter_vec!(
                "newsdesk_producer_failures_total",
                "Total number of snapshot producer failures",
                &["producer"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register producer_failures_total: {}", e)))?,

            subscriber_failures_total: register_counter_vec!(
                "newsdesk_subscriber_failures_total",
                "Total number of failed event bus subscriber calls",
                &["kind"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register subscriber_failures_total: {}", e)))?,

            relay_deliveries_total: register_counter_vec!(
                "newsdesk_relay_deliveries_total",
                "Total number of push relay deliveries",
                &["status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register relay_deliveries_total: {}", e)))?,

            query_cache: register_gauge_vec!(
                "newsdesk_query_cache",
                "Query cache statistics",
                &["stat"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register query_cache: {}", e)))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Increment open stream count.
    pub fn session_opened(&self) {
        self.stream_sessions.inc();
    }

    /// Decrement open stream count.
    pub fn session_closed(&self) {
        self.stream_sessions.dec();
    }

    pub fn record_published(&self, event_type: &str) {
        self.events_published_total
            .with_label_values(&[event_type])
            .inc();
    }

    pub fn record_delivered(&self, event_type: &str, source: &str) {
        self.events_delivered_total
            .with_label_values(&[event_type, source])
            .inc();
    }

    pub fn record_dropped(&self, event_type: &str) {
        self.events_dropped_total
            .with_label_values(&[event_type])
            .inc();
    }

    pub fn record_producer_failure(&self, producer: &str) {
        self.producer_failures_total
            .with_label_values(&[producer])
            .inc();
    }

    /// Record a failed subscriber call; `panicked` distinguishes panics from error returns.
    pub fn record_subscriber_failure(&self, panicked: bool) {
        let kind = if panicked { "panic" } else { "error" };
        self.subscriber_failures_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Record a push relay delivery.
    pub fn record_relay_delivery(&self, success: bool) {
        let status = if success { "success" } else { "failure" };
        self.relay_deliveries_total
            .with_label_values(&[status])
            .inc();
    }

    /// Publish a cache statistics sample.
    pub fn set_cache_stats(&self, stats: &CacheStats) {
        self.query_cache.with_label_values(&["hits"]).set(stats.hits as f64);
        self.query_cache.with_label_values(&["misses"]).set(stats.misses as f64);
        self.query_cache
            .with_label_values(&["evictions"])
            .set(stats.evictions as f64);
        self.query_cache
            .with_label_values(&["invalidations"])
            .set(stats.invalidations as f64);
        self.query_cache
            .with_label_values(&["entries"])
            .set(stats.entry_count as f64);
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics. Cache gauges are sampled from
/// the query cache on every scrape.
pub async fn metrics_handler(State(store): State<Arc<CachedStore>>) -> impl IntoResponse {
    if let Some(m) = metrics() {
        m.set_cache_stats(&store.stats());
    }

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use newsdesk_storage::{CacheConfig, CachingStore, DashboardStore, InMemoryStore, UserQuery};
    use prometheus::core::Collector;

    #[test]
    fn test_metrics_creation() -> Result<(), String> {
        // Force initialization
        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))?;
        assert!(!metrics.stream_sessions.desc().is_empty());
        Ok(())
    }

    #[test]
    fn test_record_pipeline_counters() -> Result<(), String> {
        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))?;
        let before = metrics
            .events_published_total
            .with_label_values(&["latestUsers"])
            .get();

        metrics.record_published("latestUsers");
        metrics.record_delivered("latestUsers", "bus");
        metrics.record_producer_failure("latestArticles");
        metrics.record_subscriber_failure(true);
        metrics.record_relay_delivery(false);

        let after = metrics
            .events_published_total
            .with_label_values(&["latestUsers"])
            .get();
        assert!(after >= before + 1.0);
        Ok(())
    }

    #[test]
    fn test_cache_stats_gauges() -> Result<(), String> {
        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))?;
        metrics.set_cache_stats(&CacheStats {
            hits: 7,
            misses: 3,
            entry_count: 2,
            evictions: 1,
            invalidations: 0,
        });
        assert!(!metrics.query_cache.desc().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_metrics_handler_renders_text() -> Result<(), String> {
        metrics().ok_or("Metrics init failed")?.record_published("dashboardUpdate");
        let store: Arc<CachedStore> = Arc::new(CachingStore::new(
            Arc::new(InMemoryStore::new()) as Arc<dyn DashboardStore>,
            &CacheConfig::default(),
        ));
        store
            .list_users(&UserQuery::latest(5))
            .await
            .map_err(|e| e.to_string())?;

        let response = metrics_handler(State(store)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        Ok(())
    }
}
