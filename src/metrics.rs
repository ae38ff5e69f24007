//! Prometheus metrics collection for relaycore.
//!
//! Exposed via an HTTP endpoint (`http::run_metrics_server`) on a separate
//! port so scraping never competes with the connection listener.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

lazy_static! {
    /// Global Prometheus registry for all metrics.
    pub static ref REGISTRY: Registry = Registry::new();

    // ========================================================================
    // Counters
    // ========================================================================

    pub static ref MESSAGES_SENT: IntCounter = IntCounter::new(
        "relaycore_messages_sent_total",
        "Total messages successfully persisted and broadcast"
    ).unwrap();

    pub static ref MESSAGES_EDITED: IntCounter = IntCounter::new(
        "relaycore_messages_edited_total",
        "Total message edits applied"
    ).unwrap();

    pub static ref MESSAGES_DELETED: IntCounter = IntCounter::new(
        "relaycore_messages_deleted_total",
        "Total message deletes applied"
    ).unwrap();

    pub static ref RATE_LIMITED_TOTAL: IntCounter = IntCounter::new(
        "relaycore_rate_limited_total",
        "Requests rejected by the rate limiter"
    ).unwrap();

    pub static ref CACHE_HITS: IntCounter = IntCounter::new(
        "relaycore_cache_hits_total",
        "Recent-message cache hits on the first page query"
    ).unwrap();

    pub static ref CACHE_MISSES: IntCounter = IntCounter::new(
        "relaycore_cache_misses_total",
        "Recent-message cache misses on the first page query"
    ).unwrap();

    pub static ref CACHE_ERRORS: IntCounter = IntCounter::new(
        "relaycore_cache_errors_total",
        "Cache operations that failed and fell back to the store"
    ).unwrap();

    pub static ref PUBSUB_PUBLISHED: IntCounter = IntCounter::new(
        "relaycore_pubsub_published_total",
        "Events published to the cross-instance fabric"
    ).unwrap();

    // ========================================================================
    // Gauges
    // ========================================================================

    pub static ref CONNECTED_CLIENTS: IntGauge = IntGauge::new(
        "relaycore_connected_clients",
        "WebSocket connections currently attached to this instance"
    ).unwrap();

    pub static ref ONLINE_USERS: IntGauge = IntGauge::new(
        "relaycore_online_users",
        "Distinct users with at least one connection on this instance"
    ).unwrap();
}

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at server startup before any metrics are recorded.
pub fn init() {
    REGISTRY.register(Box::new(MESSAGES_SENT.clone())).unwrap();
    REGISTRY.register(Box::new(MESSAGES_EDITED.clone())).unwrap();
    REGISTRY.register(Box::new(MESSAGES_DELETED.clone())).unwrap();
    REGISTRY.register(Box::new(RATE_LIMITED_TOTAL.clone())).unwrap();
    REGISTRY.register(Box::new(CACHE_HITS.clone())).unwrap();
    REGISTRY.register(Box::new(CACHE_MISSES.clone())).unwrap();
    REGISTRY.register(Box::new(CACHE_ERRORS.clone())).unwrap();
    REGISTRY.register(Box::new(PUBSUB_PUBLISHED.clone())).unwrap();
    REGISTRY.register(Box::new(CONNECTED_CLIENTS.clone())).unwrap();
    REGISTRY.register(Box::new(ONLINE_USERS.clone())).unwrap();
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
