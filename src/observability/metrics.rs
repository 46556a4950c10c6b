use once_cell::sync::Lazy;
use prometheus::{
    CounterVec, Encoder, GaugeVec, Histogram, HistogramVec, IntCounter, IntGauge, TextEncoder,
    register_counter_vec, register_gauge_vec, register_histogram, register_histogram_vec,
    register_int_counter, register_int_gauge,
};

// Sync metrics
pub static SYNC_RUNS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "crowdsec_dashboard_sync_runs_total",
        "Total number of decision sync runs",
        &["status"]
    )
    .unwrap()
});

pub static SYNC_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "crowdsec_dashboard_sync_duration_seconds",
        "Duration of completed decision sync runs in seconds",
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    )
    .unwrap()
});

pub static DECISIONS_PROCESSED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "crowdsec_dashboard_decisions_processed_total",
        "Decisions reconciled into the local store",
        &["kind"]
    )
    .unwrap()
});

pub static DECISIONS_PRUNED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "crowdsec_dashboard_decisions_pruned_total",
        "Inactive decisions removed by retention pruning"
    )
    .unwrap()
});

pub static ORPHAN_ALERTS_PRUNED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "crowdsec_dashboard_orphan_alerts_pruned_total",
        "Alerts removed after losing their last decision"
    )
    .unwrap()
});

pub static ACTIVE_DECISIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "crowdsec_dashboard_active_decisions",
        "Number of active decisions after the last sync"
    )
    .unwrap()
});

// LAPI metrics
pub static LAPI_REQUESTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "crowdsec_dashboard_lapi_requests_total",
        "Requests issued to the CrowdSec Local API",
        &["endpoint", "status"]
    )
    .unwrap()
});

pub static ALERT_LINK_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "crowdsec_dashboard_alert_link_failures_total",
        "Per-address alert queries that failed during linking"
    )
    .unwrap()
});

// Broadcast metrics
pub static WS_SUBSCRIBERS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "crowdsec_dashboard_ws_subscribers",
        "Connected live-update subscribers",
        &["channel"]
    )
    .unwrap()
});

pub static WS_DROPPED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "crowdsec_dashboard_ws_dropped_total",
        "Subscribers removed after a failed delivery",
        &["channel"]
    )
    .unwrap()
});

// Database pool metrics
pub static DB_POOL_SIZE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "crowdsec_dashboard_db_pool_connections",
        "Database connection pool size",
        &["state"]
    )
    .unwrap()
});

// HTTP metrics
pub static HTTP_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "crowdsec_dashboard_http_requests_total",
        "Total HTTP requests",
        &["method", "route", "status_class"]
    )
    .unwrap()
});

pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "crowdsec_dashboard_http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "route", "status_class"],
        vec![
            0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0
        ]
    )
    .unwrap()
});

pub static HTTP_IN_FLIGHT: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "crowdsec_dashboard_http_in_flight_requests",
        "In-flight HTTP requests",
        &["method", "route"]
    )
    .unwrap()
});

/// Generate Prometheus metrics output
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Initialize all metrics (forces lazy statics to be created)
pub fn init_metrics() {
    Lazy::force(&SYNC_RUNS);
    Lazy::force(&SYNC_DURATION);
    Lazy::force(&DECISIONS_PROCESSED);
    Lazy::force(&DECISIONS_PRUNED);
    Lazy::force(&ORPHAN_ALERTS_PRUNED);
    Lazy::force(&ACTIVE_DECISIONS);
    Lazy::force(&LAPI_REQUESTS);
    Lazy::force(&ALERT_LINK_FAILURES);
    Lazy::force(&WS_SUBSCRIBERS);
    Lazy::force(&WS_DROPPED);
    Lazy::force(&DB_POOL_SIZE);
    Lazy::force(&HTTP_REQUESTS_TOTAL);
    Lazy::force(&HTTP_REQUEST_DURATION);
    Lazy::force(&HTTP_IN_FLIGHT);
}

/// Update database pool metrics from sqlx pool stats
pub fn update_db_pool_metrics(pool: &sqlx::PgPool) {
    let size = pool.size() as f64;
    let idle = pool.num_idle() as f64;
    let active = size - idle;
    DB_POOL_SIZE.with_label_values(&["active"]).set(active);
    DB_POOL_SIZE.with_label_values(&["idle"]).set(idle);
    DB_POOL_SIZE.with_label_values(&["total"]).set(size);
}
