use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

use crate::fallback::TransportMode;
use crate::transport::ConnectionState;

/// Metric name prefix for all notification client metrics
const PREFIX: &str = "dashboard_notify";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Realtime transport metrics
    pub static ref CONNECTION_ATTEMPTS_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_connection_attempts_total"),
        "Total number of realtime connection attempts"
    ).expect("Failed to create connection_attempts_total metric");

    pub static ref RECONNECTS_SCHEDULED_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_reconnects_scheduled_total"),
        "Total number of scheduled reconnect attempts"
    ).expect("Failed to create reconnects_scheduled_total metric");

    pub static ref RECONNECT_DELAY_SECONDS: Gauge = Gauge::new(
        format!("{PREFIX}_reconnect_delay_seconds"),
        "Delay of the most recently scheduled reconnect"
    ).expect("Failed to create reconnect_delay_seconds metric");

    pub static ref CONNECTION_STATE: Gauge = Gauge::new(
        format!("{PREFIX}_connection_state"),
        "Realtime connection state (0=disconnected, 1=connecting, 2=connected, 3=error)"
    ).expect("Failed to create connection_state metric");

    pub static ref FRAMES_RECEIVED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_frames_received_total"), "Inbound frames by type"),
        &["type"]
    ).expect("Failed to create frames_received_total metric");

    pub static ref FRAMES_DROPPED_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_frames_dropped_total"),
        "Inbound frames dropped because they could not be parsed"
    ).expect("Failed to create frames_dropped_total metric");

    // Fallback metrics
    pub static ref TRANSPORT_MODE: Gauge = Gauge::new(
        format!("{PREFIX}_transport_mode"),
        "Active transport mode (0=realtime, 1=polling)"
    ).expect("Failed to create transport_mode metric");

    pub static ref POLL_TICKS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_poll_ticks_total"), "Unread count polls by outcome"),
        &["outcome"]
    ).expect("Failed to create poll_ticks_total metric");

    // Store metrics
    pub static ref NOTIFICATIONS_INGESTED_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_notifications_ingested_total"),
        "Notifications received through the realtime transport"
    ).expect("Failed to create notifications_ingested_total metric");

    pub static ref UNREAD_COUNT: Gauge = Gauge::new(
        format!("{PREFIX}_unread_count"),
        "Current unread notification count"
    ).expect("Failed to create unread_count metric");

    pub static ref API_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_api_requests_total"), "REST calls by operation and outcome"),
        &["operation", "outcome"]
    ).expect("Failed to create api_requests_total metric");

    pub static ref API_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_api_request_duration_seconds"),
            "REST call duration in seconds"
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["operation"]
    ).expect("Failed to create api_request_duration_seconds metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(CONNECTION_ATTEMPTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(RECONNECTS_SCHEDULED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(RECONNECT_DELAY_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(CONNECTION_STATE.clone()));
    let _ = REGISTRY.register(Box::new(FRAMES_RECEIVED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(FRAMES_DROPPED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(TRANSPORT_MODE.clone()));
    let _ = REGISTRY.register(Box::new(POLL_TICKS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(NOTIFICATIONS_INGESTED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(UNREAD_COUNT.clone()));
    let _ = REGISTRY.register(Box::new(API_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(API_REQUEST_DURATION_SECONDS.clone()));

    tracing::debug!("Metrics system initialized");
}

pub fn record_connection_attempt() {
    CONNECTION_ATTEMPTS_TOTAL.inc();
}

pub fn record_reconnect_scheduled(delay: Duration) {
    RECONNECTS_SCHEDULED_TOTAL.inc();
    RECONNECT_DELAY_SECONDS.set(delay.as_secs_f64());
}

pub fn set_connection_state(state: ConnectionState) {
    let value = match state {
        ConnectionState::Disconnected => 0.0,
        ConnectionState::Connecting => 1.0,
        ConnectionState::Connected => 2.0,
        ConnectionState::Error => 3.0,
    };
    CONNECTION_STATE.set(value);
}

pub fn record_frame(frame_type: &str) {
    FRAMES_RECEIVED_TOTAL.with_label_values(&[frame_type]).inc();
}

pub fn record_dropped_frame() {
    FRAMES_DROPPED_TOTAL.inc();
}

pub fn set_transport_mode(mode: TransportMode) {
    TRANSPORT_MODE.set(match mode {
        TransportMode::Realtime => 0.0,
        TransportMode::Polling => 1.0,
    });
}

pub fn record_poll(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    POLL_TICKS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_ingested_notification() {
    NOTIFICATIONS_INGESTED_TOTAL.inc();
}

pub fn set_unread_count(count: u64) {
    UNREAD_COUNT.set(count as f64);
}

/// Record a REST call against the notifications API
pub fn record_api_request(operation: &str, success: bool, duration: Duration) {
    let outcome = if success { "success" } else { "failure" };
    API_REQUESTS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
    API_REQUEST_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(duration.as_secs_f64());
}

/// Render all registered metrics in the Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => String::from_utf8(buffer).unwrap_or_default(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            String::new()
        }
    }
}
