//! Prometheus metrics for the gateway.
//!
//! All metrics follow the naming convention: `tc_<area>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // MAPPING PIPELINE
    // =========================================================================

    /// Round trip from forwarding a command to its response or error.
    pub static ref ROUND_TRIP_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "tc_round_trip_duration_seconds",
            "Time from forwarding an inbound signal to its completion"
        ).buckets(exponential_buckets(0.001, 2.0, 16).expect("bucket definition")),
        &["connection", "success"]
    ).expect("metric creation failed");

    /// Inbound messages by outcome (forwarded, no_signal, error_response, dropped).
    pub static ref INBOUND_MESSAGES: IntCounterVec = IntCounterVec::new(
        Opts::new("tc_inbound_messages_total", "Inbound external messages processed"),
        &["connection", "outcome"]
    ).expect("metric creation failed");

    /// Outbound signals by outcome (published, filtered, failed).
    pub static ref OUTBOUND_MESSAGES: IntCounterVec = IntCounterVec::new(
        Opts::new("tc_outbound_messages_total", "Outbound signals processed"),
        &["connection", "outcome"]
    ).expect("metric creation failed");

    // =========================================================================
    // SUPERVISION
    // =========================================================================

    /// Worker restarts after abnormal termination.
    pub static ref CONNECTION_RESTARTS: IntCounterVec = IntCounterVec::new(
        Opts::new("tc_connection_restarts_total", "Connection worker restarts"),
        &["connection"]
    ).expect("metric creation failed");

    // =========================================================================
    // STREAMING
    // =========================================================================

    /// Currently open streaming sessions.
    pub static ref STREAMING_SESSIONS: IntGauge = IntGauge::new(
        "tc_streaming_sessions",
        "Open WebSocket streaming sessions"
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry. Safe to call repeatedly.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(ROUND_TRIP_DURATION.clone()),
        Box::new(INBOUND_MESSAGES.clone()),
        Box::new(OUTBOUND_MESSAGES.clone()),
        Box::new(CONNECTION_RESTARTS.clone()),
        Box::new(STREAMING_SESSIONS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
