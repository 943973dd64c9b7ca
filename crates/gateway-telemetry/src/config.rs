//! Telemetry configuration from environment variables.

use std::env;

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to every log line.
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error) or a full
    /// `EnvFilter` directive such as `info,tc_01_message_mapping=debug`.
    pub log_level: String,

    /// Emit JSON formatted logs instead of human-readable lines.
    pub json_logs: bool,

    /// Include source file and line in log lines.
    pub with_source_location: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "twin-connect".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            with_source_location: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `TC_SERVICE_NAME`: Service name (default: twin-connect)
    /// - `RUST_LOG`, then `TC_LOG_LEVEL`: Log filter (default: info)
    /// - `TC_JSON_LOGS`: JSON logs (default: true in containers, false otherwise)
    /// - `TC_LOG_SOURCE`: Include file/line (default: false)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("TC_SERVICE_NAME")
                .unwrap_or_else(|_| "twin-connect".to_string()),

            log_level: env::var("RUST_LOG")
                .or_else(|_| env::var("TC_LOG_LEVEL"))
                .unwrap_or_else(|_| "info".to_string()),

            json_logs: env::var("TC_JSON_LOGS")
                .map(|v| parse_flag(&v))
                .unwrap_or(is_container),

            with_source_location: env::var("TC_LOG_SOURCE")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    let value = value.trim().to_ascii_lowercase();
    value == "true" || value == "1" || value == "yes"
}
