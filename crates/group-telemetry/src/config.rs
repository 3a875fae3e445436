//! Telemetry configuration from environment variables.

use std::env;

const DEFAULT_SERVICE_NAME: &str = "peer-group";
const DEFAULT_LOG_LEVEL: &str = "info";

/// How the node logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Attached to the first log line and to JSON output
    pub service_name: String,

    /// Level (`debug`) or full filter directive (`peer_group=trace,info`)
    pub log_level: String,

    /// Install a formatting layer at all
    pub console_output: bool,

    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            console_output: true,
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Read `PG_SERVICE_NAME`, `PG_LOG_LEVEL` (or `RUST_LOG`),
    /// `PG_CONSOLE_OUTPUT` and `PG_JSON_LOGS`.
    ///
    /// JSON output defaults to on inside containers.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let in_container =
            lookup("KUBERNETES_SERVICE_HOST").is_some() || lookup("DOCKER_CONTAINER").is_some();

        Self {
            service_name: lookup("PG_SERVICE_NAME").unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
            log_level: lookup("PG_LOG_LEVEL")
                .or_else(|| lookup("RUST_LOG"))
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            console_output: lookup("PG_CONSOLE_OUTPUT").map_or(true, |v| !is_falsy(&v)),
            json_logs: lookup("PG_JSON_LOGS").map_or(in_container, |v| is_truthy(&v)),
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn is_falsy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off")
}
