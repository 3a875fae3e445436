//! # Group Telemetry
//!
//! Logging and metrics for the peer group runtime.
//!
//! ## Components
//!
//! - **Logging**: `tracing-subscriber` with an `EnvFilter`, plain or JSON output
//! - **Metrics**: Prometheus counters and histograms for group and module lifecycles
//!
//! ## Usage
//!
//! ```rust,ignore
//! use group_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     init_telemetry(&TelemetryConfig::from_env()).expect("Failed to init telemetry");
//!     // Groups started from here on are logged and counted
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PG_SERVICE_NAME` | `peer-group` | Service name in log lines |
//! | `PG_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `PG_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `PG_JSON_LOGS` | `false` | JSON formatted logs |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{encode_metrics, register_metrics};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Register metrics, then install the log subscriber.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    register_metrics()?;
    init_logging(config)
}

/// Convenience macro for creating a span with group context.
///
/// # Example
///
/// ```rust,ignore
/// use group_telemetry::group_span;
///
/// fn build() {
///     let _span = group_span!("construct", group = %gid).entered();
/// }
/// ```
#[macro_export]
macro_rules! group_span {
    ($name:expr, $($field:tt)*) => {
        tracing::info_span!($name, $($field)*)
    };
}
