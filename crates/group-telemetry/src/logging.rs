//! Structured logging.
//!
//! Every line carries the same core fields so log pipelines can group by
//! them:
//! - `service`: service name from [`TelemetryConfig`]
//! - `group`: peer group id (URN) when the event concerns a group
//! - `module`: module class id when the event concerns one module

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{TelemetryConfig, TelemetryError};

/// Install the global subscriber.
///
/// A second call fails with [`TelemetryError::LoggingInit`] instead of
/// panicking, so tests and embedders can call it freely.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| TelemetryError::Config(e.to_string()))?;

    if !config.console_output {
        return tracing_subscriber::registry()
            .with(env_filter)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()));
    }

    if config.json_logs {
        // JSON output for containers/production
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    } else {
        // Pretty output for development
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_ansi(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    }

    tracing::info!(
        service = %config.service_name,
        json_logs = config.json_logs,
        "Logging initialized"
    );
    Ok(())
}

/// Log a group lifecycle event with the standard `group` field.
#[macro_export]
macro_rules! log_group_event {
    ($level:ident, $group:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            group = %$group,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log a module event with the standard `group` and `module` fields.
#[macro_export]
macro_rules! log_module_event {
    ($level:ident, $group:expr, $module:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            group = %$group,
            module = %$module,
            $($($field)*,)?
            $msg
        )
    };
}
