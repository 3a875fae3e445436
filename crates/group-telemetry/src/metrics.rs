//! Prometheus metrics for peer group lifecycles.
//!
//! All metrics follow the naming convention: `pg_<object>_<metric>[_<unit>]`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., groups_started_total)
//! - **Gauge**: Value that can go up or down (e.g., groups_live)
//! - **Histogram**: Distribution of values (e.g., convergence_rounds)

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, Histogram, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

use crate::TelemetryError;

lazy_static! {
    /// Metrics registry for this crate
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // GROUP METRICS
    // =========================================================================

    /// Groups that finished construction
    pub static ref GROUPS_STARTED: Counter = Counter::new(
        "pg_groups_started_total",
        "Total number of peer groups that finished construction"
    ).expect("metric creation failed");

    /// Groups torn down
    pub static ref GROUPS_STOPPED: Counter = Counter::new(
        "pg_groups_stopped_total",
        "Total number of peer groups torn down"
    ).expect("metric creation failed");

    /// Groups currently registered
    pub static ref GROUPS_LIVE: Gauge = Gauge::new(
        "pg_groups_live",
        "Number of peer groups currently registered in this process"
    ).expect("metric creation failed");

    // =========================================================================
    // MODULE METRICS
    // =========================================================================

    /// Modules that completed startup
    pub static ref MODULES_STARTED: CounterVec = CounterVec::new(
        Opts::new("pg_modules_started_total", "Modules that completed startup"),
        &["role"]  // role: service/transport/application
    ).expect("metric creation failed");

    /// Module failures by lifecycle phase
    pub static ref MODULE_FAILURES: CounterVec = CounterVec::new(
        Opts::new("pg_module_failures_total", "Isolated module failures"),
        &["phase"]  // phase: compat/resolve/init/start/stop
    ).expect("metric creation failed");

    /// Coordinator rounds needed per convergence run
    pub static ref CONVERGENCE_ROUNDS: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "pg_convergence_rounds",
            "Rounds the startup coordinator needed to start a module set"
        ).buckets(exponential_buckets(1.0, 2.0, 10).unwrap())
    ).expect("metric creation failed");
}

static REGISTERED: OnceLock<Result<(), String>> = OnceLock::new();

/// Register all metrics with [`REGISTRY`]. Safe to call more than once.
///
/// The first attempt decides: a failed registration keeps failing.
pub fn register_metrics() -> Result<(), TelemetryError> {
    register_once(&REGISTERED, &REGISTRY)
}

fn register_once(
    outcome: &OnceLock<Result<(), String>>,
    registry: &Registry,
) -> Result<(), TelemetryError> {
    outcome
        .get_or_init(|| register_all(registry).map_err(|e| e.to_string()))
        .clone()
        .map_err(TelemetryError::MetricsInit)
}

fn register_all(registry: &Registry) -> prometheus::Result<()> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Groups
        Box::new(GROUPS_STARTED.clone()),
        Box::new(GROUPS_STOPPED.clone()),
        Box::new(GROUPS_LIVE.clone()),
        // Modules
        Box::new(MODULES_STARTED.clone()),
        Box::new(MODULE_FAILURES.clone()),
        Box::new(CONVERGENCE_ROUNDS.clone()),
    ];

    for metric in metrics {
        registry.register(metric)?;
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

/// Record a module that completed startup.
pub fn module_started(role: &str) {
    MODULES_STARTED.with_label_values(&[role]).inc();
}

/// Record an isolated module failure.
pub fn module_failed(phase: &str) {
    MODULE_FAILURES.with_label_values(&[phase]).inc();
}

/// Record a group that finished construction.
pub fn group_started() {
    GROUPS_STARTED.inc();
}

/// Record a group joining or leaving the process registry.
pub fn group_registered(live: usize) {
    GROUPS_LIVE.set(live as f64);
}

/// Record a torn down group.
pub fn group_stopped() {
    GROUPS_STOPPED.inc();
}
