//! # Startup Coordinator
//!
//! Brings a set of initialized modules to the running state without knowing
//! their dependency order. Every round calls `start_app` on each module that
//! has not settled yet; a module that waits on another simply reports
//! `AgainStalled` until its dependency is up.
//!
//! The coordinator gives up when a round made no progress and the round
//! budget is exhausted. The budget starts at `n² + 1` for `n` modules and is
//! extended after every round that made progress, so a slow but advancing
//! set is never cut off while a deadlocked set fails in bounded time.

use std::sync::Arc;

use group_telemetry::metrics;
use shared_types::{ModuleClassId, PeerGroupId};
use tracing::{debug, info, instrument, warn};

use crate::error::{PeerGroupError, Result};
use crate::module::{start_isolated, Module, StartStatus};

/// A module waiting to be started.
#[derive(Clone)]
pub(crate) struct PendingModule {
    pub(crate) class_id: ModuleClassId,
    pub(crate) module: Arc<dyn Module>,
    /// Shown if the module never starts.
    pub(crate) descriptor: String,
}

/// Round budget for `remaining` unsettled modules after `iterations` rounds.
fn round_budget(remaining: usize, iterations: usize) -> usize {
    remaining * remaining + iterations + 1
}

/// Start every module in `pending`, calling `on_started` for each one that
/// reaches the running state, in the order they do.
///
/// Modules reporting `Disabled` or `Failed` are dropped from the set without
/// failing the run. Returns the number of rounds needed.
#[instrument(skip_all, fields(group = %group, modules = pending.len()))]
pub(crate) fn converge<F>(
    group: PeerGroupId,
    mut pending: Vec<PendingModule>,
    args: &[String],
    mut on_started: F,
) -> Result<usize>
where
    F: FnMut(&PendingModule),
{
    let mut max_iterations = round_budget(pending.len(), 0);
    let mut iterations = 0usize;

    while !pending.is_empty() {
        iterations += 1;
        let mut progress = false;
        let mut still_pending = Vec::with_capacity(pending.len());

        for entry in pending {
            match start_isolated(entry.module.as_ref(), args) {
                StartStatus::Ok => {
                    debug!("[Coordinator] {} started in round {}", entry.class_id, iterations);
                    on_started(&entry);
                    progress = true;
                }
                StartStatus::AgainProgress => {
                    progress = true;
                    still_pending.push(entry);
                }
                StartStatus::AgainStalled => still_pending.push(entry),
                StartStatus::Disabled => {
                    info!("[Coordinator] {} disabled itself", entry.class_id);
                    progress = true;
                }
                StartStatus::Failed => {
                    warn!("[Coordinator] {} failed to start, dropping it", entry.class_id);
                    metrics::module_failed("start");
                    progress = true;
                }
            }
        }
        pending = still_pending;

        if progress {
            max_iterations = round_budget(pending.len(), iterations);
        } else if iterations >= max_iterations {
            metrics::CONVERGENCE_ROUNDS.observe(iterations as f64);
            let remaining = pending
                .into_iter()
                .map(|entry| (entry.class_id, entry.descriptor))
                .collect::<Vec<_>>();
            warn!(
                "[Coordinator] ✗ Gave up after {} rounds with {} module(s) stalled",
                iterations,
                remaining.len()
            );
            return Err(PeerGroupError::ConvergenceFailure { group, remaining });
        }
    }

    metrics::CONVERGENCE_ROUNDS.observe(iterations as f64);
    debug!("[Coordinator] ✓ Converged in {} rounds", iterations);
    Ok(iterations)
}
