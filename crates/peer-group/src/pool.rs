//! # Group Pools
//!
//! Every group owns one bounded worker pool and one single-threaded
//! scheduled pool. Both are backed by a dedicated tokio runtime so that
//! shutting a group down cancels exactly that group's work.
//!
//! ## Saturation
//!
//! The worker pool admits at most `max_threads + queue_capacity` tasks,
//! blocking closures and futures alike. A caller submitting beyond that blocks and retries until a slot frees
//! up rather than receiving an error.
//!
//! ## Shutdown
//!
//! `shutdown_now` never waits: queued tasks are skipped, running blocking
//! tasks are detached, async tasks are cancelled at their next await point.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::debug;

/// How long a saturated caller waits before re-checking for a free slot.
const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Worker pool sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Async worker threads kept alive.
    pub core_threads: usize,
    /// Upper bound on threads running blocking tasks.
    pub max_threads: usize,
    /// Idle time after which a blocking thread exits.
    pub keep_alive: Duration,
    /// Tasks admitted beyond `max_threads` before callers block.
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            core_threads: 4,
            max_threads: 16,
            keep_alive: Duration::from_secs(60),
            queue_capacity: 200,
        }
    }
}

/// Pool errors.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("pool {0} has been shut down")]
    Shutdown(String),

    #[error("failed to build runtime for pool {name}: {source}")]
    Build {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("a periodic task needs a non-zero period")]
    InvalidPeriod,
}

struct Slots {
    used: Mutex<usize>,
    freed: Condvar,
}

/// Releases its slot when the task finishes or is discarded.
struct SlotGuard(Arc<Slots>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut used = self.0.used.lock();
        *used = used.saturating_sub(1);
        self.0.freed.notify_one();
    }
}

/// Takes the runtime out so it can be shut down without blocking.
fn shutdown_runtime(runtime: &Mutex<Option<Runtime>>) -> bool {
    match runtime.lock().take() {
        Some(rt) => {
            rt.shutdown_background();
            true
        }
        None => false,
    }
}

// =============================================================================
// WORKER POOL
// =============================================================================

/// Bounded pool for a group's asynchronous work.
pub struct WorkerPool {
    name: String,
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    capacity: usize,
    slots: Arc<Slots>,
    cancelled: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(name: impl Into<String>, config: &PoolConfig) -> Result<Self, PoolError> {
        let name = name.into();
        let max_threads = config.max_threads.max(1);

        let runtime = Builder::new_multi_thread()
            .worker_threads(config.core_threads.max(1))
            .max_blocking_threads(max_threads)
            .thread_keep_alive(config.keep_alive)
            .thread_name(format!("{name}-worker"))
            .enable_all()
            .build()
            .map_err(|source| PoolError::Build {
                name: name.clone(),
                source,
            })?;

        debug!(
            "[Pool] {} created: core={} max={} queue={}",
            name, config.core_threads, max_threads, config.queue_capacity
        );

        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Mutex::new(Some(runtime)),
            capacity: max_threads + config.queue_capacity,
            slots: Arc::new(Slots {
                used: Mutex::new(0),
                freed: Condvar::new(),
            }),
            cancelled: Arc::new(AtomicBool::new(false)),
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run a blocking task on the pool, waiting for a slot if saturated.
    pub fn execute<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let guard = self.acquire_slot()?;
        let cancelled = Arc::clone(&self.cancelled);

        self.handle.spawn_blocking(move || {
            let _slot = guard;
            if !cancelled.load(Ordering::Acquire) {
                task();
            }
        });
        Ok(())
    }

    /// Spawn a future on the pool's async workers.
    ///
    /// Shares the admission bound with [`execute`](Self::execute): the slot
    /// is held until the future completes or is cancelled.
    pub fn spawn<F>(&self, future: F) -> Result<JoinHandle<F::Output>, PoolError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let guard = self.acquire_slot()?;
        Ok(self.handle.spawn(async move {
            let _slot = guard;
            future.await
        }))
    }

    /// Tasks admitted and not yet finished.
    pub fn in_flight(&self) -> usize {
        *self.slots.used.lock()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_shutdown(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Cancel queued and running work and release the threads. Idempotent.
    pub fn shutdown_now(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.slots.freed.notify_all();
        if shutdown_runtime(&self.runtime) {
            debug!("[Pool] {} shut down", self.name);
        }
    }

    fn acquire_slot(&self) -> Result<SlotGuard, PoolError> {
        let mut used = self.slots.used.lock();
        loop {
            if self.is_shutdown() {
                return Err(PoolError::Shutdown(self.name.clone()));
            }
            if *used < self.capacity {
                *used += 1;
                return Ok(SlotGuard(Arc::clone(&self.slots)));
            }
            self.slots.freed.wait_for(&mut used, RETRY_INTERVAL);
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        shutdown_runtime(&self.runtime);
    }
}

// =============================================================================
// SCHEDULED POOL
// =============================================================================

/// Handle to a delayed or periodic task.
pub struct ScheduledTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Single-threaded pool for a group's delayed and periodic work.
pub struct ScheduledPool {
    name: String,
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    cancelled: AtomicBool,
}

impl ScheduledPool {
    pub fn new(name: impl Into<String>) -> Result<Self, PoolError> {
        let name = name.into();
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name(format!("{name}-scheduler"))
            .enable_all()
            .build()
            .map_err(|source| PoolError::Build {
                name: name.clone(),
                source,
            })?;

        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Mutex::new(Some(runtime)),
            cancelled: AtomicBool::new(false),
            name,
        })
    }

    /// Run `task` once after `delay`.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> Result<ScheduledTask, PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.ensure_running()?;
        let handle = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
        Ok(ScheduledTask { handle })
    }

    /// Run `task` after `initial_delay`, then every `period` until cancelled.
    pub fn schedule_at_fixed_rate<F>(
        &self,
        initial_delay: Duration,
        period: Duration,
        task: F,
    ) -> Result<ScheduledTask, PoolError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        if period.is_zero() {
            return Err(PoolError::InvalidPeriod);
        }
        self.ensure_running()?;

        let handle = self.handle.spawn(async move {
            let start = tokio::time::Instant::now() + initial_delay;
            let mut ticks = tokio::time::interval_at(start, period);
            loop {
                ticks.tick().await;
                task();
            }
        });
        Ok(ScheduledTask { handle })
    }

    pub fn is_shutdown(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Cancel every scheduled task. Idempotent.
    pub fn shutdown_now(&self) {
        self.cancelled.store(true, Ordering::Release);
        if shutdown_runtime(&self.runtime) {
            debug!("[Pool] {} scheduler shut down", self.name);
        }
    }

    fn ensure_running(&self) -> Result<(), PoolError> {
        if self.is_shutdown() {
            return Err(PoolError::Shutdown(self.name.clone()));
        }
        Ok(())
    }
}

impl Drop for ScheduledPool {
    fn drop(&mut self) {
        shutdown_runtime(&self.runtime);
    }
}
