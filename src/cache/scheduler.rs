//! Eviction Scheduler
//!
//! Runs the periodic idle-client sweep either on a process-wide shared
//! runtime (amortizing threads across many caches) or on a dedicated
//! single-worker runtime owned by one cache.
//!
//! # Design
//!
//! - Fixed delay, not fixed rate: the next run is scheduled only after the
//!   previous one returns, so a slow sweep never piles up overlapping runs
//! - First run is immediate
//! - Cancelling a [`SweepTask`] never waits for an in-flight run
//! - A shared scheduler is never shut down; a dedicated one is shut down by
//!   its owner

use std::fmt;
use std::time::Duration;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Worker threads of the process-wide shared runtime
pub const SHARED_WORKER_THREADS: usize = 2;

static SHARED_RUNTIME: OnceCell<Runtime> = OnceCell::new();

/// Where a scheduler's tasks run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerKind {
    /// Shared with other caches, never shut down by a cache
    Shared,
    /// Owned by a single cache
    Dedicated,
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerKind::Shared => write!(f, "shared"),
            SchedulerKind::Dedicated => write!(f, "dedicated"),
        }
    }
}

/// Task scheduler backed by a tokio runtime
pub struct TaskScheduler {
    kind: SchedulerKind,
    handle: Handle,
    /// Present only for a dedicated scheduler that has not been shut down
    owned: Mutex<Option<Runtime>>,
}

impl TaskScheduler {
    /// Scheduler running on the process-wide shared runtime.
    ///
    /// The runtime is built on first use and lives for the rest of the
    /// process.
    pub fn shared() -> Result<Self> {
        let runtime = SHARED_RUNTIME.get_or_try_init(|| {
            Builder::new_multi_thread()
                .worker_threads(SHARED_WORKER_THREADS)
                .thread_name("broadcaster-cache-shared")
                .enable_time()
                .build()
                .map_err(|e| Error::Scheduler(format!("Failed to build shared runtime: {}", e)))
        })?;

        Ok(Self::from_handle(runtime.handle().clone()))
    }

    /// Shared scheduler running on a runtime owned by the caller
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            kind: SchedulerKind::Shared,
            handle,
            owned: Mutex::new(None),
        }
    }

    /// Scheduler with its own single worker thread
    pub fn dedicated() -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("broadcaster-cache-sweep")
            .enable_time()
            .build()
            .map_err(|e| Error::Scheduler(format!("Failed to build dedicated runtime: {}", e)))?;

        Ok(Self {
            kind: SchedulerKind::Dedicated,
            handle: runtime.handle().clone(),
            owned: Mutex::new(Some(runtime)),
        })
    }

    /// Scheduler kind
    pub fn kind(&self) -> SchedulerKind {
        self.kind
    }

    /// Check if this scheduler is owned by a single cache
    pub fn is_dedicated(&self) -> bool {
        self.kind == SchedulerKind::Dedicated
    }

    /// Check if the scheduler can still run tasks
    pub fn is_running(&self) -> bool {
        match self.kind {
            SchedulerKind::Shared => true,
            SchedulerKind::Dedicated => self.owned.lock().is_some(),
        }
    }

    /// Run `task` now, then again `delay` after each run returns, until the
    /// returned [`SweepTask`] is cancelled or dropped.
    pub fn schedule_with_fixed_delay<F>(&self, delay: Duration, task: F) -> Result<SweepTask>
    where
        F: Fn() -> bool + Send + 'static,
    {
        if !self.is_running() {
            return Err(Error::Scheduler(
                "dedicated scheduler has been shut down".to_string(),
            ));
        }
        if delay.is_zero() {
            return Err(Error::Config("sweep delay must be greater than zero".to_string()));
        }

        let token = CancellationToken::new();
        let child = token.clone();

        let handle = self.handle.spawn(async move {
            loop {
                if child.is_cancelled() {
                    break;
                }
                // The task returns false once there is nothing left to sweep
                if !task() {
                    debug!("Periodic task finished");
                    break;
                }
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        });

        Ok(SweepTask { token, handle })
    }

    /// Shut down a dedicated scheduler. No-op for a shared one.
    ///
    /// Running tasks are abandoned, not awaited.
    pub fn shutdown(&self) {
        if self.kind == SchedulerKind::Shared {
            return;
        }
        if let Some(runtime) = self.owned.lock().take() {
            runtime.shutdown_background();
            info!("Dedicated cache scheduler shut down");
        }
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        // Dropping a Runtime from async context panics
        if let Some(runtime) = self.owned.get_mut().take() {
            runtime.shutdown_background();
        }
    }
}

impl fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("kind", &self.kind)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Handle to a scheduled periodic task
///
/// Dropping the handle cancels the task.
pub struct SweepTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl SweepTask {
    /// Cancel future runs without waiting for an in-flight one
    pub fn cancel(self) {
        self.token.cancel();
    }

    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Check if the task loop has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for SweepTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl fmt::Debug for SweepTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SweepTask")
            .field("cancelled", &self.is_cancelled())
            .field("finished", &self.is_finished())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
