//! Operation Manager
//!
//! Tracks every scheduled operation until it completes, fails or is cancelled.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;

use super::{
    Operation, OperationHandle, OperationId, OperationOutcome, OperationState, ScheduleMode, WorkerPool,
    default_workers,
};
use crate::error::{HiveError, HiveResult};
use crate::listener::{ListenerSet, notify};

/// Observes operations leaving the manager
pub trait OperationListener: Send + Sync {
    fn removed(&self, id: OperationId);
}

/// Registry of in-flight operations
pub struct OperationManager {
    next_id: AtomicU64,
    operations: DashMap<OperationId, OperationHandle>,
    listeners: ListenerSet<dyn OperationListener>,
    /// Runs immediate operations, spawned on first use
    pool: Mutex<Option<WorkerPool>>,
    workers: usize,
}

impl Default for OperationManager {
    fn default() -> Self {
        Self::with_workers(default_workers())
    }
}

impl OperationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a manager running at most `workers` immediate operations at once
    pub fn with_workers(workers: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            operations: DashMap::new(),
            listeners: ListenerSet::default(),
            pool: Mutex::new(None),
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Schedule an operation and start it if `mode` is immediate
    pub fn schedule(
        self: &Arc<Self>,
        operation: Box<dyn Operation>,
        mode: ScheduleMode,
    ) -> HiveResult<OperationHandle> {
        let handle = self.register(operation, mode);
        self.start(&handle)?;
        Ok(handle)
    }

    /// Track an operation without starting it
    pub(crate) fn register(&self, operation: Box<dyn Operation>, mode: ScheduleMode) -> OperationHandle {
        let id = OperationId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let state = match mode {
            ScheduleMode::Immediate => OperationState::Pending,
            ScheduleMode::Deferred => OperationState::Deferred,
        };

        let handle = OperationHandle::new(id, operation, state);
        self.operations.insert(id, handle.clone());
        tracing::debug!(operation_id = %id, name = handle.name(), state = %state, "Scheduled operation");
        handle
    }

    /// Hand a pending operation to the worker pool
    ///
    /// Deferred operations are left waiting for a thaw.
    pub(crate) fn start(self: &Arc<Self>, handle: &OperationHandle) -> HiveResult<()> {
        if handle.state() != OperationState::Pending {
            return Ok(());
        }

        let manager = Arc::clone(self);
        let worker_handle = handle.clone();
        let submitted = self
            .with_pool(|pool| pool.submit(Box::new(move || manager.execute(&worker_handle))))
            .and_then(|queued| {
                if queued {
                    Ok(())
                } else {
                    Err(HiveError::Runtime("Operation workers stopped".to_string()))
                }
            });

        if let Err(e) = submitted {
            tracing::error!(operation_id = %handle.id(), "Failed to start operation: {}", e);
            handle.cancel();
            self.remove(handle.id());
            return Err(e);
        }
        Ok(())
    }

    fn with_pool<T>(&self, f: impl FnOnce(&WorkerPool) -> T) -> HiveResult<T> {
        let mut pool = self.pool.lock();
        if pool.is_none() {
            *pool = Some(WorkerPool::start(self.workers)?);
        }
        match pool.as_ref() {
            Some(pool) => Ok(f(pool)),
            None => Err(HiveError::Runtime("Operation workers unavailable".to_string())),
        }
    }

    /// Run an operation on the calling thread and retire it afterwards
    pub(crate) fn execute(&self, handle: &OperationHandle) {
        let id = handle.id();

        if !handle.begin() {
            tracing::debug!(operation_id = %id, state = %handle.state(), "Operation not runnable, skipping");
            self.remove(id);
            return;
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| handle.operation().run(handle.token())))
            .unwrap_or_else(|_| OperationOutcome::Failed("operation panicked".to_string()));

        let target = match outcome {
            OperationOutcome::Completed => OperationState::Completed,
            OperationOutcome::Failed(reason) => {
                tracing::warn!(operation_id = %id, name = handle.name(), "Operation failed: {}", reason);
                OperationState::Failed
            }
        };

        if !handle.transition(OperationState::Running, target) {
            tracing::debug!(operation_id = %id, "Operation was cancelled while running");
        }

        self.remove(id);
    }

    /// Cancel an operation
    ///
    /// Returns `Ok(false)` if the operation is unknown or already finished.
    pub fn cancel(&self, id: OperationId) -> HiveResult<bool> {
        let Some(handle) = self.get(id) else {
            return Ok(false);
        };

        if !handle.supports_cancel() {
            return Err(HiveError::CancellationNotSupported(id));
        }

        if handle.cancel() {
            tracing::debug!(operation_id = %id, "Cancelled operation");
            self.remove(id);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Drop a deferred operation that never started, cancellable or not
    ///
    /// Returns false if the operation is unknown or no longer deferred.
    pub(crate) fn discard(&self, id: OperationId) -> bool {
        let Some(handle) = self.get(id) else {
            return false;
        };
        if !handle.transition(OperationState::Deferred, OperationState::Cancelled) {
            return false;
        }
        handle.token().cancel();
        tracing::debug!(operation_id = %id, "Discarded deferred operation");
        self.remove(id);
        true
    }

    /// Move a deferred operation to the queued state
    ///
    /// Returns the handle to hand to the processor, or `None` if the operation
    /// is unknown or not deferred.
    pub fn thaw(&self, id: OperationId) -> Option<OperationHandle> {
        let handle = self.get(id)?;
        if handle.transition(OperationState::Deferred, OperationState::Queued) {
            Some(handle)
        } else {
            None
        }
    }

    pub fn get(&self, id: OperationId) -> Option<OperationHandle> {
        self.operations.get(&id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: OperationId) -> bool {
        self.operations.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn add_listener(&self, listener: Arc<dyn OperationListener>) {
        self.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn OperationListener>) -> bool {
        self.listeners.remove(listener)
    }

    /// Stop tracking an operation and tell the listeners
    pub(crate) fn remove(&self, id: OperationId) {
        if self.operations.remove(&id).is_none() {
            return;
        }
        for listener in self.listeners.snapshot() {
            notify("operation", || listener.removed(id));
        }
    }
}
