//! Operation Processor
//!
//! A single named worker thread that runs thawed operations in the order they
//! were handed over.

use std::sync::mpsc;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use super::{OperationHandle, OperationManager};
use crate::error::{HiveError, HiveResult};

/// Commands understood by the processor thread
enum ProcessorCommand {
    /// Execute a queued operation
    Run(OperationHandle),
    /// Stop the worker
    Shutdown,
}

/// Sequential executor for thawed operations
pub struct OperationProcessor {
    command_tx: mpsc::Sender<ProcessorCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl OperationProcessor {
    /// Spawn the processor thread
    ///
    /// The processor holds the manager weakly; once the manager is gone queued
    /// operations are dropped.
    pub fn start(manager: &Arc<OperationManager>) -> HiveResult<Self> {
        let (command_tx, command_rx) = mpsc::channel::<ProcessorCommand>();
        let manager = Arc::downgrade(manager);

        let worker = thread::Builder::new()
            .name("hive-op-processor".to_string())
            .spawn(move || run_processor(manager, command_rx))
            .map_err(|e| HiveError::Runtime(format!("Failed to spawn operation processor: {}", e)))?;

        tracing::debug!("Operation processor started");

        Ok(Self {
            command_tx,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Queue an operation, returns false once the processor has stopped
    pub fn add(&self, handle: OperationHandle) -> bool {
        self.command_tx.send(ProcessorCommand::Run(handle)).is_ok()
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Signal the worker to stop and wait for it
    ///
    /// Operations queued before the call still run. Calling this from the
    /// processor thread itself only signals.
    pub fn shutdown(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };

        let _ = self.command_tx.send(ProcessorCommand::Shutdown);

        if worker.thread().id() == thread::current().id() {
            return;
        }
        if worker.join().is_err() {
            tracing::error!("Operation processor panicked");
        }
        tracing::debug!("Operation processor stopped");
    }
}

impl Drop for OperationProcessor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_processor(manager: Weak<OperationManager>, command_rx: mpsc::Receiver<ProcessorCommand>) {
    while let Ok(command) = command_rx.recv() {
        match command {
            ProcessorCommand::Run(handle) => {
                let Some(manager) = manager.upgrade() else {
                    tracing::debug!(operation_id = %handle.id(), "Operation manager gone, dropping operation");
                    continue;
                };
                manager.execute(&handle);
            }
            ProcessorCommand::Shutdown => break,
        }
    }
}
