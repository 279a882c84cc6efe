//! Asynchronous operations
//!
//! Every write a client starts becomes an [`Operation`] tracked by the
//! [`OperationManager`] under a unique [`OperationId`]. Immediate operations
//! start on their own worker thread; deferred operations wait until they are
//! thawed and then run on the [`OperationProcessor`].

mod handle;
mod manager;
mod pool;
mod processor;
mod write;

pub use handle::*;
pub use manager::*;
pub use pool::default_workers;
pub(crate) use pool::WorkerPool;
pub use processor::*;
pub use write::*;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

// ─────────────────────────────────────────────────────────────────────────────
// Operation Id
// ─────────────────────────────────────────────────────────────────────────────

/// Numeric handle of a scheduled operation, never reused within a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperationId(pub u64);

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for OperationId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Operation State
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OperationState {
    /// Waiting to be thawed
    Deferred = 0,
    /// Scheduled for immediate execution
    Pending = 1,
    /// Thawed and waiting on the processor
    Queued = 2,
    /// Executing
    Running = 3,
    /// Finished successfully
    Completed = 4,
    /// Finished with an error or a panic
    Failed = 5,
    /// Cancelled before completion
    Cancelled = 6,
}

impl OperationState {
    /// Convert from u8
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Deferred,
            1 => Self::Pending,
            2 => Self::Queued,
            3 => Self::Running,
            4 => Self::Completed,
            5 => Self::Failed,
            _ => Self::Cancelled,
        }
    }

    /// Check if the operation has finished
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationState::Completed | OperationState::Failed | OperationState::Cancelled
        )
    }
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationState::Deferred => write!(f, "deferred"),
            OperationState::Pending => write!(f, "pending"),
            OperationState::Queued => write!(f, "queued"),
            OperationState::Running => write!(f, "running"),
            OperationState::Completed => write!(f, "completed"),
            OperationState::Failed => write!(f, "failed"),
            OperationState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// When a scheduled operation starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScheduleMode {
    /// Start right away on a worker thread
    #[default]
    Immediate,
    /// Wait for a thaw, then run on the processor
    Deferred,
}

// ─────────────────────────────────────────────────────────────────────────────
// Cancellation
// ─────────────────────────────────────────────────────────────────────────────

/// Cooperative cancellation flag shared between a handle and its operation
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Operation
// ─────────────────────────────────────────────────────────────────────────────

/// How an operation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    Completed,
    Failed(String),
}

/// Unit of asynchronous work
pub trait Operation: Send + Sync + 'static {
    /// Short name used in logs
    fn name(&self) -> &str {
        "operation"
    }

    /// Execute the operation
    ///
    /// Long-running operations should poll `token` and return early once it is
    /// cancelled.
    fn run(&self, token: &CancellationToken) -> OperationOutcome;

    /// Whether the operation reacts to cancellation
    fn supports_cancel(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trip_through_u8() {
        for state in [
            OperationState::Deferred,
            OperationState::Pending,
            OperationState::Queued,
            OperationState::Running,
            OperationState::Completed,
            OperationState::Failed,
            OperationState::Cancelled,
        ] {
            assert_eq!(OperationState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(OperationState::Completed.is_terminal());
        assert!(OperationState::Cancelled.is_terminal());
        assert!(!OperationState::Deferred.is_terminal());
        assert!(!OperationState::Running.is_terminal());
    }

    #[test]
    fn test_token_shared_between_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
