//! Operation Handle
//!
//! A cloneable handle to a scheduled operation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use super::{CancellationToken, Operation, OperationId, OperationState};

/// Handle to a tracked operation
///
/// The state lives in an atomic so the manager, the processor and the owning
/// session can observe and move it without locking.
#[derive(Clone)]
pub struct OperationHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    id: OperationId,
    state: AtomicU8,
    token: CancellationToken,
    operation: Box<dyn Operation>,
}

impl OperationHandle {
    pub(crate) fn new(id: OperationId, operation: Box<dyn Operation>, state: OperationState) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id,
                state: AtomicU8::new(state as u8),
                token: CancellationToken::new(),
                operation,
            }),
        }
    }

    pub fn id(&self) -> OperationId {
        self.inner.id
    }

    /// Get the current state
    pub fn state(&self) -> OperationState {
        OperationState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn name(&self) -> &str {
        self.inner.operation.name()
    }

    pub fn supports_cancel(&self) -> bool {
        self.inner.operation.supports_cancel()
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    pub(crate) fn operation(&self) -> &dyn Operation {
        self.inner.operation.as_ref()
    }

    /// Move the state from `from` to `to`, failing if it changed in between
    pub(crate) fn transition(&self, from: OperationState, to: OperationState) -> bool {
        self.inner
            .state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Claim the operation for execution
    ///
    /// Succeeds only for pending or queued operations; a cancelled or already
    /// running operation is left alone.
    pub(crate) fn begin(&self) -> bool {
        self.transition(OperationState::Pending, OperationState::Running)
            || self.transition(OperationState::Queued, OperationState::Running)
    }

    /// Mark the operation cancelled and raise its token
    ///
    /// Returns false if the operation had already finished.
    pub(crate) fn cancel(&self) -> bool {
        let mut current = self.inner.state.load(Ordering::SeqCst);
        loop {
            if OperationState::from_u8(current).is_terminal() {
                return false;
            }
            match self.inner.state.compare_exchange(
                current,
                OperationState::Cancelled as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    self.inner.token.cancel();
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }
}

impl std::fmt::Debug for OperationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationHandle")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationOutcome;

    struct Noop;

    impl Operation for Noop {
        fn run(&self, _token: &CancellationToken) -> OperationOutcome {
            OperationOutcome::Completed
        }
    }

    #[test]
    fn test_begin_only_from_pending_or_queued() {
        let handle = OperationHandle::new(OperationId(1), Box::new(Noop), OperationState::Deferred);
        assert!(!handle.begin());

        assert!(handle.transition(OperationState::Deferred, OperationState::Queued));
        assert!(handle.begin());
        assert_eq!(handle.state(), OperationState::Running);
        assert!(!handle.begin());
    }

    #[test]
    fn test_cancel_is_refused_after_completion() {
        let handle = OperationHandle::new(OperationId(2), Box::new(Noop), OperationState::Pending);
        assert!(handle.begin());
        assert!(handle.transition(OperationState::Running, OperationState::Completed));

        assert!(!handle.cancel());
        assert_eq!(handle.state(), OperationState::Completed);
        assert!(!handle.token().is_cancelled());
    }

    #[test]
    fn test_cancel_raises_token() {
        let handle = OperationHandle::new(OperationId(3), Box::new(Noop), OperationState::Deferred);
        assert!(handle.cancel());
        assert!(handle.token().is_cancelled());
        assert_eq!(handle.state(), OperationState::Cancelled);
        assert!(!handle.cancel());
    }
}
