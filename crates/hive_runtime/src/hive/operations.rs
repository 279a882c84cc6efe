//! Client-initiated operations

use std::sync::Arc;

use hive_types::{Attributes, Variant};

use super::Hive;
use crate::error::{HiveError, HiveResult};
use crate::listener::{WriteAttributesListener, WriteListener};
use crate::operation::{Operation, OperationId, ScheduleMode, WriteAttributesOperation, WriteValueOperation};
use crate::session::Session;

impl Hive {
    /// Start writing a value to an item
    ///
    /// The write runs on a worker thread; its outcome goes to `listener`.
    pub fn start_write(
        &self,
        session: &Session,
        item_id: &str,
        value: Variant,
        listener: Option<Arc<dyn WriteListener>>,
    ) -> HiveResult<OperationId> {
        self.validate_session(session)?;
        let listener =
            listener.ok_or_else(|| HiveError::InvalidArgument("a write listener is required".to_string()))?;
        let item = self
            .retrieve_item(item_id)
            .ok_or_else(|| HiveError::ItemNotFound(item_id.to_string()))?;

        tracing::debug!(session_id = %session.id(), item_id = %item_id, value = %value, "Starting write");
        let operation = WriteValueOperation::new(item, value, listener);
        self.schedule_operation(session, Box::new(operation), ScheduleMode::Immediate)
    }

    /// Start writing attributes to an item
    pub fn start_write_attributes(
        &self,
        session: &Session,
        item_id: &str,
        attributes: Attributes,
        listener: Option<Arc<dyn WriteAttributesListener>>,
    ) -> HiveResult<OperationId> {
        self.validate_session(session)?;
        let listener =
            listener.ok_or_else(|| HiveError::InvalidArgument("a write listener is required".to_string()))?;
        let item = self
            .retrieve_item(item_id)
            .ok_or_else(|| HiveError::ItemNotFound(item_id.to_string()))?;

        tracing::debug!(session_id = %session.id(), item_id = %item_id, count = attributes.len(), "Starting attribute write");
        let operation = WriteAttributesOperation::new(item, attributes, listener);
        self.schedule_operation(session, Box::new(operation), ScheduleMode::Immediate)
    }

    /// Schedule an operation on behalf of a session
    ///
    /// The operation is attached to the session before it can start, so it
    /// is cancelled if the session closes.
    pub fn schedule_operation(
        &self,
        session: &Session,
        operation: Box<dyn Operation>,
        mode: ScheduleMode,
    ) -> HiveResult<OperationId> {
        self.validate_session(session)?;

        let manager = &self.inner.operations;
        let handle = manager.register(operation, mode);
        let id = handle.id();

        if !session.operations().attach(id) {
            handle.cancel();
            manager.remove(id);
            return Err(HiveError::InvalidSession);
        }

        manager.start(&handle)?;
        Ok(id)
    }

    /// Cancel an operation the session started
    ///
    /// Operations the session does not track, including finished ones, are
    /// left alone.
    pub fn cancel_operation(&self, session: &Session, id: OperationId) -> HiveResult<()> {
        self.validate_session(session)?;

        if !session.operations().contains(id) {
            tracing::debug!(session_id = %session.id(), operation_id = %id, "Cancel of untracked operation ignored");
            return Ok(());
        }

        if self.inner.operations.cancel(id)? {
            tracing::debug!(session_id = %session.id(), operation_id = %id, "Operation cancelled");
        }
        Ok(())
    }

    /// Hand a deferred operation to the processor
    ///
    /// Anything else is a logged no-op.
    pub fn thaw_operation(&self, session: &Session, id: OperationId) -> HiveResult<()> {
        self.validate_session(session)?;

        if !session.operations().contains(id) {
            tracing::warn!(session_id = %session.id(), operation_id = %id, "Thaw of untracked operation ignored");
            return Ok(());
        }

        let manager = &self.inner.operations;
        let Some(handle) = manager.thaw(id) else {
            tracing::warn!(session_id = %session.id(), operation_id = %id, "Thaw of operation that is not deferred ignored");
            return Ok(());
        };

        if !self.inner.processor.add(handle.clone()) {
            tracing::warn!(operation_id = %id, "Operation processor stopped, cancelling thawed operation");
            handle.cancel();
            manager.remove(id);
        }
        Ok(())
    }
}
