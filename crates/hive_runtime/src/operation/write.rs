//! Write operations started by clients

use std::sync::Arc;

use hive_types::{Attributes, Variant};

use super::{CancellationToken, Operation, OperationOutcome};
use crate::item::DataItem;
use crate::listener::{WriteAttributesListener, WriteListener, notify};

/// Writes a value to an item and reports the outcome
pub struct WriteValueOperation {
    item: Arc<dyn DataItem>,
    value: Variant,
    listener: Arc<dyn WriteListener>,
}

impl WriteValueOperation {
    pub fn new(item: Arc<dyn DataItem>, value: Variant, listener: Arc<dyn WriteListener>) -> Self {
        Self {
            item,
            value,
            listener,
        }
    }
}

impl Operation for WriteValueOperation {
    fn name(&self) -> &str {
        "write-value"
    }

    fn run(&self, token: &CancellationToken) -> OperationOutcome {
        if token.is_cancelled() {
            return OperationOutcome::Completed;
        }

        let result = self.item.write_value(self.value.clone());

        // a cancelled write never reports
        if token.is_cancelled() {
            tracing::debug!(item_id = %self.item.id(), "Write cancelled, suppressing result");
            return OperationOutcome::Completed;
        }

        match result {
            Ok(()) => {
                notify("write", || self.listener.success());
                OperationOutcome::Completed
            }
            Err(e) => {
                let reason = e.to_string();
                notify("write", || self.listener.failure(e));
                OperationOutcome::Failed(reason)
            }
        }
    }
}

/// Writes attributes to an item and reports per-attribute results
pub struct WriteAttributesOperation {
    item: Arc<dyn DataItem>,
    attributes: Attributes,
    listener: Arc<dyn WriteAttributesListener>,
}

impl WriteAttributesOperation {
    pub fn new(
        item: Arc<dyn DataItem>,
        attributes: Attributes,
        listener: Arc<dyn WriteAttributesListener>,
    ) -> Self {
        Self {
            item,
            attributes,
            listener,
        }
    }
}

impl Operation for WriteAttributesOperation {
    fn name(&self) -> &str {
        "write-attributes"
    }

    fn run(&self, token: &CancellationToken) -> OperationOutcome {
        if token.is_cancelled() {
            return OperationOutcome::Completed;
        }

        let result = self.item.write_attributes(self.attributes.clone());

        if token.is_cancelled() {
            tracing::debug!(item_id = %self.item.id(), "Attribute write cancelled, suppressing result");
            return OperationOutcome::Completed;
        }

        match result {
            Ok(results) => {
                notify("write-attributes", || self.listener.complete(results));
                OperationOutcome::Completed
            }
            Err(e) => {
                let reason = e.to_string();
                notify("write-attributes", || self.listener.failure(e));
                OperationOutcome::Failed(reason)
            }
        }
    }
}
