//! Factory for in-process memory items

use std::sync::Arc;

use super::{FactoryRequest, ItemFactory};
use crate::error::FactoryError;
use crate::item::{DataItem, MemoryItem};

/// Creates a [`MemoryItem`] for every id starting with a prefix
#[derive(Debug, Clone)]
pub struct MemoryItemFactory {
    prefix: String,
}

impl MemoryItemFactory {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl ItemFactory for MemoryItemFactory {
    fn can_create(&self, request: &FactoryRequest) -> bool {
        request.id.starts_with(&self.prefix)
    }

    fn create(&self, request: &FactoryRequest) -> Result<Arc<dyn DataItem>, FactoryError> {
        tracing::debug!(item_id = %request.id, "Creating memory item");
        Ok(Arc::new(MemoryItem::from_request(request)))
    }
}
