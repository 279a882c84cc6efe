//! Item creation on demand
//!
//! When a client asks for an item that is not registered, the hive builds a
//! [`FactoryRequest`], lets the first matching [`FactoryTemplate`] fill in
//! attributes and a processing chain, and hands the request to the registered
//! [`ItemFactory`] list. Factories are tried in registration order and the
//! first one that can create the item wins.

mod chain;
mod memory;
mod template;

pub use chain::*;
pub use memory::*;
pub use template::*;

use std::sync::Arc;

use hive_types::Attributes;

use crate::error::FactoryError;
use crate::item::DataItem;

/// Parameters for creating one item
#[derive(Clone, Default)]
pub struct FactoryRequest {
    /// Identifier of the item to create
    pub id: String,
    /// Attributes for the browser entry of the item
    pub browser_attributes: Attributes,
    /// Initial attributes of the item itself
    pub item_attributes: Attributes,
    /// Instantiated processing chain
    pub chain: Vec<ChainBinding>,
}

impl FactoryRequest {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Fill in the parts a template pre-configures
    pub(crate) fn apply_template(&mut self, template: &FactoryTemplate, chain: Vec<ChainBinding>) {
        self.browser_attributes = template.browser_attributes.clone();
        self.item_attributes = template.item_attributes.clone();
        self.chain = chain;
    }
}

impl std::fmt::Debug for FactoryRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactoryRequest")
            .field("id", &self.id)
            .field("browser_attributes", &self.browser_attributes)
            .field("item_attributes", &self.item_attributes)
            .field("chain", &self.chain.iter().map(|b| b.item.kind()).collect::<Vec<_>>())
            .finish()
    }
}

/// Creates data items for the ids it claims
pub trait ItemFactory: Send + Sync {
    /// Whether this factory is responsible for the requested id
    fn can_create(&self, request: &FactoryRequest) -> bool;

    /// Create the item; only called after `can_create` returned true
    fn create(&self, request: &FactoryRequest) -> Result<Arc<dyn DataItem>, FactoryError>;
}
