//! Data items and their registry-side state
//!
//! A [`DataItem`] owns its value and knows how to write it. The hive attaches
//! itself as the item's single [`ItemListener`] on registration and keeps the
//! cached state and subscriber set in a [`DataItemInfo`].

mod info;
mod memory;

pub use info::*;
pub use memory::*;

use std::collections::HashMap;
use std::sync::Arc;

use hive_types::{Attributes, ItemInformation, Variant};

use crate::error::ItemError;

/// Per-attribute outcome of an attribute write
pub type WriteAttributeResults = HashMap<String, Result<(), ItemError>>;

/// A single named, live process value
pub trait DataItem: Send + Sync + 'static {
    /// Identity and capabilities of this item
    fn information(&self) -> &ItemInformation;

    /// Unique item identifier
    fn id(&self) -> &str {
        &self.information().id
    }

    /// Read the item's current value
    fn read_value(&self) -> Result<Variant, ItemError>;

    /// Write a new value through the item's output path
    fn write_value(&self, value: Variant) -> Result<(), ItemError>;

    /// Write attributes, reporting an outcome per attribute
    fn write_attributes(&self, attributes: Attributes) -> Result<WriteAttributeResults, ItemError>;

    /// Set or clear the change listener
    ///
    /// An item has at most one listener. Items may report their current state
    /// to a newly attached listener right away.
    fn set_listener(&self, listener: Option<Arc<dyn ItemListener>>);
}

/// Receives changes reported by a data item
pub trait ItemListener: Send + Sync {
    fn value_changed(&self, item: &dyn DataItem, value: Variant);

    fn attributes_changed(&self, item: &dyn DataItem, attributes: Attributes);
}

impl std::fmt::Debug for dyn DataItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataItem").field("id", &self.id()).finish()
    }
}
