//! In-process data item
//!
//! A memory item keeps its value and attributes in memory. Writes update the
//! stored value directly and are reported to the registry like any other
//! change, which makes it the simplest source of live data.

use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, RwLock};

use hive_types::{Attributes, IoDirections, ItemInformation, Variant, attributes};

use super::{DataItem, ItemListener, WriteAttributeResults};
use crate::error::ItemError;
use crate::factory::{ChainBinding, ChainDirection, FactoryRequest};

/// Data item backed by memory
pub struct MemoryItem {
    information: ItemInformation,
    state: Mutex<MemoryState>,
    chain: Vec<ChainBinding>,
    listener: RwLock<Option<Arc<dyn ItemListener>>>,
    /// Keeps the order of reported changes equal to the order of updates
    notify: ReentrantMutex<()>,
}

#[derive(Default)]
struct MemoryState {
    value: Variant,
    attributes: Attributes,
}

impl MemoryItem {
    /// Create a readable and writable memory item
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            information: ItemInformation::new(id, IoDirections::INPUT_OUTPUT),
            state: Mutex::new(MemoryState::default()),
            chain: Vec::new(),
            listener: RwLock::new(None),
            notify: ReentrantMutex::new(()),
        }
    }

    /// Create an item from a factory request, taking over the request's
    /// attributes and processing chain
    pub fn from_request(request: &FactoryRequest) -> Self {
        Self::new(request.id.clone())
            .with_browser_attributes(request.browser_attributes.clone())
            .with_attributes(request.item_attributes.clone())
            .with_chain(request.chain.clone())
    }

    /// Set the attributes listed to item list subscribers
    pub fn with_browser_attributes(mut self, attributes: Attributes) -> Self {
        self.information.browser_attributes = attributes;
        self
    }

    /// Set the initial value
    pub fn with_value(self, value: impl Into<Variant>) -> Self {
        self.state.lock().value = value.into();
        self
    }

    /// Set a single initial attribute
    pub fn with_attribute(self, name: impl Into<String>, value: impl Into<Variant>) -> Self {
        self.state.lock().attributes.insert(name.into(), value.into());
        self
    }

    /// Set the initial attributes
    pub fn with_attributes(self, attributes: Attributes) -> Self {
        self.state.lock().attributes.extend(attributes);
        self
    }

    /// Set the processing chain
    pub fn with_chain(mut self, chain: Vec<ChainBinding>) -> Self {
        self.chain = chain;
        self
    }

    /// Set the access directions
    pub fn with_io_directions(mut self, io_directions: IoDirections) -> Self {
        self.information.io_directions = io_directions;
        self
    }

    /// Current value
    pub fn value(&self) -> Variant {
        self.state.lock().value.clone()
    }

    /// Current attributes
    pub fn attributes(&self) -> Attributes {
        self.state.lock().attributes.clone()
    }

    /// Update the value as if it had been read from a device
    ///
    /// The value passes through the input side of the chain, which may also
    /// adjust attributes.
    pub fn update_value(&self, value: impl Into<Variant>) {
        let _notify = self.notify.lock();

        let mut chain_attributes = Attributes::new();
        let value = self.apply_chain(value.into(), &mut chain_attributes, ChainDirection::In);

        let attribute_diff = {
            let mut state = self.state.lock();
            state.value = value.clone();
            attributes::merge(&mut state.attributes, &chain_attributes)
        };

        if let Some(listener) = self.listener() {
            listener.value_changed(self, value);
            if !attribute_diff.is_empty() {
                listener.attributes_changed(self, attribute_diff);
            }
        }
    }

    /// Merge attribute changes and report the effective diff
    pub fn update_attributes(&self, change: &Attributes) {
        let _notify = self.notify.lock();

        let diff = attributes::merge(&mut self.state.lock().attributes, change);
        if diff.is_empty() {
            return;
        }

        if let Some(listener) = self.listener() {
            listener.attributes_changed(self, diff);
        }
    }

    fn listener(&self) -> Option<Arc<dyn ItemListener>> {
        self.listener.read().clone()
    }

    fn apply_chain(
        &self,
        mut value: Variant,
        attributes: &mut Attributes,
        direction: ChainDirection,
    ) -> Variant {
        for binding in self.chain.iter().filter(|b| b.direction.applies_to(direction)) {
            value = binding.item.process(value, attributes);
        }
        value
    }
}

impl DataItem for MemoryItem {
    fn information(&self) -> &ItemInformation {
        &self.information
    }

    fn read_value(&self) -> Result<Variant, ItemError> {
        if !self.information.io_directions.input {
            return Err(ItemError::InvalidValue(format!(
                "{} is not readable",
                self.information.id
            )));
        }
        Ok(self.value())
    }

    fn write_value(&self, value: Variant) -> Result<(), ItemError> {
        if !self.information.io_directions.output {
            return Err(ItemError::NotWritable(self.information.id.clone()));
        }

        let mut ignored = Attributes::new();
        let value = self.apply_chain(value, &mut ignored, ChainDirection::Out);
        self.update_value(value);
        Ok(())
    }

    fn write_attributes(&self, attributes: Attributes) -> Result<WriteAttributeResults, ItemError> {
        let results = attributes.keys().map(|name| (name.clone(), Ok(()))).collect();
        self.update_attributes(&attributes);
        Ok(results)
    }

    fn set_listener(&self, listener: Option<Arc<dyn ItemListener>>) {
        let _notify = self.notify.lock();
        *self.listener.write() = listener.clone();

        // flush the current state to the new listener
        if let Some(listener) = listener {
            let (value, attributes) = {
                let state = self.state.lock();
                (state.value.clone(), state.attributes.clone())
            };
            listener.value_changed(self, value);
            if !attributes.is_empty() {
                listener.attributes_changed(self, attributes);
            }
        }
    }
}
