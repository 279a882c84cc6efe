//! Outbound listener contracts
//!
//! These traits are the only points where the hive drives its collaborators.
//! Session listeners report failures by returning a [`ListenerError`]; a
//! panicking listener is treated the same way.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::RwLock;

use hive_types::{Attributes, ItemInformation, Variant};

use crate::error::{ItemError, ListenerError};
use crate::item::{DataItem, WriteAttributeResults};
use crate::session::Session;

// ─────────────────────────────────────────────────────────────────────────────
// Session listeners
// ─────────────────────────────────────────────────────────────────────────────

/// Receives value and attribute changes for the items a session subscribed to
pub trait ItemChangeListener: Send + Sync {
    /// A new value, or the cached value when `initial` is set
    fn value_changed(&self, item_id: &str, value: &Variant, initial: bool)
    -> Result<(), ListenerError>;

    /// An attribute diff, or the complete cached attributes when `initial` is set
    fn attributes_changed(
        &self,
        item_id: &str,
        attributes: &Attributes,
        initial: bool,
    ) -> Result<(), ListenerError>;
}

/// Receives catalog-wide additions and removals
pub trait ItemListListener: Send + Sync {
    fn changed(
        &self,
        added: &[ItemInformation],
        removed: &[String],
        initial: bool,
    ) -> Result<(), ListenerError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Observability listeners
// ─────────────────────────────────────────────────────────────────────────────

/// Observes session creation and destruction
pub trait SessionListener: Send + Sync {
    fn created(&self, session: &Session);
    fn destroyed(&self, session: &Session);
}

/// Observes items materialized by a factory
pub trait ItemFactoryListener: Send + Sync {
    fn created(&self, item: &Arc<dyn DataItem>);
}

// ─────────────────────────────────────────────────────────────────────────────
// Write listeners
// ─────────────────────────────────────────────────────────────────────────────

/// Completion callback of a value write
pub trait WriteListener: Send + Sync {
    fn success(&self);
    fn failure(&self, error: ItemError);
}

/// Completion callback of an attribute write
pub trait WriteAttributesListener: Send + Sync {
    fn complete(&self, results: WriteAttributeResults);
    fn failure(&self, error: ItemError);
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Invoke listener code, turning a panic into a [`ListenerError`].
pub(crate) fn deliver<F>(f: F) -> Result<(), ListenerError>
where
    F: FnOnce() -> Result<(), ListenerError>,
{
    catch_unwind(AssertUnwindSafe(f)).unwrap_or(Err(ListenerError::Panicked))
}

/// Invoke observer code whose failures are ignored.
pub(crate) fn notify<F: FnOnce()>(what: &str, f: F) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::warn!(listener = what, "Listener panicked, ignoring");
    }
}

/// A set of shared listeners compared by identity
pub(crate) struct ListenerSet<T: ?Sized> {
    listeners: RwLock<Vec<Arc<T>>>,
}

impl<T: ?Sized> Default for ListenerSet<T> {
    fn default() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }
}

impl<T: ?Sized> ListenerSet<T> {
    /// Add a listener; adding the same listener twice has no effect
    pub fn add(&self, listener: Arc<T>) {
        let mut listeners = self.listeners.write();
        if !listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            listeners.push(listener);
        }
    }

    /// Remove a listener, returns true if it was present
    pub fn remove(&self, listener: &Arc<T>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    /// Copy of the current listeners, in registration order
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.listeners.read().clone()
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }
}
