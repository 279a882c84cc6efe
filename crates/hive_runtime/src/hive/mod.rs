//! The Hive
//!
//! One [`Hive`] owns the item registry, the live sessions, the factory and
//! template lists and the operation machinery. It is cheap to clone; all
//! clones share the same state.
//!
//! Lock order: creation lock, then catalog lock; item dispatch lock, then
//! session state, then item state. The catalog lock serializes item list
//! changes with item list subscriptions. No listener runs under the catalog
//! or creation lock.

mod fanout;
mod operations;
mod registry;
mod sessions;
#[cfg(test)]
pub(crate) mod testing;

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::{ReentrantMutex, RwLock};
use uuid::Uuid;

use hive_types::{Attributes, Variant};

use crate::error::HiveResult;
use crate::factory::{ChainItem, ChainRegistry, FactoryTemplate, ItemFactory};
use crate::item::{DataItem, DataItemInfo, ItemListener};
use crate::listener::{ItemFactoryListener, ListenerSet, SessionListener};
use crate::operation::{OperationManager, OperationProcessor, default_workers};
use crate::session::{Session, SessionId};

/// Registry and session engine
#[derive(Clone)]
pub struct Hive {
    inner: Arc<HiveInner>,
}

struct HiveInner {
    id: Uuid,

    sessions: RwLock<HashMap<SessionId, Session>>,
    session_listeners: ListenerSet<dyn SessionListener>,

    items: RwLock<HashMap<String, Arc<DataItemInfo>>>,
    /// Single listener attached to every registered item
    item_listener: Arc<dyn ItemListener>,
    /// Serializes item list changes and item list subscriptions
    catalog: ReentrantMutex<()>,

    factories: RwLock<Vec<Arc<dyn ItemFactory>>>,
    factory_listeners: ListenerSet<dyn ItemFactoryListener>,
    templates: RwLock<Vec<FactoryTemplate>>,
    chain_registry: ChainRegistry,
    /// Serializes creation on demand
    creation: ReentrantMutex<()>,

    operations: Arc<OperationManager>,
    processor: OperationProcessor,
}

impl Hive {
    /// Create a hive and start its operation processor
    pub fn new() -> HiveResult<Self> {
        Self::with_operation_workers(default_workers())
    }

    /// Create a hive running at most `workers` immediate operations at once
    pub fn with_operation_workers(workers: usize) -> HiveResult<Self> {
        let operations = Arc::new(OperationManager::with_workers(workers));
        let processor = OperationProcessor::start(&operations)?;

        let inner = Arc::new_cyclic(|weak: &Weak<HiveInner>| HiveInner {
            id: Uuid::new_v4(),
            sessions: RwLock::new(HashMap::new()),
            session_listeners: ListenerSet::default(),
            items: RwLock::new(HashMap::new()),
            item_listener: Arc::new(HiveItemListener { hive: weak.clone() }),
            catalog: ReentrantMutex::new(()),
            factories: RwLock::new(Vec::new()),
            factory_listeners: ListenerSet::default(),
            templates: RwLock::new(Vec::new()),
            chain_registry: ChainRegistry::new(),
            creation: ReentrantMutex::new(()),
            operations,
            processor,
        });

        tracing::info!(hive_id = %inner.id, "Hive created");
        Ok(Self { inner })
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// The operation manager tracking this hive's operations
    pub fn operation_manager(&self) -> &Arc<OperationManager> {
        &self.inner.operations
    }

    /// Close every session and stop the operation processor
    pub fn shutdown(&self) {
        let sessions: Vec<Session> = self.inner.sessions.read().values().cloned().collect();
        tracing::info!(hive_id = %self.inner.id, sessions = sessions.len(), "Shutting down hive");

        for session in sessions {
            if let Err(e) = self.close_session(&session) {
                tracing::debug!(session_id = %session.id(), "Session already gone: {}", e);
            }
        }

        self.inner.processor.shutdown();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Hooks
    // ─────────────────────────────────────────────────────────────────────────

    /// Append a factory; factories are consulted in registration order
    pub fn add_item_factory(&self, factory: Arc<dyn ItemFactory>) {
        let mut factories = self.inner.factories.write();
        if !factories.iter().any(|f| Arc::ptr_eq(f, &factory)) {
            factories.push(factory);
        }
    }

    pub fn remove_item_factory(&self, factory: &Arc<dyn ItemFactory>) -> bool {
        let mut factories = self.inner.factories.write();
        let before = factories.len();
        factories.retain(|f| !Arc::ptr_eq(f, factory));
        factories.len() != before
    }

    /// Append a template; the first matching template is applied
    pub fn register_template(&self, template: FactoryTemplate) {
        tracing::debug!(pattern = template.pattern(), "Registered template");
        self.inner.templates.write().push(template);
    }

    /// Register a chain item kind usable in template chains
    pub fn register_chain_item<F>(&self, kind: impl Into<String>, constructor: F)
    where
        F: Fn() -> Arc<dyn ChainItem> + Send + Sync + 'static,
    {
        self.inner.chain_registry.register(kind, constructor);
    }

    pub fn add_session_listener(&self, listener: Arc<dyn SessionListener>) {
        self.inner.session_listeners.add(listener);
    }

    pub fn remove_session_listener(&self, listener: &Arc<dyn SessionListener>) -> bool {
        self.inner.session_listeners.remove(listener)
    }

    pub fn add_item_factory_listener(&self, listener: Arc<dyn ItemFactoryListener>) {
        self.inner.factory_listeners.add(listener);
    }

    pub fn remove_item_factory_listener(&self, listener: &Arc<dyn ItemFactoryListener>) -> bool {
        self.inner.factory_listeners.remove(listener)
    }
}

impl std::fmt::Debug for Hive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hive")
            .field("id", &self.inner.id)
            .field("sessions", &self.inner.sessions.read().len())
            .field("items", &self.inner.items.read().len())
            .field("operations", &self.inner.operations.len())
            .finish()
    }
}

/// Routes item changes into the fan-out
struct HiveItemListener {
    hive: Weak<HiveInner>,
}

impl HiveItemListener {
    fn hive(&self) -> Option<Hive> {
        self.hive.upgrade().map(|inner| Hive { inner })
    }
}

impl ItemListener for HiveItemListener {
    fn value_changed(&self, item: &dyn DataItem, value: Variant) {
        if let Some(hive) = self.hive() {
            hive.handle_value_changed(item, value);
        }
    }

    fn attributes_changed(&self, item: &dyn DataItem, attributes: Attributes) {
        if let Some(hive) = self.hive() {
            hive.handle_attributes_changed(item, &attributes);
        }
    }
}
