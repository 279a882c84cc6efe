//! Item registry and creation on demand

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use hive_types::ItemInformation;

use super::Hive;
use crate::error::{FactoryError, HiveError, HiveResult};
use crate::factory::{FactoryRequest, FactoryTemplate};
use crate::item::{DataItem, DataItemInfo, ItemSnapshot};
use crate::listener::notify;
use crate::session::Session;

impl Hive {
    // ─────────────────────────────────────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────────────────────────────────────

    /// Register an item
    ///
    /// Returns false if an item with the same id is already registered. The
    /// hive attaches itself as the item's listener only after the item has
    /// been announced to item list subscribers.
    pub fn register_item(&self, item: Arc<dyn DataItem>) -> bool {
        let Some(announced) = self.insert_item(&item) else {
            return false;
        };
        self.finish_registration(&item, announced);
        true
    }

    /// Add an item to the registry and queue its announcement
    ///
    /// Returns the sessions to flush, or `None` if the id is taken.
    fn insert_item(&self, item: &Arc<dyn DataItem>) -> Option<Vec<Session>> {
        let information = item.information().clone();
        let _catalog = self.inner.catalog.lock();
        {
            let mut items = self.inner.items.write();
            if items.contains_key(&information.id) {
                tracing::debug!(item_id = %information.id, "Item already registered");
                return None;
            }
            items.insert(information.id.clone(), Arc::new(DataItemInfo::new(item.clone())));
        }

        tracing::debug!(item_id = %information.id, "Registered item");
        Some(self.queue_catalog_change(&[information], &[]))
    }

    fn finish_registration(&self, item: &Arc<dyn DataItem>, announced: Vec<Session>) {
        self.flush_item_lists(announced);
        item.set_listener(Some(self.inner.item_listener.clone()));
    }

    /// Unregister an item
    ///
    /// Subscribed sessions lose the subscription silently. Returns false if
    /// this item instance is not registered.
    pub fn unregister_item(&self, item: &dyn DataItem) -> bool {
        let id = item.id().to_string();
        let Some(info) = self.inner.items.read().get(&id).filter(|info| info.is_for(item)).cloned() else {
            return false;
        };

        item.set_listener(None);

        {
            let _dispatch = info.lock_dispatch();
            for session in info.dispose() {
                session.unsubscribe(&id);
            }
        }

        let announced = {
            let _catalog = self.inner.catalog.lock();
            let removed = {
                let mut items = self.inner.items.write();
                if items.get(&id).is_some_and(|current| Arc::ptr_eq(current, &info)) {
                    items.remove(&id);
                    true
                } else {
                    false
                }
            };
            if !removed {
                return false;
            }

            tracing::debug!(item_id = %id, "Unregistered item");
            self.queue_catalog_change(&[], &[id])
        };
        self.flush_item_lists(announced);
        true
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lookup
    // ─────────────────────────────────────────────────────────────────────────

    /// Find a registered item, never creates one
    pub fn lookup_item(&self, item_id: &str) -> Option<Arc<dyn DataItem>> {
        self.item_info(item_id).map(|info| info.item().clone())
    }

    /// Registry-side state of a registered item
    pub fn item_info(&self, item_id: &str) -> Option<Arc<DataItemInfo>> {
        self.inner.items.read().get(item_id).cloned()
    }

    /// Find an item, creating it through the factories if needed
    pub fn retrieve_item(&self, item_id: &str) -> Option<Arc<dyn DataItem>> {
        self.retrieve_info(item_id).map(|info| info.item().clone())
    }

    /// Whether an item exists or some factory could create it
    pub fn validate_item(&self, item_id: &str) -> bool {
        if self.inner.items.read().contains_key(item_id) {
            return true;
        }
        let request = FactoryRequest::new(item_id);
        self.inner.factories.read().iter().any(|f| f.can_create(&request))
    }

    /// Information on every registered item, sorted by id
    pub fn list_items(&self) -> Vec<ItemInformation> {
        let mut items: Vec<_> = self
            .inner
            .items
            .read()
            .values()
            .map(|info| info.item().information().clone())
            .collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        items
    }

    /// Cached value and attributes of a registered item
    pub fn read_item(&self, session: &Session, item_id: &str) -> HiveResult<ItemSnapshot> {
        self.validate_session(session)?;
        self.item_info(item_id)
            .map(|info| info.snapshot())
            .ok_or_else(|| HiveError::ItemNotFound(item_id.to_string()))
    }

    pub(crate) fn retrieve_info(&self, item_id: &str) -> Option<Arc<DataItemInfo>> {
        if let Some(info) = self.item_info(item_id) {
            return Some(info);
        }

        let item = self.create_item(item_id)?;
        self.item_info(item.id())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Creation on demand
    // ─────────────────────────────────────────────────────────────────────────

    fn create_item(&self, item_id: &str) -> Option<Arc<dyn DataItem>> {
        let (item, announced) = {
            let _creation = self.inner.creation.lock();

            // another caller may have created it while we waited
            if let Some(item) = self.lookup_item(item_id) {
                return Some(item);
            }

            let item = self.invoke_factory(item_id)?;
            match self.insert_item(&item) {
                Some(announced) => (item, announced),
                // the id was taken by a direct registration; hand out the live one
                None => return self.lookup_item(item.id()),
            }
        };

        // listeners run outside the creation lock so they may create items too
        self.finish_registration(&item, announced);

        tracing::info!(item_id = %item.id(), "Created item on demand");
        for listener in self.inner.factory_listeners.snapshot() {
            notify("item-factory", || listener.created(&item));
        }
        Some(item)
    }

    fn invoke_factory(&self, item_id: &str) -> Option<Arc<dyn DataItem>> {
        let request = match self.build_request(item_id) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(item_id = %item_id, "Cannot apply template: {}", e);
                return None;
            }
        };

        let factories = self.inner.factories.read().clone();
        let Some(factory) = factories.iter().find(|f| f.can_create(&request)) else {
            tracing::debug!(item_id = %item_id, "No factory can create item");
            return None;
        };

        let item = match catch_unwind(AssertUnwindSafe(|| factory.create(&request))) {
            Ok(Ok(item)) => item,
            Ok(Err(e)) => {
                tracing::warn!(item_id = %item_id, "Item creation failed: {}", e);
                return None;
            }
            Err(_) => {
                tracing::warn!(item_id = %item_id, "Item factory panicked");
                return None;
            }
        };

        if item.id() != item_id {
            tracing::warn!(item_id = %item_id, created = %item.id(), "Factory created item with a different id");
        }
        Some(item)
    }

    /// Build a creation request, applying the first matching template
    fn build_request(&self, item_id: &str) -> Result<FactoryRequest, FactoryError> {
        let mut request = FactoryRequest::new(item_id);

        let Some(template) = self.find_template(item_id) else {
            return Ok(request);
        };

        let chain = self.inner.chain_registry.instantiate(&template.chain)?;
        request.apply_template(&template, chain);
        Ok(request)
    }

    fn find_template(&self, item_id: &str) -> Option<FactoryTemplate> {
        self.inner
            .templates
            .read()
            .iter()
            .find(|template| template.matches(item_id))
            .cloned()
    }
}
