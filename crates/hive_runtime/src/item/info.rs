//! Registry-side state of a registered item

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};

use hive_types::{Attributes, Variant, attributes};

use super::DataItem;
use crate::session::{Session, SessionId};

/// Cached value, attributes and subscribers of one registered item
///
/// The cache is updated on every change, whether or not anyone is subscribed.
/// Deliveries for the item are serialized by the dispatch lock, which is held
/// across a fan-out pass and across an initial transmission.
pub struct DataItemInfo {
    item: Arc<dyn DataItem>,
    state: Mutex<ItemState>,
    dispatch: ReentrantMutex<()>,
}

#[derive(Default)]
struct ItemState {
    value: Variant,
    attributes: Attributes,
    sessions: HashMap<SessionId, Session>,
    disposed: bool,
}

/// Cached state of an item at one point in time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemSnapshot {
    pub value: Variant,
    pub attributes: Attributes,
}

impl DataItemInfo {
    pub(crate) fn new(item: Arc<dyn DataItem>) -> Self {
        Self {
            item,
            state: Mutex::new(ItemState::default()),
            dispatch: ReentrantMutex::new(()),
        }
    }

    pub fn id(&self) -> &str {
        self.item.id()
    }

    pub fn item(&self) -> &Arc<dyn DataItem> {
        &self.item
    }

    /// Check whether `item` is the instance this info was created for
    pub(crate) fn is_for(&self, item: &dyn DataItem) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.item), item as *const dyn DataItem)
    }

    /// Serialize deliveries for this item
    pub(crate) fn lock_dispatch(&self) -> ReentrantMutexGuard<'_, ()> {
        self.dispatch.lock()
    }

    /// Current cached value and attributes
    pub fn snapshot(&self) -> ItemSnapshot {
        let state = self.state.lock();
        ItemSnapshot {
            value: state.value.clone(),
            attributes: state.attributes.clone(),
        }
    }

    /// Sessions currently subscribed
    pub fn subscribers(&self) -> Vec<Session> {
        self.state.lock().sessions.values().cloned().collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// Subscribe a session, returning the cached state to send as initial data
    ///
    /// Returns `None` if the item has been disposed in the meantime.
    pub(crate) fn add_session(&self, session: &Session) -> Option<ItemSnapshot> {
        let mut state = self.state.lock();
        if state.disposed {
            return None;
        }
        state.sessions.insert(session.id(), session.clone());
        Some(ItemSnapshot {
            value: state.value.clone(),
            attributes: state.attributes.clone(),
        })
    }

    pub(crate) fn remove_session(&self, session_id: &SessionId) -> bool {
        self.state.lock().sessions.remove(session_id).is_some()
    }

    /// Store a new value and snapshot the subscribers to notify
    pub(crate) fn update_value(&self, value: Variant) -> Option<Vec<Session>> {
        let mut state = self.state.lock();
        if state.disposed {
            return None;
        }
        state.value = value;
        Some(state.sessions.values().cloned().collect())
    }

    /// Merge an attribute change, returning the effective diff and the
    /// subscribers to notify
    pub(crate) fn merge_attributes(&self, change: &Attributes) -> Option<(Attributes, Vec<Session>)> {
        let mut state = self.state.lock();
        if state.disposed {
            return None;
        }
        let diff = attributes::merge(&mut state.attributes, change);
        Some((diff, state.sessions.values().cloned().collect()))
    }

    /// Clear cache and subscribers, returning the sessions that were subscribed
    pub(crate) fn dispose(&self) -> Vec<Session> {
        let mut state = self.state.lock();
        state.disposed = true;
        state.value = Variant::Null;
        state.attributes.clear();
        state.sessions.drain().map(|(_, session)| session).collect()
    }
}

impl std::fmt::Debug for DataItemInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataItemInfo")
            .field("id", &self.id())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
