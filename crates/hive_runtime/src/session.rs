//! Client sessions
//!
//! A [`Session`] is an opaque, cloneable handle. All bookkeeping lives behind
//! it: the subscribed items, the listeners, the item list flag and the set of
//! operations the session started.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use hive_types::ItemInformation;

use crate::error::ListenerError;
use crate::listener::{ItemChangeListener, ItemListListener, deliver};
use crate::operation::{OperationId, OperationListener};

/// Unique session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a client session
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: SessionId,
    hive_id: Uuid,
    state: Mutex<SessionState>,
    item_list: Mutex<ItemListQueue>,
    operations: Arc<SessionOperations>,
}

#[derive(Default)]
struct SessionState {
    items: HashSet<String>,
    listener: Option<Arc<dyn ItemChangeListener>>,
    item_list_listener: Option<Arc<dyn ItemListListener>>,
    item_list_subscriber: bool,
    /// A listener failed; nothing more is delivered until the session closes
    broken: bool,
    closed: bool,
}

/// A catalog change waiting for delivery
#[derive(Debug, Clone)]
pub(crate) struct CatalogBatch {
    pub added: Vec<ItemInformation>,
    pub removed: Vec<String>,
    pub initial: bool,
}

/// Catalog changes in the order they were made
///
/// Whichever thread finds the queue idle delivers everything queued, so
/// listeners never run under the catalog lock and never see batches out of
/// order.
#[derive(Default)]
struct ItemListQueue {
    pending: VecDeque<CatalogBatch>,
    draining: bool,
}

impl Session {
    pub(crate) fn new(hive_id: Uuid) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id: SessionId::new(),
                hive_id,
                state: Mutex::new(SessionState::default()),
                item_list: Mutex::new(ItemListQueue::default()),
                operations: Arc::new(SessionOperations::default()),
            }),
        }
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    /// Set or clear the listener for item changes
    pub fn set_listener(&self, listener: Option<Arc<dyn ItemChangeListener>>) {
        self.inner.state.lock().listener = listener;
    }

    /// Set or clear the listener for catalog changes
    pub fn set_item_list_listener(&self, listener: Option<Arc<dyn ItemListListener>>) {
        self.inner.state.lock().item_list_listener = listener;
    }

    pub fn is_item_list_subscriber(&self) -> bool {
        self.inner.state.lock().item_list_subscriber
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Ids of the items this session is subscribed to, sorted
    pub fn subscribed_items(&self) -> Vec<String> {
        let mut items: Vec<_> = self.inner.state.lock().items.iter().cloned().collect();
        items.sort();
        items
    }

    pub fn is_subscribed(&self, item_id: &str) -> bool {
        self.inner.state.lock().items.contains(item_id)
    }

    /// Operations started by this session that are still in flight
    pub fn operation_ids(&self) -> Vec<OperationId> {
        self.inner.operations.ids()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Hive-side bookkeeping
    // ─────────────────────────────────────────────────────────────────────────

    pub(crate) fn hive_id(&self) -> Uuid {
        self.inner.hive_id
    }

    pub(crate) fn ptr_eq(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn listener(&self) -> Option<Arc<dyn ItemChangeListener>> {
        let state = self.inner.state.lock();
        if state.closed || state.broken {
            return None;
        }
        state.listener.clone()
    }

    pub(crate) fn item_list_listener(&self) -> Option<Arc<dyn ItemListListener>> {
        let state = self.inner.state.lock();
        if state.closed || state.broken || !state.item_list_subscriber {
            return None;
        }
        state.item_list_listener.clone()
    }

    /// Stop all deliveries right away; closing happens later
    pub(crate) fn mark_broken(&self) {
        self.inner.state.lock().broken = true;
    }

    /// Queue a catalog change, refused unless subscribed to the item list
    ///
    /// Call under the catalog lock so every session queues changes in the
    /// order they were made.
    pub(crate) fn enqueue_item_list(&self, batch: CatalogBatch) -> bool {
        if !self.is_item_list_subscriber() {
            return false;
        }
        self.inner.item_list.lock().pending.push_back(batch);
        true
    }

    /// Deliver queued catalog changes
    ///
    /// Returns immediately if another call is already delivering, including
    /// an outer call on this thread; that call picks up the new batches. On a
    /// listener failure the queue is dropped and the error returned.
    pub(crate) fn drain_item_list(&self) -> Result<(), ListenerError> {
        {
            let mut queue = self.inner.item_list.lock();
            if queue.draining {
                return Ok(());
            }
            queue.draining = true;
        }

        loop {
            let batch = {
                let mut queue = self.inner.item_list.lock();
                match queue.pending.pop_front() {
                    Some(batch) => batch,
                    None => {
                        queue.draining = false;
                        return Ok(());
                    }
                }
            };

            let Some(listener) = self.item_list_listener() else {
                continue;
            };
            if let Err(e) = deliver(|| listener.changed(&batch.added, &batch.removed, batch.initial)) {
                let mut queue = self.inner.item_list.lock();
                queue.pending.clear();
                queue.draining = false;
                return Err(e);
            }
        }
    }

    pub(crate) fn operations(&self) -> &Arc<SessionOperations> {
        &self.inner.operations
    }

    /// Record an item subscription, refused once the session is closed
    pub(crate) fn subscribe(&self, item_id: &str) -> bool {
        let mut state = self.inner.state.lock();
        if state.closed {
            return false;
        }
        state.items.insert(item_id.to_string());
        true
    }

    pub(crate) fn unsubscribe(&self, item_id: &str) -> bool {
        self.inner.state.lock().items.remove(item_id)
    }

    /// Toggle the item list flag, returning the previous value
    pub(crate) fn set_item_list_subscriber(&self, subscribed: bool) -> Option<bool> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return None;
        }
        Some(std::mem::replace(&mut state.item_list_subscriber, subscribed))
    }

    /// Mark the session closed and hand back its subscriptions
    ///
    /// Returns `None` if the session was already closed.
    pub(crate) fn close(&self) -> Option<Vec<String>> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return None;
        }
        state.closed = true;
        state.item_list_subscriber = false;
        Some(state.items.drain().collect())
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Session {}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Operations
// ─────────────────────────────────────────────────────────────────────────────

/// Operations attached to one session
///
/// Registered with the operation manager so finished operations detach
/// themselves.
#[derive(Default)]
pub(crate) struct SessionOperations {
    state: Mutex<OperationSet>,
}

#[derive(Default)]
struct OperationSet {
    ids: HashSet<OperationId>,
    closed: bool,
}

impl SessionOperations {
    /// Attach an operation, refused once the session is closed
    pub fn attach(&self, id: OperationId) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.ids.insert(id);
        true
    }

    pub fn contains(&self, id: OperationId) -> bool {
        self.state.lock().ids.contains(&id)
    }

    pub fn ids(&self) -> Vec<OperationId> {
        let mut ids: Vec<_> = self.state.lock().ids.iter().copied().collect();
        ids.sort();
        ids
    }

    /// Stop accepting operations and hand back the attached ones
    pub fn close(&self) -> Vec<OperationId> {
        let mut state = self.state.lock();
        state.closed = true;
        state.ids.drain().collect()
    }
}

impl OperationListener for SessionOperations {
    fn removed(&self, id: OperationId) {
        self.state.lock().ids.remove(&id);
    }
}
