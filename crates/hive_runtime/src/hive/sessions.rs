//! Session lifecycle and subscriptions

use std::sync::Arc;

use super::Hive;
use crate::error::{HiveError, HiveResult};
use crate::listener::{deliver, notify};
use crate::operation::OperationListener;
use crate::session::{CatalogBatch, Session};

impl Hive {
    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Open a new session
    pub fn create_session(&self) -> Session {
        let session = Session::new(self.inner.id);

        self.inner
            .operations
            .add_listener(session.operations().clone() as Arc<dyn OperationListener>);
        self.inner.sessions.write().insert(session.id(), session.clone());

        tracing::info!(session_id = %session.id(), "Session created");
        for listener in self.inner.session_listeners.snapshot() {
            notify("session", || listener.created(&session));
        }
        session
    }

    /// Check that a session belongs to this hive and is still open
    pub fn validate_session(&self, session: &Session) -> HiveResult<()> {
        if session.hive_id() != self.inner.id {
            return Err(HiveError::InvalidSession);
        }

        let live = self
            .inner
            .sessions
            .read()
            .get(&session.id())
            .is_some_and(|live| live.ptr_eq(session));
        if !live || session.is_closed() {
            return Err(HiveError::InvalidSession);
        }
        Ok(())
    }

    /// Close a session
    ///
    /// Destroy listeners run first. Afterwards the session is removed from
    /// every item it subscribed to and its operations are cancelled. Deferred
    /// operations that refuse cancellation are dropped, since they can no
    /// longer be thawed.
    pub fn close_session(&self, session: &Session) -> HiveResult<()> {
        self.validate_session(session)?;
        let Some(items) = session.close() else {
            return Err(HiveError::InvalidSession);
        };

        tracing::info!(session_id = %session.id(), "Closing session");
        for listener in self.inner.session_listeners.snapshot() {
            notify("session", || listener.destroyed(session));
        }

        for item_id in items {
            if let Some(info) = self.item_info(&item_id) {
                let _dispatch = info.lock_dispatch();
                info.remove_session(&session.id());
            }
        }

        for id in session.operations().close() {
            if let Err(e) = self.inner.operations.cancel(id) {
                // nobody can thaw it any more
                if self.inner.operations.discard(id) {
                    continue;
                }
                tracing::debug!(session_id = %session.id(), operation_id = %id, "Operation keeps running: {}", e);
            }
        }
        self.inner
            .operations
            .remove_listener(&(session.operations().clone() as Arc<dyn OperationListener>));

        self.inner.sessions.write().remove(&session.id());
        Ok(())
    }

    /// Close sessions whose listeners failed during a delivery pass
    pub(crate) fn close_broken(&self, broken: Vec<Session>) {
        for session in broken {
            match self.close_session(&session) {
                Ok(()) => tracing::warn!(session_id = %session.id(), "Closed session with failing listener"),
                Err(_) => tracing::debug!(session_id = %session.id(), "Broken session already closed"),
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Item subscriptions
    // ─────────────────────────────────────────────────────────────────────────

    /// Subscribe a session to an item, creating the item if needed
    ///
    /// With `send_initial`, the cached value and attributes are delivered
    /// before any later change. A failing initial delivery closes the session.
    pub fn register_for_item(&self, session: &Session, item_id: &str, send_initial: bool) -> HiveResult<()> {
        self.validate_session(session)?;
        let info = self
            .retrieve_info(item_id)
            .ok_or_else(|| HiveError::ItemNotFound(item_id.to_string()))?;
        let item_id = info.id();

        let delivered = {
            let _dispatch = info.lock_dispatch();

            if !session.subscribe(item_id) {
                return Err(HiveError::InvalidSession);
            }
            let Some(snapshot) = info.add_session(session) else {
                session.unsubscribe(item_id);
                return Err(HiveError::ItemNotFound(item_id.to_string()));
            };
            tracing::debug!(session_id = %session.id(), item_id = %item_id, "Subscribed to item");

            match session.listener() {
                Some(listener) if send_initial => deliver(|| {
                    listener.value_changed(item_id, &snapshot.value, true)?;
                    listener.attributes_changed(item_id, &snapshot.attributes, true)
                }),
                _ => Ok(()),
            }
        };

        if let Err(e) = delivered {
            tracing::warn!(session_id = %session.id(), item_id = %item_id, "Initial delivery failed: {}", e);
            session.mark_broken();
            // the session may already be closed by a concurrent pass
            let _ = self.close_session(session);
            return Err(HiveError::InvalidSession);
        }
        Ok(())
    }

    /// Remove a session's subscription to an item
    pub fn unregister_for_item(&self, session: &Session, item_id: &str) -> HiveResult<()> {
        self.validate_session(session)?;
        let info = self
            .retrieve_info(item_id)
            .ok_or_else(|| HiveError::ItemNotFound(item_id.to_string()))?;

        let _dispatch = info.lock_dispatch();
        session.unsubscribe(info.id());
        info.remove_session(&session.id());
        tracing::debug!(session_id = %session.id(), item_id = %info.id(), "Unsubscribed from item");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Item list subscriptions
    // ─────────────────────────────────────────────────────────────────────────

    /// Subscribe a session to catalog changes
    ///
    /// The current catalog is delivered as one initial batch. Subscribing
    /// twice has no effect.
    pub fn register_item_list(&self, session: &Session) -> HiveResult<()> {
        self.validate_session(session)?;

        {
            let _catalog = self.inner.catalog.lock();
            match session.set_item_list_subscriber(true) {
                None => return Err(HiveError::InvalidSession),
                Some(true) => return Ok(()),
                Some(false) => {}
            }
            session.enqueue_item_list(CatalogBatch {
                added: self.list_items(),
                removed: Vec::new(),
                initial: true,
            });
        }

        if let Err(e) = session.drain_item_list() {
            tracing::warn!(session_id = %session.id(), "Initial item list delivery failed: {}", e);
            session.mark_broken();
            let _ = self.close_session(session);
            return Err(HiveError::InvalidSession);
        }
        Ok(())
    }

    /// Stop delivering catalog changes to a session
    pub fn unregister_item_list(&self, session: &Session) -> HiveResult<()> {
        self.validate_session(session)?;
        let _catalog = self.inner.catalog.lock();
        session.set_item_list_subscriber(false);
        Ok(())
    }
}
