//! Change fan-out
//!
//! Every change an item reports is merged into the cache and then delivered
//! to the subscribed sessions. A session whose listener fails stops receiving
//! at once and is closed once the pass is over; the remaining sessions still
//! get the change.
//!
//! Catalog changes are queued per session under the catalog lock and
//! delivered after it is released.

use std::sync::Arc;

use hive_types::{Attributes, ItemInformation, Variant};

use super::Hive;
use crate::item::{DataItem, DataItemInfo};
use crate::listener::deliver;
use crate::session::{CatalogBatch, Session};

impl Hive {
    pub(crate) fn handle_value_changed(&self, item: &dyn DataItem, value: Variant) {
        let Some(info) = self.info_for(item) else {
            tracing::debug!(item_id = %item.id(), "Value change for unknown item ignored");
            return;
        };

        let broken = {
            let _dispatch = info.lock_dispatch();
            let Some(sessions) = info.update_value(value.clone()) else {
                return;
            };

            let item_id = info.id();
            collect_broken(sessions, |session| {
                let Some(listener) = session.listener() else {
                    return Ok(());
                };
                deliver(|| listener.value_changed(item_id, &value, false))
            })
        };

        self.close_broken(broken);
    }

    pub(crate) fn handle_attributes_changed(&self, item: &dyn DataItem, change: &Attributes) {
        let Some(info) = self.info_for(item) else {
            tracing::debug!(item_id = %item.id(), "Attribute change for unknown item ignored");
            return;
        };

        let broken = {
            let _dispatch = info.lock_dispatch();
            let Some((diff, sessions)) = info.merge_attributes(change) else {
                return;
            };
            if diff.is_empty() {
                return;
            }

            let item_id = info.id();
            collect_broken(sessions, |session| {
                let Some(listener) = session.listener() else {
                    return Ok(());
                };
                deliver(|| listener.attributes_changed(item_id, &diff, false))
            })
        };

        self.close_broken(broken);
    }

    /// Queue a catalog change for every item list subscriber
    ///
    /// Must be called under the catalog lock. Returns the sessions to hand to
    /// [`Hive::flush_item_lists`] once the lock is released.
    pub(crate) fn queue_catalog_change(&self, added: &[ItemInformation], removed: &[String]) -> Vec<Session> {
        let batch = CatalogBatch {
            added: added.to_vec(),
            removed: removed.to_vec(),
            initial: false,
        };

        self.inner
            .sessions
            .read()
            .values()
            .filter(|session| session.enqueue_item_list(batch.clone()))
            .cloned()
            .collect()
    }

    /// Deliver queued catalog changes and close sessions whose listener failed
    ///
    /// Must not be called under the catalog or creation lock.
    pub(crate) fn flush_item_lists(&self, sessions: Vec<Session>) {
        let broken = collect_broken(sessions, |session| session.drain_item_list());
        self.close_broken(broken);
    }

    /// Registry-side state of exactly this item instance
    fn info_for(&self, item: &dyn DataItem) -> Option<Arc<DataItemInfo>> {
        self.item_info(item.id()).filter(|info| info.is_for(item))
    }
}

fn collect_broken<F, E>(sessions: Vec<Session>, mut send: F) -> Vec<Session>
where
    F: FnMut(&Session) -> Result<(), E>,
    E: std::fmt::Display,
{
    let mut broken = Vec::new();
    for session in sessions {
        if let Err(e) = send(&session) {
            tracing::warn!(session_id = %session.id(), "Listener failed: {}", e);
            session.mark_broken();
            broken.push(session);
        }
    }
    broken
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::hive::testing::{ChangeRecorder, FailingListener, ListRecorder, attrs, memory_hive};
    use crate::item::MemoryItem;

    fn subscribed(hive: &Hive, item_id: &str) -> (Session, Arc<ChangeRecorder>) {
        let session = hive.create_session();
        let recorder = Arc::new(ChangeRecorder::default());
        session.set_listener(Some(recorder.clone()));
        hive.register_for_item(&session, item_id, true).unwrap();
        (session, recorder)
    }

    #[test]
    fn test_temperature_scenario() {
        let hive = Hive::new().unwrap();
        let item = Arc::new(MemoryItem::new("temp1").with_value(20.0).with_attribute("unit", "C"));
        hive.register_item(item.clone());

        let (_first, a) = subscribed(&hive, "temp1");
        let (_second, b) = subscribed(&hive, "temp1");

        item.update_value(21.5);
        item.update_attributes(&attrs([("alarm", Variant::Bool(true))]));

        for recorder in [&a, &b] {
            assert_eq!(
                recorder.values("temp1"),
                vec![(Variant::Double(20.0), true), (Variant::Double(21.5), false)]
            );
            assert_eq!(
                recorder.attributes("temp1"),
                vec![
                    (attrs([("unit", Variant::from("C"))]), true),
                    (attrs([("alarm", Variant::Bool(true))]), false),
                ]
            );
        }
    }

    #[test]
    fn test_failing_listener_is_closed_and_others_still_served() {
        let hive = Hive::new().unwrap();
        let item = Arc::new(MemoryItem::new("temp1").with_value(1));
        hive.register_item(item.clone());

        let (healthy, recorder) = subscribed(&hive, "temp1");

        let faulty = hive.create_session();
        hive.register_for_item(&faulty, "temp1", false).unwrap();
        let failing = Arc::new(FailingListener::default());
        faulty.set_listener(Some(failing.clone()));

        let (panicky, _) = subscribed(&hive, "temp1");
        panicky.set_listener(Some(Arc::new(FailingListener::panicking())));

        item.update_value(2);

        assert_eq!(failing.calls(), 1);
        assert!(faulty.is_closed());
        assert!(panicky.is_closed());
        assert!(hive.validate_session(&healthy).is_ok());
        assert_eq!(hive.item_info("temp1").unwrap().subscriber_count(), 1);
        assert_eq!(recorder.values("temp1").last(), Some(&(Variant::Int32(2), false)));

        item.update_value(3);
        assert_eq!(failing.calls(), 1);
        assert_eq!(recorder.values("temp1").len(), 3);
    }

    #[test]
    fn test_attribute_changes_are_idempotent() {
        let hive = Hive::new().unwrap();
        let item = Arc::new(MemoryItem::new("setpoint"));
        hive.register_item(item.clone());
        let (_session, recorder) = subscribed(&hive, "setpoint");

        let change = attrs([("mode", Variant::from("manual"))]);
        hive.handle_attributes_changed(item.as_ref(), &change);
        hive.handle_attributes_changed(item.as_ref(), &change);

        // initial batch plus exactly one diff
        assert_eq!(recorder.attributes("setpoint").len(), 2);
        assert_eq!(hive.item_info("setpoint").unwrap().snapshot().attributes, change);

        hive.handle_attributes_changed(item.as_ref(), &attrs([("mode", Variant::Null)]));
        let attributes = recorder.attributes("setpoint");
        assert_eq!(attributes.len(), 3);
        assert_eq!(attributes[2].0, attrs([("mode", Variant::Null)]));
        assert!(hive.item_info("setpoint").unwrap().snapshot().attributes.is_empty());
    }

    #[test]
    fn test_changes_from_unregistered_instance_are_ignored() {
        let hive = Hive::new().unwrap();
        hive.register_item(Arc::new(MemoryItem::new("temp1").with_value(1)));
        let (_session, recorder) = subscribed(&hive, "temp1");

        let impostor = MemoryItem::new("temp1");
        hive.handle_value_changed(&impostor, Variant::Int32(99));
        hive.handle_value_changed(&MemoryItem::new("ghost"), Variant::Int32(99));

        assert_eq!(recorder.values("temp1").len(), 1);
        assert_eq!(hive.item_info("temp1").unwrap().snapshot().value, Variant::Int32(1));
    }

    #[test]
    fn test_listener_may_reenter_the_hive() {
        struct Resubscriber {
            hive: Hive,
            session: parking_lot::Mutex<Option<Session>>,
        }

        impl crate::listener::ItemChangeListener for Resubscriber {
            fn value_changed(
                &self,
                item_id: &str,
                _value: &Variant,
                initial: bool,
            ) -> Result<(), crate::error::ListenerError> {
                if initial {
                    return Ok(());
                }
                if let Some(session) = self.session.lock().clone() {
                    let _ = self.hive.read_item(&session, item_id);
                    let _ = self.hive.register_for_item(&session, item_id, false);
                }
                Ok(())
            }

            fn attributes_changed(
                &self,
                _item_id: &str,
                _attributes: &Attributes,
                _initial: bool,
            ) -> Result<(), crate::error::ListenerError> {
                Ok(())
            }
        }

        let hive = memory_hive();
        let session = hive.create_session();
        let listener = Arc::new(Resubscriber {
            hive: hive.clone(),
            session: parking_lot::Mutex::new(Some(session.clone())),
        });
        session.set_listener(Some(listener.clone()));
        hive.register_for_item(&session, "a", true).unwrap();

        let item = hive.lookup_item("a").unwrap();
        item.write_value(Variant::Int32(5)).unwrap();

        assert!(hive.validate_session(&session).is_ok());
        listener.session.lock().take();
    }

    #[test]
    fn test_failed_session_gets_no_callback_in_nested_pass() {
        use std::sync::atomic::{AtomicBool, Ordering};

        /// Writes the item once more from inside its first live callback
        struct Echo {
            item: Arc<MemoryItem>,
            fired: AtomicBool,
        }

        impl crate::listener::ItemChangeListener for Echo {
            fn value_changed(
                &self,
                _item_id: &str,
                _value: &Variant,
                initial: bool,
            ) -> Result<(), crate::error::ListenerError> {
                if !initial && !self.fired.swap(true, Ordering::SeqCst) {
                    self.item.update_value(3);
                }
                Ok(())
            }

            fn attributes_changed(
                &self,
                _item_id: &str,
                _attributes: &Attributes,
                _initial: bool,
            ) -> Result<(), crate::error::ListenerError> {
                Ok(())
            }
        }

        let hive = Hive::new().unwrap();
        let item = Arc::new(MemoryItem::new("temp1").with_value(1));
        hive.register_item(item.clone());

        let echoing = hive.create_session();
        echoing.set_listener(Some(Arc::new(Echo {
            item: item.clone(),
            fired: AtomicBool::new(false),
        })));
        hive.register_for_item(&echoing, "temp1", false).unwrap();

        let faulty = hive.create_session();
        hive.register_for_item(&faulty, "temp1", false).unwrap();
        let failing = Arc::new(FailingListener::default());
        faulty.set_listener(Some(failing.clone()));

        item.update_value(2);

        assert_eq!(failing.calls(), 1);
        assert!(faulty.is_closed());
        assert!(hive.validate_session(&echoing).is_ok());
        assert_eq!(hive.item_info("temp1").unwrap().snapshot().value, Variant::Int32(3));
    }

    #[test]
    fn test_concurrent_updates_reach_every_subscriber() {
        let hive = Hive::new().unwrap();
        let item = Arc::new(MemoryItem::new("counter").with_value(0));
        hive.register_item(item.clone());
        let subscribers: Vec<_> = (0..4).map(|_| subscribed(&hive, "counter")).collect();

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let item = item.clone();
                thread::spawn(move || {
                    for i in 0..25 {
                        item.update_value(w * 100 + i);
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let last = hive.item_info("counter").unwrap().snapshot().value;
        for (_, recorder) in &subscribers {
            let values = recorder.values("counter");
            assert_eq!(values.len(), 101);
            assert_eq!(values.last().map(|(v, _)| v.clone()), Some(last.clone()));
        }
    }

    #[test]
    fn test_broken_item_list_subscriber_is_closed() {
        let hive = memory_hive();
        let faulty = hive.create_session();
        hive.register_item_list(&faulty).unwrap();
        let failing = Arc::new(FailingListener::default());
        faulty.set_item_list_listener(Some(failing.clone()));

        let healthy = hive.create_session();
        let recorder = Arc::new(ListRecorder::default());
        healthy.set_item_list_listener(Some(recorder.clone()));
        hive.register_item_list(&healthy).unwrap();

        hive.retrieve_item("a");
        hive.retrieve_item("b");

        assert_eq!(failing.calls(), 1);
        assert!(faulty.is_closed());
        assert_eq!(recorder.batches().len(), 3);
    }
}
