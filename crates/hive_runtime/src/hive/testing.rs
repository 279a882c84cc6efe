//! Listeners shared by the hive tests

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;

use parking_lot::Mutex;

use hive_types::{Attributes, ItemInformation, Variant};

use super::Hive;
use crate::error::{ItemError, ListenerError};
use crate::factory::MemoryItemFactory;
use crate::item::WriteAttributeResults;
use crate::listener::{ItemChangeListener, ItemListListener, WriteAttributesListener, WriteListener};

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Value {
        item_id: String,
        value: Variant,
        initial: bool,
    },
    Attributes {
        item_id: String,
        attributes: Attributes,
        initial: bool,
    },
}

/// Records every change delivered to a session
#[derive(Default)]
pub struct ChangeRecorder {
    changes: Mutex<Vec<Change>>,
}

impl ChangeRecorder {
    pub fn changes(&self) -> Vec<Change> {
        self.changes.lock().clone()
    }

    pub fn values(&self, item_id: &str) -> Vec<(Variant, bool)> {
        self.changes
            .lock()
            .iter()
            .filter_map(|change| match change {
                Change::Value {
                    item_id: id,
                    value,
                    initial,
                } if id == item_id => Some((value.clone(), *initial)),
                _ => None,
            })
            .collect()
    }

    pub fn attributes(&self, item_id: &str) -> Vec<(Attributes, bool)> {
        self.changes
            .lock()
            .iter()
            .filter_map(|change| match change {
                Change::Attributes {
                    item_id: id,
                    attributes,
                    initial,
                } if id == item_id => Some((attributes.clone(), *initial)),
                _ => None,
            })
            .collect()
    }
}

impl ItemChangeListener for ChangeRecorder {
    fn value_changed(&self, item_id: &str, value: &Variant, initial: bool) -> Result<(), ListenerError> {
        self.changes.lock().push(Change::Value {
            item_id: item_id.to_string(),
            value: value.clone(),
            initial,
        });
        Ok(())
    }

    fn attributes_changed(
        &self,
        item_id: &str,
        attributes: &Attributes,
        initial: bool,
    ) -> Result<(), ListenerError> {
        self.changes.lock().push(Change::Attributes {
            item_id: item_id.to_string(),
            attributes: attributes.clone(),
            initial,
        });
        Ok(())
    }
}

/// Fails every delivery, either with an error or by panicking
#[derive(Default)]
pub struct FailingListener {
    pub panics: bool,
    calls: AtomicUsize,
}

impl FailingListener {
    pub fn panicking() -> Self {
        Self {
            panics: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail(&self) -> Result<(), ListenerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panics {
            panic!("listener blew up");
        }
        Err(ListenerError::Disconnected)
    }
}

impl ItemChangeListener for FailingListener {
    fn value_changed(&self, _item_id: &str, _value: &Variant, _initial: bool) -> Result<(), ListenerError> {
        self.fail()
    }

    fn attributes_changed(
        &self,
        _item_id: &str,
        _attributes: &Attributes,
        _initial: bool,
    ) -> Result<(), ListenerError> {
        self.fail()
    }
}

impl ItemListListener for FailingListener {
    fn changed(&self, _added: &[ItemInformation], _removed: &[String], _initial: bool) -> Result<(), ListenerError> {
        self.fail()
    }
}

/// Records item list batches
#[derive(Default)]
pub struct ListRecorder {
    batches: Mutex<Vec<(Vec<String>, Vec<String>, bool)>>,
}

impl ListRecorder {
    /// (added ids sorted, removed ids, initial) per batch
    pub fn batches(&self) -> Vec<(Vec<String>, Vec<String>, bool)> {
        self.batches.lock().clone()
    }
}

impl ItemListListener for ListRecorder {
    fn changed(&self, added: &[ItemInformation], removed: &[String], initial: bool) -> Result<(), ListenerError> {
        let mut added: Vec<String> = added.iter().map(|info| info.id.clone()).collect();
        added.sort();
        self.batches.lock().push((added, removed.to_vec(), initial));
        Ok(())
    }
}

#[derive(Debug, PartialEq)]
pub enum WriteResult {
    Success,
    Failure(ItemError),
    Complete(WriteAttributeResults),
}

/// Forwards write outcomes into a channel
pub struct WriteRecorder {
    tx: Mutex<mpsc::Sender<WriteResult>>,
}

impl WriteRecorder {
    pub fn new() -> (Arc<Self>, mpsc::Receiver<WriteResult>) {
        let (tx, rx) = mpsc::channel();
        (Arc::new(Self { tx: Mutex::new(tx) }), rx)
    }

    fn send(&self, result: WriteResult) {
        let _ = self.tx.lock().send(result);
    }
}

impl WriteListener for WriteRecorder {
    fn success(&self) {
        self.send(WriteResult::Success);
    }

    fn failure(&self, error: ItemError) {
        self.send(WriteResult::Failure(error));
    }
}

impl WriteAttributesListener for WriteRecorder {
    fn complete(&self, results: WriteAttributeResults) {
        self.send(WriteResult::Complete(results));
    }

    fn failure(&self, error: ItemError) {
        self.send(WriteResult::Failure(error));
    }
}

/// A hive that creates memory items for every id
pub fn memory_hive() -> Hive {
    let hive = Hive::new().unwrap();
    hive.add_item_factory(Arc::new(MemoryItemFactory::new("")));
    hive
}

pub fn attrs<const N: usize>(pairs: [(&str, Variant); N]) -> Attributes {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}
