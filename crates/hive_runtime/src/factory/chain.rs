//! Processing chain recipes
//!
//! Templates name chain items by kind. The [`ChainRegistry`] maps those kinds
//! to constructors; the chain items themselves are supplied by plugins.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use hive_types::{Attributes, Variant};

use crate::error::FactoryError;

/// Which side of an item a chain entry processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainDirection {
    /// Values read from the source
    In,
    /// Values written to the source
    Out,
    /// Both directions
    InOut,
}

impl ChainDirection {
    /// Whether an entry with this direction processes values flowing `direction`
    pub fn applies_to(self, direction: ChainDirection) -> bool {
        self == ChainDirection::InOut || self == direction
    }
}

/// A chain entry as written in a template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
    /// Registered chain item kind
    pub kind: String,
    /// Direction the entry applies to
    #[serde(default = "default_direction")]
    pub direction: ChainDirection,
}

fn default_direction() -> ChainDirection {
    ChainDirection::In
}

impl ChainEntry {
    pub fn new(kind: impl Into<String>, direction: ChainDirection) -> Self {
        Self {
            kind: kind.into(),
            direction,
        }
    }
}

/// A processing step that derives values or attributes
pub trait ChainItem: Send + Sync {
    /// Kind name this item was registered under
    fn kind(&self) -> &str;

    /// Process a value, possibly adjusting attributes along the way
    fn process(&self, value: Variant, attributes: &mut Attributes) -> Variant;
}

/// An instantiated chain entry
#[derive(Clone)]
pub struct ChainBinding {
    pub direction: ChainDirection,
    pub item: Arc<dyn ChainItem>,
}

type ChainConstructor = Arc<dyn Fn() -> Arc<dyn ChainItem> + Send + Sync>;

/// Named chain item constructors
#[derive(Default)]
pub struct ChainRegistry {
    constructors: RwLock<HashMap<String, ChainConstructor>>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor for a chain item kind, replacing an existing one
    pub fn register<F>(&self, kind: impl Into<String>, constructor: F)
    where
        F: Fn() -> Arc<dyn ChainItem> + Send + Sync + 'static,
    {
        let kind = kind.into();
        tracing::debug!(kind = %kind, "Registered chain item");
        self.constructors.write().insert(kind, Arc::new(constructor));
    }

    /// Check whether a kind is known
    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.read().contains_key(kind)
    }

    /// Instantiate a chain recipe
    ///
    /// Fails on the first unknown kind; nothing is instantiated in that case.
    pub fn instantiate(&self, entries: &[ChainEntry]) -> Result<Vec<ChainBinding>, FactoryError> {
        let constructors = self.constructors.read();

        entries
            .iter()
            .map(|entry| {
                let constructor = constructors
                    .get(&entry.kind)
                    .ok_or_else(|| FactoryError::UnknownChainItem(entry.kind.clone()))?;
                Ok(ChainBinding {
                    direction: entry.direction,
                    item: constructor(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Passthrough;

    impl ChainItem for Passthrough {
        fn kind(&self) -> &str {
            "passthrough"
        }

        fn process(&self, value: Variant, _attributes: &mut Attributes) -> Variant {
            value
        }
    }

    #[test]
    fn test_direction_matching() {
        assert!(ChainDirection::InOut.applies_to(ChainDirection::In));
        assert!(ChainDirection::InOut.applies_to(ChainDirection::Out));
        assert!(ChainDirection::In.applies_to(ChainDirection::In));
        assert!(!ChainDirection::Out.applies_to(ChainDirection::In));
    }

    #[test]
    fn test_instantiate_known_kinds() {
        let registry = ChainRegistry::new();
        registry.register("passthrough", || Arc::new(Passthrough));

        let chain = registry
            .instantiate(&[
                ChainEntry::new("passthrough", ChainDirection::In),
                ChainEntry::new("passthrough", ChainDirection::Out),
            ])
            .unwrap();

        assert_eq!(chain.len(), 2);
        assert_eq!(chain[1].direction, ChainDirection::Out);
        assert_eq!(chain[0].item.kind(), "passthrough");
    }

    #[test]
    fn test_entry_direction_defaults_to_in() {
        let entry: ChainEntry = serde_json::from_str(r#"{"kind": "scale"}"#).unwrap();
        assert_eq!(entry, ChainEntry::new("scale", ChainDirection::In));

        let entry: ChainEntry = serde_json::from_str(r#"{"kind": "scale", "direction": "in_out"}"#).unwrap();
        assert_eq!(entry.direction, ChainDirection::InOut);
    }

    #[test]
    fn test_unknown_kind_fails() {
        let registry = ChainRegistry::new();
        registry.register("passthrough", || Arc::new(Passthrough));

        let result = registry.instantiate(&[
            ChainEntry::new("passthrough", ChainDirection::In),
            ChainEntry::new("level-alarm", ChainDirection::In),
        ]);

        assert!(matches!(result, Err(FactoryError::UnknownChainItem(kind)) if kind == "level-alarm"));
    }
}
