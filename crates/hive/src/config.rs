//! Hive Configuration
//!
//! Loads the server configuration from a TOML file and wires a [`Hive`] from
//! it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};

use hive_runtime::factory::{ChainEntry, FactoryTemplate, MemoryItemFactory};
use hive_runtime::item::MemoryItem;
use hive_runtime::{Hive, HiveError};
use hive_types::{Attributes, IoDirections, Variant};

use crate::chain;

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("Invalid attribute '{name}': {reason}")]
    InvalidAttribute { name: String, reason: String },

    #[error("Invalid template: {0}")]
    Template(#[from] hive_runtime::FactoryError),

    #[error("Failed to start hive: {0}")]
    Hive(#[from] HiveError),
}

/// Server configuration (hive.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HiveConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub operations: OperationsConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub templates: Vec<TemplateConfig>,
}

/// Operation execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationsConfig {
    /// Immediate operations running at once, defaults to the CPU count
    pub workers: Option<usize>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

fn default_filter() -> String {
    "hive=info,hive_runtime=info".to_string()
}

/// In-process memory items
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Ids with this prefix are created as memory items on demand
    pub prefix: Option<String>,
    /// Items registered at startup
    #[serde(default)]
    pub items: Vec<MemoryItemConfig>,
}

/// A memory item registered at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItemConfig {
    pub id: String,
    pub value: Option<serde_json::Value>,
    #[serde(default = "default_writable")]
    pub writable: bool,
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

fn default_writable() -> bool {
    true
}

/// Creation template
///
/// Chain entries may name the built-in kinds (`negate`, `round`) or kinds a
/// plugin registered on the hive; an unknown kind makes creation fail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Regular expression matched against the whole item id
    pub pattern: String,
    #[serde(default)]
    pub browser_attributes: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub item_attributes: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub chain: Vec<ChainEntry>,
}

impl HiveConfig {
    /// Load the configuration, falling back to defaults if the file is missing
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !fs::try_exists(path).await? {
            info!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).await?;
        let config: HiveConfig = toml::from_str(&content)?;
        info!(
            "Loaded configuration from {} ({} memory items, {} templates)",
            path.display(),
            config.memory.items.len(),
            config.templates.len()
        );
        Ok(config)
    }

    /// Create a hive with the configured factories, items and templates
    pub fn build_hive(&self) -> Result<Hive, ConfigError> {
        let hive = match self.operations.workers {
            Some(workers) => Hive::with_operation_workers(workers)?,
            None => Hive::new()?,
        };
        chain::register_builtin(&hive);

        if let Some(prefix) = &self.memory.prefix {
            debug!("Memory items on demand for prefix '{}'", prefix);
            hive.add_item_factory(Arc::new(MemoryItemFactory::new(prefix.clone())));
        }

        for item in &self.memory.items {
            if !hive.register_item(Arc::new(item.to_item()?)) {
                warn!("Duplicate memory item '{}' ignored", item.id);
            }
        }

        for template in &self.templates {
            hive.register_template(template.to_template()?);
        }

        Ok(hive)
    }
}

impl MemoryItemConfig {
    fn to_item(&self) -> Result<MemoryItem, ConfigError> {
        let io_directions = if self.writable {
            IoDirections::INPUT_OUTPUT
        } else {
            IoDirections::INPUT
        };

        let value = match &self.value {
            Some(value) => to_variant(&self.id, value)?,
            None => Variant::Null,
        };

        Ok(MemoryItem::new(self.id.clone())
            .with_io_directions(io_directions)
            .with_value(value)
            .with_attributes(to_attributes(&self.attributes)?))
    }
}

impl TemplateConfig {
    fn to_template(&self) -> Result<FactoryTemplate, ConfigError> {
        Ok(FactoryTemplate::new(&self.pattern)?
            .with_browser_attributes(to_attributes(&self.browser_attributes)?)
            .with_item_attributes(to_attributes(&self.item_attributes)?)
            .with_chain(self.chain.clone()))
    }
}

fn to_attributes(values: &HashMap<String, serde_json::Value>) -> Result<Attributes, ConfigError> {
    values
        .iter()
        .map(|(name, value)| to_variant(name, value).map(|variant| (name.clone(), variant)))
        .collect()
}

fn to_variant(name: &str, value: &serde_json::Value) -> Result<Variant, ConfigError> {
    Variant::try_from(value.clone()).map_err(|e| ConfigError::InvalidAttribute {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_runtime::factory::ChainDirection;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[logging]
filter = "hive=debug"

[memory]
prefix = "memory."

[[memory.items]]
id = "temp1"
value = 20.5
writable = false

[memory.items.attributes]
unit = "C"
limit = 80

[[templates]]
pattern = 'memory\.valve[0-9]+'
chain = [{ kind = "clamp", direction = "in_out" }]

[templates.item_attributes]
unit = "%"

[[templates]]
pattern = 'memory\.inverted\..*'
chain = [{ kind = "negate" }]

[templates.browser_attributes]
description = "Inverted input"
"#;

    async fn write_config(content: &str) -> (TempDir, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hive.toml");
        fs::write(&path, content).await.unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn test_load_config() {
        let (_dir, path) = write_config(SAMPLE).await;
        let config = HiveConfig::load(&path).await.unwrap();

        assert_eq!(config.logging.filter, "hive=debug");
        assert_eq!(config.memory.prefix.as_deref(), Some("memory."));
        assert_eq!(config.memory.items.len(), 1);
        assert!(!config.memory.items[0].writable);
        assert_eq!(config.templates.len(), 2);
        assert!(config.operations.workers.is_none());
        assert_eq!(
            config.templates[0].chain,
            vec![ChainEntry::new("clamp", ChainDirection::InOut)]
        );
    }

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = HiveConfig::load(dir.path().join("absent.toml")).await.unwrap();

        assert_eq!(config.logging.filter, "hive=info,hive_runtime=info");
        assert!(config.memory.prefix.is_none());
        assert!(config.templates.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_toml() {
        let (_dir, path) = write_config("[memory\nprefix = ").await;
        let result = HiveConfig::load(&path).await;
        assert!(matches!(result, Err(ConfigError::TomlParseError(_))));
    }

    #[tokio::test]
    async fn test_build_hive() {
        let (_dir, path) = write_config(SAMPLE).await;
        let hive = HiveConfig::load(&path).await.unwrap().build_hive().unwrap();

        let session = hive.create_session();
        let snapshot = hive.read_item(&session, "temp1").unwrap();
        assert_eq!(snapshot.value, Variant::Double(20.5));
        assert_eq!(snapshot.attributes.get("limit"), Some(&Variant::Int32(80)));
        assert!(!hive.lookup_item("temp1").unwrap().information().io_directions.output);

        // prefix factory without a template
        assert!(hive.retrieve_item("memory.scratch").is_some());
        // the template names a chain kind nobody registered
        assert!(hive.retrieve_item("memory.valve1").is_none());
        assert!(hive.retrieve_item("other").is_none());

        // built-in chain kinds are always available
        let inverted = hive.retrieve_item("memory.inverted.door").unwrap();
        assert_eq!(
            inverted.information().browser_attributes.get("description"),
            Some(&Variant::from("Inverted input"))
        );
        inverted.write_value(Variant::Bool(true)).unwrap();
        assert_eq!(
            hive.read_item(&session, "memory.inverted.door").unwrap().value,
            Variant::Bool(false)
        );

        hive.shutdown();
    }

    #[test]
    fn test_duplicate_memory_item_keeps_first() {
        let config: HiveConfig = toml::from_str(
            r#"
[operations]
workers = 2

[[memory.items]]
id = "temp1"
value = 1

[[memory.items]]
id = "temp1"
value = 2
"#,
        )
        .unwrap();

        let hive = config.build_hive().unwrap();
        assert_eq!(hive.operation_manager().workers(), 2);
        assert_eq!(hive.list_items().len(), 1);
        let session = hive.create_session();
        assert_eq!(hive.read_item(&session, "temp1").unwrap().value, Variant::Int32(1));
        hive.shutdown();
    }

    #[test]
    fn test_nested_attribute_is_rejected() {
        let config: HiveConfig = toml::from_str(
            r#"
[[memory.items]]
id = "bad"
attributes = { range = [0, 10] }
"#,
        )
        .unwrap();

        let result = config.build_hive();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidAttribute { name, .. }) if name == "range"
        ));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let config = HiveConfig {
            templates: vec![TemplateConfig {
                pattern: "valve[".to_string(),
                browser_attributes: HashMap::new(),
                item_attributes: HashMap::new(),
                chain: Vec::new(),
            }],
            ..Default::default()
        };

        assert!(matches!(config.build_hive(), Err(ConfigError::Template(_))));
    }

    #[test]
    fn test_load_blocking() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hive.toml");
        std::fs::write(&path, "[memory]\nprefix = \"m.\"\n").unwrap();

        let config = tokio_test::block_on(HiveConfig::load(&path)).unwrap();
        assert_eq!(config.memory.prefix.as_deref(), Some("m."));
    }
}
