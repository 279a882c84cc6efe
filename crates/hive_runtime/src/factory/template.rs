//! Pattern-matched creation templates

use regex::Regex;

use hive_types::{Attributes, Variant};

use super::ChainEntry;
use crate::error::FactoryError;

/// Pre-configures creation requests for item ids matching a pattern
///
/// The pattern must match the whole id. Templates are consulted in
/// registration order; the first match is applied.
#[derive(Debug, Clone)]
pub struct FactoryTemplate {
    source: String,
    pattern: Regex,
    pub browser_attributes: Attributes,
    pub item_attributes: Attributes,
    pub chain: Vec<ChainEntry>,
}

impl FactoryTemplate {
    pub fn new(pattern: &str) -> Result<Self, FactoryError> {
        let anchored = format!("^(?:{pattern})$");
        let regex = Regex::new(&anchored).map_err(|e| FactoryError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            source: pattern.to_string(),
            pattern: regex,
            browser_attributes: Attributes::new(),
            item_attributes: Attributes::new(),
            chain: Vec::new(),
        })
    }

    pub fn with_browser_attribute(mut self, name: impl Into<String>, value: impl Into<Variant>) -> Self {
        self.browser_attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_item_attribute(mut self, name: impl Into<String>, value: impl Into<Variant>) -> Self {
        self.item_attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_browser_attributes(mut self, attributes: Attributes) -> Self {
        self.browser_attributes.extend(attributes);
        self
    }

    pub fn with_item_attributes(mut self, attributes: Attributes) -> Self {
        self.item_attributes.extend(attributes);
        self
    }

    pub fn with_chain(mut self, chain: Vec<ChainEntry>) -> Self {
        self.chain = chain;
        self
    }

    /// The pattern as it was given
    pub fn pattern(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, item_id: &str) -> bool {
        self.pattern.is_match(item_id)
    }
}
