//! Data item identity

use serde::{Deserialize, Serialize};

use crate::Attributes;

/// Directions in which a data item can be accessed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct IoDirections {
    /// The item's value can be read
    pub input: bool,
    /// The item's value can be written
    pub output: bool,
}

impl IoDirections {
    pub const INPUT: Self = Self {
        input: true,
        output: false,
    };

    pub const OUTPUT: Self = Self {
        input: false,
        output: true,
    };

    pub const INPUT_OUTPUT: Self = Self {
        input: true,
        output: true,
    };
}

/// Public description of a data item, as listed to item-list subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemInformation {
    /// Unique item identifier
    pub id: String,
    /// Supported access directions
    pub io_directions: IoDirections,
    /// Descriptive attributes shown when browsing, such as a description
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub browser_attributes: Attributes,
}

impl ItemInformation {
    pub fn new(id: impl Into<String>, io_directions: IoDirections) -> Self {
        Self {
            id: id.into(),
            io_directions,
            browser_attributes: Attributes::new(),
        }
    }

    pub fn with_browser_attributes(mut self, attributes: Attributes) -> Self {
        self.browser_attributes = attributes;
        self
    }
}

impl std::fmt::Display for ItemInformation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}
