//! Hive Types - Core value model shared by the registry and its collaborators
//!
//! This crate contains the pure data structures that flow between the hive,
//! its data items and the transport layer that talks to remote clients:
//!
//! - [`Variant`]: the process value carried by items and attributes
//! - [`Attributes`]: item metadata, with merge/set helpers in [`attributes`]
//! - [`ItemInformation`]: identity and I/O capabilities of a data item

pub mod attributes;
mod item;
mod variant;

pub use attributes::Attributes;
pub use item::*;
pub use variant::*;
