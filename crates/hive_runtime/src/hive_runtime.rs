//! Hive Runtime - Registry and session engine for live process data
//!
//! This crate contains the item registry, the session manager, the change
//! fan-out, the factory/template resolver and the asynchronous operation
//! manager. Transport layers drive it through [`Hive`] and receive changes
//! through the listener traits in [`listener`].

pub use hive_types;

mod error;
pub mod factory;
mod hive;
pub mod item;
pub mod listener;
pub mod operation;
mod session;

pub use error::*;
pub use hive::*;
pub use session::*;
