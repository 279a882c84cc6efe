//! Hive Server Library
//!
//! Configuration and wiring for the hive server binary. The registry and
//! session engine itself lives in [`hive_runtime`].

pub mod chain;
pub mod config;

pub use config::{ConfigError, HiveConfig};
pub use hive_runtime::Hive;
