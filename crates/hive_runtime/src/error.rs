//! Error types for the hive runtime.

use crate::operation::OperationId;

/// Errors surfaced to callers of the [`Hive`](crate::Hive) API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HiveError {
    #[error("Invalid session")]
    InvalidSession,

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Cancellation not supported for operation {0}")]
    CancellationNotSupported(OperationId),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Result type for hive operations
pub type HiveResult<T> = Result<T, HiveError>;

/// Errors raised by a data item's read or write path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ItemError {
    #[error("Item is not writable: {0}")]
    NotWritable(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),
}

/// Errors returned by session listeners. Any of them closes the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListenerError {
    #[error("Listener disconnected")]
    Disconnected,

    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Listener panicked")]
    Panicked,
}

/// Errors that can occur while resolving or creating items.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FactoryError {
    #[error("Invalid template pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Unknown chain item: {0}")]
    UnknownChainItem(String),

    #[error("Item creation failed: {0}")]
    CreationFailed(String),
}

impl From<FactoryError> for HiveError {
    fn from(err: FactoryError) -> Self {
        HiveError::Configuration(err.to_string())
    }
}
