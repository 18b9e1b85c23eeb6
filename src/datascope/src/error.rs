//! Error types for the data scope engine

use thiserror::Error;

/// Data scope errors
///
/// Only construction-time validation and the role stores produce these.
/// Merging scopes and applying them to a query never fail.
#[derive(Debug, Error)]
pub enum DataScopeError {
    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Scope type is not one of the recognized kinds
    #[error("Invalid data scope type: {0}")]
    InvalidScopeType(String),

    /// Scope values missing or malformed
    #[error("Invalid scope values: {0}")]
    InvalidScopeValues(String),

    /// Field name is not a permitted scope field
    #[error("Invalid scope field: {0}")]
    InvalidScopeField(String),

    /// Configuration error
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for data scope operations
pub type Result<T> = std::result::Result<T, DataScopeError>;
