//! Core error types for marksync-core.
//!
//! Each layer owns its error enum (`StoreError` here, `SyncError` in
//! [`crate::sync::types`], `GradingError` in [`crate::grading`]); `CoreError`
//! is the umbrella the façade and the CLI deal in.

use std::path::PathBuf;
use thiserror::Error;

use crate::grading::GradingError;
use crate::sync::types::SyncError;

/// Core error type for marksync-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Local store errors. Fatal to offline capability when raised at open time.
    #[error("Local store error: {0}")]
    Store(#[from] StoreError),

    /// Remote synchronization errors
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Grading policy errors
    #[error("Grading error: {0}")]
    Grading(#[from] GradingError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Local persistent store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open database connection
    #[error("Failed to open store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Unknown collection or index
    #[error("Schema error: {0}")]
    Schema(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Store migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Store is locked")]
    Locked,

    /// Filesystem errors around the store file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored document could not be decoded
    #[error("Corrupt record in '{collection}': {message}")]
    Corrupt { collection: String, message: String },

    /// The blocking worker running a store call went away
    #[error("Store worker failed: {0}")]
    Worker(String),
}

impl StoreError {
    pub fn unknown_collection(name: &str) -> Self {
        StoreError::Schema(format!("unknown collection '{name}'"))
    }

    pub fn unknown_index(collection: &str, index: &str) -> Self {
        StoreError::Schema(format!("collection '{collection}' has no index '{index}'"))
    }

    pub fn is_schema_error(&self) -> bool {
        matches!(self, StoreError::Schema(_))
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Could not resolve the data directory
    #[error("Cannot determine data directory: {0}")]
    DataDir(String),

    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),
}

/// Validation errors for façade inputs.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// A required identifier was empty
    #[error("Missing value for '{0}'")]
    MissingField(&'static str),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseLocked
                    || e.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    StoreError::Locked
                } else {
                    StoreError::QueryFailed(err.to_string())
                }
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::Worker(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
