use std::path::PathBuf;

use thiserror::Error;

/// Result type for ragstore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for ragstore operations
#[derive(Error, Debug)]
pub enum Error {
    /// I/O related errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation issued before the backend finished initializing
    #[error("Storage not initialized")]
    NotInitialized,

    /// Project id absent
    #[error("Project not found: {0}")]
    ProjectNotFound(uuid::Uuid),

    /// Graph node absent where one is required
    #[error("Graph entity not found: {0}")]
    GraphNotFound(String),

    /// Malformed UUID or identity key
    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    /// Vector length does not match the configured dimension
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Unique-constraint violation on an upsert path
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Embedded busy-timeout reached while waiting on a file lock
    #[error("Lock timeout in {operation} after {waited_ms}ms")]
    LockTimeout { operation: String, waited_ms: u64 },

    /// Retryable backend fault (connection loss, serialization failure)
    #[error("Transient storage fault: {0}")]
    Transient(String),

    /// Native extension could not be resolved or loaded
    #[error("Failed to load extension '{name}' for {platform} from {path}: {reason}")]
    ExtensionLoad {
        name: String,
        platform: String,
        path: PathBuf,
        reason: String,
    },

    /// DDL error during a schema version bump; the upgrade was rolled back
    #[error("Migration to version {version} failed: {reason}")]
    MigrationFailed { version: u32, reason: String },

    /// Caller-imposed deadline expired
    #[error("Operation '{operation}' timed out")]
    OperationTimeout { operation: String },

    /// Use after shutdown
    #[error("Connection manager is closed")]
    ManagerClosed,

    /// Serialization of a stored value failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Storage backend error with context
    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Creates a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Creates an invalid-identifier error
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    /// Creates a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Creates a transient fault
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// True when the retry wrapper may re-attempt the operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Extension trait for adding operation context to Results
pub trait ResultExt<T> {
    /// Wrap the error with an operation name, preserving the original text
    fn op_context(self, operation: &str) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn op_context(self, operation: &str) -> Result<T> {
        self.map_err(|e| Error::Storage(format!("{operation}: {e}")))
    }
}
