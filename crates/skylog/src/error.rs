//! Error types for skylog.
//!
//! This module defines all error types used throughout the skylog crate,
//! providing detailed context for debugging and user-facing messages.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for skylog operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    /// A write to the local store was rejected.
    #[error("storage write failed for key '{key}': {message}")]
    StorageWrite {
        /// The key being written.
        key: String,
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Logbook Errors ===
    /// A column with the same key already exists.
    #[error("a column with key '{key}' already exists")]
    DuplicateColumn {
        /// The conflicting key.
        key: String,
    },

    /// Only custom columns may be removed.
    #[error("column '{key}' is not a custom column and cannot be removed")]
    ColumnNotRemovable {
        /// The key of the built-in column.
        key: String,
    },

    /// A custom column key would shadow a fixed entry field.
    #[error("column key '{key}' is reserved for a built-in entry field")]
    ReservedColumnKey {
        /// The rejected key.
        key: String,
    },

    /// No column with the given key exists.
    #[error("unknown column: {key}")]
    UnknownColumn {
        /// The requested key.
        key: String,
    },

    /// No entry with the given id exists in the working collection.
    #[error("entry not found: {id}")]
    EntryNotFound {
        /// The requested entry id.
        id: String,
    },

    /// No saved log with the given id exists.
    #[error("saved log not found: {id}")]
    LogNotFound {
        /// The requested log id.
        id: String,
    },

    /// A field value could not be interpreted for its column type.
    #[error("invalid value '{value}' for field '{field}'")]
    InvalidFieldValue {
        /// The field key.
        field: String,
        /// The rejected value.
        value: String,
    },

    // === Extraction Errors ===
    /// The AI collaborator failed or returned nothing usable.
    #[error("extraction failed: {message}")]
    Extraction {
        /// Description of what went wrong.
        message: String,
    },

    /// An extraction is already pending for this session.
    #[error("an extraction is already in progress")]
    ExtractionInProgress,

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV writing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    // === Generic Errors ===
    /// No async runtime was available for timer-driven work.
    #[error("no async runtime available: {0}")]
    Runtime(String),

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for skylog operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new extraction error.
    #[must_use]
    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction {
            message: message.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a storage write error.
    #[must_use]
    pub fn storage_write(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StorageWrite {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Check if this error came from the AI collaborator.
    #[must_use]
    pub fn is_extraction_error(&self) -> bool {
        matches!(self, Self::Extraction { .. } | Self::ExtractionInProgress)
    }

    /// Check if this error is a rejected schema change.
    #[must_use]
    pub fn is_column_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateColumn { .. }
                | Self::ReservedColumnKey { .. }
                | Self::ColumnNotRemovable { .. }
                | Self::UnknownColumn { .. }
        )
    }
}
