//! Error types for the datastore substrate.
//!
//! [`DatastoreError`] is the primary error type returned by every backend
//! and event-model operation. Lifecycle violations carry the offending fqid
//! so a buggy migration can be reported precisely.

use thiserror::Error;

use evolog_core::InvalidFormat;

/// Errors that can occur in the event store substrate.
#[derive(Debug, Error)]
pub enum DatastoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// JSON serialization/deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Schema migration failed.
    #[error("schema migration error: {message}")]
    Schema {
        /// Describes which schema version failed and why.
        message: String,
    },

    /// A create event targeted a model that already exists.
    #[error("model already exists: {0}")]
    ModelExists(String),

    /// An event targeted a model that does not exist (or is soft-deleted).
    #[error("model does not exist: {0}")]
    ModelDoesNotExist(String),

    /// A restore event targeted a model that is not soft-deleted.
    #[error("model is not deleted: {0}")]
    ModelNotDeleted(String),

    /// An identifier violated its syntax or length bounds.
    #[error(transparent)]
    InvalidFormat(#[from] InvalidFormat),

    /// Internal contract violation (e.g. an empty event list where one is
    /// required).
    #[error("bad coding: {0}")]
    BadCoding(String),
}

/// Convenience type alias for datastore results.
pub type Result<T> = std::result::Result<T, DatastoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
