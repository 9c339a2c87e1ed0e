//! Error types shared across the ledgerline crates.

use thiserror::Error;

/// Result type alias used throughout the core and storage crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Database-layer failures, reported by the storage backend.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to obtain a connection from the pool
    #[error("Connection pool error: {0}")]
    Pool(String),

    /// A query failed to execute
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failure
    #[error("Migration error: {0}")]
    Migration(String),

    /// Anything else the backend could not express more precisely
    #[error("Database error: {0}")]
    Internal(String),
}

/// Top-level error for core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage-layer failure
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// Input rejected before reaching storage
    #[error("Validation error: {0}")]
    Validation(String),

    /// JSON encoding/decoding failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A referenced record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Secret store failure (keychain, in-memory store)
    #[error("Secret store error: {0}")]
    SecretStore(String),

    /// Anything that does not fit the variants above
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}
