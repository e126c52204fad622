//! Error types for the store module.

use credvault_core::CredentialId;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A credential with this name already exists under another id.
    ///
    /// Two writers racing to create the same name: one wins, the other
    /// sees this and may retry.
    #[error("conflict: credential {name} already exists as {existing}")]
    Conflict { name: String, existing: CredentialId },

    /// A permission row for this (path, actor) already exists.
    #[error("permission for {actor} on {path} already exists")]
    DuplicatePermission { path: String, actor: String },

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A lock was poisoned or a blocking task failed.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
