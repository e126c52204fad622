//! Error types for the permissions module.

use credvault_core::{InvalidAccess, ValidationError};
use credvault_store::StoreError;
use thiserror::Error;

/// Errors that can occur during permission operations.
#[derive(Debug, Error)]
pub enum PermsError {
    /// The path or row does not exist, or the caller may not see it.
    #[error(transparent)]
    InvalidAccess(#[from] InvalidAccess),

    /// The caller tried to change its own grant, or has no identity.
    #[error("invalid permission operation: {0}")]
    InvalidPermissionOperation(&'static str),

    /// The request contradicts an existing row.
    #[error("conflict: {0}")]
    Conflict(&'static str),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for permission operations.
pub type Result<T> = std::result::Result<T, PermsError>;
