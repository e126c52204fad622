//! Error types for the vault.
//!
//! Every component error collapses into one of five kinds. Lookups that fail
//! because something is absent and lookups that fail because the caller may
//! not see it both become [`VaultError::NotFoundOrForbidden`].

use credvault_core::{CoreError, InvalidAccess, ValidationError};
use credvault_crypto::CryptoError;
use credvault_perms::PermsError;
use credvault_pki::PkiError;
use credvault_store::StoreError;
use thiserror::Error;

/// Reason carried by the conflict raised when two writers create the same
/// credential at once. The losing writer may retry.
pub const CONCURRENT_CREATE: &str = "error.credential.concurrent_create";

/// Reason carried when a second transitional certificate version is requested.
pub const TOO_MANY_TRANSITIONAL_VERSIONS: &str = "error.too_many_transitional_versions";

/// Errors that can occur during vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The resource does not exist, or the caller may not see it.
    #[error("{}", InvalidAccess)]
    NotFoundOrForbidden,

    /// Caller input failed validation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The request contradicts existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The caller attempted to change its own grant, or has no identity.
    #[error("invalid permission operation: {0}")]
    InvalidPermissionOperation(String),

    /// Stored data is corrupt or a component failed internally.
    #[error("internal error: {0}")]
    Fatal(String),
}

impl VaultError {
    /// Whether repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VaultError::Conflict(reason) if reason == CONCURRENT_CREATE)
    }
}

impl From<InvalidAccess> for VaultError {
    fn from(_: InvalidAccess) -> Self {
        VaultError::NotFoundOrForbidden
    }
}

impl From<CoreError> for VaultError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Validation(v) => VaultError::Validation(v),
            other => VaultError::Fatal(other.to_string()),
        }
    }
}

impl From<StoreError> for VaultError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict { name, existing } => {
                tracing::warn!(name = %name, %existing, "concurrent credential creation");
                VaultError::Conflict(CONCURRENT_CREATE.to_string())
            }
            StoreError::DuplicatePermission { .. } => {
                VaultError::Conflict("error.permission.already_exists".to_string())
            }
            other => VaultError::Fatal(other.to_string()),
        }
    }
}

impl From<PermsError> for VaultError {
    fn from(e: PermsError) -> Self {
        match e {
            PermsError::InvalidAccess(_) => VaultError::NotFoundOrForbidden,
            PermsError::InvalidPermissionOperation(reason) => {
                VaultError::InvalidPermissionOperation(reason.to_string())
            }
            PermsError::Conflict(reason) => VaultError::Conflict(reason.to_string()),
            PermsError::Validation(v) => VaultError::Validation(v),
            PermsError::Store(s) => s.into(),
        }
    }
}

impl From<PkiError> for VaultError {
    fn from(e: PkiError) -> Self {
        match e {
            PkiError::InvalidParameter { .. } => VaultError::Validation(e.into()),
            other => VaultError::Fatal(other.to_string()),
        }
    }
}

impl From<CryptoError> for VaultError {
    fn from(e: CryptoError) -> Self {
        VaultError::Fatal(e.to_string())
    }
}

impl From<tokio::task::JoinError> for VaultError {
    fn from(e: tokio::task::JoinError) -> Self {
        VaultError::Fatal(format!("background task failed: {}", e))
    }
}

/// Result type for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;
