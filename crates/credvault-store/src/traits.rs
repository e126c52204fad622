//! Store traits: the abstract interface for credential, permission and key
//! canary persistence.
//!
//! The services are storage-agnostic. Implementations include SQLite
//! (primary) and in-memory (for tests).

use std::collections::HashMap;

use async_trait::async_trait;
use credvault_core::{
    candidate_paths, Credential, CredentialId, CredentialVersionRecord, PermissionData,
    PermissionId, PermissionOperation, VersionId,
};
use credvault_crypto::{EncryptionKeyCanary, EncryptionKeyId};

use crate::error::Result;

/// A credential name with the time of its latest write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSummary {
    pub name: String,

    /// Creation time of the newest version (Unix ms).
    pub version_created_at: i64,
}

/// Persistence of credentials and their versions.
///
/// # Design Notes
///
/// - **Unique names**: saving a version whose credential name exists under a
///   different credential id fails with [`StoreError::Conflict`].
/// - **Newest first**: every list of versions is ordered by creation time,
///   newest first, with insertion order breaking ties.
/// - **Save in place**: saving a version whose id already exists replaces
///   it. Only key rotation and transitional flag changes do this.
///
/// [`StoreError::Conflict`]: crate::StoreError::Conflict
#[async_trait]
pub trait CredentialStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Credentials
    // ─────────────────────────────────────────────────────────────────────────

    async fn find_credential(&self, name: &str) -> Result<Option<Credential>>;

    async fn find_credential_by_id(&self, id: &CredentialId) -> Result<Option<Credential>>;

    /// Delete a credential and all its versions.
    ///
    /// Returns `false` if no credential had this name.
    async fn delete_credential(&self, name: &str) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Versions
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a version, creating its credential row if needed.
    async fn save(&self, record: &CredentialVersionRecord) -> Result<()>;

    async fn find_most_recent(&self, name: &str) -> Result<Option<CredentialVersionRecord>>;

    async fn find_by_uuid(&self, id: &VersionId) -> Result<Option<CredentialVersionRecord>>;

    /// All versions of `name`, newest first.
    async fn find_all_by_name(&self, name: &str) -> Result<Vec<CredentialVersionRecord>>;

    /// All versions of a credential, newest first.
    async fn find_all_by_credential_id(
        &self,
        id: &CredentialId,
    ) -> Result<Vec<CredentialVersionRecord>>;

    /// Delete one version. Returns `false` if it did not exist.
    async fn delete_version(&self, id: &VersionId) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Credentials with any certificate version signed by `ca_name`.
    async fn find_all_certificates_by_ca_name(&self, ca_name: &str) -> Result<Vec<Credential>>;

    /// Every credential whose versions are certificates.
    async fn find_all_certificates(&self) -> Result<Vec<Credential>>;

    /// Credentials whose name starts with `prefix`, newest write first.
    async fn find_names_starting_with(&self, prefix: &str) -> Result<Vec<CredentialSummary>>;

    /// Credentials whose name contains `fragment`, newest write first.
    async fn find_names_containing(&self, fragment: &str) -> Result<Vec<CredentialSummary>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Key rotation
    // ─────────────────────────────────────────────────────────────────────────

    /// Up to `limit` versions with any encrypted field under one of `key_ids`,
    /// oldest first, after skipping the first `offset` matches.
    async fn find_encrypted_with(
        &self,
        key_ids: &[EncryptionKeyId],
        offset: usize,
        limit: usize,
    ) -> Result<Vec<CredentialVersionRecord>>;

    /// Number of versions whose value is encrypted under each key.
    async fn count_by_encryption_key(&self) -> Result<HashMap<EncryptionKeyId, u64>>;
}

/// Persistence of permission rows.
///
/// At most one row exists per (path, actor).
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Insert or replace a row by uuid.
    ///
    /// Fails with [`StoreError::DuplicatePermission`] if another row holds the
    /// same (path, actor).
    ///
    /// [`StoreError::DuplicatePermission`]: crate::StoreError::DuplicatePermission
    async fn save_permission(&self, data: &PermissionData) -> Result<()>;

    async fn find_permission(&self, uuid: &PermissionId) -> Result<Option<PermissionData>>;

    async fn find_by_path_and_actor(
        &self,
        path: &str,
        actor: &str,
    ) -> Result<Option<PermissionData>>;

    /// All rows stored for exactly `path`.
    async fn find_by_path(&self, path: &str) -> Result<Vec<PermissionData>>;

    /// Rows for `actor` whose path is one of `paths`.
    async fn find_by_paths_and_actor(
        &self,
        paths: &[String],
        actor: &str,
    ) -> Result<Vec<PermissionData>>;

    async fn find_all_paths_by_actor(&self, actor: &str) -> Result<Vec<String>>;

    /// Delete one row. Returns `false` if it did not exist.
    async fn delete_permission(&self, uuid: &PermissionId) -> Result<bool>;

    /// Delete every row for exactly `path`. Returns the number removed.
    async fn delete_by_path(&self, path: &str) -> Result<usize>;
}

/// Extension trait for common permission queries.
#[async_trait]
pub trait PermissionStoreExt: PermissionStore {
    /// Whether any row for `actor` covering `credential_path` grants `op`.
    ///
    /// Considers the exact path and every wildcard that prefixes it.
    async fn has_permission(
        &self,
        actor: &str,
        credential_path: &str,
        op: PermissionOperation,
    ) -> Result<bool> {
        let rows = self
            .find_by_paths_and_actor(&candidate_paths(credential_path), actor)
            .await?;
        Ok(rows
            .iter()
            .any(|row| row.covers(credential_path) && row.has_permission(op)))
    }
}

impl<S: PermissionStore + ?Sized> PermissionStoreExt for S {}

/// Persistence of encryption key canaries.
#[async_trait]
pub trait KeyCanaryStore: Send + Sync {
    async fn find_all_canaries(&self) -> Result<Vec<EncryptionKeyCanary>>;

    async fn save_canary(&self, canary: &EncryptionKeyCanary) -> Result<()>;
}
