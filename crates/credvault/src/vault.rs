//! The Vault: unified API over credentials, certificates and permissions.

use std::sync::Arc;

use credvault_core::{PermissionData, PermissionEntry, PermissionId, PermissionOperation};
use credvault_crypto::{EncryptionProvider, Encryptor, InternalEncryptionProvider, KeySet};
use credvault_perms::{PermissionChecker, PermissionService};
use credvault_store::{CredentialStore, KeyCanaryStore, PermissionStore};

use crate::certificate_service::CertificateService;
use crate::config::{EncryptionConfig, VaultConfig};
use crate::context::RequestContext;
use crate::credential_service::CredentialService;
use crate::error::Result;
use crate::key_loader::EncryptionKeySetLoader;
use crate::rotation::{KeyRotator, RotationReport};

/// A store that holds everything a vault persists.
pub trait VaultStore: CredentialStore + PermissionStore + KeyCanaryStore + 'static {}

impl<T> VaultStore for T where T: CredentialStore + PermissionStore + KeyCanaryStore + 'static {}

/// The main Vault struct.
///
/// Provides a unified API for:
/// - Setting, generating and reading credentials
/// - Certificate versions and CA-driven regeneration
/// - Managing permissions
/// - Encryption key reload and rotation
pub struct Vault<S: VaultStore> {
    /// The storage backend.
    store: Arc<S>,
    /// Configuration.
    config: VaultConfig,
    encryptor: Encryptor,
    credentials: CredentialService,
    certificates: CertificateService,
    permissions: PermissionService,
    rotator: KeyRotator,
    loader: EncryptionKeySetLoader,
}

impl<S: VaultStore> Vault<S> {
    /// Open a vault, deriving the configured encryption keys.
    ///
    /// Passwords are matched against the stored key canaries; a password
    /// seen for the first time gets a new key and canary.
    pub async fn open(store: S, config: VaultConfig) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(store);
        let provider: Arc<dyn EncryptionProvider> = Arc::new(InternalEncryptionProvider);
        let loader = EncryptionKeySetLoader::new(store.clone(), provider.clone(), config.kdf);
        let keys = loader.load(&config.encryption).await?;
        Ok(Self::assemble(store, config, Encryptor::new(provider, keys), loader))
    }

    /// Open a vault with a ready-made key set, skipping key derivation.
    pub fn with_key_set(store: S, config: VaultConfig, keys: KeySet) -> Self {
        let store = Arc::new(store);
        let provider: Arc<dyn EncryptionProvider> = Arc::new(InternalEncryptionProvider);
        let loader = EncryptionKeySetLoader::new(store.clone(), provider.clone(), config.kdf);
        Self::assemble(store, config, Encryptor::new(provider, keys), loader)
    }

    fn assemble(
        store: Arc<S>,
        config: VaultConfig,
        encryptor: Encryptor,
        loader: EncryptionKeySetLoader,
    ) -> Self {
        let checker = PermissionChecker::new(store.clone(), config.enforce_permissions);
        let permissions = PermissionService::new(checker);
        let credentials = CredentialService::new(
            store.clone(),
            permissions.clone(),
            encryptor.clone(),
            config.default_password_length,
        );
        let certificates = CertificateService::new(credentials.clone());
        let rotator = KeyRotator::new(store.clone(), encryptor.clone(), config.rotation_batch_size);

        tracing::info!(
            enforce_permissions = config.enforce_permissions,
            "vault ready"
        );
        Self {
            store,
            config,
            encryptor,
            credentials,
            certificates,
            permissions,
            rotator,
            loader,
        }
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn encryptor(&self) -> &Encryptor {
        &self.encryptor
    }

    pub fn credentials(&self) -> &CredentialService {
        &self.credentials
    }

    pub fn certificates(&self) -> &CertificateService {
        &self.certificates
    }

    pub fn permissions(&self) -> &PermissionService {
        &self.permissions
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Encryption keys
    // ─────────────────────────────────────────────────────────────────────────

    /// Re-derive keys from `encryption` and make them current.
    ///
    /// Values under keys that are no longer configured become unreadable
    /// until the key is configured again.
    pub async fn reload_encryption_keys(&self, encryption: &EncryptionConfig) -> Result<()> {
        let keys = self.loader.load(encryption).await?;
        self.encryptor.replace_key_set(keys)?;
        Ok(())
    }

    /// Re-encrypt everything still under an inactive key.
    pub async fn rotate_keys(&self) -> Result<RotationReport> {
        self.rotator.rotate().await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Permissions (audited)
    // ─────────────────────────────────────────────────────────────────────────

    /// Rows on `path`. Requires `read_acl`.
    pub async fn get_permissions(
        &self,
        ctx: &RequestContext,
        path: &str,
    ) -> Result<Vec<PermissionData>> {
        let rows = self.permissions.get_permissions(ctx.actor(), path).await?;
        for row in &rows {
            ctx.audit().add_permission(row);
        }
        Ok(rows)
    }

    /// Merge grants into existing rows. Requires `write_acl` on every path.
    pub async fn save_permissions(
        &self,
        ctx: &RequestContext,
        entries: &[PermissionEntry],
    ) -> Result<Vec<PermissionData>> {
        let rows = self.permissions.save_permissions(ctx.actor(), entries).await?;
        for row in &rows {
            ctx.audit().add_permission(row);
        }
        Ok(rows)
    }

    /// Remove the row for `actor` on `path`. Requires `write_acl`.
    pub async fn delete_permissions(
        &self,
        ctx: &RequestContext,
        path: &str,
        actor: &str,
    ) -> Result<bool> {
        let deleted = self
            .permissions
            .delete_permissions(ctx.actor(), path, actor)
            .await?;
        if deleted {
            tracing::info!(path, actor, "deleted permission row");
        }
        Ok(deleted)
    }

    /// Paths `actor` holds any row for.
    pub async fn find_all_paths_by_actor(&self, actor: &str) -> Result<Vec<String>> {
        Ok(self.permissions.find_all_paths_by_actor(actor).await?)
    }

    /// Remove `operations` from the row for `actor` on `path`.
    pub async fn revoke_operations(
        &self,
        ctx: &RequestContext,
        path: &str,
        actor: &str,
        operations: &[PermissionOperation],
    ) -> Result<Option<PermissionData>> {
        let row = self
            .permissions
            .revoke_operations(ctx.actor(), path, actor, operations)
            .await?;
        if let Some(row) = &row {
            ctx.audit().add_permission(row);
        }
        Ok(row)
    }

    /// Create one row. Requires `write_acl`.
    pub async fn save_permission(
        &self,
        ctx: &RequestContext,
        entry: &PermissionEntry,
    ) -> Result<PermissionData> {
        let row = self.permissions.save_permission(ctx.actor(), entry).await?;
        ctx.audit().add_permission(&row);
        Ok(row)
    }

    /// One row by id. Requires `read_acl`.
    pub async fn get_permission(
        &self,
        ctx: &RequestContext,
        uuid: &PermissionId,
    ) -> Result<PermissionData> {
        let row = self.permissions.get_permission(ctx.actor(), uuid).await?;
        ctx.audit().add_permission(&row);
        Ok(row)
    }

    pub async fn find_permission_by_path_and_actor(
        &self,
        ctx: &RequestContext,
        path: &str,
        actor: &str,
    ) -> Result<PermissionData> {
        let row = self
            .permissions
            .find_permission_by_path_and_actor(ctx.actor(), path, actor)
            .await?;
        ctx.audit().add_permission(&row);
        Ok(row)
    }

    /// Replace a row's operations. Requires `write_acl`.
    pub async fn put_permission(
        &self,
        ctx: &RequestContext,
        uuid: &PermissionId,
        entry: &PermissionEntry,
    ) -> Result<PermissionData> {
        let row = self
            .permissions
            .put_permission(ctx.actor(), uuid, entry)
            .await?;
        ctx.audit().add_permission(&row);
        Ok(row)
    }

    /// Replace a row's operations by id alone. Requires `write_acl`.
    pub async fn patch_permission(
        &self,
        ctx: &RequestContext,
        uuid: &PermissionId,
        operations: &[PermissionOperation],
    ) -> Result<PermissionData> {
        let row = self
            .permissions
            .patch_permission(ctx.actor(), uuid, operations)
            .await?;
        ctx.audit().add_permission(&row);
        Ok(row)
    }

    /// Delete a row by id. Requires `write_acl`.
    pub async fn delete_permission(
        &self,
        ctx: &RequestContext,
        uuid: &PermissionId,
    ) -> Result<PermissionData> {
        let row = self.permissions.delete_permission(ctx.actor(), uuid).await?;
        ctx.audit().add_permission(&row);
        Ok(row)
    }
}
