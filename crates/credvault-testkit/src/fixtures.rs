//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use credvault::config::KeyConfig;
use credvault::{RequestAudit, RequestContext, Vault, VaultConfig};
use credvault_core::{PermissionData, PermissionOperation, PermissionOperations};
use credvault_crypto::{EncryptionKey, EncryptionKeyId, KdfParams, KeySet};
use credvault_perms::ActorContext;
use credvault_store::{MemoryStore, PermissionStore};

/// Actor used as the all-powerful operator in fixtures.
pub const ADMIN: &str = "uaa-user:admin";

/// A vault over a memory store with a random key and enforcement on.
pub struct TestVault {
    pub vault: Vault<MemoryStore>,
}

impl TestVault {
    /// Create a new fixture with a fresh random key.
    pub fn new() -> Self {
        Self::with_config(Self::config())
    }

    /// Create a fixture with permission enforcement off.
    pub fn unenforced() -> Self {
        Self::with_config(VaultConfig {
            enforce_permissions: false,
            ..Self::config()
        })
    }

    fn with_config(config: VaultConfig) -> Self {
        let key = EncryptionKey::generate(EncryptionKeyId::new());
        Self {
            vault: Vault::with_key_set(MemoryStore::new(), config, KeySet::single(key)),
        }
    }

    /// A configuration with one password key and cheap key derivation.
    pub fn config() -> VaultConfig {
        let mut config = VaultConfig {
            kdf: KdfParams::insecure_for_tests(),
            ..Default::default()
        };
        config.encryption.keys.push(KeyConfig::new("test-password", true));
        config
    }

    /// A request context for `actor` with its own audit record.
    pub fn ctx(&self, actor: &str) -> (RequestContext, Arc<RequestAudit>) {
        let audit = Arc::new(RequestAudit::new());
        let ctx = RequestContext::with_audit(ActorContext::new(actor), audit.clone());
        (ctx, audit)
    }

    /// A request context for [`ADMIN`].
    pub fn admin(&self) -> RequestContext {
        RequestContext::for_actor(ADMIN)
    }

    /// Write a permission row straight to the store, bypassing ACL checks.
    pub async fn grant(&self, path: &str, actor: &str, operations: &[PermissionOperation]) {
        let ops: PermissionOperations = operations.iter().copied().collect();
        let row = PermissionData::new(path, actor, ops);
        self.vault
            .store()
            .save_permission(&row)
            .await
            .expect("seeding a permission row");
    }

    /// Give [`ADMIN`] every operation on everything.
    pub async fn grant_admin_everything(&self) {
        self.grant("/*", ADMIN, &PermissionOperation::ALL).await;
    }
}

impl Default for TestVault {
    fn default() -> Self {
        Self::new()
    }
}

/// Create `count` distinct actor names.
pub fn actors(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("uaa-client:actor-{}", i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use credvault_store::PermissionStoreExt;

    #[tokio::test]
    async fn test_grant_bypasses_checks() {
        let fixture = TestVault::new();
        fixture
            .grant("/app/*", "alice", &[PermissionOperation::Read])
            .await;

        let allowed = fixture
            .vault
            .store()
            .has_permission("alice", "/app/db", PermissionOperation::Read)
            .await
            .unwrap();
        assert!(allowed);
    }

    #[test]
    fn test_actors_are_distinct() {
        let names = actors(3);
        assert_eq!(names.len(), 3);
        assert_ne!(names[0], names[1]);
    }
}
