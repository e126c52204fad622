//! In-memory implementation of the store traits.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use credvault_core::{
    Credential, CredentialId, CredentialVersionRecord, PermissionData, PermissionId, VersionId,
};
use credvault_crypto::{EncryptionKeyCanary, EncryptionKeyId};

use crate::error::{Result, StoreError};
use crate::traits::{CredentialStore, CredentialSummary, KeyCanaryStore, PermissionStore};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Credentials indexed by id.
    credentials: HashMap<CredentialId, Credential>,

    /// Name index: name -> credential id.
    names: HashMap<String, CredentialId>,

    /// Versions indexed by id, with their insertion sequence.
    versions: HashMap<VersionId, StoredVersion>,

    next_seq: u64,

    permissions: HashMap<PermissionId, PermissionData>,

    canaries: Vec<EncryptionKeyCanary>,
}

struct StoredVersion {
    seq: u64,
    record: CredentialVersionRecord,
}

impl MemoryStoreInner {
    /// Versions of one credential, newest first.
    fn versions_of(&self, id: &CredentialId) -> Vec<CredentialVersionRecord> {
        let mut versions: Vec<&StoredVersion> = self
            .versions
            .values()
            .filter(|v| v.record.credential.id == *id)
            .collect();
        versions.sort_by(|a, b| {
            (b.record.created_at, b.seq).cmp(&(a.record.created_at, a.seq))
        });
        versions.into_iter().map(|v| v.record.clone()).collect()
    }

    fn versions_of_name(&self, name: &str) -> Vec<CredentialVersionRecord> {
        match self.names.get(name) {
            Some(id) => self.versions_of(id),
            None => Vec::new(),
        }
    }

    fn summaries<F>(&self, matches: F) -> Vec<CredentialSummary>
    where
        F: Fn(&str) -> bool,
    {
        let mut summaries: Vec<CredentialSummary> = self
            .credentials
            .values()
            .filter(|c| matches(&c.name))
            .filter_map(|c| {
                self.versions_of(&c.id).first().map(|latest| CredentialSummary {
                    name: c.name.clone(),
                    version_created_at: latest.created_at,
                })
            })
            .collect();
        summaries.sort_by(|a, b| {
            b.version_created_at
                .cmp(&a.version_created_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        summaries
    }

    fn certificate_credentials<F>(&self, matches: F) -> Vec<Credential>
    where
        F: Fn(&CredentialVersionRecord) -> bool,
    {
        let mut ids: Vec<CredentialId> = self
            .versions
            .values()
            .map(|v| &v.record)
            .filter(|r| r.type_tag == "certificate" && matches(r))
            .map(|r| r.credential.id)
            .collect();
        ids.sort();
        ids.dedup();

        let mut credentials: Vec<Credential> = ids
            .iter()
            .filter_map(|id| self.credentials.get(id).cloned())
            .collect();
        credentials.sort_by(|a, b| a.name.cmp(&b.name));
        credentials
    }
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_credential(&self, name: &str) -> Result<Option<Credential>> {
        let inner = self.read()?;
        Ok(inner
            .names
            .get(name)
            .and_then(|id| inner.credentials.get(id))
            .cloned())
    }

    async fn find_credential_by_id(&self, id: &CredentialId) -> Result<Option<Credential>> {
        let inner = self.read()?;
        Ok(inner.credentials.get(id).cloned())
    }

    async fn delete_credential(&self, name: &str) -> Result<bool> {
        let mut inner = self.write()?;
        let Some(id) = inner.names.remove(name) else {
            return Ok(false);
        };
        inner.credentials.remove(&id);
        inner.versions.retain(|_, v| v.record.credential.id != id);
        Ok(true)
    }

    async fn save(&self, record: &CredentialVersionRecord) -> Result<()> {
        let mut inner = self.write()?;
        let credential = &record.credential;

        // Check for a name collision with a different credential
        if let Some(&existing) = inner.names.get(&credential.name) {
            if existing != credential.id {
                return Err(StoreError::Conflict {
                    name: credential.name.clone(),
                    existing,
                });
            }
        }
        if let Some(stored) = inner.credentials.get(&credential.id) {
            if stored.name != credential.name {
                return Err(StoreError::InvalidData(format!(
                    "credential {} is named {}, not {}",
                    credential.id, stored.name, credential.name
                )));
            }
        }

        inner.credentials.insert(credential.id, credential.clone());
        inner.names.insert(credential.name.clone(), credential.id);

        // Saving an existing version replaces it in place
        let seq = match inner.versions.get(&record.id) {
            Some(existing) => existing.seq,
            None => {
                inner.next_seq += 1;
                inner.next_seq
            }
        };
        inner.versions.insert(
            record.id,
            StoredVersion {
                seq,
                record: record.clone(),
            },
        );
        Ok(())
    }

    async fn find_most_recent(&self, name: &str) -> Result<Option<CredentialVersionRecord>> {
        let inner = self.read()?;
        Ok(inner.versions_of_name(name).into_iter().next())
    }

    async fn find_by_uuid(&self, id: &VersionId) -> Result<Option<CredentialVersionRecord>> {
        let inner = self.read()?;
        Ok(inner.versions.get(id).map(|v| v.record.clone()))
    }

    async fn find_all_by_name(&self, name: &str) -> Result<Vec<CredentialVersionRecord>> {
        let inner = self.read()?;
        Ok(inner.versions_of_name(name))
    }

    async fn find_all_by_credential_id(
        &self,
        id: &CredentialId,
    ) -> Result<Vec<CredentialVersionRecord>> {
        let inner = self.read()?;
        Ok(inner.versions_of(id))
    }

    async fn delete_version(&self, id: &VersionId) -> Result<bool> {
        let mut inner = self.write()?;
        Ok(inner.versions.remove(id).is_some())
    }

    async fn find_all_certificates_by_ca_name(&self, ca_name: &str) -> Result<Vec<Credential>> {
        let inner = self.read()?;
        Ok(inner.certificate_credentials(|r| r.ca_name.as_deref() == Some(ca_name)))
    }

    async fn find_all_certificates(&self) -> Result<Vec<Credential>> {
        let inner = self.read()?;
        Ok(inner.certificate_credentials(|_| true))
    }

    async fn find_names_starting_with(&self, prefix: &str) -> Result<Vec<CredentialSummary>> {
        let inner = self.read()?;
        Ok(inner.summaries(|name| name.starts_with(prefix)))
    }

    async fn find_names_containing(&self, fragment: &str) -> Result<Vec<CredentialSummary>> {
        let inner = self.read()?;
        Ok(inner.summaries(|name| name.contains(fragment)))
    }

    async fn find_encrypted_with(
        &self,
        key_ids: &[EncryptionKeyId],
        offset: usize,
        limit: usize,
    ) -> Result<Vec<CredentialVersionRecord>> {
        let inner = self.read()?;
        let mut matching: Vec<&StoredVersion> = inner
            .versions
            .values()
            .filter(|v| {
                v.record
                    .encryption_key_ids()
                    .iter()
                    .any(|id| key_ids.contains(id))
            })
            .collect();
        matching.sort_by_key(|v| v.seq);
        Ok(matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|v| v.record.clone())
            .collect())
    }

    async fn count_by_encryption_key(&self) -> Result<HashMap<EncryptionKeyId, u64>> {
        let inner = self.read()?;
        let mut counts = HashMap::new();
        for id in inner
            .versions
            .values()
            .filter_map(|v| v.record.encrypted_value.encryption_key_id)
        {
            *counts.entry(id).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn save_permission(&self, data: &PermissionData) -> Result<()> {
        let mut inner = self.write()?;

        let duplicate = inner
            .permissions
            .values()
            .any(|p| p.uuid != data.uuid && p.path == data.path && p.actor == data.actor);
        if duplicate {
            return Err(StoreError::DuplicatePermission {
                path: data.path.clone(),
                actor: data.actor.clone(),
            });
        }

        inner.permissions.insert(data.uuid, data.clone());
        Ok(())
    }

    async fn find_permission(&self, uuid: &PermissionId) -> Result<Option<PermissionData>> {
        let inner = self.read()?;
        Ok(inner.permissions.get(uuid).cloned())
    }

    async fn find_by_path_and_actor(
        &self,
        path: &str,
        actor: &str,
    ) -> Result<Option<PermissionData>> {
        let inner = self.read()?;
        Ok(inner
            .permissions
            .values()
            .find(|p| p.path == path && p.actor == actor)
            .cloned())
    }

    async fn find_by_path(&self, path: &str) -> Result<Vec<PermissionData>> {
        let inner = self.read()?;
        let mut rows: Vec<PermissionData> = inner
            .permissions
            .values()
            .filter(|p| p.path == path)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.actor.cmp(&b.actor));
        Ok(rows)
    }

    async fn find_by_paths_and_actor(
        &self,
        paths: &[String],
        actor: &str,
    ) -> Result<Vec<PermissionData>> {
        let inner = self.read()?;
        Ok(inner
            .permissions
            .values()
            .filter(|p| p.actor == actor && paths.contains(&p.path))
            .cloned()
            .collect())
    }

    async fn find_all_paths_by_actor(&self, actor: &str) -> Result<Vec<String>> {
        let inner = self.read()?;
        let mut paths: Vec<String> = inner
            .permissions
            .values()
            .filter(|p| p.actor == actor)
            .map(|p| p.path.clone())
            .collect();
        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    async fn delete_permission(&self, uuid: &PermissionId) -> Result<bool> {
        let mut inner = self.write()?;
        Ok(inner.permissions.remove(uuid).is_some())
    }

    async fn delete_by_path(&self, path: &str) -> Result<usize> {
        let mut inner = self.write()?;
        let before = inner.permissions.len();
        inner.permissions.retain(|_, p| p.path != path);
        Ok(before - inner.permissions.len())
    }
}

#[async_trait]
impl KeyCanaryStore for MemoryStore {
    async fn find_all_canaries(&self) -> Result<Vec<EncryptionKeyCanary>> {
        let inner = self.read()?;
        Ok(inner.canaries.clone())
    }

    async fn save_canary(&self, canary: &EncryptionKeyCanary) -> Result<()> {
        let mut inner = self.write()?;
        match inner.canaries.iter_mut().find(|c| c.id == canary.id) {
            Some(existing) => *existing = canary.clone(),
            None => inner.canaries.push(canary.clone()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::PermissionStoreExt;
    use credvault_core::{PermissionOperation, PermissionOperations};
    use credvault_crypto::EncryptedValue;

    fn record(credential: &Credential, type_tag: &str, created_at: i64) -> CredentialVersionRecord {
        CredentialVersionRecord::empty(credential.clone(), type_tag, created_at)
    }

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryStore::new();
        let credential = Credential::new("/app/pw");
        let first = record(&credential, "password", 1);
        let second = record(&credential, "password", 2);

        store.save(&first).await.unwrap();
        store.save(&second).await.unwrap();

        let latest = store.find_most_recent("/app/pw").await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);

        let all = store.find_all_by_name("/app/pw").await.unwrap();
        assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), vec![second.id, first.id]);

        assert!(store.find_most_recent("/missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_same_timestamp_orders_by_insertion() {
        let store = MemoryStore::new();
        let credential = Credential::new("/a");
        let first = record(&credential, "value", 5);
        let second = record(&credential, "value", 5);
        store.save(&first).await.unwrap();
        store.save(&second).await.unwrap();

        let latest = store.find_most_recent("/a").await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
    }

    #[tokio::test]
    async fn test_name_conflict() {
        let store = MemoryStore::new();
        store
            .save(&record(&Credential::new("/dup"), "value", 1))
            .await
            .unwrap();

        let err = store
            .save(&record(&Credential::new("/dup"), "value", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { name, .. } if name == "/dup"));
    }

    #[tokio::test]
    async fn test_save_in_place() {
        let store = MemoryStore::new();
        let credential = Credential::new("/cert");
        let mut version = record(&credential, "certificate", 1);
        let newer = record(&credential, "certificate", 2);
        store.save(&version).await.unwrap();
        store.save(&newer).await.unwrap();

        version.transitional = true;
        store.save(&version).await.unwrap();

        let all = store.find_all_by_name("/cert").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, newer.id);
        assert!(all[1].transitional);
    }

    #[tokio::test]
    async fn test_delete_credential_cascades_versions() {
        let store = MemoryStore::new();
        let credential = Credential::new("/gone");
        let version = record(&credential, "value", 1);
        store.save(&version).await.unwrap();

        assert!(store.delete_credential("/gone").await.unwrap());
        assert!(!store.delete_credential("/gone").await.unwrap());
        assert!(store.find_by_uuid(&version.id).await.unwrap().is_none());
        assert!(store.find_credential("/gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_names() {
        let store = MemoryStore::new();
        store.save(&record(&Credential::new("/org/a"), "value", 1)).await.unwrap();
        store.save(&record(&Credential::new("/org/b"), "value", 3)).await.unwrap();
        store.save(&record(&Credential::new("/other/org"), "value", 2)).await.unwrap();

        let names: Vec<String> = store
            .find_names_starting_with("/org/")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["/org/b", "/org/a"]);

        let containing = store.find_names_containing("org").await.unwrap();
        assert_eq!(containing.len(), 3);
        assert_eq!(containing[0].name, "/org/b");
    }

    #[tokio::test]
    async fn test_certificates_by_ca_name() {
        let store = MemoryStore::new();
        let mut leaf = record(&Credential::new("/leaf"), "certificate", 1);
        leaf.ca_name = Some("/ca".into());
        store.save(&leaf).await.unwrap();
        store.save(&record(&Credential::new("/ca"), "certificate", 1)).await.unwrap();
        store.save(&record(&Credential::new("/pw"), "password", 1)).await.unwrap();

        let signed = store.find_all_certificates_by_ca_name("/ca").await.unwrap();
        assert_eq!(signed.len(), 1);
        assert_eq!(signed[0].name, "/leaf");

        assert_eq!(store.find_all_certificates().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_find_encrypted_with() {
        let store = MemoryStore::new();
        let old = EncryptionKeyId::new();
        let active = EncryptionKeyId::new();

        for (i, key) in [old, active, old].into_iter().enumerate() {
            let mut r = record(&Credential::new(&format!("/k{}", i)), "value", i as i64);
            r.encrypted_value = EncryptedValue::new(key, vec![1], vec![0; 12]);
            store.save(&r).await.unwrap();
        }

        assert_eq!(store.find_encrypted_with(&[old], 0, 10).await.unwrap().len(), 2);
        assert_eq!(store.find_encrypted_with(&[old], 0, 1).await.unwrap().len(), 1);

        let second = store.find_encrypted_with(&[old], 1, 10).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].credential.name, "/k2");
        assert!(store.find_encrypted_with(&[old], 2, 10).await.unwrap().is_empty());

        let counts = store.count_by_encryption_key().await.unwrap();
        assert_eq!(counts.get(&old), Some(&2));
        assert_eq!(counts.get(&active), Some(&1));
    }

    #[tokio::test]
    async fn test_permission_rows() {
        let store = MemoryStore::new();
        let ops: PermissionOperations = [PermissionOperation::Read].into_iter().collect();
        let row = PermissionData::new("/org/*", "alice", ops);
        store.save_permission(&row).await.unwrap();

        assert!(store
            .has_permission("alice", "/org/app/pw", PermissionOperation::Read)
            .await
            .unwrap());
        assert!(!store
            .has_permission("alice", "/org/app/pw", PermissionOperation::Write)
            .await
            .unwrap());
        assert!(!store
            .has_permission("bob", "/org/app/pw", PermissionOperation::Read)
            .await
            .unwrap());

        let dup = PermissionData::new("/org/*", "alice", ops);
        assert!(matches!(
            store.save_permission(&dup).await,
            Err(StoreError::DuplicatePermission { .. })
        ));

        assert_eq!(store.find_all_paths_by_actor("alice").await.unwrap(), vec!["/org/*"]);
        assert_eq!(store.delete_by_path("/org/*").await.unwrap(), 1);
        assert!(store.find_permission(&row.uuid).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_canaries() {
        let store = MemoryStore::new();
        let canary = EncryptionKeyCanary {
            id: EncryptionKeyId::new(),
            encrypted_canary_value: vec![1, 2].into(),
            nonce: vec![0; 12].into(),
            salt: vec![9; 16].into(),
        };
        store.save_canary(&canary).await.unwrap();
        store.save_canary(&canary).await.unwrap();
        assert_eq!(store.find_all_canaries().await.unwrap(), vec![canary]);
    }
}
