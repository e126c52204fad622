//! Re-encryption of stored versions under the active key.

use std::collections::HashSet;
use std::sync::Arc;

use credvault_core::{CredentialVersion, CredentialVersionRecord, VersionId};
use credvault_crypto::Encryptor;
use credvault_store::CredentialStore;
use tokio::sync::Mutex;

use crate::error::Result;

/// Outcome of one rotation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationReport {
    /// Versions re-encrypted under the active key.
    pub rotated: usize,
    /// Versions that could not be decoded or re-encrypted.
    pub skipped: usize,
}

/// Walks every version encrypted under an inactive key and re-encrypts it.
///
/// Runs are serialized; a second caller waits for the first to finish.
#[derive(Clone)]
pub struct KeyRotator {
    store: Arc<dyn CredentialStore>,
    encryptor: Encryptor,
    batch_size: usize,
    running: Arc<Mutex<()>>,
}

impl KeyRotator {
    pub fn new(store: Arc<dyn CredentialStore>, encryptor: Encryptor, batch_size: usize) -> Self {
        Self {
            store,
            encryptor,
            batch_size: batch_size.max(1),
            running: Arc::new(Mutex::new(())),
        }
    }

    /// Rotate in batches until every version under an inactive key has been
    /// tried once. Versions that fail are counted and left in place.
    pub async fn rotate(&self) -> Result<RotationReport> {
        let _guard = self.running.lock().await;
        self.warn_unknown_keys().await?;

        let inactive = self.encryptor.inactive_key_ids()?;
        let mut report = RotationReport::default();
        if inactive.is_empty() {
            return Ok(report);
        }

        // Skipped versions keep matching and sort before everything not yet
        // visited, so paging past them reaches the rest.
        let mut skipped: HashSet<VersionId> = HashSet::new();
        loop {
            let batch = self
                .store
                .find_encrypted_with(&inactive, skipped.len(), self.batch_size)
                .await?;
            if batch.is_empty() {
                break;
            }

            let mut visited = false;
            for record in batch {
                let id = record.id;
                if skipped.contains(&id) {
                    continue;
                }
                visited = true;
                match self.rotate_one(record).await {
                    Ok(()) => report.rotated += 1,
                    Err(e) => {
                        tracing::warn!(version = %id, error = %e, "could not rotate version");
                        skipped.insert(id);
                    }
                }
            }
            if !visited {
                break;
            }
        }

        report.skipped = skipped.len();
        tracing::info!(
            rotated = report.rotated,
            skipped = report.skipped,
            "key rotation finished"
        );
        Ok(report)
    }

    async fn rotate_one(&self, record: CredentialVersionRecord) -> Result<()> {
        let mut version = CredentialVersion::decode(record)?;
        version.rotate(&self.encryptor)?;
        self.store.save(&version.to_record()).await?;
        Ok(())
    }

    /// Log key ids that hold data but are not configured. Those versions
    /// stay unreadable until their key is configured again.
    async fn warn_unknown_keys(&self) -> Result<()> {
        let counts = self.store.count_by_encryption_key().await?;
        for (key_id, count) in counts {
            if !self.encryptor.has_key(&key_id)? {
                tracing::warn!(key = %key_id, count, "versions encrypted under an unconfigured key");
            }
        }
        Ok(())
    }
}
