//! Turning configured passwords into a key set.
//!
//! Each configured password is matched against the stored canaries. A
//! password that unlocks a canary gets that canary's key id back, so values
//! written under it stay readable across restarts. A password with no
//! canary gets a fresh key and a new canary.

use std::sync::Arc;

use credvault_core::ValidationError;
use credvault_crypto::{
    CryptoError, EncryptionKey, EncryptionKeyCanary, EncryptionProvider, KdfParams, KeySet,
};
use credvault_store::KeyCanaryStore;

use crate::config::EncryptionConfig;
use crate::error::Result;

/// Loads the configured keys, creating canaries for new ones.
#[derive(Clone)]
pub struct EncryptionKeySetLoader {
    canaries: Arc<dyn KeyCanaryStore>,
    provider: Arc<dyn EncryptionProvider>,
    kdf: KdfParams,
}

impl EncryptionKeySetLoader {
    pub fn new(
        canaries: Arc<dyn KeyCanaryStore>,
        provider: Arc<dyn EncryptionProvider>,
        kdf: KdfParams,
    ) -> Self {
        Self {
            canaries,
            provider,
            kdf,
        }
    }

    /// Build the key set for `config`.
    ///
    /// Key derivation runs on the blocking pool. New canaries are saved only
    /// once every key has been derived.
    pub async fn load(&self, config: &EncryptionConfig) -> Result<KeySet> {
        match config.keys.iter().filter(|k| k.active).count() {
            0 => return Err(ValidationError::new("error.config.no_active_key").into()),
            1 => {}
            _ => return Err(ValidationError::new("error.config.multiple_active_keys").into()),
        }

        let canaries = self.canaries.find_all_canaries().await?;
        let provider = self.provider.clone();
        let kdf = self.kdf;
        let passwords: Vec<(String, bool)> = config
            .keys
            .iter()
            .map(|k| (k.encryption_password.clone(), k.active))
            .collect();

        let (key_set, created) = tokio::task::spawn_blocking(move || {
            derive_keys(provider.as_ref(), &canaries, &passwords, &kdf)
        })
        .await??;

        for canary in &created {
            self.canaries.save_canary(canary).await?;
        }
        tracing::info!(
            keys = key_set.len(),
            created = created.len(),
            active = %key_set.active_id(),
            "loaded encryption keys"
        );
        Ok(key_set)
    }
}

fn derive_keys(
    provider: &dyn EncryptionProvider,
    canaries: &[EncryptionKeyCanary],
    passwords: &[(String, bool)],
    kdf: &KdfParams,
) -> credvault_crypto::Result<(KeySet, Vec<EncryptionKeyCanary>)> {
    let mut keys: Vec<EncryptionKey> = Vec::with_capacity(passwords.len());
    let mut created = Vec::new();
    let mut active = None;

    for (password, is_active) in passwords {
        let mut unlocked = None;
        for canary in canaries {
            if let Some(key) = canary.unlock(provider, password, kdf)? {
                unlocked = Some(key);
                break;
            }
        }
        let key = match unlocked {
            Some(key) => key,
            None => {
                let (key, canary) = EncryptionKeyCanary::create(provider, password, kdf)?;
                created.push(canary);
                key
            }
        };
        if *is_active {
            active = Some(key.id());
        }
        keys.push(key);
    }

    let active = active.ok_or_else(|| CryptoError::InvalidKeySet("no active key".into()))?;
    Ok((KeySet::new(keys, active)?, created))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeyConfig;
    use credvault_crypto::InternalEncryptionProvider;
    use credvault_store::MemoryStore;

    fn loader(store: Arc<MemoryStore>) -> EncryptionKeySetLoader {
        EncryptionKeySetLoader::new(
            store,
            Arc::new(InternalEncryptionProvider),
            KdfParams::insecure_for_tests(),
        )
    }

    fn config(keys: Vec<KeyConfig>) -> EncryptionConfig {
        EncryptionConfig { keys }
    }

    #[tokio::test]
    async fn test_first_load_creates_canaries() {
        let store = Arc::new(MemoryStore::new());
        let keys = loader(store.clone())
            .load(&config(vec![KeyConfig::new("one", true), KeyConfig::new("two", false)]))
            .await
            .unwrap();

        assert_eq!(keys.len(), 2);
        assert_eq!(store.find_all_canaries().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reload_reuses_key_ids() {
        let store = Arc::new(MemoryStore::new());
        let first = loader(store.clone())
            .load(&config(vec![KeyConfig::new("one", true)]))
            .await
            .unwrap();

        let second = loader(store.clone())
            .load(&config(vec![KeyConfig::new("one", false), KeyConfig::new("two", true)]))
            .await
            .unwrap();

        assert!(second.contains(&first.active_id()));
        assert_ne!(second.active_id(), first.active_id());
        assert_eq!(store.find_all_canaries().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_requires_one_active_key() {
        let store = Arc::new(MemoryStore::new());
        let err = loader(store)
            .load(&config(vec![KeyConfig::new("one", false)]))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::VaultError::Validation(v) if v.code == "error.config.no_active_key"));
    }
}
