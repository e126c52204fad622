//! The encryptor: the only path between plaintext and [`EncryptedValue`].

use std::sync::{Arc, RwLock};

use crate::error::{CryptoError, Result};
use crate::key::EncryptionKeyId;
use crate::keyset::KeySet;
use crate::provider::{EncryptionProvider, InternalEncryptionProvider};
use crate::value::EncryptedValue;

/// Encrypts under the active key, decrypts under whichever key a value names.
///
/// Cheap to clone; clones share the same key set, so swapping the active key
/// with [`Encryptor::replace_key_set`] is visible to every clone.
#[derive(Clone)]
pub struct Encryptor {
    provider: Arc<dyn EncryptionProvider>,
    keys: Arc<RwLock<KeySet>>,
}

impl Encryptor {
    /// Create an encryptor over an arbitrary provider.
    pub fn new(provider: Arc<dyn EncryptionProvider>, keys: KeySet) -> Self {
        Self {
            provider,
            keys: Arc::new(RwLock::new(keys)),
        }
    }

    /// Create an encryptor backed by the internal ChaCha20-Poly1305 provider.
    pub fn internal(keys: KeySet) -> Self {
        Self::new(Arc::new(InternalEncryptionProvider), keys)
    }

    /// The id of the currently active key.
    pub fn active_key_id(&self) -> Result<EncryptionKeyId> {
        let keys = self.keys.read().map_err(|_| CryptoError::KeySetUnavailable)?;
        Ok(keys.active_id())
    }

    /// Whether a key with this id is configured.
    pub fn has_key(&self, id: &EncryptionKeyId) -> Result<bool> {
        let keys = self.keys.read().map_err(|_| CryptoError::KeySetUnavailable)?;
        Ok(keys.contains(id))
    }

    /// Ids of the configured keys that are not active.
    pub fn inactive_key_ids(&self) -> Result<Vec<EncryptionKeyId>> {
        let keys = self.keys.read().map_err(|_| CryptoError::KeySetUnavailable)?;
        Ok(keys.inactive_ids())
    }

    /// Swap in a new key set (e.g. after reloading configuration).
    pub fn replace_key_set(&self, new_keys: KeySet) -> Result<()> {
        let mut keys = self.keys.write().map_err(|_| CryptoError::KeySetUnavailable)?;
        tracing::info!(
            active = %new_keys.active_id(),
            count = new_keys.len(),
            "replacing encryption key set"
        );
        *keys = new_keys;
        Ok(())
    }

    /// Encrypt bytes under the active key.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedValue> {
        let keys = self.keys.read().map_err(|_| CryptoError::KeySetUnavailable)?;
        let key = keys.active_key()?;
        let (ciphertext, nonce) = self.provider.encrypt(key, plaintext)?;
        Ok(EncryptedValue::new(key.id(), ciphertext, nonce))
    }

    /// Encrypt an optional string. `None` yields the empty marker.
    pub fn encrypt_str(&self, plaintext: Option<&str>) -> Result<EncryptedValue> {
        match plaintext {
            Some(text) => self.encrypt(text.as_bytes()),
            None => Ok(EncryptedValue::empty()),
        }
    }

    /// Decrypt a value. The empty marker decrypts to `None`.
    pub fn decrypt(&self, value: &EncryptedValue) -> Result<Option<Vec<u8>>> {
        let Some(key_id) = value.encryption_key_id else {
            return Ok(None);
        };

        let keys = self.keys.read().map_err(|_| CryptoError::KeySetUnavailable)?;
        let key = keys.get(&key_id).ok_or(CryptoError::UnknownKey(key_id))?;
        let plaintext = self
            .provider
            .decrypt(key, &value.encrypted_value, &value.nonce)?;
        Ok(Some(plaintext))
    }

    /// Decrypt a value into a UTF-8 string.
    pub fn decrypt_str(&self, value: &EncryptedValue) -> Result<Option<String>> {
        match self.decrypt(value)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| CryptoError::InvalidUtf8),
            None => Ok(None),
        }
    }

    /// Decrypt and re-encrypt under the active key.
    ///
    /// A value already under the active key, or the empty marker, is returned
    /// unchanged.
    pub fn reencrypt(&self, value: &EncryptedValue) -> Result<EncryptedValue> {
        let active = self.active_key_id()?;
        if value.is_empty() || value.is_encrypted_with(&active) {
            return Ok(value.clone());
        }

        match self.decrypt(value)? {
            Some(plaintext) => self.encrypt(&plaintext),
            None => Ok(EncryptedValue::empty()),
        }
    }
}

impl std::fmt::Debug for Encryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encryptor")
            .field("provider", &self.provider.name())
            .finish_non_exhaustive()
    }
}
