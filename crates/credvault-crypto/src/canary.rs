//! Key canaries.
//!
//! Key ids must survive restarts, but configured keys are just passwords. A
//! canary is a known plaintext encrypted under a key and stored with the key's
//! id and salt. On startup each configured password is tried against each
//! canary; a successful decryption of [`CANARY_VALUE`] identifies the key.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::key::{EncryptionKey, EncryptionKeyId, KdfParams};
use crate::provider::EncryptionProvider;

/// The plaintext every canary encrypts.
pub const CANARY_VALUE: &str = "credvault-encryption-key-canary-v1";

/// A persisted canary for one encryption key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionKeyCanary {
    /// The key id this canary stands for.
    pub id: EncryptionKeyId,

    /// [`CANARY_VALUE`] encrypted under the key.
    pub encrypted_canary_value: Bytes,

    /// Nonce used for the canary encryption.
    pub nonce: Bytes,

    /// Salt the key was derived with.
    pub salt: Bytes,
}

impl EncryptionKeyCanary {
    /// Derive a fresh key from `password` and build its canary.
    ///
    /// Returns the key (labelled with a new id) alongside the canary to persist.
    pub fn create(
        provider: &dyn EncryptionProvider,
        password: &str,
        params: &KdfParams,
    ) -> Result<(EncryptionKey, Self)> {
        let id = EncryptionKeyId::new();
        let salt = EncryptionKey::generate_salt();
        let key = EncryptionKey::derive(id, password, &salt, params)?;
        let (ciphertext, nonce) = provider.encrypt(&key, CANARY_VALUE.as_bytes())?;

        let canary = Self {
            id,
            encrypted_canary_value: Bytes::from(ciphertext),
            nonce: Bytes::from(nonce),
            salt: Bytes::copy_from_slice(&salt),
        };
        Ok((key, canary))
    }

    /// Try to unlock this canary with `password`.
    ///
    /// Returns the derived key, labelled with the canary's id, on a match.
    pub fn unlock(
        &self,
        provider: &dyn EncryptionProvider,
        password: &str,
        params: &KdfParams,
    ) -> Result<Option<EncryptionKey>> {
        let key = EncryptionKey::derive(self.id, password, &self.salt, params)?;
        match provider.decrypt(&key, &self.encrypted_canary_value, &self.nonce) {
            Ok(plaintext) if plaintext == CANARY_VALUE.as_bytes() => Ok(Some(key)),
            Ok(_) | Err(_) => Ok(None),
        }
    }
}
