//! Encrypted value envelope.
//!
//! Every secret field of a credential version is stored as an
//! [`EncryptedValue`]. The ciphertext is only ever decryptable with the key
//! named by `encryption_key_id`.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::key::EncryptionKeyId;

/// An encrypted value envelope.
///
/// A value with no key id is the "missing value" marker: it represents a field
/// that was never set and decrypts to `None` without touching any key.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedValue {
    /// Key the ciphertext was produced under.
    pub encryption_key_id: Option<EncryptionKeyId>,

    /// The encrypted data (includes authentication tag).
    pub encrypted_value: Bytes,

    /// Nonce used for encryption (unique per encryption).
    pub nonce: Bytes,
}

impl EncryptedValue {
    /// Build an envelope from its parts.
    pub fn new(
        encryption_key_id: EncryptionKeyId,
        encrypted_value: impl Into<Bytes>,
        nonce: impl Into<Bytes>,
    ) -> Self {
        Self {
            encryption_key_id: Some(encryption_key_id),
            encrypted_value: encrypted_value.into(),
            nonce: nonce.into(),
        }
    }

    /// The "never set" marker.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether this is the "never set" marker.
    pub fn is_empty(&self) -> bool {
        self.encryption_key_id.is_none()
    }

    /// Whether this value was encrypted under the given key.
    pub fn is_encrypted_with(&self, key_id: &EncryptionKeyId) -> bool {
        self.encryption_key_id.as_ref() == Some(key_id)
    }

    /// Get the size of the ciphertext.
    pub fn ciphertext_len(&self) -> usize {
        self.encrypted_value.len()
    }
}

impl fmt::Debug for EncryptedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedValue")
            .field("encryption_key_id", &self.encryption_key_id)
            .field("ciphertext_len", &self.encrypted_value.len())
            .field("nonce_len", &self.nonce.len())
            .finish()
    }
}
