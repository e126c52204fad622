//! Key material for the internal encryption provider.
//!
//! Keys are 256-bit ChaCha20-Poly1305 keys. Configured keys are derived from an
//! operator-supplied password with Argon2id and a per-key salt.

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::error::{CryptoError, Result};

/// Length of a ChaCha20-Poly1305 nonce in bytes.
pub const NONCE_LEN: usize = 12;

/// Length of the salt used when deriving a key from a password.
pub const SALT_LEN: usize = 16;

/// Identifier of an encryption key, stamped on every [`EncryptedValue`].
///
/// [`EncryptedValue`]: crate::EncryptedValue
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EncryptionKeyId(pub Uuid);

impl EncryptionKeyId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EncryptionKeyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EncryptionKeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKeyId({})", self.0)
    }
}

impl fmt::Display for EncryptionKeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Argon2id cost parameters for password-derived keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub m_cost: u32,
    /// Number of iterations.
    pub t_cost: u32,
    /// Degree of parallelism.
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: 19 * 1024,
            t_cost: 2,
            p_cost: 1,
        }
    }
}

impl KdfParams {
    /// Minimal parameters for tests. Never use these for real keys.
    pub const fn insecure_for_tests() -> Self {
        Self {
            m_cost: 8,
            t_cost: 1,
            p_cost: 1,
        }
    }
}

/// A 256-bit symmetric encryption key together with its id.
#[derive(Clone)]
pub struct EncryptionKey {
    id: EncryptionKeyId,
    material: Zeroizing<[u8; 32]>,
}

impl EncryptionKey {
    /// Generate a new random key.
    pub fn generate(id: EncryptionKeyId) -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::from_bytes(id, bytes)
    }

    /// Create from raw bytes.
    pub fn from_bytes(id: EncryptionKeyId, bytes: [u8; 32]) -> Self {
        Self {
            id,
            material: Zeroizing::new(bytes),
        }
    }

    /// Derive a key from a password and salt with Argon2id.
    pub fn derive(
        id: EncryptionKeyId,
        password: &str,
        salt: &[u8],
        params: &KdfParams,
    ) -> Result<Self> {
        let argon_params = Params::new(params.m_cost, params.t_cost, params.p_cost, Some(32))
            .map_err(|e| CryptoError::KeyDerivationError(e.to_string()))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

        let mut output = Zeroizing::new([0u8; 32]);
        argon2
            .hash_password_into(password.as_bytes(), salt, &mut output[..])
            .map_err(|e| CryptoError::KeyDerivationError(e.to_string()))?;

        Ok(Self { id, material: output })
    }

    /// Generate a random salt for [`EncryptionKey::derive`].
    pub fn generate_salt() -> [u8; SALT_LEN] {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        salt
    }

    /// The key id.
    pub fn id(&self) -> EncryptionKeyId {
        self.id
    }

    /// Re-label this key material with a different id.
    pub fn with_id(mut self, id: EncryptionKeyId) -> Self {
        self.id = id;
        self
    }

    /// Encrypt data with this key.
    pub fn encrypt(&self, plaintext: &[u8], nonce: &EncryptionNonce) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.material[..])
            .map_err(|e| CryptoError::EncryptionError(e.to_string()))?;

        let nonce = Nonce::from_slice(&nonce.0);
        cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CryptoError::EncryptionError(e.to_string()))
    }

    /// Decrypt data with this key.
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &EncryptionNonce) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.material[..])
            .map_err(|e| CryptoError::DecryptionError(e.to_string()))?;

        let nonce = Nonce::from_slice(&nonce.0);
        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| CryptoError::DecryptionError(e.to_string()))
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// A 96-bit nonce for ChaCha20-Poly1305.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionNonce(pub [u8; NONCE_LEN]);

impl EncryptionNonce {
    /// Generate a new random nonce.
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Parse from a byte slice of exactly [`NONCE_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; NONCE_LEN] = bytes.try_into().map_err(|_| {
            CryptoError::DecryptionError(format!(
                "invalid nonce length: expected {}, got {}",
                NONCE_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}
