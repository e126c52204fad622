//! Error types for the crypto module.

use thiserror::Error;

use crate::key::EncryptionKeyId;

/// Errors that can occur while encrypting or decrypting values.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Encryption error.
    #[error("encryption error: {0}")]
    EncryptionError(String),

    /// Decryption error (wrong key, tampered ciphertext or nonce).
    #[error("decryption error: {0}")]
    DecryptionError(String),

    /// Key derivation error.
    #[error("key derivation error: {0}")]
    KeyDerivationError(String),

    /// The value references a key that is not part of the key set.
    #[error("encryption key {0} is not configured")]
    UnknownKey(EncryptionKeyId),

    /// The key set is malformed (no active key, duplicate ids).
    #[error("invalid key set: {0}")]
    InvalidKeySet(String),

    /// The decrypted bytes are not valid UTF-8.
    #[error("decrypted value is not valid UTF-8")]
    InvalidUtf8,

    /// The key set lock was poisoned by a panicking writer.
    #[error("key set is unavailable")]
    KeySetUnavailable,
}

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
