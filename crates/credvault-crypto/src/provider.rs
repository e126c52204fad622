//! Encryption providers.
//!
//! A provider turns `(key, plaintext)` into `(ciphertext, nonce)` and back. The
//! internal provider runs ChaCha20-Poly1305 in-process; an HSM or KMS backed
//! provider implements the same trait.

use crate::error::Result;
use crate::key::{EncryptionKey, EncryptionNonce};

/// The contract an encryption backend must satisfy.
///
/// Implementations must generate a fresh nonce for every `encrypt` call and
/// must fail `decrypt` on any tampering of ciphertext or nonce.
pub trait EncryptionProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Encrypt `plaintext` under `key`, returning `(ciphertext, nonce)`.
    fn encrypt(&self, key: &EncryptionKey, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)>;

    /// Decrypt `ciphertext` produced by [`EncryptionProvider::encrypt`].
    fn decrypt(&self, key: &EncryptionKey, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>>;
}

/// In-process ChaCha20-Poly1305 provider.
#[derive(Debug, Default, Clone, Copy)]
pub struct InternalEncryptionProvider;

impl EncryptionProvider for InternalEncryptionProvider {
    fn name(&self) -> &'static str {
        "internal"
    }

    fn encrypt(&self, key: &EncryptionKey, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        let nonce = EncryptionNonce::generate();
        let ciphertext = key.encrypt(plaintext, &nonce)?;
        Ok((ciphertext, nonce.0.to_vec()))
    }

    fn decrypt(&self, key: &EncryptionKey, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>> {
        let nonce = EncryptionNonce::from_slice(nonce)?;
        key.decrypt(ciphertext, &nonce)
    }
}
