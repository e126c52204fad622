//! # credvault Crypto
//!
//! The encryption abstraction every stored secret passes through.
//!
//! ## Overview
//!
//! Plaintext goes in, an opaque [`EncryptedValue`] comes out: a
//! `{ciphertext, nonce, encryption_key_id}` triple. Nothing outside this crate
//! ever sees key material or the algorithm in use.
//!
//! ## Key Model
//!
//! - **Active key**: every [`Encryptor::encrypt`] call uses the single active key
//!   and stamps its id on the result, with a fresh random nonce.
//! - **Historical keys**: [`Encryptor::decrypt`] looks the key up by the id stored
//!   in the value, so values written under a previously-active key stay readable.
//! - **Canaries**: a known plaintext encrypted under each key, persisted next to
//!   the data, lets a restarted process map configured passwords back to stable
//!   key ids. See [`canary`].
//!
//! ## Usage
//!
//! ```rust
//! use credvault_crypto::{EncryptionKey, EncryptionKeyId, Encryptor, KeySet};
//!
//! let key = EncryptionKey::generate(EncryptionKeyId::new());
//! let encryptor = Encryptor::internal(KeySet::single(key));
//!
//! let value = encryptor.encrypt_str(Some("hunter2")).unwrap();
//! assert_eq!(encryptor.decrypt_str(&value).unwrap().as_deref(), Some("hunter2"));
//!
//! // An empty value is "never set", not a decryption attempt.
//! let empty = encryptor.encrypt_str(None).unwrap();
//! assert_eq!(encryptor.decrypt_str(&empty).unwrap(), None);
//! ```

pub mod canary;
pub mod encryptor;
pub mod error;
pub mod key;
pub mod keyset;
pub mod provider;
pub mod value;

pub use canary::{EncryptionKeyCanary, CANARY_VALUE};
pub use encryptor::Encryptor;
pub use error::{CryptoError, Result};
pub use key::{EncryptionKey, EncryptionKeyId, EncryptionNonce, KdfParams};
pub use keyset::KeySet;
pub use provider::{EncryptionProvider, InternalEncryptionProvider};
pub use value::EncryptedValue;
