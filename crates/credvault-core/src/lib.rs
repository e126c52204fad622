//! # Credvault Core
//!
//! The credential type system: names, identities, plaintext values,
//! generation parameters and immutable encrypted versions.
//!
//! This crate performs no I/O. Encryption goes through a caller-supplied
//! [`credvault_crypto::Encryptor`]; certificate parsing through
//! [`credvault_pki`].
//!
//! ## Key Types
//!
//! - [`Credential`] - A named credential; owns an ordered list of versions
//! - [`CredentialVersion`] - One immutable snapshot, a closed sum over types
//! - [`CredentialValue`] - Plaintext counterpart of a version
//! - [`GenerationParameters`] - What a generator was asked to produce
//! - [`CredentialVersionRecord`] - The flat form stores persist
//! - [`PermissionData`] - One (path, actor) grant with an operation bitmask
//!
//! ## Names
//!
//! Names are normalized to start with `/`. See [`name`].

pub mod error;
pub mod name;
pub mod params;
pub mod permission;
pub mod record;
pub mod types;
pub mod value;
pub mod version;

pub use error::{CoreError, InvalidAccess, Result, ValidationError};
pub use name::{normalize_name, validate_name, MAX_NAME_LEN};
pub use params::{
    GenerationParameters, PasswordParameters, RsaParameters, SshParameters, UserParameters,
    DEFAULT_KEY_LENGTH, DEFAULT_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH, MIN_PASSWORD_LENGTH,
};
pub use permission::{
    candidate_paths, validate_permission_path, PermissionData, PermissionEntry,
    PermissionOperation, PermissionOperations, WILDCARD,
};
pub use record::CredentialVersionRecord;
pub use types::{now_millis, Credential, CredentialId, CredentialType, PermissionId, VersionId};
pub use value::{CertificateValue, CredentialValue, KeyPairValue, UserValue};
pub use version::{
    generate_salt, CertificateVersion, CredentialVersion, KeyPairVersion, PasswordVersion,
    SimpleVersion, UserVersion, VersionMeta,
};
