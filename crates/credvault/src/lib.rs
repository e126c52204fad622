//! # Credvault
//!
//! A credential vault: typed, versioned, encrypted secrets behind per-path
//! access control.
//!
//! ## Overview
//!
//! Credvault stores and generates credentials of seven types (password,
//! value, json, user, ssh, rsa, certificate) and provides:
//!
//! - **Versions**: Every write creates a new immutable version; reads return
//!   the newest first
//! - **Generation**: Passwords, usernames, key pairs and X.509 certificates,
//!   with overwrite, no-overwrite and converge modes
//! - **Certificates**: CA-signed issuance, transitional versions for CA
//!   rotation, and bulk regeneration of everything a CA signed
//! - **Permissions**: Per-actor, per-path grants checked on every operation
//! - **Encryption**: Secret fields encrypted under password-derived keys,
//!   with key reload and background rotation
//!
//! ## Usage
//!
//! ```rust,no_run
//! use credvault::{GenerateRequest, RequestContext, Vault, VaultConfig, WriteMode};
//! use credvault::config::KeyConfig;
//! use credvault::core::CredentialType;
//! use credvault::store::SqliteStore;
//!
//! async fn example() {
//!     let mut config = VaultConfig::default();
//!     config.encryption.keys.push(KeyConfig::new("correct horse", true));
//!
//!     let store = SqliteStore::open("vault.db").unwrap();
//!     let vault = Vault::open(store, config).await.unwrap();
//!
//!     let ctx = RequestContext::for_actor("uaa-client:ci");
//!     let request =
//!         GenerateRequest::without_parameters("/ci/db-password", CredentialType::Password, WriteMode::Converge)
//!             .unwrap();
//!     let version = vault.credentials().generate(&ctx, request).await.unwrap();
//!     let value = vault.credentials().reveal(&version).unwrap();
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `credvault::core` - Credential types, values, versions and permissions
//! - `credvault::crypto` - Keys, canaries and the encryptor
//! - `credvault::pki` - Certificate and key handling
//! - `credvault::store` - Storage abstraction, in-memory and SQLite
//! - `credvault::perms` - Permission checks and grants

pub mod certificate_authority;
pub mod certificate_service;
pub mod config;
pub mod context;
pub mod credential_service;
pub mod error;
pub mod generator;
pub mod key_loader;
pub mod request;
pub mod rotation;
pub mod vault;

// Re-export component crates
pub use credvault_core as core;
pub use credvault_crypto as crypto;
pub use credvault_perms as perms;
pub use credvault_pki as pki;
pub use credvault_store as store;

// Re-export main types for convenience
pub use certificate_authority::CertificateAuthorityService;
pub use certificate_service::CertificateService;
pub use config::VaultConfig;
pub use context::{AuditSink, AuditedResource, RequestAudit, RequestContext};
pub use credential_service::CredentialService;
pub use error::{Result, VaultError};
pub use generator::CredentialGenerator;
pub use key_loader::EncryptionKeySetLoader;
pub use request::{GenerateRequest, SetRequest, WriteMode};
pub use rotation::{KeyRotator, RotationReport};
pub use vault::{Vault, VaultStore};

// Re-export commonly used core types
pub use credvault_core::{
    CertificateValue, Credential, CredentialId, CredentialType, CredentialValue,
    CredentialVersion, GenerationParameters, PermissionData, PermissionEntry, PermissionOperation,
    VersionId,
};
pub use credvault_perms::ActorContext;
