//! # credvault-pki
//!
//! X.509 certificate generation, signing and inspection.
//!
//! ## Overview
//!
//! This crate knows nothing about credentials, names or permissions. It turns
//! validated [`CertificateGenerationParameters`] into signed PEM certificates
//! and reads certificates back into the same parameter shape.
//!
//! ## Key Types
//!
//! - [`CertificateGenerationRequest`]: caller-supplied certificate fields
//! - [`CertificateGenerationParameters`]: the validated form
//! - [`CertificateSigner`]: self-signed and CA-signed certificate builder
//! - [`CertificateReader`]: parsed view of an existing certificate
//! - [`RsaKeyPair`]: RSA key generation plus PEM and OpenSSH encodings
//!
//! ## Usage
//!
//! ```rust,no_run
//! use credvault_pki::{validate_request, CertificateGenerationRequest, CertificateReader, CertificateSigner};
//!
//! let request = CertificateGenerationRequest {
//!     common_name: Some("root".into()),
//!     is_ca: true,
//!     ..Default::default()
//! };
//! let params = validate_request(&request).unwrap();
//! let generated = CertificateSigner::new().generate(&params, None).unwrap();
//!
//! let reader = CertificateReader::from_pem(&generated.certificate).unwrap();
//! assert!(reader.is_self_signed());
//! ```

pub mod error;
pub mod keys;
pub mod params;
pub mod reader;
pub mod signer;
pub mod validation;

pub use error::{PkiError, Result};
pub use keys::{rsa_public_key_length, ssh_fingerprint, ssh_key_length, RsaKeyPair};
pub use params::{
    AlternativeName, CertificateGenerationParameters, CertificateGenerationRequest, DnAttribute,
    ExtendedKeyUsage, KeyUsage, SubjectName, DEFAULT_DURATION_DAYS, DEFAULT_KEY_LENGTH,
    VALID_KEY_LENGTHS,
};
pub use reader::CertificateReader;
pub use signer::{key_identifier, CertificateAuthority, CertificateSigner, GeneratedCertificate};
pub use validation::{parse_alternative_name, validate_duration, validate_key_length, validate_request};
