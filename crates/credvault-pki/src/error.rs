//! Error types for the PKI module.

use thiserror::Error;

/// Errors that can occur while validating, generating or reading certificates.
#[derive(Debug, Error)]
pub enum PkiError {
    /// A generation parameter failed validation.
    ///
    /// `code` is the stable reason code surfaced to callers.
    #[error("{code}{}", detail.as_ref().map(|d| format!(": {}", d)).unwrap_or_default())]
    InvalidParameter {
        code: &'static str,
        detail: Option<String>,
    },

    /// A supplied certificate could not be parsed or is malformed.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// A supplied key could not be parsed or does not fit its certificate.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Key-pair generation failed.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// The certificate builder failed to produce or sign a certificate.
    #[error("certificate signing failed: {0}")]
    Signing(String),

    /// Encoding a key or certificate failed.
    #[error("encoding error: {0}")]
    Encoding(String),
}

impl PkiError {
    /// A validation failure with no extra detail.
    pub fn invalid(code: &'static str) -> Self {
        Self::InvalidParameter { code, detail: None }
    }

    /// A validation failure naming the offending input.
    pub fn invalid_with(code: &'static str, detail: impl Into<String>) -> Self {
        Self::InvalidParameter {
            code,
            detail: Some(detail.into()),
        }
    }
}

/// Result type for PKI operations.
pub type Result<T> = std::result::Result<T, PkiError>;
