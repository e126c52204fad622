//! Error types for the credential type system.

use std::fmt;

use credvault_crypto::CryptoError;
use credvault_pki::PkiError;
use thiserror::Error;

/// Errors that can occur while building, decoding or reading versions.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Caller input failed validation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Encryption or decryption failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// A stored certificate or key could not be read.
    #[error("pki error: {0}")]
    Pki(#[from] PkiError),

    /// A stored record names a type this build does not know.
    #[error("unknown credential type: {0}")]
    UnknownType(String),

    /// A stored record is missing a field its type requires, or holds a
    /// value that does not decode.
    #[error("corrupt credential record: {0}")]
    Corrupt(String),

    #[error("encoding error: {0}")]
    Encoding(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// An input validation failure.
///
/// `code` is the stable, machine-readable reason; `message` is for humans.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl ValidationError {
    /// A failure described by its code alone.
    pub fn new(code: &'static str) -> Self {
        Self {
            code,
            message: describe(code).to_string(),
        }
    }

    /// A failure naming the offending input.
    pub fn with_detail(code: &'static str, detail: impl fmt::Display) -> Self {
        Self {
            code,
            message: format!("{}: {}", describe(code), detail),
        }
    }
}

impl From<PkiError> for ValidationError {
    fn from(e: PkiError) -> Self {
        match e {
            PkiError::InvalidParameter {
                code,
                detail: Some(detail),
            } => ValidationError::with_detail(code, detail),
            PkiError::InvalidParameter { code, detail: None } => ValidationError::new(code),
            PkiError::InvalidKey(_) => ValidationError::new("error.invalid_key"),
            other => ValidationError::with_detail("error.invalid_certificate_value", other),
        }
    }
}

fn describe(code: &str) -> &str {
    match code {
        "error.missing_name" => "A credential name must be provided",
        "error.credential.invalid_slash_in_name" => {
            "A credential name may not contain '//' or end with '/'"
        }
        "error.credential.invalid_character_in_name" => {
            "A credential name may only contain letters, digits and - _ . / [ ]"
        }
        "error.credential.name_too_long" => "A credential name may not exceed 1024 characters",
        "error.credential.cannot_delete_last_version" => {
            "The last version of a credential cannot be deleted"
        }
        "error.type_mismatch" => "The credential type cannot be changed by an update",
        "error.invalid_type" => "The credential type is not recognised",
        "error.missing_value" => "A non-empty value must be provided",
        "error.invalid_json_value" => "The value must be a JSON object",
        "error.invalid_password_length" => "Password length must be between 4 and 200",
        "error.excludes_all_charsets" => "At least one character set must be included",
        "error.missing_rsa_ssh_parameters" => "A public or private key must be provided",
        "error.missing_certificate" => "A certificate must be provided",
        "error.invalid_certificate_value" => "The certificate is not valid PEM",
        "error.invalid_key" => "The key is not valid",
        "error.mismatched_credential_and_private_key" => {
            "The private key does not match the certificate"
        }
        "error.certificate_was_not_signed_by_ca" => "The certificate was not signed by the CA",
        "error.missing_certificate_parameters" => "At least one subject field must be provided",
        "error.missing_signing_ca" => "A signing CA, self_sign or is_ca must be provided",
        "error.ca_and_self_sign" => "A certificate cannot be both self-signed and CA-signed",
        "error.invalid_key_length" => "Key length must be 2048, 3072 or 4096",
        "error.invalid_duration" => "Duration must be between 1 and 3650 days",
        "error.invalid_alternate_name" => "Alternative names must be IPs or domain names",
        "error.invalid_key_usage" => "Unknown key usage",
        "error.invalid_extended_key_usage" => "Unknown extended key usage",
        "error.cannot_regenerate_non_generated_certificate" => {
            "Only self-signed or CA-signed certificates can be regenerated"
        }
        "error.cannot_regenerate_non_generated_credential" => {
            "Only generated credentials can be regenerated"
        }
        "error.permission.invalid_operation" => {
            "Operations must be read, write, delete, read_acl or write_acl"
        }
        "error.permission.missing_actor" => "An actor must be provided",
        "error.permission.missing_operations" => "At least one operation must be provided",
        "error.version_not_in_credential" => "The version does not belong to this credential",
        "error.ca_missing_private_key" => "The certificate authority has no private key",
        "error.bad_request" => "The request is malformed",
        "error.invalid_mode" => "Mode must be overwrite, no-overwrite or converge",
        "error.overwrite_and_mode_both_provided" => "Only one of overwrite and mode may be given",
        "error.config.invalid" => "The configuration could not be parsed",
        "error.config.no_active_key" => "Exactly one encryption key must be active",
        "error.config.multiple_active_keys" => "Only one encryption key may be active",
        "error.config.empty_password" => "Encryption passwords may not be empty",
        "error.config.duplicate_password" => "Each encryption password may appear only once",
        "error.config.invalid_batch_size" => "The rotation batch size must be positive",
        _ => code,
    }
}

/// The one error every "find or check" returns.
///
/// It deliberately carries nothing: a missing resource and a forbidden one
/// must look identical to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Error)]
#[error("The request could not be completed because the credential does not exist or you do not have sufficient authorization.")]
pub struct InvalidAccess;
