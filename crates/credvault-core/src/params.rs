//! Generation parameters for generatable credential types.
//!
//! Password and user versions store their parameters (CBOR, encrypted) so a
//! later generate call can tell whether anything changed. SSH, RSA and
//! certificate versions recover theirs from the stored key or certificate.

use credvault_pki::{validate_key_length, CertificateGenerationParameters};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, ValidationError};
use crate::types::CredentialType;

/// Default generated password length.
pub const DEFAULT_PASSWORD_LENGTH: u32 = 30;

/// Shortest accepted generated password.
pub const MIN_PASSWORD_LENGTH: u32 = 4;

/// Longest accepted generated password.
pub const MAX_PASSWORD_LENGTH: u32 = 200;

/// Default RSA modulus length for SSH and RSA keys.
pub const DEFAULT_KEY_LENGTH: u32 = 2048;

/// Password generation parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordParameters {
    pub length: u32,
    pub exclude_upper: bool,
    pub exclude_lower: bool,
    pub exclude_number: bool,
    pub include_special: bool,
    pub only_hex: bool,
}

impl Default for PasswordParameters {
    fn default() -> Self {
        Self {
            length: DEFAULT_PASSWORD_LENGTH,
            exclude_upper: false,
            exclude_lower: false,
            exclude_number: false,
            include_special: false,
            only_hex: false,
        }
    }
}

impl PasswordParameters {
    /// Default parameters with a specific length.
    pub fn with_length(length: u32) -> Self {
        Self {
            length,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&self.length) {
            return Err(ValidationError::with_detail(
                "error.invalid_password_length",
                self.length,
            ));
        }
        if !self.only_hex
            && self.exclude_upper
            && self.exclude_lower
            && self.exclude_number
            && !self.include_special
        {
            return Err(ValidationError::new("error.excludes_all_charsets"));
        }
        Ok(())
    }
}

/// SSH key generation parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshParameters {
    pub key_length: u32,
    pub ssh_comment: Option<String>,
}

impl Default for SshParameters {
    fn default() -> Self {
        Self {
            key_length: DEFAULT_KEY_LENGTH,
            ssh_comment: None,
        }
    }
}

impl SshParameters {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_key_length(self.key_length).map_err(ValidationError::from)
    }

    /// The comment, with an empty string treated as absent.
    pub fn comment(&self) -> Option<&str> {
        self.ssh_comment.as_deref().filter(|c| !c.is_empty())
    }
}

/// RSA key generation parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RsaParameters {
    pub key_length: u32,
}

impl Default for RsaParameters {
    fn default() -> Self {
        Self {
            key_length: DEFAULT_KEY_LENGTH,
        }
    }
}

impl RsaParameters {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_key_length(self.key_length).map_err(ValidationError::from)
    }
}

/// User generation parameters: an optional fixed username and the password
/// parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserParameters {
    pub username: Option<String>,
    #[serde(flatten)]
    pub password: PasswordParameters,
}

impl UserParameters {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.password.validate()
    }
}

/// Generation parameters for any generatable type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationParameters {
    Password(PasswordParameters),
    User(UserParameters),
    Ssh(SshParameters),
    Rsa(RsaParameters),
    Certificate(CertificateGenerationParameters),
}

impl GenerationParameters {
    /// The credential type these parameters generate.
    pub fn credential_type(&self) -> CredentialType {
        match self {
            GenerationParameters::Password(_) => CredentialType::Password,
            GenerationParameters::User(_) => CredentialType::User,
            GenerationParameters::Ssh(_) => CredentialType::Ssh,
            GenerationParameters::Rsa(_) => CredentialType::Rsa,
            GenerationParameters::Certificate(_) => CredentialType::Certificate,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            GenerationParameters::Password(p) => p.validate(),
            GenerationParameters::User(p) => p.validate(),
            GenerationParameters::Ssh(p) => p.validate(),
            GenerationParameters::Rsa(p) => p.validate(),
            // Certificate parameters are validated when built from a request
            GenerationParameters::Certificate(_) => Ok(()),
        }
    }
}

/// The parameter shapes that are persisted with a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum StoredParameters {
    Password(PasswordParameters),
    User(UserParameters),
}

impl StoredParameters {
    pub(crate) fn to_cbor(&self) -> Result<Vec<u8>, CoreError> {
        let mut out = Vec::new();
        ciborium::into_writer(self, &mut out).map_err(|e| CoreError::Encoding(e.to_string()))?;
        Ok(out)
    }

    pub(crate) fn from_cbor(bytes: &[u8]) -> Result<Self, CoreError> {
        ciborium::from_reader(bytes)
            .map_err(|e| CoreError::Corrupt(format!("generation parameters: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_defaults() {
        let params = PasswordParameters::default();
        assert_eq!(params.length, 30);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_password_length_bounds() {
        assert!(PasswordParameters::with_length(3).validate().is_err());
        assert!(PasswordParameters::with_length(4).validate().is_ok());
        assert!(PasswordParameters::with_length(200).validate().is_ok());
        assert!(PasswordParameters::with_length(201).validate().is_err());
    }

    #[test]
    fn test_excludes_all_charsets() {
        let params = PasswordParameters {
            exclude_upper: true,
            exclude_lower: true,
            exclude_number: true,
            ..Default::default()
        };
        assert_eq!(
            params.validate().unwrap_err().code,
            "error.excludes_all_charsets"
        );

        let hex = PasswordParameters {
            only_hex: true,
            ..params.clone()
        };
        assert!(hex.validate().is_ok());

        let special = PasswordParameters {
            include_special: true,
            ..params
        };
        assert!(special.validate().is_ok());
    }

    #[test]
    fn test_ssh_key_length() {
        let params = SshParameters {
            key_length: 1024,
            ssh_comment: None,
        };
        assert_eq!(params.validate().unwrap_err().code, "error.invalid_key_length");
    }

    #[test]
    fn test_user_parameters_deserialize_flat() {
        let params: UserParameters =
            serde_json::from_str(r#"{"username":"admin","length":12,"exclude_number":true}"#)
                .unwrap();
        assert_eq!(params.username.as_deref(), Some("admin"));
        assert_eq!(params.password.length, 12);
        assert!(params.password.exclude_number);
    }

    #[test]
    fn test_stored_parameters_cbor() {
        let stored = StoredParameters::Password(PasswordParameters::with_length(20));
        let bytes = stored.to_cbor().unwrap();
        assert_eq!(StoredParameters::from_cbor(&bytes).unwrap(), stored);
        assert!(StoredParameters::from_cbor(b"\xff\x00").is_err());
    }
}
