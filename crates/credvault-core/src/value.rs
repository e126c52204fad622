//! Plaintext credential values.
//!
//! A [`CredentialValue`] only exists transiently: on the way into
//! [`crate::version::CredentialVersion::create_new`] and on the way out of
//! [`crate::version::CredentialVersion::value`]. `Debug` never prints secrets.

use std::fmt;

use credvault_pki::CertificateReader;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::types::CredentialType;

/// A certificate value.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateValue {
    /// PEM of the signing CA (or of the certificate itself when self-signed).
    pub ca: Option<String>,

    /// Name of the signing CA credential.
    pub ca_name: Option<String>,

    /// The certificate, PEM.
    pub certificate: String,

    /// The private key, PEM.
    pub private_key: Option<String>,

    /// Whether this version is the pending "next" certificate.
    pub transitional: bool,

    /// Whether the vault generated this certificate.
    #[serde(skip)]
    pub generated: bool,
}

/// An SSH or RSA key pair value.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyPairValue {
    pub public_key: Option<String>,
    pub private_key: Option<String>,
}

/// A user value.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserValue {
    pub username: Option<String>,
    pub password: String,

    /// crypt(3)-style salt; generated when absent.
    #[serde(skip_deserializing)]
    pub salt: Option<String>,
}

/// The plaintext counterpart of every version variant.
#[derive(Clone, PartialEq)]
pub enum CredentialValue {
    Password(String),
    Value(String),
    Json(serde_json::Map<String, serde_json::Value>),
    Certificate(CertificateValue),
    Ssh(KeyPairValue),
    Rsa(KeyPairValue),
    User(UserValue),
}

impl CredentialValue {
    pub fn credential_type(&self) -> CredentialType {
        match self {
            CredentialValue::Password(_) => CredentialType::Password,
            CredentialValue::Value(_) => CredentialType::Value,
            CredentialValue::Json(_) => CredentialType::Json,
            CredentialValue::Certificate(_) => CredentialType::Certificate,
            CredentialValue::Ssh(_) => CredentialType::Ssh,
            CredentialValue::Rsa(_) => CredentialType::Rsa,
            CredentialValue::User(_) => CredentialType::User,
        }
    }

    /// Decode a caller-supplied JSON value for a given type.
    pub fn from_json(
        credential_type: CredentialType,
        value: serde_json::Value,
    ) -> Result<Self, ValidationError> {
        let invalid = |e: serde_json::Error| ValidationError::with_detail("error.bad_request", e);

        let decoded = match credential_type {
            CredentialType::Password => match value {
                serde_json::Value::String(s) => CredentialValue::Password(s),
                _ => return Err(ValidationError::new("error.missing_value")),
            },
            CredentialType::Value => match value {
                serde_json::Value::String(s) => CredentialValue::Value(s),
                _ => return Err(ValidationError::new("error.missing_value")),
            },
            CredentialType::Json => match value {
                serde_json::Value::Object(map) => CredentialValue::Json(map),
                _ => return Err(ValidationError::new("error.invalid_json_value")),
            },
            CredentialType::Certificate => {
                CredentialValue::Certificate(serde_json::from_value(value).map_err(invalid)?)
            }
            CredentialType::Ssh => {
                CredentialValue::Ssh(serde_json::from_value(value).map_err(invalid)?)
            }
            CredentialType::Rsa => {
                CredentialValue::Rsa(serde_json::from_value(value).map_err(invalid)?)
            }
            CredentialType::User => {
                CredentialValue::User(serde_json::from_value(value).map_err(invalid)?)
            }
        };
        decoded.validate()?;
        Ok(decoded)
    }

    /// Check a caller-supplied value before it is stored.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            CredentialValue::Password(s) | CredentialValue::Value(s) => {
                if s.is_empty() {
                    return Err(ValidationError::new("error.missing_value"));
                }
            }
            CredentialValue::Json(_) => {}
            CredentialValue::Certificate(cert) => validate_certificate(cert)?,
            CredentialValue::Ssh(pair) | CredentialValue::Rsa(pair) => {
                let empty = |v: &Option<String>| v.as_deref().map_or(true, str::is_empty);
                if empty(&pair.public_key) && empty(&pair.private_key) {
                    return Err(ValidationError::new("error.missing_rsa_ssh_parameters"));
                }
            }
            CredentialValue::User(user) => {
                if user.password.is_empty() {
                    return Err(ValidationError::new("error.missing_value"));
                }
            }
        }
        Ok(())
    }

    /// The value as the JSON a client would see.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;

        match self {
            CredentialValue::Password(s) | CredentialValue::Value(s) => json!(s),
            CredentialValue::Json(map) => serde_json::Value::Object(map.clone()),
            CredentialValue::Certificate(cert) => json!({
                "ca": cert.ca,
                "certificate": cert.certificate,
                "private_key": cert.private_key,
            }),
            CredentialValue::Ssh(pair) | CredentialValue::Rsa(pair) => json!({
                "public_key": pair.public_key,
                "private_key": pair.private_key,
            }),
            CredentialValue::User(user) => json!({
                "username": user.username,
                "password": user.password,
            }),
        }
    }
}

fn validate_certificate(value: &CertificateValue) -> Result<(), ValidationError> {
    if value.certificate.trim().is_empty() {
        return Err(ValidationError::new("error.missing_certificate"));
    }

    let certificate = CertificateReader::from_pem(&value.certificate)
        .map_err(|_| ValidationError::new("error.invalid_certificate_value"))?;

    if let Some(private_key) = value.private_key.as_deref().filter(|k| !k.is_empty()) {
        let matches = certificate
            .matches_private_key(private_key)
            .map_err(|_| ValidationError::new("error.invalid_key"))?;
        if !matches {
            return Err(ValidationError::new(
                "error.mismatched_credential_and_private_key",
            ));
        }
    }

    if let Some(ca) = value.ca.as_deref().filter(|ca| !ca.is_empty()) {
        let ca = CertificateReader::from_pem(ca)
            .map_err(|_| ValidationError::new("error.invalid_certificate_value"))?;
        if !certificate.is_signed_by(&ca) {
            return Err(ValidationError::new(
                "error.certificate_was_not_signed_by_ca",
            ));
        }
    }

    Ok(())
}

impl fmt::Debug for CredentialValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CredentialValue::{}(<redacted>)", self.credential_type())
    }
}

impl fmt::Debug for CertificateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateValue")
            .field("ca_name", &self.ca_name)
            .field("transitional", &self.transitional)
            .field("generated", &self.generated)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for KeyPairValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPairValue")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for UserValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserValue")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credvault_pki::{CertificateGenerationParameters, CertificateSigner};
    use serde_json::json;

    #[test]
    fn test_from_json_by_type() {
        let value = CredentialValue::from_json(CredentialType::Value, json!("plain")).unwrap();
        assert_eq!(value, CredentialValue::Value("plain".into()));

        let value =
            CredentialValue::from_json(CredentialType::Json, json!({"k": [1, 2]})).unwrap();
        assert_eq!(value.credential_type(), CredentialType::Json);

        let err = CredentialValue::from_json(CredentialType::Json, json!([1, 2])).unwrap_err();
        assert_eq!(err.code, "error.invalid_json_value");

        let err = CredentialValue::from_json(CredentialType::Password, json!("")).unwrap_err();
        assert_eq!(err.code, "error.missing_value");
    }

    #[test]
    fn test_key_pair_requires_one_key() {
        let err = CredentialValue::from_json(CredentialType::Ssh, json!({})).unwrap_err();
        assert_eq!(err.code, "error.missing_rsa_ssh_parameters");

        assert!(CredentialValue::from_json(
            CredentialType::Rsa,
            json!({"public_key": "-----BEGIN PUBLIC KEY-----"})
        )
        .is_ok());
    }

    #[test]
    fn test_certificate_value_checks() {
        let signer = CertificateSigner::new();
        let ca = signer
            .generate(&CertificateGenerationParameters::self_signed_ca("ca"), None)
            .unwrap();
        let other = signer
            .generate(&CertificateGenerationParameters::self_signed_ca("other"), None)
            .unwrap();

        let good = CredentialValue::Certificate(CertificateValue {
            ca: Some(ca.certificate.clone()),
            certificate: ca.certificate.clone(),
            private_key: Some(ca.private_key.clone()),
            ..Default::default()
        });
        assert!(good.validate().is_ok());

        let mismatched = CredentialValue::Certificate(CertificateValue {
            certificate: ca.certificate.clone(),
            private_key: Some(other.private_key.clone()),
            ..Default::default()
        });
        assert_eq!(
            mismatched.validate().unwrap_err().code,
            "error.mismatched_credential_and_private_key"
        );

        let wrong_ca = CredentialValue::Certificate(CertificateValue {
            ca: Some(other.certificate.clone()),
            certificate: ca.certificate.clone(),
            ..Default::default()
        });
        assert_eq!(
            wrong_ca.validate().unwrap_err().code,
            "error.certificate_was_not_signed_by_ca"
        );

        let garbage = CredentialValue::Certificate(CertificateValue {
            certificate: "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----".into(),
            ..Default::default()
        });
        assert_eq!(
            garbage.validate().unwrap_err().code,
            "error.invalid_certificate_value"
        );
    }

    #[test]
    fn test_debug_redacts() {
        let value = CredentialValue::Password("hunter2".into());
        let debug = format!("{:?}", value);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("password"));
    }
}
