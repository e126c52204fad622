//! Credential versions: the closed sum type over every credential kind.
//!
//! ## Overview
//!
//! A [`CredentialVersion`] is one immutable snapshot of a credential. Secret
//! fields are held only as [`EncryptedValue`]s; plaintext comes out through
//! [`CredentialVersion::value`] and nowhere else.
//!
//! ## Key Operations
//!
//! - [`CredentialVersion::decode`]: stored record to typed version
//! - [`CredentialVersion::create_new`]: plaintext value to a new version,
//!   inheriting the credential identity of a previous version when given
//! - [`CredentialVersion::matches_generation_parameters`]: idempotent
//!   regeneration check
//! - [`CredentialVersion::rotate`]: re-encrypt under the active key

use credvault_crypto::{EncryptedValue, Encryptor};
use credvault_pki::{rsa_public_key_length, ssh_key_length, CertificateReader};
use rand::Rng;

use crate::error::{CoreError, Result, ValidationError};
use crate::params::{
    GenerationParameters, RsaParameters, SshParameters, StoredParameters,
    UserParameters,
};
use crate::record::CredentialVersionRecord;
use crate::types::{now_millis, Credential, CredentialType, VersionId};
use crate::value::{CertificateValue, CredentialValue, KeyPairValue, UserValue};

/// Characters a crypt(3) salt is drawn from.
const SALT_CHARS: &[u8] = b"./0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Number of random characters after the `$6$` prefix.
const SALT_LEN: usize = 16;

/// Fields every version carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMeta {
    pub id: VersionId,
    pub credential: Credential,

    /// Creation time, Unix milliseconds.
    pub created_at: i64,
}

impl VersionMeta {
    fn from_record(record: &CredentialVersionRecord) -> Self {
        Self {
            id: record.id,
            credential: record.credential.clone(),
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordVersion {
    pub meta: VersionMeta,
    pub encrypted_value: EncryptedValue,
    pub encrypted_generation_parameters: EncryptedValue,
}

/// A `value` or `json` version: one encrypted string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleVersion {
    pub meta: VersionMeta,
    pub encrypted_value: EncryptedValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateVersion {
    pub meta: VersionMeta,
    pub ca: Option<String>,
    pub ca_name: Option<String>,
    pub certificate: String,
    pub encrypted_private_key: EncryptedValue,
    pub transitional: bool,
    pub certificate_authority: bool,
    pub self_signed: bool,
    pub generated: bool,

    /// Certificate `notAfter`, Unix milliseconds.
    pub expiry_date: Option<i64>,
}

impl CertificateVersion {
    /// Parse the stored certificate.
    ///
    /// Certificates are validated on write, so a failure here means the
    /// store is corrupt.
    pub fn reader(&self) -> Result<CertificateReader> {
        CertificateReader::from_pem(&self.certificate).map_err(|e| {
            CoreError::Corrupt(format!(
                "stored certificate {} does not parse: {}",
                self.meta.id, e
            ))
        })
    }

    pub fn private_key(&self, encryptor: &Encryptor) -> Result<Option<String>> {
        Ok(encryptor.decrypt_str(&self.encrypted_private_key)?)
    }
}

/// An `ssh` or `rsa` version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPairVersion {
    pub meta: VersionMeta,
    pub public_key: Option<String>,
    pub encrypted_private_key: EncryptedValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserVersion {
    pub meta: VersionMeta,
    pub username: Option<String>,
    pub encrypted_password: EncryptedValue,
    pub salt: String,
    pub encrypted_generation_parameters: EncryptedValue,
}

/// One immutable snapshot of a credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialVersion {
    Password(PasswordVersion),
    Value(SimpleVersion),
    Json(SimpleVersion),
    Certificate(CertificateVersion),
    Ssh(KeyPairVersion),
    Rsa(KeyPairVersion),
    User(UserVersion),
}

impl CredentialVersion {
    // ─────────────────────────────────────────────────────────────────────────
    // Identity
    // ─────────────────────────────────────────────────────────────────────────

    pub fn meta(&self) -> &VersionMeta {
        match self {
            CredentialVersion::Password(v) => &v.meta,
            CredentialVersion::Value(v) | CredentialVersion::Json(v) => &v.meta,
            CredentialVersion::Certificate(v) => &v.meta,
            CredentialVersion::Ssh(v) | CredentialVersion::Rsa(v) => &v.meta,
            CredentialVersion::User(v) => &v.meta,
        }
    }

    pub fn id(&self) -> VersionId {
        self.meta().id
    }

    pub fn credential(&self) -> &Credential {
        &self.meta().credential
    }

    pub fn name(&self) -> &str {
        &self.meta().credential.name
    }

    pub fn created_at(&self) -> i64 {
        self.meta().created_at
    }

    pub fn credential_type(&self) -> CredentialType {
        match self {
            CredentialVersion::Password(_) => CredentialType::Password,
            CredentialVersion::Value(_) => CredentialType::Value,
            CredentialVersion::Json(_) => CredentialType::Json,
            CredentialVersion::Certificate(_) => CredentialType::Certificate,
            CredentialVersion::Ssh(_) => CredentialType::Ssh,
            CredentialVersion::Rsa(_) => CredentialType::Rsa,
            CredentialVersion::User(_) => CredentialType::User,
        }
    }

    pub fn as_certificate(&self) -> Option<&CertificateVersion> {
        match self {
            CredentialVersion::Certificate(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_certificate_mut(&mut self) -> Option<&mut CertificateVersion> {
        match self {
            CredentialVersion::Certificate(v) => Some(v),
            _ => None,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Stored form
    // ─────────────────────────────────────────────────────────────────────────

    /// Build a typed version from a stored record.
    ///
    /// An unknown discriminator or a missing required field is fatal: stores
    /// only ever hold records this module wrote.
    pub fn decode(record: CredentialVersionRecord) -> Result<Self> {
        let credential_type: CredentialType = record
            .type_tag
            .parse()
            .map_err(|_| CoreError::UnknownType(record.type_tag.clone()))?;
        let meta = VersionMeta::from_record(&record);

        let version = match credential_type {
            CredentialType::Password => CredentialVersion::Password(PasswordVersion {
                meta,
                encrypted_value: record.encrypted_value,
                encrypted_generation_parameters: record.encrypted_generation_parameters,
            }),
            CredentialType::Value => CredentialVersion::Value(SimpleVersion {
                meta,
                encrypted_value: record.encrypted_value,
            }),
            CredentialType::Json => CredentialVersion::Json(SimpleVersion {
                meta,
                encrypted_value: record.encrypted_value,
            }),
            CredentialType::Certificate => {
                let certificate = record.certificate.ok_or_else(|| {
                    CoreError::Corrupt(format!("certificate version {} has no certificate", meta.id))
                })?;
                CredentialVersion::Certificate(CertificateVersion {
                    meta,
                    ca: record.ca,
                    ca_name: record.ca_name,
                    certificate,
                    encrypted_private_key: record.encrypted_value,
                    transitional: record.transitional,
                    certificate_authority: record.certificate_authority,
                    self_signed: record.self_signed,
                    generated: record.generated,
                    expiry_date: record.expiry_date,
                })
            }
            CredentialType::Ssh => CredentialVersion::Ssh(KeyPairVersion {
                meta,
                public_key: record.public_key,
                encrypted_private_key: record.encrypted_value,
            }),
            CredentialType::Rsa => CredentialVersion::Rsa(KeyPairVersion {
                meta,
                public_key: record.public_key,
                encrypted_private_key: record.encrypted_value,
            }),
            CredentialType::User => CredentialVersion::User(UserVersion {
                meta,
                username: record.username,
                encrypted_password: record.encrypted_value,
                salt: record.salt.unwrap_or_default(),
                encrypted_generation_parameters: record.encrypted_generation_parameters,
            }),
        };
        Ok(version)
    }

    /// Flatten into the stored form.
    pub fn to_record(&self) -> CredentialVersionRecord {
        let meta = self.meta();
        let mut record = CredentialVersionRecord::empty(
            meta.credential.clone(),
            self.credential_type().as_str(),
            meta.created_at,
        );
        record.id = meta.id;

        match self {
            CredentialVersion::Password(v) => {
                record.encrypted_value = v.encrypted_value.clone();
                record.encrypted_generation_parameters = v.encrypted_generation_parameters.clone();
            }
            CredentialVersion::Value(v) | CredentialVersion::Json(v) => {
                record.encrypted_value = v.encrypted_value.clone();
            }
            CredentialVersion::Certificate(v) => {
                record.encrypted_value = v.encrypted_private_key.clone();
                record.certificate = Some(v.certificate.clone());
                record.ca = v.ca.clone();
                record.ca_name = v.ca_name.clone();
                record.transitional = v.transitional;
                record.certificate_authority = v.certificate_authority;
                record.self_signed = v.self_signed;
                record.generated = v.generated;
                record.expiry_date = v.expiry_date;
            }
            CredentialVersion::Ssh(v) | CredentialVersion::Rsa(v) => {
                record.encrypted_value = v.encrypted_private_key.clone();
                record.public_key = v.public_key.clone();
            }
            CredentialVersion::User(v) => {
                record.encrypted_value = v.encrypted_password.clone();
                record.encrypted_generation_parameters = v.encrypted_generation_parameters.clone();
                record.username = v.username.clone();
                record.salt = Some(v.salt.clone());
            }
        }
        record
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Construction
    // ─────────────────────────────────────────────────────────────────────────

    /// Build a new version of `name` holding `value`.
    ///
    /// With a `previous` version the new one shares its credential identity;
    /// the previous version must be of the same type. Without one, a new
    /// credential is created. `params`, when given, are the parameters the
    /// value was generated with.
    pub fn create_new(
        name: &str,
        previous: Option<&CredentialVersion>,
        value: CredentialValue,
        params: Option<&GenerationParameters>,
        encryptor: &Encryptor,
    ) -> Result<Self> {
        let credential_type = value.credential_type();
        let credential = match previous {
            Some(previous) if previous.credential_type() != credential_type => {
                return Err(ValidationError::new("error.type_mismatch").into());
            }
            Some(previous) => previous.credential().clone(),
            None => Credential::new(name),
        };
        let meta = VersionMeta {
            id: VersionId::new(),
            credential,
            created_at: now_millis(),
        };

        let version = match value {
            CredentialValue::Password(password) => {
                let stored = match params {
                    Some(GenerationParameters::Password(p)) => {
                        Some(StoredParameters::Password(p.clone()))
                    }
                    _ => None,
                };
                CredentialVersion::Password(PasswordVersion {
                    meta,
                    encrypted_value: encryptor.encrypt_str(Some(&password))?,
                    encrypted_generation_parameters: encrypt_parameters(stored, encryptor)?,
                })
            }
            CredentialValue::Value(text) => CredentialVersion::Value(SimpleVersion {
                meta,
                encrypted_value: encryptor.encrypt_str(Some(&text))?,
            }),
            CredentialValue::Json(map) => {
                let json = serde_json::to_string(&map)
                    .map_err(|e| CoreError::Encoding(e.to_string()))?;
                CredentialVersion::Json(SimpleVersion {
                    meta,
                    encrypted_value: encryptor.encrypt_str(Some(&json))?,
                })
            }
            CredentialValue::Certificate(cert) => {
                CredentialVersion::Certificate(new_certificate_version(meta, cert, encryptor)?)
            }
            CredentialValue::Ssh(pair) => {
                CredentialVersion::Ssh(new_key_pair_version(meta, pair, encryptor)?)
            }
            CredentialValue::Rsa(pair) => {
                CredentialVersion::Rsa(new_key_pair_version(meta, pair, encryptor)?)
            }
            CredentialValue::User(user) => {
                let stored = match params {
                    Some(GenerationParameters::User(p)) => Some(StoredParameters::User(p.clone())),
                    _ => None,
                };
                CredentialVersion::User(UserVersion {
                    meta,
                    username: user.username,
                    encrypted_password: encryptor.encrypt_str(Some(&user.password))?,
                    salt: user.salt.unwrap_or_else(generate_salt),
                    encrypted_generation_parameters: encrypt_parameters(stored, encryptor)?,
                })
            }
        };
        Ok(version)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reading
    // ─────────────────────────────────────────────────────────────────────────

    /// Decrypt into the plaintext value.
    pub fn value(&self, encryptor: &Encryptor) -> Result<CredentialValue> {
        let value = match self {
            CredentialVersion::Password(v) => {
                CredentialValue::Password(decrypt_required(encryptor, &v.encrypted_value, &v.meta)?)
            }
            CredentialVersion::Value(v) => {
                CredentialValue::Value(decrypt_required(encryptor, &v.encrypted_value, &v.meta)?)
            }
            CredentialVersion::Json(v) => {
                let json = decrypt_required(encryptor, &v.encrypted_value, &v.meta)?;
                let map = serde_json::from_str(&json).map_err(|e| {
                    CoreError::Corrupt(format!("json version {} does not parse: {}", v.meta.id, e))
                })?;
                CredentialValue::Json(map)
            }
            CredentialVersion::Certificate(v) => CredentialValue::Certificate(CertificateValue {
                ca: v.ca.clone(),
                ca_name: v.ca_name.clone(),
                certificate: v.certificate.clone(),
                private_key: v.private_key(encryptor)?,
                transitional: v.transitional,
                generated: v.generated,
            }),
            CredentialVersion::Ssh(v) => CredentialValue::Ssh(KeyPairValue {
                public_key: v.public_key.clone(),
                private_key: encryptor.decrypt_str(&v.encrypted_private_key)?,
            }),
            CredentialVersion::Rsa(v) => CredentialValue::Rsa(KeyPairValue {
                public_key: v.public_key.clone(),
                private_key: encryptor.decrypt_str(&v.encrypted_private_key)?,
            }),
            CredentialVersion::User(v) => CredentialValue::User(UserValue {
                username: v.username.clone(),
                password: decrypt_required(encryptor, &v.encrypted_password, &v.meta)?,
                salt: Some(v.salt.clone()),
            }),
        };
        Ok(value)
    }

    /// The parameters this version was generated with, if recoverable.
    ///
    /// Password and user versions return what was stored; SSH, RSA and
    /// certificate versions reconstruct from the key or certificate. Value
    /// and JSON versions have none.
    pub fn generation_parameters(
        &self,
        encryptor: &Encryptor,
    ) -> Result<Option<GenerationParameters>> {
        let params = match self {
            CredentialVersion::Password(v) => {
                match decrypt_parameters(encryptor, &v.encrypted_generation_parameters)? {
                    Some(StoredParameters::Password(p)) => Some(GenerationParameters::Password(p)),
                    _ => None,
                }
            }
            CredentialVersion::User(v) => {
                match decrypt_parameters(encryptor, &v.encrypted_generation_parameters)? {
                    Some(StoredParameters::User(mut p)) => {
                        p.username = v.username.clone();
                        Some(GenerationParameters::User(p))
                    }
                    Some(StoredParameters::Password(password)) => {
                        Some(GenerationParameters::User(UserParameters {
                            username: v.username.clone(),
                            password,
                        }))
                    }
                    None => None,
                }
            }
            CredentialVersion::Ssh(v) => match v.public_key.as_deref() {
                Some(public_key) => Some(GenerationParameters::Ssh(SshParameters {
                    key_length: ssh_key_length(public_key)?,
                    ssh_comment: ssh_comment(public_key),
                })),
                None => None,
            },
            CredentialVersion::Rsa(v) => match v.public_key.as_deref() {
                Some(public_key) => Some(GenerationParameters::Rsa(RsaParameters {
                    key_length: rsa_public_key_length(public_key)?,
                })),
                None => None,
            },
            CredentialVersion::Certificate(v) => Some(GenerationParameters::Certificate(
                v.reader()?.generation_parameters(v.ca_name.clone()),
            )),
            CredentialVersion::Value(_) | CredentialVersion::Json(_) => None,
        };
        Ok(params)
    }

    /// Whether generating with `params` would reproduce this version.
    ///
    /// `None` means "no opinion" and always matches.
    pub fn matches_generation_parameters(
        &self,
        params: Option<&GenerationParameters>,
        encryptor: &Encryptor,
    ) -> Result<bool> {
        let Some(params) = params else {
            return Ok(true);
        };
        if params.credential_type() != self.credential_type() {
            return Ok(false);
        }

        let matches = match (self.generation_parameters(encryptor)?, params) {
            (None, _) => false,
            (
                Some(GenerationParameters::User(stored)),
                GenerationParameters::User(requested),
            ) => {
                // A request without a username accepts whatever was generated
                stored.password == requested.password
                    && (requested.username.is_none() || stored.username == requested.username)
            }
            (Some(stored), requested) => &stored == requested,
        };
        Ok(matches)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Key rotation
    // ─────────────────────────────────────────────────────────────────────────

    /// Re-encrypt every secret field under the active key.
    ///
    /// Nothing else changes: id, timestamps and plaintext stay the same.
    pub fn rotate(&mut self, encryptor: &Encryptor) -> Result<()> {
        let fields: Vec<&mut EncryptedValue> = match self {
            CredentialVersion::Password(v) => vec![
                &mut v.encrypted_value,
                &mut v.encrypted_generation_parameters,
            ],
            CredentialVersion::Value(v) | CredentialVersion::Json(v) => {
                vec![&mut v.encrypted_value]
            }
            CredentialVersion::Certificate(v) => vec![&mut v.encrypted_private_key],
            CredentialVersion::Ssh(v) | CredentialVersion::Rsa(v) => {
                vec![&mut v.encrypted_private_key]
            }
            CredentialVersion::User(v) => vec![
                &mut v.encrypted_password,
                &mut v.encrypted_generation_parameters,
            ],
        };

        for field in fields {
            *field = encryptor.reencrypt(field)?;
        }
        Ok(())
    }
}

fn new_certificate_version(
    meta: VersionMeta,
    value: CertificateValue,
    encryptor: &Encryptor,
) -> Result<CertificateVersion> {
    let reader = CertificateReader::from_pem(&value.certificate)
        .map_err(|_| ValidationError::new("error.invalid_certificate_value"))?;
    let self_signed = reader.is_self_signed();

    let ca = match value.ca.filter(|ca| !ca.is_empty()) {
        Some(ca) => Some(ca),
        None if self_signed => Some(value.certificate.clone()),
        None => None,
    };

    Ok(CertificateVersion {
        meta,
        ca,
        ca_name: value
            .ca_name
            .filter(|n| !n.is_empty())
            .map(|n| crate::name::normalize_name(&n)),
        encrypted_private_key: encryptor
            .encrypt_str(value.private_key.as_deref().filter(|k| !k.is_empty()))?,
        transitional: value.transitional,
        certificate_authority: reader.is_ca(),
        self_signed,
        generated: value.generated,
        expiry_date: Some(reader.not_after() * 1000),
        certificate: value.certificate,
    })
}

fn new_key_pair_version(
    meta: VersionMeta,
    value: KeyPairValue,
    encryptor: &Encryptor,
) -> Result<KeyPairVersion> {
    Ok(KeyPairVersion {
        meta,
        public_key: value.public_key.filter(|k| !k.is_empty()),
        encrypted_private_key: encryptor
            .encrypt_str(value.private_key.as_deref().filter(|k| !k.is_empty()))?,
    })
}

fn encrypt_parameters(
    stored: Option<StoredParameters>,
    encryptor: &Encryptor,
) -> Result<EncryptedValue> {
    match stored {
        Some(stored) => Ok(encryptor.encrypt(&stored.to_cbor()?)?),
        None => Ok(EncryptedValue::empty()),
    }
}

fn decrypt_parameters(
    encryptor: &Encryptor,
    value: &EncryptedValue,
) -> Result<Option<StoredParameters>> {
    match encryptor.decrypt(value)? {
        Some(bytes) => Ok(Some(StoredParameters::from_cbor(&bytes)?)),
        None => Ok(None),
    }
}

fn decrypt_required(
    encryptor: &Encryptor,
    value: &EncryptedValue,
    meta: &VersionMeta,
) -> Result<String> {
    encryptor.decrypt_str(value)?.ok_or_else(|| {
        CoreError::Corrupt(format!("version {} has no stored value", meta.id))
    })
}

fn ssh_comment(public_key: &str) -> Option<String> {
    let comment = public_key.split_whitespace().skip(2).collect::<Vec<_>>().join(" ");
    (!comment.is_empty()).then_some(comment)
}

/// A SHA-512 crypt salt: `$6$` followed by 16 random salt characters.
pub fn generate_salt() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SALT_LEN)
        .map(|_| char::from(SALT_CHARS[rng.gen_range(0..SALT_CHARS.len())]))
        .collect();
    format!("$6${}", suffix)
}
