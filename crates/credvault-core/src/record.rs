//! The flat stored form of a credential version.
//!
//! Stores persist [`CredentialVersionRecord`]s without knowing about variants;
//! [`crate::version::CredentialVersion::decode`] turns one back into a typed
//! version by dispatching on `type_tag`.

use credvault_crypto::{EncryptedValue, EncryptionKeyId};
use serde::{Deserialize, Serialize};

use crate::types::{Credential, VersionId};

/// One stored credential version, all variants flattened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialVersionRecord {
    pub id: VersionId,
    pub credential: Credential,

    /// Creation time, Unix milliseconds.
    pub created_at: i64,

    /// Type discriminator: `password`, `certificate`, `ssh`, `rsa`, `value`,
    /// `json` or `user`.
    pub type_tag: String,

    /// The secret payload: the value, the private key, or the user password.
    pub encrypted_value: EncryptedValue,

    /// CBOR-encoded generation parameters (password and user only).
    pub encrypted_generation_parameters: EncryptedValue,

    pub public_key: Option<String>,
    pub certificate: Option<String>,
    pub ca: Option<String>,
    pub ca_name: Option<String>,
    pub transitional: bool,
    pub certificate_authority: bool,
    pub self_signed: bool,
    pub generated: bool,

    /// Certificate `notAfter`, Unix milliseconds.
    pub expiry_date: Option<i64>,

    pub username: Option<String>,
    pub salt: Option<String>,
}

impl CredentialVersionRecord {
    /// A record with every optional field empty.
    pub fn empty(credential: Credential, type_tag: &str, created_at: i64) -> Self {
        Self {
            id: VersionId::new(),
            credential,
            created_at,
            type_tag: type_tag.to_string(),
            encrypted_value: EncryptedValue::empty(),
            encrypted_generation_parameters: EncryptedValue::empty(),
            public_key: None,
            certificate: None,
            ca: None,
            ca_name: None,
            transitional: false,
            certificate_authority: false,
            self_signed: false,
            generated: false,
            expiry_date: None,
            username: None,
            salt: None,
        }
    }

    /// Whether any encrypted field is under a key other than `active`.
    pub fn needs_rotation(&self, active: &EncryptionKeyId) -> bool {
        [&self.encrypted_value, &self.encrypted_generation_parameters]
            .into_iter()
            .any(|v| !v.is_empty() && !v.is_encrypted_with(active))
    }

    /// Ids of the keys this record's encrypted fields are under.
    pub fn encryption_key_ids(&self) -> Vec<EncryptionKeyId> {
        let mut ids: Vec<EncryptionKeyId> = [
            self.encrypted_value.encryption_key_id,
            self.encrypted_generation_parameters.encryption_key_id,
        ]
        .into_iter()
        .flatten()
        .collect();
        ids.dedup();
        ids
    }
}
