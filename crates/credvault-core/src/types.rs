//! Strong identifiers and the credential identity record.
//!
//! All identifiers are UUID newtypes so a version id can never be passed
//! where a credential id is expected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::name::normalize_name;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|_| ValidationError::with_detail("error.bad_request", s))
            }
        }
    };
}

uuid_id!(
    /// Identity of a [`Credential`].
    CredentialId
);

uuid_id!(
    /// Identity of one credential version.
    VersionId
);

uuid_id!(
    /// Identity of one permission row.
    PermissionId
);

/// Current time as Unix milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// The identity record of a credential: a stable id and a unique name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Credential {
    pub id: CredentialId,
    pub name: String,
}

impl Credential {
    /// A new credential with a fresh id. The name is normalized.
    pub fn new(name: &str) -> Self {
        Self {
            id: CredentialId::new(),
            name: normalize_name(name),
        }
    }
}

/// The closed set of credential kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialType {
    Password,
    Certificate,
    Ssh,
    Rsa,
    Value,
    Json,
    User,
}

impl CredentialType {
    pub const ALL: [CredentialType; 7] = [
        CredentialType::Password,
        CredentialType::Certificate,
        CredentialType::Ssh,
        CredentialType::Rsa,
        CredentialType::Value,
        CredentialType::Json,
        CredentialType::User,
    ];

    /// The stored type discriminator.
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialType::Password => "password",
            CredentialType::Certificate => "certificate",
            CredentialType::Ssh => "ssh",
            CredentialType::Rsa => "rsa",
            CredentialType::Value => "value",
            CredentialType::Json => "json",
            CredentialType::User => "user",
        }
    }

    /// Whether values of this type can be produced by a generator.
    pub fn is_generatable(&self) -> bool {
        !matches!(self, CredentialType::Value | CredentialType::Json)
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CredentialType::ALL
            .iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| ValidationError::with_detail("error.invalid_type", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display_and_parse() {
        let id = VersionId::new();
        let parsed: VersionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!(format!("{:?}", id).starts_with("VersionId("));
    }

    #[test]
    fn test_bad_uuid() {
        assert!("not-a-uuid".parse::<CredentialId>().is_err());
    }

    #[test]
    fn test_credential_name_normalized() {
        let credential = Credential::new("app/password");
        assert_eq!(credential.name, "/app/password");
    }

    #[test]
    fn test_type_discriminators() {
        for t in CredentialType::ALL {
            assert_eq!(t.as_str().parse::<CredentialType>().unwrap(), t);
        }
        assert_eq!("JSON".parse::<CredentialType>().unwrap(), CredentialType::Json);
        assert!("blob".parse::<CredentialType>().is_err());
        assert!(!CredentialType::Json.is_generatable());
        assert!(CredentialType::Certificate.is_generatable());
    }
}
