//! Certificate generation parameters.
//!
//! ## Overview
//!
//! Two shapes exist. [`CertificateGenerationRequest`] is what a caller sends:
//! every field optional, usages as strings. [`CertificateGenerationParameters`]
//! is the validated form, produced by [`crate::validation::validate_request`]
//! or recovered from an existing certificate by
//! [`crate::reader::CertificateReader::generation_parameters`].
//!
//! Equality on [`CertificateGenerationParameters`] is what decides whether a
//! converge-mode generate may reuse the stored certificate, so it compares the
//! normalized usage and name sets, and compares `ca_name` only when both sides
//! carry one.

use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PkiError, Result};

/// Default RSA modulus length for generated certificates.
pub const DEFAULT_KEY_LENGTH: u32 = 2048;

/// Default validity period in days.
pub const DEFAULT_DURATION_DAYS: u32 = 365;

/// RSA modulus lengths accepted for generation.
pub const VALID_KEY_LENGTHS: [u32; 3] = [2048, 3072, 4096];

/// Longest accepted validity period in days.
pub const MAX_DURATION_DAYS: u32 = 3650;

/// Longest accepted subject alternative name.
pub const MAX_ALTERNATIVE_NAME_LEN: usize = 253;

// ─────────────────────────────────────────────────────────────────────────────
// Subject
// ─────────────────────────────────────────────────────────────────────────────

/// Attributes that make up a certificate subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DnAttribute {
    Organization,
    State,
    Country,
    OrganizationUnit,
    CommonName,
    Locality,
}

impl DnAttribute {
    /// Order in which attributes are written into the subject name.
    pub const ORDER: [DnAttribute; 6] = [
        DnAttribute::Organization,
        DnAttribute::State,
        DnAttribute::Country,
        DnAttribute::OrganizationUnit,
        DnAttribute::CommonName,
        DnAttribute::Locality,
    ];

    /// X.520 attribute type OID arcs.
    pub fn oid(&self) -> &'static [u64] {
        match self {
            DnAttribute::Organization => &[2, 5, 4, 10],
            DnAttribute::State => &[2, 5, 4, 8],
            DnAttribute::Country => &[2, 5, 4, 6],
            DnAttribute::OrganizationUnit => &[2, 5, 4, 11],
            DnAttribute::CommonName => &[2, 5, 4, 3],
            DnAttribute::Locality => &[2, 5, 4, 7],
        }
    }

    /// Maximum accepted length in characters.
    pub fn max_len(&self) -> usize {
        match self {
            DnAttribute::Country => 2,
            DnAttribute::Locality | DnAttribute::State => 128,
            DnAttribute::Organization
            | DnAttribute::OrganizationUnit
            | DnAttribute::CommonName => 64,
        }
    }

    /// Reason code returned when the value exceeds [`DnAttribute::max_len`].
    pub fn too_long_code(&self) -> &'static str {
        match self {
            DnAttribute::Organization => "error.invalid_organization_length",
            DnAttribute::State => "error.invalid_state_length",
            DnAttribute::Country => "error.invalid_country_length",
            DnAttribute::OrganizationUnit => "error.invalid_organization_unit_length",
            DnAttribute::CommonName => "error.invalid_common_name_length",
            DnAttribute::Locality => "error.invalid_locality_length",
        }
    }
}

/// The distinguished name of a certificate subject.
///
/// Empty attributes are `None`; an attribute present with an empty string is
/// normalized away by [`SubjectName::normalized`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectName {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
}

impl SubjectName {
    /// A subject with only a common name.
    pub fn common_name(cn: impl Into<String>) -> Self {
        Self {
            common_name: Some(cn.into()),
            ..Default::default()
        }
    }

    /// Value of one attribute.
    pub fn get(&self, attribute: DnAttribute) -> Option<&str> {
        let value = match attribute {
            DnAttribute::Organization => &self.organization,
            DnAttribute::State => &self.state,
            DnAttribute::Country => &self.country,
            DnAttribute::OrganizationUnit => &self.organization_unit,
            DnAttribute::CommonName => &self.common_name,
            DnAttribute::Locality => &self.locality,
        };
        value.as_deref()
    }

    /// Set one attribute.
    pub fn set(&mut self, attribute: DnAttribute, value: Option<String>) {
        let slot = match attribute {
            DnAttribute::Organization => &mut self.organization,
            DnAttribute::State => &mut self.state,
            DnAttribute::Country => &mut self.country,
            DnAttribute::OrganizationUnit => &mut self.organization_unit,
            DnAttribute::CommonName => &mut self.common_name,
            DnAttribute::Locality => &mut self.locality,
        };
        *slot = value;
    }

    /// Present attributes in subject-name order.
    pub fn attributes(&self) -> Vec<(DnAttribute, &str)> {
        DnAttribute::ORDER
            .iter()
            .filter_map(|attr| self.get(*attr).map(|v| (*attr, v)))
            .collect()
    }

    /// Whether no attribute is set.
    pub fn is_empty(&self) -> bool {
        self.attributes().is_empty()
    }

    /// Drop attributes whose value is the empty string.
    pub fn normalized(mut self) -> Self {
        for attr in DnAttribute::ORDER {
            if self.get(attr).is_some_and(str::is_empty) {
                self.set(attr, None);
            }
        }
        self
    }
}

impl fmt::Display for SubjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .attributes()
            .into_iter()
            .map(|(attr, value)| {
                let label = match attr {
                    DnAttribute::Organization => "O",
                    DnAttribute::State => "ST",
                    DnAttribute::Country => "C",
                    DnAttribute::OrganizationUnit => "OU",
                    DnAttribute::CommonName => "CN",
                    DnAttribute::Locality => "L",
                };
                format!("{}={}", label, value)
            })
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Usages and alternative names
// ─────────────────────────────────────────────────────────────────────────────

/// X.509 key usage bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyUsage {
    DigitalSignature,
    NonRepudiation,
    KeyEncipherment,
    DataEncipherment,
    KeyAgreement,
    KeyCertSign,
    CrlSign,
    EncipherOnly,
    DecipherOnly,
}

impl KeyUsage {
    pub const ALL: [KeyUsage; 9] = [
        KeyUsage::DigitalSignature,
        KeyUsage::NonRepudiation,
        KeyUsage::KeyEncipherment,
        KeyUsage::DataEncipherment,
        KeyUsage::KeyAgreement,
        KeyUsage::KeyCertSign,
        KeyUsage::CrlSign,
        KeyUsage::EncipherOnly,
        KeyUsage::DecipherOnly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyUsage::DigitalSignature => "digital_signature",
            KeyUsage::NonRepudiation => "non_repudiation",
            KeyUsage::KeyEncipherment => "key_encipherment",
            KeyUsage::DataEncipherment => "data_encipherment",
            KeyUsage::KeyAgreement => "key_agreement",
            KeyUsage::KeyCertSign => "key_cert_sign",
            KeyUsage::CrlSign => "crl_sign",
            KeyUsage::EncipherOnly => "encipher_only",
            KeyUsage::DecipherOnly => "decipher_only",
        }
    }
}

impl FromStr for KeyUsage {
    type Err = PkiError;

    fn from_str(s: &str) -> Result<Self> {
        KeyUsage::ALL
            .iter()
            .find(|usage| usage.as_str() == s)
            .copied()
            .ok_or_else(|| PkiError::invalid_with("error.invalid_key_usage", s))
    }
}

/// X.509 extended key usage purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtendedKeyUsage {
    ServerAuth,
    ClientAuth,
    CodeSigning,
    EmailProtection,
    Timestamping,
}

impl ExtendedKeyUsage {
    pub const ALL: [ExtendedKeyUsage; 5] = [
        ExtendedKeyUsage::ServerAuth,
        ExtendedKeyUsage::ClientAuth,
        ExtendedKeyUsage::CodeSigning,
        ExtendedKeyUsage::EmailProtection,
        ExtendedKeyUsage::Timestamping,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtendedKeyUsage::ServerAuth => "server_auth",
            ExtendedKeyUsage::ClientAuth => "client_auth",
            ExtendedKeyUsage::CodeSigning => "code_signing",
            ExtendedKeyUsage::EmailProtection => "email_protection",
            ExtendedKeyUsage::Timestamping => "timestamping",
        }
    }
}

impl FromStr for ExtendedKeyUsage {
    type Err = PkiError;

    fn from_str(s: &str) -> Result<Self> {
        ExtendedKeyUsage::ALL
            .iter()
            .find(|usage| usage.as_str() == s)
            .copied()
            .ok_or_else(|| PkiError::invalid_with("error.invalid_extended_key_usage", s))
    }
}

/// A subject alternative name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AlternativeName {
    /// An IPv4 or IPv6 address.
    Ip(IpAddr),
    /// A DNS name, possibly a wildcard pattern such as `*.example.com`.
    Dns(String),
}

impl fmt::Display for AlternativeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlternativeName::Ip(ip) => write!(f, "{}", ip),
            AlternativeName::Dns(name) => write!(f, "{}", name),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request and validated parameters
// ─────────────────────────────────────────────────────────────────────────────

/// Certificate parameters as supplied by a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateGenerationRequest {
    pub common_name: Option<String>,
    pub organization: Option<String>,
    pub organization_unit: Option<String>,
    pub locality: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub alternative_names: Vec<String>,
    pub key_usage: Vec<String>,
    pub extended_key_usage: Vec<String>,
    pub key_length: Option<u32>,
    pub duration: Option<u32>,
    pub ca: Option<String>,
    pub is_ca: bool,
    pub self_sign: bool,
}

impl CertificateGenerationRequest {
    /// The subject assembled from the request's name fields.
    pub fn subject(&self) -> SubjectName {
        SubjectName {
            organization: self.organization.clone(),
            state: self.state.clone(),
            country: self.country.clone(),
            organization_unit: self.organization_unit.clone(),
            common_name: self.common_name.clone(),
            locality: self.locality.clone(),
        }
        .normalized()
    }

    /// Whether a signing CA name is present.
    pub fn has_ca_name(&self) -> bool {
        self.ca.as_deref().is_some_and(|ca| !ca.is_empty())
    }
}

/// Validated certificate generation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateGenerationParameters {
    /// Subject distinguished name.
    pub subject: SubjectName,

    /// RSA modulus length in bits.
    pub key_length: u32,

    /// Validity period in days.
    pub duration: u32,

    /// Whether the certificate signs itself.
    pub self_signed: bool,

    /// Whether the certificate is a CA.
    pub is_ca: bool,

    /// Name of the signing CA credential, when CA-signed.
    pub ca_name: Option<String>,

    /// Subject alternative names.
    #[serde(with = "alternative_names_serde")]
    pub alternative_names: BTreeSet<AlternativeName>,

    /// Key usage bits.
    pub key_usage: BTreeSet<KeyUsage>,

    /// Extended key usage purposes.
    pub extended_key_usage: BTreeSet<ExtendedKeyUsage>,
}

impl CertificateGenerationParameters {
    /// Self-signed CA parameters with defaults, for a given common name.
    pub fn self_signed_ca(common_name: impl Into<String>) -> Self {
        Self {
            subject: SubjectName::common_name(common_name),
            key_length: DEFAULT_KEY_LENGTH,
            duration: DEFAULT_DURATION_DAYS,
            self_signed: true,
            is_ca: true,
            ca_name: None,
            alternative_names: BTreeSet::new(),
            key_usage: BTreeSet::new(),
            extended_key_usage: BTreeSet::new(),
        }
    }

    /// Leaf parameters signed by `ca_name`, with defaults.
    pub fn signed_by(common_name: impl Into<String>, ca_name: impl Into<String>) -> Self {
        Self {
            subject: SubjectName::common_name(common_name),
            key_length: DEFAULT_KEY_LENGTH,
            duration: DEFAULT_DURATION_DAYS,
            self_signed: false,
            is_ca: false,
            ca_name: Some(ca_name.into()),
            alternative_names: BTreeSet::new(),
            key_usage: BTreeSet::new(),
            extended_key_usage: BTreeSet::new(),
        }
    }
}

fn normalize_ca_name(name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{}", name)
    }
}

impl PartialEq for CertificateGenerationParameters {
    fn eq(&self, other: &Self) -> bool {
        let ca_names_match = match (&self.ca_name, &other.ca_name) {
            (Some(a), Some(b)) => normalize_ca_name(a) == normalize_ca_name(b),
            _ => true,
        };

        ca_names_match
            && self.subject == other.subject
            && self.key_length == other.key_length
            && self.duration == other.duration
            && self.self_signed == other.self_signed
            && self.is_ca == other.is_ca
            && self.alternative_names == other.alternative_names
            && self.key_usage == other.key_usage
            && self.extended_key_usage == other.extended_key_usage
    }
}

impl Eq for CertificateGenerationParameters {}

mod alternative_names_serde {
    use std::collections::BTreeSet;
    use std::net::IpAddr;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::AlternativeName;

    pub fn serialize<S: Serializer>(
        names: &BTreeSet<AlternativeName>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        let strings: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        strings.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<BTreeSet<AlternativeName>, D::Error> {
        let strings = Vec::<String>::deserialize(deserializer)?;
        Ok(strings
            .into_iter()
            .map(|s| match s.parse::<IpAddr>() {
                Ok(ip) => AlternativeName::Ip(ip),
                Err(_) => AlternativeName::Dns(s),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ca_name_compared_only_when_both_present() {
        let a = CertificateGenerationParameters::signed_by("leaf", "/my-ca");
        let mut b = a.clone();
        b.ca_name = None;
        assert_eq!(a, b);

        b.ca_name = Some("my-ca".into());
        assert_eq!(a, b);

        b.ca_name = Some("/other-ca".into());
        assert_ne!(a, b);
    }

    #[test]
    fn test_usage_sets_are_order_insensitive() {
        let mut a = CertificateGenerationParameters::self_signed_ca("ca");
        let mut b = a.clone();
        a.key_usage = [KeyUsage::CrlSign, KeyUsage::KeyCertSign].into_iter().collect();
        b.key_usage = [KeyUsage::KeyCertSign, KeyUsage::CrlSign].into_iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_usage_parsing() {
        assert_eq!("crl_sign".parse::<KeyUsage>().unwrap(), KeyUsage::CrlSign);
        assert_eq!(
            "timestamping".parse::<ExtendedKeyUsage>().unwrap(),
            ExtendedKeyUsage::Timestamping
        );
        assert!("bogus".parse::<KeyUsage>().is_err());
    }

    #[test]
    fn test_subject_order_and_normalization() {
        let subject = SubjectName {
            organization: Some("Org".into()),
            common_name: Some("example.com".into()),
            country: Some("US".into()),
            locality: Some(String::new()),
            ..Default::default()
        }
        .normalized();

        assert_eq!(subject.locality, None);
        assert_eq!(subject.to_string(), "O=Org,C=US,CN=example.com");
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let request: CertificateGenerationRequest =
            serde_json::from_str(r#"{"common_name":"x","is_ca":true}"#).unwrap();
        assert!(request.is_ca);
        assert!(!request.self_sign);
        assert_eq!(request.key_length, None);
        assert!(request.alternative_names.is_empty());
    }
}
