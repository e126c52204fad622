//! Certificate construction and signing.
//!
//! ## Overview
//!
//! [`CertificateSigner::sign`] builds one certificate from validated
//! [`CertificateGenerationParameters`] and a subject key, either self-signed
//! or signed by a [`CertificateAuthority`]. Every certificate carries:
//!
//! - a 159-bit random serial number
//! - a validity window `[now, now + duration days]`
//! - `subjectKeyIdentifier`: leftmost 160 bits of SHA-256 over the subject
//!   public key (RFC 7093 method 1)
//! - `basicConstraints` (critical) with the requested CA flag
//! - `keyUsage` (critical) and `extendedKeyUsage` when requested
//! - `subjectAlternativeName` when requested
//! - `authorityKeyIdentifier` naming the issuer's key id, DN and serial,
//!   when the issuer has a key id
//!
//! ## Usage
//!
//! ```rust,no_run
//! use credvault_pki::{CertificateGenerationParameters, CertificateSigner, RsaKeyPair};
//!
//! let params = CertificateGenerationParameters::self_signed_ca("my-root");
//! let key = RsaKeyPair::generate(params.key_length).unwrap();
//! let pem = CertificateSigner::new().sign(&key, &params, None).unwrap();
//! assert!(pem.starts_with("-----BEGIN CERTIFICATE-----"));
//! ```

use rand::RngCore;
use rcgen::{
    BasicConstraints, CertificateParams, CustomExtension, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, Ia5String, IsCa, KeyIdMethod, KeyUsagePurpose, SanType,
    SerialNumber,
};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};
use yasna::models::ObjectIdentifier;
use yasna::Tag;

use crate::error::{PkiError, Result};
use crate::keys::RsaKeyPair;
use crate::params::{
    AlternativeName, CertificateGenerationParameters, DnAttribute, ExtendedKeyUsage, KeyUsage,
    SubjectName,
};
use crate::reader::CertificateReader;

/// Length of generated serial numbers in bytes. The top bit is cleared,
/// leaving 159 random bits.
const SERIAL_LEN: usize = 20;

/// Length of subject key identifiers in bytes.
const KEY_IDENTIFIER_LEN: usize = 20;

const OID_AUTHORITY_KEY_IDENTIFIER: &[u64] = &[2, 5, 29, 35];

/// Signing material of a certificate authority.
#[derive(Debug, Clone, Copy)]
pub struct CertificateAuthority<'a> {
    /// The CA certificate, PEM.
    pub certificate: &'a str,

    /// The CA private key, PEM (PKCS#1 or PKCS#8).
    pub private_key: &'a str,
}

/// A freshly generated certificate with its key.
#[derive(Clone)]
pub struct GeneratedCertificate {
    /// The certificate, PEM.
    pub certificate: String,

    /// The subject private key, PKCS#1 PEM.
    pub private_key: String,
}

impl std::fmt::Debug for GeneratedCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedCertificate")
            .field("certificate", &self.certificate)
            .finish_non_exhaustive()
    }
}

/// Resolved issuer for one signing operation.
struct Issuer {
    name_der: Vec<u8>,
    key_identifier: Option<Vec<u8>>,
    serial: Vec<u8>,
}

/// Builds and signs X.509 certificates.
#[derive(Debug, Default, Clone, Copy)]
pub struct CertificateSigner;

impl CertificateSigner {
    pub fn new() -> Self {
        Self
    }

    /// Generate a key of `params.key_length` bits and sign a certificate for it.
    pub fn generate(
        &self,
        params: &CertificateGenerationParameters,
        issuer: Option<&CertificateAuthority<'_>>,
    ) -> Result<GeneratedCertificate> {
        let key = RsaKeyPair::generate(params.key_length)?;
        let certificate = self.sign(&key, params, issuer)?;
        Ok(GeneratedCertificate {
            certificate,
            private_key: key.private_key_pem()?,
        })
    }

    /// Sign a certificate for `subject_key`.
    ///
    /// With no `issuer` the certificate is self-signed: the issuer DN, key,
    /// key identifier and serial are the subject's own.
    pub fn sign(
        &self,
        subject_key: &RsaKeyPair,
        params: &CertificateGenerationParameters,
        issuer: Option<&CertificateAuthority<'_>>,
    ) -> Result<String> {
        let subject_key_id = key_identifier(subject_key)?;
        let serial = generate_serial();

        let mut cert_params = CertificateParams::default();
        cert_params.distinguished_name = distinguished_name(&params.subject);
        cert_params.serial_number = Some(SerialNumber::from_slice(&serial));
        cert_params.key_identifier_method = KeyIdMethod::PreSpecified(subject_key_id.clone());
        cert_params.use_authority_key_identifier_extension = false;

        let not_before = now_truncated()?;
        cert_params.not_before = not_before;
        cert_params.not_after = not_before + Duration::days(i64::from(params.duration));

        cert_params.is_ca = if params.is_ca {
            IsCa::Ca(BasicConstraints::Unconstrained)
        } else {
            IsCa::ExplicitNoCa
        };
        cert_params.key_usages = params.key_usage.iter().map(key_usage_purpose).collect();
        cert_params.extended_key_usages = params
            .extended_key_usage
            .iter()
            .map(extended_key_usage_purpose)
            .collect();
        cert_params.subject_alt_names = params
            .alternative_names
            .iter()
            .map(san_type)
            .collect::<Result<Vec<_>>>()?;

        let subject_rcgen_key = subject_key.to_rcgen()?;

        let certificate = match issuer {
            None => {
                let issuer = Issuer {
                    name_der: encode_name(&params.subject),
                    key_identifier: Some(subject_key_id),
                    serial,
                };
                push_authority_key_identifier(&mut cert_params, &issuer);
                cert_params.self_signed(&subject_rcgen_key).map_err(signing)?
            }
            Some(ca) => {
                let ca_cert = CertificateReader::from_pem(ca.certificate)?;
                let issuer = Issuer {
                    name_der: ca_cert.subject_der().to_vec(),
                    key_identifier: ca_cert.subject_key_identifier().map(<[u8]>::to_vec),
                    serial: ca_cert.serial().to_vec(),
                };
                push_authority_key_identifier(&mut cert_params, &issuer);

                let ca_key = RsaKeyPair::from_pem(ca.private_key)?.to_rcgen()?;
                let ca_rcgen_cert = CertificateParams::from_ca_cert_pem(ca.certificate)
                    .map_err(|e| PkiError::InvalidCertificate(e.to_string()))?
                    .self_signed(&ca_key)
                    .map_err(signing)?;

                let certificate = cert_params
                    .signed_by(&subject_rcgen_key, &ca_rcgen_cert, &ca_key)
                    .map_err(signing)?;
                ensure_issued_by(&certificate.pem(), &ca_cert)?;
                certificate
            }
        };

        tracing::debug!(
            subject = %params.subject,
            is_ca = params.is_ca,
            self_signed = issuer.is_none(),
            duration = params.duration,
            "signed certificate"
        );

        Ok(certificate.pem())
    }
}

/// Subject key identifier for a key: leftmost 160 bits of SHA-256 over the
/// subjectPublicKey bit string.
pub fn key_identifier(key: &RsaKeyPair) -> Result<Vec<u8>> {
    let public = key.public_key_pkcs1_der()?;
    let digest = Sha256::digest(&public);
    Ok(digest[..KEY_IDENTIFIER_LEN].to_vec())
}

/// The issuer name in `pem` must be byte-identical to the CA's subject, or
/// chain building against the stored CA fails.
fn ensure_issued_by(pem: &str, ca: &CertificateReader) -> Result<()> {
    let child = CertificateReader::from_pem(pem)?;
    if child.issuer_der() != ca.subject_der() {
        tracing::warn!(ca = %ca.subject(), "issuer name does not match ca subject");
        return Err(PkiError::Signing(
            "issuer name does not match the ca subject".into(),
        ));
    }
    Ok(())
}

fn generate_serial() -> Vec<u8> {
    let mut serial = [0u8; SERIAL_LEN];
    rand::thread_rng().fill_bytes(&mut serial);
    serial[0] &= 0x7f;
    serial.to_vec()
}

fn now_truncated() -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(OffsetDateTime::now_utc().unix_timestamp())
        .map_err(|e| PkiError::Signing(e.to_string()))
}

fn signing(e: rcgen::Error) -> PkiError {
    PkiError::Signing(e.to_string())
}

fn dn_type(attribute: DnAttribute) -> DnType {
    match attribute {
        DnAttribute::Organization => DnType::OrganizationName,
        DnAttribute::State => DnType::StateOrProvinceName,
        DnAttribute::Country => DnType::CountryName,
        DnAttribute::OrganizationUnit => DnType::OrganizationalUnitName,
        DnAttribute::CommonName => DnType::CommonName,
        DnAttribute::Locality => DnType::LocalityName,
    }
}

fn distinguished_name(subject: &SubjectName) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    for (attribute, value) in subject.attributes() {
        dn.push(dn_type(attribute), DnValue::Utf8String(value.to_string()));
    }
    dn
}

/// DER `Name` for a subject, encoded exactly as the certificate builder
/// writes it.
fn encode_name(subject: &SubjectName) -> Vec<u8> {
    yasna::construct_der(|writer| {
        writer.write_sequence(|writer| {
            for (attribute, value) in subject.attributes() {
                writer.next().write_set(|writer| {
                    writer.next().write_sequence(|writer| {
                        writer
                            .next()
                            .write_oid(&ObjectIdentifier::from_slice(attribute.oid()));
                        writer.next().write_utf8_string(value);
                    });
                });
            }
        });
    })
}

/// Append an `authorityKeyIdentifier` extension when the issuer has a key id.
fn push_authority_key_identifier(params: &mut CertificateParams, issuer: &Issuer) {
    let Some(key_id) = issuer.key_identifier.as_deref().filter(|id| !id.is_empty()) else {
        return;
    };

    let content = yasna::construct_der(|writer| {
        writer.write_sequence(|writer| {
            // keyIdentifier [0] IMPLICIT OCTET STRING
            writer
                .next()
                .write_tagged_implicit(Tag::context(0), |writer| writer.write_bytes(key_id));
            // authorityCertIssuer [1] IMPLICIT GeneralNames
            writer.next().write_tagged_implicit(Tag::context(1), |writer| {
                writer.write_sequence(|writer| {
                    // directoryName [4] Name
                    writer.next().write_tagged(Tag::context(4), |writer| {
                        writer.write_der(&issuer.name_der);
                    });
                });
            });
            // authorityCertSerialNumber [2] IMPLICIT INTEGER
            writer.next().write_tagged_implicit(Tag::context(2), |writer| {
                writer.write_bigint_bytes(&issuer.serial, true);
            });
        });
    });

    params.custom_extensions.push(CustomExtension::from_oid_content(
        OID_AUTHORITY_KEY_IDENTIFIER,
        content,
    ));
}

fn key_usage_purpose(usage: &KeyUsage) -> KeyUsagePurpose {
    match usage {
        KeyUsage::DigitalSignature => KeyUsagePurpose::DigitalSignature,
        KeyUsage::NonRepudiation => KeyUsagePurpose::ContentCommitment,
        KeyUsage::KeyEncipherment => KeyUsagePurpose::KeyEncipherment,
        KeyUsage::DataEncipherment => KeyUsagePurpose::DataEncipherment,
        KeyUsage::KeyAgreement => KeyUsagePurpose::KeyAgreement,
        KeyUsage::KeyCertSign => KeyUsagePurpose::KeyCertSign,
        KeyUsage::CrlSign => KeyUsagePurpose::CrlSign,
        KeyUsage::EncipherOnly => KeyUsagePurpose::EncipherOnly,
        KeyUsage::DecipherOnly => KeyUsagePurpose::DecipherOnly,
    }
}

fn extended_key_usage_purpose(usage: &ExtendedKeyUsage) -> ExtendedKeyUsagePurpose {
    match usage {
        ExtendedKeyUsage::ServerAuth => ExtendedKeyUsagePurpose::ServerAuth,
        ExtendedKeyUsage::ClientAuth => ExtendedKeyUsagePurpose::ClientAuth,
        ExtendedKeyUsage::CodeSigning => ExtendedKeyUsagePurpose::CodeSigning,
        ExtendedKeyUsage::EmailProtection => ExtendedKeyUsagePurpose::EmailProtection,
        ExtendedKeyUsage::Timestamping => ExtendedKeyUsagePurpose::TimeStamping,
    }
}

fn san_type(name: &AlternativeName) -> Result<SanType> {
    match name {
        AlternativeName::Ip(ip) => Ok(SanType::IpAddress(*ip)),
        AlternativeName::Dns(dns) => Ia5String::try_from(dns.clone())
            .map(SanType::DnsName)
            .map_err(|e| PkiError::invalid_with("error.invalid_alternate_name", e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::SubjectName;

    fn ca_params(cn: &str) -> CertificateGenerationParameters {
        CertificateGenerationParameters::self_signed_ca(cn)
    }

    #[test]
    fn test_self_signed_ca() {
        let key = RsaKeyPair::generate(2048).unwrap();
        let params = ca_params("root");
        let pem = CertificateSigner::new().sign(&key, &params, None).unwrap();

        let cert = CertificateReader::from_pem(&pem).unwrap();
        assert!(cert.is_ca());
        assert!(cert.is_self_signed());
        assert_eq!(cert.subject_der(), cert.issuer_der());
        assert_eq!(cert.subject().common_name.as_deref(), Some("root"));
        assert_eq!(cert.duration_days(), 365);
        assert_eq!(cert.key_length(), 2048);
        assert!(cert.serial().len() <= SERIAL_LEN);

        let ski = key_identifier(&key).unwrap();
        assert_eq!(cert.subject_key_identifier(), Some(ski.as_slice()));
        assert_eq!(cert.authority_key_identifier(), Some(ski.as_slice()));
        assert!(cert.matches_private_key(&key.private_key_pem().unwrap()).unwrap());
    }

    #[test]
    fn test_subject_name_encoding_matches_builder() {
        let subject = SubjectName {
            organization: Some("Org".into()),
            country: Some("US".into()),
            common_name: Some("root".into()),
            ..Default::default()
        };
        let mut params = ca_params("unused");
        params.subject = subject.clone();

        let key = RsaKeyPair::generate(2048).unwrap();
        let pem = CertificateSigner::new().sign(&key, &params, None).unwrap();
        let cert = CertificateReader::from_pem(&pem).unwrap();

        assert_eq!(cert.subject_der(), encode_name(&subject).as_slice());
        assert_eq!(cert.subject(), &subject);
    }

    #[test]
    fn test_ca_signed_leaf() {
        let signer = CertificateSigner::new();
        let root = signer.generate(&ca_params("root"), None).unwrap();
        let root_cert = CertificateReader::from_pem(&root.certificate).unwrap();

        let mut leaf_params = CertificateGenerationParameters::signed_by("leaf", "/root");
        leaf_params.duration = 30;
        leaf_params.alternative_names = [
            AlternativeName::Dns("leaf.example.com".into()),
            AlternativeName::Ip("10.0.0.1".parse().unwrap()),
        ]
        .into_iter()
        .collect();
        leaf_params.key_usage = [KeyUsage::DigitalSignature, KeyUsage::KeyEncipherment]
            .into_iter()
            .collect();
        leaf_params.extended_key_usage = [ExtendedKeyUsage::ServerAuth].into_iter().collect();

        let authority = CertificateAuthority {
            certificate: &root.certificate,
            private_key: &root.private_key,
        };
        let leaf = signer.generate(&leaf_params, Some(&authority)).unwrap();
        let leaf_cert = CertificateReader::from_pem(&leaf.certificate).unwrap();

        assert!(!leaf_cert.is_ca());
        assert!(!leaf_cert.is_self_signed());
        assert!(leaf_cert.is_signed_by(&root_cert));
        assert_eq!(leaf_cert.issuer_der(), root_cert.subject_der());
        assert_eq!(
            leaf_cert.authority_key_identifier(),
            root_cert.subject_key_identifier()
        );
        assert_eq!(leaf_cert.duration_days(), 30);

        let recovered = leaf_cert.generation_parameters(Some("/root".into()));
        assert_eq!(recovered, leaf_params);
    }

    #[test]
    fn test_intermediate_ca_chain() {
        let signer = CertificateSigner::new();
        let root = signer.generate(&ca_params("root"), None).unwrap();

        let mut intermediate_params = CertificateGenerationParameters::signed_by("mid", "/root");
        intermediate_params.is_ca = true;
        let intermediate = signer
            .generate(
                &intermediate_params,
                Some(&CertificateAuthority {
                    certificate: &root.certificate,
                    private_key: &root.private_key,
                }),
            )
            .unwrap();

        let leaf = signer
            .generate(
                &CertificateGenerationParameters::signed_by("leaf", "/mid"),
                Some(&CertificateAuthority {
                    certificate: &intermediate.certificate,
                    private_key: &intermediate.private_key,
                }),
            )
            .unwrap();

        let mid_cert = CertificateReader::from_pem(&intermediate.certificate).unwrap();
        let leaf_cert = CertificateReader::from_pem(&leaf.certificate).unwrap();
        assert!(mid_cert.is_ca());
        assert!(!mid_cert.is_self_signed());
        assert!(leaf_cert.is_signed_by(&mid_cert));
        assert_eq!(
            leaf_cert.authority_key_identifier(),
            mid_cert.subject_key_identifier()
        );
    }

    #[test]
    fn test_issuer_name_matches_multi_attribute_ca_subject() {
        let signer = CertificateSigner::new();
        let mut root_params = ca_params("unused");
        root_params.subject = SubjectName {
            organization: Some("Org".into()),
            organization_unit: Some("Unit".into()),
            locality: Some("Town".into()),
            state: Some("State".into()),
            country: Some("US".into()),
            common_name: Some("root".into()),
        };
        let root = signer.generate(&root_params, None).unwrap();
        let root_cert = CertificateReader::from_pem(&root.certificate).unwrap();

        let leaf = signer
            .generate(
                &CertificateGenerationParameters::signed_by("leaf", "/root"),
                Some(&CertificateAuthority {
                    certificate: &root.certificate,
                    private_key: &root.private_key,
                }),
            )
            .unwrap();
        let leaf_cert = CertificateReader::from_pem(&leaf.certificate).unwrap();
        assert_eq!(leaf_cert.issuer_der(), root_cert.subject_der());
        assert!(ensure_issued_by(&leaf.certificate, &root_cert).is_ok());
    }

    #[test]
    fn test_foreign_issuer_name_is_rejected() {
        let signer = CertificateSigner::new();
        let root = signer.generate(&ca_params("root"), None).unwrap();
        let other = signer.generate(&ca_params("other"), None).unwrap();
        let other_cert = CertificateReader::from_pem(&other.certificate).unwrap();

        let leaf = signer
            .generate(
                &CertificateGenerationParameters::signed_by("leaf", "/root"),
                Some(&CertificateAuthority {
                    certificate: &root.certificate,
                    private_key: &root.private_key,
                }),
            )
            .unwrap();
        assert!(matches!(
            ensure_issued_by(&leaf.certificate, &other_cert),
            Err(PkiError::Signing(_))
        ));
    }

    #[test]
    fn test_serials_are_positive_and_distinct() {
        let a = generate_serial();
        let b = generate_serial();
        assert_ne!(a, b);
        assert_eq!(a[0] & 0x80, 0);
        assert_eq!(a.len(), SERIAL_LEN);
    }
}
