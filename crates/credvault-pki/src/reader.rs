//! Certificate inspection.
//!
//! [`CertificateReader`] parses a PEM certificate once and keeps an owned
//! summary of everything the vault asks about: subject, usages, CA flag, key
//! identifiers, validity, key length. From that summary it can reconstruct
//! the [`CertificateGenerationParameters`] the certificate was minted with,
//! which is how regeneration works without a request body.

use std::collections::BTreeSet;
use std::net::IpAddr;

use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::pem::parse_x509_pem;
use x509_parser::public_key::PublicKey;
use x509_parser::x509::X509Name;

use crate::error::{PkiError, Result};
use crate::keys::{strip_leading_zeros, RsaKeyPair};
use crate::params::{
    AlternativeName, CertificateGenerationParameters, DnAttribute, ExtendedKeyUsage, KeyUsage,
    SubjectName,
};

const SECONDS_PER_DAY: i64 = 86_400;

/// A parsed certificate.
#[derive(Debug, Clone)]
pub struct CertificateReader {
    der: Vec<u8>,
    subject: SubjectName,
    subject_der: Vec<u8>,
    issuer_der: Vec<u8>,
    serial: Vec<u8>,
    not_before: i64,
    not_after: i64,
    is_ca: bool,
    self_signed: bool,
    key_length: u32,
    modulus: Vec<u8>,
    alternative_names: BTreeSet<AlternativeName>,
    key_usage: BTreeSet<KeyUsage>,
    extended_key_usage: BTreeSet<ExtendedKeyUsage>,
    subject_key_identifier: Option<Vec<u8>>,
    authority_key_identifier: Option<Vec<u8>>,
}

impl CertificateReader {
    /// Parse a PEM-encoded certificate.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let (_, pem) = parse_x509_pem(pem.trim().as_bytes())
            .map_err(|e| PkiError::InvalidCertificate(e.to_string()))?;
        if pem.label != "CERTIFICATE" {
            return Err(PkiError::InvalidCertificate(format!(
                "unexpected PEM label {}",
                pem.label
            )));
        }
        Self::from_der(pem.contents)
    }

    /// Parse a DER-encoded certificate.
    pub fn from_der(der: Vec<u8>) -> Result<Self> {
        let cert = parse(&der)?;
        Self::extract(&cert, der.clone())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn subject(&self) -> &SubjectName {
        &self.subject
    }

    /// DER encoding of the subject name.
    pub fn subject_der(&self) -> &[u8] {
        &self.subject_der
    }

    /// DER encoding of the issuer name.
    pub fn issuer_der(&self) -> &[u8] {
        &self.issuer_der
    }

    /// Serial number as big-endian bytes.
    pub fn serial(&self) -> &[u8] {
        &self.serial
    }

    /// `notBefore` as unix seconds.
    pub fn not_before(&self) -> i64 {
        self.not_before
    }

    /// `notAfter` as unix seconds.
    pub fn not_after(&self) -> i64 {
        self.not_after
    }

    /// Validity period in whole days.
    pub fn duration_days(&self) -> u32 {
        ((self.not_after - self.not_before) / SECONDS_PER_DAY).max(0) as u32
    }

    /// Whether basicConstraints marks this certificate a CA.
    pub fn is_ca(&self) -> bool {
        self.is_ca
    }

    /// Whether the issuer equals the subject and the signature verifies
    /// against the certificate's own key.
    pub fn is_self_signed(&self) -> bool {
        self.self_signed
    }

    /// RSA modulus length in bits.
    pub fn key_length(&self) -> u32 {
        self.key_length
    }

    pub fn alternative_names(&self) -> &BTreeSet<AlternativeName> {
        &self.alternative_names
    }

    pub fn key_usage(&self) -> &BTreeSet<KeyUsage> {
        &self.key_usage
    }

    pub fn extended_key_usage(&self) -> &BTreeSet<ExtendedKeyUsage> {
        &self.extended_key_usage
    }

    pub fn subject_key_identifier(&self) -> Option<&[u8]> {
        self.subject_key_identifier.as_deref()
    }

    pub fn authority_key_identifier(&self) -> Option<&[u8]> {
        self.authority_key_identifier.as_deref()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Derived checks
    // ─────────────────────────────────────────────────────────────────────────

    /// Reconstruct the parameters this certificate was generated with.
    ///
    /// `ca_name` cannot be read back from a certificate; callers pass the
    /// name they have on record, if any.
    pub fn generation_parameters(&self, ca_name: Option<String>) -> CertificateGenerationParameters {
        CertificateGenerationParameters {
            subject: self.subject.clone(),
            key_length: self.key_length,
            duration: self.duration_days(),
            self_signed: self.self_signed,
            is_ca: self.is_ca,
            ca_name,
            alternative_names: self.alternative_names.clone(),
            key_usage: self.key_usage.clone(),
            extended_key_usage: self.extended_key_usage.clone(),
        }
    }

    /// Whether `issuer` signed this certificate.
    pub fn is_signed_by(&self, issuer: &CertificateReader) -> bool {
        let (Ok(cert), Ok(issuer_cert)) = (parse(&self.der), parse(&issuer.der)) else {
            return false;
        };
        self.issuer_der == issuer.subject_der
            && cert
                .verify_signature(Some(issuer_cert.public_key()))
                .is_ok()
    }

    /// Whether `private_key_pem` is the private half of this certificate's key.
    pub fn matches_private_key(&self, private_key_pem: &str) -> Result<bool> {
        let pair = RsaKeyPair::from_pem(private_key_pem)?;
        Ok(pair.modulus() == self.modulus)
    }

    /// Whether the certificate is past its `notAfter` at `now` (unix seconds).
    pub fn is_expired_at(&self, now: i64) -> bool {
        now > self.not_after
    }
}

fn parse(der: &[u8]) -> Result<X509Certificate<'_>> {
    let (rest, cert) = x509_parser::parse_x509_certificate(der)
        .map_err(|e| PkiError::InvalidCertificate(e.to_string()))?;
    if !rest.is_empty() {
        return Err(PkiError::InvalidCertificate(
            "trailing data after certificate".into(),
        ));
    }
    Ok(cert)
}

impl CertificateReader {
    fn extract(cert: &X509Certificate<'_>, der: Vec<u8>) -> Result<Self> {
        let invalid = |e: x509_parser::error::X509Error| PkiError::InvalidCertificate(e.to_string());

        let subject_der = cert.subject().as_raw().to_vec();
        let issuer_der = cert.issuer().as_raw().to_vec();

        let is_ca = cert
            .basic_constraints()
            .map_err(invalid)?
            .is_some_and(|bc| bc.value.ca);

        let key_usage = match cert.key_usage().map_err(invalid)? {
            Some(ku) => {
                let ku = ku.value;
                [
                    (ku.digital_signature(), KeyUsage::DigitalSignature),
                    (ku.non_repudiation(), KeyUsage::NonRepudiation),
                    (ku.key_encipherment(), KeyUsage::KeyEncipherment),
                    (ku.data_encipherment(), KeyUsage::DataEncipherment),
                    (ku.key_agreement(), KeyUsage::KeyAgreement),
                    (ku.key_cert_sign(), KeyUsage::KeyCertSign),
                    (ku.crl_sign(), KeyUsage::CrlSign),
                    (ku.encipher_only(), KeyUsage::EncipherOnly),
                    (ku.decipher_only(), KeyUsage::DecipherOnly),
                ]
                .into_iter()
                .filter_map(|(set, usage)| set.then_some(usage))
                .collect()
            }
            None => BTreeSet::new(),
        };

        let extended_key_usage = match cert.extended_key_usage().map_err(invalid)? {
            Some(eku) => {
                let eku = eku.value;
                [
                    (eku.server_auth, ExtendedKeyUsage::ServerAuth),
                    (eku.client_auth, ExtendedKeyUsage::ClientAuth),
                    (eku.code_signing, ExtendedKeyUsage::CodeSigning),
                    (eku.email_protection, ExtendedKeyUsage::EmailProtection),
                    (eku.time_stamping, ExtendedKeyUsage::Timestamping),
                ]
                .into_iter()
                .filter_map(|(set, usage)| set.then_some(usage))
                .collect()
            }
            None => BTreeSet::new(),
        };

        let mut alternative_names = BTreeSet::new();
        if let Some(san) = cert.subject_alternative_name().map_err(invalid)? {
            for name in &san.value.general_names {
                match name {
                    GeneralName::DNSName(dns) => {
                        alternative_names.insert(AlternativeName::Dns(dns.to_string()));
                    }
                    GeneralName::IPAddress(bytes) => {
                        if let Some(ip) = ip_from_bytes(bytes) {
                            alternative_names.insert(AlternativeName::Ip(ip));
                        }
                    }
                    _ => {}
                }
            }
        }

        let mut subject_key_identifier = None;
        let mut authority_key_identifier = None;
        for ext in cert.extensions() {
            match ext.parsed_extension() {
                ParsedExtension::SubjectKeyIdentifier(kid) => {
                    subject_key_identifier = Some(kid.0.to_vec());
                }
                ParsedExtension::AuthorityKeyIdentifier(aki) => {
                    authority_key_identifier = aki.key_identifier.as_ref().map(|k| k.0.to_vec());
                }
                _ => {}
            }
        }

        let modulus = match cert.public_key().parsed().map_err(invalid)? {
            PublicKey::RSA(rsa) => strip_leading_zeros(rsa.modulus).to_vec(),
            _ => {
                return Err(PkiError::InvalidCertificate(
                    "only RSA certificates are supported".into(),
                ))
            }
        };
        let key_length = match modulus.first() {
            Some(first) => (modulus.len() as u32 - 1) * 8 + (8 - first.leading_zeros()),
            None => 0,
        };

        let self_signed =
            subject_der == issuer_der && cert.verify_signature(None).is_ok();

        Ok(Self {
            der,
            subject: subject_name(cert.subject())?,
            subject_der,
            issuer_der,
            serial: cert.raw_serial().to_vec(),
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
            is_ca,
            self_signed,
            key_length,
            modulus,
            alternative_names,
            key_usage,
            extended_key_usage,
            subject_key_identifier,
            authority_key_identifier,
        })
    }
}

fn subject_name(name: &X509Name<'_>) -> Result<SubjectName> {
    let mut subject = SubjectName::default();
    for value in name.iter_attributes() {
        let Some(arcs) = value.attr_type().iter() else {
            continue;
        };
        let arcs: Vec<u64> = arcs.collect();
        let Some(attribute) = DnAttribute::ORDER
            .into_iter()
            .find(|a| a.oid() == arcs.as_slice())
        else {
            continue;
        };
        if subject.get(attribute).is_some() {
            continue;
        }

        let text = value
            .as_str()
            .map_err(|e| PkiError::InvalidCertificate(e.to_string()))?;
        subject.set(attribute, Some(text.to_string()));
    }
    Ok(subject.normalized())
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().ok()?;
            Some(IpAddr::from(octets))
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().ok()?;
            Some(IpAddr::from(octets))
        }
        _ => None,
    }
}
