//! Request validation.
//!
//! Every check here runs before any key material is generated. The first
//! failing check determines the reason code.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{PkiError, Result};
use crate::params::{
    AlternativeName, CertificateGenerationParameters, CertificateGenerationRequest,
    ExtendedKeyUsage, KeyUsage, DEFAULT_DURATION_DAYS, DEFAULT_KEY_LENGTH,
    MAX_ALTERNATIVE_NAME_LEN, MAX_DURATION_DAYS, VALID_KEY_LENGTHS,
};

fn wildcard_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\*?(\.[A-Za-z0-9-]+)*$").unwrap_or_else(|e| panic!("bad wildcard regex: {e}"))
    })
}

fn domain_label_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_]([A-Za-z0-9_-]{0,61}[A-Za-z0-9_])?$")
            .unwrap_or_else(|e| panic!("bad label regex: {e}"))
    })
}

/// Validate a request and produce generation parameters.
///
/// Applies the derived defaults once: key length 2048, duration 365 days, and
/// `self_signed = true` for a CA request with no signing CA.
pub fn validate_request(
    request: &CertificateGenerationRequest,
) -> Result<CertificateGenerationParameters> {
    // 1. Subject must carry at least one attribute
    let subject = request.subject();
    if subject.is_empty() {
        return Err(PkiError::invalid("error.missing_certificate_parameters"));
    }

    // 2. Field length ceilings
    for (attribute, value) in subject.attributes() {
        if value.chars().count() > attribute.max_len() {
            return Err(PkiError::invalid(attribute.too_long_code()));
        }
    }

    // 3. Signing mode
    let has_ca_name = request.has_ca_name();
    if has_ca_name && request.self_sign {
        return Err(PkiError::invalid("error.ca_and_self_sign"));
    }
    if !has_ca_name && !request.self_sign && !request.is_ca {
        return Err(PkiError::invalid("error.missing_signing_ca"));
    }
    let self_signed = request.self_sign || (request.is_ca && !has_ca_name);

    // 4. Key length
    let key_length = request.key_length.unwrap_or(DEFAULT_KEY_LENGTH);
    validate_key_length(key_length)?;

    // 5. Duration
    let duration = request.duration.unwrap_or(DEFAULT_DURATION_DAYS);
    validate_duration(duration)?;

    // 6. Alternative names
    let alternative_names = request
        .alternative_names
        .iter()
        .map(|name| parse_alternative_name(name))
        .collect::<Result<BTreeSet<_>>>()?;

    // 7. Usages
    let extended_key_usage = request
        .extended_key_usage
        .iter()
        .map(|s| s.parse::<ExtendedKeyUsage>())
        .collect::<Result<BTreeSet<_>>>()?;
    let key_usage = request
        .key_usage
        .iter()
        .map(|s| s.parse::<KeyUsage>())
        .collect::<Result<BTreeSet<_>>>()?;

    Ok(CertificateGenerationParameters {
        subject,
        key_length,
        duration,
        self_signed,
        is_ca: request.is_ca,
        ca_name: request.ca.clone().filter(|ca| !ca.is_empty()),
        alternative_names,
        key_usage,
        extended_key_usage,
    })
}

/// Check an RSA modulus length against the accepted set.
pub fn validate_key_length(key_length: u32) -> Result<()> {
    if VALID_KEY_LENGTHS.contains(&key_length) {
        Ok(())
    } else {
        Err(PkiError::invalid_with(
            "error.invalid_key_length",
            key_length.to_string(),
        ))
    }
}

/// Check a validity period in days.
pub fn validate_duration(duration: u32) -> Result<()> {
    if (1..=MAX_DURATION_DAYS).contains(&duration) {
        Ok(())
    } else {
        Err(PkiError::invalid_with(
            "error.invalid_duration",
            duration.to_string(),
        ))
    }
}

/// Classify a subject alternative name as IP literal or DNS name.
///
/// DNS names must be valid domain names or wildcard patterns.
pub fn parse_alternative_name(name: &str) -> Result<AlternativeName> {
    if name.is_empty() || name.len() > MAX_ALTERNATIVE_NAME_LEN {
        return Err(PkiError::invalid_with("error.invalid_alternate_name", name));
    }

    if let Ok(ip) = name.parse::<IpAddr>() {
        return Ok(AlternativeName::Ip(ip));
    }

    if is_valid_domain_name(name) || (name.starts_with('*') && wildcard_pattern().is_match(name))
    {
        return Ok(AlternativeName::Dns(name.to_string()));
    }

    Err(PkiError::invalid_with("error.invalid_alternate_name", name))
}

fn is_valid_domain_name(name: &str) -> bool {
    let name = name.strip_suffix('.').unwrap_or(name);
    if name.is_empty() {
        return false;
    }

    let labels: Vec<&str> = name.split('.').collect();
    if !labels.iter().all(|label| domain_label_pattern().is_match(label)) {
        return false;
    }

    // A purely numeric final label would read as a malformed IP address
    labels
        .last()
        .is_some_and(|tld| !tld.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CertificateGenerationRequest {
        CertificateGenerationRequest {
            common_name: Some("example.com".into()),
            self_sign: true,
            ..Default::default()
        }
    }

    fn code(err: PkiError) -> &'static str {
        match err {
            PkiError::InvalidParameter { code, .. } => code,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_defaults_applied() {
        let params = validate_request(&request()).unwrap();
        assert_eq!(params.key_length, 2048);
        assert_eq!(params.duration, 365);
        assert!(params.self_signed);
        assert!(!params.is_ca);
    }

    #[test]
    fn test_ca_without_signer_is_self_signed() {
        let req = CertificateGenerationRequest {
            common_name: Some("root".into()),
            is_ca: true,
            ..Default::default()
        };
        let params = validate_request(&req).unwrap();
        assert!(params.self_signed);
        assert!(params.is_ca);
    }

    #[test]
    fn test_intermediate_ca_is_not_self_signed() {
        let req = CertificateGenerationRequest {
            common_name: Some("intermediate".into()),
            is_ca: true,
            ca: Some("/root-ca".into()),
            ..Default::default()
        };
        let params = validate_request(&req).unwrap();
        assert!(!params.self_signed);
        assert_eq!(params.ca_name.as_deref(), Some("/root-ca"));
    }

    #[test]
    fn test_missing_subject() {
        let req = CertificateGenerationRequest {
            self_sign: true,
            common_name: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(
            code(validate_request(&req).unwrap_err()),
            "error.missing_certificate_parameters"
        );
    }

    #[test]
    fn test_signing_mode_conflicts() {
        let mut req = request();
        req.ca = Some("/ca".into());
        assert_eq!(
            code(validate_request(&req).unwrap_err()),
            "error.ca_and_self_sign"
        );

        let mut req = request();
        req.self_sign = false;
        assert_eq!(
            code(validate_request(&req).unwrap_err()),
            "error.missing_signing_ca"
        );
    }

    #[test]
    fn test_key_length_and_duration_bounds() {
        let mut req = request();
        req.key_length = Some(1024);
        assert_eq!(
            code(validate_request(&req).unwrap_err()),
            "error.invalid_key_length"
        );

        let mut req = request();
        req.duration = Some(0);
        assert_eq!(
            code(validate_request(&req).unwrap_err()),
            "error.invalid_duration"
        );

        req.duration = Some(3651);
        assert!(validate_request(&req).is_err());

        req.duration = Some(3650);
        assert!(validate_request(&req).is_ok());
    }

    #[test]
    fn test_field_length_ceilings() {
        let mut req = request();
        req.country = Some("USA".into());
        assert_eq!(
            code(validate_request(&req).unwrap_err()),
            "error.invalid_country_length"
        );

        let mut req = request();
        req.common_name = Some("a".repeat(65));
        assert_eq!(
            code(validate_request(&req).unwrap_err()),
            "error.invalid_common_name_length"
        );

        let mut req = request();
        req.locality = Some("l".repeat(128));
        assert!(validate_request(&req).is_ok());
    }

    #[test]
    fn test_alternative_names() {
        assert_eq!(
            parse_alternative_name("10.0.0.1").unwrap(),
            AlternativeName::Ip("10.0.0.1".parse().unwrap())
        );
        assert_eq!(
            parse_alternative_name("::1").unwrap(),
            AlternativeName::Ip("::1".parse().unwrap())
        );
        assert_eq!(
            parse_alternative_name("*.example.com").unwrap(),
            AlternativeName::Dns("*.example.com".into())
        );
        assert!(parse_alternative_name("foo.example.com").is_ok());

        assert!(parse_alternative_name("").is_err());
        assert!(parse_alternative_name("foo..com").is_err());
        assert!(parse_alternative_name("-bad.com").is_err());
        assert!(parse_alternative_name("*.*.example.com").is_err());
        assert!(parse_alternative_name("1.2.3.999").is_err());
        assert!(parse_alternative_name(&"a.".repeat(127)).is_err());
    }

    #[test]
    fn test_unknown_usage_names_token() {
        let mut req = request();
        req.extended_key_usage = vec!["server_auth".into(), "bogus".into()];
        match validate_request(&req).unwrap_err() {
            PkiError::InvalidParameter { code, detail } => {
                assert_eq!(code, "error.invalid_extended_key_usage");
                assert_eq!(detail.as_deref(), Some("bogus"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let mut req = request();
        req.key_usage = vec!["crl_sign".into(), "sign_everything".into()];
        assert_eq!(
            code(validate_request(&req).unwrap_err()),
            "error.invalid_key_usage"
        );
    }
}
