//! Credential name normalization and validation.

use crate::error::ValidationError;

/// Longest accepted credential name, in characters.
pub const MAX_NAME_LEN: usize = 1024;

/// Prefix `name` with `/` unless it already starts with one.
///
/// Idempotent: `normalize_name(normalize_name(x)) == normalize_name(x)`.
pub fn normalize_name(name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{}", name)
    }
}

/// Validate a caller-supplied name and return its normalized form.
pub fn validate_name(name: &str) -> Result<String, ValidationError> {
    if name.is_empty() || name == "/" {
        return Err(ValidationError::new("error.missing_name"));
    }

    let normalized = normalize_name(name);

    if normalized.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::new("error.credential.name_too_long"));
    }

    if normalized.contains("//") || normalized.ends_with('/') {
        return Err(ValidationError::new(
            "error.credential.invalid_slash_in_name",
        ));
    }

    if !normalized.chars().all(is_name_char) {
        return Err(ValidationError::new(
            "error.credential.invalid_character_in_name",
        ));
    }

    Ok(normalized)
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | '[' | ']')
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_valid_names() {
        assert_eq!(validate_name("app/db/password").unwrap(), "/app/db/password");
        assert_eq!(validate_name("/a").unwrap(), "/a");
        assert_eq!(validate_name("/certs/[0].pem").unwrap(), "/certs/[0].pem");
    }

    #[test]
    fn test_invalid_names() {
        let code = |name: &str| validate_name(name).unwrap_err().code;

        assert_eq!(code(""), "error.missing_name");
        assert_eq!(code("/"), "error.missing_name");
        assert_eq!(code("/a//b"), "error.credential.invalid_slash_in_name");
        assert_eq!(code("/a/"), "error.credential.invalid_slash_in_name");
        assert_eq!(code("/a b"), "error.credential.invalid_character_in_name");
        assert_eq!(code("/a*"), "error.credential.invalid_character_in_name");
        assert_eq!(
            code(&"x".repeat(MAX_NAME_LEN)),
            "error.credential.name_too_long"
        );
    }

    proptest! {
        #[test]
        fn prop_normalize_idempotent(name in "[a-z/]{0,32}") {
            let once = normalize_name(&name);
            prop_assert_eq!(normalize_name(&once), once.clone());
            prop_assert!(once.starts_with('/'));
        }
    }
}
