//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::{Map, Value};

use credvault_core::{
    CredentialValue, PasswordParameters, PermissionEntry, PermissionOperation, MAX_PASSWORD_LENGTH,
    MIN_PASSWORD_LENGTH,
};

/// Generate one path segment.
pub fn segment() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_.-]{1,12}".prop_map(String::from)
}

/// Generate a valid, normalized credential name.
pub fn credential_name() -> impl Strategy<Value = String> {
    prop::collection::vec(segment(), 1..=4).prop_map(|segments| format!("/{}", segments.join("/")))
}

/// Generate a valid name, with or without the leading slash.
pub fn raw_credential_name() -> impl Strategy<Value = String> {
    (credential_name(), any::<bool>()).prop_map(|(name, strip)| {
        if strip {
            name.trim_start_matches('/').to_string()
        } else {
            name
        }
    })
}

/// Generate an actor identifier.
pub fn actor() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{3,10}".prop_map(|id| format!("uaa-user:{}", id)),
        "[a-z]{3,10}".prop_map(|id| format!("uaa-client:{}", id)),
    ]
}

/// Generate a permission operation.
pub fn operation() -> impl Strategy<Value = PermissionOperation> {
    prop::sample::select(PermissionOperation::ALL.to_vec())
}

/// Generate a non-empty operation list (may repeat).
pub fn operations() -> impl Strategy<Value = Vec<PermissionOperation>> {
    prop::collection::vec(operation(), 1..=5)
}

/// Generate a valid permission entry on a name or a wildcard path.
pub fn permission_entry() -> impl Strategy<Value = PermissionEntry> {
    (credential_name(), any::<bool>(), actor(), operations()).prop_map(
        |(path, wildcard, actor, operations)| {
            let path = if wildcard { format!("{}/*", path) } else { path };
            PermissionEntry::new(path, actor, operations)
        },
    )
}

/// Generate valid password parameters.
pub fn password_parameters() -> impl Strategy<Value = PasswordParameters> {
    (
        MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH,
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(
            |(length, exclude_upper, exclude_lower, exclude_number, include_special, only_hex)| {
                PasswordParameters {
                    length,
                    exclude_upper,
                    exclude_lower,
                    exclude_number,
                    include_special,
                    only_hex,
                }
            },
        )
        .prop_filter("at least one charset", |p| p.validate().is_ok())
}

/// Generate a JSON object value.
pub fn json_object() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map(
        "[a-z]{1,8}",
        prop_oneof![
            any::<i64>().prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            "[ -~]{0,20}".prop_map(Value::from),
        ],
        1..=6,
    )
    .prop_map(|entries| entries.into_iter().collect())
}

/// Generate a caller-settable value that needs no key material.
pub fn simple_value() -> impl Strategy<Value = CredentialValue> {
    prop_oneof![
        "[ -~]{1,64}".prop_map(CredentialValue::Password),
        "[ -~]{1,64}".prop_map(CredentialValue::Value),
        json_object().prop_map(CredentialValue::Json),
    ]
}
