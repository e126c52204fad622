//! Permission rows and operation sets.
//!
//! A [`PermissionData`] row grants one actor a set of operations on one path.
//! The decision logic lives in `credvault-perms`; these are the shapes it and
//! the stores share.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValidationError;
use crate::name::validate_name;
use crate::types::PermissionId;

/// Suffix marking a path as a prefix grant.
pub const WILDCARD: char = '*';

/// One grantable operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionOperation {
    Read,
    Write,
    Delete,
    ReadAcl,
    WriteAcl,
}

impl PermissionOperation {
    pub const ALL: [PermissionOperation; 5] = [
        PermissionOperation::Read,
        PermissionOperation::Write,
        PermissionOperation::Delete,
        PermissionOperation::ReadAcl,
        PermissionOperation::WriteAcl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionOperation::Read => "read",
            PermissionOperation::Write => "write",
            PermissionOperation::Delete => "delete",
            PermissionOperation::ReadAcl => "read_acl",
            PermissionOperation::WriteAcl => "write_acl",
        }
    }

    const fn bit(self) -> u8 {
        match self {
            PermissionOperation::Read => 1,
            PermissionOperation::Write => 1 << 1,
            PermissionOperation::Delete => 1 << 2,
            PermissionOperation::ReadAcl => 1 << 3,
            PermissionOperation::WriteAcl => 1 << 4,
        }
    }
}

impl fmt::Display for PermissionOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionOperation {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PermissionOperation::ALL
            .iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| ValidationError::with_detail("error.permission.invalid_operation", s))
    }
}

/// A set of operations, stored as a bitmask.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PermissionOperations(u8);

impl PermissionOperations {
    const MASK: u8 = 0b1_1111;

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn all() -> Self {
        Self(Self::MASK)
    }

    /// Rebuild from stored bits; unknown bits are dropped.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & Self::MASK)
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, op: PermissionOperation) -> bool {
        self.0 & op.bit() != 0
    }

    pub fn insert(&mut self, op: PermissionOperation) {
        self.0 |= op.bit();
    }

    pub fn remove(&mut self, op: PermissionOperation) {
        self.0 &= !op.bit();
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether every operation in `other` is also in `self`.
    pub fn is_superset(&self, other: &Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Operations in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = PermissionOperation> + '_ {
        PermissionOperation::ALL
            .into_iter()
            .filter(move |op| self.contains(*op))
    }

    pub fn to_vec(&self) -> Vec<PermissionOperation> {
        self.iter().collect()
    }
}

impl FromIterator<PermissionOperation> for PermissionOperations {
    fn from_iter<I: IntoIterator<Item = PermissionOperation>>(iter: I) -> Self {
        let mut ops = Self::empty();
        for op in iter {
            ops.insert(op);
        }
        ops
    }
}

impl fmt::Debug for PermissionOperations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl Serialize for PermissionOperations {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for PermissionOperations {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let ops = Vec::<PermissionOperation>::deserialize(deserializer)?;
        Ok(ops.into_iter().collect())
    }
}

/// One stored grant: `actor` may perform `operations` on `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionData {
    pub uuid: PermissionId,
    pub path: String,
    pub actor: String,
    pub operations: PermissionOperations,
}

impl PermissionData {
    pub fn new(path: impl Into<String>, actor: impl Into<String>, operations: PermissionOperations) -> Self {
        Self {
            uuid: PermissionId::new(),
            path: path.into(),
            actor: actor.into(),
            operations,
        }
    }

    pub fn has_permission(&self, op: PermissionOperation) -> bool {
        self.operations.contains(op)
    }

    /// Whether this row's path covers `credential_path`.
    ///
    /// A path ending in `*` covers every path it prefixes; any other path
    /// covers only itself.
    pub fn covers(&self, credential_path: &str) -> bool {
        match self.path.strip_suffix(WILDCARD) {
            Some(prefix) => credential_path.starts_with(prefix),
            None => self.path == credential_path,
        }
    }
}

/// A caller-supplied grant, before it becomes a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEntry {
    pub path: String,
    pub actor: String,
    pub operations: Vec<PermissionOperation>,
}

impl PermissionEntry {
    pub fn new(
        path: impl Into<String>,
        actor: impl Into<String>,
        operations: impl IntoIterator<Item = PermissionOperation>,
    ) -> Self {
        Self {
            path: path.into(),
            actor: actor.into(),
            operations: operations.into_iter().collect(),
        }
    }

    /// Check the entry and return it with its path normalized.
    pub fn validated(&self) -> Result<Self, ValidationError> {
        if self.actor.trim().is_empty() {
            return Err(ValidationError::new("error.permission.missing_actor"));
        }
        if self.operations.is_empty() {
            return Err(ValidationError::new("error.permission.missing_operations"));
        }
        Ok(Self {
            path: validate_permission_path(&self.path)?,
            actor: self.actor.clone(),
            operations: self.operations.clone(),
        })
    }

    pub fn operation_set(&self) -> PermissionOperations {
        self.operations.iter().copied().collect()
    }
}

/// Validate a permission path: a credential name, optionally ending in `*`.
pub fn validate_permission_path(path: &str) -> Result<String, ValidationError> {
    let Some(prefix) = path.strip_suffix(WILDCARD) else {
        return validate_name(path);
    };

    match prefix.trim_end_matches('/') {
        "" => Ok(format!("/{}", WILDCARD)),
        stem => {
            let stem = validate_name(stem)?;
            let slash = if prefix.ends_with('/') { "/" } else { "" };
            Ok(format!("{}{}{}", stem, slash, WILDCARD))
        }
    }
}

/// Every stored path that could cover `credential_path`: the path itself,
/// the global wildcard, and one wildcard per prefix.
pub fn candidate_paths(credential_path: &str) -> Vec<String> {
    let mut paths = vec![credential_path.to_string(), WILDCARD.to_string()];
    for (i, _) in credential_path.char_indices().skip(1) {
        paths.push(format!("{}{}", &credential_path[..i], WILDCARD));
    }
    paths.push(format!("{}{}", credential_path, WILDCARD));
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_operation_parse() {
        assert_eq!(
            "READ_ACL".parse::<PermissionOperation>().unwrap(),
            PermissionOperation::ReadAcl
        );
        let err = "admin".parse::<PermissionOperation>().unwrap_err();
        assert_eq!(err.code, "error.permission.invalid_operation");
    }

    #[test]
    fn test_operation_set() {
        let mut ops: PermissionOperations =
            [PermissionOperation::Read, PermissionOperation::Write].into_iter().collect();
        assert!(ops.contains(PermissionOperation::Read));
        assert!(!ops.contains(PermissionOperation::Delete));

        ops.remove(PermissionOperation::Read);
        ops.remove(PermissionOperation::Write);
        assert!(ops.is_empty());

        assert_eq!(PermissionOperations::all().to_vec(), PermissionOperation::ALL.to_vec());
        assert_eq!(PermissionOperations::from_bits(0xff), PermissionOperations::all());
    }

    #[test]
    fn test_operations_serialize_as_names() {
        let ops: PermissionOperations =
            [PermissionOperation::WriteAcl, PermissionOperation::Read].into_iter().collect();
        let json = serde_json::to_string(&ops).unwrap();
        assert_eq!(json, r#"["read","write_acl"]"#);
        let back: PermissionOperations = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ops);
    }

    #[test]
    fn test_covers() {
        let exact = PermissionData::new("/a/b", "actor", PermissionOperations::all());
        assert!(exact.covers("/a/b"));
        assert!(!exact.covers("/a/bc"));

        let wildcard = PermissionData::new("/a/*", "actor", PermissionOperations::all());
        assert!(wildcard.covers("/a/b"));
        assert!(wildcard.covers("/a/b/c"));
        assert!(!wildcard.covers("/ab"));

        let global = PermissionData::new("*", "actor", PermissionOperations::all());
        assert!(global.covers("/anything"));
    }

    #[test]
    fn test_candidate_paths_include_every_cover() {
        let paths = candidate_paths("/a/b");
        for p in ["/a/b", "*", "/*", "/a*", "/a/*", "/a/b*"] {
            assert!(paths.contains(&p.to_string()), "missing {}", p);
        }
    }

    #[test]
    fn test_entry_validation() {
        let entry = PermissionEntry::new("a/b", "uaa-user:1", [PermissionOperation::Read]);
        assert_eq!(entry.validated().unwrap().path, "/a/b");

        let wildcard = PermissionEntry::new("/a/*", "uaa-user:1", [PermissionOperation::Read]);
        assert_eq!(wildcard.validated().unwrap().path, "/a/*");

        let no_actor = PermissionEntry::new("/a", "", [PermissionOperation::Read]);
        assert_eq!(
            no_actor.validated().unwrap_err().code,
            "error.permission.missing_actor"
        );

        let no_ops = PermissionEntry::new("/a", "x", []);
        assert_eq!(
            no_ops.validated().unwrap_err().code,
            "error.permission.missing_operations"
        );
    }

    fn operation() -> impl Strategy<Value = PermissionOperation> {
        prop::sample::select(PermissionOperation::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_set_matches_vec_semantics(ops in prop::collection::vec(operation(), 0..10)) {
            let set: PermissionOperations = ops.iter().copied().collect();
            for op in PermissionOperation::ALL {
                prop_assert_eq!(set.contains(op), ops.contains(&op));
            }
            prop_assert_eq!(PermissionOperations::from_bits(set.bits()), set);
        }

        #[test]
        fn prop_candidates_cover_wildcards(path in "/[a-z]{1,4}(/[a-z]{1,4}){0,3}") {
            let candidates = candidate_paths(&path);
            for candidate in candidates {
                let row = PermissionData::new(candidate, "a", PermissionOperations::all());
                prop_assert!(row.covers(&path));
            }
        }
    }
}
