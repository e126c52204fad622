//! The set of keys known to this process.

use std::collections::HashMap;

use crate::error::{CryptoError, Result};
use crate::key::{EncryptionKey, EncryptionKeyId};

/// All configured keys, exactly one of which is active.
#[derive(Debug, Clone)]
pub struct KeySet {
    active: EncryptionKeyId,
    keys: HashMap<EncryptionKeyId, EncryptionKey>,
}

impl KeySet {
    /// Build a key set. `active` must name one of `keys`.
    pub fn new(keys: Vec<EncryptionKey>, active: EncryptionKeyId) -> Result<Self> {
        let mut map = HashMap::with_capacity(keys.len());
        for key in keys {
            let id = key.id();
            if map.insert(id, key).is_some() {
                return Err(CryptoError::InvalidKeySet(format!("duplicate key id {}", id)));
            }
        }

        if !map.contains_key(&active) {
            return Err(CryptoError::InvalidKeySet(format!(
                "active key {} is not in the key set",
                active
            )));
        }

        Ok(Self { active, keys: map })
    }

    /// A key set holding a single, active key.
    pub fn single(key: EncryptionKey) -> Self {
        let active = key.id();
        let mut keys = HashMap::new();
        keys.insert(active, key);
        Self { active, keys }
    }

    /// The id of the active key.
    pub fn active_id(&self) -> EncryptionKeyId {
        self.active
    }

    /// The active key.
    pub fn active_key(&self) -> Result<&EncryptionKey> {
        self.keys
            .get(&self.active)
            .ok_or(CryptoError::UnknownKey(self.active))
    }

    /// Look up a key by id.
    pub fn get(&self, id: &EncryptionKeyId) -> Option<&EncryptionKey> {
        self.keys.get(id)
    }

    /// Whether a key with this id is configured.
    pub fn contains(&self, id: &EncryptionKeyId) -> bool {
        self.keys.contains_key(id)
    }

    /// All configured key ids.
    pub fn ids(&self) -> Vec<EncryptionKeyId> {
        self.keys.keys().copied().collect()
    }

    /// Ids of every configured key except the active one.
    pub fn inactive_ids(&self) -> Vec<EncryptionKeyId> {
        self.keys
            .keys()
            .filter(|id| **id != self.active)
            .copied()
            .collect()
    }

    /// Number of configured keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set is empty. A constructed set never is.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_must_be_present() {
        let key = EncryptionKey::generate(EncryptionKeyId::new());
        let result = KeySet::new(vec![key], EncryptionKeyId::new());
        assert!(matches!(result, Err(CryptoError::InvalidKeySet(_))));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let id = EncryptionKeyId::new();
        let k1 = EncryptionKey::generate(id);
        let k2 = EncryptionKey::generate(id);
        assert!(KeySet::new(vec![k1, k2], id).is_err());
    }

    #[test]
    fn test_inactive_ids() {
        let active = EncryptionKey::generate(EncryptionKeyId::new());
        let old = EncryptionKey::generate(EncryptionKeyId::new());
        let active_id = active.id();
        let old_id = old.id();

        let set = KeySet::new(vec![active, old], active_id).unwrap();
        assert_eq!(set.active_id(), active_id);
        assert_eq!(set.inactive_ids(), vec![old_id]);
        assert_eq!(set.len(), 2);
    }
}
