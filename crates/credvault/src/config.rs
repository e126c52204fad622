//! Vault configuration.
//!
//! Loaded from JSON; every field has a default so a partial document works.
//!
//! ```json
//! {
//!   "enforce_permissions": true,
//!   "encryption": {
//!     "keys": [
//!       { "encryption_password": "old-password", "active": false },
//!       { "encryption_password": "new-password", "active": true }
//!     ]
//!   },
//!   "rotation_batch_size": 100
//! }
//! ```

use std::collections::HashSet;
use std::fmt;

use credvault_core::{PasswordParameters, ValidationError, DEFAULT_PASSWORD_LENGTH};
use credvault_crypto::KdfParams;
use serde::Deserialize;

/// Default number of versions re-encrypted per rotation batch.
pub const DEFAULT_ROTATION_BATCH_SIZE: usize = 50;

/// Configuration for a [`crate::Vault`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// When `false`, every permission check passes.
    pub enforce_permissions: bool,
    /// Configured encryption keys.
    pub encryption: EncryptionConfig,
    /// Argon2id costs for password-derived keys.
    pub kdf: KdfParams,
    /// Versions re-encrypted per batch during key rotation.
    pub rotation_batch_size: usize,
    /// Length of generated passwords when a request gives none.
    pub default_password_length: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            enforce_permissions: true,
            encryption: EncryptionConfig::default(),
            kdf: KdfParams::default(),
            rotation_batch_size: DEFAULT_ROTATION_BATCH_SIZE,
            default_password_length: DEFAULT_PASSWORD_LENGTH,
        }
    }
}

impl VaultConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        let config: VaultConfig = serde_json::from_str(json)
            .map_err(|e| ValidationError::with_detail("error.config.invalid", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the key list and numeric bounds.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let keys = &self.encryption.keys;
        match keys.iter().filter(|k| k.active).count() {
            0 => return Err(ValidationError::new("error.config.no_active_key")),
            1 => {}
            _ => return Err(ValidationError::new("error.config.multiple_active_keys")),
        }

        let mut seen = HashSet::new();
        for key in keys {
            if key.encryption_password.is_empty() {
                return Err(ValidationError::new("error.config.empty_password"));
            }
            if !seen.insert(key.encryption_password.as_str()) {
                return Err(ValidationError::new("error.config.duplicate_password"));
            }
        }

        if self.rotation_batch_size == 0 {
            return Err(ValidationError::new("error.config.invalid_batch_size"));
        }
        PasswordParameters::with_length(self.default_password_length).validate()
    }
}

/// The configured encryption keys.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    pub keys: Vec<KeyConfig>,
}

/// One password-derived key.
#[derive(Clone, Deserialize)]
pub struct KeyConfig {
    pub encryption_password: String,
    #[serde(default)]
    pub active: bool,
}

impl KeyConfig {
    pub fn new(encryption_password: impl Into<String>, active: bool) -> Self {
        Self {
            encryption_password: encryption_password.into(),
            active,
        }
    }
}

impl fmt::Debug for KeyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyConfig")
            .field("encryption_password", &"<redacted>")
            .field("active", &self.active)
            .finish()
    }
}
