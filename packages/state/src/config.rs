//! # Store configuration — `renalcare.toml`
//!
//! Defines the TOML file that tells a [`crate::ProfileStore`] where its data
//! lives and how it persists (filename: [`StoreConfig::filename`] =
//! `"renalcare.toml"`).
//!
//! ## Structure
//!
//! ```toml
//! [storage]
//! state_key = "renalcare-state"   # durable slot holding the state blob
//! theme_key = "renalcare-theme"   # durable slot holding "light" / "dark"
//! key_slot = "renalcare-key"      # session slot holding the exported key
//! encrypt_at_rest = true
//!
//! [persistence]
//! autosave = true                 # persist after every mutation
//! seed_starter_medications = true # first run only
//! ```
//!
//! All structs derive `Default` (with production defaults) so that a missing or
//! empty config file is equivalent to the default configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use store::{CryptoSupport, KeyValueStore, SecureStorage};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Top-level configuration stored in `renalcare.toml`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

/// Storage slot names and encryption.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_state_key")]
    pub state_key: String,
    #[serde(default = "default_theme_key")]
    pub theme_key: String,
    #[serde(default = "default_key_slot")]
    pub key_slot: String,
    #[serde(default = "default_true")]
    pub encrypt_at_rest: bool,
}

/// Persistence behaviour.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Schedule a background persist after every mutation. When off, callers
    /// persist with [`crate::ProfileStore::flush`].
    #[serde(default = "default_true")]
    pub autosave: bool,
    #[serde(default = "default_true")]
    pub seed_starter_medications: bool,
}

fn default_state_key() -> String {
    "renalcare-state".to_string()
}

fn default_theme_key() -> String {
    "renalcare-theme".to_string()
}

fn default_key_slot() -> String {
    store::DEFAULT_KEY_SLOT.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_key: default_state_key(),
            theme_key: default_theme_key(),
            key_slot: default_key_slot(),
            encrypt_at_rest: true,
        }
    }
}

impl StorageConfig {
    /// Wrap `durable` in a [`SecureStorage`] keyed from `session` according to
    /// this section. With `encrypt_at_rest` off values pass through unchanged.
    pub fn secure_storage<D, K>(&self, durable: D, session: K) -> SecureStorage<D, K>
    where
        D: KeyValueStore,
        K: KeyValueStore,
    {
        let storage = SecureStorage::new(durable, session).with_key_slot(self.key_slot.clone());
        if self.encrypt_at_rest {
            storage
        } else {
            storage.with_support(CryptoSupport::Unavailable)
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            autosave: true,
            seed_starter_medications: true,
        }
    }
}

impl StoreConfig {
    /// Builder method to toggle autosave.
    pub fn with_autosave(mut self, autosave: bool) -> Self {
        self.persistence.autosave = autosave;
        self
    }

    /// Builder method to toggle encryption at rest.
    pub fn with_encryption(mut self, encrypt: bool) -> Self {
        self.storage.encrypt_at_rest = encrypt;
        self
    }

    /// The well-known filename for the config file.
    pub fn filename() -> &'static str {
        "renalcare.toml"
    }

    /// Parse from TOML string.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Serialize to TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Read a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(Self::from_toml(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the config file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }
}
