//! # Encrypted storage adapter
//!
//! [`SecureStorage`] wraps a durable [`KeyValueStore`] with transparent
//! AES-256-GCM encryption and is itself a [`KeyValueStore`], so it can be
//! dropped in wherever a plain store is expected.
//!
//! ## Key lifecycle
//!
//! The key lives in a second, session-scoped store under [`SecureStorage::key_slot`]
//! as an exported JWK. Every operation re-imports it; the first operation of a
//! session finds the slot empty and generates a fresh key. Provisioning is
//! serialized so concurrent first writes cannot each mint their own key.
//! When the session store is wiped (tab closed, logout) the key is gone and
//! previously sealed values can no longer be read.
//!
//! ## Degraded modes
//!
//! Nothing here fails outward:
//!
//! | Situation | `set` | `get` |
//! |-----------|-------|-------|
//! | cipher unavailable | plaintext, warning logged | raw value |
//! | key import / encryption fails | plaintext, error logged | — |
//! | decryption fails, raw value is JSON | — | raw value (an earlier plaintext fallback) |
//! | decryption fails otherwise | — | `None`, error logged |
//!
//! This protects data from being read off disk or out of backups. It does not
//! protect against code running in the same origin or process, which can read
//! the key slot just as well.

use tokio::sync::Mutex;

use crate::crypto::{CryptoError, CryptoSupport, SessionKey};
use crate::kv::KeyValueStore;

/// Default session-store slot holding the exported key.
pub const DEFAULT_KEY_SLOT: &str = "renalcare-key";

/// Encrypting [`KeyValueStore`] over a durable store `D`, keyed from a
/// session-scoped store `K`.
#[derive(Debug)]
pub struct SecureStorage<D, K> {
    durable: D,
    session: K,
    key_slot: String,
    support: CryptoSupport,
    provisioning: Mutex<()>,
}

impl<D: KeyValueStore, K: KeyValueStore> SecureStorage<D, K> {
    /// Wrap `durable`, keeping the key in `session`. Cipher availability is
    /// checked with [`CryptoSupport::detect`].
    pub fn new(durable: D, session: K) -> Self {
        Self {
            durable,
            session,
            key_slot: DEFAULT_KEY_SLOT.to_string(),
            support: CryptoSupport::detect(),
            provisioning: Mutex::new(()),
        }
    }

    /// Use a different session-store slot for the key.
    pub fn with_key_slot(mut self, slot: impl Into<String>) -> Self {
        self.key_slot = slot.into();
        self
    }

    /// Override the detected cipher availability.
    pub fn with_support(mut self, support: CryptoSupport) -> Self {
        self.support = support;
        self
    }

    pub fn key_slot(&self) -> &str {
        &self.key_slot
    }

    pub fn support(&self) -> CryptoSupport {
        self.support
    }

    /// The wrapped durable store, for callers that need to bypass encryption.
    pub fn durable(&self) -> &D {
        &self.durable
    }

    /// Import the session key, generating and caching one if the slot is empty.
    async fn session_key(&self) -> Result<SessionKey, CryptoError> {
        let _guard = self.provisioning.lock().await;
        if let Some(exported) = self.session.get(&self.key_slot).await {
            return SessionKey::import(&exported);
        }
        let key = SessionKey::generate();
        self.session.set(&self.key_slot, &key.export()?).await;
        tracing::debug!("Generated new session key in slot {}", self.key_slot);
        Ok(key)
    }

    async fn seal(&self, value: &str) -> Result<String, CryptoError> {
        self.session_key().await?.seal(value)
    }

    async fn open(&self, raw: &str) -> Result<String, CryptoError> {
        self.session_key().await?.open(raw)
    }
}

impl<D: KeyValueStore, K: KeyValueStore> KeyValueStore for SecureStorage<D, K> {
    async fn get(&self, key: &str) -> Option<String> {
        let raw = self.durable.get(key).await?;
        if !self.support.is_available() {
            return Some(raw);
        }
        match self.open(&raw).await {
            Ok(plaintext) => Some(plaintext),
            Err(e) => {
                // Written in plaintext by an earlier fallback
                if serde_json::from_str::<serde_json::Value>(&raw).is_ok() {
                    tracing::debug!("Value at {} is unencrypted JSON ({}), using as-is", key, e);
                    return Some(raw);
                }
                tracing::error!("Failed to decrypt value at {}: {}", key, e);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &str) {
        if !self.support.is_available() {
            tracing::warn!("Encryption unavailable, storing {} unencrypted", key);
            self.durable.set(key, value).await;
            return;
        }
        match self.seal(value).await {
            Ok(sealed) => self.durable.set(key, &sealed).await,
            Err(e) => {
                tracing::error!("Encryption failed for {}, storing unencrypted: {}", key, e);
                self.durable.set(key, value).await;
            }
        }
    }

    async fn remove(&self, key: &str) {
        self.durable.remove(key).await;
    }

    async fn clear(&self) {
        self.durable.clear().await;
        self.session.remove(&self.key_slot).await;
    }
}
