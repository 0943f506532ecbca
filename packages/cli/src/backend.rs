//! Native storage wiring for the CLI.
//!
//! - **Durable**: [`store::FileStore`] under `<data_dir>/renalcare/`
//! - **Session**: [`store::FileStore`] under `<runtime_dir>/renalcare/`, which the
//!   OS wipes at logout, or a process-lifetime [`store::MemoryStore`] where no
//!   runtime directory exists (macOS, Windows)

use std::path::{Path, PathBuf};
use std::sync::Arc;

use state::{DetachedRoot, ProfileStore, StoreConfig};
use store::{FileStore, KeyValueStore, MemoryStore, SecureStorage};

const APP_DIR: &str = "renalcare";

pub type Store = ProfileStore<SecureStorage<FileStore, SessionSlot>, FileStore>;

/// Default durable directory: `$RENALCARE_DATA_DIR`, else `<data_dir>/renalcare`.
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("RENALCARE_DATA_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Where the session key lives.
#[derive(Clone, Debug)]
pub enum SessionSlot {
    File(FileStore),
    Memory(MemoryStore),
}

impl SessionSlot {
    /// Per-login runtime directory, falling back to memory.
    pub fn detect() -> Self {
        match dirs::runtime_dir() {
            Some(dir) => Self::File(FileStore::new(dir.join(APP_DIR))),
            None => {
                tracing::debug!("No runtime directory, session key lives for this process");
                Self::Memory(MemoryStore::new())
            }
        }
    }
}

impl KeyValueStore for SessionSlot {
    async fn get(&self, key: &str) -> Option<String> {
        match self {
            Self::File(s) => s.get(key).await,
            Self::Memory(s) => s.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: &str) {
        match self {
            Self::File(s) => s.set(key, value).await,
            Self::Memory(s) => s.set(key, value).await,
        }
    }

    async fn remove(&self, key: &str) {
        match self {
            Self::File(s) => s.remove(key).await,
            Self::Memory(s) => s.remove(key).await,
        }
    }

    async fn clear(&self) {
        match self {
            Self::File(s) => s.clear().await,
            Self::Memory(s) => s.clear().await,
        }
    }
}

/// Open the profile store over `data_dir`.
pub async fn open_store(data_dir: &Path, session: SessionSlot, config: StoreConfig) -> Store {
    let durable = FileStore::new(data_dir.join("state"));
    let prefs = FileStore::new(data_dir.join("prefs"));
    let storage = config.storage.secure_storage(durable, session);
    ProfileStore::builder(storage, prefs)
        .config(config)
        .theme_root(Arc::new(DetachedRoot::new()))
        .load()
        .await
}
