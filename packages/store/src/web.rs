//! # Browser storage — `localStorage` / `sessionStorage`
//!
//! [`WebStorage`] is the [`KeyValueStore`] implementation used on the **web
//! platform**. [`StorageArea::Local`] survives restarts and is the durable slot
//! for the state blob and theme; [`StorageArea::Session`] is cleared when the
//! tab session ends and holds the exported encryption key.
//!
//! ## Handle management
//!
//! `WebStorage` only remembers which area it targets and looks the
//! `web_sys::Storage` handle up on every call: the handle is not `Send`, and
//! the lookup is cheap.
//!
//! ## Error handling
//!
//! Storage may be unavailable (private mode, sandboxed iframes) or full. Reads
//! degrade to `None` and failed writes are logged and dropped.

use crate::kv::KeyValueStore;

/// Which browser storage area a [`WebStorage`] targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageArea {
    Local,
    Session,
}

/// Browser-storage-backed KeyValueStore.
#[derive(Clone, Copy, Debug)]
pub struct WebStorage {
    area: StorageArea,
}

impl WebStorage {
    pub fn local() -> Self {
        Self {
            area: StorageArea::Local,
        }
    }

    pub fn session() -> Self {
        Self {
            area: StorageArea::Session,
        }
    }

    fn storage(&self) -> Option<web_sys::Storage> {
        let window = web_sys::window()?;
        let storage = match self.area {
            StorageArea::Local => window.local_storage(),
            StorageArea::Session => window.session_storage(),
        };
        match storage {
            Ok(storage) => storage,
            Err(e) => {
                tracing::warn!("{:?} storage unavailable: {:?}", self.area, e);
                None
            }
        }
    }
}

impl KeyValueStore for WebStorage {
    async fn get(&self, key: &str) -> Option<String> {
        self.storage()?.get_item(key).ok().flatten()
    }

    async fn set(&self, key: &str, value: &str) {
        let Some(storage) = self.storage() else {
            return;
        };
        if let Err(e) = storage.set_item(key, value) {
            tracing::error!("Failed to write {} to {:?} storage: {:?}", key, self.area, e);
        }
    }

    async fn remove(&self, key: &str) {
        let Some(storage) = self.storage() else {
            return;
        };
        if let Err(e) = storage.remove_item(key) {
            tracing::warn!("Failed to remove {} from {:?} storage: {:?}", key, self.area, e);
        }
    }

    async fn clear(&self) {
        let Some(storage) = self.storage() else {
            return;
        };
        if let Err(e) = storage.clear() {
            tracing::warn!("Failed to clear {:?} storage: {:?}", self.area, e);
        }
    }
}
