//! # Filesystem-backed key-value store
//!
//! [`FileStore`] is a [`KeyValueStore`] implementation that persists each key
//! as one file in a base directory. It is the durable slot on native platforms
//! and, pointed at the per-login runtime directory, the session-scoped slot
//! for the CLI.
//!
//! ## Layout
//!
//! ```text
//! <base_dir>/
//! └── <hex(key)>        # the value, UTF-8
//! ```
//!
//! Writes go to `<hex(key)>.tmp` and are renamed over the entry, so a crash
//! mid-write leaves the previous value intact. Hex names never end in `.tmp`.
//!
//! Keys are hex-encoded so that any key string maps to a valid file name.
//!
//! ## Platform data directories
//!
//! | Platform | Durable (`dirs::data_dir()`) | Session (`dirs::runtime_dir()`) |
//! |----------|------------------------------|---------------------------------|
//! | Linux | `~/.local/share/renalcare/` | `$XDG_RUNTIME_DIR/renalcare/` |
//! | macOS | `~/Library/Application Support/renalcare/` | none (memory fallback) |
//! | Windows | `C:\Users\<user>\AppData\Roaming\renalcare\` | none (memory fallback) |

use std::path::{Path, PathBuf};

use crate::kv::KeyValueStore;

/// Filesystem-backed KeyValueStore for desktop persistence.
#[derive(Clone, Debug)]
pub struct FileStore {
    base: PathBuf,
}

impl FileStore {
    pub fn new(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.base.join(hex::encode(key.as_bytes()))
    }
}

impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Option<String> {
        let path = self.entry_path(key);
        match std::fs::read_to_string(&path) {
            Ok(value) => Some(value),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &str) {
        if let Err(e) = std::fs::create_dir_all(&self.base) {
            tracing::error!("Failed to create {}: {}", self.base.display(), e);
            return;
        }
        let path = self.entry_path(key);
        let tmp = path.with_extension("tmp");
        if let Err(e) = std::fs::write(&tmp, value) {
            tracing::error!("Failed to write {}: {}", tmp.display(), e);
            return;
        }
        if let Err(e) = std::fs::rename(&tmp, &path) {
            tracing::error!("Failed to replace {}: {}", path.display(), e);
            if let Err(e) = std::fs::remove_file(&tmp) {
                tracing::warn!("Failed to remove {}: {}", tmp.display(), e);
            }
        }
    }

    async fn remove(&self, key: &str) {
        let path = self.entry_path(key);
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
    }

    async fn clear(&self) {
        if let Err(e) = std::fs::remove_dir_all(&self.base) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to clear {}: {}", self.base.display(), e);
            }
        }
    }
}
