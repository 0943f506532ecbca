pub mod crypto;
pub mod kv;
pub mod secure;

mod file_store;
mod memory;
pub use file_store::FileStore;
pub use memory::MemoryStore;

#[cfg(all(target_arch = "wasm32", feature = "web"))]
mod web;
#[cfg(all(target_arch = "wasm32", feature = "web"))]
pub use web::{StorageArea, WebStorage};

pub use crypto::{CryptoError, CryptoSupport, JsonWebKey, SessionKey};
pub use kv::KeyValueStore;
pub use secure::{SecureStorage, DEFAULT_KEY_SLOT};
