//! # Key-value slots — the storage seam every backend implements
//!
//! [`KeyValueStore`] mirrors the browser's `Storage` interface: string keys,
//! string values, and four operations. The profile state crate only ever talks
//! to this trait, so the same persistence logic runs against an in-memory map
//! ([`crate::MemoryStore`]), a directory of files ([`crate::FileStore`]),
//! browser storage ([`crate::WebStorage`]) or the encrypting wrapper
//! ([`crate::SecureStorage`]) stacked on any of them.
//!
//! ## Error handling
//!
//! Backends swallow their own I/O errors (logging them through `tracing`): a
//! failed read is indistinguishable from a missing key, a failed write leaves
//! the previous value in place. Callers never have to handle a storage error.
//!
//! ## Futures
//!
//! All returned futures are `Send` so a caller can hand persistence off to a
//! spawned task.

use std::future::Future;

/// Async string key-value storage.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored at `key`, if any.
    fn get(&self, key: &str) -> impl Future<Output = Option<String>> + Send;

    /// Store `value` at `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> impl Future<Output = ()> + Send;

    /// Delete the value at `key`. Missing keys are not an error.
    fn remove(&self, key: &str) -> impl Future<Output = ()> + Send;

    /// Delete every key held by this store.
    fn clear(&self) -> impl Future<Output = ()> + Send;
}

impl<T: KeyValueStore> KeyValueStore for std::sync::Arc<T> {
    fn get(&self, key: &str) -> impl Future<Output = Option<String>> + Send {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> impl Future<Output = ()> + Send {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> impl Future<Output = ()> + Send {
        (**self).remove(key)
    }

    fn clear(&self) -> impl Future<Output = ()> + Send {
        (**self).clear()
    }
}
