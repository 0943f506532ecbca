//! Client-side state for RenalCare: the persisted profile and logged
//! entities, their schema, and the theme side channel.
//!
//! Storage backends live in the `store` crate; this crate only talks to them
//! through [`store::KeyValueStore`].

pub mod config;
pub mod decode;
pub mod format;
pub mod migrate;
pub mod models;
pub mod profile_store;
pub mod seed;
pub mod theme;

pub use config::{ConfigError, PersistenceConfig, StorageConfig, StoreConfig};
pub use decode::{decode_state, LoadError};
pub use migrate::{migrate, MigrationError};
pub use models::*;
pub use profile_store::{FlushOutcome, ProfileStore, ProfileStoreBuilder};
pub use theme::{apply_theme, DetachedRoot, ThemeRoot, DARK_CLASS};

#[cfg(all(target_arch = "wasm32", feature = "web"))]
pub use theme::DocumentRoot;
