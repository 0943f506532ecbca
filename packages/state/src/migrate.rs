//! # Versioned schema migration for the persisted blob
//!
//! Stored blobs carry a `schemaVersion`. Blobs written before versioning have
//! none and are treated as version `0`. [`migrate`] walks a raw JSON value one
//! step at a time up to [`CURRENT_SCHEMA_VERSION`]; afterwards serde's
//! default-filling takes care of fields that were merely *added*. Steps exist
//! only for shape changes that defaults cannot express (moves and renames).
//!
//! | From | To | Change |
//! |------|----|--------|
//! | 0 | 1 | `profile.settings.theme` moves to `profile.settings.display.theme`; `profile.settings.reminders` is renamed `customReminders`. |
//!
//! A blob from a newer build is refused rather than guessed at.

use serde_json::{Map, Value};

use crate::models::CURRENT_SCHEMA_VERSION;

/// Step `i` upgrades a blob from version `i` to `i + 1`.
const STEPS: &[fn(&mut Value)] = &[v0_to_v1];

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum MigrationError {
    #[error("persisted state is not a JSON object")]
    NotAnObject,
    #[error(
        "persisted state has schema version {0}, newer than supported {current}",
        current = CURRENT_SCHEMA_VERSION
    )]
    FromFuture(u64),
}

/// Schema version recorded in a raw blob (`0` when absent).
pub fn schema_version(value: &Value) -> u64 {
    value
        .get("schemaVersion")
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

/// Bring a raw blob up to [`CURRENT_SCHEMA_VERSION`].
pub fn migrate(mut value: Value) -> Result<Value, MigrationError> {
    if !value.is_object() {
        return Err(MigrationError::NotAnObject);
    }
    let version = schema_version(&value);
    if version > u64::from(CURRENT_SCHEMA_VERSION) {
        return Err(MigrationError::FromFuture(version));
    }

    for (from, step) in STEPS.iter().enumerate().skip(version as usize) {
        step(&mut value);
        tracing::debug!("Migrated persisted state to schema version {}", from + 1);
    }

    if let Some(root) = value.as_object_mut() {
        root.insert(
            "schemaVersion".to_string(),
            Value::from(CURRENT_SCHEMA_VERSION),
        );
    }
    Ok(value)
}

fn v0_to_v1(value: &mut Value) {
    let Some(settings) = value
        .get_mut("profile")
        .and_then(|p| p.get_mut("settings"))
        .and_then(Value::as_object_mut)
    else {
        return;
    };

    if let Some(theme) = settings.remove("theme") {
        let display = settings
            .entry("display")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(display) = display.as_object_mut() {
            display.entry("theme").or_insert(theme);
        }
    }

    if let Some(reminders) = settings.remove("reminders") {
        settings.entry("customReminders").or_insert(reminders);
    }
}
