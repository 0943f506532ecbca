//! # Lenient decoding of the persisted blob
//!
//! A stored blob is decoded piece by piece so that one bad value costs only
//! itself:
//!
//! - `null` anywhere means "absent": the field takes its default.
//! - The profile is decoded whole when possible. Otherwise each stored leaf is
//!   merged onto the default profile and kept only if the profile still
//!   decodes with it.
//! - Each collection is decoded entry by entry. Entries that do not decode are
//!   skipped with a warning; a collection that is not a list loads empty.
//!
//! Only text that is not JSON, or a root that [`migrate`] rejects, loses the
//! whole blob.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::migrate::{migrate, MigrationError};
use crate::models::{PersistedState, Profile, CURRENT_SCHEMA_VERSION};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("persisted state is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Migration(#[from] MigrationError),
}

/// Parse, migrate and default-fill a raw blob.
pub fn decode_state(raw: &str) -> Result<PersistedState, LoadError> {
    let value: Value = serde_json::from_str(raw)?;
    let mut value = migrate(value)?;
    strip_nulls(&mut value);
    let Value::Object(mut root) = value else {
        return Err(MigrationError::NotAnObject.into());
    };

    let mut state = PersistedState {
        schema_version: CURRENT_SCHEMA_VERSION,
        sessions: collection(&mut root, "sessions"),
        weights: collection(&mut root, "weights"),
        fluids: collection(&mut root, "fluids"),
        medications: collection(&mut root, "medications"),
        vitals: collection(&mut root, "vitals"),
        meals: collection(&mut root, "meals"),
        moods: collection(&mut root, "moods"),
        saved_reports: collection(&mut root, "savedReports"),
        profile: root
            .remove("profile")
            .map(|stored| decode_merged::<Profile>(stored, "profile"))
            .unwrap_or_default(),
    };
    state.sort_chronological();
    Ok(state)
}

fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}

fn collection<T: DeserializeOwned>(root: &mut Map<String, Value>, key: &str) -> Vec<T> {
    match root.remove(key) {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .into_iter()
            .enumerate()
            .filter_map(|(index, item)| match serde_json::from_value(item) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("Skipping unreadable {} entry {}: {}", key, index, e);
                    None
                }
            })
            .collect(),
        Some(_) => {
            tracing::warn!("Ignoring {}: not a list", key);
            Vec::new()
        }
    }
}

/// Decode `stored` as `T`, keeping every stored leaf that decodes and
/// defaulting the rest.
fn decode_merged<T>(stored: Value, what: &str) -> T
where
    T: DeserializeOwned + Serialize + Default,
{
    if let Ok(decoded) = serde_json::from_value(stored.clone()) {
        return decoded;
    }
    let Value::Object(fields) = stored else {
        tracing::warn!("Ignoring {}: not an object", what);
        return T::default();
    };
    let mut merged = match serde_json::to_value(T::default()) {
        Ok(merged) => merged,
        Err(e) => {
            tracing::error!("Failed to build default {}: {}", what, e);
            return T::default();
        }
    };
    merge_valid::<T>(&mut merged, "", fields, what);
    serde_json::from_value(merged).unwrap_or_default()
}

/// Merge `fields` into the object at JSON pointer `at`, keeping each leaf
/// only while `root` still decodes as `T`.
fn merge_valid<T: DeserializeOwned>(
    root: &mut Value,
    at: &str,
    fields: Map<String, Value>,
    what: &str,
) {
    for (key, value) in fields {
        let path = format!("{}/{}", at, key.replace('~', "~0").replace('/', "~1"));
        let nested = value.is_object() && root.pointer(&path).is_some_and(Value::is_object);
        match value {
            Value::Object(inner) if nested => merge_valid::<T>(root, &path, inner, what),
            value => {
                let Some(parent) = root.pointer_mut(at).and_then(Value::as_object_mut) else {
                    continue;
                };
                let previous = parent.insert(key.clone(), value);
                if let Err(e) = serde_json::from_value::<T>(root.clone()) {
                    tracing::warn!("Dropping unreadable {}{}: {}", what, path, e);
                    if let Some(parent) = root.pointer_mut(at).and_then(Value::as_object_mut) {
                        match previous {
                            Some(previous) => parent.insert(key, previous),
                            None => parent.remove(&key),
                        };
                    }
                }
            }
        }
    }
}
