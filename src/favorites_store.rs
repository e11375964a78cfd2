//! Persistent store adapter for the favorites slot.
//!
//! The whole favorites list lives in one slot of a [`KeyValueStore`] as a
//! JSON array of [`ImageRecord`] objects. Writes always replace the full
//! array, so the slot either holds the previous list or the new one.
//!
//! Reads also accept a versioned envelope,
//! `{"version": 1, "favorites": [...]}`, so the stored shape can gain a
//! version tag later without older readers treating it as corrupt.

use log::warn;
use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::image_record::ImageRecord;
use crate::local_store::KeyValueStore;

/// Highest envelope version this crate understands.
pub const SCHEMA_VERSION: u64 = 1;

/// Result of a tolerant load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hydrated {
    /// Records to start the session with. Empty when the slot was missing or
    /// unusable.
    pub records: Vec<ImageRecord>,
    /// Why the slot could not be used, if it could not.
    pub issue: Option<StoreError>,
}

/// Reads and writes the favorites slot of a key-value store.
pub struct FavoritesStore<S> {
    backend: S,
    key: String,
}

impl<S: KeyValueStore> FavoritesStore<S> {
    pub fn new(backend: S, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    /// Reads the slot.
    ///
    /// A missing slot is an empty list. A slot that is not JSON, or not an
    /// array of record objects, is [`StoreError::CorruptState`].
    pub fn load(&self) -> StoreResult<Vec<ImageRecord>> {
        let Some(raw) = self.backend.get(&self.key)? else {
            return Ok(Vec::new());
        };

        parse_slot(&raw)
    }

    /// Reads the slot, falling back to an empty list on any failure.
    ///
    /// The slot is left untouched on failure; it is only replaced by the
    /// next successful [`save`](Self::save).
    pub fn load_or_recover(&self) -> Hydrated {
        match self.load() {
            Ok(records) => Hydrated {
                records,
                issue: None,
            },
            Err(e) => {
                warn!("Ignoring favorites slot '{}': {e}", self.key);
                Hydrated {
                    records: Vec::new(),
                    issue: Some(e),
                }
            }
        }
    }

    /// Serializes `records` and overwrites the slot with them.
    pub fn save(&self, records: &[ImageRecord]) -> StoreResult<()> {
        let json = serde_json::to_string(records).map_err(|e| {
            StoreError::CorruptState(format!("could not serialize favorites: {e}"))
        })?;
        self.backend.set(&self.key, &json)
    }
}

fn parse_slot(raw: &str) -> StoreResult<Vec<ImageRecord>> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| StoreError::CorruptState(format!("slot is not valid JSON: {e}")))?;

    let array = match value {
        Value::Array(items) => Value::Array(items),
        Value::Object(mut envelope) => {
            let version = envelope.get("version").and_then(Value::as_u64);
            match version {
                Some(v) if (1..=SCHEMA_VERSION).contains(&v) => envelope
                    .remove("favorites")
                    .ok_or_else(|| {
                        StoreError::CorruptState("versioned slot has no 'favorites'".to_string())
                    })?,
                Some(v) => {
                    return Err(StoreError::CorruptState(format!(
                        "unsupported favorites schema version {v}"
                    )))
                }
                None => {
                    return Err(StoreError::CorruptState(
                        "slot is an object without a version".to_string(),
                    ))
                }
            }
        }
        other => {
            return Err(StoreError::CorruptState(format!(
                "expected an array of image records, found {}",
                json_kind(&other)
            )))
        }
    };

    serde_json::from_value(array)
        .map_err(|e| StoreError::CorruptState(format!("slot does not hold image records: {e}")))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
