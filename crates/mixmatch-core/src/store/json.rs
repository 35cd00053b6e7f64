//! `meta.json` metadata store
//!
//! The library file is a JSON document `{"tracks": {path: {...}}}`. Each
//! record is decoded on its own; a field of the wrong type reads as missing
//! and only a record that is not an object is dropped.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;

use super::{MetadataStore, StoreError, TrackMeta};

/// Metadata keyed by track path, held in memory
#[derive(Debug, Clone, Default)]
pub struct JsonMetaStore {
    tracks: BTreeMap<String, TrackMeta>,
}

impl JsonMetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the library file.
    ///
    /// A missing file is an empty library. A file that is not valid JSON is
    /// an error; track records that are not objects are skipped with a
    /// warning.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            log::info!("JsonMetaStore::load: {:?} does not exist, starting empty", path);
            return Ok(Self::new());
        }

        let contents = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self::from_json_str(&contents).map_err(|reason| StoreError::Parse {
            path: path.to_path_buf(),
            reason,
        })?;

        log::info!("JsonMetaStore::load: {} tracks from {:?}", store.len(), path);
        Ok(store)
    }

    /// Decode a library document
    pub fn from_json_str(contents: &str) -> Result<Self, String> {
        let root: Value = serde_json::from_str(contents).map_err(|e| e.to_string())?;

        let tracks_value = match root.get("tracks") {
            Some(Value::Object(map)) => map,
            Some(_) => return Err("'tracks' is not an object".to_string()),
            None => return Ok(Self::new()),
        };

        let mut tracks = BTreeMap::new();
        for (path, record) in tracks_value {
            if !record.is_object() {
                log::warn!("JsonMetaStore: skipping record for '{}': not an object", path);
                continue;
            }
            match serde_json::from_value::<TrackMeta>(record.clone()) {
                Ok(meta) => {
                    tracks.insert(path.clone(), meta);
                }
                Err(e) => {
                    log::warn!("JsonMetaStore: skipping malformed record for '{}': {}", path, e);
                }
            }
        }

        Ok(Self { tracks })
    }

    /// Write the library back as `{"tracks": {...}}`
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let doc = serde_json::json!({ "tracks": &self.tracks });
        let text = serde_json::to_string_pretty(&doc).map_err(|e| StoreError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, text).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Borrowing lookup, unlike [`MetadataStore::get`]
    pub fn get_track(&self, path: &str) -> Option<&TrackMeta> {
        self.tracks.get(path)
    }

    pub fn insert(&mut self, path: impl Into<String>, meta: TrackMeta) {
        self.tracks.insert(path.into(), meta);
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

impl MetadataStore for JsonMetaStore {
    fn get(&self, path: &str) -> Option<TrackMeta> {
        self.tracks.get(path).cloned()
    }

    fn all_paths(&self) -> Vec<String> {
        self.tracks.keys().cloned().collect()
    }
}
