//! Collaborator stores the recommender reads from
//!
//! - [`MetadataStore`]: per-track metadata keyed by file path
//! - [`VectorStore`]: embedding vectors referenced from the metadata
//!
//! File-backed implementations read the library's `meta.json` and the
//! `.npy` embedding files; in-memory ones back tests and embedders.

mod json;
mod lenient;
mod vectors;

pub use json::JsonMetaStore;
pub use vectors::{l2_normalize, MemoryVectorStore, NpyVectorStore};

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while reading metadata or embeddings
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse '{path}': {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Failed to read embedding '{path}': {reason}")]
    Npy { path: PathBuf, reason: String },

    #[error("Embedding '{reference}' has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        reference: String,
        expected: usize,
        actual: usize,
    },

    #[error("No embedding stored under '{0}'")]
    NotFound(String),
}

/// A named contour as written by the analysis pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contour {
    #[serde(default, deserialize_with = "lenient::samples")]
    pub contour: Vec<f32>,
    /// Analysis confidence 0..1, informational only
    #[serde(default, deserialize_with = "lenient::opt_f32", skip_serializing_if = "Option::is_none")]
    pub reliability: Option<f32>,
}

/// Auxiliary musical features used by the weighted score
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackFeatures {
    /// Percussive "samples" presence score in [0, 1]
    #[serde(default, deserialize_with = "lenient::opt_f32", skip_serializing_if = "Option::is_none")]
    pub samples: Option<f32>,
    #[serde(default, deserialize_with = "lenient::opt_contour", skip_serializing_if = "Option::is_none")]
    pub bass_contour: Option<Contour>,
    #[serde(default, deserialize_with = "lenient::opt_contour", skip_serializing_if = "Option::is_none")]
    pub rhythm_contour: Option<Contour>,
}

impl TrackFeatures {
    pub fn bass(&self) -> &[f32] {
        self.bass_contour.as_ref().map(|c| c.contour.as_slice()).unwrap_or(&[])
    }

    pub fn rhythm(&self) -> &[f32] {
        self.rhythm_contour.as_ref().map(|c| c.contour.as_slice()).unwrap_or(&[])
    }
}

/// Metadata record for one track, keyed externally by its file path.
///
/// Fields of the wrong type decode as missing, so a bad BPM or key leaves
/// the track in the library with that value unknown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackMeta {
    #[serde(default, deserialize_with = "lenient::string")]
    pub artist: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub bpm: Option<f64>,
    /// Camelot key such as "8A"
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Reference handed to the [`VectorStore`], usually a `.npy` path
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub embedding: Option<String>,
    #[serde(default, rename = "mytags", deserialize_with = "lenient::tags", skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "lenient::features")]
    pub features: TrackFeatures,
}

impl TrackMeta {
    /// "Artist - Title", as used for seed lookup
    pub fn display_name(&self) -> String {
        format!("{} - {}", self.artist, self.title)
    }

    pub fn tag_set(&self) -> BTreeSet<&str> {
        self.tags.iter().map(String::as_str).collect()
    }

    pub fn has_embedding(&self) -> bool {
        self.embedding.as_deref().is_some_and(|e| !e.trim().is_empty())
    }
}

/// Read access to track metadata
pub trait MetadataStore: Send + Sync {
    fn get(&self, path: &str) -> Option<TrackMeta>;

    /// All known track paths, in a stable order
    fn all_paths(&self) -> Vec<String>;
}

/// Loads embedding vectors by reference
pub trait VectorStore: Send + Sync {
    fn load_vector(&self, reference: &str) -> Result<Vec<f32>, StoreError>;
}
