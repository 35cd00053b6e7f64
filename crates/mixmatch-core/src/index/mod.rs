//! Approximate nearest-neighbour index over track embeddings
//!
//! [`EmbeddingIndex`] wraps a CozoDB HNSW index under cosine distance,
//! keyed by integer labels. [`LibraryIndex`] pairs it with the label to
//! path list so callers can work in track paths.

mod embedding;
mod library;

pub use embedding::EmbeddingIndex;
pub use library::{update_library_index, IndexFiles, IndexUpdate, LibraryIndex};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Index errors
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("No embeddings available to build an index")]
    Empty,

    #[error("Vector dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Label {0} is already present in the index")]
    DuplicateLabel(i64),

    #[error("Got {vectors} vectors but {labels} labels")]
    LabelCountMismatch { vectors: usize, labels: usize },

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("No index found at '{0}', build one first")]
    Unavailable(PathBuf),
}

/// HNSW construction and search parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// Embedding dimension; inferred from the first usable vector when unset
    pub dim: Option<usize>,
    /// Graph connectivity per node
    pub m: usize,
    pub ef_construction: usize,
    /// Search beam width, raised to `k` for larger queries
    pub ef_search: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            dim: None,
            m: 32,
            ef_construction: 200,
            ef_search: 64,
        }
    }
}

/// One result of a label-level query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub label: i64,
    /// Cosine distance, `1 - cos(a, b)`
    pub distance: f32,
}

/// One result of a path-level query
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub path: String,
    pub distance: f32,
}

/// What the recommender needs from an ANN index
pub trait IndexProvider: Send + Sync {
    fn dim(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Indexed track paths, position = label
    fn paths(&self) -> &[String];

    /// Up to `k` nearest tracks, ascending by distance
    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<IndexHit>, IndexError>;
}
