//! Embedding vector stores

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ndarray::ArrayD;
use ndarray_npy::read_npy;

use super::{StoreError, VectorStore};

/// Scale a vector to unit length in place. Zero vectors are left as-is.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
}

/// Reads embeddings from `.npy` files on disk.
///
/// Arrays of any shape are flattened in logical order. `f64` files are
/// narrowed to `f32`.
#[derive(Debug, Clone, Default)]
pub struct NpyVectorStore {
    /// When set, vectors of any other length are rejected
    pub expected_dim: Option<usize>,
}

impl NpyVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dim(dim: usize) -> Self {
        Self { expected_dim: Some(dim) }
    }

    fn read_flat(path: &Path) -> Result<Vec<f32>, StoreError> {
        match read_npy::<_, ArrayD<f32>>(path) {
            Ok(arr) => Ok(arr.iter().copied().collect()),
            Err(f32_err) => match read_npy::<_, ArrayD<f64>>(path) {
                Ok(arr) => Ok(arr.iter().map(|v| *v as f32).collect()),
                Err(_) => Err(StoreError::Npy {
                    path: path.to_path_buf(),
                    reason: f32_err.to_string(),
                }),
            },
        }
    }
}

impl VectorStore for NpyVectorStore {
    fn load_vector(&self, reference: &str) -> Result<Vec<f32>, StoreError> {
        let path = PathBuf::from(reference);
        if !path.exists() {
            return Err(StoreError::NotFound(reference.to_string()));
        }

        let vector = Self::read_flat(&path)?;
        if let Some(expected) = self.expected_dim {
            if vector.len() != expected {
                return Err(StoreError::DimensionMismatch {
                    reference: reference.to_string(),
                    expected,
                    actual: vector.len(),
                });
            }
        }
        Ok(vector)
    }
}

/// Vectors held in memory, keyed by reference string
#[derive(Debug, Clone, Default)]
pub struct MemoryVectorStore {
    vectors: HashMap<String, Vec<f32>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, reference: impl Into<String>, vector: Vec<f32>) {
        self.vectors.insert(reference.into(), vector);
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

impl VectorStore for MemoryVectorStore {
    fn load_vector(&self, reference: &str) -> Result<Vec<f32>, StoreError> {
        self.vectors
            .get(reference)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(reference.to_string()))
    }
}
