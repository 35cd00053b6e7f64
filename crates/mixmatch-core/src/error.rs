//! Request-level errors for recommendation calls

use thiserror::Error;

use crate::index::IndexError;

/// A recommendation request that could not be answered.
///
/// Problems with a single candidate never surface here; they are logged
/// and the candidate is filtered or scored with defaults.
#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("Seed not found: {0}")]
    SeedNotFound(String),

    #[error("Seed has no usable embedding: {0}")]
    MissingEmbedding(String),

    #[error("Seed embedding has dimension {actual}, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("No embedding index available, build one first")]
    IndexUnavailable,

    #[error("None of the seeds resolved to a track with an embedding")]
    NoValidSeeds,

    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}
