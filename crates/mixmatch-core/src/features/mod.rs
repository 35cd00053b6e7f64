//! Contour similarity between tracks
//!
//! Bass and rhythm contours are fixed-length sequences produced by the
//! analysis pipeline. They are compared with dynamic time warping so that
//! small timing offsets between two tracks are not punished.

mod dtw;

pub use dtw::{dtw, fix_length, DtwAlignment, DtwSimilarity, DEFAULT_CONTOUR_LEN};

/// Pairwise contour similarity, injected into the recommender.
///
/// Both measures return a value in (0, 1] for non-empty inputs and 0.0
/// when either contour is empty.
pub trait SimilarityProvider: Send + Sync {
    /// Similarity of two bass contours given in Hz
    fn bass_similarity(&self, seed: &[f32], candidate: &[f32]) -> f32;

    /// Similarity of two onset-strength contours in [0, 1]
    fn rhythm_similarity(&self, seed: &[f32], candidate: &[f32]) -> f32;
}
