//! Dynamic time warping over 1-D contours

use ndarray::Array2;

use super::SimilarityProvider;

/// Contour length both inputs are padded or truncated to
pub const DEFAULT_CONTOUR_LEN: usize = 256;

/// Result of aligning two sequences
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DtwAlignment {
    /// Accumulated cost along the optimal warping path
    pub cost: f64,
    /// Number of cells on the optimal warping path
    pub path_len: usize,
}

impl DtwAlignment {
    /// `exp(-(cost / path_len) / 2)`, in (0, 1]
    pub fn similarity(&self) -> f64 {
        let per_step = self.cost / self.path_len.max(1) as f64;
        (-per_step / 2.0).exp()
    }
}

/// Zero-pad or truncate to exactly `len` samples
pub fn fix_length(contour: &[f64], len: usize) -> Vec<f64> {
    let mut out: Vec<f64> = contour.iter().copied().take(len).collect();
    out.resize(len, 0.0);
    out
}

/// Align two sequences with absolute-difference local cost and the
/// symmetric (1,0), (0,1), (1,1) step pattern.
///
/// Returns `None` if either sequence is empty.
pub fn dtw(a: &[f64], b: &[f64]) -> Option<DtwAlignment> {
    let (n, m) = (a.len(), b.len());
    if n == 0 || m == 0 {
        return None;
    }

    // acc[i][j] = best cost aligning a[..i] with b[..j]; row/col 0 are the boundary
    let mut acc = Array2::<f64>::from_elem((n + 1, m + 1), f64::INFINITY);
    acc[[0, 0]] = 0.0;
    for i in 1..=n {
        for j in 1..=m {
            let local = (a[i - 1] - b[j - 1]).abs();
            let best = acc[[i - 1, j - 1]].min(acc[[i - 1, j]]).min(acc[[i, j - 1]]);
            acc[[i, j]] = local + best;
        }
    }

    // Backtrack to measure the path, preferring the diagonal on ties
    let (mut i, mut j) = (n, m);
    let mut path_len = 1;
    while i > 1 || j > 1 {
        if i == 1 {
            j -= 1;
        } else if j == 1 {
            i -= 1;
        } else {
            let diag = acc[[i - 1, j - 1]];
            let up = acc[[i - 1, j]];
            let left = acc[[i, j - 1]];
            if diag <= up && diag <= left {
                i -= 1;
                j -= 1;
            } else if up <= left {
                i -= 1;
            } else {
                j -= 1;
            }
        }
        path_len += 1;
    }

    Some(DtwAlignment {
        cost: acc[[n, m]],
        path_len,
    })
}

/// DTW-based [`SimilarityProvider`]
#[derive(Debug, Clone, Copy)]
pub struct DtwSimilarity {
    pub contour_len: usize,
}

impl Default for DtwSimilarity {
    fn default() -> Self {
        Self {
            contour_len: DEFAULT_CONTOUR_LEN,
        }
    }
}

impl DtwSimilarity {
    fn compare(&self, a: Vec<f64>, b: Vec<f64>) -> f32 {
        let a = fix_length(&a, self.contour_len);
        let b = fix_length(&b, self.contour_len);
        dtw(&a, &b).map(|al| al.similarity() as f32).unwrap_or(0.0)
    }
}

impl SimilarityProvider for DtwSimilarity {
    fn bass_similarity(&self, seed: &[f32], candidate: &[f32]) -> f32 {
        if seed.is_empty() || candidate.is_empty() {
            return 0.0;
        }
        // Log-Hz so an octave counts the same anywhere in the bass range
        let prep = |c: &[f32]| c.iter().map(|&hz| (hz as f64).max(1.0).ln()).collect::<Vec<_>>();
        self.compare(prep(seed), prep(candidate))
    }

    fn rhythm_similarity(&self, seed: &[f32], candidate: &[f32]) -> f32 {
        if seed.is_empty() || candidate.is_empty() {
            return 0.0;
        }
        let prep = |c: &[f32]| c.iter().map(|&v| v as f64).collect::<Vec<_>>();
        self.compare(prep(seed), prep(candidate))
    }
}
