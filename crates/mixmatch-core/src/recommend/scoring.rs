//! Weighted re-ranking score
//!
//! ```text
//! score = ( w_ann     * (1 - distance)
//!         + w_samples * samples
//!         + w_bass    * bass_similarity
//!         + w_rhythm  * rhythm_similarity
//!         + w_bpm     * tempo_closeness
//!         + w_key     * key_score
//!         + w_tags    * tag_jaccard ) / sum(w)
//! ```
//!
//! A term that cannot be computed contributes 0.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{RecommendOptions, SeedProfile};
use crate::features::SimilarityProvider;
use crate::music::{key_compat_score, tempo_closeness, CamelotKey};
use crate::store::TrackMeta;

/// Per-term weights. Negative or non-finite weights count as 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub ann: f32,
    pub samples: f32,
    pub bass: f32,
    pub rhythm: f32,
    pub bpm: f32,
    pub key: f32,
    pub tags: f32,
}

fn active(w: f32) -> f32 {
    if w.is_finite() && w > 0.0 { w } else { 0.0 }
}

impl Weights {
    /// Everything on the embedding distance
    pub fn ann_only() -> Self {
        Self {
            ann: 1.0,
            ..Default::default()
        }
    }

    /// The browse-mode mix: mostly timbre, a little of everything else
    pub fn balanced() -> Self {
        Self {
            ann: 0.6,
            samples: 0.1,
            bass: 0.1,
            rhythm: 0.1,
            bpm: 0.05,
            key: 0.05,
            tags: 0.0,
        }
    }

    /// Sum of the active weights
    pub fn total(&self) -> f32 {
        [self.ann, self.samples, self.bass, self.rhythm, self.bpm, self.key, self.tags]
            .into_iter()
            .map(active)
            .sum()
    }

    /// No active weight: rank by distance alone
    pub fn is_unweighted(&self) -> bool {
        self.total() <= 0.0
    }

    /// Normalised weighted sum of `terms`
    pub fn combine(&self, terms: &ScoreTerms) -> f32 {
        let total = self.total();
        if total <= 0.0 {
            return terms.ann;
        }
        let sum = active(self.ann) * terms.ann
            + active(self.samples) * terms.samples
            + active(self.bass) * terms.bass
            + active(self.rhythm) * terms.rhythm
            + active(self.bpm) * terms.bpm
            + active(self.key) * terms.key
            + active(self.tags) * terms.tags;
        sum / total
    }
}

/// Raw per-candidate score terms before weighting
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreTerms {
    pub ann: f32,
    pub samples: f32,
    pub bass: f32,
    pub rhythm: f32,
    pub bpm: f32,
    pub key: f32,
    pub tags: f32,
}

/// Jaccard index of two tag sets, 0 when both are empty
pub fn tag_jaccard(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f32 / union as f32
}

/// Best over the seed contours; 0 when the candidate has none
fn best_contour_match(seeds: &[Vec<f32>], cand: &[f32], f: impl Fn(&[f32], &[f32]) -> f32) -> f32 {
    if cand.is_empty() {
        return 0.0;
    }
    seeds
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| f(s, cand))
        .filter(|v| v.is_finite())
        .fold(0.0f32, f32::max)
}

/// Compute the score terms for one candidate.
///
/// Terms whose weight is inactive are skipped and left at 0.
pub fn score_terms(
    seed: &SeedProfile,
    cand: &TrackMeta,
    distance: f32,
    opts: &RecommendOptions,
    similarity: Option<&dyn SimilarityProvider>,
) -> ScoreTerms {
    let weights = &opts.weights;
    let mut terms = ScoreTerms {
        ann: 1.0 - distance,
        ..Default::default()
    };

    if active(weights.samples) > 0.0 {
        terms.samples = cand.features.samples.filter(|v| v.is_finite()).unwrap_or(0.0);
    }

    if let Some(sim) = similarity {
        if active(weights.bass) > 0.0 {
            terms.bass = best_contour_match(&seed.bass, cand.features.bass(), |a, b| sim.bass_similarity(a, b));
        }
        if active(weights.rhythm) > 0.0 {
            terms.rhythm = best_contour_match(&seed.rhythm, cand.features.rhythm(), |a, b| sim.rhythm_similarity(a, b));
        }
    }

    if active(weights.bpm) > 0.0 {
        terms.bpm = tempo_closeness(seed.bpm, cand.bpm, opts.tempo_tolerance_pct, opts.allow_doubletime).unwrap_or(0.0);
    }

    if active(weights.key) > 0.0 {
        if let Some(ck) = cand.key.as_deref().and_then(CamelotKey::parse) {
            terms.key = seed
                .keys
                .iter()
                .filter_map(|k| CamelotKey::parse(k))
                .map(|sk| key_compat_score(sk, ck))
                .fold(0.0f32, f32::max);
        }
    }

    if active(weights.tags) > 0.0 {
        let reference: BTreeSet<&str> = if opts.preferred_tags.is_empty() {
            seed.tags.iter().map(String::as_str).collect()
        } else {
            opts.preferred_tags.iter().map(String::as_str).collect()
        };
        terms.tags = tag_jaccard(&reference, &cand.tag_set());
    }

    terms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::DtwSimilarity;
    use crate::store::{Contour, TrackFeatures};

    fn all_weights() -> RecommendOptions {
        RecommendOptions {
            tempo_tolerance_pct: 6.0,
            allow_doubletime: true,
            weights: Weights {
                ann: 1.0,
                samples: 1.0,
                bass: 1.0,
                rhythm: 1.0,
                bpm: 1.0,
                key: 1.0,
                tags: 1.0,
            },
            ..Default::default()
        }
    }

    fn contour(values: &[f32]) -> Option<Contour> {
        Some(Contour {
            contour: values.to_vec(),
            reliability: None,
        })
    }

    #[test]
    fn test_weights_total_ignores_bad_values() {
        let w = Weights {
            ann: 0.5,
            bass: -1.0,
            rhythm: f32::NAN,
            key: 0.5,
            ..Default::default()
        };
        assert!((w.total() - 1.0).abs() < 1e-6);
        assert!(Weights::default().is_unweighted());
        assert!((Weights::balanced().total() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_combine_is_normalised() {
        let w = Weights {
            ann: 2.0,
            key: 2.0,
            ..Default::default()
        };
        let terms = ScoreTerms {
            ann: 0.8,
            key: 0.4,
            tags: 1.0,
            ..Default::default()
        };
        assert!((w.combine(&terms) - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_tag_jaccard() {
        let a: BTreeSet<&str> = ["a", "b"].into_iter().collect();
        let b: BTreeSet<&str> = ["b", "c"].into_iter().collect();
        assert!((tag_jaccard(&a, &b) - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(tag_jaccard(&BTreeSet::new(), &BTreeSet::new()), 0.0);
    }

    #[test]
    fn test_missing_features_score_zero() {
        let seed = SeedProfile {
            bpm: Some(120.0),
            keys: vec!["8A".into()],
            bass: vec![vec![55.0; 16]],
            ..Default::default()
        };
        let cand = TrackMeta::default();
        let sim = DtwSimilarity::default();

        let terms = score_terms(&seed, &cand, 0.25, &all_weights(), Some(&sim));
        assert_eq!(
            terms,
            ScoreTerms {
                ann: 0.75,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_feature_terms() {
        let seed = SeedProfile {
            bpm: Some(120.0),
            keys: vec!["8A".into()],
            tags: ["Vocal".to_string()].into_iter().collect(),
            bass: vec![vec![55.0, 60.0, 65.0, 60.0]],
            rhythm: vec![vec![0.1, 0.9, 0.1, 0.9]],
            ..Default::default()
        };
        let cand = TrackMeta {
            bpm: Some(120.0),
            key: Some("8B".into()),
            tags: vec!["Vocal".into()],
            features: TrackFeatures {
                samples: Some(0.4),
                bass_contour: contour(&[55.0, 60.0, 65.0, 60.0]),
                rhythm_contour: contour(&[0.1, 0.9, 0.1, 0.9]),
            },
            ..Default::default()
        };
        let sim = DtwSimilarity::default();
        let opts = all_weights();

        let terms = score_terms(&seed, &cand, 0.1, &opts, Some(&sim));
        assert!((terms.samples - 0.4).abs() < 1e-6);
        assert!((terms.bass - 1.0).abs() < 1e-5);
        assert!((terms.rhythm - 1.0).abs() < 1e-5);
        assert_eq!(terms.bpm, 1.0);
        assert!((terms.key - 0.8).abs() < 1e-6);
        assert_eq!(terms.tags, 1.0);

        // Without a provider the contour terms drop out
        let terms = score_terms(&seed, &cand, 0.1, &opts, None);
        assert_eq!(terms.bass, 0.0);
        assert_eq!(terms.rhythm, 0.0);

        // Preferred tags replace the seed's tags as the reference
        let preferring = RecommendOptions {
            preferred_tags: vec!["Dark".into()],
            ..opts
        };
        let terms = score_terms(&seed, &cand, 0.1, &preferring, None);
        assert_eq!(terms.tags, 0.0);
    }
}
