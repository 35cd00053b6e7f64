//! Track recommendation
//!
//! Finds mixable follow-ups for a seed track (or a set of seeds) by
//! querying the embedding index for a candidate pool, dropping candidates
//! that fail the hard mixing filters, and re-ranking the survivors with a
//! weighted score.
//!
//! # Algorithm
//! 1. Resolve the seed identifier against the indexed paths
//! 2. Load the seed embedding (averaged, normalised embeddings for several seeds)
//! 3. Query a pool of `max(top_n * 4, top_n + 50)` neighbours
//! 4. Drop the seeds themselves and apply the hard filters
//! 5. Score the survivors, sort and truncate; if fewer than `top_n`
//!    survive, double the pool and retry until the index is exhausted
//! 6. Multi-seed only: greedy diversity re-ranking

mod diversity;
mod filter;
mod scoring;

pub use diversity::{diversify, DIVERSITY_WINDOW};
pub use filter::{fail_closed, fail_open, Rejection};
pub use scoring::{score_terms, tag_jaccard, ScoreTerms, Weights};

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::RecommendError;
use crate::features::SimilarityProvider;
use crate::index::{IndexHit, IndexProvider};
use crate::music::{classify_relation, relation, KeyRelation, TempoNote};
use crate::store::{l2_normalize, MetadataStore, TrackMeta, VectorStore};

/// Pool size for the first index query
pub fn pool_size(top_n: usize, index_len: usize) -> usize {
    top_n.saturating_mul(4).max(top_n.saturating_add(50)).min(index_len)
}

/// Knobs for a recommendation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendOptions {
    pub top_n: usize,
    /// Allowed tempo deviation, percent of the seed BPM
    pub tempo_tolerance_pct: f64,
    pub allow_doubletime: bool,
    pub require_camelot_compatible: bool,
    /// Absolute BPM ceiling, 0 disables
    pub bpm_max_diff: f64,
    /// Restrict to these key buckets; empty allows all
    pub allowed_key_relations: Vec<KeyRelation>,
    /// Candidates must carry every one of these tags
    pub required_tags: Vec<String>,
    /// Reference set for the tag score instead of the seed's own tags
    pub preferred_tags: Vec<String>,
    /// Multi-seed diversity penalty strength, 0 disables
    pub diversity: f32,
    pub weights: Weights,
}

impl Default for RecommendOptions {
    fn default() -> Self {
        Self {
            top_n: 25,
            tempo_tolerance_pct: 6.0,
            allow_doubletime: true,
            require_camelot_compatible: true,
            bpm_max_diff: 0.0,
            allowed_key_relations: Vec::new(),
            required_tags: Vec::new(),
            preferred_tags: Vec::new(),
            diversity: 0.3,
            weights: Weights::default(),
        }
    }
}

/// One recommended track
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Recommendation {
    pub path: String,
    pub artist: String,
    pub title: String,
    pub bpm: Option<f64>,
    pub key: Option<String>,
    /// Name of the matched mixing rule, "-" when none
    pub key_rule: String,
    pub key_relation: Option<KeyRelation>,
    pub tempo_note: TempoNote,
    /// Raw cosine distance from the query vector
    pub distance: f32,
    pub score: f32,
}

/// What the filters and scorer know about the seed side of a request
#[derive(Debug, Clone, Default)]
pub struct SeedProfile {
    /// Resolved seed paths, excluded from the results
    pub paths: Vec<String>,
    pub query: Vec<f32>,
    /// Seed BPM, averaged over seeds that have one
    pub bpm: Option<f64>,
    pub keys: Vec<String>,
    pub tags: BTreeSet<String>,
    pub bass: Vec<Vec<f32>>,
    pub rhythm: Vec<Vec<f32>>,
}

impl SeedProfile {
    fn from_tracks(seeds: &[(String, TrackMeta)], query: Vec<f32>) -> Self {
        let bpms: Vec<f64> = seeds.iter().filter_map(|(_, m)| m.bpm).filter(|b| *b > 0.0).collect();
        let bpm = (!bpms.is_empty()).then(|| bpms.iter().sum::<f64>() / bpms.len() as f64);

        Self {
            paths: seeds.iter().map(|(p, _)| p.clone()).collect(),
            query,
            bpm,
            keys: seeds
                .iter()
                .filter_map(|(_, m)| m.key.clone())
                .filter(|k| !k.trim().is_empty())
                .collect(),
            tags: seeds.iter().flat_map(|(_, m)| m.tags.iter().cloned()).collect(),
            bass: seeds
                .iter()
                .map(|(_, m)| m.features.bass().to_vec())
                .filter(|c| !c.is_empty())
                .collect(),
            rhythm: seeds
                .iter()
                .map(|(_, m)| m.features.rhythm().to_vec())
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }
}

fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

/// Recommendation engine over injected collaborators.
///
/// Without an index every request fails with
/// [`RecommendError::IndexUnavailable`]; without a similarity provider the
/// bass and rhythm terms score 0.
pub struct Recommender<'a> {
    meta: &'a dyn MetadataStore,
    vectors: &'a dyn VectorStore,
    index: Option<&'a dyn IndexProvider>,
    similarity: Option<&'a dyn SimilarityProvider>,
}

impl<'a> Recommender<'a> {
    pub fn new(meta: &'a dyn MetadataStore, vectors: &'a dyn VectorStore) -> Self {
        Self {
            meta,
            vectors,
            index: None,
            similarity: None,
        }
    }

    pub fn with_index(mut self, index: &'a dyn IndexProvider) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_similarity(mut self, similarity: &'a dyn SimilarityProvider) -> Self {
        self.similarity = Some(similarity);
        self
    }

    fn index(&self) -> Result<&'a dyn IndexProvider, RecommendError> {
        self.index.ok_or(RecommendError::IndexUnavailable)
    }

    /// Find the indexed track a seed identifier refers to.
    ///
    /// An exact path wins; otherwise the first indexed path (in label
    /// order) whose path or "Artist - Title" contains the identifier,
    /// ignoring case.
    pub fn resolve_seed(&self, identifier: &str) -> Result<String, RecommendError> {
        let paths = self.index()?.paths();

        if let Some(exact) = paths.iter().find(|p| p.as_str() == identifier) {
            return Ok(exact.clone());
        }

        let needle = identifier.trim().to_lowercase();
        if needle.is_empty() {
            return Err(RecommendError::SeedNotFound(identifier.to_string()));
        }
        paths
            .iter()
            .find(|p| {
                p.to_lowercase().contains(&needle)
                    || self
                        .meta
                        .get(p)
                        .is_some_and(|m| m.display_name().to_lowercase().contains(&needle))
            })
            .cloned()
            .ok_or_else(|| RecommendError::SeedNotFound(identifier.to_string()))
    }

    /// Load the embedding stored for `path`
    fn seed_embedding(&self, path: &str, meta: &TrackMeta) -> Result<Vec<f32>, RecommendError> {
        let reference = meta
            .embedding
            .as_deref()
            .filter(|_| meta.has_embedding())
            .ok_or_else(|| RecommendError::MissingEmbedding(path.to_string()))?;

        let vector = self.vectors.load_vector(reference).map_err(|e| {
            log::warn!("seed_embedding: '{}': {}", path, e);
            RecommendError::MissingEmbedding(path.to_string())
        })?;

        let dim = self.index()?.dim();
        if vector.len() != dim {
            return Err(RecommendError::DimensionMismatch {
                expected: dim,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }

    /// Recommend follow-ups for a single seed track
    pub fn recommend(&self, seed: &str, opts: &RecommendOptions) -> Result<Vec<Recommendation>, RecommendError> {
        let seed_path = self.resolve_seed(seed)?;
        let seed_meta = self.meta.get(&seed_path).unwrap_or_default();
        let query = self.seed_embedding(&seed_path, &seed_meta)?;

        let profile = SeedProfile::from_tracks(&[(seed_path.clone(), seed_meta)], query);
        let mut results = self.ranked_candidates(&profile, opts)?;
        results.truncate(opts.top_n);

        log::info!("recommend: {} results for '{}'", results.len(), seed_path);
        Ok(results)
    }

    /// Recommend tracks that fit a whole set of seeds.
    ///
    /// Seeds that cannot be resolved or lack an embedding are skipped with a
    /// warning. The query is the mean of the L2-normalised seed embeddings;
    /// BPM filtering uses the mean seed BPM and the key filter accepts a
    /// match against any seed key.
    pub fn recommend_sequence(&self, seeds: &[String], opts: &RecommendOptions) -> Result<Vec<Recommendation>, RecommendError> {
        let index = self.index()?;

        let mut resolved: Vec<(String, TrackMeta)> = Vec::new();
        let mut sum = vec![0.0f32; index.dim()];
        for seed in seeds {
            let path = match self.resolve_seed(seed) {
                Ok(path) => path,
                Err(e) => {
                    log::warn!("recommend_sequence: {}", e);
                    continue;
                }
            };
            if resolved.iter().any(|(p, _)| *p == path) {
                continue;
            }
            let meta = self.meta.get(&path).unwrap_or_default();
            let mut vector = match self.seed_embedding(&path, &meta) {
                Ok(v) => v,
                Err(e) => {
                    log::warn!("recommend_sequence: {}", e);
                    continue;
                }
            };
            l2_normalize(&mut vector);
            sum.iter_mut().zip(&vector).for_each(|(s, v)| *s += v);
            resolved.push((path, meta));
        }

        if resolved.is_empty() {
            return Err(RecommendError::NoValidSeeds);
        }
        let n = resolved.len() as f32;
        let query: Vec<f32> = sum.into_iter().map(|s| s / n).collect();

        let profile = SeedProfile::from_tracks(&resolved, query);
        let ranked = self.ranked_candidates(&profile, opts)?;

        let results = if opts.diversity > 0.0 {
            let embeddings = self.candidate_embeddings(&ranked);
            diversify(ranked, &embeddings, opts.diversity, opts.top_n)
        } else {
            let mut ranked = ranked;
            ranked.truncate(opts.top_n);
            ranked
        };

        log::info!("recommend_sequence: {} results for {} seeds", results.len(), resolved.len());
        Ok(results)
    }

    /// Query, filter and score, widening the pool until enough candidates
    /// survive or the whole index has been considered
    fn ranked_candidates(&self, seed: &SeedProfile, opts: &RecommendOptions) -> Result<Vec<Recommendation>, RecommendError> {
        let index = self.index()?;
        let total = index.len();
        let mut k = pool_size(opts.top_n, total);

        loop {
            let hits = index.query(&seed.query, k)?;
            let mut survivors = self.filter_and_score(seed, &hits, opts);
            sort_results(&mut survivors, &opts.weights);

            if survivors.len() >= opts.top_n || k >= total {
                log::debug!("ranked_candidates: {} of {} pool candidates survive", survivors.len(), hits.len());
                return Ok(survivors);
            }
            k = (k * 2).max(1).min(total);
            log::debug!("ranked_candidates: only {} survivors, widening pool to {}", survivors.len(), k);
        }
    }

    fn filter_and_score(&self, seed: &SeedProfile, hits: &[IndexHit], opts: &RecommendOptions) -> Vec<Recommendation> {
        let unweighted = opts.weights.is_unweighted();

        hits.par_iter()
            .filter(|hit| !seed.paths.contains(&hit.path))
            .filter_map(|hit| {
                let cand = self.meta.get(&hit.path).unwrap_or_else(|| {
                    log::debug!("filter_and_score: no metadata for '{}'", hit.path);
                    TrackMeta::default()
                });

                if let Err(reason) = filter::check(seed, &cand, opts) {
                    log::debug!("filter_and_score: dropped '{}' ({:?})", hit.path, reason);
                    return None;
                }

                let score = if unweighted {
                    1.0 - hit.distance
                } else {
                    let terms = score_terms(seed, &cand, hit.distance, opts, self.similarity);
                    opts.weights.combine(&terms)
                };

                Some(describe(seed, &hit.path, cand, hit.distance, score, opts))
            })
            .collect()
    }

    fn candidate_embeddings(&self, ranked: &[Recommendation]) -> HashMap<String, Vec<f32>> {
        ranked
            .par_iter()
            .filter_map(|r| {
                let meta = self.meta.get(&r.path)?;
                let reference = meta.embedding.as_deref().filter(|_| meta.has_embedding())?;
                match self.vectors.load_vector(reference) {
                    Ok(v) => Some((r.path.clone(), v)),
                    Err(e) => {
                        log::debug!("candidate_embeddings: '{}': {}", r.path, e);
                        None
                    }
                }
            })
            .collect()
    }
}

/// Build the output row for a surviving candidate
fn describe(seed: &SeedProfile, path: &str, cand: TrackMeta, distance: f32, score: f32, opts: &RecommendOptions) -> Recommendation {
    let cand_key = cand.key.as_deref();

    let key_rule = seed
        .keys
        .iter()
        .map(|sk| relation(Some(sk), cand_key))
        .find(|m| m.compatible && m.rule.is_some())
        .map(|m| m.rule_name())
        .unwrap_or("-")
        .to_string();

    let key_relation = seed
        .keys
        .iter()
        .filter_map(|sk| classify_relation(Some(sk), cand_key))
        .min_by_key(|r| match r {
            KeyRelation::Same => 0,
            KeyRelation::Relative => 1,
            KeyRelation::Neighbor => 2,
            KeyRelation::Other => 3,
        });

    let title = if cand.title.trim().is_empty() {
        file_stem(path)
    } else {
        cand.title
    };

    Recommendation {
        path: path.to_string(),
        artist: cand.artist,
        title,
        bpm: cand.bpm,
        key: cand.key,
        key_rule,
        key_relation,
        tempo_note: TempoNote::classify(seed.bpm, cand.bpm, opts.tempo_tolerance_pct, opts.allow_doubletime),
        distance,
        score,
    }
}

/// Descending score, or ascending distance when no weight is active
fn sort_results(results: &mut [Recommendation], weights: &Weights) {
    if weights.is_unweighted() {
        results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    } else {
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.distance.total_cmp(&b.distance))
        });
    }
}
