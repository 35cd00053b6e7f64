//! Hard candidate filters
//!
//! Two kinds of checks that must stay separate:
//!
//! - fail-open: tempo, BPM ceiling, Camelot rules, key relation buckets.
//!   Missing or unparseable data on either side passes.
//! - fail-closed: required tags. A candidate without the tags is dropped.

use std::collections::BTreeSet;

use super::{RecommendOptions, SeedProfile};
use crate::music::{bpm_within, classify_relation, relation, tempo_match};
use crate::store::TrackMeta;

/// Why a candidate was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Tempo,
    BpmLimit,
    Key,
    KeyRelation,
    MissingTags,
}

/// Checks that let a candidate through when information is missing
pub fn fail_open(seed: &SeedProfile, cand: &TrackMeta, opts: &RecommendOptions) -> Result<(), Rejection> {
    if !tempo_match(seed.bpm, cand.bpm, opts.tempo_tolerance_pct, opts.allow_doubletime) {
        return Err(Rejection::Tempo);
    }
    if !bpm_within(seed.bpm, cand.bpm, opts.bpm_max_diff) {
        return Err(Rejection::BpmLimit);
    }

    let cand_key = cand.key.as_deref();

    // Compatible with any seed key; no usable seed key means no constraint
    if opts.require_camelot_compatible && !seed.keys.is_empty() {
        let compatible = seed.keys.iter().any(|sk| relation(Some(sk), cand_key).compatible);
        if !compatible {
            return Err(Rejection::Key);
        }
    }

    if !opts.allowed_key_relations.is_empty() {
        let buckets: Vec<_> = seed
            .keys
            .iter()
            .filter_map(|sk| classify_relation(Some(sk), cand_key))
            .collect();
        if !buckets.is_empty() && !buckets.iter().any(|b| opts.allowed_key_relations.contains(b)) {
            return Err(Rejection::KeyRelation);
        }
    }

    Ok(())
}

/// Checks that drop a candidate when information is missing
pub fn fail_closed(cand: &TrackMeta, required_tags: &[String]) -> Result<(), Rejection> {
    if required_tags.is_empty() {
        return Ok(());
    }
    let tags: BTreeSet<&str> = cand.tag_set();
    if required_tags.iter().all(|t| tags.contains(t.as_str())) {
        Ok(())
    } else {
        Err(Rejection::MissingTags)
    }
}

pub fn check(seed: &SeedProfile, cand: &TrackMeta, opts: &RecommendOptions) -> Result<(), Rejection> {
    fail_open(seed, cand, opts)?;
    fail_closed(cand, &opts.required_tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::music::KeyRelation;

    fn seed(bpm: Option<f64>, keys: &[&str]) -> SeedProfile {
        SeedProfile {
            bpm,
            keys: keys.iter().map(|k| k.to_string()).collect(),
            ..Default::default()
        }
    }

    fn cand(bpm: Option<f64>, key: Option<&str>, tags: &[&str]) -> TrackMeta {
        TrackMeta {
            bpm,
            key: key.map(str::to_string),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    fn opts() -> RecommendOptions {
        RecommendOptions {
            require_camelot_compatible: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_key_and_bpm_pass() {
        let s = seed(Some(120.0), &["8A"]);
        assert_eq!(fail_open(&s, &cand(None, None, &[]), &opts()), Ok(()));
        assert_eq!(fail_open(&s, &cand(Some(120.0), Some("garbage"), &[]), &opts()), Ok(()));

        let unknown_seed = seed(None, &[]);
        assert_eq!(fail_open(&unknown_seed, &cand(Some(60.0), Some("3B"), &[]), &opts()), Ok(()));
    }

    #[test]
    fn test_incompatible_key_and_tempo_are_dropped() {
        let s = seed(Some(120.0), &["8A"]);
        assert_eq!(fail_open(&s, &cand(Some(95.0), Some("9A"), &[]), &opts()), Err(Rejection::Tempo));
        assert_eq!(fail_open(&s, &cand(Some(121.0), Some("2A"), &[]), &opts()), Err(Rejection::Key));

        let relaxed = RecommendOptions {
            require_camelot_compatible: false,
            ..Default::default()
        };
        assert_eq!(fail_open(&s, &cand(Some(121.0), Some("2A"), &[]), &relaxed), Ok(()));
    }

    #[test]
    fn test_any_seed_key_is_enough() {
        let s = seed(Some(120.0), &["8A", "2A"]);
        assert_eq!(fail_open(&s, &cand(Some(121.0), Some("3A"), &[]), &opts()), Ok(()));
    }

    #[test]
    fn test_bpm_limit() {
        let s = seed(Some(120.0), &[]);
        let limited = RecommendOptions {
            bpm_max_diff: 2.0,
            ..Default::default()
        };
        assert_eq!(fail_open(&s, &cand(Some(123.0), None, &[]), &limited), Err(Rejection::BpmLimit));
        assert_eq!(fail_open(&s, &cand(None, None, &[]), &limited), Ok(()));
    }

    #[test]
    fn test_allowed_key_relations() {
        let s = seed(None, &["8A"]);
        let only_same = RecommendOptions {
            allowed_key_relations: vec![KeyRelation::Same, KeyRelation::Relative],
            ..Default::default()
        };
        assert_eq!(fail_open(&s, &cand(None, Some("8B"), &[]), &only_same), Ok(()));
        assert_eq!(fail_open(&s, &cand(None, Some("9A"), &[]), &only_same), Err(Rejection::KeyRelation));
        assert_eq!(fail_open(&s, &cand(None, None, &[]), &only_same), Ok(()));
    }

    #[test]
    fn test_required_tags_fail_closed() {
        let required = vec!["Vocal".to_string(), "Peak".to_string()];
        assert_eq!(fail_closed(&cand(None, None, &["Peak", "Vocal", "Dark"]), &required), Ok(()));
        assert_eq!(fail_closed(&cand(None, None, &["Peak"]), &required), Err(Rejection::MissingTags));
        assert_eq!(fail_closed(&cand(None, None, &[]), &required), Err(Rejection::MissingTags));
        assert_eq!(fail_closed(&cand(None, None, &[]), &[]), Ok(()));
    }
}
