//! Tempo compatibility between two tracks
//!
//! A BPM that is missing, zero, negative or NaN never rejects a candidate.

use serde::Serialize;

/// Tempo ratios accepted as double-time / half-time
const DOUBLE_RATIO: (f64, f64) = (1.94, 2.06);
const HALF_RATIO: (f64, f64) = (0.47, 0.53);

fn usable(bpm: Option<f64>) -> Option<f64> {
    bpm.filter(|b| *b > 0.0)
}

/// Check whether two tempos can be mixed.
///
/// Direct match when `|seed - cand| <= tolerance_pct% of seed`. With
/// `allow_doubletime` the candidate may also sit near 2x or 0.5x the seed,
/// with the tolerance taken relative to the scaled seed tempo.
pub fn tempo_match(seed: Option<f64>, candidate: Option<f64>, tolerance_pct: f64, allow_doubletime: bool) -> bool {
    let (Some(seed), Some(cand)) = (usable(seed), usable(candidate)) else {
        return true;
    };
    let tol = tolerance_pct / 100.0;

    if (seed - cand).abs() <= tol * seed {
        return true;
    }
    if allow_doubletime {
        let double = seed * 2.0;
        if (double - cand).abs() <= tol * double {
            return true;
        }
        let half = seed / 2.0;
        if (half - cand).abs() <= tol * half {
            return true;
        }
    }
    false
}

/// Hard BPM ceiling; `max_diff <= 0` disables it
pub fn bpm_within(seed: Option<f64>, candidate: Option<f64>, max_diff: f64) -> bool {
    if max_diff <= 0.0 {
        return true;
    }
    match (usable(seed), usable(candidate)) {
        (Some(s), Some(c)) => (s - c).abs() <= max_diff,
        _ => true,
    }
}

/// Tempo closeness in [0, 1] for the weighted score.
///
/// 1.0 for an exact match (or exact 2x / 0.5x when allowed), falling
/// linearly to 0.0 at the edge of the tolerance band. `None` when either
/// BPM is unusable.
pub fn tempo_closeness(seed: Option<f64>, candidate: Option<f64>, tolerance_pct: f64, allow_doubletime: bool) -> Option<f32> {
    let seed = usable(seed)?;
    let cand = usable(candidate)?;

    let multipliers: &[f64] = if allow_doubletime { &[1.0, 2.0, 0.5] } else { &[1.0] };
    let deviation = multipliers
        .iter()
        .map(|m| (cand - seed * m).abs() / (seed * m))
        .fold(f64::INFINITY, f64::min);

    let tol = tolerance_pct / 100.0;
    let closeness = if tol <= 0.0 {
        if deviation == 0.0 { 1.0 } else { 0.0 }
    } else {
        (1.0 - deviation / tol).max(0.0)
    };
    Some(closeness as f32)
}

/// Short marker describing how a candidate's tempo relates to the seed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum TempoNote {
    /// Within tolerance of the seed tempo
    #[serde(rename = "~")]
    Direct,
    #[serde(rename = "2x")]
    Double,
    #[serde(rename = "1/2x")]
    Half,
    #[default]
    #[serde(rename = "")]
    None,
}

impl TempoNote {
    pub fn classify(seed: Option<f64>, candidate: Option<f64>, tolerance_pct: f64, allow_doubletime: bool) -> Self {
        let (Some(seed), Some(cand)) = (usable(seed), usable(candidate)) else {
            return TempoNote::None;
        };
        let ratio = cand / seed;
        if (ratio - 1.0).abs() <= tolerance_pct / 100.0 {
            TempoNote::Direct
        } else if allow_doubletime && (DOUBLE_RATIO.0..=DOUBLE_RATIO.1).contains(&ratio) {
            TempoNote::Double
        } else if allow_doubletime && (HALF_RATIO.0..=HALF_RATIO.1).contains(&ratio) {
            TempoNote::Half
        } else {
            TempoNote::None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TempoNote::Direct => "~",
            TempoNote::Double => "2x",
            TempoNote::Half => "1/2x",
            TempoNote::None => "",
        }
    }
}
