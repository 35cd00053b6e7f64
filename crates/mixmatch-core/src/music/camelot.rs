//! Camelot wheel mixing rules
//!
//! Two independent views over a pair of keys:
//!
//! - [`relation`] walks the named DJ mixing rules in priority order and
//!   reports the first one that applies.
//! - [`key_compat_score`] / [`KeyRelation`] give a coarse numeric bucket
//!   (same / relative / neighbor / other) used for UI-level filtering and
//!   as the key term of the weighted score.
//!
//! Missing or unparseable keys never make a pair incompatible.

use serde::{Deserialize, Serialize};

use super::MusicalKey;

/// Scale family on the Camelot wheel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Letter A
    Minor,
    /// Letter B
    Major,
}

impl Mode {
    pub fn letter(self) -> char {
        match self {
            Mode::Minor => 'A',
            Mode::Major => 'B',
        }
    }

    fn from_letter(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'A' => Some(Mode::Minor),
            'B' => Some(Mode::Major),
            _ => None,
        }
    }
}

/// A position on the Camelot wheel: number 1..=12 plus A (minor) / B (major)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CamelotKey {
    pub number: u8,
    pub mode: Mode,
}

/// Wrap any integer onto the 1..=12 wheel
fn wrap(n: i32) -> u8 {
    ((n - 1).rem_euclid(12) + 1) as u8
}

impl CamelotKey {
    /// Create a key, normalizing `number` into 1..=12
    pub fn new(number: i32, mode: Mode) -> Self {
        Self {
            number: wrap(number),
            mode,
        }
    }

    /// Parse "8A", "12b", " 3B " and the like.
    ///
    /// Out-of-range numbers wrap around the wheel ("13A" is "1A").
    /// Keys written as note names ("Am", "F#") are converted through
    /// [`MusicalKey`]. Anything else yields `None`.
    pub fn parse(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        let letter = chars.next_back()?;
        let number_part = chars.as_str();

        if !number_part.is_empty() {
            if let (Ok(number), Some(mode)) = (number_part.parse::<i32>(), Mode::from_letter(letter)) {
                return Some(Self::new(number, mode));
            }
        }

        MusicalKey::parse(trimmed).map(|k| k.camelot())
    }

    /// Move `steps` positions around the wheel, keeping the mode
    pub fn shifted(self, steps: i32) -> Self {
        Self::new(self.number as i32 + steps, self.mode)
    }

    /// Shortest distance around the wheel between the two numbers (0..=6)
    pub fn wheel_distance(self, other: Self) -> u8 {
        let raw = (self.number as i32 - other.number as i32).rem_euclid(12);
        raw.min(12 - raw) as u8
    }
}

impl std::fmt::Display for CamelotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.number, self.mode.letter())
    }
}

// ─── Named Mixing Rules ─────────────────────────────────────────────

/// A named harmonic-mixing rule, in evaluation priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixRule {
    SameKey,
    /// Same letter, one step either way
    Adjacent,
    /// Same number, other letter
    Relative,
    /// Same letter, seven steps up
    RaisingEnergy,
    /// Same letter, two steps up
    EnergyBoost,
    /// Minor to major, three steps up
    MoodShiftMinorToMajor,
    /// Major to minor, three steps down
    MoodShiftMajorToMinor,
}

impl MixRule {
    pub fn name(self) -> &'static str {
        match self {
            MixRule::SameKey => "Same Key",
            MixRule::Adjacent => "Camelot +/-1",
            MixRule::Relative => "Relative Maj/Min",
            MixRule::RaisingEnergy => "Raising energy (+7)",
            MixRule::EnergyBoost => "Energy Boost ++ (+2)",
            MixRule::MoodShiftMinorToMajor => "Mood Shifter (min->Maj +3)",
            MixRule::MoodShiftMajorToMinor => "Mood Shifter (Maj->min -3)",
        }
    }
}

/// Outcome of evaluating the named rules for a seed/candidate pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyMatch {
    pub compatible: bool,
    pub rule: Option<MixRule>,
}

impl KeyMatch {
    /// Key information was missing: compatible, no rule
    pub const UNKNOWN: KeyMatch = KeyMatch { compatible: true, rule: None };
    /// Both keys known but no rule applies
    pub const INCOMPATIBLE: KeyMatch = KeyMatch { compatible: false, rule: None };

    fn matched(rule: MixRule) -> Self {
        Self { compatible: true, rule: Some(rule) }
    }

    /// Display name of the matched rule, "-" when none matched
    pub fn rule_name(&self) -> &'static str {
        self.rule.map(MixRule::name).unwrap_or("-")
    }
}

/// Harmonic relation between a seed key and a candidate key.
///
/// Missing or unparseable keys on either side give [`KeyMatch::UNKNOWN`].
pub fn relation(seed: Option<&str>, candidate: Option<&str>) -> KeyMatch {
    match (seed.and_then(CamelotKey::parse), candidate.and_then(CamelotKey::parse)) {
        (Some(s), Some(c)) => relation_between(s, c),
        _ => KeyMatch::UNKNOWN,
    }
}

/// Evaluate the named rules for two parsed keys; first match wins.
///
/// The +7, +2 and mood-shifter rules are directional (seed → candidate).
pub fn relation_between(seed: CamelotKey, cand: CamelotKey) -> KeyMatch {
    let same_mode = seed.mode == cand.mode;

    if seed == cand {
        return KeyMatch::matched(MixRule::SameKey);
    }
    if same_mode && (cand == seed.shifted(1) || cand == seed.shifted(-1)) {
        return KeyMatch::matched(MixRule::Adjacent);
    }
    if seed.number == cand.number {
        return KeyMatch::matched(MixRule::Relative);
    }
    if same_mode && cand == seed.shifted(7) {
        return KeyMatch::matched(MixRule::RaisingEnergy);
    }
    if same_mode && cand == seed.shifted(2) {
        return KeyMatch::matched(MixRule::EnergyBoost);
    }
    if seed.mode == Mode::Minor && cand.mode == Mode::Major && cand.number == wrap(seed.number as i32 + 3) {
        return KeyMatch::matched(MixRule::MoodShiftMinorToMajor);
    }
    if seed.mode == Mode::Major && cand.mode == Mode::Minor && cand.number == wrap(seed.number as i32 - 3) {
        return KeyMatch::matched(MixRule::MoodShiftMajorToMinor);
    }

    KeyMatch::INCOMPATIBLE
}

// ─── Coarse Relation Buckets ────────────────────────────────────────

/// Coarse classification of a key pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyRelation {
    Same,
    Relative,
    Neighbor,
    Other,
}

impl KeyRelation {
    /// Bucket a compatibility score from [`key_compat_score`]
    pub fn from_score(score: f32) -> Self {
        if score >= 0.99 {
            KeyRelation::Same
        } else if score >= 0.79 {
            KeyRelation::Relative
        } else if score >= 0.69 {
            KeyRelation::Neighbor
        } else {
            KeyRelation::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyRelation::Same => "same",
            KeyRelation::Relative => "relative",
            KeyRelation::Neighbor => "neighbor",
            KeyRelation::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "same" => Some(KeyRelation::Same),
            "relative" => Some(KeyRelation::Relative),
            "neighbor" | "neighbour" => Some(KeyRelation::Neighbor),
            "other" => Some(KeyRelation::Other),
            _ => None,
        }
    }
}

/// Numeric key compatibility: 1.0 same, 0.8 relative, 0.7 ±1 neighbor, else 0.0
pub fn key_compat_score(a: CamelotKey, b: CamelotKey) -> f32 {
    if a.number == b.number {
        if a.mode == b.mode { 1.0 } else { 0.8 }
    } else if a.mode == b.mode && a.wheel_distance(b) == 1 {
        0.7
    } else {
        0.0
    }
}

/// Coarse relation of two key strings, `None` when either is missing or unparseable
pub fn classify_relation(a: Option<&str>, b: Option<&str>) -> Option<KeyRelation> {
    let a = a.and_then(CamelotKey::parse)?;
    let b = b.and_then(CamelotKey::parse)?;
    Some(KeyRelation::from_score(key_compat_score(a, b)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_keys() -> Vec<CamelotKey> {
        (1..=12)
            .flat_map(|n| [CamelotKey::new(n, Mode::Minor), CamelotKey::new(n, Mode::Major)])
            .collect()
    }

    fn rule(seed: &str, cand: &str) -> &'static str {
        relation(Some(seed), Some(cand)).rule_name()
    }

    #[test]
    fn test_parse_camelot() {
        assert_eq!(CamelotKey::parse("8A"), Some(CamelotKey { number: 8, mode: Mode::Minor }));
        assert_eq!(CamelotKey::parse(" 12b "), Some(CamelotKey { number: 12, mode: Mode::Major }));
        assert_eq!(CamelotKey::parse("13A"), Some(CamelotKey { number: 1, mode: Mode::Minor }));
        assert_eq!(CamelotKey::parse("0B"), Some(CamelotKey { number: 12, mode: Mode::Major }));
    }

    #[test]
    fn test_parse_note_names() {
        assert_eq!(CamelotKey::parse("Am").map(|k| k.to_string()), Some("8A".to_string()));
        assert_eq!(CamelotKey::parse("C").map(|k| k.to_string()), Some("8B".to_string()));
        assert_eq!(CamelotKey::parse("Ab").map(|k| k.to_string()), Some("4B".to_string()));
        assert_eq!(CamelotKey::parse("A").map(|k| k.to_string()), Some("11B".to_string()));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(CamelotKey::parse(""), None);
        assert_eq!(CamelotKey::parse("8C"), None);
        assert_eq!(CamelotKey::parse("xyzA"), None);
    }

    #[test]
    fn test_same_key_for_every_key() {
        for k in all_keys() {
            let m = relation_between(k, k);
            assert!(m.compatible);
            assert_eq!(m.rule_name(), "Same Key", "{k}");
        }
    }

    #[test]
    fn test_adjacent_is_symmetric() {
        assert_eq!(rule("8A", "9A"), "Camelot +/-1");
        assert_eq!(rule("9A", "8A"), "Camelot +/-1");
        assert_eq!(rule("12B", "1B"), "Camelot +/-1");
        assert_eq!(rule("1B", "12B"), "Camelot +/-1");
    }

    #[test]
    fn test_relative_is_symmetric() {
        assert_eq!(rule("8A", "8B"), "Relative Maj/Min");
        assert_eq!(rule("8B", "8A"), "Relative Maj/Min");
    }

    #[test]
    fn test_directional_rules() {
        assert_eq!(rule("8A", "3A"), "Raising energy (+7)");
        assert_eq!(rule("8A", "10A"), "Energy Boost ++ (+2)");
        assert_eq!(rule("8A", "11B"), "Mood Shifter (min->Maj +3)");
        assert_eq!(rule("8B", "5A"), "Mood Shifter (Maj->min -3)");
        // Wraps around the wheel
        assert_eq!(rule("11A", "1A"), "Energy Boost ++ (+2)");
        assert_eq!(rule("2B", "11A"), "Mood Shifter (Maj->min -3)");
    }

    #[test]
    fn test_incompatible() {
        let m = relation(Some("8A"), Some("2A"));
        assert!(!m.compatible);
        assert_eq!(m.rule_name(), "-");
        // +3 only counts when switching minor -> major
        assert!(!relation(Some("8A"), Some("11A")).compatible);
    }

    #[test]
    fn test_missing_keys_fail_open() {
        assert_eq!(relation(None, Some("8A")), KeyMatch::UNKNOWN);
        assert_eq!(relation(Some("8A"), None), KeyMatch::UNKNOWN);
        assert_eq!(relation(Some("garbage"), Some("8A")), KeyMatch::UNKNOWN);
        assert!(relation(None, None).compatible);
    }

    #[test]
    fn test_compat_score_values() {
        let k = |s| CamelotKey::parse(s).unwrap();
        assert_eq!(key_compat_score(k("8A"), k("8A")), 1.0);
        assert_eq!(key_compat_score(k("8A"), k("8B")), 0.8);
        assert_eq!(key_compat_score(k("8A"), k("7A")), 0.7);
        assert_eq!(key_compat_score(k("12A"), k("1A")), 0.7);
        assert_eq!(key_compat_score(k("8A"), k("10A")), 0.0);
        assert_eq!(key_compat_score(k("8A"), k("9B")), 0.0);
    }

    #[test]
    fn test_buckets_agree_with_named_rules() {
        for s in all_keys() {
            for c in all_keys() {
                let bucket = KeyRelation::from_score(key_compat_score(s, c));
                let named = relation_between(s, c).rule;
                let expected = match named {
                    Some(MixRule::SameKey) => KeyRelation::Same,
                    Some(MixRule::Relative) => KeyRelation::Relative,
                    Some(MixRule::Adjacent) => KeyRelation::Neighbor,
                    _ => KeyRelation::Other,
                };
                assert_eq!(bucket, expected, "{s} -> {c}");
            }
        }
    }

    #[test]
    fn test_classify_relation_strings() {
        assert_eq!(classify_relation(Some("8A"), Some("9A")), Some(KeyRelation::Neighbor));
        assert_eq!(classify_relation(Some("8A"), Some("")), None);
        assert_eq!(KeyRelation::from_str("Neighbour"), Some(KeyRelation::Neighbor));
        assert_eq!(KeyRelation::Relative.as_str(), "relative");
    }
}
