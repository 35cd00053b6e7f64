//! Music theory utilities for harmonic and tempo mixing
//!
//! Provides Camelot key parsing and the DJ mixing relations between keys,
//! plus tempo compatibility including double/half-time matching.

mod camelot;
mod tempo;

pub use camelot::{
    classify_relation, key_compat_score, relation, relation_between, CamelotKey, KeyMatch,
    KeyRelation, MixRule, Mode,
};
pub use tempo::{bpm_within, tempo_closeness, tempo_match, TempoNote};

/// Musical key with root note and scale
///
/// Only used to read keys that were written in note-name notation
/// ("Am", "C#m", "Bb") so they can be placed on the Camelot wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MusicalKey {
    /// Root note as semitone offset from C (0=C, 1=C#, 2=D, ..., 11=B)
    pub root: u8,
    /// true = minor, false = major
    pub minor: bool,
}

impl MusicalKey {
    /// Create a new musical key
    pub const fn new(root: u8, minor: bool) -> Self {
        Self {
            root: root % 12,
            minor,
        }
    }

    /// Parse key string like "Am", "C#m", "F", "Bb", "Ebmin", "D major"
    ///
    /// Anything after the root and accidental must be a recognised scale
    /// suffix; "Cat" or "Gx" are rejected rather than read as C or G major.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let mut chars = s.chars().peekable();

        let base_root = match chars.next()?.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return None,
        };

        let root = match chars.peek() {
            Some('#') | Some('♯') => {
                chars.next();
                (base_root + 1) % 12
            }
            Some('b') | Some('♭') => {
                chars.next();
                (base_root + 11) % 12 // +11 is same as -1 mod 12
            }
            _ => base_root,
        };

        let suffix: String = chars.collect::<String>().trim().to_lowercase();
        let minor = match suffix.as_str() {
            "" | "maj" | "major" => false,
            "m" | "min" | "minor" => true,
            _ => return None,
        };

        Some(Self { root, minor })
    }

    /// Get the Camelot wheel position (1-12, A/B)
    ///
    /// A = minor keys, B = major keys
    /// The number represents position on the circle of fifths
    pub fn camelot(&self) -> CamelotKey {
        // Major keys (B): C=8, G=9, D=10, A=11, E=12, B=1, F#=2, Db=3, Ab=4, Eb=5, Bb=6, F=7
        // Minor keys (A): Am=8, Em=9, Bm=10, F#m=11, C#m=12, G#m=1, D#m=2, Bbm=3, Fm=4, Cm=5, Gm=6, Dm=7
        const CAMELOT_MAJOR: [u8; 12] = [8, 3, 10, 5, 12, 7, 2, 9, 4, 11, 6, 1];
        const CAMELOT_MINOR: [u8; 12] = [5, 12, 7, 2, 9, 4, 11, 6, 1, 8, 3, 10];

        if self.minor {
            CamelotKey::new(CAMELOT_MINOR[self.root as usize] as i32, Mode::Minor)
        } else {
            CamelotKey::new(CAMELOT_MAJOR[self.root as usize] as i32, Mode::Major)
        }
    }
}

impl std::fmt::Display for MusicalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
        let note = NOTE_NAMES[self.root as usize];
        if self.minor {
            write!(f, "{}m", note)
        } else {
            write!(f, "{}", note)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_major_keys() {
        assert_eq!(MusicalKey::parse("C"), Some(MusicalKey::new(0, false)));
        assert_eq!(MusicalKey::parse("G"), Some(MusicalKey::new(7, false)));
        assert_eq!(MusicalKey::parse("F#"), Some(MusicalKey::new(6, false)));
        assert_eq!(MusicalKey::parse("Bb"), Some(MusicalKey::new(10, false)));
        assert_eq!(MusicalKey::parse("D major"), Some(MusicalKey::new(2, false)));
    }

    #[test]
    fn test_parse_minor_keys() {
        assert_eq!(MusicalKey::parse("Am"), Some(MusicalKey::new(9, true)));
        assert_eq!(MusicalKey::parse("C#m"), Some(MusicalKey::new(1, true)));
        assert_eq!(MusicalKey::parse("Bbm"), Some(MusicalKey::new(10, true)));
        assert_eq!(MusicalKey::parse("Ebmin"), Some(MusicalKey::new(3, true)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(MusicalKey::parse(""), None);
        assert_eq!(MusicalKey::parse("Cat"), None);
        assert_eq!(MusicalKey::parse("H"), None);
        assert_eq!(MusicalKey::parse("8A"), None);
    }

    #[test]
    fn test_camelot() {
        let am = MusicalKey::parse("Am").unwrap();
        let c = MusicalKey::parse("C").unwrap();

        // Am and C are both Camelot 8 (A and B respectively)
        assert_eq!(am.camelot(), CamelotKey::new(8, Mode::Minor));
        assert_eq!(c.camelot(), CamelotKey::new(8, Mode::Major));
        assert_eq!(MusicalKey::parse("Bbm").unwrap().camelot().to_string(), "3A");
    }

    #[test]
    fn test_to_string() {
        assert_eq!(MusicalKey::parse("Am").unwrap().to_string(), "Am");
        assert_eq!(MusicalKey::parse("F#m").unwrap().to_string(), "F#m");
        assert_eq!(MusicalKey::parse("Bb").unwrap().to_string(), "A#"); // Normalized to sharps
    }
}
