//! Chord symbols: parsing and voicing

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid chord symbol: {0:?}")]
pub struct ChordParseError(pub String);

/// Chord quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChordQuality {
    Major,
    Minor,
    Diminished,
    Augmented,
    Major6,
    Minor6,
    Major7,
    Minor7,
    Dominant7,
    Diminished7,
    HalfDiminished7,
    Sus2,
    Sus4,
    Add9,
}

impl ChordQuality {
    /// Get chord intervals from root
    pub fn intervals(&self) -> &'static [u8] {
        match self {
            Self::Major => &[0, 4, 7],
            Self::Minor => &[0, 3, 7],
            Self::Diminished => &[0, 3, 6],
            Self::Augmented => &[0, 4, 8],
            Self::Major6 => &[0, 4, 7, 9],
            Self::Minor6 => &[0, 3, 7, 9],
            Self::Major7 => &[0, 4, 7, 11],
            Self::Minor7 => &[0, 3, 7, 10],
            Self::Dominant7 => &[0, 4, 7, 10],
            Self::Diminished7 => &[0, 3, 6, 9],
            Self::HalfDiminished7 => &[0, 3, 6, 10],
            Self::Sus2 => &[0, 2, 7],
            Self::Sus4 => &[0, 5, 7],
            Self::Add9 => &[0, 4, 7, 14],
        }
    }

    /// Suffix as written after the root
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Major => "",
            Self::Minor => "m",
            Self::Diminished => "dim",
            Self::Augmented => "+",
            Self::Major6 => "6",
            Self::Minor6 => "m6",
            Self::Major7 => "maj7",
            Self::Minor7 => "m7",
            Self::Dominant7 => "7",
            Self::Diminished7 => "dim7",
            Self::HalfDiminished7 => "m7b5",
            Self::Sus2 => "sus2",
            Self::Sus4 => "sus4",
            Self::Add9 => "add9",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        let quality = match suffix {
            "" | "M" | "maj" => Self::Major,
            "m" | "min" | "-" => Self::Minor,
            "dim" | "o" => Self::Diminished,
            "+" | "aug" => Self::Augmented,
            "6" => Self::Major6,
            "m6" | "-6" => Self::Minor6,
            "maj7" | "M7" | "7M" => Self::Major7,
            "m7" | "min7" | "-7" => Self::Minor7,
            "7" => Self::Dominant7,
            "dim7" | "o7" => Self::Diminished7,
            "m7b5" | "ø" => Self::HalfDiminished7,
            "sus2" => Self::Sus2,
            "sus4" | "sus" | "7sus4" => Self::Sus4,
            "add9" => Self::Add9,
            _ => return None,
        };
        Some(quality)
    }
}

const NOTE_NAMES: [&str; 12] = ["C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B"];

/// A parsed chord symbol such as `Bbmaj7` or `F#m7b5`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Chord {
    /// Pitch class of the root, 0 = C
    pub root: u8,
    pub quality: ChordQuality,
}

impl Chord {
    pub fn new(root: u8, quality: ChordQuality) -> Self {
        Self { root: root % 12, quality }
    }

    /// Chord tones in close position from the root in the octave starting at `base`
    pub fn voicing(&self, base: u8) -> Vec<u8> {
        let root = base - base % 12 + self.root;
        self.quality
            .intervals()
            .iter()
            .map(|&interval| (root as i16 + interval as i16).clamp(0, 127) as u8)
            .collect()
    }

    /// Drop-2 voicing: second voice from the top dropped an octave
    pub fn drop2(&self, base: u8) -> Vec<u8> {
        let mut notes = self.voicing(base);
        if notes.len() >= 2 {
            let idx = notes.len() - 2;
            notes[idx] = notes[idx].saturating_sub(12);
            notes.sort();
        }
        notes
    }

    /// Root note in the octave starting at `base`
    pub fn bass_note(&self, base: u8) -> u8 {
        (base - base % 12 + self.root).min(127)
    }
}

impl FromStr for Chord {
    type Err = ChordParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || ChordParseError(s.to_string());
        let mut chars = s.chars();
        let letter = chars.next().ok_or_else(err)?;
        let mut root: i16 = match letter.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(err()),
        };
        let mut rest = chars.as_str();
        if let Some(r) = rest.strip_prefix('#') {
            root += 1;
            rest = r;
        } else if let Some(r) = rest.strip_prefix('b') {
            root -= 1;
            rest = r;
        }
        // Slash bass is ignored
        let suffix = rest.split('/').next().unwrap_or("");
        let quality = ChordQuality::from_suffix(suffix).ok_or_else(err)?;
        Ok(Self::new(root.rem_euclid(12) as u8, quality))
    }
}

impl TryFrom<String> for Chord {
    type Error = ChordParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Chord> for String {
    fn from(chord: Chord) -> Self {
        chord.to_string()
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", NOTE_NAMES[self.root as usize], self.quality.suffix())
    }
}
