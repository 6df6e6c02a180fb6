//! Chord lead sheet: chord symbols at bar/beat positions

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::chord::Chord;

/// A position in the arrangement: zero-based bar and beat within the bar
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Position {
    pub bar: u32,
    #[serde(default)]
    pub beat: f32,
}

impl Position {
    pub fn new(bar: u32, beat: f32) -> Self {
        Self { bar, beat }
    }

    /// Hashable identity of the position, with -0.0 folded into 0.0
    fn key(&self) -> (u32, u32) {
        (self.bar, (self.beat + 0.0).to_bits())
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // User-facing positions are 1-based
        write!(f, "[{}:{}]", self.bar + 1, self.beat + 1.0)
    }
}

/// A chord symbol placed on the lead sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordSymbol {
    pub chord: Chord,
    pub position: Position,
}

impl ChordSymbol {
    pub fn new(chord: Chord, position: Position) -> Self {
        Self { chord, position }
    }
}

/// Chord symbols of a song, in arrangement bars
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChordLeadSheet {
    #[serde(default)]
    pub chords: Vec<ChordSymbol>,
}

impl ChordLeadSheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, chord: Chord, position: Position) {
        self.chords.push(ChordSymbol::new(chord, position));
    }

    /// Chord symbols ordered by position
    pub fn sorted(&self) -> Vec<&ChordSymbol> {
        let mut chords: Vec<&ChordSymbol> = self.chords.iter().collect();
        chords.sort_by(|a, b| {
            a.position
                .partial_cmp(&b.position)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        chords
    }

    /// Chord symbols in bars [from_bar, to_bar], ordered by position
    pub fn items_in_bars(&self, from_bar: u32, to_bar: u32) -> Vec<&ChordSymbol> {
        self.sorted()
            .into_iter()
            .filter(|cs| cs.position.bar >= from_bar && cs.position.bar <= to_bar)
            .collect()
    }

    /// Chord in effect at `position`: the last symbol at or before it
    pub fn chord_at(&self, position: Position) -> Option<&ChordSymbol> {
        self.sorted()
            .into_iter()
            .take_while(|cs| cs.position <= position)
            .last()
    }

    /// First pair of chord symbols sharing an identical position
    pub fn find_duplicate_position(&self) -> Option<(&ChordSymbol, &ChordSymbol)> {
        let mut seen = std::collections::HashMap::new();
        for cs in &self.chords {
            if let Some(existing) = seen.insert(cs.position.key(), cs) {
                return Some((existing, cs));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chord(s: &str) -> Chord {
        s.parse().unwrap()
    }

    #[test]
    fn test_chord_at() {
        let mut cls = ChordLeadSheet::new();
        cls.add(chord("G7"), Position::new(1, 0.0));
        cls.add(chord("Cmaj7"), Position::new(0, 0.0));
        cls.add(chord("Dm7"), Position::new(0, 2.0));

        assert_eq!(cls.chord_at(Position::new(0, 1.5)).unwrap().chord, chord("Cmaj7"));
        assert_eq!(cls.chord_at(Position::new(0, 3.0)).unwrap().chord, chord("Dm7"));
        assert_eq!(cls.chord_at(Position::new(5, 0.0)).unwrap().chord, chord("G7"));
        assert_eq!(cls.items_in_bars(1, 3).len(), 1);
    }

    #[test]
    fn test_find_duplicate_position() {
        let mut cls = ChordLeadSheet::new();
        cls.add(chord("C"), Position::new(0, 0.0));
        cls.add(chord("F"), Position::new(2, 1.0));
        assert!(cls.find_duplicate_position().is_none());

        cls.add(chord("Bb7"), Position::new(2, 1.0));
        let (first, second) = cls.find_duplicate_position().unwrap();
        assert_eq!(first.chord, chord("F"));
        assert_eq!(second.chord, chord("Bb7"));
    }

    #[test]
    fn test_negative_zero_beat_is_same_position() {
        let mut cls = ChordLeadSheet::new();
        cls.add(chord("C"), Position::new(0, 0.0));
        cls.add(chord("Dm7"), Position::new(1, -0.0));
        cls.add(chord("G7"), Position::new(1, 0.0));
        let (first, second) = cls.find_duplicate_position().unwrap();
        assert_eq!(first.chord, chord("Dm7"));
        assert_eq!(second.chord, chord("G7"));
    }

    #[test]
    fn test_position_display_is_one_based() {
        assert_eq!(Position::new(3, 2.0).to_string(), "[4:3]");
    }
}
