//! Song model consumed by the sequence builder: rhythms, song parts, lead sheet

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SongStructureError;
use crate::leadsheet::{ChordLeadSheet, Position};

/// Rhythm parameter id of the mute parameter
pub const RP_MUTE: &str = "mute";
/// Rhythm parameter id of the tempo factor parameter (percent)
pub const RP_TEMPO_FACTOR: &str = "tempo_factor";

/// Identity of a rhythm
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RhythmId(pub String);

impl RhythmId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for RhythmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Time signature of a rhythm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub upper: u8,
    pub lower: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self { upper: 4, lower: 4 }
    }
}

impl TimeSignature {
    pub fn new(upper: u8, lower: u8) -> Self {
        Self { upper, lower }
    }

    /// At least one beat per bar, and a power-of-two note value
    pub fn is_valid(&self) -> bool {
        self.upper > 0 && self.lower.is_power_of_two()
    }

    /// Bar length in quarter notes (6/8 = 3.0)
    pub fn natural_beats(&self) -> f64 {
        self.upper as f64 * 4.0 / self.lower as f64
    }

    pub fn ticks_per_bar(&self, ppq: u32) -> u64 {
        (self.natural_beats() * ppq as f64).round() as u64
    }
}

/// Instrument family of a rhythm voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceKind {
    Drums,
    Bass,
    #[default]
    Keyboard,
    Guitar,
    Pad,
}

/// One instrumental part of a rhythm
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RhythmVoice {
    pub name: String,
    #[serde(default)]
    pub kind: VoiceKind,
}

impl RhythmVoice {
    pub fn new(name: impl Into<String>, kind: VoiceKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Identity of a rhythm voice across the song
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VoiceKey {
    pub rhythm: RhythmId,
    pub voice: String,
}

impl VoiceKey {
    pub fn new(rhythm: &RhythmId, voice: impl Into<String>) -> Self {
        Self {
            rhythm: rhythm.clone(),
            voice: voice.into(),
        }
    }
}

impl fmt::Display for VoiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.rhythm, self.voice)
    }
}

/// Parameter a rhythm exposes on each song part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RhythmParameter {
    /// Value is the set of muted voice names
    Mute,
    /// Value is a tempo percentage (50..=200)
    TempoFactor,
    /// Enumerated value interpreted by the generator (variation, fill, ...)
    State { id: String, values: Vec<String> },
}

impl RhythmParameter {
    pub fn id(&self) -> &str {
        match self {
            Self::Mute => RP_MUTE,
            Self::TempoFactor => RP_TEMPO_FACTOR,
            Self::State { id, .. } => id,
        }
    }
}

/// Value of a rhythm parameter on a song part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpValue {
    Percent(u32),
    State(String),
    Set(BTreeSet<String>),
}

/// A rhythm: voices, time signature and declared parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rhythm {
    pub id: RhythmId,
    pub name: String,
    #[serde(default)]
    pub time_signature: TimeSignature,
    pub voices: Vec<RhythmVoice>,
    #[serde(default)]
    pub parameters: Vec<RhythmParameter>,
}

impl Rhythm {
    pub fn new(id: impl Into<String>, name: impl Into<String>, voices: Vec<RhythmVoice>) -> Self {
        Self {
            id: RhythmId::new(id),
            name: name.into(),
            time_signature: TimeSignature::default(),
            voices,
            parameters: vec![RhythmParameter::Mute, RhythmParameter::TempoFactor],
        }
    }

    pub fn has_parameter(&self, id: &str) -> bool {
        self.parameters.iter().any(|p| p.id() == id)
    }

    pub fn voice_keys(&self) -> impl Iterator<Item = VoiceKey> + '_ {
        self.voices.iter().map(|v| VoiceKey::new(&self.id, v.name.clone()))
    }

    pub fn voice(&self, name: &str) -> Option<&RhythmVoice> {
        self.voices.iter().find(|v| v.name == name)
    }
}

/// A bar range of the arrangement bound to one rhythm
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongPart {
    pub rhythm: RhythmId,
    pub start_bar: u32,
    pub nb_bars: u32,
    /// Optional label, e.g. the lead sheet section name
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub values: BTreeMap<String, RpValue>,
}

impl SongPart {
    pub fn new(rhythm: &RhythmId, start_bar: u32, nb_bars: u32) -> Self {
        Self {
            rhythm: rhythm.clone(),
            start_bar,
            nb_bars,
            name: String::new(),
            values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, id: &str, value: RpValue) -> Self {
        self.values.insert(id.to_string(), value);
        self
    }

    pub fn end_bar(&self) -> u32 {
        self.start_bar + self.nb_bars
    }

    pub fn contains_bar(&self, bar: u32) -> bool {
        bar >= self.start_bar && bar < self.end_bar()
    }

    /// Muted voice names, empty if the rhythm has no mute parameter
    pub fn muted_voices(&self, rhythm: &Rhythm) -> BTreeSet<String> {
        if !rhythm.has_parameter(RP_MUTE) {
            return BTreeSet::new();
        }
        match self.values.get(RP_MUTE) {
            Some(RpValue::Set(names)) => names.clone(),
            Some(RpValue::State(name)) if !name.is_empty() => BTreeSet::from([name.clone()]),
            _ => BTreeSet::new(),
        }
    }

    /// Tempo factor percentage, `None` if the rhythm has no tempo factor parameter
    pub fn tempo_factor(&self, rhythm: &Rhythm) -> Option<u32> {
        if !rhythm.has_parameter(RP_TEMPO_FACTOR) {
            return None;
        }
        match self.values.get(RP_TEMPO_FACTOR) {
            Some(RpValue::Percent(p)) => Some((*p).clamp(50, 200)),
            _ => Some(100),
        }
    }

    pub fn state(&self, id: &str) -> Option<&str> {
        match self.values.get(id) {
            Some(RpValue::State(s)) => Some(s),
            _ => None,
        }
    }
}

/// The song: lead sheet, rhythms and the song parts partitioning the arrangement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub name: String,
    /// Tempo in BPM
    pub tempo: u32,
    #[serde(default)]
    pub leadsheet: ChordLeadSheet,
    pub rhythms: Vec<Rhythm>,
    pub parts: Vec<SongPart>,
}

impl Song {
    pub fn new(name: impl Into<String>, tempo: u32) -> Self {
        Self {
            name: name.into(),
            tempo,
            leadsheet: ChordLeadSheet::new(),
            rhythms: Vec::new(),
            parts: Vec::new(),
        }
    }

    /// Register a rhythm (replaces one with the same id)
    pub fn add_rhythm(&mut self, rhythm: Rhythm) {
        self.rhythms.retain(|r| r.id != rhythm.id);
        self.rhythms.push(rhythm);
    }

    /// Append a song part after the last one
    pub fn add_part(&mut self, rhythm: &RhythmId, nb_bars: u32) -> &mut SongPart {
        let start = self.total_bars();
        self.parts.push(SongPart::new(rhythm, start, nb_bars));
        let last = self.parts.len() - 1;
        &mut self.parts[last]
    }

    /// Check the song parts partition the arrangement with no gap or overlap
    pub fn validate(&self) -> Result<(), SongStructureError> {
        if self.parts.is_empty() {
            return Err(SongStructureError::Empty);
        }
        let mut expected = 0;
        for (index, part) in self.parts.iter().enumerate() {
            if part.start_bar != expected {
                return Err(SongStructureError::NotContiguous {
                    index,
                    expected,
                    found: part.start_bar,
                });
            }
            if part.nb_bars == 0 {
                return Err(SongStructureError::EmptyPart(index));
            }
            let Some(rhythm) = self.rhythm(&part.rhythm) else {
                return Err(SongStructureError::UnknownRhythm {
                    index,
                    rhythm: part.rhythm.to_string(),
                });
            };
            let ts = rhythm.time_signature;
            if !ts.is_valid() {
                return Err(SongStructureError::InvalidTimeSignature {
                    index,
                    upper: ts.upper,
                    lower: ts.lower,
                });
            }
            expected = part.end_bar();
        }
        Ok(())
    }

    pub fn rhythm(&self, id: &RhythmId) -> Option<&Rhythm> {
        self.rhythms.iter().find(|r| &r.id == id)
    }

    /// Time signature of a song part (4/4 if its rhythm is not registered)
    fn part_time_signature(&self, part: &SongPart) -> TimeSignature {
        self.rhythm(&part.rhythm)
            .map(|r| r.time_signature)
            .unwrap_or_default()
    }

    /// Distinct rhythms in first-use order
    pub fn unique_rhythms(&self) -> Vec<&Rhythm> {
        let mut res: Vec<&Rhythm> = Vec::new();
        for rhythm in self.parts.iter().filter_map(|p| self.rhythm(&p.rhythm)) {
            if !res.iter().any(|r| r.id == rhythm.id) {
                res.push(rhythm);
            }
        }
        res
    }

    /// Total length in bars
    pub fn total_bars(&self) -> u32 {
        self.parts.last().map(SongPart::end_bar).unwrap_or(0)
    }

    /// Song part containing `bar`
    pub fn part_at_bar(&self, bar: u32) -> Option<(usize, &SongPart)> {
        self.parts.iter().enumerate().find(|(_, p)| p.contains_bar(bar))
    }

    /// Position of the start of `bar` in natural beats (quarter notes)
    pub fn bar_position_in_beats(&self, bar: u32) -> f64 {
        let mut beats = 0.0;
        for part in &self.parts {
            let bar_beats = self.part_time_signature(part).natural_beats();
            if bar < part.end_bar() {
                return beats + (bar - part.start_bar) as f64 * bar_beats;
            }
            beats += part.nb_bars as f64 * bar_beats;
        }
        beats
    }

    /// Total length in natural beats
    pub fn size_in_beats(&self) -> f64 {
        self.bar_position_in_beats(self.total_bars())
    }

    /// Tick of a lead sheet position
    pub fn position_to_tick(&self, position: Position, ppq: u32) -> u64 {
        let beats = self.bar_position_in_beats(position.bar) + position.beat as f64;
        (beats * ppq as f64).round() as u64
    }

    /// Tick range [start, end] covered by a song part (end inclusive)
    pub fn part_tick_range(&self, part: &SongPart, ppq: u32) -> (u64, u64) {
        let start = (self.bar_position_in_beats(part.start_bar) * ppq as f64).round() as u64;
        let length = self
            .part_time_signature(part)
            .ticks_per_bar(ppq)
            .saturating_mul(part.nb_bars as u64);
        (start, start.saturating_add(length).saturating_sub(1).max(start))
    }

    /// Bar/beat position of a tick
    pub fn tick_to_position(&self, tick: u64, ppq: u32) -> Position {
        let beats = tick as f64 / ppq as f64;
        let mut start_beats = 0.0;
        for part in &self.parts {
            let bar_beats = self.part_time_signature(part).natural_beats();
            let part_beats = part.nb_bars as f64 * bar_beats;
            if beats < start_beats + part_beats {
                let in_part = beats - start_beats;
                let bar_offset = (in_part / bar_beats).floor();
                return Position::new(
                    part.start_bar + bar_offset as u32,
                    (in_part - bar_offset * bar_beats) as f32,
                );
            }
            start_beats += part_beats;
        }
        Position::new(self.total_bars(), 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_rhythm_song() -> Song {
        let mut song = Song::new("Test", 120);
        let swing = Rhythm::new("swing", "Swing", vec![RhythmVoice::new("Bass", VoiceKind::Bass)]);
        let mut waltz = Rhythm::new("waltz", "Waltz", vec![RhythmVoice::new("Piano", VoiceKind::Keyboard)]);
        waltz.time_signature = TimeSignature::new(3, 4);
        let (swing_id, waltz_id) = (swing.id.clone(), waltz.id.clone());
        song.add_rhythm(swing);
        song.add_rhythm(waltz);
        song.add_part(&swing_id, 4);
        song.add_part(&waltz_id, 2);
        song.add_part(&swing_id, 1);
        song
    }

    #[test]
    fn test_validate_partition() {
        let mut song = two_rhythm_song();
        assert_eq!(song.validate(), Ok(()));

        song.parts[1].start_bar = 5;
        assert_eq!(
            song.validate(),
            Err(SongStructureError::NotContiguous { index: 1, expected: 4, found: 5 })
        );

        assert_eq!(Song::new("Empty", 100).validate(), Err(SongStructureError::Empty));
    }

    #[test]
    fn test_validate_rejects_invalid_time_signatures() {
        for (upper, lower) in [(0, 4), (4, 0), (3, 6)] {
            let mut song = two_rhythm_song();
            song.rhythms[1].time_signature = TimeSignature::new(upper, lower);
            assert_eq!(
                song.validate(),
                Err(SongStructureError::InvalidTimeSignature { index: 1, upper, lower })
            );
        }

        let mut song = two_rhythm_song();
        song.rhythms[1].time_signature = TimeSignature::new(6, 8);
        assert_eq!(song.validate(), Ok(()));
    }

    #[test]
    fn test_unique_rhythms_first_use_order() {
        let song = two_rhythm_song();
        let ids: Vec<&str> = song.unique_rhythms().iter().map(|r| r.id.0.as_str()).collect();
        assert_eq!(ids, vec!["swing", "waltz"]);
    }

    #[test]
    fn test_tick_ranges_with_mixed_time_signatures() {
        let song = two_rhythm_song();
        assert_eq!(song.part_tick_range(&song.parts[0], 480), (0, 7679));
        assert_eq!(song.part_tick_range(&song.parts[1], 480), (7680, 10559));
        assert_eq!(song.part_tick_range(&song.parts[2], 480), (10560, 12479));
        assert_eq!(song.size_in_beats(), 26.0);
        assert_eq!(song.tick_to_position(7680 + 1440 + 480, 480), Position::new(5, 1.0));
        assert_eq!(song.position_to_tick(Position::new(5, 1.0), 480), 9600);
    }

    #[test]
    fn test_rhythm_parameter_values() {
        let rhythm = Rhythm::new("swing", "Swing", vec![RhythmVoice::new("Bass", VoiceKind::Bass)]);
        let part = SongPart::new(&rhythm.id, 0, 4)
            .with_value(RP_MUTE, RpValue::Set(BTreeSet::from(["Bass".to_string()])))
            .with_value(RP_TEMPO_FACTOR, RpValue::Percent(300));
        assert_eq!(part.muted_voices(&rhythm).len(), 1);
        assert_eq!(part.tempo_factor(&rhythm), Some(200));

        let mut bare = rhythm.clone();
        bare.parameters.clear();
        assert!(part.muted_voices(&bare).is_empty());
        assert_eq!(part.tempo_factor(&bare), None);
    }
}
