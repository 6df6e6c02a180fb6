//! Rhythm generator interface and the explicit registry the builder draws from

use std::collections::HashMap;

use crate::error::GeneratorError;
use crate::midi::{MidiEvent, PPQ_RESOLUTION};
use crate::mix::MidiMix;
use crate::song::{Rhythm, RhythmId, Song, SongPart, VoiceKey};
use crate::track::Track;

/// What a generator sees: the song, its mix and the sequence resolution
#[derive(Debug, Clone, Copy)]
pub struct GenerationContext<'a> {
    pub song: &'a Song,
    pub mix: &'a MidiMix,
    pub ppq: u32,
}

impl<'a> GenerationContext<'a> {
    pub fn new(song: &'a Song, mix: &'a MidiMix) -> Self {
        Self {
            song,
            mix,
            ppq: PPQ_RESOLUTION,
        }
    }

    /// Song parts played by `rhythm`, with their tick range [start, end]
    pub fn parts_for<'s>(&'s self, rhythm: &'s RhythmId) -> impl Iterator<Item = (&'a SongPart, (u64, u64))> + 's {
        self.song
            .parts
            .iter()
            .filter(move |p| &p.rhythm == rhythm)
            .map(move |p| (p, self.song.part_tick_range(p, self.ppq)))
    }

    /// Total arrangement length in ticks
    pub fn total_ticks(&self) -> u64 {
        (self.song.size_in_beats() * self.ppq as f64).round() as u64
    }
}

/// Tracks allocated to one rhythm, one per voice, in voice order
#[derive(Debug, Default)]
pub struct VoiceTracks {
    entries: Vec<(VoiceKey, Track)>,
}

impl VoiceTracks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, voice: VoiceKey, track: Track) {
        self.entries.push((voice, track));
    }

    pub fn get(&self, voice: &VoiceKey) -> Option<&Track> {
        self.entries.iter().find(|(k, _)| k == voice).map(|(_, t)| t)
    }

    pub fn get_mut(&mut self, voice: &VoiceKey) -> Option<&mut Track> {
        self.entries.iter_mut().find(|(k, _)| k == voice).map(|(_, t)| t)
    }

    /// Track of the voice named `name`
    pub fn by_name_mut(&mut self, name: &str) -> Option<&mut Track> {
        self.entries.iter_mut().find(|(k, _)| k.voice == name).map(|(_, t)| t)
    }

    pub fn voices(&self) -> impl Iterator<Item = &VoiceKey> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add a note (NoteOn + NoteOff) to a voice's track
    pub fn add_note(&mut self, voice: &VoiceKey, channel: u8, pitch: u8, velocity: u8, tick: u64, duration: u64) -> bool {
        let Some(track) = self.get_mut(voice) else {
            return false;
        };
        track.add(tick, MidiEvent::NoteOn { channel, pitch, velocity });
        track.add(tick + duration.max(1), MidiEvent::NoteOff { channel, pitch, velocity: 0 });
        true
    }

    pub fn into_entries(self) -> Vec<(VoiceKey, Track)> {
        self.entries
    }
}

/// A rhythm engine producing music for the song parts that use its rhythm.
///
/// Implementations only write to the tracks of the voices they are given and
/// only within the ticks of their rhythm's song parts.
pub trait MusicGenerator: Send + Sync {
    fn name(&self) -> &str;

    /// Called once before generation, e.g. to load pattern files
    fn load_resources(&self, _rhythm: &Rhythm) -> Result<(), GeneratorError> {
        Ok(())
    }

    fn generate(&self, rhythm: &Rhythm, context: &GenerationContext<'_>, tracks: &mut VoiceTracks) -> Result<(), GeneratorError>;
}

/// Generators available to the builder, keyed by rhythm
#[derive(Default)]
pub struct GeneratorRegistry {
    generators: HashMap<RhythmId, Box<dyn MusicGenerator>>,
    fallback: Option<Box<dyn MusicGenerator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, rhythm: RhythmId, generator: Box<dyn MusicGenerator>) {
        self.generators.insert(rhythm, generator);
    }

    /// Generator used for rhythms without a dedicated one
    pub fn set_fallback(&mut self, generator: Box<dyn MusicGenerator>) {
        self.fallback = Some(generator);
    }

    pub fn with_fallback(mut self, generator: Box<dyn MusicGenerator>) -> Self {
        self.set_fallback(generator);
        self
    }

    pub fn get(&self, rhythm: &RhythmId) -> Option<&dyn MusicGenerator> {
        self.generators
            .get(rhythm)
            .or(self.fallback.as_ref())
            .map(|g| g.as_ref())
    }
}

impl std::fmt::Debug for GeneratorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorRegistry")
            .field("rhythms", &self.generators.keys().collect::<Vec<_>>())
            .field("fallback", &self.fallback.as_ref().map(|g| g.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::{RhythmVoice, VoiceKind};

    struct Silent;

    impl MusicGenerator for Silent {
        fn name(&self) -> &str {
            "silent"
        }

        fn generate(&self, _rhythm: &Rhythm, _context: &GenerationContext<'_>, _tracks: &mut VoiceTracks) -> Result<(), GeneratorError> {
            Ok(())
        }
    }

    #[test]
    fn test_registry_lookup_and_fallback() {
        let swing = RhythmId::new("swing");
        let mut registry = GeneratorRegistry::new();
        assert!(registry.get(&swing).is_none());

        registry.register(swing.clone(), Box::new(Silent));
        assert_eq!(registry.get(&swing).map(|g| g.name()), Some("silent"));
        assert!(registry.get(&RhythmId::new("bossa")).is_none());

        let registry = registry.with_fallback(Box::new(Silent));
        assert!(registry.get(&RhythmId::new("bossa")).is_some());
    }

    #[test]
    fn test_voice_tracks_add_note() {
        let rhythm = Rhythm::new("swing", "Swing", vec![RhythmVoice::new("Bass", VoiceKind::Bass)]);
        let key = VoiceKey::new(&rhythm.id, "Bass");
        let mut tracks = VoiceTracks::new();
        tracks.insert(key.clone(), Track::named("Swing-Bass"));

        assert!(tracks.add_note(&key, 1, 36, 90, 480, 240));
        assert!(!tracks.add_note(&VoiceKey::new(&rhythm.id, "Piano"), 1, 60, 90, 0, 240));
        assert_eq!(tracks.get(&key).map(Track::len), Some(3));
    }
}
