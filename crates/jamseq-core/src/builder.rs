//! Multi-track sequence assembly from a song and its registered generators

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, info};

use crate::error::{GenerationError, Result};
use crate::generator::{GenerationContext, GeneratorRegistry, VoiceTracks};
use crate::postprocess;
use crate::sequence::Sequence;
use crate::song::VoiceKey;
use crate::track::Track;
use crate::validate;

/// Progress notifications emitted while building
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStage {
    /// Song structure and lead sheet preconditions
    Checking,
    /// A rhythm's generator is running (`index` of `count` rhythms)
    Generating { rhythm: String, index: usize, count: usize },
    PostProcessing,
    Validating,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Checking => write!(f, "Checking song"),
            Self::Generating { rhythm, index, count } => {
                write!(f, "Generating {rhythm} ({}/{count})", index + 1)
            }
            Self::PostProcessing => write!(f, "Post-processing"),
            Self::Validating => write!(f, "Validating"),
        }
    }
}

/// A successfully assembled sequence
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltSequence {
    pub sequence: Sequence,
    /// Track index of each rhythm voice
    pub voice_tracks: BTreeMap<VoiceKey, usize>,
}

impl BuiltSequence {
    pub fn track_of(&self, voice: &VoiceKey) -> Option<usize> {
        self.voice_tracks.get(voice).copied()
    }

    pub fn voice_of(&self, track: usize) -> Option<&VoiceKey> {
        self.voice_tracks
            .iter()
            .find(|(_, idx)| **idx == track)
            .map(|(voice, _)| voice)
    }
}

/// Assembles one track per rhythm voice, filled by the registry's generators.
///
/// Preconditions are checked before any generator runs. A failing build
/// never returns a partial sequence.
pub struct SequenceBuilder<'a> {
    context: GenerationContext<'a>,
    registry: &'a GeneratorRegistry,
    progress: Option<Box<dyn FnMut(&BuildStage) + 'a>>,
}

impl<'a> SequenceBuilder<'a> {
    pub fn new(context: GenerationContext<'a>, registry: &'a GeneratorRegistry) -> Self {
        Self {
            context,
            registry,
            progress: None,
        }
    }

    /// Receive a notification at each build stage
    pub fn on_progress(mut self, callback: impl FnMut(&BuildStage) + 'a) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    fn report(&mut self, stage: BuildStage) {
        debug!(%stage, "Build stage");
        if let Some(callback) = self.progress.as_mut() {
            callback(&stage);
        }
    }

    pub fn build(mut self) -> Result<BuiltSequence> {
        let song = self.context.song;

        self.report(BuildStage::Checking);
        song.validate()?;
        validate::check_start_chord(song)?;
        validate::check_chords_at_same_position(song)?;

        let mut sequence = Sequence::new(self.context.ppq);
        sequence.add_track(Track::named(format!("{} (jamseq song)", song.name)));
        let mut voice_tracks = BTreeMap::new();

        let rhythms = song.unique_rhythms();
        let count = rhythms.len();
        for (index, rhythm) in rhythms.into_iter().enumerate() {
            self.report(BuildStage::Generating {
                rhythm: rhythm.name.clone(),
                index,
                count,
            });

            let generator = self
                .registry
                .get(&rhythm.id)
                .ok_or_else(|| GenerationError::NoGenerator(rhythm.name.clone()))?;

            let mut tracks = VoiceTracks::new();
            for voice in &rhythm.voices {
                tracks.insert(
                    VoiceKey::new(&rhythm.id, voice.name.clone()),
                    Track::named(format!("{}-{}", rhythm.name, voice.name)),
                );
            }

            let failure = |cause| GenerationError::GeneratorFailure {
                rhythm: rhythm.name.clone(),
                cause,
            };
            generator.load_resources(rhythm).map_err(failure)?;
            generator.generate(rhythm, &self.context, &mut tracks).map_err(failure)?;
            debug!(rhythm = %rhythm.id, generator = generator.name(), "Rhythm tracks generated");

            for (voice, track) in tracks.into_entries() {
                let track_index = sequence.add_track(track);
                voice_tracks.insert(voice, track_index);
            }
        }

        self.report(BuildStage::PostProcessing);
        postprocess::fix_end_of_tracks(&mut sequence, song, voice_tracks.values().copied());
        postprocess::mute_notes(&mut sequence, song, self.context.mix);
        postprocess::update_notes(&mut sequence, self.context.mix);

        self.report(BuildStage::Validating);
        validate::check_rhythm_slices(&sequence, song, &voice_tracks)?;
        validate::check_event_vocabulary(&sequence)?;

        info!(
            song = %song.name,
            tracks = sequence.track_count(),
            events = sequence.event_count(),
            ticks = sequence.tick_length(),
            "Sequence built"
        );
        Ok(BuiltSequence { sequence, voice_tracks })
    }
}
