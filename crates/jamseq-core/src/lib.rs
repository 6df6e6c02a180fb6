//! jamseq-core: Song model, tempo maps and multi-track sequence assembly

pub mod builder;
pub mod chord;
pub mod comping;
mod error;
pub mod generator;
pub mod leadsheet;
pub mod midi;
pub mod mix;
pub mod postprocess;
mod sequence;
pub mod song;
pub mod tempo;
mod track;
pub mod validate;

pub use builder::{BuildStage, BuiltSequence, SequenceBuilder};
pub use chord::{Chord, ChordParseError, ChordQuality};
pub use comping::CompingGenerator;
pub use error::{GenerationError, GeneratorError, Result, SongStructureError, TempoMapError};
pub use generator::{GenerationContext, GeneratorRegistry, MusicGenerator, VoiceTracks};
pub use leadsheet::{ChordLeadSheet, ChordSymbol, Position};
pub use midi::{MidiEvent, ShortMessage, TimedEvent, PPQ_RESOLUTION};
pub use mix::{InstrumentMix, MidiMix};
pub use sequence::Sequence;
pub use song::{Rhythm, RhythmId, RhythmParameter, RhythmVoice, RpValue, Song, SongPart, TimeSignature, VoiceKey, VoiceKind};
pub use tempo::{TempoChange, TempoMap};
pub use track::Track;
