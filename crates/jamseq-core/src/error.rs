//! Error types for jamseq

use thiserror::Error;

use crate::leadsheet::Position;

/// Failure raised by a rhythm generator while filling its tracks
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct GeneratorError(pub String);

impl GeneratorError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Any classified failure raised while assembling or validating a sequence.
///
/// A build that fails never hands back a partial sequence.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    #[error(transparent)]
    SongStructure(#[from] SongStructureError),
    #[error("No starting chord on first bar/first beat")]
    MissingStartChord,
    #[error("Two chord symbols can not have the same position: {first} - {second} at {position}")]
    DuplicateChordPosition {
        first: String,
        second: String,
        position: Position,
    },
    #[error("No music generator registered for rhythm {0}")]
    NoGenerator(String),
    #[error("Rhythm {rhythm} failed to generate music: {cause}")]
    GeneratorFailure {
        rhythm: String,
        #[source]
        cause: GeneratorError,
    },
    #[error(
        "Unexpected note on track {track} from rhythm {rhythm} at tick {tick} (bar {bar}), expected rhythm {expected}"
    )]
    RhythmSliceViolation {
        rhythm: String,
        track: usize,
        tick: u64,
        bar: u32,
        expected: String,
    },
    #[error("Unauthorized Midi event in generated track #{track}: {event}")]
    InvalidEventVocabulary { track: usize, event: String },
    #[error("Invalid channel used in Midi track #{track}: expected channel={expected} actual={actual}")]
    ChannelMismatch { track: usize, expected: u8, actual: u8 },
}

pub type Result<T> = std::result::Result<T, GenerationError>;

/// Invalid tempo map construction
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TempoMapError {
    #[error("Tempo map must contain at least one tempo change")]
    Empty,
    #[error("First tempo change must be at tick 0, found tick {0}")]
    FirstNotAtZero(u64),
    #[error("Tempo change ticks must be non-decreasing ({previous} then {next})")]
    Unordered { previous: u64, next: u64 },
    #[error("Invalid tempo {0} us per quarter")]
    InvalidTempo(f64),
}

/// Song structure that does not partition the arrangement
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SongStructureError {
    #[error("Song structure has no song part")]
    Empty,
    #[error("Song part #{index} starts at bar {found}, expected bar {expected}")]
    NotContiguous { index: usize, expected: u32, found: u32 },
    #[error("Song part #{0} has zero bars")]
    EmptyPart(usize),
    #[error("Song part #{index} uses unknown rhythm {rhythm}")]
    UnknownRhythm { index: usize, rhythm: String },
    #[error("Song part #{index} has an invalid time signature {upper}/{lower}")]
    InvalidTimeSignature { index: usize, upper: u8, lower: u8 },
}
