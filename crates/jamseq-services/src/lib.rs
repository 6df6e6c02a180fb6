//! jamseq-services: MIDI file export, live recording and background builds

pub mod build_worker;
pub mod export;
pub mod recorder;

pub use build_worker::{BuildStatus, BuildWorker, BuildWorkerError};
pub use export::{encode, ExportError, MidiFileExporter, PreparedExport};
pub use recorder::{InputClock, MidiRecorder, MonotonicClock, RecorderError, RecorderState, RecorderWarning};
