//! Background sequence building with progress reporting

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, TryRecvError};
use jamseq_core::{BuildStage, BuiltSequence, GenerationContext, GenerationError, GeneratorRegistry, MidiMix, SequenceBuilder, Song};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum BuildWorkerError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("Build thread exited without a result")]
    Disconnected,
}

/// Messages sent by the build thread
#[derive(Debug)]
pub enum BuildStatus {
    Working(BuildStage),
    Finished(Result<BuiltSequence, GenerationError>),
}

/// Runs a [`SequenceBuilder`] on its own thread.
///
/// Song and mix are owned by the worker for the duration of the build so the
/// caller may keep editing its own copies.
pub struct BuildWorker {
    status_rx: Receiver<BuildStatus>,
    handle: Option<JoinHandle<()>>,
}

impl BuildWorker {
    pub fn spawn(song: Song, mix: MidiMix, registry: Arc<GeneratorRegistry>) -> Self {
        let (status_tx, status_rx) = bounded::<BuildStatus>(64);

        let handle = thread::spawn(move || {
            let progress_tx = status_tx.clone();
            let result = SequenceBuilder::new(GenerationContext::new(&song, &mix), &registry)
                .on_progress(move |stage| {
                    // Progress is best effort, a slow reader only misses stages
                    let _ = progress_tx.try_send(BuildStatus::Working(stage.clone()));
                })
                .build();
            if let Err(e) = &result {
                warn!(song = %song.name, error = %e, "Sequence build failed");
            }
            let _ = status_tx.send(BuildStatus::Finished(result));
        });

        info!("Build worker started");
        Self {
            status_rx,
            handle: Some(handle),
        }
    }

    /// Next pending status, without blocking
    pub fn try_status(&self) -> Option<BuildStatus> {
        match self.status_rx.try_recv() {
            Ok(status) => Some(status),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Block until the build is finished, calling `on_stage` for each reported stage
    pub fn wait_with(mut self, mut on_stage: impl FnMut(&BuildStage)) -> Result<BuiltSequence, BuildWorkerError> {
        let mut outcome = Err(BuildWorkerError::Disconnected);
        while let Ok(status) = self.status_rx.recv() {
            match status {
                BuildStatus::Working(stage) => on_stage(&stage),
                BuildStatus::Finished(result) => {
                    outcome = result.map_err(BuildWorkerError::from);
                    break;
                }
            }
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Build thread panicked");
            }
        }
        outcome
    }

    pub fn wait(self) -> Result<BuiltSequence, BuildWorkerError> {
        self.wait_with(|_| {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jamseq_core::{CompingGenerator, Position, Rhythm, RhythmVoice, VoiceKind};

    fn song() -> Song {
        let rhythm = Rhythm::new(
            "rock",
            "Rock",
            vec![RhythmVoice::new("Drums", VoiceKind::Drums), RhythmVoice::new("Bass", VoiceKind::Bass)],
        );
        let id = rhythm.id.clone();
        let mut song = Song::new("Riff", 128);
        song.add_rhythm(rhythm);
        song.add_part(&id, 4);
        song.leadsheet.add("E7".parse().unwrap(), Position::new(0, 0.0));
        song
    }

    fn registry() -> Arc<GeneratorRegistry> {
        Arc::new(GeneratorRegistry::new().with_fallback(Box::new(CompingGenerator::new())))
    }

    #[test]
    fn test_worker_reports_stages_then_result() {
        let song = song();
        let mix = MidiMix::for_song(&song);
        let worker = BuildWorker::spawn(song, mix, registry());

        let mut stages = Vec::new();
        let built = worker.wait_with(|stage| stages.push(stage.clone())).unwrap();

        assert_eq!(stages.first(), Some(&BuildStage::Checking));
        assert_eq!(stages.last(), Some(&BuildStage::Validating));
        assert_eq!(built.sequence.track_count(), 3);
    }

    #[test]
    fn test_worker_returns_generation_error() {
        let mut song = song();
        song.leadsheet.chords.clear();
        let mix = MidiMix::for_song(&song);

        let result = BuildWorker::spawn(song, mix, registry()).wait();
        assert!(matches!(
            result,
            Err(BuildWorkerError::Generation(GenerationError::MissingStartChord))
        ));
    }

    #[test]
    fn test_try_status_eventually_finishes() {
        let song = song();
        let mix = MidiMix::for_song(&song);
        let worker = BuildWorker::spawn(song, mix, registry());

        let finished = loop {
            match worker.try_status() {
                Some(BuildStatus::Finished(result)) => break result,
                Some(BuildStatus::Working(_)) => {}
                None => thread::yield_now(),
            }
        };
        assert!(finished.is_ok());
    }
}
