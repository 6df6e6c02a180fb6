//! Live MIDI input recording against a sequence start marker

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use jamseq_core::midi::{MidiEvent, ShortMessage, REF_TEMPO_BPM};
use jamseq_core::{Sequence, TempoChange, TempoMap, TempoMapError};
use thiserror::Error;
use tracing::{debug, warn};

/// Text of the marker placed on track 0 where recording starts
pub const START_MARKER: &str = "Recording Start";

/// Default number of messages a record session can hold
pub const DEFAULT_CAPACITY: usize = 0x10_0000;

const NO_ORIGIN: i64 = i64::MIN;

/// Conditions that make the recorder drop input. Logged, never returned from `send`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecorderWarning {
    #[error("Recording buffer full ({capacity} messages), further input is dropped")]
    BufferFull { capacity: usize },
    #[error("Input device has no timestamp support, using the system clock")]
    DegradedTimestampPrecision,
    #[error("Input received before the recording start marker was reached")]
    NotArmed,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecorderError {
    #[error("Sequence has no track")]
    EmptySequence,
    #[error("Track {0} not found in sequence")]
    TrackNotFound(usize),
    #[error("Invalid tempo data: {0}")]
    Tempo(#[from] TempoMapError),
}

/// Time source of the input device
pub trait InputClock: Send + Sync {
    /// Current device position in microseconds, `None` if the device cannot timestamp
    fn micros(&self) -> Option<i64>;
}

/// Software monotonic clock used when the device cannot timestamp
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { epoch: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl InputClock for MonotonicClock {
    fn micros(&self) -> Option<i64> {
        i64::try_from(self.epoch.elapsed().as_micros()).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    /// Recording enabled, waiting for the start marker
    Armed,
    Active,
}

/// Preallocated capture slots, single writer / single reader
struct CaptureBuffer {
    offsets: Box<[AtomicU64]>,
    messages: Box<[AtomicU32]>,
    len: AtomicUsize,
}

impl CaptureBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            offsets: (0..capacity).map(|_| AtomicU64::new(0)).collect(),
            messages: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
            len: AtomicUsize::new(0),
        }
    }

    fn capacity(&self) -> usize {
        self.messages.len()
    }

    /// Returns false when full
    fn push(&self, offset_us: i64, message: ShortMessage) -> bool {
        let idx = self.len.load(Ordering::Relaxed);
        if idx >= self.capacity() {
            return false;
        }
        self.offsets[idx].store(offset_us as u64, Ordering::Relaxed);
        self.messages[idx].store(message.pack(), Ordering::Relaxed);
        self.len.store(idx + 1, Ordering::Release);
        true
    }

    fn snapshot(&self) -> Vec<(i64, ShortMessage)> {
        let len = self.len.load(Ordering::Acquire);
        (0..len)
            .map(|i| {
                let offset = self.offsets[i].load(Ordering::Relaxed) as i64;
                (offset, ShortMessage::unpack(self.messages[i].load(Ordering::Relaxed)))
            })
            .collect()
    }
}

/// Records short messages from an input device relative to the moment the
/// transport passes the start marker, then writes them into a sequence track.
///
/// `send` is meant to be called from the device I/O thread only; it never
/// blocks or allocates.
pub struct MidiRecorder {
    start_tick: u64,
    clock: Arc<dyn InputClock>,
    software_clock: MonotonicClock,
    use_device_timestamps: bool,
    recording: AtomicBool,
    recording_occurred: AtomicBool,
    origin_us: AtomicI64,
    buffer: CaptureBuffer,
    dropped: AtomicU64,
    full_logged: AtomicBool,
    not_armed_logged: AtomicBool,
}

impl MidiRecorder {
    pub fn new(sequence: &mut Sequence, start_tick: u64, clock: Arc<dyn InputClock>) -> Result<Self, RecorderError> {
        Self::with_capacity(sequence, start_tick, clock, DEFAULT_CAPACITY)
    }

    /// Create a recorder and place the start marker on track 0 at `start_tick`
    pub fn with_capacity(
        sequence: &mut Sequence,
        start_tick: u64,
        clock: Arc<dyn InputClock>,
        capacity: usize,
    ) -> Result<Self, RecorderError> {
        let track0 = sequence.get_track_mut(0).ok_or(RecorderError::EmptySequence)?;
        let marker = MidiEvent::Marker(START_MARKER.to_string());
        if track0.events_in(start_tick, start_tick, |e| *e == marker).next().is_none() {
            track0.add(start_tick, marker);
            track0.normalize();
        }

        let use_device_timestamps = clock.micros().is_some();
        if !use_device_timestamps {
            warn!(warning = %RecorderWarning::DegradedTimestampPrecision, "Degraded recording precision");
        }
        debug!(start_tick, use_device_timestamps, capacity, "MidiRecorder created");

        Ok(Self {
            start_tick,
            clock,
            software_clock: MonotonicClock::new(),
            use_device_timestamps,
            recording: AtomicBool::new(false),
            recording_occurred: AtomicBool::new(false),
            origin_us: AtomicI64::new(NO_ORIGIN),
            buffer: CaptureBuffer::new(capacity),
            dropped: AtomicU64::new(0),
            full_logged: AtomicBool::new(false),
            not_armed_logged: AtomicBool::new(false),
        })
    }

    pub fn start_tick(&self) -> u64 {
        self.start_tick
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn is_degraded(&self) -> bool {
        !self.use_device_timestamps
    }

    pub fn state(&self) -> RecorderState {
        if !self.recording.load(Ordering::Acquire) {
            RecorderState::Idle
        } else if self.origin_us.load(Ordering::Acquire) == NO_ORIGIN {
            RecorderState::Armed
        } else {
            RecorderState::Active
        }
    }

    pub fn set_recording_enabled(&self, enabled: bool) {
        if enabled {
            self.recording_occurred.store(true, Ordering::Release);
        }
        self.recording.store(enabled, Ordering::Release);
    }

    pub fn is_recording_enabled(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    pub fn recording_occurred(&self) -> bool {
        self.recording_occurred.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.set_recording_enabled(false);
    }

    fn now_us(&self) -> i64 {
        let now = if self.use_device_timestamps {
            self.clock.micros()
        } else {
            self.software_clock.micros()
        };
        now.unwrap_or(0)
    }

    /// Transport notification: passing the start marker sets the time origin
    pub fn on_meta_event(&self, event: &MidiEvent) {
        if !matches!(event, MidiEvent::Marker(text) if text == START_MARKER) {
            return;
        }
        let origin = self.now_us();
        if self
            .origin_us
            .compare_exchange(NO_ORIGIN, origin, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            debug!(origin_us = origin, use_device_timestamps = self.use_device_timestamps, "Recording origin set");
        }
    }

    /// Capture one message from the input device
    pub fn send(&self, message: ShortMessage, timestamp_us: i64) {
        if !self.recording.load(Ordering::Acquire) || message.is_system() {
            return;
        }

        let origin = self.origin_us.load(Ordering::Acquire);
        if origin == NO_ORIGIN {
            self.drop_message(RecorderWarning::NotArmed, &self.not_armed_logged);
            return;
        }

        let timestamp = if self.use_device_timestamps {
            timestamp_us
        } else {
            self.software_clock.micros().unwrap_or(origin)
        };
        if !self.buffer.push(timestamp.saturating_sub(origin), message) {
            self.drop_message(
                RecorderWarning::BufferFull {
                    capacity: self.buffer.capacity(),
                },
                &self.full_logged,
            );
        }
    }

    fn drop_message(&self, warning: RecorderWarning, logged: &AtomicBool) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        if !logged.swap(true, Ordering::Relaxed) {
            warn!(%warning, "MIDI input dropped");
        }
    }

    /// Number of messages dropped while recording
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Captured (microsecond offset, message) pairs
    pub fn captured(&self) -> Vec<(i64, ShortMessage)> {
        self.buffer.snapshot()
    }

    pub fn log_contents(&self) {
        let captured = self.captured();
        debug!(count = captured.len(), "MidiRecorder contents");
        for (i, (offset, message)) in captured.iter().enumerate() {
            debug!(index = i, offset_us = offset, ?message, "captured");
        }
    }

    /// Tempo map relative to the start tick, derived from the tempo factor
    /// controller events on track 0.
    fn tempo_map(&self, sequence: &Sequence, song_tempo_factor: f64) -> Result<TempoMap, RecorderError> {
        let track0 = sequence.get_track(0).ok_or(RecorderError::EmptySequence)?;
        let is_tempo = |e: &MidiEvent| e.tempo_factor().is_some();
        let bpm = |factor: f64| REF_TEMPO_BPM * song_tempo_factor * factor;

        let mut changes: Vec<TempoChange> = track0
            .events_in(self.start_tick, u64::MAX, is_tempo)
            .filter_map(|e| e.event.tempo_factor().map(|f| TempoChange::from_bpm(e.tick - self.start_tick, bpm(f))))
            .collect();
        changes.sort_by_key(|c| c.tick);

        if changes.first().is_none_or(|c| c.tick > 0) {
            let factor = track0
                .last_before(self.start_tick, is_tempo)
                .and_then(|e| e.event.tempo_factor())
                .unwrap_or(1.0);
            changes.insert(0, TempoChange::from_bpm(0, bpm(factor)));
        }
        debug!(?changes, "Recording tempo map");
        Ok(TempoMap::new(changes)?)
    }

    /// Convert the captured messages to ticks and add them to `track_index`.
    ///
    /// Does nothing if recording was never enabled. Returns the number of
    /// events added.
    pub fn fill_track(&self, sequence: &mut Sequence, track_index: usize, song_tempo_factor: f64) -> Result<usize, RecorderError> {
        if !self.recording_occurred() {
            return Ok(0);
        }
        let map = self.tempo_map(sequence, song_tempo_factor)?;
        let ppq = sequence.ppq;
        let track = sequence
            .get_track_mut(track_index)
            .ok_or(RecorderError::TrackNotFound(track_index))?;

        let mut added = 0;
        for (offset, message) in self.captured() {
            let Some(event) = MidiEvent::from_short(message) else {
                continue;
            };
            let tick = map.micros_to_ticks(offset.max(0) as u64, ppq) + self.start_tick;
            track.add(tick, event);
            added += 1;
        }
        track.normalize();
        debug!(track = track_index, added, "Recorded events added");
        Ok(added)
    }
}
