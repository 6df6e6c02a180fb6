//! Standard MIDI File export of a built sequence

use std::fs;
use std::path::Path;

use jamseq_core::midi::{MidiEvent, CHANNEL_DRUMS, CTRL_CHG_RESET_ALL_CONTROLLERS};
use jamseq_core::tempo::bpm_to_us_per_quarter;
use jamseq_core::{BuiltSequence, MidiMix, Sequence, Song, Track};
use midly::num::{u14, u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, PitchBend, Smf, Timing, TrackEvent, TrackEventKind};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_COPYRIGHT: &str = "jamseq MIDI export file";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Can't export to MIDI file: all channels are muted")]
    AllChannelsMuted,
    #[error("Can't export an empty song (no song parts)")]
    EmptySong,
    #[error("Failed to encode MIDI file: {0}")]
    Encode(#[source] std::io::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns a built sequence into a self-contained MIDI file sequence:
/// instrument setup, tempo data, chord markers and a one-bar lead-in.
#[derive(Debug, Clone)]
pub struct MidiFileExporter<'a> {
    song: &'a Song,
    mix: &'a MidiMix,
    copyright: String,
}

/// A sequence ready to be written as a format 1 MIDI file
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedExport {
    pub sequence: Sequence,
}

impl<'a> MidiFileExporter<'a> {
    pub fn new(song: &'a Song, mix: &'a MidiMix) -> Self {
        Self {
            song,
            mix,
            copyright: DEFAULT_COPYRIGHT.to_string(),
        }
    }

    pub fn with_copyright(mut self, copyright: impl Into<String>) -> Self {
        self.copyright = copyright.into();
        self
    }

    pub fn prepare(&self, built: BuiltSequence) -> Result<PreparedExport, ExportError> {
        let Some(first_part) = self.song.parts.first() else {
            return Err(ExportError::EmptySong);
        };
        if self.mix.all_muted() {
            warn!("Export refused, all channels are muted");
            return Err(ExportError::AllChannelsMuted);
        }

        let BuiltSequence { mut sequence, voice_tracks } = built;
        let ppq = sequence.ppq;

        // Muted voices keep an empty track so track indexes stay valid
        for ins in self.mix.channels.values().filter(|m| m.mute) {
            if let Some(track) = voice_tracks.get(&ins.voice).and_then(|&idx| sequence.get_track_mut(idx)) {
                track.clear();
            }
        }

        let rerouted = self.mix.drums_rerouted_channels();
        if !rerouted.is_empty() {
            reroute_channels(&mut sequence, &rerouted, CHANNEL_DRUMS);
        }

        self.add_chord_markers(&mut sequence);

        let first_rhythm = self.song.rhythm(&first_part.rhythm);
        let time_signature = first_rhythm.map(|r| r.time_signature).unwrap_or_default();
        let lead_in = time_signature.ticks_per_bar(ppq);
        shift_events(&mut sequence, lead_in);

        let first_factor = first_rhythm.and_then(|r| first_part.tempo_factor(r));
        let Some(track0) = sequence.get_track_mut(0) else {
            return Ok(PreparedExport { sequence });
        };
        track0.add(0, MidiEvent::Copyright(self.copyright.clone()));
        track0.add(0, self.tempo_event(first_factor));
        track0.add(
            0,
            MidiEvent::TimeSignature {
                numerator: time_signature.upper,
                denominator: time_signature.lower,
            },
        );

        let mut last_factor = first_factor;
        for part in self.song.parts.iter().skip(1) {
            let Some(factor) = self.song.rhythm(&part.rhythm).and_then(|r| part.tempo_factor(r)) else {
                continue;
            };
            if Some(factor) != last_factor {
                let tick = lead_in + (self.song.bar_position_in_beats(part.start_bar) * ppq as f64).round() as u64;
                track0.add(tick, self.tempo_event(Some(factor)));
                last_factor = Some(factor);
            }
        }

        for (voice, &idx) in &voice_tracks {
            let (Some(channel), Some(ins)) = (self.mix.channel_of(voice), self.mix.instrument_mix(voice)) else {
                continue;
            };
            let Some(track) = sequence.get_track_mut(idx) else {
                continue;
            };
            track.add(
                0,
                MidiEvent::ControlChange {
                    channel,
                    controller: CTRL_CHG_RESET_ALL_CONTROLLERS,
                    value: 0,
                },
            );
            for event in ins.init_messages(channel) {
                track.add(0, event);
            }
        }

        sequence.normalize();
        debug!(lead_in, tracks = sequence.track_count(), "Sequence prepared for MIDI file");
        Ok(PreparedExport { sequence })
    }

    /// Tempo meta event for the song tempo scaled by a percentage
    fn tempo_event(&self, factor_percent: Option<u32>) -> MidiEvent {
        let bpm = self.song.tempo as f64 * factor_percent.unwrap_or(100) as f64 / 100.0;
        MidiEvent::Tempo {
            us_per_quarter: bpm_to_us_per_quarter(bpm.round().max(1.0)).round() as u32,
        }
    }

    fn add_chord_markers(&self, sequence: &mut Sequence) {
        let ppq = sequence.ppq;
        let Some(track0) = sequence.get_track_mut(0) else {
            return;
        };
        for cs in self.song.leadsheet.sorted() {
            let tick = self.song.position_to_tick(cs.position, ppq);
            track0.add(tick, MidiEvent::Marker(cs.chord.to_string()));
        }
    }
}

/// Move channel events of `channels` to `target`
pub fn reroute_channels(sequence: &mut Sequence, channels: &[u8], target: u8) {
    for track in &mut sequence.tracks {
        for timed in &mut track.events {
            if timed.event.channel().is_some_and(|ch| channels.contains(&ch)) {
                timed.event.set_channel(target);
            }
        }
    }
}

/// Shift every event by `ticks`, except track names and a tick 0 time signature
fn shift_events(sequence: &mut Sequence, ticks: u64) {
    for track in &mut sequence.tracks {
        for timed in &mut track.events {
            let pinned = matches!(timed.event, MidiEvent::TrackName(_))
                || (timed.tick == 0 && matches!(timed.event, MidiEvent::TimeSignature { .. }));
            if !pinned {
                timed.tick += ticks;
            }
        }
    }
}

fn midi(channel: u8, message: MidiMessage) -> TrackEventKind<'static> {
    TrackEventKind::Midi {
        channel: u4::from(channel),
        message,
    }
}

/// midly event for a sequence event, `None` for end-of-track markers
fn event_kind(event: &MidiEvent) -> Option<TrackEventKind<'_>> {
    let kind = match *event {
        MidiEvent::NoteOn { channel, pitch, velocity } => midi(
            channel,
            MidiMessage::NoteOn {
                key: u7::from(pitch),
                vel: u7::from(velocity),
            },
        ),
        MidiEvent::NoteOff { channel, pitch, velocity } => midi(
            channel,
            MidiMessage::NoteOff {
                key: u7::from(pitch),
                vel: u7::from(velocity),
            },
        ),
        MidiEvent::ControlChange { channel, controller, value } => midi(
            channel,
            MidiMessage::Controller {
                controller: u7::from(controller),
                value: u7::from(value),
            },
        ),
        MidiEvent::ProgramChange { channel, program } => midi(
            channel,
            MidiMessage::ProgramChange {
                program: u7::from(program),
            },
        ),
        MidiEvent::PitchBend { channel, value } => midi(
            channel,
            MidiMessage::PitchBend {
                bend: PitchBend(u14::from(value.min(0x3FFF))),
            },
        ),
        MidiEvent::PolyPressure { channel, pitch, pressure } => midi(
            channel,
            MidiMessage::Aftertouch {
                key: u7::from(pitch),
                vel: u7::from(pressure),
            },
        ),
        MidiEvent::ChannelPressure { channel, pressure } => midi(
            channel,
            MidiMessage::ChannelAftertouch {
                vel: u7::from(pressure),
            },
        ),
        MidiEvent::TrackName(ref name) => TrackEventKind::Meta(MetaMessage::TrackName(name.as_bytes())),
        MidiEvent::Marker(ref text) => TrackEventKind::Meta(MetaMessage::Marker(text.as_bytes())),
        MidiEvent::Copyright(ref text) => TrackEventKind::Meta(MetaMessage::Copyright(text.as_bytes())),
        MidiEvent::Tempo { us_per_quarter } => {
            TrackEventKind::Meta(MetaMessage::Tempo(u24::from(us_per_quarter.min(0xFF_FFFF))))
        }
        MidiEvent::TimeSignature { numerator, denominator } => TrackEventKind::Meta(MetaMessage::TimeSignature(
            numerator,
            denominator.max(1).trailing_zeros() as u8,
            24,
            8,
        )),
        MidiEvent::EndOfTrack => return None,
    };
    Some(kind)
}

/// Delta-timed midly track, terminated by a single end-of-track event
fn midly_track(track: &Track) -> Vec<TrackEvent<'_>> {
    let mut events = Vec::with_capacity(track.len() + 1);
    let mut previous_tick = 0u64;
    let mut end_tick = 0u64;
    for timed in track.iter() {
        end_tick = end_tick.max(timed.tick);
        let Some(kind) = event_kind(&timed.event) else {
            continue;
        };
        let delta = timed.tick.saturating_sub(previous_tick).min(0x0FFF_FFFF) as u32;
        events.push(TrackEvent {
            delta: u28::from(delta),
            kind,
        });
        previous_tick = previous_tick.max(timed.tick);
    }
    events.push(TrackEvent {
        delta: u28::from(end_tick.saturating_sub(previous_tick).min(0x0FFF_FFFF) as u32),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    events
}

impl PreparedExport {
    /// Encode as a format 1 Standard MIDI File
    pub fn encode(&self) -> Result<Vec<u8>, ExportError> {
        encode(&self.sequence)
    }

    pub fn write(&self, path: &Path) -> Result<(), ExportError> {
        let bytes = self.encode()?;
        fs::write(path, &bytes)?;
        info!(path = %path.display(), bytes = bytes.len(), "MIDI file written");
        Ok(())
    }
}

/// Encode any sequence as a format 1 Standard MIDI File
pub fn encode(sequence: &Sequence) -> Result<Vec<u8>, ExportError> {
    let ppq = u16::try_from(sequence.ppq).unwrap_or(u16::MAX).min(0x7FFF);
    let header = Header {
        format: Format::Parallel,
        timing: Timing::Metrical(u15::from(ppq)),
    };
    let tracks = sequence.tracks.iter().map(midly_track).collect();

    let mut bytes = Vec::new();
    Smf { header, tracks }
        .write_std(&mut bytes)
        .map_err(ExportError::Encode)?;
    Ok(bytes)
}
