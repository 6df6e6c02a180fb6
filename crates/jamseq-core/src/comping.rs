//! Built-in deterministic comping engine.
//!
//! Plays the lead sheet chords on a beat pulse: bass roots, keyboard drop-2
//! voicings on the off-beats, guitar strums, sustained pads, and a kick/snare
//! backbeat with a euclidean hi-hat line for drums voices.

use crate::chord::Chord;
use crate::error::GeneratorError;
use crate::generator::{GenerationContext, MusicGenerator, VoiceTracks};
use crate::leadsheet::Position;
use crate::song::{Rhythm, SongPart, VoiceKey, VoiceKind};

/// Rhythm parameter id selecting the drums variation ("A" or "B")
pub const RP_VARIATION: &str = "variation";

const KICK: u8 = 36;
const SNARE: u8 = 38;
const CLOSED_HAT: u8 = 42;

/// Hits spread as evenly as possible over `steps` (Bresenham form of Bjorklund)
pub fn euclidean_rhythm(steps: usize, hits: usize) -> Vec<bool> {
    let hits = hits.min(steps);
    (0..steps).map(|i| (i * hits) % steps < hits).collect()
}

/// Deterministic comping generator usable with any rhythm
#[derive(Debug, Clone, Copy)]
pub struct CompingGenerator {
    pub velocity: u8,
}

impl Default for CompingGenerator {
    fn default() -> Self {
        Self { velocity: 90 }
    }
}

/// One beat of a song part
struct Beat {
    tick: u64,
    length: u64,
    index: u32,
    chord: Chord,
}

impl CompingGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn beats(&self, rhythm: &Rhythm, part: &SongPart, start_tick: u64, context: &GenerationContext<'_>) -> Vec<Beat> {
        let ts = rhythm.time_signature;
        let bar_ticks = ts.ticks_per_bar(context.ppq);
        let beats_per_bar = ts.upper.max(1) as u32;
        let beat_ticks = bar_ticks / beats_per_bar as u64;
        let beat_quarters = ts.natural_beats() / beats_per_bar as f64;

        let mut beats = Vec::with_capacity((part.nb_bars * beats_per_bar) as usize);
        for bar_offset in 0..part.nb_bars {
            let bar = part.start_bar + bar_offset;
            for index in 0..beats_per_bar {
                let position = Position::new(bar, (index as f64 * beat_quarters) as f32);
                let Some(cs) = context.song.leadsheet.chord_at(position) else {
                    continue;
                };
                beats.push(Beat {
                    tick: start_tick + bar_offset as u64 * bar_ticks + index as u64 * beat_ticks,
                    length: beat_ticks,
                    index,
                    chord: cs.chord,
                });
            }
        }
        beats
    }

    fn play_part(
        &self,
        kind: VoiceKind,
        voice: &VoiceKey,
        channel: u8,
        part: &SongPart,
        beats: &[Beat],
        tracks: &mut VoiceTracks,
    ) {
        let vel = self.velocity;
        match kind {
            VoiceKind::Bass => {
                for beat in beats {
                    tracks.add_note(voice, channel, beat.chord.bass_note(36), vel, beat.tick, beat.length * 9 / 10);
                }
            }
            VoiceKind::Keyboard => {
                for beat in beats.iter().filter(|b| b.index % 2 == 1) {
                    for pitch in beat.chord.drop2(60) {
                        tracks.add_note(voice, channel, pitch, vel.saturating_sub(10), beat.tick, beat.length / 2);
                    }
                }
            }
            VoiceKind::Guitar => {
                for beat in beats {
                    let accent = if beat.index % 2 == 1 { 0 } else { 15 };
                    for pitch in beat.chord.voicing(52) {
                        tracks.add_note(voice, channel, pitch, vel.saturating_sub(accent), beat.tick, beat.length / 3);
                    }
                }
            }
            VoiceKind::Pad => {
                // One sustained chord per chord change
                let mut current: Option<(&Beat, u64)> = None;
                for beat in beats {
                    match current {
                        Some((start, _)) if start.chord == beat.chord && beat.index != 0 => {
                            current = Some((start, beat.tick + beat.length));
                        }
                        _ => {
                            if let Some((start, end)) = current {
                                self.sustain(voice, channel, start, end, tracks);
                            }
                            current = Some((beat, beat.tick + beat.length));
                        }
                    }
                }
                if let Some((start, end)) = current {
                    self.sustain(voice, channel, start, end, tracks);
                }
            }
            VoiceKind::Drums => {
                let hits = if part.state(RP_VARIATION) == Some("B") { 5 } else { 4 };
                let hats = euclidean_rhythm(8, hits);
                for beat in beats {
                    let backbeat = beat.index % 2 == 1;
                    let drum = if backbeat { SNARE } else { KICK };
                    tracks.add_note(voice, channel, drum, vel, beat.tick, beat.length / 4);
                    for (half, _) in hats
                        .iter()
                        .enumerate()
                        .skip((beat.index as usize * 2) % hats.len())
                        .take(2)
                        .filter(|(_, hit)| **hit)
                    {
                        let tick = beat.tick + (half as u64 % 2) * beat.length / 2;
                        tracks.add_note(voice, channel, CLOSED_HAT, vel.saturating_sub(25), tick, beat.length / 4);
                    }
                }
            }
        }
    }

    fn sustain(&self, voice: &VoiceKey, channel: u8, start: &Beat, end: u64, tracks: &mut VoiceTracks) {
        let duration = end.saturating_sub(start.tick).saturating_sub(1);
        for pitch in start.chord.voicing(60) {
            tracks.add_note(voice, channel, pitch, self.velocity.saturating_sub(30), start.tick, duration);
        }
    }
}

impl MusicGenerator for CompingGenerator {
    fn name(&self) -> &str {
        "comping"
    }

    fn generate(&self, rhythm: &Rhythm, context: &GenerationContext<'_>, tracks: &mut VoiceTracks) -> Result<(), GeneratorError> {
        let voices: Vec<(VoiceKey, VoiceKind, u8)> = rhythm
            .voices
            .iter()
            .map(|v| {
                let key = VoiceKey::new(&rhythm.id, v.name.clone());
                let channel = context
                    .mix
                    .channel_of(&key)
                    .ok_or_else(|| GeneratorError::new(format!("no channel assigned to voice {key}")))?;
                Ok::<_, GeneratorError>((key, v.kind, channel))
            })
            .collect::<Result<_, GeneratorError>>()?;

        for (part, (start_tick, _)) in context.parts_for(&rhythm.id) {
            let beats = self.beats(rhythm, part, start_tick, context);
            for (key, kind, channel) in &voices {
                self.play_part(*kind, key, *channel, part, &beats, tracks);
            }
        }
        tracing::debug!(rhythm = %rhythm.id, voices = voices.len(), "Comping generated");
        Ok(())
    }
}
