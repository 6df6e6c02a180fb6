//! Consistency checks run before generation and on the assembled sequence

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use tracing::warn;

use crate::error::{GenerationError, Result};
use crate::leadsheet::Position;
use crate::midi::MidiEvent;
use crate::sequence::Sequence;
use crate::song::{RhythmId, Song, VoiceKey};

/// The lead sheet must start with a chord on bar 0 beat 0
pub fn check_start_chord(song: &Song) -> Result<()> {
    let start = Position::new(0, 0.0);
    match song.leadsheet.items_in_bars(0, 0).first() {
        Some(cs) if cs.position == start => Ok(()),
        _ => Err(GenerationError::MissingStartChord),
    }
}

/// No two chord symbols may share a position
pub fn check_chords_at_same_position(song: &Song) -> Result<()> {
    match song.leadsheet.find_duplicate_position() {
        Some((first, second)) => Err(GenerationError::DuplicateChordPosition {
            first: first.chord.to_string(),
            second: second.chord.to_string(),
            position: second.position,
        }),
        None => Ok(()),
    }
}

/// Inclusive tick intervals
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickRanges {
    ranges: Vec<(u64, u64)>,
}

impl TickRanges {
    pub fn add_range(&mut self, from: u64, to: u64) {
        debug_assert!(from <= to, "from={from} to={to}");
        self.ranges.push((from, to));
    }

    pub fn contains(&self, tick: u64) -> bool {
        self.ranges.iter().any(|&(from, to)| tick >= from && tick <= to)
    }
}

impl fmt::Display for TickRanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (from, to) in &self.ranges {
            write!(f, "[{from},{to}]")?;
        }
        Ok(())
    }
}

/// Tick ranges covered by each rhythm of the song
pub fn rhythm_tick_ranges(song: &Song, ppq: u32) -> HashMap<RhythmId, TickRanges> {
    let mut map: HashMap<RhythmId, TickRanges> = HashMap::new();
    for part in &song.parts {
        let (from, to) = song.part_tick_range(part, ppq);
        map.entry(part.rhythm.clone()).or_default().add_range(from, to);
    }
    map
}

/// With more than one rhythm, each voice track may only hold NoteOn events
/// within the song parts of its own rhythm.
pub fn check_rhythm_slices(sequence: &Sequence, song: &Song, voice_tracks: &BTreeMap<VoiceKey, usize>) -> Result<()> {
    let ranges = rhythm_tick_ranges(song, sequence.ppq);
    if ranges.len() <= 1 {
        return Ok(());
    }

    let rhythm_name = |id: &RhythmId| {
        song.rhythm(id)
            .map(|r| r.name.clone())
            .unwrap_or_else(|| id.to_string())
    };

    for (voice, &track_index) in voice_tracks {
        let (Some(track), Some(tick_ranges)) = (sequence.get_track(track_index), ranges.get(&voice.rhythm)) else {
            continue;
        };
        let Some(bad) = track
            .iter()
            .find(|e| e.event.is_note_on() && !tick_ranges.contains(e.tick))
        else {
            continue;
        };

        let position = song.tick_to_position(bad.tick, sequence.ppq);
        let expected = song
            .part_at_bar(position.bar)
            .map(|(_, part)| rhythm_name(&part.rhythm))
            .unwrap_or_default();
        warn!(
            event = %bad,
            %position,
            track = track_index,
            %voice,
            ranges = %tick_ranges,
            expected = %expected,
            "Unexpected NoteOn outside of the rhythm's song parts"
        );
        return Err(GenerationError::RhythmSliceViolation {
            rhythm: rhythm_name(&voice.rhythm),
            track: track_index,
            tick: bad.tick,
            bar: position.bar,
            expected,
        });
    }
    Ok(())
}

/// Generated tracks may only hold track names, end-of-track markers, notes and
/// pitch bends, with all channel events on a single channel.
pub fn check_event_vocabulary(sequence: &Sequence) -> Result<()> {
    for (track_index, track) in sequence.tracks.iter().enumerate() {
        let mut track_channel: Option<u8> = None;
        for timed in track.iter() {
            match &timed.event {
                MidiEvent::TrackName(_) | MidiEvent::EndOfTrack => {}
                MidiEvent::NoteOn { channel, .. }
                | MidiEvent::NoteOff { channel, .. }
                | MidiEvent::PitchBend { channel, .. } => match track_channel {
                    None => track_channel = Some(*channel),
                    Some(expected) if expected != *channel => {
                        warn!(track = track_index, event = %timed, expected, "Invalid channel in generated track");
                        return Err(GenerationError::ChannelMismatch {
                            track: track_index,
                            expected,
                            actual: *channel,
                        });
                    }
                    Some(_) => {}
                },
                _ => {
                    warn!(track = track_index, event = %timed, "Unauthorized event in generated track");
                    return Err(GenerationError::InvalidEventVocabulary {
                        track: track_index,
                        event: timed.to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::{Rhythm, RhythmVoice, VoiceKind};
    use crate::track::Track;

    fn chord(s: &str) -> crate::chord::Chord {
        s.parse().unwrap()
    }

    #[test]
    fn test_start_chord() {
        let mut song = Song::new("Start", 120);
        assert_eq!(check_start_chord(&song), Err(GenerationError::MissingStartChord));

        song.leadsheet.add(chord("C"), Position::new(0, 1.0));
        assert_eq!(check_start_chord(&song), Err(GenerationError::MissingStartChord));

        song.leadsheet.add(chord("F"), Position::new(0, 0.0));
        assert_eq!(check_start_chord(&song), Ok(()));
    }

    #[test]
    fn test_chords_at_same_position() {
        let mut song = Song::new("Dup", 120);
        song.leadsheet.add(chord("C"), Position::new(0, 0.0));
        song.leadsheet.add(chord("A7"), Position::new(1, 2.0));
        assert!(check_chords_at_same_position(&song).is_ok());

        song.leadsheet.add(chord("Eb7"), Position::new(1, 2.0));
        match check_chords_at_same_position(&song) {
            Err(GenerationError::DuplicateChordPosition { first, second, position }) => {
                assert_eq!(first, "A7");
                assert_eq!(second, "Eb7");
                assert_eq!(position, Position::new(1, 2.0));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_rhythm_slices_detect_foreign_note() {
        let swing = Rhythm::new("swing", "Swing", vec![RhythmVoice::new("Bass", VoiceKind::Bass)]);
        let bossa = Rhythm::new("bossa", "Bossa", vec![RhythmVoice::new("Guitar", VoiceKind::Guitar)]);
        let (swing_id, bossa_id) = (swing.id.clone(), bossa.id.clone());
        let mut song = Song::new("Slices", 120);
        song.add_rhythm(swing);
        song.add_rhythm(bossa);
        song.add_part(&swing_id, 2);
        song.add_part(&bossa_id, 2);

        let mut sequence = Sequence::default();
        sequence.add_track(Track::named("admin"));
        let mut bass = Track::named("Swing-Bass");
        bass.add(0, MidiEvent::NoteOn { channel: 0, pitch: 36, velocity: 90 });
        let bass_idx = sequence.add_track(bass);
        let voice_tracks = BTreeMap::from([(VoiceKey::new(&swing_id, "Bass"), bass_idx)]);
        assert!(check_rhythm_slices(&sequence, &song, &voice_tracks).is_ok());

        // bar 3 belongs to the bossa part
        sequence.tracks[bass_idx].add(3 * 1920, MidiEvent::NoteOn { channel: 0, pitch: 36, velocity: 90 });
        assert_eq!(
            check_rhythm_slices(&sequence, &song, &voice_tracks),
            Err(GenerationError::RhythmSliceViolation {
                rhythm: "Swing".to_string(),
                track: bass_idx,
                tick: 5760,
                bar: 3,
                expected: "Bossa".to_string(),
            })
        );
    }

    #[test]
    fn test_event_vocabulary() {
        let mut sequence = Sequence::default();
        let mut track = Track::named("Swing-Bass");
        track.add(0, MidiEvent::NoteOn { channel: 1, pitch: 36, velocity: 90 });
        track.add(10, MidiEvent::PitchBend { channel: 1, value: 8192 });
        track.add(20, MidiEvent::EndOfTrack);
        sequence.add_track(track);
        assert!(check_event_vocabulary(&sequence).is_ok());

        sequence.tracks[0].add(5, MidiEvent::NoteOff { channel: 2, pitch: 36, velocity: 0 });
        assert_eq!(
            check_event_vocabulary(&sequence),
            Err(GenerationError::ChannelMismatch { track: 0, expected: 1, actual: 2 })
        );

        let mut other = Track::named("Swing-Piano");
        other.add(0, MidiEvent::ControlChange { channel: 0, controller: 7, value: 100 });
        sequence.tracks[0] = other;
        assert!(matches!(
            check_event_vocabulary(&sequence),
            Err(GenerationError::InvalidEventVocabulary { track: 0, .. })
        ));
    }
}
