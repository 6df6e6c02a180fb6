//! Post-processing passes applied to a freshly generated sequence

use tracing::{debug, warn};

use crate::midi::MidiEvent;
use crate::mix::MidiMix;
use crate::sequence::Sequence;
use crate::song::{Song, VoiceKey};
use crate::track::Track;

/// Tick one past the end of the arrangement, shared by every voice track
pub fn end_of_track_tick(song: &Song, ppq: u32) -> u64 {
    (song.size_in_beats() * ppq as f64).round() as u64 + 1
}

/// Place the end-of-track marker of each listed track at the song end
pub fn fix_end_of_tracks(sequence: &mut Sequence, song: &Song, tracks: impl IntoIterator<Item = usize>) {
    let last_tick = end_of_track_tick(song, sequence.ppq);
    for index in tracks {
        let Some(track) = sequence.get_track_mut(index) else {
            continue;
        };
        if !track.set_end_of_track(last_tick) {
            warn!(track = index, last_tick, "Events found beyond the end of the song");
        }
    }
}

/// A song part tick range with the channels muted over it
#[derive(Debug, Clone, PartialEq, Eq)]
struct MutedRange {
    from: u64,
    to: u64,
    channels: Vec<u8>,
}

fn muted_ranges(song: &Song, mix: &MidiMix, ppq: u32) -> Vec<MutedRange> {
    song.parts
        .iter()
        .filter_map(|part| {
            let rhythm = song.rhythm(&part.rhythm)?;
            let muted = part.muted_voices(rhythm);
            if muted.is_empty() {
                return None;
            }
            let channels: Vec<u8> = muted
                .into_iter()
                .filter_map(|name| mix.channel_of(&VoiceKey::new(&rhythm.id, name)))
                .collect();
            if channels.is_empty() {
                return None;
            }
            let (from, to) = song.part_tick_range(part, ppq);
            Some(MutedRange { from, to, channels })
        })
        .collect()
}

/// Remove NoteOn/NoteOff events of voices muted on a song part.
///
/// Each track is walked once with a cursor advancing over the muted song
/// parts. Returns the number of removed events.
pub fn mute_notes(sequence: &mut Sequence, song: &Song, mix: &MidiMix) -> usize {
    let ranges = muted_ranges(song, mix, sequence.ppq);
    if ranges.is_empty() {
        return 0;
    }

    let mut removed = 0;
    for track in &mut sequence.tracks {
        if !track.events.is_sorted_by_key(|e| e.tick) {
            track.normalize();
        }
        let mut cursor = 0;
        removed += track.remove_where(|e| {
            while cursor < ranges.len() && e.tick > ranges[cursor].to {
                cursor += 1;
            }
            let Some(range) = ranges.get(cursor) else {
                return false;
            };
            e.tick >= range.from
                && e.event.is_note()
                && e.event.channel().is_some_and(|ch| range.channels.contains(&ch))
        });
    }
    debug!(removed, parts = ranges.len(), "Muted notes removed");
    removed
}

/// Apply the channel's transposition and velocity shift to the notes of one track
fn update_track_notes(track: &mut Track, mix: &MidiMix) -> bool {
    let Some(channel) = track.note_channel() else {
        return false;
    };
    let Some(ins) = mix.get(channel) else {
        return false;
    };
    let (transposition, velocity_shift) = (ins.transposition as i16, ins.velocity_shift as i16);
    if transposition == 0 && velocity_shift == 0 {
        return false;
    }

    let shift_pitch = |pitch: &mut u8| *pitch = (*pitch as i16 + transposition).clamp(0, 127) as u8;
    for timed in &mut track.events {
        match &mut timed.event {
            MidiEvent::NoteOn { pitch, velocity, .. } => {
                shift_pitch(pitch);
                *velocity = (*velocity as i16 + velocity_shift).clamp(0, 127) as u8;
            }
            MidiEvent::NoteOff { pitch, velocity, .. } => {
                shift_pitch(pitch);
                *velocity = 0;
            }
            _ => {}
        }
    }
    true
}

/// Velocity/transpose pass over every track of the sequence
pub fn update_notes(sequence: &mut Sequence, mix: &MidiMix) {
    let updated = sequence
        .tracks
        .iter_mut()
        .map(|track| update_track_notes(track, mix))
        .filter(|updated| *updated)
        .count();
    debug!(updated, "Transposition and velocity shift applied");
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::midi::TimedEvent;
    use crate::mix::InstrumentMix;
    use crate::song::{Rhythm, RhythmVoice, RpValue, VoiceKind, RP_MUTE};

    fn note_on(channel: u8, pitch: u8, velocity: u8) -> MidiEvent {
        MidiEvent::NoteOn { channel, pitch, velocity }
    }

    fn note_off(channel: u8, pitch: u8) -> MidiEvent {
        MidiEvent::NoteOff { channel, pitch, velocity: 64 }
    }

    /// 12 bars of 4/4 with bars [4, 8) muting the Guitar voice on channel 3
    fn muted_song() -> (Song, MidiMix) {
        let rhythm = Rhythm::new(
            "funk",
            "Funk",
            vec![RhythmVoice::new("Bass", VoiceKind::Bass), RhythmVoice::new("Guitar", VoiceKind::Guitar)],
        );
        let id = rhythm.id.clone();
        let mut song = Song::new("Mute", 120);
        song.add_rhythm(rhythm);
        song.add_part(&id, 4);
        song.add_part(&id, 4).values.insert(
            RP_MUTE.to_string(),
            RpValue::Set(BTreeSet::from(["Guitar".to_string()])),
        );
        song.add_part(&id, 4);

        let mut mix = MidiMix::new();
        mix.set(2, InstrumentMix::new(VoiceKey::new(&id, "Bass")));
        mix.set(3, InstrumentMix::new(VoiceKey::new(&id, "Guitar")));
        (song, mix)
    }

    #[test]
    fn test_mute_removes_notes_only_in_muted_part() {
        let (song, mix) = muted_song();
        let mut sequence = Sequence::default();
        let mut guitar = Track::named("Funk-Guitar");
        // bar 4 starts at 7680, bar 8 at 15360
        guitar.add(7000, note_on(3, 60, 100));
        guitar.add(7679, note_off(3, 60));
        guitar.add(7680, note_on(3, 62, 100));
        guitar.add(15359, note_off(3, 62));
        guitar.add(15360, note_on(3, 64, 100));
        guitar.add(9000, MidiEvent::PitchBend { channel: 3, value: 0 });
        let mut bass = Track::named("Funk-Bass");
        bass.add(8000, note_on(2, 40, 100));
        bass.add(8100, note_off(2, 40));
        sequence.add_track(Track::named("Mute (jamseq song)"));
        let guitar_idx = sequence.add_track(guitar);
        let bass_idx = sequence.add_track(bass);

        assert_eq!(mute_notes(&mut sequence, &song, &mix), 2);

        let guitar_ticks: Vec<u64> = sequence.tracks[guitar_idx].iter().map(|e| e.tick).collect();
        assert_eq!(guitar_ticks, vec![0, 7000, 7679, 9000, 15360]);
        assert_eq!(sequence.tracks[bass_idx].len(), 3);
    }

    #[test]
    fn test_mute_cursor_crosses_several_muted_parts() {
        let (mut song, mix) = muted_song();
        let id = song.rhythms[0].id.clone();
        // bars [12, 14) unmuted, bars [14, 16) mute the Bass on channel 2
        song.add_part(&id, 2);
        song.add_part(&id, 2).values.insert(
            RP_MUTE.to_string(),
            RpValue::Set(BTreeSet::from(["Bass".to_string()])),
        );

        // Ranges: guitar muted [7680, 15359], bass muted [26880, 30719]
        let notes = [8000, 24000, 27000, 31000];
        let mut guitar = Track::named("Funk-Guitar");
        let mut bass = Track::named("Funk-Bass");
        for &tick in notes.iter().rev() {
            guitar.add(tick + 100, note_off(3, 60));
            guitar.add(tick, note_on(3, 60, 100));
            bass.add(tick + 100, note_off(2, 40));
            bass.add(tick, note_on(2, 40, 100));
        }
        let mut sequence = Sequence::default();
        let guitar_idx = sequence.add_track(guitar);
        let bass_idx = sequence.add_track(bass);

        assert_eq!(mute_notes(&mut sequence, &song, &mix), 4);

        let note_ticks = |idx: usize| -> Vec<u64> {
            sequence.tracks[idx]
                .iter()
                .filter(|e| e.event.is_note_on())
                .map(|e| e.tick)
                .collect()
        };
        assert_eq!(note_ticks(guitar_idx), vec![24000, 27000, 31000]);
        assert_eq!(note_ticks(bass_idx), vec![8000, 24000, 31000]);
        assert!(sequence.tracks[guitar_idx].events.is_sorted_by_key(|e| e.tick));
    }

    #[test]
    fn test_update_notes_clamps_pitch_and_velocity() {
        let (_, mut mix) = muted_song();
        if let Some(ins) = mix.get_mut(2) {
            ins.transposition = 10;
            ins.velocity_shift = 40;
        }
        let mut sequence = Sequence::default();
        let mut bass = Track::named("Funk-Bass");
        bass.add(0, note_on(2, 125, 100));
        bass.add(240, note_off(2, 125));
        bass.add(480, note_on(2, 3, 20));
        sequence.add_track(bass);

        update_notes(&mut sequence, &mix);

        let events: Vec<&MidiEvent> = sequence.tracks[0].iter().map(|e| &e.event).collect();
        assert_eq!(events[1], &note_on(2, 127, 127));
        assert_eq!(events[2], &MidiEvent::NoteOff { channel: 2, pitch: 127, velocity: 0 });
        assert_eq!(events[3], &note_on(2, 13, 60));
    }

    #[test]
    fn test_update_notes_zero_shift_leaves_track_unchanged() {
        let (_, mix) = muted_song();
        let mut sequence = Sequence::default();
        let mut guitar = Track::named("Funk-Guitar");
        guitar.add(0, note_on(3, 60, 90));
        guitar.add(120, note_off(3, 60));
        sequence.add_track(guitar);
        let before = sequence.clone();

        update_notes(&mut sequence, &mix);
        assert_eq!(sequence, before);
    }

    #[test]
    fn test_fix_end_of_tracks() {
        let (song, _) = muted_song();
        let mut sequence = Sequence::default();
        sequence.add_track(Track::named("admin"));
        let mut piano = Track::named("Funk-Bass");
        piano.add(100, note_on(2, 40, 90));
        let idx = sequence.add_track(piano);

        fix_end_of_tracks(&mut sequence, &song, [idx]);

        assert_eq!(end_of_track_tick(&song, 480), 12 * 1920 + 1);
        assert_eq!(
            sequence.tracks[idx].events.last(),
            Some(&TimedEvent::new(23041, MidiEvent::EndOfTrack))
        );
        assert_eq!(sequence.tracks[0].len(), 1);
    }
}
