//! End-to-end sequence assembly over a two-rhythm arrangement

use std::collections::BTreeSet;

use jamseq_core::song::RP_MUTE;
use jamseq_core::{
    CompingGenerator, GenerationContext, GenerationError, GeneratorError, GeneratorRegistry, MidiEvent, MidiMix,
    MusicGenerator, Position, Rhythm, RhythmVoice, RpValue, SequenceBuilder, Song, TimeSignature, VoiceKey,
    VoiceKind, VoiceTracks,
};

/// 4 bars of swing (4/4), 2 bars of waltz (3/4), 2 bars of swing with the
/// piano muted.
fn arrangement() -> Song {
    let swing = Rhythm::new(
        "swing",
        "Swing",
        vec![
            RhythmVoice::new("Drums", VoiceKind::Drums),
            RhythmVoice::new("Bass", VoiceKind::Bass),
            RhythmVoice::new("Piano", VoiceKind::Keyboard),
        ],
    );
    let mut waltz = Rhythm::new(
        "waltz",
        "Jazz Waltz",
        vec![RhythmVoice::new("Bass", VoiceKind::Bass), RhythmVoice::new("Guitar", VoiceKind::Guitar)],
    );
    waltz.time_signature = TimeSignature::new(3, 4);
    let (swing_id, waltz_id) = (swing.id.clone(), waltz.id.clone());

    let mut song = Song::new("Blue Bossa", 160);
    song.add_rhythm(swing);
    song.add_rhythm(waltz);
    song.add_part(&swing_id, 4);
    song.add_part(&waltz_id, 2);
    song.add_part(&swing_id, 2)
        .values
        .insert(RP_MUTE.to_string(), RpValue::Set(BTreeSet::from(["Piano".to_string()])));

    for (chord, bar) in [("Cm7", 0), ("Fm7", 2), ("Dm7b5", 4), ("G7", 5), ("Cm7", 6)] {
        song.leadsheet.add(chord.parse().unwrap(), Position::new(bar, 0.0));
    }
    song
}

fn comping_registry() -> GeneratorRegistry {
    GeneratorRegistry::new().with_fallback(Box::new(CompingGenerator::new()))
}

#[test]
fn test_builds_one_track_per_voice_in_first_use_order() {
    let song = arrangement();
    let mix = MidiMix::for_song(&song);
    let registry = comping_registry();

    let built = SequenceBuilder::new(GenerationContext::new(&song, &mix), &registry)
        .build()
        .unwrap();

    let names: Vec<&str> = built.sequence.tracks.iter().filter_map(|t| t.name()).collect();
    assert_eq!(
        names,
        vec![
            "Blue Bossa (jamseq song)",
            "Swing-Drums",
            "Swing-Bass",
            "Swing-Piano",
            "Jazz Waltz-Bass",
            "Jazz Waltz-Guitar",
        ]
    );
    assert_eq!(built.voice_tracks.len(), 5);

    // 4*4 + 2*3 + 2*4 beats
    let end = 30 * 480 + 1;
    for &index in built.voice_tracks.values() {
        let track = &built.sequence.tracks[index];
        assert_eq!(track.events.last().map(|e| (&e.event, e.tick)), Some((&MidiEvent::EndOfTrack, end)));
    }
}

#[test]
fn test_mute_and_transposition_are_applied() {
    let song = arrangement();
    let mut mix = MidiMix::for_song(&song);
    let bass = VoiceKey::new(&song.rhythms[0].id, "Bass");
    let bass_channel = mix.channel_of(&bass).unwrap();
    if let Some(ins) = mix.get_mut(bass_channel) {
        ins.transposition = -12;
    }
    let registry = comping_registry();

    let built = SequenceBuilder::new(GenerationContext::new(&song, &mix), &registry)
        .build()
        .unwrap();

    // Piano is muted over the last part, ticks [10560, 14399]
    let piano = &built.sequence.tracks[built.track_of(&VoiceKey::new(&song.rhythms[0].id, "Piano")).unwrap()];
    assert!(piano.iter().any(|e| e.event.is_note() && e.tick < 7680));
    assert!(!piano.iter().any(|e| e.event.is_note() && e.tick >= 10560));

    // Cm7 root at octave 36 minus an octave
    let bass_track = &built.sequence.tracks[built.track_of(&bass).unwrap()];
    let first_pitch = bass_track.iter().find_map(|e| match e.event {
        MidiEvent::NoteOn { pitch, .. } => Some(pitch),
        _ => None,
    });
    assert_eq!(first_pitch, Some(24));
}

#[test]
fn test_failed_build_returns_no_sequence() {
    let mut song = arrangement();
    song.leadsheet.chords.retain(|cs| cs.position.bar != 0);
    let mix = MidiMix::for_song(&song);
    let registry = comping_registry();

    let result = SequenceBuilder::new(GenerationContext::new(&song, &mix), &registry).build();
    assert_eq!(result, Err(GenerationError::MissingStartChord));
}

/// Comping plus one stray note written into another rhythm's bars
struct Trespasser {
    tick: u64,
}

impl MusicGenerator for Trespasser {
    fn name(&self) -> &str {
        "trespasser"
    }

    fn generate(&self, rhythm: &Rhythm, context: &GenerationContext<'_>, tracks: &mut VoiceTracks) -> Result<(), GeneratorError> {
        CompingGenerator::new().generate(rhythm, context, tracks)?;
        let key = VoiceKey::new(&rhythm.id, "Bass");
        let channel = context.mix.channel_of(&key).unwrap_or(0);
        tracks.add_note(&key, channel, 40, 80, self.tick, 100);
        Ok(())
    }
}

#[test]
fn test_note_in_foreign_rhythm_range_is_a_slice_violation() {
    let song = arrangement();
    let mix = MidiMix::for_song(&song);
    let mut registry = comping_registry();
    // tick 8000 lies in the waltz part (bars 4-5)
    registry.register(song.rhythms[0].id.clone(), Box::new(Trespasser { tick: 8000 }));

    let result = SequenceBuilder::new(GenerationContext::new(&song, &mix), &registry).build();
    match result {
        Err(GenerationError::RhythmSliceViolation { rhythm, tick, bar, expected, .. }) => {
            assert_eq!(rhythm, "Swing");
            assert_eq!(tick, 8000);
            assert_eq!(bar, 4);
            assert_eq!(expected, "Jazz Waltz");
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn test_single_rhythm_skips_slice_check() {
    let mut song = arrangement();
    let swing_id = song.rhythms[0].id.clone();
    for part in &mut song.parts {
        part.rhythm = swing_id.clone();
    }
    let mix = MidiMix::for_song(&song);
    let mut registry = comping_registry();
    registry.register(swing_id, Box::new(Trespasser { tick: 20_000 }));

    assert!(SequenceBuilder::new(GenerationContext::new(&song, &mix), &registry).build().is_ok());
}
