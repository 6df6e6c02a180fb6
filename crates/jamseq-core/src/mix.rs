//! Mix settings: rhythm voice to channel assignment and per-channel instrument settings

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::midi::{
    MidiEvent, CTRL_CHG_BANK_SELECT_LSB, CTRL_CHG_BANK_SELECT_MSB, CTRL_CHG_CHORUS_DEPTH,
    CTRL_CHG_PAN_MSB, CTRL_CHG_REVERB_DEPTH, CTRL_CHG_VOLUME_MSB,
};
use crate::song::{Song, VoiceKey, VoiceKind};

/// Instrument settings of one channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentMix {
    pub voice: VoiceKey,
    #[serde(default)]
    pub mute: bool,
    /// Semitones added to every note
    #[serde(default)]
    pub transposition: i8,
    /// Added to every NoteOn velocity
    #[serde(default)]
    pub velocity_shift: i8,
    #[serde(default)]
    pub program: Option<u8>,
    #[serde(default)]
    pub bank_msb: Option<u8>,
    #[serde(default)]
    pub bank_lsb: Option<u8>,
    #[serde(default = "default_volume")]
    pub volume: u8,
    #[serde(default = "default_pan")]
    pub pan: u8,
    #[serde(default)]
    pub reverb: u8,
    #[serde(default)]
    pub chorus: u8,
    /// Drums rerouted to the GM drums channel on export
    #[serde(default)]
    pub drums_rerouted: bool,
}

fn default_volume() -> u8 {
    100
}

fn default_pan() -> u8 {
    64
}

impl InstrumentMix {
    pub fn new(voice: VoiceKey) -> Self {
        Self {
            voice,
            mute: false,
            transposition: 0,
            velocity_shift: 0,
            program: None,
            bank_msb: None,
            bank_lsb: None,
            volume: default_volume(),
            pan: default_pan(),
            reverb: 0,
            chorus: 0,
            drums_rerouted: false,
        }
    }

    /// Messages initialising the channel: bank, program, volume, pan, effects
    pub fn init_messages(&self, channel: u8) -> Vec<MidiEvent> {
        let cc = |controller, value| MidiEvent::ControlChange { channel, controller, value };
        let mut messages = Vec::new();
        if let Some(msb) = self.bank_msb {
            messages.push(cc(CTRL_CHG_BANK_SELECT_MSB, msb));
        }
        if let Some(lsb) = self.bank_lsb {
            messages.push(cc(CTRL_CHG_BANK_SELECT_LSB, lsb));
        }
        if let Some(program) = self.program {
            messages.push(MidiEvent::ProgramChange { channel, program });
        }
        messages.push(cc(CTRL_CHG_VOLUME_MSB, self.volume));
        messages.push(cc(CTRL_CHG_PAN_MSB, self.pan));
        messages.push(cc(CTRL_CHG_REVERB_DEPTH, self.reverb));
        messages.push(cc(CTRL_CHG_CHORUS_DEPTH, self.chorus));
        messages
    }
}

/// Channel assignment of a song's rhythm voices. Read-only during a build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiMix {
    /// Zero-based channel -> instrument settings
    pub channels: BTreeMap<u8, InstrumentMix>,
}

impl MidiMix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign every voice of the song's rhythms a channel: drums voices prefer
    /// channel 10, others take the lowest free channel.
    pub fn for_song(song: &Song) -> Self {
        let mut mix = Self::new();
        for rhythm in song.unique_rhythms() {
            for voice in &rhythm.voices {
                let key = VoiceKey::new(&rhythm.id, voice.name.clone());
                let preferred = (voice.kind == VoiceKind::Drums)
                    .then_some(crate::midi::CHANNEL_DRUMS)
                    .filter(|ch| !mix.channels.contains_key(ch));
                let channel = preferred.or_else(|| {
                    (0u8..16)
                        .filter(|ch| *ch != crate::midi::CHANNEL_DRUMS)
                        .find(|ch| !mix.channels.contains_key(ch))
                });
                match channel {
                    Some(ch) => {
                        mix.channels.insert(ch, InstrumentMix::new(key));
                    }
                    None => tracing::warn!(voice = %key, "No free channel left for rhythm voice"),
                }
            }
        }
        mix
    }

    pub fn set(&mut self, channel: u8, mix: InstrumentMix) {
        self.channels.insert(channel, mix);
    }

    pub fn get(&self, channel: u8) -> Option<&InstrumentMix> {
        self.channels.get(&channel)
    }

    pub fn get_mut(&mut self, channel: u8) -> Option<&mut InstrumentMix> {
        self.channels.get_mut(&channel)
    }

    /// Output channel of a rhythm voice
    pub fn channel_of(&self, voice: &VoiceKey) -> Option<u8> {
        self.channels
            .iter()
            .find(|(_, m)| &m.voice == voice)
            .map(|(ch, _)| *ch)
    }

    pub fn instrument_mix(&self, voice: &VoiceKey) -> Option<&InstrumentMix> {
        self.channel_of(voice).and_then(|ch| self.get(ch))
    }

    pub fn voices(&self) -> impl Iterator<Item = &VoiceKey> {
        self.channels.values().map(|m| &m.voice)
    }

    pub fn all_muted(&self) -> bool {
        self.channels.values().all(|m| m.mute)
    }

    /// Channels whose content is rerouted to the drums channel on export
    pub fn drums_rerouted_channels(&self) -> Vec<u8> {
        self.channels
            .iter()
            .filter(|(_, m)| m.drums_rerouted)
            .map(|(ch, _)| *ch)
            .collect()
    }
}
