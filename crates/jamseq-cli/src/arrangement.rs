//! TOML arrangement files: a song plus optional per-voice mix settings

use std::path::Path;

use anyhow::{bail, Context};
use jamseq_core::{MidiMix, RhythmId, Song, VoiceKey};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Arrangement {
    pub song: Song,
    #[serde(default)]
    pub mix: Vec<VoiceSettings>,
}

/// Overrides applied on top of the default channel assignment
#[derive(Debug, Deserialize)]
pub struct VoiceSettings {
    pub rhythm: RhythmId,
    pub voice: String,
    pub mute: Option<bool>,
    pub transposition: Option<i8>,
    pub velocity_shift: Option<i8>,
    pub program: Option<u8>,
    pub volume: Option<u8>,
    pub pan: Option<u8>,
    pub reverb: Option<u8>,
    pub chorus: Option<u8>,
    pub drums_rerouted: Option<bool>,
}

impl Arrangement {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let arrangement: Self = toml::from_str(text).context("Invalid arrangement file")?;
        arrangement.song.validate().context("Invalid song structure")?;
        Ok(arrangement)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read arrangement {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Failed to load {}", path.display()))
    }

    /// Channel assignment for the song with the file's overrides applied
    pub fn midi_mix(&self) -> anyhow::Result<MidiMix> {
        let mut mix = MidiMix::for_song(&self.song);
        for settings in &self.mix {
            let key = VoiceKey::new(&settings.rhythm, settings.voice.clone());
            let Some(ins) = mix.channel_of(&key).and_then(|ch| mix.get_mut(ch)) else {
                bail!("Mix settings for unknown voice {key}");
            };
            if let Some(mute) = settings.mute {
                ins.mute = mute;
            }
            if let Some(t) = settings.transposition {
                ins.transposition = t;
            }
            if let Some(v) = settings.velocity_shift {
                ins.velocity_shift = v;
            }
            if settings.program.is_some() {
                ins.program = settings.program;
            }
            ins.volume = settings.volume.unwrap_or(ins.volume);
            ins.pan = settings.pan.unwrap_or(ins.pan);
            ins.reverb = settings.reverb.unwrap_or(ins.reverb);
            ins.chorus = settings.chorus.unwrap_or(ins.chorus);
            ins.drums_rerouted = settings.drums_rerouted.unwrap_or(ins.drums_rerouted);
        }
        Ok(mix)
    }
}
