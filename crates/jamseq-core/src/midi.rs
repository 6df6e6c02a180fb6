//! MIDI messages and constants shared by the sequence pipeline

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sequence resolution (pulses per quarter note)
pub const PPQ_RESOLUTION: u32 = 480;
/// Reference tempo of a sequence before song tempo factors are applied
pub const REF_TEMPO_BPM: f64 = 120.0;
/// Zero-based channel used for drums (channel 10)
pub const CHANNEL_DRUMS: u8 = 9;
/// Undefined controller used to carry song-part tempo factors on track 0
pub const CTRL_CHG_TEMPO_FACTOR: u8 = 102;
pub const CTRL_CHG_BANK_SELECT_MSB: u8 = 0;
pub const CTRL_CHG_VOLUME_MSB: u8 = 7;
pub const CTRL_CHG_PAN_MSB: u8 = 10;
pub const CTRL_CHG_BANK_SELECT_LSB: u8 = 32;
pub const CTRL_CHG_REVERB_DEPTH: u8 = 91;
pub const CTRL_CHG_CHORUS_DEPTH: u8 = 93;
pub const CTRL_CHG_RESET_ALL_CONTROLLERS: u8 = 121;

pub const NOTE_OFF: u8 = 0x80;
pub const NOTE_ON: u8 = 0x90;
pub const POLY_PRESSURE: u8 = 0xA0;
pub const CONTROL_CHANGE: u8 = 0xB0;
pub const PROGRAM_CHANGE: u8 = 0xC0;
pub const CHANNEL_PRESSURE: u8 = 0xD0;
pub const PITCH_BEND: u8 = 0xE0;

/// Encode a tempo factor (0.5..=2.0) as a controller value (factor × 50)
pub fn tempo_factor_to_value(factor: f64) -> u8 {
    (factor.clamp(0.5, 2.0) * 50.0).round() as u8
}

/// Decode a tempo factor controller value
pub fn value_to_tempo_factor(value: u8) -> f64 {
    (value as f64 / 50.0).clamp(0.5, 2.0)
}

/// Raw 3-byte channel message as received from an input device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShortMessage {
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
}

impl ShortMessage {
    pub fn new(status: u8, data1: u8, data2: u8) -> Self {
        Self { status, data1, data2 }
    }

    pub fn command(&self) -> u8 {
        self.status & 0xF0
    }

    pub fn channel(&self) -> u8 {
        self.status & 0x0F
    }

    /// System common and real-time messages carry 0xF in the high nibble
    pub fn is_system(&self) -> bool {
        self.status & 0xF0 == 0xF0
    }

    pub fn pack(&self) -> u32 {
        (self.status as u32) << 16 | (self.data1 as u32) << 8 | self.data2 as u32
    }

    pub fn unpack(raw: u32) -> Self {
        Self {
            status: (raw >> 16) as u8,
            data1: (raw >> 8) as u8,
            data2: raw as u8,
        }
    }
}

/// Events that may appear in a sequence track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MidiEvent {
    NoteOn { channel: u8, pitch: u8, velocity: u8 },
    NoteOff { channel: u8, pitch: u8, velocity: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    /// 14-bit value, 8192 is centered
    PitchBend { channel: u8, value: u16 },
    PolyPressure { channel: u8, pitch: u8, pressure: u8 },
    ChannelPressure { channel: u8, pressure: u8 },
    TrackName(String),
    Marker(String),
    Copyright(String),
    Tempo { us_per_quarter: u32 },
    TimeSignature { numerator: u8, denominator: u8 },
    EndOfTrack,
}

impl MidiEvent {
    /// Channel of a channel voice message, `None` for meta events
    pub fn channel(&self) -> Option<u8> {
        match *self {
            Self::NoteOn { channel, .. }
            | Self::NoteOff { channel, .. }
            | Self::ControlChange { channel, .. }
            | Self::ProgramChange { channel, .. }
            | Self::PitchBend { channel, .. }
            | Self::PolyPressure { channel, .. }
            | Self::ChannelPressure { channel, .. } => Some(channel),
            _ => None,
        }
    }

    pub fn is_note(&self) -> bool {
        matches!(self, Self::NoteOn { .. } | Self::NoteOff { .. })
    }

    pub fn is_note_on(&self) -> bool {
        matches!(self, Self::NoteOn { .. })
    }

    /// Rewrite the channel of a channel voice message; meta events are left alone
    pub fn set_channel(&mut self, new_channel: u8) {
        match self {
            Self::NoteOn { channel, .. }
            | Self::NoteOff { channel, .. }
            | Self::ControlChange { channel, .. }
            | Self::ProgramChange { channel, .. }
            | Self::PitchBend { channel, .. }
            | Self::PolyPressure { channel, .. }
            | Self::ChannelPressure { channel, .. } => *channel = new_channel & 0x0F,
            _ => {}
        }
    }

    /// Decode a raw channel message, `None` for system messages
    pub fn from_short(sm: ShortMessage) -> Option<Self> {
        let channel = sm.channel();
        let (d1, d2) = (sm.data1 & 0x7F, sm.data2 & 0x7F);
        let event = match sm.command() {
            NOTE_OFF => Self::NoteOff { channel, pitch: d1, velocity: d2 },
            NOTE_ON => Self::NoteOn { channel, pitch: d1, velocity: d2 },
            POLY_PRESSURE => Self::PolyPressure { channel, pitch: d1, pressure: d2 },
            CONTROL_CHANGE => Self::ControlChange { channel, controller: d1, value: d2 },
            PROGRAM_CHANGE => Self::ProgramChange { channel, program: d1 },
            CHANNEL_PRESSURE => Self::ChannelPressure { channel, pressure: d1 },
            PITCH_BEND => Self::PitchBend {
                channel,
                value: (d2 as u16) << 7 | d1 as u16,
            },
            _ => return None,
        };
        Some(event)
    }

    /// Encode as a raw channel message, `None` for meta events
    pub fn to_short(&self) -> Option<ShortMessage> {
        let sm = match *self {
            Self::NoteOff { channel, pitch, velocity } => ShortMessage::new(NOTE_OFF | channel, pitch, velocity),
            Self::NoteOn { channel, pitch, velocity } => ShortMessage::new(NOTE_ON | channel, pitch, velocity),
            Self::PolyPressure { channel, pitch, pressure } => ShortMessage::new(POLY_PRESSURE | channel, pitch, pressure),
            Self::ControlChange { channel, controller, value } => ShortMessage::new(CONTROL_CHANGE | channel, controller, value),
            Self::ProgramChange { channel, program } => ShortMessage::new(PROGRAM_CHANGE | channel, program, 0),
            Self::ChannelPressure { channel, pressure } => ShortMessage::new(CHANNEL_PRESSURE | channel, pressure, 0),
            Self::PitchBend { channel, value } => {
                ShortMessage::new(PITCH_BEND | channel, (value & 0x7F) as u8, ((value >> 7) & 0x7F) as u8)
            }
            _ => return None,
        };
        Some(sm)
    }

    /// Tempo factor carried by a tempo-factor controller event
    pub fn tempo_factor(&self) -> Option<f64> {
        match *self {
            Self::ControlChange { controller: CTRL_CHG_TEMPO_FACTOR, value, .. } => Some(value_to_tempo_factor(value)),
            _ => None,
        }
    }
}

impl fmt::Display for MidiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoteOn { channel, pitch, velocity } => write!(f, "NoteOn ch={channel} pitch={pitch} vel={velocity}"),
            Self::NoteOff { channel, pitch, velocity } => write!(f, "NoteOff ch={channel} pitch={pitch} vel={velocity}"),
            Self::ControlChange { channel, controller, value } => write!(f, "CC ch={channel} ctrl={controller} value={value}"),
            Self::ProgramChange { channel, program } => write!(f, "ProgramChange ch={channel} program={program}"),
            Self::PitchBend { channel, value } => write!(f, "PitchBend ch={channel} value={value}"),
            Self::PolyPressure { channel, pitch, pressure } => write!(f, "PolyPressure ch={channel} pitch={pitch} pressure={pressure}"),
            Self::ChannelPressure { channel, pressure } => write!(f, "ChannelPressure ch={channel} pressure={pressure}"),
            Self::TrackName(name) => write!(f, "TrackName \"{name}\""),
            Self::Marker(text) => write!(f, "Marker \"{text}\""),
            Self::Copyright(text) => write!(f, "Copyright \"{text}\""),
            Self::Tempo { us_per_quarter } => write!(f, "Tempo {us_per_quarter}us/quarter"),
            Self::TimeSignature { numerator, denominator } => write!(f, "TimeSignature {numerator}/{denominator}"),
            Self::EndOfTrack => write!(f, "EndOfTrack"),
        }
    }
}

/// An event placed at an absolute tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedEvent {
    pub tick: u64,
    pub event: MidiEvent,
}

impl TimedEvent {
    pub fn new(tick: u64, event: MidiEvent) -> Self {
        Self { tick, event }
    }
}

impl fmt::Display for TimedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} tick={}", self.event, self.tick)
    }
}
