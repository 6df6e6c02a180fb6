//! Multi-track sequence

use serde::{Deserialize, Serialize};

use crate::midi::PPQ_RESOLUTION;
use crate::track::Track;

/// A multi-track sequence at a fixed resolution. Track 0 is the
/// administrative track (song name, markers, tempo data).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pub ppq: u32,
    pub tracks: Vec<Track>,
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new(PPQ_RESOLUTION)
    }
}

impl Sequence {
    pub fn new(ppq: u32) -> Self {
        Self {
            ppq,
            tracks: Vec::new(),
        }
    }

    /// Append a track, returns its index
    pub fn add_track(&mut self, track: Track) -> usize {
        self.tracks.push(track);
        self.tracks.len() - 1
    }

    pub fn get_track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn get_track_mut(&mut self, index: usize) -> Option<&mut Track> {
        self.tracks.get_mut(index)
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Total length in ticks (last event of the longest track)
    pub fn tick_length(&self) -> u64 {
        self.tracks.iter().map(Track::ticks).max().unwrap_or(0)
    }

    /// Total number of events across all tracks
    pub fn event_count(&self) -> usize {
        self.tracks.iter().map(Track::len).sum()
    }

    pub fn normalize(&mut self) {
        for track in &mut self.tracks {
            track.normalize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::MidiEvent;

    #[test]
    fn test_add_and_length() {
        let mut seq = Sequence::default();
        assert_eq!(seq.ppq, 480);
        let admin = seq.add_track(Track::named("Song"));
        let mut bass = Track::named("Bass");
        bass.add(1920, MidiEvent::NoteOff { channel: 1, pitch: 36, velocity: 0 });
        let bass_id = seq.add_track(bass);

        assert_eq!((admin, bass_id), (0, 1));
        assert_eq!(seq.tick_length(), 1920);
        assert_eq!(seq.event_count(), 3);
        assert!(seq.get_track(2).is_none());
    }
}
