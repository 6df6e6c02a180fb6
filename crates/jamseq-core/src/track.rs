//! Track representation

use serde::{Deserialize, Serialize};

use crate::midi::{MidiEvent, TimedEvent};

/// A sequence track: events at absolute ticks.
///
/// Events may be added in any tick order; call [`Track::normalize`] before
/// relying on ordering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub events: Vec<TimedEvent>,
}

impl Track {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track whose first event is a track name
    pub fn named(name: impl Into<String>) -> Self {
        let mut track = Self::new();
        track.add(0, MidiEvent::TrackName(name.into()));
        track
    }

    pub fn add(&mut self, tick: u64, event: MidiEvent) {
        self.events.push(TimedEvent::new(tick, event));
    }

    pub fn add_event(&mut self, event: TimedEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimedEvent> {
        self.events.iter()
    }

    /// First track name event, if any
    pub fn name(&self) -> Option<&str> {
        self.events.iter().find_map(|e| match &e.event {
            MidiEvent::TrackName(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Channel of the first note event
    pub fn note_channel(&self) -> Option<u8> {
        self.events
            .iter()
            .find(|e| e.event.is_note())
            .and_then(|e| e.event.channel())
    }

    /// Tick of the last event (the track length)
    pub fn ticks(&self) -> u64 {
        self.events.iter().map(|e| e.tick).max().unwrap_or(0)
    }

    /// Stable sort by tick; a single end-of-track marker is kept, placed last
    pub fn normalize(&mut self) {
        let end = self
            .events
            .iter()
            .filter(|e| e.event == MidiEvent::EndOfTrack)
            .map(|e| e.tick)
            .max();
        self.events.retain(|e| e.event != MidiEvent::EndOfTrack);
        self.events.sort_by_key(|e| e.tick);
        if let Some(tick) = end {
            let tick = tick.max(self.ticks());
            self.add(tick, MidiEvent::EndOfTrack);
        }
    }

    /// Move the end-of-track marker to `tick`.
    ///
    /// Returns false if an event sits beyond `tick`, in which case the marker
    /// is placed on the last event instead.
    pub fn set_end_of_track(&mut self, tick: u64) -> bool {
        self.events.retain(|e| e.event != MidiEvent::EndOfTrack);
        self.events.sort_by_key(|e| e.tick);
        let last = self.ticks();
        self.add(tick.max(last), MidiEvent::EndOfTrack);
        last <= tick
    }

    /// Remove every event matching `pred`, returns the number removed
    pub fn remove_where(&mut self, mut pred: impl FnMut(&TimedEvent) -> bool) -> usize {
        let before = self.events.len();
        self.events.retain(|e| !pred(e));
        before - self.events.len()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Events in the tick window [from, to] matching `pred`
    pub fn events_in<'a>(
        &'a self,
        from: u64,
        to: u64,
        pred: impl Fn(&MidiEvent) -> bool + 'a,
    ) -> impl Iterator<Item = &'a TimedEvent> + 'a {
        self.events
            .iter()
            .filter(move |e| e.tick >= from && e.tick <= to && pred(&e.event))
    }

    /// Last event strictly before `tick` matching `pred`
    pub fn last_before(&self, tick: u64, pred: impl Fn(&MidiEvent) -> bool) -> Option<&TimedEvent> {
        self.events
            .iter()
            .filter(|e| e.tick < tick && pred(&e.event))
            .max_by_key(|e| e.tick)
    }
}
