//! Tick <-> microsecond conversion over a piecewise-constant tempo map
//!
//! Within a segment, elapsed microseconds = elapsed ticks × (µs per quarter / PPQ).
//! All intermediate math is done in `f64` and segment boundaries are accumulated
//! unrounded; only the final result is rounded (half away from zero).

use serde::{Deserialize, Serialize};

use crate::error::TempoMapError;

/// Microseconds per quarter note for a tempo in BPM
pub fn bpm_to_us_per_quarter(bpm: f64) -> f64 {
    60_000_000.0 / bpm
}

/// Tempo in BPM for a microseconds-per-quarter value
pub fn us_per_quarter_to_bpm(us_per_quarter: f64) -> f64 {
    60_000_000.0 / us_per_quarter
}

/// A tempo change at a tick position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoChange {
    pub tick: u64,
    pub us_per_quarter: f64,
}

impl TempoChange {
    pub fn new(tick: u64, us_per_quarter: f64) -> Self {
        Self { tick, us_per_quarter }
    }

    pub fn from_bpm(tick: u64, bpm: f64) -> Self {
        Self::new(tick, bpm_to_us_per_quarter(bpm))
    }

    pub fn bpm(&self) -> f64 {
        us_per_quarter_to_bpm(self.us_per_quarter)
    }
}

/// Ordered tempo changes, the first one at tick 0
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TempoMap {
    changes: Vec<TempoChange>,
}

impl TempoMap {
    /// Build a tempo map. A change at the same tick as its predecessor supersedes it.
    pub fn new(changes: Vec<TempoChange>) -> Result<Self, TempoMapError> {
        let first = changes.first().ok_or(TempoMapError::Empty)?;
        if first.tick != 0 {
            return Err(TempoMapError::FirstNotAtZero(first.tick));
        }

        let mut kept: Vec<TempoChange> = Vec::with_capacity(changes.len());
        for change in changes {
            if !change.us_per_quarter.is_finite() || change.us_per_quarter <= 0.0 {
                return Err(TempoMapError::InvalidTempo(change.us_per_quarter));
            }
            match kept.last_mut() {
                Some(prev) if prev.tick == change.tick => *prev = change,
                Some(prev) if prev.tick > change.tick => {
                    return Err(TempoMapError::Unordered {
                        previous: prev.tick,
                        next: change.tick,
                    });
                }
                _ => kept.push(change),
            }
        }
        Ok(Self { changes: kept })
    }

    /// Single-tempo map
    pub fn constant(us_per_quarter: f64) -> Result<Self, TempoMapError> {
        Self::new(vec![TempoChange::new(0, us_per_quarter)])
    }

    pub fn changes(&self) -> &[TempoChange] {
        &self.changes
    }

    /// Tempo in effect at `tick`
    pub fn tempo_at(&self, tick: u64) -> TempoChange {
        let idx = self.changes.partition_point(|c| c.tick <= tick);
        self.changes[idx.saturating_sub(1)]
    }

    /// Absolute position in microseconds of `tick`
    pub fn ticks_to_micros(&self, tick: u64, ppq: u32) -> u64 {
        self.ticks_to_micros_f64(tick, ppq).round() as u64
    }

    fn ticks_to_micros_f64(&self, tick: u64, ppq: u32) -> f64 {
        let ppq = ppq as f64;
        let mut elapsed_us = 0.0;
        for (i, change) in self.changes.iter().enumerate() {
            let us_per_tick = change.us_per_quarter / ppq;
            let segment_end = self.changes.get(i + 1).map(|c| c.tick);
            match segment_end {
                Some(end) if end <= tick => {
                    elapsed_us += (end - change.tick) as f64 * us_per_tick;
                }
                _ => return elapsed_us + (tick - change.tick) as f64 * us_per_tick,
            }
        }
        elapsed_us
    }

    /// Tick position of an absolute time in microseconds.
    ///
    /// Walks the segments accumulating elapsed microseconds until `micros`
    /// falls inside the current one, then inverts that segment's linear relation.
    pub fn micros_to_ticks(&self, micros: u64, ppq: u32) -> u64 {
        let ppq = ppq as f64;
        let target = micros as f64;
        let mut segment_start_us = 0.0;
        let mut current = self.changes[0];

        for next in &self.changes[1..] {
            let segment_us = (next.tick - current.tick) as f64 * current.us_per_quarter / ppq;
            if segment_start_us + segment_us > target {
                break;
            }
            segment_start_us += segment_us;
            current = *next;
        }

        let residual_ticks = (target - segment_start_us) * ppq / current.us_per_quarter;
        (current.tick as f64 + residual_ticks).round() as u64
    }
}

impl<'de> Deserialize<'de> for TempoMap {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            changes: Vec<TempoChange>,
        }
        let raw = Raw::deserialize(deserializer)?;
        TempoMap::new(raw.changes).map_err(serde::de::Error::custom)
    }
}
