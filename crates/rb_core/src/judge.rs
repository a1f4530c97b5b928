//! Beat-alignment judgment.
//!
//! Classifies how well a discrete event lines up with the beat grid. The
//! judge only distinguishes [`TimingResult::Perfect`] from
//! [`TimingResult::Safe`]; a `Miss` is asserted by the caller when the
//! judged event is itself a failure condition (a collision landed, a swing
//! whiffed), never computed here.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimingResult {
    Perfect,
    Safe,
    Miss,
}

#[derive(Debug, Clone, Copy)]
pub struct TimingJudge {
    perfect_window: f64,
}

impl TimingJudge {
    /// Seconds of slack around a beat that still counts as on-beat.
    pub const DEFAULT_PERFECT_WINDOW: f64 = 0.05;

    pub fn new(perfect_window: f64) -> Self {
        Self { perfect_window: perfect_window.max(0.0) }
    }

    pub fn perfect_window(&self) -> f64 {
        self.perfect_window
    }

    /// Absolute distance in seconds from the nearest beat.
    pub fn offset_from_nearest_beat(elapsed_since_reference: f64, beat_interval: f64) -> f64 {
        let beat_position = elapsed_since_reference / beat_interval;
        let nearest_beat = beat_position.round();
        (beat_position - nearest_beat).abs() * beat_interval
    }

    /// Perfect if within the window of the nearest beat, Safe otherwise.
    pub fn classify(&self, elapsed_since_reference: f64, beat_interval: f64) -> TimingResult {
        let delta = Self::offset_from_nearest_beat(elapsed_since_reference, beat_interval);
        if delta <= self.perfect_window {
            TimingResult::Perfect
        } else {
            TimingResult::Safe
        }
    }
}

impl Default for TimingJudge {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PERFECT_WINDOW)
    }
}
