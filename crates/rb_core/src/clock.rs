//! Musical time base.
//!
//! [`MusicClock`] converts accumulated real time into beat/bar/step
//! coordinates. It holds no notion of ticks: callers feed it arbitrary
//! `delta_seconds` and read positions back. Discrete boundary detection
//! lives in [`BoundaryTracker`], which compares integer boundary indices
//! between consecutive reads so that the same total elapsed time always
//! yields the same crossings regardless of how it was chunked.

use crate::error::ConfigError;

/// Sixteenth-note subdivisions per bar.
pub const STEPS_PER_BAR: i64 = 16;

#[derive(Debug, Clone)]
pub struct MusicClock {
    bpm: f64,
    beats_per_bar: u32,
    beat_interval: f64,
    bar_interval: f64,
    step_interval: f64,
    elapsed_seconds: f64,
}

impl MusicClock {
    pub fn new(bpm: f64, beats_per_bar: u32) -> Result<Self, ConfigError> {
        if !(bpm > 0.0) {
            return Err(ConfigError::InvalidBpm(bpm));
        }
        if beats_per_bar == 0 {
            return Err(ConfigError::InvalidBeatsPerBar);
        }
        let beat_interval = 60.0 / bpm;
        let bar_interval = beat_interval * f64::from(beats_per_bar);
        Ok(Self {
            bpm,
            beats_per_bar,
            beat_interval,
            bar_interval,
            step_interval: bar_interval / STEPS_PER_BAR as f64,
            elapsed_seconds: 0.0,
        })
    }

    /// Accumulate elapsed time. Negative deltas are ignored; the clock
    /// never runs backwards once started.
    pub fn advance(&mut self, delta_seconds: f64) {
        debug_assert!(delta_seconds >= 0.0, "clock delta must be non-negative");
        if delta_seconds > 0.0 {
            self.elapsed_seconds += delta_seconds;
        }
    }

    /// Rewind to a count-in position `bars` before time zero. Boundary
    /// indices are negative while counting in, so edge detection keeps
    /// working across the start of the song.
    pub fn start_count_in(&mut self, bars: u32) {
        self.elapsed_seconds = -(self.bar_interval * f64::from(bars));
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed_seconds
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.beats_per_bar
    }

    pub fn beat_interval(&self) -> f64 {
        self.beat_interval
    }

    pub fn bar_interval(&self) -> f64 {
        self.bar_interval
    }

    pub fn step_interval(&self) -> f64 {
        self.step_interval
    }

    /// Position inside the current bar, in `[0, 1)`. Valid for negative
    /// elapsed time as well (Euclidean remainder).
    pub fn bar_position(&self) -> f64 {
        self.elapsed_seconds.rem_euclid(self.bar_interval) / self.bar_interval
    }

    /// Sixteenth-note slot inside the current bar, in `[0, 16)`.
    pub fn step_index(&self) -> usize {
        (((self.bar_position() * STEPS_PER_BAR as f64) as i64).clamp(0, STEPS_PER_BAR - 1)) as usize
    }

    /// Monotonic beat count since time zero (negative during count-in).
    pub fn beat_index(&self) -> i64 {
        (self.elapsed_seconds / self.beat_interval).floor() as i64
    }

    /// Monotonic bar count since time zero (negative during count-in).
    pub fn bar_index(&self) -> i64 {
        (self.elapsed_seconds / self.bar_interval).floor() as i64
    }

    /// Monotonic sixteenth-note count since time zero.
    pub fn absolute_step(&self) -> i64 {
        (self.elapsed_seconds / self.step_interval).floor() as i64
    }
}

/// A discrete boundary crossed between two consecutive tracker reads.
///
/// Indices are monotonic counts since time zero, not wrapped positions;
/// wrap the step index with `rem_euclid(STEPS_PER_BAR)` for the in-bar slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Bar { index: i64 },
    Beat { index: i64 },
    Step { index: i64 },
}

/// Edge detector over a [`MusicClock`].
///
/// Every integer beat/bar/step boundary crossed since the previous read is
/// reported exactly once, in temporal order, however many `advance` calls
/// happened in between and however large a single advance was. Coincident
/// boundaries (a bar edge is also a beat and a step edge) order bar first,
/// then beat, then step, so bar-counting consumers update before
/// step-driven ones.
#[derive(Debug, Clone, Default)]
pub struct BoundaryTracker {
    last: Option<(i64, i64, i64)>, // (bar, beat, step)
}

impl BoundaryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Align to the clock's current position without reporting anything.
    pub fn resync(&mut self, clock: &MusicClock) {
        self.last = Some((clock.bar_index(), clock.beat_index(), clock.absolute_step()));
    }

    /// Report boundaries crossed since the previous read. The first read
    /// only aligns the tracker.
    pub fn observe(&mut self, clock: &MusicClock) -> Vec<Boundary> {
        let now = (clock.bar_index(), clock.beat_index(), clock.absolute_step());
        let Some(prev) = self.last.replace(now) else {
            return Vec::new();
        };

        let beats_per_bar = i64::from(clock.beats_per_bar());
        // Each boundary kind lives on its own period; express boundary
        // times as exact fractions of a bar (index/denominator) and
        // merge-sort on cross-multiplied integers, so coincident edges
        // compare equal without float noise.
        let mut crossed: Vec<(i64, i64, u8, Boundary)> = Vec::new();
        for index in (prev.0 + 1)..=now.0 {
            crossed.push((index, 1, 0, Boundary::Bar { index }));
        }
        for index in (prev.1 + 1)..=now.1 {
            crossed.push((index, beats_per_bar, 1, Boundary::Beat { index }));
        }
        for index in (prev.2 + 1)..=now.2 {
            crossed.push((index, STEPS_PER_BAR, 2, Boundary::Step { index }));
        }

        crossed.sort_by(|a, b| {
            let lhs = i128::from(a.0) * i128::from(b.1);
            let rhs = i128::from(b.0) * i128::from(a.1);
            lhs.cmp(&rhs).then(a.2.cmp(&b.2))
        });

        crossed.into_iter().map(|(_, _, _, boundary)| boundary).collect()
    }
}
