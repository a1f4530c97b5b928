//! 64-step pattern scheduler.
//!
//! Walks the active pattern's 4-bar grid, firing telegraphs ahead of
//! attacks by the pattern's lead fraction and attacks on their grid steps.
//! Runs only while the flow is in battle; the driver replays every crossed
//! step edge in order, so a stalled frame schedules exactly what smooth
//! frames would have.

use rand::Rng;

use crate::clock::MusicClock;
use crate::config::{EncounterConfig, Pattern, Phase, PATTERN_BARS, PATTERN_STEPS};

const STEPS_PER_BAR: usize = 16;

/// Mutable per-battle scheduling state. Created on activation, torn down
/// on deactivation; flags clear on every pattern or phase change.
#[derive(Debug, Clone)]
pub struct SchedulerSession {
    pub phase_index: usize,
    pub pattern_index: usize,
    /// Bar within the 4-bar pattern cycle, `[0, 4)`.
    pub cycle_index: usize,
    /// Step within the 64-step cycle, `[0, 64)`.
    pub global_step: usize,
    attacked_flags: [bool; PATTERN_STEPS],
    telegraph_flags: [bool; PATTERN_STEPS],
    last_attack_time: f64,
}

impl SchedulerSession {
    fn new() -> Self {
        Self {
            phase_index: 0,
            pattern_index: 0,
            cycle_index: 0,
            global_step: 0,
            attacked_flags: [false; PATTERN_STEPS],
            telegraph_flags: [false; PATTERN_STEPS],
            last_attack_time: f64::NEG_INFINITY,
        }
    }

    fn reset_flags(&mut self) {
        self.attacked_flags = [false; PATTERN_STEPS];
        self.telegraph_flags = [false; PATTERN_STEPS];
    }
}

/// What one step edge produced.
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    /// Grid indices whose telegraph started on this edge.
    pub telegraphs: Vec<usize>,
    /// Grid index that fired on this edge, if any.
    pub attack: Option<usize>,
    /// A 4-bar cycle completed and a pattern was (re-)selected.
    pub pattern_changed: bool,
}

#[derive(Debug)]
pub struct PatternScheduler {
    phases: Vec<Phase>,
    cooldown_seconds: f64,
    session: Option<SchedulerSession>,
}

impl PatternScheduler {
    pub fn new(config: &EncounterConfig) -> Self {
        Self {
            phases: config.phases.clone(),
            cooldown_seconds: config.attack_cooldown_seconds,
            session: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&SchedulerSession> {
        self.session.as_ref()
    }

    pub fn current_pattern(&self) -> Option<&Pattern> {
        let session = self.session.as_ref()?;
        self.phases.get(session.phase_index)?.patterns.get(session.pattern_index)
    }

    /// Start a battle session: first phase, first pattern, clean flags.
    pub fn activate(&mut self) {
        self.session = Some(SchedulerSession::new());
        log::info!("scheduler active: phase 0, pattern 0");
    }

    /// Tear the session down; scheduling stops until the next activation.
    pub fn deactivate(&mut self) {
        self.session = None;
        log::info!("scheduler inactive");
    }

    /// Advance one step edge. `local_step` is the sixteenth-note slot in
    /// the current bar, `now_seconds` the clock's elapsed time at the call.
    pub fn on_step_crossed(
        &mut self,
        local_step: usize,
        now_seconds: f64,
        rng: &mut impl Rng,
    ) -> StepOutcome {
        let mut outcome = StepOutcome::default();
        let Some(mut session) = self.session.take() else {
            return outcome;
        };

        session.global_step =
            (session.cycle_index * STEPS_PER_BAR + local_step) % PATTERN_STEPS;
        debug_assert!(session.global_step < PATTERN_STEPS);

        if let Some(pattern) =
            self.phases.get(session.phase_index).and_then(|p| p.patterns.get(session.pattern_index))
        {
            let grid = pattern.full_grid();

            // Telegraph scan covers the whole grid: the lead time may wrap
            // past step 0, so the telegraph for step i can land anywhere.
            let lead_steps =
                (pattern.telegraph_fraction * STEPS_PER_BAR as f32).round() as i64;
            for (i, active) in grid.iter().enumerate() {
                if !active || session.telegraph_flags[i] {
                    continue;
                }
                let telegraph_step =
                    (i as i64 - lead_steps).rem_euclid(PATTERN_STEPS as i64) as usize;
                if session.global_step == telegraph_step {
                    session.telegraph_flags[i] = true;
                    outcome.telegraphs.push(i);
                    log::debug!("telegraph for step {} of '{}'", i, pattern.name);
                }
            }

            if grid[session.global_step]
                && !session.attacked_flags[session.global_step]
                && now_seconds - session.last_attack_time >= self.cooldown_seconds
            {
                session.attacked_flags[session.global_step] = true;
                session.last_attack_time = now_seconds;
                outcome.attack = Some(session.global_step);
                log::debug!("attack fires on step {} of '{}'", session.global_step, pattern.name);
            }
        }

        // Bar boundary inside the pattern: bump the cycle; a full 4 bars
        // re-selects the pattern.
        if local_step == STEPS_PER_BAR - 1 {
            session.cycle_index = (session.cycle_index + 1) % PATTERN_BARS;
            if session.cycle_index == 0 {
                self.select_next_pattern(&mut session, rng);
                outcome.pattern_changed = true;
            }
        }

        self.session = Some(session);
        outcome
    }

    /// Sampled health feed. Advances at most one phase per call, never
    /// back, never past the last phase. Returns the new phase index when
    /// a transition happened.
    pub fn notify_health_ratio(&mut self, health_ratio: f64) -> Option<usize> {
        let session = self.session.as_mut()?;
        if session.phase_index + 1 >= self.phases.len() {
            return None;
        }
        let threshold = f64::from(self.phases[session.phase_index].health_threshold);
        if health_ratio > threshold {
            return None;
        }
        session.phase_index += 1;
        session.pattern_index = 0;
        session.reset_flags();
        log::info!(
            "phase advanced to {} '{}'",
            session.phase_index,
            self.phases[session.phase_index].name
        );
        Some(session.phase_index)
    }

    /// Seconds from the current bar position to the nearest active step of
    /// the current pattern, measured around the bar circle. Used for the
    /// just-dodge judgment; `None` while inactive or with an empty grid.
    pub fn seconds_to_nearest_attack(&self, clock: &MusicClock) -> Option<f64> {
        let session = self.session.as_ref()?;
        let pattern =
            self.phases.get(session.phase_index)?.patterns.get(session.pattern_index)?;
        let bar_position = clock.bar_position();
        let mut nearest: Option<f64> = None;
        for (i, active) in pattern.full_grid().iter().enumerate() {
            if !active {
                continue;
            }
            let step_position = (i % STEPS_PER_BAR) as f64 / STEPS_PER_BAR as f64;
            let distance = (bar_position - step_position).abs();
            let wrapped = distance.min(1.0 - distance);
            let seconds = wrapped * clock.bar_interval();
            nearest = Some(nearest.map_or(seconds, |n: f64| n.min(seconds)));
        }
        nearest
    }

    fn select_next_pattern(&self, session: &mut SchedulerSession, rng: &mut impl Rng) {
        let patterns = &self.phases[session.phase_index].patterns;
        if patterns.len() > 1 {
            let mut next = session.pattern_index;
            while next == session.pattern_index {
                next = rng.gen_range(0..patterns.len());
            }
            session.pattern_index = next;
        }
        session.reset_flags();
        log::debug!(
            "pattern cycle complete, next pattern {} '{}'",
            session.pattern_index,
            patterns[session.pattern_index].name
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AttackShape;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn pattern_with_steps(name: &str, steps: &[usize], telegraph_fraction: f32) -> Pattern {
        let mut grid = [false; PATTERN_STEPS];
        for step in steps {
            grid[*step] = true;
        }
        Pattern::from_grid(name, 10, telegraph_fraction, 3.0, AttackShape::Sphere, &grid).unwrap()
    }

    fn config_with(phases: Vec<Phase>) -> EncounterConfig {
        EncounterConfig { phases, attack_cooldown_seconds: 0.1 }
    }

    fn single_phase(patterns: Vec<Pattern>) -> EncounterConfig {
        config_with(vec![Phase { name: "only".into(), health_threshold: 0.0, patterns }])
    }

    /// Walk whole bars through the scheduler, 0.075s per sixteenth
    /// (200 bpm), collecting outcomes.
    fn walk_bars(
        scheduler: &mut PatternScheduler,
        rng: &mut ChaCha8Rng,
        start_time: f64,
        bars: usize,
    ) -> Vec<StepOutcome> {
        let mut outcomes = Vec::new();
        let step_interval = 0.075;
        for step in 0..bars * STEPS_PER_BAR {
            let now = start_time + step as f64 * step_interval;
            outcomes.push(scheduler.on_step_crossed(step % STEPS_PER_BAR, now, rng));
        }
        outcomes
    }

    #[test]
    fn telegraph_leads_attack_by_fraction_of_bar() {
        // Active step 20 with a quarter-bar lead telegraphs at (20-4) = 16.
        let config = single_phase(vec![pattern_with_steps("probe", &[20], 0.25)]);
        let mut scheduler = PatternScheduler::new(&config);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        scheduler.activate();

        let outcomes = walk_bars(&mut scheduler, &mut rng, 0.0, 4);
        for (step, outcome) in outcomes.iter().enumerate() {
            if step == 16 {
                assert_eq!(outcome.telegraphs, vec![20]);
            } else {
                assert!(outcome.telegraphs.is_empty(), "stray telegraph at step {}", step);
            }
            if step == 20 {
                assert_eq!(outcome.attack, Some(20));
            } else {
                assert_eq!(outcome.attack, None, "stray attack at step {}", step);
            }
        }
    }

    #[test]
    fn telegraph_wraps_below_step_zero() {
        // Active step 1 with a quarter-bar lead wraps to step 61.
        let config = single_phase(vec![pattern_with_steps("wrap", &[1], 0.25)]);
        let mut scheduler = PatternScheduler::new(&config);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        scheduler.activate();

        let outcomes = walk_bars(&mut scheduler, &mut rng, 0.0, 4);
        let telegraphs: Vec<usize> = outcomes
            .iter()
            .enumerate()
            .filter(|(_, o)| !o.telegraphs.is_empty())
            .map(|(step, _)| step)
            .collect();
        assert_eq!(telegraphs, vec![61]);
        // The attack itself still lands on step 1.
        assert_eq!(outcomes[1].attack, Some(1));
    }

    #[test]
    fn cooldown_suppresses_back_to_back_attacks() {
        // Steps 4 and 5 are 0.075s apart; a 0.1s cooldown swallows step 5.
        let config = single_phase(vec![pattern_with_steps("burst", &[4, 5, 12], 0.0)]);
        let mut scheduler = PatternScheduler::new(&config);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        scheduler.activate();

        let outcomes = walk_bars(&mut scheduler, &mut rng, 0.0, 1);
        assert_eq!(outcomes[4].attack, Some(4));
        assert_eq!(outcomes[5].attack, None);
        assert_eq!(outcomes[12].attack, Some(12));
    }

    #[test]
    fn attacks_fire_once_per_cycle() {
        let config = single_phase(vec![pattern_with_steps("once", &[8], 0.0)]);
        let mut scheduler = PatternScheduler::new(&config);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        scheduler.activate();

        let outcomes = walk_bars(&mut scheduler, &mut rng, 0.0, 4);
        let fired: Vec<usize> =
            outcomes.iter().filter_map(|o| o.attack).collect();
        assert_eq!(fired, vec![8]);
    }

    #[test]
    fn flags_reset_when_cycle_wraps() {
        // With a single pattern the selection keeps it, but flags clear,
        // so the attack fires again in the next 4-bar cycle.
        let config = single_phase(vec![pattern_with_steps("loop", &[8], 0.0)]);
        let mut scheduler = PatternScheduler::new(&config);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        scheduler.activate();

        let outcomes = walk_bars(&mut scheduler, &mut rng, 0.0, 8);
        let fired: Vec<usize> = outcomes
            .iter()
            .enumerate()
            .filter(|(_, o)| o.attack.is_some())
            .map(|(step, _)| step)
            .collect();
        assert_eq!(fired, vec![8, 64 + 8]);
    }

    #[test]
    fn reselection_never_repeats_with_multiple_patterns() {
        let config = single_phase(vec![
            pattern_with_steps("a", &[0], 0.0),
            pattern_with_steps("b", &[1], 0.0),
            pattern_with_steps("c", &[2], 0.0),
        ]);
        let mut scheduler = PatternScheduler::new(&config);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        scheduler.activate();

        let mut previous = scheduler.session().unwrap().pattern_index;
        for cycle in 0..50 {
            let outcomes = walk_bars(&mut scheduler, &mut rng, cycle as f64 * 4.8, 4);
            assert!(outcomes.last().unwrap().pattern_changed);
            let current = scheduler.session().unwrap().pattern_index;
            assert_ne!(current, previous, "cycle {} repeated pattern {}", cycle, current);
            previous = current;
        }
    }

    #[test]
    fn global_step_stays_in_range() {
        let config = single_phase(vec![pattern_with_steps("any", &[3, 17, 40, 63], 0.5)]);
        let mut scheduler = PatternScheduler::new(&config);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        scheduler.activate();

        for bar in 0..40 {
            for step in 0..STEPS_PER_BAR {
                scheduler.on_step_crossed(step, bar as f64 * 1.2 + step as f64 * 0.075, &mut rng);
                let global = scheduler.session().unwrap().global_step;
                assert!(global < PATTERN_STEPS);
            }
        }
    }

    #[test]
    fn health_threshold_advances_phase_monotonically() {
        let config = config_with(vec![
            Phase {
                name: "p0".into(),
                health_threshold: 0.6,
                patterns: vec![pattern_with_steps("a", &[0], 0.0)],
            },
            Phase {
                name: "p1".into(),
                health_threshold: 0.3,
                patterns: vec![pattern_with_steps("b", &[1], 0.0)],
            },
            Phase {
                name: "p2".into(),
                health_threshold: 0.1,
                patterns: vec![pattern_with_steps("c", &[2], 0.0)],
            },
        ]);
        let mut scheduler = PatternScheduler::new(&config);
        scheduler.activate();

        assert_eq!(scheduler.notify_health_ratio(0.9), None);
        assert_eq!(scheduler.notify_health_ratio(0.5), Some(1));
        // One step per sample, even when health is below both thresholds.
        assert_eq!(scheduler.notify_health_ratio(0.05), Some(2));
        // Clamped at the last phase.
        assert_eq!(scheduler.notify_health_ratio(0.0), None);
        assert_eq!(scheduler.session().unwrap().phase_index, 2);
    }

    #[test]
    fn phase_change_resets_pattern_and_flags() {
        let config = config_with(vec![
            Phase {
                name: "p0".into(),
                health_threshold: 0.5,
                patterns: vec![pattern_with_steps("a", &[4], 0.0)],
            },
            Phase {
                name: "p1".into(),
                health_threshold: 0.2,
                patterns: vec![pattern_with_steps("b", &[4], 0.0)],
            },
        ]);
        let mut scheduler = PatternScheduler::new(&config);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        scheduler.activate();

        // Fire step 4 in phase 0.
        for step in 0..6 {
            scheduler.on_step_crossed(step, step as f64 * 0.075, &mut rng);
        }
        assert_eq!(scheduler.notify_health_ratio(0.4), Some(1));

        // Same step fires again: the new phase starts with clean flags.
        let outcome = scheduler.on_step_crossed(4, 10.0, &mut rng);
        assert_eq!(outcome.attack, Some(4));
        assert_eq!(scheduler.session().unwrap().pattern_index, 0);
    }

    #[test]
    fn inactive_scheduler_does_nothing() {
        let config = single_phase(vec![pattern_with_steps("idle", &[0], 0.0)]);
        let mut scheduler = PatternScheduler::new(&config);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let outcome = scheduler.on_step_crossed(0, 0.0, &mut rng);
        assert!(outcome.telegraphs.is_empty());
        assert_eq!(outcome.attack, None);
        assert_eq!(scheduler.notify_health_ratio(0.0), None);
    }
}
