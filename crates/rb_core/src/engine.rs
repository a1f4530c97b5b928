//! Encounter driver.
//!
//! Owns every subsystem and advances them once per externally supplied
//! `delta_seconds`, in a fixed order: clock, then each crossed boundary in
//! temporal order (bar counters before step scheduling), then the sampled
//! health feed, then event dispatch. One driver thread, no locks; all
//! subscriber access happens after the tick completes.

use nalgebra::Vector3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::attack::{AttackResolution, PlayerAttackKind, PlayerCombat};
use crate::clock::{Boundary, BoundaryTracker, MusicClock, STEPS_PER_BAR};
use crate::combat;
use crate::config::{Pattern, SessionConfig};
use crate::error::ConfigError;
use crate::events::{
    Combatant, CueSink, EncounterEvent, EventQueue, NullCueSink, SubscriberId,
};
use crate::flow::{EncounterFlow, FlowOutput, GameplayState};
use crate::health::HealthPool;
use crate::judge::{TimingJudge, TimingResult};
use crate::scheduler::PatternScheduler;
use crate::score::ScoreBoard;

/// Symbolic cue fired on traversal/battle transitions.
pub const TRANSITION_CUE: &str = "transition";

pub struct EncounterEngine {
    clock: MusicClock,
    tracker: BoundaryTracker,
    flow: EncounterFlow,
    scheduler: PatternScheduler,
    judge: TimingJudge,
    player_combat: PlayerCombat,
    score: ScoreBoard,
    player_health: HealthPool,
    enemy_health: HealthPool,
    events: EventQueue,
    rng: ChaCha8Rng,
    cue_sink: Box<dyn CueSink>,
    player_position: Option<Vector3<f32>>,
    enemy_position: Option<Vector3<f32>>,
    enemy_turn: bool,
}

impl EncounterEngine {
    /// Validate the config and assemble a session. The seed fully
    /// determines pattern selection; same config + seed + tick sequence
    /// means the same event stream.
    pub fn new(config: SessionConfig, seed: u64) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut clock = MusicClock::new(config.bpm, config.beats_per_bar)?;
        if config.count_in_bars > 0 {
            clock.start_count_in(config.count_in_bars);
        }
        let mut tracker = BoundaryTracker::new();
        tracker.resync(&clock);

        Ok(Self {
            scheduler: PatternScheduler::new(&config.encounter),
            flow: EncounterFlow::new(config.course.checkpoints.clone())?,
            judge: TimingJudge::new(config.timing.perfect_window_seconds),
            player_combat: PlayerCombat::new(config.player_attack),
            score: ScoreBoard::new(),
            player_health: HealthPool::new(
                config.player.max_health,
                config.player.invincibility_seconds,
            ),
            enemy_health: HealthPool::new(
                config.enemy.max_health,
                config.enemy.invincibility_seconds,
            ),
            events: EventQueue::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            cue_sink: Box::new(NullCueSink),
            player_position: None,
            enemy_position: None,
            enemy_turn: false,
            clock,
            tracker,
        })
    }

    pub fn with_cue_sink(mut self, sink: Box<dyn CueSink>) -> Self {
        self.cue_sink = sink;
        self
    }

    pub fn subscribe(&mut self, subscriber: impl FnMut(&EncounterEvent) + 'static) -> SubscriberId {
        self.events.subscribe(subscriber)
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Pull queued events instead of subscribing. Mostly for headless
    /// consumers and tests.
    pub fn drain_events(&mut self) -> Vec<EncounterEvent> {
        self.events.drain()
    }

    pub fn clock(&self) -> &MusicClock {
        &self.clock
    }

    pub fn state(&self) -> GameplayState {
        self.flow.state()
    }

    pub fn is_enemy_turn(&self) -> bool {
        self.enemy_turn
    }

    pub fn is_course_complete(&self) -> bool {
        self.flow.is_complete()
    }

    pub fn phase_index(&self) -> Option<usize> {
        self.scheduler.session().map(|s| s.phase_index)
    }

    pub fn score(&self) -> i64 {
        self.score.score()
    }

    pub fn combo(&self) -> u32 {
        self.score.combo()
    }

    pub fn player_health(&self) -> &HealthPool {
        &self.player_health
    }

    pub fn enemy_health(&self) -> &HealthPool {
        &self.enemy_health
    }

    /// Collaborator feeds; either may be absent, in which case single hit
    /// checks are skipped (never the whole session).
    pub fn set_player_position(&mut self, position: Option<Vector3<f32>>) {
        self.player_position = position;
    }

    pub fn set_enemy_position(&mut self, position: Option<Vector3<f32>>) {
        self.enemy_position = position;
    }

    /// Advance the whole engine by one tick.
    pub fn tick(&mut self, delta_seconds: f64) {
        self.clock.advance(delta_seconds);

        for boundary in self.tracker.observe(&self.clock) {
            match boundary {
                Boundary::Bar { index } => {
                    self.events.emit(EncounterEvent::BarCrossed { bar: index });
                    let mut out = Vec::new();
                    self.flow.on_bar_crossed(&mut out);
                    self.apply_flow_outputs(out);
                }
                Boundary::Beat { index } => {
                    self.events.emit(EncounterEvent::BeatCrossed { beat: index });
                }
                Boundary::Step { index } => {
                    if self.flow.in_battle() && self.scheduler.is_active() {
                        // The boundary's own time, not the end-of-tick
                        // time: cooldowns stay chunking-independent.
                        let now = index as f64 * self.clock.step_interval();
                        let local_step = index.rem_euclid(STEPS_PER_BAR) as usize;
                        let pattern = self.scheduler.current_pattern().cloned();
                        let outcome = self.scheduler.on_step_crossed(local_step, now, &mut self.rng);
                        if let Some(pattern) = pattern {
                            self.handle_step_outcome(&pattern, outcome.telegraphs, outcome.attack, now);
                        }
                    }
                }
            }
        }

        // Sampled health feed; only threshold crossings matter.
        if self.scheduler.is_active() {
            if let Some(phase_index) = self.scheduler.notify_health_ratio(self.enemy_health.ratio())
            {
                self.events.emit(EncounterEvent::PhaseChanged { phase_index });
            }
        }

        self.events.dispatch();
    }

    /// External trigger: traversal reached the current checkpoint.
    pub fn reached_checkpoint(&mut self) {
        let mut out = Vec::new();
        self.flow.reached_checkpoint(&mut out);
        self.apply_flow_outputs(out);
        self.events.dispatch();
    }

    /// External edge signal: a collaborator decided the enemy is down,
    /// independent of the engine-owned health pool. Ignored outside
    /// battle.
    pub fn notify_enemy_defeated(&mut self) {
        let mut out = Vec::new();
        self.flow.enemy_defeated(&mut out);
        self.apply_flow_outputs(out);
        self.events.dispatch();
    }

    /// Resolve a player attack intent at the current clock position.
    /// Returns what landed, or `None` if the attack could not happen.
    pub fn player_attack(&mut self, kind: PlayerAttackKind) -> Option<AttackResolution> {
        let now = self.clock.elapsed_seconds();
        let beat_offset =
            TimingJudge::offset_from_nearest_beat(now, self.clock.beat_interval());
        let resolution =
            self.player_combat.resolve(kind, now, beat_offset, self.score.damage_multiplier())?;

        if let Some(timing) = resolution.timing {
            self.apply_timing(timing);
        }

        if self.flow.in_battle() {
            if let Some(outcome) = self.enemy_health.take_damage(resolution.damage, now) {
                self.events
                    .emit(EncounterEvent::Damaged { target: Combatant::Enemy, amount: outcome.applied });
                if outcome.defeated {
                    self.events.emit(EncounterEvent::Defeated { target: Combatant::Enemy });
                    let mut out = Vec::new();
                    self.flow.enemy_defeated(&mut out);
                    self.apply_flow_outputs(out);
                }
            }
        }

        self.events.dispatch();
        Some(resolution)
    }

    /// Dodge now. Returns true for a just-dodge (inside the attack
    /// proximity window), which opens the counter window.
    pub fn player_dodge(&mut self) -> bool {
        let window = self.player_combat.config().good_window_seconds;
        let just = self
            .scheduler
            .seconds_to_nearest_attack(&self.clock)
            .is_some_and(|seconds| seconds <= window);
        if just {
            self.player_combat.register_just_dodge(self.clock.elapsed_seconds());
        }
        just
    }

    /// Judge an externally observed, non-failing event against the beat
    /// grid and account it.
    pub fn evaluate_player_action(&mut self) -> TimingResult {
        let result =
            self.judge.classify(self.clock.elapsed_seconds(), self.clock.beat_interval());
        self.apply_timing(result);
        self.events.dispatch();
        result
    }

    /// The caller saw a failure condition (a collision landed): assert the
    /// Miss. The judge is never asked to compute this.
    pub fn assert_miss(&mut self) {
        self.apply_timing(TimingResult::Miss);
        self.events.dispatch();
    }

    pub fn add_special_item(&mut self) {
        self.player_combat.add_special_item();
    }

    pub fn heal_player(&mut self, amount: i32) {
        let applied = self.player_health.heal(amount);
        if applied > 0 {
            self.events.emit(EncounterEvent::Healed { target: Combatant::Player, amount: applied });
            self.events.dispatch();
        }
    }

    fn apply_flow_outputs(&mut self, outputs: Vec<FlowOutput>) {
        for output in outputs {
            match output {
                FlowOutput::StateChanged(state) => {
                    self.events.emit(EncounterEvent::StateChanged { state });
                    if matches!(
                        state,
                        GameplayState::WaitingForBattle | GameplayState::WaitingAfterBattle
                    ) {
                        self.cue_sink.play(TRANSITION_CUE);
                    }
                }
                FlowOutput::CombatTurn(enemy_turn) => {
                    self.enemy_turn = enemy_turn;
                    if enemy_turn {
                        self.scheduler.activate();
                    } else {
                        self.scheduler.deactivate();
                    }
                }
                FlowOutput::CheckpointAdvanced(_) => {}
                FlowOutput::CourseCompleted => {
                    self.events.emit(EncounterEvent::CourseCompleted);
                }
            }
        }
    }

    fn handle_step_outcome(
        &mut self,
        pattern: &Pattern,
        telegraphs: Vec<usize>,
        attack: Option<usize>,
        now: f64,
    ) {
        for step in telegraphs {
            self.events
                .emit(EncounterEvent::TelegraphStarted { step, pattern: pattern.name.clone() });
            if let Some(cue) = &pattern.telegraph_cue {
                self.cue_sink.play(cue);
            }
        }
        if let Some(step) = attack {
            self.events.emit(EncounterEvent::AttackFired { step, pattern: pattern.name.clone() });
            if let Some(cue) = &pattern.attack_cue {
                self.cue_sink.play(cue);
            }
            self.resolve_enemy_attack(pattern, now);
        }
    }

    fn resolve_enemy_attack(&mut self, pattern: &Pattern, now: f64) {
        let (Some(origin), Some(target)) = (self.enemy_position, self.player_position) else {
            // Missing reference: skip this one check, keep scheduling.
            log::debug!("skipping hit check for '{}': no target reference", pattern.name);
            return;
        };
        if !combat::hit_test(pattern.shape, origin, target, pattern.attack_range) {
            return;
        }
        if let Some(outcome) = self.player_health.take_damage(pattern.base_damage, now) {
            self.events
                .emit(EncounterEvent::Damaged { target: Combatant::Player, amount: outcome.applied });
            // Taking the hit is the failure condition.
            self.apply_timing(TimingResult::Miss);
            if outcome.defeated {
                self.events.emit(EncounterEvent::Defeated { target: Combatant::Player });
            }
        }
    }

    fn apply_timing(&mut self, result: TimingResult) {
        self.events.emit(EncounterEvent::TimingEvaluated { result });
        if self.score.apply(result) {
            self.events.emit(EncounterEvent::ScoreChanged {
                score: self.score.score(),
                combo: self.score.combo(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AttackShape, Checkpoint, CombatantConfig, CourseConfig, EncounterConfig, Phase,
        SessionConfig, TimingConfig, PATTERN_STEPS,
    };

    fn pattern(name: &str, steps: &[usize]) -> Pattern {
        let mut grid = [false; PATTERN_STEPS];
        for step in steps {
            grid[*step] = true;
        }
        Pattern::from_grid(name, 10, 0.25, 3.0, AttackShape::Sphere, &grid).unwrap()
    }

    fn session_config() -> SessionConfig {
        SessionConfig {
            bpm: 200.0,
            beats_per_bar: 4,
            count_in_bars: 0,
            timing: TimingConfig::default(),
            encounter: EncounterConfig {
                phases: vec![
                    Phase {
                        name: "opening".into(),
                        health_threshold: 0.5,
                        patterns: vec![pattern("stomp", &[4, 20])],
                    },
                    Phase {
                        name: "enraged".into(),
                        health_threshold: 0.1,
                        patterns: vec![pattern("sweep", &[0]), pattern("barrage", &[8])],
                    },
                ],
                attack_cooldown_seconds: 0.1,
            },
            course: CourseConfig {
                checkpoints: vec![Checkpoint {
                    is_battle_point: true,
                    pre_battle_wait_bars: 2,
                    post_battle_wait_bars: 1,
                    battle_duration_bars: 8,
                }],
            },
            player: CombatantConfig { max_health: 100, invincibility_seconds: 0.0 },
            enemy: CombatantConfig { max_health: 100, invincibility_seconds: 0.0 },
            player_attack: Default::default(),
        }
    }

    fn drive(engine: &mut EncounterEngine, seconds: f64, dt: f64) -> Vec<EncounterEvent> {
        let mut collected = Vec::new();
        let ticks = (seconds / dt).round() as usize;
        for _ in 0..ticks {
            engine.tick(dt);
            collected.extend(engine.drain_events());
        }
        collected
    }

    #[test]
    fn checkpoint_wait_two_bars_then_battle() {
        let mut engine = EncounterEngine::new(session_config(), 42).unwrap();
        engine.reached_checkpoint();
        assert_eq!(engine.state(), GameplayState::WaitingForBattle);
        assert!(!engine.is_enemy_turn());

        // One bar (1.2s at 200 bpm / 4 beats): still waiting.
        drive(&mut engine, 1.2, 0.015625);
        assert_eq!(engine.state(), GameplayState::WaitingForBattle);

        // Second bar boundary flips to battle and raises the combat turn.
        drive(&mut engine, 1.2, 0.015625);
        assert_eq!(engine.state(), GameplayState::Battle);
        assert!(engine.is_enemy_turn());
        assert_eq!(engine.phase_index(), Some(0));
    }

    #[test]
    fn battle_emits_telegraphs_then_attacks() {
        let mut engine = EncounterEngine::new(session_config(), 42).unwrap();
        engine.reached_checkpoint();
        // Two wait bars, then just under one full 4-bar pattern cycle.
        let events = drive(&mut engine, 2.4 + 4.7, 0.015625);

        let telegraph_steps: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                EncounterEvent::TelegraphStarted { step, .. } => Some(*step),
                _ => None,
            })
            .collect();
        let attack_steps: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                EncounterEvent::AttackFired { step, .. } => Some(*step),
                _ => None,
            })
            .collect();

        // Quarter-bar lead: the cue for step 4 starts on step 0 and the
        // cue for step 20 on step 16, each naming the step it warns about.
        assert_eq!(telegraph_steps, vec![4, 20]);
        assert_eq!(attack_steps, vec![4, 20]);
    }

    #[test]
    fn event_stream_is_chunking_independent() {
        let run = |dt: f64| {
            let mut engine = EncounterEngine::new(session_config(), 7).unwrap();
            engine.set_player_position(Some(Vector3::new(1.0, 0.0, 0.0)));
            engine.set_enemy_position(Some(Vector3::new(0.0, 0.0, 0.0)));
            engine.reached_checkpoint();
            drive(&mut engine, 12.0, dt)
        };

        // 0.015625 and 0.0625 are exact binary fractions, so both tick
        // sequences sum to exactly 12 seconds.
        assert_eq!(run(0.015625), run(0.0625));
    }

    #[test]
    fn landed_enemy_attack_asserts_miss_on_player() {
        let mut engine = EncounterEngine::new(session_config(), 42).unwrap();
        engine.set_player_position(Some(Vector3::new(1.0, 0.0, 0.0)));
        engine.set_enemy_position(Some(Vector3::new(0.0, 0.0, 0.0)));
        engine.reached_checkpoint();
        let events = drive(&mut engine, 2.4 + 1.2, 0.015625);

        assert!(events.contains(&EncounterEvent::Damaged { target: Combatant::Player, amount: 10 }));
        assert!(events
            .contains(&EncounterEvent::TimingEvaluated { result: TimingResult::Miss }));
    }

    #[test]
    fn missing_target_skips_checks_but_keeps_scheduling() {
        let mut engine = EncounterEngine::new(session_config(), 42).unwrap();
        // No positions set at all.
        engine.reached_checkpoint();
        let events = drive(&mut engine, 2.4 + 4.8, 0.015625);

        assert!(events.iter().any(|e| matches!(e, EncounterEvent::AttackFired { .. })));
        assert!(!events.iter().any(|e| matches!(e, EncounterEvent::Damaged { .. })));
        assert_eq!(engine.player_health().current(), 100);
    }

    #[test]
    fn defeating_the_enemy_ends_battle_and_completes_course() {
        let mut engine = EncounterEngine::new(session_config(), 42).unwrap();
        engine.reached_checkpoint();
        drive(&mut engine, 2.4, 0.015625);
        assert_eq!(engine.state(), GameplayState::Battle);

        // One special wipes the enemy's 100 health.
        engine.add_special_item();
        engine.player_attack(PlayerAttackKind::Special);

        let events = engine.drain_events();
        assert!(events.contains(&EncounterEvent::Defeated { target: Combatant::Enemy }));
        assert_eq!(engine.state(), GameplayState::WaitingAfterBattle);
        assert!(!engine.is_enemy_turn());

        // One post-battle bar, then the single-checkpoint course is done.
        let events = drive(&mut engine, 1.2, 0.015625);
        assert!(events.contains(&EncounterEvent::CourseCompleted));
        assert!(engine.is_course_complete());
    }

    #[test]
    fn phase_advances_when_health_crosses_threshold() {
        let mut engine = EncounterEngine::new(session_config(), 42).unwrap();
        engine.reached_checkpoint();
        drive(&mut engine, 2.4, 0.015625);
        assert_eq!(engine.phase_index(), Some(0));

        // Six normal swings burn the enemy to 40%, under the 0.5 gate.
        for _ in 0..6 {
            engine.player_attack(PlayerAttackKind::Normal);
            engine.tick(0.25); // clears the swing cooldown
        }
        engine.drain_events();
        assert_eq!(engine.enemy_health().current(), 40);
        assert_eq!(engine.phase_index(), Some(1));

        engine.tick(0.015625);
        let events = engine.drain_events();
        assert!(
            !events.iter().any(|e| matches!(e, EncounterEvent::PhaseChanged { .. })),
            "phase must not advance twice for one crossing"
        );
        assert_eq!(engine.phase_index(), Some(1));
    }

    #[test]
    fn rhythm_attack_near_beat_scores_perfect() {
        let mut engine = EncounterEngine::new(session_config(), 42).unwrap();
        engine.reached_checkpoint();
        drive(&mut engine, 2.4, 0.015625);

        // Land exactly on a beat boundary.
        let resolution = engine.player_attack(PlayerAttackKind::Rhythm).unwrap();
        assert_eq!(resolution.timing, Some(TimingResult::Perfect));
        assert!(engine.score() > 0);
        assert_eq!(engine.combo(), 1);
    }

    #[test]
    fn count_in_crosses_negative_boundaries() {
        let mut config = session_config();
        config.count_in_bars = 1;
        let mut engine = EncounterEngine::new(config, 42).unwrap();

        let events = drive(&mut engine, 1.2, 0.015625);
        let beats: Vec<i64> = events
            .iter()
            .filter_map(|e| match e {
                EncounterEvent::BeatCrossed { beat } => Some(*beat),
                _ => None,
            })
            .collect();
        assert_eq!(beats, vec![-3, -2, -1, 0]);
    }
}
