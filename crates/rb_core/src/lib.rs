//! # rb_core - Deterministic Rhythm Combat Encounter Engine
//!
//! This library synchronizes a combat encounter to musical time: a clock
//! maps elapsed seconds onto beat/bar/sixteenth coordinates, a bar-counted
//! state machine gates traversal vs. battle, a 64-step scheduler fires
//! telegraphs and attacks against the grid, and a timing judge grades how
//! well discrete events line up with the beat.
//!
//! ## Features
//! - 100% deterministic sessions (same config + seed + tick totals = same
//!   event stream, regardless of frame chunking)
//! - Single-threaded, tick-driven; observers attach as passive subscribers
//! - No rendering, audio playback, or persistence: hosts integrate through
//!   events, cue identifiers, and position feeds

pub mod attack;
pub mod clock;
pub mod combat;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod flow;
pub mod health;
pub mod judge;
pub mod scheduler;
pub mod score;

pub use attack::{AttackResolution, PlayerAttackConfig, PlayerAttackKind, PlayerCombat};
pub use clock::{Boundary, BoundaryTracker, MusicClock, STEPS_PER_BAR};
pub use config::{
    AttackShape, Checkpoint, CombatantConfig, CourseConfig, EncounterConfig, Pattern, Phase,
    SessionConfig, TimingConfig, PATTERN_BARS, PATTERN_STEPS,
};
pub use engine::EncounterEngine;
pub use error::{ConfigError, Result};
pub use events::{Combatant, CueSink, EncounterEvent, EventQueue, NullCueSink, SubscriberId};
pub use flow::{EncounterFlow, FlowOutput, GameplayState};
pub use health::{DamageOutcome, HealthPool};
pub use judge::{TimingJudge, TimingResult};
pub use scheduler::{PatternScheduler, SchedulerSession, StepOutcome};
pub use score::ScoreBoard;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
