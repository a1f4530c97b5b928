//! Static encounter data.
//!
//! Everything here is loaded and validated once, before a session starts.
//! Validation failures are [`ConfigError`]s and never surface mid-session.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::attack::PlayerAttackConfig;
use crate::error::ConfigError;
use crate::judge::TimingJudge;

/// Steps in a full pattern: 4 bars of 16 sixteenth notes.
pub const PATTERN_STEPS: usize = 64;

/// Bars a pattern spans before re-selection.
pub const PATTERN_BARS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttackShape {
    Sphere,
    Cone,
    Line,
}

/// A fixed 64-step attack schedule plus damage/shape metadata.
///
/// The grid is authored as four bar rows of 16 steps each, the way the
/// encounter data is written by hand; [`Pattern::full_grid`] concatenates
/// them into the flat 64-step cycle the scheduler walks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub name: String,
    pub base_damage: i32,
    /// Telegraph lead time as a fraction of one bar, in `[0, 1]`.
    pub telegraph_fraction: f32,
    pub attack_range: f32,
    pub shape: AttackShape,
    pub bars: [[bool; 16]; 4],
    /// Symbolic cue id played when a telegraph starts.
    #[serde(default)]
    pub telegraph_cue: Option<String>,
    /// Symbolic cue id played when the attack fires.
    #[serde(default)]
    pub attack_cue: Option<String>,
}

impl Pattern {
    /// Build a pattern from a flat grid. The slice must hold exactly
    /// [`PATTERN_STEPS`] entries.
    pub fn from_grid(
        name: impl Into<String>,
        base_damage: i32,
        telegraph_fraction: f32,
        attack_range: f32,
        shape: AttackShape,
        grid: &[bool],
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        if grid.len() != PATTERN_STEPS {
            return Err(ConfigError::GridLength { pattern: name, found: grid.len() });
        }
        let mut bars = [[false; 16]; 4];
        for (i, active) in grid.iter().enumerate() {
            bars[i / 16][i % 16] = *active;
        }
        Ok(Self {
            name,
            base_damage,
            telegraph_fraction,
            attack_range,
            shape,
            bars,
            telegraph_cue: None,
            attack_cue: None,
        })
    }

    /// The flat 64-step cycle.
    pub fn full_grid(&self) -> [bool; PATTERN_STEPS] {
        let mut grid = [false; PATTERN_STEPS];
        for (bar, row) in self.bars.iter().enumerate() {
            grid[bar * 16..(bar + 1) * 16].copy_from_slice(row);
        }
        grid
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.telegraph_fraction) {
            return Err(ConfigError::TelegraphFraction {
                pattern: self.name.clone(),
                value: self.telegraph_fraction,
            });
        }
        Ok(())
    }
}

/// A named stage of the encounter with its own pattern set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,
    /// Advancing to the *next* phase triggers when the enemy health ratio
    /// drops to this value or below.
    pub health_threshold: f32,
    pub patterns: Vec<Pattern>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncounterConfig {
    pub phases: Vec<Phase>,
    /// Minimum seconds between consecutive attack firings.
    #[serde(default = "default_attack_cooldown")]
    pub attack_cooldown_seconds: f64,
}

fn default_attack_cooldown() -> f64 {
    0.1
}

impl EncounterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.phases.is_empty() {
            return Err(ConfigError::NoPhases);
        }
        let mut previous_threshold = f32::INFINITY;
        for (index, phase) in self.phases.iter().enumerate() {
            if phase.patterns.is_empty() {
                return Err(ConfigError::NoPatterns { phase: phase.name.clone() });
            }
            if phase.health_threshold >= previous_threshold {
                return Err(ConfigError::ThresholdOrder { phase: phase.name.clone(), index });
            }
            previous_threshold = phase.health_threshold;
            for pattern in &phase.patterns {
                pattern.validate()?;
            }
        }
        Ok(())
    }
}

/// One traversal checkpoint along the course.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default = "default_true")]
    pub is_battle_point: bool,
    #[serde(default)]
    pub pre_battle_wait_bars: u32,
    #[serde(default)]
    pub post_battle_wait_bars: u32,
    #[serde(default = "default_battle_duration")]
    pub battle_duration_bars: u32,
}

fn default_true() -> bool {
    true
}

fn default_battle_duration() -> u32 {
    8
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseConfig {
    pub checkpoints: Vec<Checkpoint>,
}

impl CourseConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.checkpoints.is_empty() {
            return Err(ConfigError::NoCheckpoints);
        }
        for (index, checkpoint) in self.checkpoints.iter().enumerate() {
            if checkpoint.is_battle_point && checkpoint.battle_duration_bars == 0 {
                return Err(ConfigError::ZeroBattleDuration { index });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_perfect_window")]
    pub perfect_window_seconds: f64,
}

fn default_perfect_window() -> f64 {
    TimingJudge::DEFAULT_PERFECT_WINDOW
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self { perfect_window_seconds: default_perfect_window() }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CombatantConfig {
    pub max_health: i32,
    pub invincibility_seconds: f64,
}

impl CombatantConfig {
    pub const PLAYER_DEFAULT: Self = Self { max_health: 100, invincibility_seconds: 1.0 };
    pub const ENEMY_DEFAULT: Self = Self { max_health: 100, invincibility_seconds: 0.2 };
}

fn default_player() -> CombatantConfig {
    CombatantConfig::PLAYER_DEFAULT
}

fn default_enemy() -> CombatantConfig {
    CombatantConfig::ENEMY_DEFAULT
}

/// Everything a session needs, in one loadable document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub bpm: f64,
    pub beats_per_bar: u32,
    /// Bars of count-in before time zero.
    #[serde(default)]
    pub count_in_bars: u32,
    #[serde(default)]
    pub timing: TimingConfig,
    pub encounter: EncounterConfig,
    pub course: CourseConfig,
    #[serde(default = "default_player")]
    pub player: CombatantConfig,
    #[serde(default = "default_enemy")]
    pub enemy: CombatantConfig,
    #[serde(default)]
    pub player_attack: PlayerAttackConfig,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.bpm > 0.0) {
            return Err(ConfigError::InvalidBpm(self.bpm));
        }
        if self.beats_per_bar == 0 {
            return Err(ConfigError::InvalidBeatsPerBar);
        }
        self.encounter.validate()?;
        self.course.validate()
    }

    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Load by file extension (`.json`, `.yaml`/`.yml`).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&raw),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&raw),
            other => Err(ConfigError::UnknownFormat(other.unwrap_or("<none>").to_string())),
        }
    }
}
