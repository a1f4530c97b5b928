//! Player attack resolution.
//!
//! Turns an input intent into damage, scaled by combo and beat timing.
//! Nothing here touches targets or health; the engine applies the
//! resolved damage through the geometry predicates.

use serde::{Deserialize, Serialize};

use crate::judge::TimingResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerAttackKind {
    Normal,
    Rhythm,
    Counter,
    Special,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerAttackConfig {
    pub normal_damage: i32,
    pub rhythm_damage: i32,
    pub counter_damage: i32,
    pub special_damage: i32,
    /// Beat offset for the full rhythm bonus.
    pub perfect_window_seconds: f64,
    /// Beat offset for the reduced rhythm bonus; beyond it the swing is a
    /// whiff and the caller asserts a Miss.
    pub good_window_seconds: f64,
    pub perfect_multiplier: f64,
    pub good_multiplier: f64,
    /// Seconds after a just-dodge during which a counter is available.
    pub counter_window_seconds: f64,
    /// Minimum seconds between normal attacks.
    pub cooldown_seconds: f64,
}

impl Default for PlayerAttackConfig {
    fn default() -> Self {
        Self {
            normal_damage: 10,
            rhythm_damage: 25,
            counter_damage: 50,
            special_damage: 100,
            perfect_window_seconds: 0.1,
            good_window_seconds: 0.2,
            perfect_multiplier: 2.0,
            good_multiplier: 1.5,
            counter_window_seconds: 0.5,
            cooldown_seconds: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttackResolution {
    pub kind: PlayerAttackKind,
    pub damage: i32,
    /// Beat judgment, for rhythm attacks only.
    pub timing: Option<TimingResult>,
}

/// Player-side combat state: cooldown, counter window, special stock.
#[derive(Debug, Clone)]
pub struct PlayerCombat {
    config: PlayerAttackConfig,
    last_normal_attack_time: f64,
    just_dodge_time: f64,
    special_items: u32,
}

impl PlayerCombat {
    pub fn new(config: PlayerAttackConfig) -> Self {
        Self {
            config,
            last_normal_attack_time: f64::NEG_INFINITY,
            just_dodge_time: f64::NEG_INFINITY,
            special_items: 0,
        }
    }

    pub fn config(&self) -> &PlayerAttackConfig {
        &self.config
    }

    pub fn special_items(&self) -> u32 {
        self.special_items
    }

    pub fn add_special_item(&mut self) {
        self.special_items += 1;
    }

    pub fn in_counter_window(&self, now: f64) -> bool {
        now - self.just_dodge_time < self.config.counter_window_seconds
    }

    /// A dodge landed inside an attack window; open the counter window.
    pub fn register_just_dodge(&mut self, now: f64) {
        self.just_dodge_time = now;
        log::info!("just dodge at {:.3}s, counter open", now);
    }

    /// Resolve an attack intent at `now`. `beat_offset` is the absolute
    /// distance to the nearest beat; `combo_multiplier` comes from the
    /// score board. Returns `None` when the attack cannot happen at all
    /// (cooling down, no counter window, no special stock).
    pub fn resolve(
        &mut self,
        kind: PlayerAttackKind,
        now: f64,
        beat_offset: f64,
        combo_multiplier: f64,
    ) -> Option<AttackResolution> {
        match kind {
            PlayerAttackKind::Normal => {
                if now - self.last_normal_attack_time < self.config.cooldown_seconds {
                    return None;
                }
                self.last_normal_attack_time = now;
                // A normal swing inside the counter window is the counter.
                if self.in_counter_window(now) {
                    return self.resolve_counter();
                }
                let damage = scale(self.config.normal_damage, combo_multiplier);
                Some(AttackResolution { kind, damage, timing: None })
            }
            PlayerAttackKind::Rhythm => {
                let (timing, timing_multiplier) = if beat_offset <= self.config.perfect_window_seconds
                {
                    (TimingResult::Perfect, self.config.perfect_multiplier)
                } else if beat_offset <= self.config.good_window_seconds {
                    (TimingResult::Safe, self.config.good_multiplier)
                } else {
                    (TimingResult::Miss, 1.0)
                };
                let damage = scale(self.config.rhythm_damage, timing_multiplier * combo_multiplier);
                Some(AttackResolution { kind, damage, timing: Some(timing) })
            }
            PlayerAttackKind::Counter => {
                if !self.in_counter_window(now) {
                    return None;
                }
                self.resolve_counter()
            }
            PlayerAttackKind::Special => {
                if self.special_items == 0 {
                    return None;
                }
                self.special_items -= 1;
                // Specials ignore combo and timing entirely.
                Some(AttackResolution {
                    kind,
                    damage: self.config.special_damage,
                    timing: None,
                })
            }
        }
    }

    fn resolve_counter(&mut self) -> Option<AttackResolution> {
        self.just_dodge_time = f64::NEG_INFINITY;
        // Counters always swing at full combo weight.
        let damage =
            scale(self.config.counter_damage, crate::score::ScoreBoard::DEFAULT_MAX_MULTIPLIER);
        Some(AttackResolution { kind: PlayerAttackKind::Counter, damage, timing: None })
    }
}

fn scale(base: i32, multiplier: f64) -> i32 {
    (f64::from(base) * multiplier).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rhythm_attack_grades_by_beat_offset() {
        let mut combat = PlayerCombat::new(PlayerAttackConfig::default());

        let perfect = combat.resolve(PlayerAttackKind::Rhythm, 0.0, 0.05, 1.0).unwrap();
        assert_eq!(perfect.timing, Some(TimingResult::Perfect));
        assert_eq!(perfect.damage, 50); // 25 * 2.0

        let good = combat.resolve(PlayerAttackKind::Rhythm, 0.0, 0.15, 1.0).unwrap();
        assert_eq!(good.timing, Some(TimingResult::Safe));
        assert_eq!(good.damage, 38); // 25 * 1.5, rounded

        let whiff = combat.resolve(PlayerAttackKind::Rhythm, 0.0, 0.3, 1.0).unwrap();
        assert_eq!(whiff.timing, Some(TimingResult::Miss));
        assert_eq!(whiff.damage, 25);
    }

    #[test]
    fn normal_attack_respects_cooldown() {
        let mut combat = PlayerCombat::new(PlayerAttackConfig::default());
        assert!(combat.resolve(PlayerAttackKind::Normal, 1.0, 0.5, 1.0).is_some());
        assert!(combat.resolve(PlayerAttackKind::Normal, 1.1, 0.5, 1.0).is_none());
        assert!(combat.resolve(PlayerAttackKind::Normal, 1.3, 0.5, 1.0).is_some());
    }

    #[test]
    fn counter_needs_an_open_window_and_spends_it() {
        let mut combat = PlayerCombat::new(PlayerAttackConfig::default());
        assert!(combat.resolve(PlayerAttackKind::Counter, 1.0, 0.5, 1.0).is_none());

        combat.register_just_dodge(1.0);
        let counter = combat.resolve(PlayerAttackKind::Counter, 1.2, 0.5, 1.0).unwrap();
        assert_eq!(counter.kind, PlayerAttackKind::Counter);
        assert_eq!(counter.damage, 100); // 50 * max multiplier

        // The window is consumed by the counter.
        assert!(combat.resolve(PlayerAttackKind::Counter, 1.25, 0.5, 1.0).is_none());
    }

    #[test]
    fn normal_swing_in_counter_window_counters() {
        let mut combat = PlayerCombat::new(PlayerAttackConfig::default());
        combat.register_just_dodge(2.0);
        let resolution = combat.resolve(PlayerAttackKind::Normal, 2.1, 0.5, 1.0).unwrap();
        assert_eq!(resolution.kind, PlayerAttackKind::Counter);
    }

    #[test]
    fn specials_consume_stock_and_ignore_combo() {
        let mut combat = PlayerCombat::new(PlayerAttackConfig::default());
        assert!(combat.resolve(PlayerAttackKind::Special, 0.0, 0.5, 2.0).is_none());

        combat.add_special_item();
        let special = combat.resolve(PlayerAttackKind::Special, 0.0, 0.5, 2.0).unwrap();
        assert_eq!(special.damage, 100);
        assert_eq!(combat.special_items(), 0);
    }
}
