//! Score and combo accounting.

use crate::judge::TimingResult;

#[derive(Debug, Clone)]
pub struct ScoreBoard {
    score: i64,
    combo: u32,
    /// Combo count at which the damage multiplier maxes out.
    combo_cap: u32,
    max_combo_multiplier: f64,
}

impl ScoreBoard {
    pub const DEFAULT_COMBO_CAP: u32 = 10;
    pub const DEFAULT_MAX_MULTIPLIER: f64 = 2.0;

    pub fn new() -> Self {
        Self {
            score: 0,
            combo: 0,
            combo_cap: Self::DEFAULT_COMBO_CAP,
            max_combo_multiplier: Self::DEFAULT_MAX_MULTIPLIER,
        }
    }

    pub fn score(&self) -> i64 {
        self.score
    }

    pub fn combo(&self) -> u32 {
        self.combo
    }

    /// Account one judged event. Perfect and Safe extend the combo and pay
    /// out scaled by it; a Miss resets the combo and pays nothing.
    /// Returns true when score or combo changed.
    pub fn apply(&mut self, result: TimingResult) -> bool {
        match result {
            TimingResult::Perfect => {
                self.score += 100 * i64::from(self.combo + 1);
                self.combo += 1;
                true
            }
            TimingResult::Safe => {
                self.score += 50 * i64::from(self.combo + 1);
                self.combo += 1;
                true
            }
            TimingResult::Miss => {
                let had_combo = self.combo > 0;
                self.combo = 0;
                had_combo
            }
        }
    }

    /// Damage multiplier in `[1, max]`, saturating at the combo cap.
    pub fn damage_multiplier(&self) -> f64 {
        let capped = self.combo.min(self.combo_cap);
        1.0 + (self.max_combo_multiplier - 1.0) * f64::from(capped) / f64::from(self.combo_cap)
    }
}

impl Default for ScoreBoard {
    fn default() -> Self {
        Self::new()
    }
}
