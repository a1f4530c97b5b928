//! Course flow state machine.
//!
//! Gates traversal vs. combat along a checkpoint list. Wait and battle
//! counters are measured in bars and decrement exactly once per
//! edge-detected bar boundary, never per tick, so the outcome does not
//! depend on frame timing.

use serde::{Deserialize, Serialize};

use crate::config::Checkpoint;
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameplayState {
    Moving,
    WaitingForBattle,
    Battle,
    WaitingAfterBattle,
}

/// Side effects of a flow transition, for the driver to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowOutput {
    StateChanged(GameplayState),
    /// true on battle start, false on battle end. Drives scheduler
    /// activation and the enemy-turn flag.
    CombatTurn(bool),
    CheckpointAdvanced(usize),
    CourseCompleted,
}

#[derive(Debug, Clone)]
pub struct EncounterFlow {
    checkpoints: Vec<Checkpoint>,
    checkpoint_index: usize,
    state: GameplayState,
    wait_bar_counter: u32,
    battle_bar_counter: u32,
    complete: bool,
}

impl EncounterFlow {
    pub fn new(checkpoints: Vec<Checkpoint>) -> Result<Self, ConfigError> {
        if checkpoints.is_empty() {
            return Err(ConfigError::NoCheckpoints);
        }
        Ok(Self {
            checkpoints,
            checkpoint_index: 0,
            state: GameplayState::Moving,
            wait_bar_counter: 0,
            battle_bar_counter: 0,
            complete: false,
        })
    }

    pub fn state(&self) -> GameplayState {
        self.state
    }

    pub fn in_battle(&self) -> bool {
        self.state == GameplayState::Battle && !self.complete
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn checkpoint_index(&self) -> usize {
        self.checkpoint_index
    }

    pub fn current_checkpoint(&self) -> Option<&Checkpoint> {
        self.checkpoints.get(self.checkpoint_index)
    }

    pub fn wait_bar_counter(&self) -> u32 {
        self.wait_bar_counter
    }

    pub fn battle_bar_counter(&self) -> u32 {
        self.battle_bar_counter
    }

    /// External trigger: traversal reached the current checkpoint.
    /// Ignored outside Moving (no queuing, no re-entry).
    pub fn reached_checkpoint(&mut self, out: &mut Vec<FlowOutput>) {
        if self.complete || self.state != GameplayState::Moving {
            return;
        }
        let Some(checkpoint) = self.current_checkpoint().copied() else {
            return;
        };
        if checkpoint.is_battle_point {
            self.wait_bar_counter = checkpoint.pre_battle_wait_bars;
            self.set_state(GameplayState::WaitingForBattle, out);
            log::info!("battle checkpoint reached, waiting {} bars", self.wait_bar_counter);
        } else {
            self.advance_checkpoint(out);
        }
    }

    /// External trigger: the enemy went down. Ends the battle on the tick
    /// it is observed; ignored outside Battle.
    pub fn enemy_defeated(&mut self, out: &mut Vec<FlowOutput>) {
        if self.complete || self.state != GameplayState::Battle {
            return;
        }
        self.end_battle(out);
    }

    /// Bar-boundary edge from the clock. The only place counters move.
    pub fn on_bar_crossed(&mut self, out: &mut Vec<FlowOutput>) {
        if self.complete {
            return;
        }
        match self.state {
            GameplayState::Moving => {}
            GameplayState::WaitingForBattle => {
                self.wait_bar_counter = self.wait_bar_counter.saturating_sub(1);
                log::debug!("pre-battle wait: {} bars left", self.wait_bar_counter);
                if self.wait_bar_counter == 0 {
                    self.begin_battle(out);
                }
            }
            GameplayState::Battle => {
                self.battle_bar_counter = self.battle_bar_counter.saturating_sub(1);
                log::debug!("battle: {} bars left", self.battle_bar_counter);
                if self.battle_bar_counter == 0 {
                    self.end_battle(out);
                }
            }
            GameplayState::WaitingAfterBattle => {
                self.wait_bar_counter = self.wait_bar_counter.saturating_sub(1);
                if self.wait_bar_counter == 0 {
                    self.advance_checkpoint(out);
                    if !self.complete {
                        self.set_state(GameplayState::Moving, out);
                    }
                }
            }
        }
    }

    fn begin_battle(&mut self, out: &mut Vec<FlowOutput>) {
        let duration =
            self.current_checkpoint().map(|c| c.battle_duration_bars).unwrap_or_default();
        self.battle_bar_counter = duration;
        self.set_state(GameplayState::Battle, out);
        out.push(FlowOutput::CombatTurn(true));
        log::info!("battle started for {} bars", duration);
    }

    fn end_battle(&mut self, out: &mut Vec<FlowOutput>) {
        self.wait_bar_counter =
            self.current_checkpoint().map(|c| c.post_battle_wait_bars).unwrap_or_default();
        self.set_state(GameplayState::WaitingAfterBattle, out);
        out.push(FlowOutput::CombatTurn(false));
        log::info!("battle ended, waiting {} bars", self.wait_bar_counter);
    }

    fn advance_checkpoint(&mut self, out: &mut Vec<FlowOutput>) {
        self.checkpoint_index += 1;
        if self.checkpoint_index >= self.checkpoints.len() {
            self.complete = true;
            out.push(FlowOutput::CourseCompleted);
            log::info!("course complete");
        } else {
            out.push(FlowOutput::CheckpointAdvanced(self.checkpoint_index));
            log::info!("advancing to checkpoint {}", self.checkpoint_index);
        }
    }

    fn set_state(&mut self, state: GameplayState, out: &mut Vec<FlowOutput>) {
        if self.state != state {
            self.state = state;
            out.push(FlowOutput::StateChanged(state));
        }
    }
}
