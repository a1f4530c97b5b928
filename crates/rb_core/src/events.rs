//! Event delivery.
//!
//! Components never call observers directly: everything funnels through an
//! [`EventQueue`] owned by the engine. Events are queued FIFO while a tick
//! runs and dispatched to subscribers after the tick completes, so
//! observers always see a consistent post-tick world. Subscribers are
//! passive; they get a shared reference and cannot feed anything back.

use std::collections::VecDeque;

use crate::flow::GameplayState;
use crate::judge::TimingResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combatant {
    Player,
    Enemy,
}

/// Everything the engine tells the outside world.
#[derive(Debug, Clone, PartialEq)]
pub enum EncounterEvent {
    BeatCrossed { beat: i64 },
    BarCrossed { bar: i64 },
    StateChanged { state: GameplayState },
    PhaseChanged { phase_index: usize },
    TelegraphStarted { step: usize, pattern: String },
    AttackFired { step: usize, pattern: String },
    TimingEvaluated { result: TimingResult },
    Damaged { target: Combatant, amount: i32 },
    Healed { target: Combatant, amount: i32 },
    Defeated { target: Combatant },
    ScoreChanged { score: i64, combo: u32 },
    CourseCompleted,
}

pub type SubscriberId = u64;

type Subscriber = Box<dyn FnMut(&EncounterEvent)>;

/// FIFO event queue with explicit subscription lifetimes.
///
/// Subscriptions live until `unsubscribe` is called or the queue is
/// dropped; they are not tied to any scene object.
#[derive(Default)]
pub struct EventQueue {
    pending: VecDeque<EncounterEvent>,
    subscribers: Vec<(SubscriberId, Subscriber)>,
    next_id: SubscriberId,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, event: EncounterEvent) {
        log::trace!("event queued: {:?}", event);
        self.pending.push_back(event);
    }

    pub fn subscribe(&mut self, subscriber: impl FnMut(&EncounterEvent) + 'static) -> SubscriberId {
        let id = self.next_id;
        self.next_id += 1;
        self.subscribers.push((id, Box::new(subscriber)));
        id
    }

    /// Returns false if the id was already gone.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub_id, _)| *sub_id != id);
        self.subscribers.len() != before
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Deliver every queued event to every subscriber, in queue order,
    /// subscribers in subscription order. Called once per tick by the
    /// driver, after all components have advanced. With no subscribers
    /// registered the queue is left untouched, so pull-style consumers can
    /// `drain` at their own pace instead.
    pub fn dispatch(&mut self) {
        if self.subscribers.is_empty() {
            return;
        }
        while let Some(event) = self.pending.pop_front() {
            for (_, subscriber) in &mut self.subscribers {
                subscriber(&event);
            }
        }
    }

    /// Drain queued events without notifying subscribers.
    pub fn drain(&mut self) -> Vec<EncounterEvent> {
        self.pending.drain(..).collect()
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("pending", &self.pending)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

/// Output sink for audio-style cues.
///
/// The engine only ever passes symbolic identifiers from the encounter
/// config; mapping them to actual media is the host's concern.
pub trait CueSink {
    fn play(&mut self, cue: &str);
}

/// Discards every cue. Default for headless runs and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCueSink;

impl CueSink for NullCueSink {
    fn play(&mut self, _cue: &str) {}
}
