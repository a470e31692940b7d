//! FIFO queue of motion effects.

use super::effects::{Effect, EffectContext};
use std::collections::VecDeque;

/// Ordered queue of effects owned by one entity.
///
/// Each tick the head effect runs. An effect that reports itself active stays
/// at the head; a finished effect is popped and the next head runs in the
/// same tick, until one stays active or the queue is empty.
#[derive(Debug, Clone, Default)]
pub struct EffectPipeline {
    effects: VecDeque<Effect>,
}

impl EffectPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, effect: Effect) {
        self.effects.push_back(effect);
    }

    pub fn add_to_top(&mut self, effect: Effect) {
        self.effects.push_front(effect);
    }

    /// Remove every queued instance of `effect`.
    pub fn remove(&mut self, effect: Effect) {
        self.effects.retain(|queued| *queued != effect);
    }

    /// Discard every queued effect.
    pub fn reset(&mut self) {
        self.effects.clear();
    }

    /// Run one effect immediately without queueing it.
    pub fn execute(&self, effect: Effect, ctx: &mut EffectContext<'_>) -> bool {
        effect.apply(ctx)
    }

    /// Advance the queue by one tick. Returns true if an effect is still active.
    pub fn update(&mut self, ctx: &mut EffectContext<'_>) -> bool {
        while let Some(&effect) = self.effects.front() {
            if effect.apply(ctx) {
                return true;
            }
            self.effects.pop_front();
        }
        false
    }

    pub fn head(&self) -> Option<Effect> {
        self.effects.front().copied()
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Effect> {
        self.effects.iter()
    }

    /// Whether anything other than perpetual cosmetic effects is queued.
    pub fn has_pending_motion(&self) -> bool {
        self.effects.iter().any(|e| !e.is_perpetual())
    }
}
