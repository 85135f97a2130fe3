//! Tick-keyed deferred effects tagged with the scene generation.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use tracing::trace;

use crate::machine::TimerKey;
use crate::{SceneGeneration, Tick};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Entry {
    due: Tick,
    seq: u64,
    generation: SceneGeneration,
    key: TimerKey,
}

/// Min-heap of pending timers. Entries fire in `(due, insertion)` order and
/// are only delivered to the generation that scheduled them.
#[derive(Debug, Default)]
pub struct Scheduler {
    queue: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending entries, stale ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Schedule `key` to fire at `due` for `generation`.
    pub fn schedule(&mut self, due: Tick, generation: SceneGeneration, key: TimerKey) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse(Entry {
            due,
            seq,
            generation,
            key,
        }));
    }

    /// Drop every pending entry for `key` in `generation`.
    pub fn cancel(&mut self, generation: SceneGeneration, key: TimerKey) -> usize {
        let before = self.queue.len();
        self.queue
            .retain(|Reverse(entry)| !(entry.generation == generation && entry.key == key));
        before - self.queue.len()
    }

    /// Drop everything scheduled by `generation`.
    pub fn cancel_generation(&mut self, generation: SceneGeneration) -> usize {
        let before = self.queue.len();
        self.queue
            .retain(|Reverse(entry)| entry.generation != generation);
        before - self.queue.len()
    }

    /// Pop every entry due at or before `now`. Entries from any generation
    /// other than `current` are discarded without being returned.
    pub fn drain_due(&mut self, now: Tick, current: SceneGeneration) -> Vec<TimerKey> {
        let mut fired = Vec::new();
        while let Some(Reverse(entry)) = self.queue.peek() {
            if entry.due > now {
                break;
            }
            let Some(Reverse(entry)) = self.queue.pop() else {
                break;
            };
            if entry.generation == current {
                fired.push(entry.key);
            } else {
                trace!(
                    stale = entry.generation.0,
                    current = current.0,
                    due = entry.due.0,
                    "dropping stale timer"
                );
            }
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntitySeed, EntityStore, Role};
    use glam::Vec3;

    fn keys(count: usize) -> Vec<TimerKey> {
        let mut store = EntityStore::new();
        store
            .create_all((0..count).map(|_| EntitySeed::new(Vec3::ZERO, Role::Free)))
            .into_iter()
            .map(TimerKey::Revert)
            .collect()
    }

    #[test]
    fn fires_in_due_then_insertion_order() {
        let keys = keys(3);
        let mut scheduler = Scheduler::new();
        let generation = SceneGeneration(1);
        scheduler.schedule(Tick(5), generation, keys[0]);
        scheduler.schedule(Tick(3), generation, keys[1]);
        scheduler.schedule(Tick(5), generation, keys[2]);

        assert!(scheduler.drain_due(Tick(2), generation).is_empty());
        assert_eq!(scheduler.drain_due(Tick(3), generation), vec![keys[1]]);
        assert_eq!(
            scheduler.drain_due(Tick(10), generation),
            vec![keys[0], keys[2]]
        );
        assert!(scheduler.is_empty());
    }

    #[test]
    fn stale_generations_are_dropped_silently() {
        let keys = keys(2);
        let mut scheduler = Scheduler::new();
        scheduler.schedule(Tick(1), SceneGeneration(1), keys[0]);
        scheduler.schedule(Tick(1), SceneGeneration(2), keys[1]);
        assert_eq!(scheduler.drain_due(Tick(1), SceneGeneration(2)), vec![keys[1]]);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn cancel_targets_key_and_generation() {
        let keys = keys(2);
        let mut scheduler = Scheduler::new();
        scheduler.schedule(Tick(4), SceneGeneration(1), keys[0]);
        scheduler.schedule(Tick(4), SceneGeneration(1), keys[1]);
        scheduler.schedule(Tick(4), SceneGeneration(2), keys[0]);
        assert_eq!(scheduler.cancel(SceneGeneration(1), keys[0]), 1);
        assert_eq!(scheduler.len(), 2);
        assert_eq!(scheduler.cancel_generation(SceneGeneration(1)), 1);
        assert_eq!(scheduler.drain_due(Tick(4), SceneGeneration(2)), vec![keys[0]]);
    }
}
