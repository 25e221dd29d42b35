use std::{
    collections::{HashSet, VecDeque},
    hash::Hash
};

use crate::model::structures::{comparison::PairKey, entity::EntityId};

/// Bounded FIFO set: eviction follows insertion order, and re-remembering a
/// present key does not refresh its position.
struct RecencySet<T: Copy + Eq + Hash> {
    order: VecDeque<T>,
    members: HashSet<T>,
    capacity: usize
}

impl<T: Copy + Eq + Hash> RecencySet<T> {
    fn new(capacity: usize) -> RecencySet<T> {
        RecencySet {
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
            capacity
        }
    }

    fn remember(&mut self, value: T) {
        if !self.members.insert(value) {
            return;
        }

        self.order.push_back(value);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
    }

    fn contains(&self, value: &T) -> bool {
        self.members.contains(value)
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    /// Drops the oldest half. Used when the recency filter starves the
    /// candidate pool.
    fn relax(&mut self) {
        let keep = self.order.len() / 2;
        while self.order.len() > keep {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
    }

    fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }
}

/// Recency memory used to bias selection away from repeats: a bounded set of
/// recently seen individual entities and one of recently issued pairs.
pub struct AntiRepeatMemory {
    entities: RecencySet<EntityId>,
    pairs: RecencySet<PairKey>
}

impl AntiRepeatMemory {
    pub fn new(entity_capacity: usize, pair_capacity: usize) -> AntiRepeatMemory {
        AntiRepeatMemory {
            entities: RecencySet::new(entity_capacity),
            pairs: RecencySet::new(pair_capacity)
        }
    }

    pub fn remember_entity(&mut self, id: EntityId) {
        self.entities.remember(id);
    }

    pub fn remember_pair(&mut self, key: PairKey) {
        self.pairs.remember(key);
    }

    pub fn is_recent_entity(&self, id: EntityId) -> bool {
        self.entities.contains(&id)
    }

    pub fn is_recent_pair(&self, key: PairKey) -> bool {
        self.pairs.contains(&key)
    }

    pub fn recent_entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Progressive relaxation for the random fallback: first call halves
    /// the entity set, letting older entries through.
    pub fn relax_entities(&mut self) {
        self.entities.relax();
    }

    pub fn clear_entities(&mut self) {
        self.entities.clear();
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.pairs.clear();
    }
}
