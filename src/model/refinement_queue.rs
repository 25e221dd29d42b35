use std::collections::{HashSet, VecDeque};

use indexmap::IndexSet;
use tracing::debug;

use crate::model::structures::{
    comparison::PairKey,
    entity::EntityId,
    refinement::{RefinementReason, RefinementTask}
};

/// FIFO queue of explicitly requested comparisons with a queue-wide
/// unordered-pair duplicate check: {A,B} is rejected while {B,A} is queued
/// anywhere, not just at the tail.
pub struct RefinementQueue {
    tasks: VecDeque<RefinementTask>,
    queued_pairs: HashSet<PairKey>
}

impl Default for RefinementQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RefinementQueue {
    pub fn new() -> RefinementQueue {
        RefinementQueue {
            tasks: VecDeque::new(),
            queued_pairs: HashSet::new()
        }
    }

    pub fn from_tasks(tasks: Vec<RefinementTask>) -> RefinementQueue {
        let mut queue = RefinementQueue::new();
        for task in tasks {
            queue.enqueue(task.primary, task.opponent, task.reason);
        }
        queue
    }

    /// No-op when the pair is degenerate or already queued in either order.
    pub fn enqueue(&mut self, primary: EntityId, opponent: EntityId, reason: RefinementReason) {
        if primary == opponent {
            return;
        }

        let key = PairKey::new(primary, opponent);
        if !self.queued_pairs.insert(key) {
            debug!("refinement for pair {:?} already queued, skipping", key);
            return;
        }

        self.tasks.push_back(RefinementTask::new(primary, opponent, reason));
    }

    /// Enqueues the comparisons that validate a manual reorder: the moved
    /// entity against each of its new positional neighbors.
    pub fn enqueue_reorder_validation(&mut self, moved: EntityId, neighbors: &[EntityId]) {
        for &neighbor in neighbors {
            self.enqueue(moved, neighbor, RefinementReason::ManualReorder);
        }
    }

    /// FIFO head whose ids both resolve in the live population. Tasks with
    /// a stale id are dropped on the spot and the next head is considered,
    /// rather than surfacing an error.
    pub fn peek_resolved(&mut self, population: &IndexSet<EntityId>) -> Option<RefinementTask> {
        while let Some(head) = self.tasks.front() {
            if population.contains(&head.primary) && population.contains(&head.opponent) {
                return Some(head.clone());
            }

            let dropped = self.tasks.pop_front().unwrap();
            self.queued_pairs.remove(&dropped.pair_key());
            debug!(
                "dropping refinement task {:?}: id no longer resolves in population",
                dropped
            );
        }

        None
    }

    /// Removes the head. Called only after the corresponding comparison has
    /// been recorded, so an abandoned selection leaves the task queued.
    pub fn pop(&mut self) -> Option<RefinementTask> {
        let task = self.tasks.pop_front();
        if let Some(task) = &task {
            self.queued_pairs.remove(&task.pair_key());
        }
        task
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
        self.queued_pairs.clear();
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &RefinementTask> {
        self.tasks.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn population(ids: &[EntityId]) -> IndexSet<EntityId> {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_unordered_duplicate_rejected() {
        let mut queue = RefinementQueue::new();
        queue.enqueue(1, 2, RefinementReason::ManualReorder);
        queue.enqueue(2, 1, RefinementReason::CompareNow);

        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_duplicate_check_is_queue_wide() {
        let mut queue = RefinementQueue::new();
        queue.enqueue(1, 2, RefinementReason::ManualReorder);
        queue.enqueue(3, 4, RefinementReason::ManualReorder);
        queue.enqueue(2, 1, RefinementReason::ManualReorder);

        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_self_pair_rejected() {
        let mut queue = RefinementQueue::new();
        queue.enqueue(1, 1, RefinementReason::CompareNow);

        assert!(queue.is_empty());
    }

    #[test]
    fn test_peek_drops_stale_tasks() {
        let mut queue = RefinementQueue::new();
        queue.enqueue(1, 99, RefinementReason::ManualReorder);
        queue.enqueue(98, 97, RefinementReason::ManualReorder);
        queue.enqueue(3, 4, RefinementReason::CompareNow);

        let head = queue.peek_resolved(&population(&[1, 2, 3, 4])).unwrap();

        assert_eq!(head.primary, 3);
        assert_eq!(head.opponent, 4);
        // The two stale tasks were dropped, the resolved head stays queued
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_peek_does_not_pop() {
        let mut queue = RefinementQueue::new();
        queue.enqueue(1, 2, RefinementReason::ManualReorder);

        let pop_target = queue.peek_resolved(&population(&[1, 2])).unwrap();
        assert_eq!(queue.len(), 1);

        let popped = queue.pop().unwrap();
        assert_eq!(popped, pop_target);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_allows_requeue() {
        let mut queue = RefinementQueue::new();
        queue.enqueue(1, 2, RefinementReason::ManualReorder);
        queue.pop();
        queue.enqueue(2, 1, RefinementReason::ManualReorder);

        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_reorder_validation_enqueues_neighbors() {
        let mut queue = RefinementQueue::new();
        queue.enqueue_reorder_validation(5, &[4, 6]);

        assert_eq!(queue.len(), 2);
        let tasks: Vec<_> = queue.tasks().cloned().collect();
        assert_eq!(tasks[0].primary, 5);
        assert_eq!(tasks[0].opponent, 4);
        assert_eq!(tasks[1].opponent, 6);
        assert!(tasks.iter().all(|t| t.reason == RefinementReason::ManualReorder));
    }
}
