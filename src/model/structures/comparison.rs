use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::structures::{entity::EntityId, rating_record::RatingRecord, selection_strategy::SelectionStrategy};

/// Arity of a comparison group. Encoding the only two legal sizes as an
/// enum keeps "group size 4" unrepresentable at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupSize {
    Pair,
    Triple
}

impl GroupSize {
    pub fn len(&self) -> usize {
        match self {
            GroupSize::Pair => 2,
            GroupSize::Triple => 3
        }
    }
}

/// Unordered entity pair, normalized so {a, b} and {b, a} collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PairKey(pub EntityId, pub EntityId);

impl PairKey {
    pub fn new(a: EntityId, b: EntityId) -> PairKey {
        if a <= b {
            PairKey(a, b)
        } else {
            PairKey(b, a)
        }
    }
}

/// The 2 or 3 entities presented together for one judgment. Transient:
/// issued once by the matchmaker, consumed once by the outcome processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonGroup {
    members: Vec<EntityId>
}

impl ComparisonGroup {
    /// Callers are expected to pass exactly `size.len()` distinct members;
    /// the matchmaker is the only producer.
    pub fn new(members: Vec<EntityId>) -> ComparisonGroup {
        ComparisonGroup { members }
    }

    pub fn members(&self) -> &[EntityId] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.members.contains(&id)
    }

    /// Every unordered pair in the group. A pair yields one key, a triple
    /// three.
    pub fn pair_keys(&self) -> Vec<PairKey> {
        let mut keys = Vec::new();
        for i in 0..self.members.len() {
            for j in (i + 1)..self.members.len() {
                keys.push(PairKey::new(self.members[i], self.members[j]));
            }
        }
        keys
    }

    /// Unordered set equality, used by the no-immediate-repeat invariant.
    pub fn same_members(&self, other: &ComparisonGroup) -> bool {
        if self.members.len() != other.members.len() {
            return false;
        }

        let mut a = self.members.clone();
        let mut b = other.members.clone();
        a.sort_unstable();
        b.sort_unstable();
        a == b
    }
}

/// A group together with how it was chosen. The strategy tag is surfaced to
/// the host for display and is required internally so a queue-sourced
/// selection can pop its task once the outcome is recorded.
#[derive(Debug, Clone)]
pub struct Selection {
    pub group: ComparisonGroup,
    pub strategy: SelectionStrategy
}

/// One resolved pairwise outcome, appended to the session history. Carries
/// full before/after snapshots for both sides so the log alone supports
/// undo, per-entity win/loss statistics and audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub id: Uuid,
    /// Index of the comparison this outcome belongs to; all pairwise rows
    /// expanded from one group share it.
    pub comparison_index: u32,
    pub group: Vec<EntityId>,
    pub winner_id: EntityId,
    pub loser_id: EntityId,
    pub winner_before: RatingRecord,
    pub winner_after: RatingRecord,
    pub loser_before: RatingRecord,
    pub loser_after: RatingRecord,
    /// False when the rating update was skipped as numerically degenerate;
    /// the row is still logged so the session can continue.
    pub applied: bool,
    pub timestamp: DateTime<FixedOffset>
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_key_normalized() {
        assert_eq!(PairKey::new(7, 3), PairKey::new(3, 7));
        assert_eq!(PairKey::new(3, 7), PairKey(3, 7));
    }

    #[test]
    fn test_pair_keys_of_triple() {
        let group = ComparisonGroup::new(vec![5, 1, 9]);
        let keys = group.pair_keys();

        assert_eq!(keys.len(), 3);
        assert!(keys.contains(&PairKey::new(1, 5)));
        assert!(keys.contains(&PairKey::new(5, 9)));
        assert!(keys.contains(&PairKey::new(1, 9)));
    }

    #[test]
    fn test_same_members_ignores_order() {
        let a = ComparisonGroup::new(vec![1, 2, 3]);
        let b = ComparisonGroup::new(vec![3, 1, 2]);
        let c = ComparisonGroup::new(vec![1, 2, 4]);

        assert!(a.same_members(&b));
        assert!(!a.same_members(&c));
    }
}
