use std::collections::HashSet;

use tracing::info;

use crate::model::structures::{entity::EntityId, tier::TierId};

/// Per-(entity, tier) freeze flags. A frozen entity is excluded from the
/// matchmaker's candidate pool while that tier is active. Flags are
/// monotonic: set by the freeze policy, cleared only by an explicit reset.
pub struct FreezeBoard {
    frozen: HashSet<(EntityId, TierId)>
}

impl Default for FreezeBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl FreezeBoard {
    pub fn new() -> FreezeBoard {
        FreezeBoard { frozen: HashSet::new() }
    }

    pub fn from_entries(entries: Vec<(EntityId, TierId)>) -> FreezeBoard {
        FreezeBoard {
            frozen: entries.into_iter().collect()
        }
    }

    pub fn freeze(&mut self, id: EntityId, tier: TierId) {
        if self.frozen.insert((id, tier)) {
            info!("entity {} frozen for {}", id, tier);
        }
    }

    pub fn is_frozen(&self, id: EntityId, tier: TierId) -> bool {
        self.frozen.contains(&(id, tier))
    }

    pub fn frozen_count(&self, tier: TierId) -> usize {
        self.frozen.iter().filter(|(_, t)| *t == tier).count()
    }

    pub fn entries(&self) -> impl Iterator<Item = &(EntityId, TierId)> {
        self.frozen.iter()
    }

    pub fn clear(&mut self) {
        self.frozen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freeze_is_tier_scoped() {
        let mut board = FreezeBoard::new();
        board.freeze(1, TierId(40));

        assert!(board.is_frozen(1, TierId(40)));
        assert!(!board.is_frozen(1, TierId(100)));
        assert!(!board.is_frozen(2, TierId(40)));
    }

    #[test]
    fn test_refreezing_is_idempotent() {
        let mut board = FreezeBoard::new();
        board.freeze(1, TierId(40));
        board.freeze(1, TierId(40));

        assert_eq!(board.frozen_count(TierId(40)), 1);
    }

    #[test]
    fn test_clear() {
        let mut board = FreezeBoard::new();
        board.freeze(1, TierId(40));
        board.clear();

        assert!(!board.is_frozen(1, TierId(40)));
    }
}
