use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

use crate::model::structures::{
    comparison::PairKey,
    entity::EntityId
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumIter)]
pub enum RefinementReason {
    /// Enqueued to validate a manual reorder against the rating model.
    ManualReorder,
    /// Host asked for this pair to be compared immediately.
    CompareNow
}

/// An explicitly requested comparison, queued outside normal strategy
/// selection. Destroyed only after the resulting comparison is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementTask {
    pub primary: EntityId,
    pub opponent: EntityId,
    pub reason: RefinementReason
}

impl RefinementTask {
    pub fn new(primary: EntityId, opponent: EntityId, reason: RefinementReason) -> RefinementTask {
        RefinementTask {
            primary,
            opponent,
            reason
        }
    }

    /// Identity used for queue-wide dedup: {A,B} duplicates {B,A}.
    pub fn pair_key(&self) -> PairKey {
        PairKey::new(self.primary, self.opponent)
    }
}
