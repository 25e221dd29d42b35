use serde::{Deserialize, Serialize};

use crate::model::structures::{
    comparison::OutcomeRecord,
    entity::EntityId,
    rating_record::RatingRecord,
    refinement::RefinementTask,
    tier::TierId
};

/// Everything a session persists, in one serializable unit: the rating
/// map, the append-only history, the refinement queue in FIFO order and
/// the freeze flags. The in-memory session stays authoritative; this is
/// only the durable mirror.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionSnapshot {
    pub ratings: Vec<(EntityId, RatingRecord)>,
    pub history: Vec<OutcomeRecord>,
    pub refinements: Vec<RefinementTask>,
    pub freezes: Vec<(EntityId, TierId)>,
    pub total_comparisons: u32
}
