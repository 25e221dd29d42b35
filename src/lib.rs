pub mod model;
pub mod persistence;
pub mod utils;

pub use model::{
    config::EngineConfig,
    error::{EngineError, PersistenceError},
    ranking::{RankingSnapshot, SnapshotEntry},
    session::{EntityStats, RankSession, SessionState},
    structures::{
        comparison::{ComparisonGroup, GroupSize, OutcomeRecord},
        entity::{CatalogFilter, EntityAttributes, EntityCatalog, EntityId, InMemoryCatalog},
        rating_record::RatingRecord,
        refinement::{RefinementReason, RefinementTask},
        selection_strategy::SelectionStrategy,
        tier::TierId
    }
};
pub use persistence::{FlushScheduler, JsonFileBackend, PersistenceBackend, SessionSnapshot};
