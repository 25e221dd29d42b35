use std::collections::HashMap;

use indexmap::IndexSet;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::model::{
    config::EngineConfig,
    freeze_board::FreezeBoard,
    matchmaker::SelectionContext,
    rating_store::RatingStore,
    recency::AntiRepeatMemory,
    refinement_queue::RefinementQueue,
    session::RankSession,
    structures::entity::{CatalogFilter, EntityAttributes, EntityId, InMemoryCatalog}
};

/// Catalog of `size` entities with ids 1..=size and generated names.
pub fn generate_catalog(size: usize) -> InMemoryCatalog {
    let mut entries = HashMap::new();
    for id in 1..=size as EntityId {
        entries.insert(
            id,
            EntityAttributes {
                name: format!("entity-{id}"),
                category: None
            }
        );
    }

    InMemoryCatalog::new(entries)
}

/// Fully wired session over a generated catalog with a seeded RNG.
pub fn generate_session(population: usize, seed: u64) -> RankSession<ChaCha8Rng> {
    RankSession::new(
        EngineConfig::default(),
        Box::new(generate_catalog(population)),
        CatalogFilter::all(),
        ChaCha8Rng::seed_from_u64(seed)
    )
    .expect("test session construction failed")
}

/// The read-only inputs to a selection, grouped so tests can borrow them
/// as one field while mutating recency and queue through the others.
pub struct EngineParts {
    pub config: EngineConfig,
    pub population: IndexSet<EntityId>,
    pub store: RatingStore,
    pub freeze_board: FreezeBoard
}

impl EngineParts {
    pub fn context(&self) -> SelectionContext<'_> {
        SelectionContext {
            population: &self.population,
            store: &self.store,
            freeze_board: &self.freeze_board,
            active_tier: self.config.initial_tier,
            config: &self.config
        }
    }
}

/// Disassembled engine state for matchmaker-level tests.
pub struct SessionParts {
    pub core: EngineParts,
    pub recency: AntiRepeatMemory,
    pub queue: RefinementQueue
}

impl SessionParts {
    pub fn fresh(population: usize) -> SessionParts {
        let config = EngineConfig::default();
        let ids: IndexSet<EntityId> = (1..=population as EntityId).collect();
        let store = RatingStore::new(config.initial_mean, config.initial_uncertainty);
        let recency = AntiRepeatMemory::new(config.effective_entity_cap(population), config.recent_pair_cap);

        SessionParts {
            core: EngineParts {
                config,
                population: ids,
                store,
                freeze_board: FreezeBoard::new()
            },
            recency,
            queue: RefinementQueue::new()
        }
    }
}
