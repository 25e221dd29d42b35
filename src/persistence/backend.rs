use crate::{
    model::{
        error::PersistenceError,
        structures::{
            comparison::OutcomeRecord,
            entity::EntityId,
            rating_record::RatingRecord,
            refinement::RefinementTask,
            tier::TierId
        }
    },
    persistence::snapshot::SessionSnapshot
};

/// Durable storage collaborator supplied by the host. Implementations must
/// be safe to call frequently and idempotently; the engine treats the
/// backend as eventually consistent and never awaits it on the foreground
/// path.
///
/// Each state family has its own save/load pair; `save_session` /
/// `load_session` are the bundled forms the flush scheduler uses.
pub trait PersistenceBackend: Send + Sync {
    fn save_ratings(&self, ratings: &[(EntityId, RatingRecord)]) -> Result<(), PersistenceError>;
    fn load_ratings(&self) -> Result<Option<Vec<(EntityId, RatingRecord)>>, PersistenceError>;

    fn save_history(&self, history: &[OutcomeRecord]) -> Result<(), PersistenceError>;
    fn load_history(&self) -> Result<Option<Vec<OutcomeRecord>>, PersistenceError>;

    fn save_refinements(&self, tasks: &[RefinementTask]) -> Result<(), PersistenceError>;
    fn load_refinements(&self) -> Result<Option<Vec<RefinementTask>>, PersistenceError>;

    fn save_freezes(&self, freezes: &[(EntityId, TierId)]) -> Result<(), PersistenceError>;
    fn load_freezes(&self) -> Result<Option<Vec<(EntityId, TierId)>>, PersistenceError>;

    fn save_session(&self, snapshot: &SessionSnapshot) -> Result<(), PersistenceError> {
        self.save_ratings(&snapshot.ratings)?;
        self.save_history(&snapshot.history)?;
        self.save_refinements(&snapshot.refinements)?;
        self.save_freezes(&snapshot.freezes)
    }

    /// None when no prior state exists. A missing ratings map means a
    /// fresh session; the other families default to empty.
    fn load_session(&self) -> Result<Option<SessionSnapshot>, PersistenceError> {
        let Some(ratings) = self.load_ratings()? else {
            return Ok(None);
        };

        let history = self.load_history()?.unwrap_or_default();
        let refinements = self.load_refinements()?.unwrap_or_default();
        let freezes = self.load_freezes()?.unwrap_or_default();

        // The comparison counter is derived from the history rather than
        // stored: rows expanded from one group share an index.
        let total_comparisons = history.iter().map(|r| r.comparison_index + 1).max().unwrap_or(0);

        Ok(Some(SessionSnapshot {
            ratings,
            history,
            refinements,
            freezes,
            total_comparisons
        }))
    }
}
