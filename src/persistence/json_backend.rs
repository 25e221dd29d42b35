use std::{fs, path::PathBuf};

use serde::{de::DeserializeOwned, Serialize};

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
    persistence::backend::PersistenceBackend
};

const RATINGS_FILE: &str = "ratings.json";
const HISTORY_FILE: &str = "history.json";
const REFINEMENTS_FILE: &str = "refinements.json";
const FREEZES_FILE: &str = "freezes.json";

/// File-per-state-family JSON backend. Writes go through a temp file and
/// rename so a crash mid-flush never leaves a truncated state file.
pub struct JsonFileBackend {
    dir: PathBuf
}

impl JsonFileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Result<JsonFileBackend, PersistenceError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(JsonFileBackend { dir })
    }

    fn write<T: Serialize>(&self, file: &str, value: &T) -> Result<(), PersistenceError> {
        let path = self.dir.join(file);
        let tmp = self.dir.join(format!("{file}.tmp"));

        fs::write(&tmp, serde_json::to_vec(value)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn read<T: DeserializeOwned>(&self, file: &str) -> Result<Option<T>, PersistenceError> {
        let path = self.dir.join(file);
        if !path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

impl PersistenceBackend for JsonFileBackend {
    fn save_ratings(&self, ratings: &[(EntityId, RatingRecord)]) -> Result<(), PersistenceError> {
        self.write(RATINGS_FILE, &ratings)
    }

    fn load_ratings(&self) -> Result<Option<Vec<(EntityId, RatingRecord)>>, PersistenceError> {
        self.read(RATINGS_FILE)
    }

    fn save_history(&self, history: &[OutcomeRecord]) -> Result<(), PersistenceError> {
        self.write(HISTORY_FILE, &history)
    }

    fn load_history(&self) -> Result<Option<Vec<OutcomeRecord>>, PersistenceError> {
        self.read(HISTORY_FILE)
    }

    fn save_refinements(&self, tasks: &[RefinementTask]) -> Result<(), PersistenceError> {
        self.write(REFINEMENTS_FILE, &tasks)
    }

    fn load_refinements(&self) -> Result<Option<Vec<RefinementTask>>, PersistenceError> {
        self.read(REFINEMENTS_FILE)
    }

    fn save_freezes(&self, freezes: &[(EntityId, TierId)]) -> Result<(), PersistenceError> {
        self.write(FREEZES_FILE, &freezes)
    }

    fn load_freezes(&self) -> Result<Option<Vec<(EntityId, TierId)>>, PersistenceError> {
        self.read(FREEZES_FILE)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use crate::{
        model::structures::{
            rating_record::RatingRecord,
            refinement::{RefinementReason, RefinementTask},
            tier::TierId
        },
        persistence::{backend::PersistenceBackend, json_backend::JsonFileBackend, snapshot::SessionSnapshot}
    };

    #[test]
    fn test_load_without_prior_state() {
        let dir = tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path()).unwrap();

        assert!(backend.load_session().unwrap().is_none());
    }

    #[test]
    fn test_session_round_trip() {
        let dir = tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path()).unwrap();

        let snapshot = SessionSnapshot {
            ratings: vec![(
                1,
                RatingRecord {
                    mean: 27.2,
                    uncertainty: 6.1,
                    comparisons: 4
                }
            )],
            history: vec![],
            refinements: vec![RefinementTask::new(1, 2, RefinementReason::ManualReorder)],
            freezes: vec![(9, TierId(40))],
            total_comparisons: 0
        };

        backend.save_session(&snapshot).unwrap();
        let loaded = backend.load_session().unwrap().unwrap();

        assert_eq!(loaded.ratings.len(), 1);
        assert_eq!(loaded.ratings[0].0, 1);
        assert_eq!(loaded.refinements, snapshot.refinements);
        assert_eq!(loaded.freezes, vec![(9, TierId(40))]);
    }

    #[test]
    fn test_total_comparisons_derived_from_history() {
        use chrono::Utc;
        use uuid::Uuid;

        use crate::model::structures::comparison::OutcomeRecord;

        let dir = tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path()).unwrap();

        let record = |index: u32| OutcomeRecord {
            id: Uuid::new_v4(),
            comparison_index: index,
            group: vec![1, 2],
            winner_id: 1,
            loser_id: 2,
            winner_before: RatingRecord::prior(25.0, 8.0),
            winner_after: RatingRecord::prior(25.0, 8.0),
            loser_before: RatingRecord::prior(25.0, 8.0),
            loser_after: RatingRecord::prior(25.0, 8.0),
            applied: true,
            timestamp: Utc::now().fixed_offset()
        };

        let snapshot = SessionSnapshot {
            ratings: vec![(1, RatingRecord::prior(25.0, 8.0))],
            history: vec![record(0), record(1), record(2)],
            refinements: vec![],
            freezes: vec![],
            total_comparisons: 3
        };

        backend.save_session(&snapshot).unwrap();
        let loaded = backend.load_session().unwrap().unwrap();

        assert_eq!(loaded.total_comparisons, 3);
    }
}
