use indexmap::IndexMap;

use crate::model::structures::{entity::EntityId, rating_record::RatingRecord};

/// Single source of truth for skill ratings. Reads never fail: an absent
/// entity reads as the configured prior. Writes are total overwrites and
/// come only from the outcome processor (and undo, which replays history).
///
/// Every mutation marks the store dirty; the session drains the flag to
/// schedule a debounced background flush. In-memory state stays
/// authoritative for the running session regardless of flush outcomes.
pub struct RatingStore {
    records: IndexMap<EntityId, RatingRecord>,
    prior_mean: f64,
    prior_uncertainty: f64,
    dirty: bool
}

impl RatingStore {
    pub fn new(prior_mean: f64, prior_uncertainty: f64) -> RatingStore {
        RatingStore {
            records: IndexMap::new(),
            prior_mean,
            prior_uncertainty,
            dirty: false
        }
    }

    /// Restores a store from persisted records.
    pub fn from_records(
        prior_mean: f64,
        prior_uncertainty: f64,
        records: IndexMap<EntityId, RatingRecord>
    ) -> RatingStore {
        RatingStore {
            records,
            prior_mean,
            prior_uncertainty,
            dirty: false
        }
    }

    /// Current rating, or the default prior when the entity has never been
    /// compared. Never errors.
    pub fn get(&self, id: EntityId) -> RatingRecord {
        self.records
            .get(&id)
            .copied()
            .unwrap_or_else(|| RatingRecord::prior(self.prior_mean, self.prior_uncertainty))
    }

    pub fn set(&mut self, id: EntityId, record: RatingRecord) {
        self.records.insert(id, record);
        self.dirty = true;
    }

    pub fn is_rated(&self, id: EntityId) -> bool {
        self.records.get(&id).map(|r| r.is_rated()).unwrap_or(false)
    }

    pub fn rated_count(&self) -> usize {
        self.records.values().filter(|r| r.is_rated()).count()
    }

    pub fn all(&self) -> &IndexMap<EntityId, RatingRecord> {
        &self.records
    }

    /// Resets every record to the default prior. Only the explicit
    /// full-reset path calls this.
    pub fn clear_all(&mut self) {
        self.records.clear();
        self.dirty = true;
    }

    /// True if a mutation happened since the last `take_dirty`. Clears the
    /// flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_absent_reads_as_prior() {
        let store = RatingStore::new(25.0, 8.0);
        let record = store.get(42);

        assert_abs_diff_eq!(record.mean, 25.0);
        assert_abs_diff_eq!(record.uncertainty, 8.0);
        assert_eq!(record.comparisons, 0);
        assert!(!store.is_rated(42));
    }

    #[test]
    fn test_set_then_get() {
        let mut store = RatingStore::new(25.0, 8.0);
        store.set(
            7,
            RatingRecord {
                mean: 28.5,
                uncertainty: 6.0,
                comparisons: 3
            }
        );

        let record = store.get(7);
        assert_abs_diff_eq!(record.mean, 28.5);
        assert_eq!(record.comparisons, 3);
        assert!(store.is_rated(7));
        assert_eq!(store.rated_count(), 1);
    }

    #[test]
    fn test_clear_all_returns_to_prior() {
        let mut store = RatingStore::new(25.0, 8.0);
        store.set(
            7,
            RatingRecord {
                mean: 30.0,
                uncertainty: 5.0,
                comparisons: 10
            }
        );
        store.clear_all();

        assert_abs_diff_eq!(store.get(7).mean, 25.0);
        assert_eq!(store.rated_count(), 0);
    }

    #[test]
    fn test_dirty_flag() {
        let mut store = RatingStore::new(25.0, 8.0);
        assert!(!store.take_dirty());

        store.set(1, RatingRecord::prior(25.0, 8.0));
        assert!(store.take_dirty());
        assert!(!store.take_dirty());
    }
}
