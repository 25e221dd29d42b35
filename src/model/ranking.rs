use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::model::{
    config::EngineConfig,
    rating_store::RatingStore,
    structures::entity::{EntityCatalog, EntityId}
};

/// One row of a ranking snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub rank: u32,
    pub id: EntityId,
    pub name: String,
    pub mean: f64,
    pub uncertainty: f64,
    pub comparisons: u32,
    pub conservative_score: f64,
    pub confidence_percent: f64
}

/// Derived, never hand-mutated: a sorted view over every rated entity,
/// recomputed from the rating store on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingSnapshot {
    pub entries: Vec<SnapshotEntry>,
    pub total_comparisons: u32
}

/// Internal ranked row used by the matchmaker: id, conservative score,
/// uncertainty and mean, sorted exactly like the public snapshot.
#[derive(Debug, Clone, Copy)]
pub struct RankedEntity {
    pub id: EntityId,
    pub conservative_score: f64,
    pub mean: f64,
    pub uncertainty: f64,
    pub comparisons: u32
}

/// Every rated entity in descending conservative-score order. Ties break
/// toward lower uncertainty, then lower id, so the ordering is fully
/// deterministic.
pub fn ranked_entities(store: &RatingStore, config: &EngineConfig) -> Vec<RankedEntity> {
    let mut ranked: Vec<RankedEntity> = store
        .all()
        .iter()
        .filter(|(_, record)| record.is_rated())
        .map(|(id, record)| RankedEntity {
            id: *id,
            conservative_score: record.conservative_score(config.conservative_multiplier),
            mean: record.mean,
            uncertainty: record.uncertainty,
            comparisons: record.comparisons
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.conservative_score
            .partial_cmp(&a.conservative_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.uncertainty.partial_cmp(&b.uncertainty).unwrap_or(Ordering::Equal))
            .then_with(|| a.id.cmp(&b.id))
    });

    ranked
}

pub struct RankingGenerator;

impl RankingGenerator {
    /// Builds the public snapshot. Entities missing from the catalog are
    /// skipped, mirroring how stale refinement tasks are dropped. With
    /// `truncate_to_tier`, only the active tier's rows are returned.
    pub fn generate(
        store: &RatingStore,
        catalog: &dyn EntityCatalog,
        config: &EngineConfig,
        total_comparisons: u32,
        truncate_to: Option<usize>
    ) -> RankingSnapshot {
        let ranked = ranked_entities(store, config);

        let mut entries = Vec::with_capacity(ranked.len());
        for row in ranked {
            let Some(attributes) = catalog.lookup(row.id) else {
                continue;
            };

            entries.push(SnapshotEntry {
                rank: entries.len() as u32 + 1,
                id: row.id,
                name: attributes.name,
                mean: row.mean,
                uncertainty: row.uncertainty,
                comparisons: row.comparisons,
                conservative_score: row.conservative_score,
                confidence_percent: store.get(row.id).confidence_percent(config.initial_uncertainty)
            });

            if let Some(limit) = truncate_to {
                if entries.len() >= limit {
                    break;
                }
            }
        }

        RankingSnapshot {
            entries,
            total_comparisons
        }
    }
}

/// Detects battle-count milestones: an explicit configured sequence, then a
/// fixed interval beyond its last element.
pub struct MilestoneDetector {
    milestones: Vec<u32>,
    interval_beyond: u32
}

impl MilestoneDetector {
    pub fn new(config: &EngineConfig) -> MilestoneDetector {
        MilestoneDetector {
            milestones: config.milestones.clone(),
            interval_beyond: config.milestone_interval_beyond
        }
    }

    pub fn is_milestone(&self, total_comparisons: u32) -> bool {
        if total_comparisons == 0 {
            return false;
        }

        if self.milestones.binary_search(&total_comparisons).is_ok() {
            return true;
        }

        // The sequence is validated non-empty at construction
        let last = *self.milestones.last().unwrap();
        total_comparisons > last && (total_comparisons - last) % self.interval_beyond == 0
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use crate::{
        model::{
            config::EngineConfig,
            ranking::{ranked_entities, MilestoneDetector, RankingGenerator},
            rating_store::RatingStore,
            structures::rating_record::RatingRecord
        },
        utils::test_utils::generate_catalog
    };

    fn store_with(records: &[(i32, f64, f64, u32)]) -> RatingStore {
        let mut store = RatingStore::new(25.0, 25.0 / 3.0);
        for &(id, mean, uncertainty, comparisons) in records {
            store.set(
                id,
                RatingRecord {
                    mean,
                    uncertainty,
                    comparisons
                }
            );
        }
        store
    }

    #[test]
    fn test_ranked_descending_by_conservative_score() {
        let store = store_with(&[(1, 30.0, 2.0, 5), (2, 20.0, 1.0, 5), (3, 35.0, 1.0, 5)]);
        let config = EngineConfig::default();

        let ranked = ranked_entities(&store, &config);
        let ids: Vec<i32> = ranked.iter().map(|r| r.id).collect();

        // conservative: 3 -> 32, 1 -> 24, 2 -> 17
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn test_ties_break_by_uncertainty_then_id() {
        // Both have conservative score 10; entity 4 is more certain
        let store = store_with(&[(2, 16.0, 2.0, 5), (4, 13.0, 1.0, 5), (9, 13.0, 1.0, 5)]);
        let config = EngineConfig::default();

        let ranked = ranked_entities(&store, &config);
        let ids: Vec<i32> = ranked.iter().map(|r| r.id).collect();

        assert_eq!(ids, vec![4, 9, 2]);
    }

    #[test]
    fn test_unrated_excluded() {
        let store = store_with(&[(1, 25.0, 8.0, 0), (2, 25.0, 8.0, 3)]);
        let config = EngineConfig::default();

        let ranked = ranked_entities(&store, &config);

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, 2);
    }

    #[test]
    fn test_snapshot_resolves_names_and_ranks() {
        let catalog = generate_catalog(10);
        let store = store_with(&[(1, 30.0, 2.0, 5), (2, 20.0, 2.0, 5)]);
        let config = EngineConfig::default();

        let snapshot = RankingGenerator::generate(&store, &catalog, &config, 5, None);

        assert_eq!(snapshot.entries.len(), 2);
        assert_eq!(snapshot.entries[0].rank, 1);
        assert_eq!(snapshot.entries[0].id, 1);
        assert_eq!(snapshot.entries[1].rank, 2);
        assert!(!snapshot.entries[0].name.is_empty());
        assert_eq!(snapshot.total_comparisons, 5);
    }

    #[test]
    fn test_snapshot_skips_uncataloged_entities() {
        let catalog = generate_catalog(2); // ids 1..=2
        let store = store_with(&[(1, 30.0, 2.0, 5), (77, 40.0, 2.0, 5)]);
        let config = EngineConfig::default();

        let snapshot = RankingGenerator::generate(&store, &catalog, &config, 5, None);

        assert_eq!(snapshot.entries.len(), 1);
        assert_eq!(snapshot.entries[0].id, 1);
    }

    #[test]
    fn test_snapshot_truncation() {
        let catalog = generate_catalog(10);
        let store = store_with(&[(1, 30.0, 2.0, 5), (2, 20.0, 2.0, 5), (3, 10.0, 2.0, 5)]);
        let config = EngineConfig::default();

        let snapshot = RankingGenerator::generate(&store, &catalog, &config, 5, Some(2));

        assert_eq!(snapshot.entries.len(), 2);
    }

    #[test]
    fn test_confidence_percent_in_snapshot() {
        let catalog = generate_catalog(2);
        let config = EngineConfig::default();
        // Uncertainty halved from the ceiling -> 50% confidence
        let store = store_with(&[(1, 20.0, config.initial_uncertainty / 2.0, 4)]);

        let snapshot = RankingGenerator::generate(&store, &catalog, &config, 4, None);

        assert_abs_diff_eq!(snapshot.entries[0].confidence_percent, 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_milestone_sequence() {
        let detector = MilestoneDetector::new(&EngineConfig::default());

        assert!(!detector.is_milestone(0));
        assert!(!detector.is_milestone(9));
        assert!(detector.is_milestone(10));
        assert!(detector.is_milestone(25));
        assert!(!detector.is_milestone(26));
        assert!(detector.is_milestone(300));
    }

    #[test]
    fn test_milestone_interval_beyond_sequence() {
        let detector = MilestoneDetector::new(&EngineConfig::default());

        // Last configured milestone is 300, interval 50
        assert!(detector.is_milestone(350));
        assert!(detector.is_milestone(400));
        assert!(!detector.is_milestone(351));
        assert!(!detector.is_milestone(399));
    }
}
