use chrono::Utc;
use itertools::Itertools;
use openskill::{
    model::{model::Model, plackett_luce::PlackettLuce},
    rating::{default_gamma, Rating}
};
use tracing::warn;
use uuid::Uuid;

use crate::model::{
    config::EngineConfig,
    constants,
    error::EngineError,
    freeze_board::FreezeBoard,
    rating_store::RatingStore,
    structures::{
        comparison::{ComparisonGroup, OutcomeRecord},
        entity::EntityId,
        rating_record::RatingRecord,
        tier::TierId
    }
};

pub fn create_model() -> PlackettLuce {
    PlackettLuce::new(constants::BETA, constants::KAPPA, default_gamma)
}

/// Consumes resolved comparisons: validates the selection, expands it into
/// pairwise outcomes, applies the rating model, evaluates the freeze
/// policy for losers and emits history records.
pub struct OutcomeProcessor {
    model: PlackettLuce
}

impl Default for OutcomeProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl OutcomeProcessor {
    pub fn new() -> OutcomeProcessor {
        OutcomeProcessor { model: create_model() }
    }

    /// Applies one resolved comparison. Every (winner, non-winner) pair in
    /// the group becomes an independent pairwise outcome: a pair yields 1
    /// record, a triple with 1 or 2 winners yields 2.
    ///
    /// A numerically degenerate update (non-finite output) is skipped for
    /// that pair only; both records stay untouched, the history row is
    /// still appended and the rest of the batch still applies.
    pub fn process(
        &self,
        group: &ComparisonGroup,
        winner_ids: &[EntityId],
        comparison_index: u32,
        store: &mut RatingStore,
        freeze_board: &mut FreezeBoard,
        active_tier: TierId,
        config: &EngineConfig
    ) -> Result<Vec<OutcomeRecord>, EngineError> {
        Self::validate(group, winner_ids)?;

        let losers: Vec<EntityId> = group
            .members()
            .iter()
            .copied()
            .filter(|id| !winner_ids.contains(id))
            .collect();

        let timestamp = Utc::now().fixed_offset();
        let mut records = Vec::with_capacity(winner_ids.len() * losers.len());

        for (&winner, &loser) in winner_ids.iter().cartesian_product(losers.iter()) {
            let winner_before = store.get(winner);
            let loser_before = store.get(loser);

            let updated = self.rate_pair(&winner_before, &loser_before, config);
            let applied = updated.is_some();

            let (winner_after, loser_after) = match updated {
                Some(pair) => pair,
                None => {
                    warn!("skipping update: {}", EngineError::NumericDegenerate { winner, loser });
                    (winner_before, loser_before)
                }
            };

            if applied {
                store.set(winner, winner_after);
                store.set(loser, loser_after);
            }

            records.push(OutcomeRecord {
                id: Uuid::new_v4(),
                comparison_index,
                group: group.members().to_vec(),
                winner_id: winner,
                loser_id: loser,
                winner_before,
                winner_after,
                loser_before,
                loser_after,
                applied,
                timestamp
            });
        }

        // Freeze policy runs after the whole batch so it sees final values
        for &loser in &losers {
            let record = store.get(loser);
            if Self::should_freeze(&record, config) {
                freeze_board.freeze(loser, active_tier);
            }
        }

        Ok(records)
    }

    fn validate(group: &ComparisonGroup, winner_ids: &[EntityId]) -> Result<(), EngineError> {
        if group.len() < 2 {
            return Err(EngineError::invalid_outcome("group has fewer than 2 members"));
        }

        if winner_ids.is_empty() {
            return Err(EngineError::invalid_outcome("no winner selected"));
        }

        for id in winner_ids {
            if !group.contains(*id) {
                return Err(EngineError::invalid_outcome(format!(
                    "selected id {id} is not a member of the presented group"
                )));
            }
        }

        if winner_ids.len() >= group.len() {
            return Err(EngineError::invalid_outcome("every member marked as winner"));
        }

        let mut distinct = winner_ids.to_vec();
        distinct.sort_unstable();
        distinct.dedup();
        if distinct.len() != winner_ids.len() {
            return Err(EngineError::invalid_outcome("duplicate winner ids"));
        }

        Ok(())
    }

    /// Symmetric two-player update through the rating model: winner and
    /// loser as one-man teams with placements 1 and 2, the same shape the
    /// model uses for free-for-all fields. Returns None when the model
    /// output is non-finite.
    fn rate_pair(
        &self,
        winner: &RatingRecord,
        loser: &RatingRecord,
        config: &EngineConfig
    ) -> Option<(RatingRecord, RatingRecord)> {
        if !winner.mean.is_finite()
            || !winner.uncertainty.is_finite()
            || !loser.mean.is_finite()
            || !loser.uncertainty.is_finite()
        {
            return None;
        }

        let teams = vec![
            vec![Rating {
                mu: winner.mean,
                sigma: winner.uncertainty
            }],
            vec![Rating {
                mu: loser.mean,
                sigma: loser.uncertainty
            }],
        ];

        let rated: Vec<Rating> = self.model.rate(teams, vec![1, 2]).into_iter().flatten().collect();
        let [new_winner, new_loser] = rated.as_slice() else {
            return None;
        };

        if !new_winner.mu.is_finite()
            || !new_winner.sigma.is_finite()
            || !new_loser.mu.is_finite()
            || !new_loser.sigma.is_finite()
        {
            return None;
        }

        // Uncertainty is monotonically non-increasing, clamped to the floor
        let winner_sigma = new_winner
            .sigma
            .min(winner.uncertainty)
            .max(config.uncertainty_floor);
        let loser_sigma = new_loser.sigma.min(loser.uncertainty).max(config.uncertainty_floor);

        Some((
            RatingRecord {
                mean: new_winner.mu,
                uncertainty: winner_sigma,
                comparisons: winner.comparisons + 1
            },
            RatingRecord {
                mean: new_loser.mu,
                uncertainty: loser_sigma,
                comparisons: loser.comparisons + 1
            }
        ))
    }

    fn should_freeze(record: &RatingRecord, config: &EngineConfig) -> bool {
        record.comparisons >= config.freeze_min_comparisons
            && record.confidence_percent(config.initial_uncertainty) >= config.freeze_min_confidence
            && record.conservative_score(config.conservative_multiplier) < 0.0
    }
}
