use indexmap::IndexSet;
use rand::{
    seq::{IndexedRandom, SliceRandom},
    Rng
};
use tracing::debug;

use crate::model::{
    config::{EngineConfig, StrategyBands},
    error::EngineError,
    freeze_board::FreezeBoard,
    ranking::{ranked_entities, RankedEntity},
    rating_store::RatingStore,
    recency::AntiRepeatMemory,
    refinement_queue::RefinementQueue,
    structures::{
        comparison::{ComparisonGroup, GroupSize, Selection},
        entity::EntityId,
        selection_strategy::SelectionStrategy,
        tier::TierId
    }
};

/// Read-only inputs to one selection. Bundled so the call site stays
/// legible; the matchmaker owns no rating or population state itself.
pub struct SelectionContext<'a> {
    pub population: &'a IndexSet<EntityId>,
    pub store: &'a RatingStore,
    pub freeze_board: &'a FreezeBoard,
    pub active_tier: TierId,
    pub config: &'a EngineConfig
}

/// Maps a uniform roll in [0, 1) onto a weighted strategy band. Split out
/// as a pure function so band arithmetic is testable without an RNG.
pub fn roll_strategy(bands: &StrategyBands, roll: f64) -> SelectionStrategy {
    let mut edge = bands.introduce_unrated;
    if roll < edge {
        return SelectionStrategy::IntroduceUnrated;
    }

    edge += bands.refine_top_n;
    if roll < edge {
        return SelectionStrategy::RefineTopN;
    }

    edge += bands.bubble_challenge;
    if roll < edge {
        return SelectionStrategy::BubbleChallenge;
    }

    SelectionStrategy::BottomConfirmation
}

/// Produces the next comparison group. Deterministic given (population,
/// ratings, queue, frozen set, recency memory, RNG seed): every random
/// draw goes through the injected RNG.
pub struct Matchmaker {
    /// Fixed random subset the candidate pool is restricted to for the
    /// first `bootstrap_comparisons` selections of a session.
    bootstrap_pool: Option<Vec<EntityId>>,
    selections_issued: u32,
    last_group: Option<ComparisonGroup>,
    pending_focus: Option<EntityId>
}

impl Default for Matchmaker {
    fn default() -> Self {
        Self::new()
    }
}

impl Matchmaker {
    pub fn new() -> Matchmaker {
        Matchmaker {
            bootstrap_pool: None,
            selections_issued: 0,
            last_group: None,
            pending_focus: None
        }
    }

    /// Flags an entity for immediate comparison. Consumed by the next
    /// `select` call; a later request overwrites an unconsumed one.
    pub fn request_focus(&mut self, id: EntityId) {
        self.pending_focus = Some(id);
    }

    pub fn selections_issued(&self) -> u32 {
        self.selections_issued
    }

    pub fn reset(&mut self) {
        self.bootstrap_pool = None;
        self.selections_issued = 0;
        self.last_group = None;
        self.pending_focus = None;
    }

    /// Selection priority: pending focus request, refinement queue head,
    /// weighted strategy roll, recency-filtered random fallback. A
    /// queue-sourced selection leaves its task queued; the session pops it
    /// once the outcome is recorded.
    pub fn select<R: Rng>(
        &mut self,
        size: GroupSize,
        ctx: &SelectionContext,
        recency: &mut AntiRepeatMemory,
        queue: &mut RefinementQueue,
        rng: &mut R
    ) -> Result<Selection, EngineError> {
        let required = size.len();
        if ctx.population.len() < required {
            return Err(EngineError::InsufficientPopulation {
                available: ctx.population.len(),
                required
            });
        }

        let pool = self.candidate_pool(ctx, rng);
        let ranked: Vec<RankedEntity> = ranked_entities(ctx.store, ctx.config)
            .into_iter()
            .filter(|r| pool.contains(&r.id))
            .collect();

        let mut selection = self
            .try_focus_request(size, ctx, &pool, &ranked, rng)
            .or_else(|| Self::try_refinement_head(size, ctx, &pool, &ranked, queue, rng))
            .or_else(|| self.try_strategy_roll(size, ctx, &pool, &ranked, recency, rng))
            .unwrap_or_else(|| Selection {
                group: Self::random_fallback(size, &pool, recency, rng),
                strategy: SelectionStrategy::RandomFallback
            });

        // Never re-issue the exact group just shown. One retry through the
        // fallback with the recency filter emptied; if even that produces
        // the same members the population leaves no alternative.
        if let Some(last) = &self.last_group {
            if selection.group.same_members(last) && ctx.population.len() > required {
                debug!("selection repeats previous group, retrying via fallback");
                recency.clear_entities();

                // Drop one member of the repeated group from the retry pool
                // so the fallback cannot reproduce it
                let excluded = last.members()[0];
                let reduced: Vec<EntityId> = pool.iter().copied().filter(|&id| id != excluded).collect();
                let retry_pool = if reduced.len() >= required { reduced } else { pool.clone() };

                let retry = Self::random_fallback(size, &retry_pool, recency, rng);
                if !retry.same_members(last) {
                    selection = Selection {
                        group: retry,
                        strategy: SelectionStrategy::RandomFallback
                    };
                }
            }
        }

        for &id in selection.group.members() {
            recency.remember_entity(id);
        }
        for key in selection.group.pair_keys() {
            recency.remember_pair(key);
        }

        self.last_group = Some(selection.group.clone());
        self.selections_issued += 1;

        debug!(
            "issued group {:?} via {}",
            selection.group.members(),
            selection.strategy
        );

        Ok(selection)
    }

    /// Unfrozen population, restricted to the bootstrap subset while the
    /// session is in its bootstrap phase. Falls back to the full
    /// population if exclusions would starve the pool.
    fn candidate_pool<R: Rng>(&mut self, ctx: &SelectionContext, rng: &mut R) -> Vec<EntityId> {
        let unfrozen: Vec<EntityId> = ctx
            .population
            .iter()
            .copied()
            .filter(|&id| !ctx.freeze_board.is_frozen(id, ctx.active_tier))
            .collect();

        let base = if unfrozen.len() >= 2 {
            unfrozen
        } else {
            debug!("frozen exclusions starve the pool, relaxing to full population");
            ctx.population.iter().copied().collect()
        };

        let in_bootstrap = self.selections_issued < ctx.config.bootstrap_comparisons
            && ctx.population.len() > ctx.config.bootstrap_pool_size;
        if !in_bootstrap {
            return base;
        }

        let subset = self.bootstrap_pool.get_or_insert_with(|| {
            let mut chosen: Vec<EntityId> = base
                .choose_multiple(rng, ctx.config.bootstrap_pool_size)
                .copied()
                .collect();
            chosen.sort_unstable();
            debug!("bootstrap subset established: {:?}", chosen);
            chosen
        });

        let restricted: Vec<EntityId> = base.iter().copied().filter(|id| subset.contains(id)).collect();
        if restricted.len() >= 2 {
            restricted
        } else {
            base
        }
    }

    fn try_focus_request<R: Rng>(
        &mut self,
        size: GroupSize,
        ctx: &SelectionContext,
        pool: &[EntityId],
        ranked: &[RankedEntity],
        rng: &mut R
    ) -> Option<Selection> {
        let focus = self.pending_focus.take()?;
        if !ctx.population.contains(&focus) {
            debug!("pending focus {} no longer in population, discarding", focus);
            return None;
        }

        let mut members = vec![focus];
        let tier_size = ctx.active_tier.size();

        while members.len() < size.len() {
            let opponent = if ctx.store.is_rated(focus) {
                // Skill-matched: closest conservative score among rated
                let target = ctx
                    .store
                    .get(focus)
                    .conservative_score(ctx.config.conservative_multiplier);
                closest_by(ranked, target, |r| r.conservative_score, &members)
            } else {
                // Unrated focus: prefer a fellow unrated entity, else the
                // most uncertain bottom-tier entity
                let unrated: Vec<EntityId> = unrated_pool(pool, ctx.store)
                    .into_iter()
                    .filter(|id| !members.contains(id))
                    .collect();

                unrated.choose(rng).copied().or_else(|| {
                    ranked
                        .iter()
                        .skip(tier_size)
                        .filter(|r| !members.contains(&r.id))
                        .max_by(|a, b| a.uncertainty.total_cmp(&b.uncertainty))
                        .map(|r| r.id)
                })
            };

            match opponent.or_else(|| random_excluding(pool, &members, rng)) {
                Some(id) => members.push(id),
                None => return None
            }
        }

        Some(Selection {
            group: ComparisonGroup::new(members),
            strategy: SelectionStrategy::FocusRequest
        })
    }

    fn try_refinement_head<R: Rng>(
        size: GroupSize,
        ctx: &SelectionContext,
        pool: &[EntityId],
        ranked: &[RankedEntity],
        queue: &mut RefinementQueue,
        rng: &mut R
    ) -> Option<Selection> {
        let task = queue.peek_resolved(ctx.population)?;
        let mut members = vec![task.primary, task.opponent];

        if size == GroupSize::Triple {
            let target = ctx
                .store
                .get(task.primary)
                .conservative_score(ctx.config.conservative_multiplier);
            let third =
                closest_by(ranked, target, |r| r.conservative_score, &members).or_else(|| random_excluding(pool, &members, rng));
            members.push(third?);
        }

        Some(Selection {
            group: ComparisonGroup::new(members),
            strategy: SelectionStrategy::Refinement
        })
    }

    /// Rolls a strategy band, then tries the rolled strategy followed by
    /// the remaining ones in declared order. Returns None when no strategy
    /// can field a full group.
    fn try_strategy_roll<R: Rng>(
        &self,
        size: GroupSize,
        ctx: &SelectionContext,
        pool: &[EntityId],
        ranked: &[RankedEntity],
        recency: &AntiRepeatMemory,
        rng: &mut R
    ) -> Option<Selection> {
        let rolled = roll_strategy(&ctx.config.bands, rng.random::<f64>());

        let mut order = vec![rolled];
        for strategy in [
            SelectionStrategy::IntroduceUnrated,
            SelectionStrategy::RefineTopN,
            SelectionStrategy::BubbleChallenge,
            SelectionStrategy::BottomConfirmation
        ] {
            if strategy != rolled {
                order.push(strategy);
            }
        }

        for strategy in order {
            let group = match strategy {
                SelectionStrategy::IntroduceUnrated => Self::introduce_unrated(size, ctx, pool, ranked, recency, rng),
                SelectionStrategy::RefineTopN => Self::refine_top_n(size, ctx, ranked, rng),
                SelectionStrategy::BubbleChallenge => Self::bubble_challenge(size, ctx, ranked, rng),
                SelectionStrategy::BottomConfirmation => Self::bottom_confirmation(size, ctx, ranked, rng),
                _ => None
            };

            if let Some(group) = group {
                return Some(Selection { group, strategy });
            }
        }

        None
    }

    /// Pulls entities with zero comparisons into the pool. Pairs unrated
    /// entities together when possible, topping up from the most uncertain
    /// bottom-tier members.
    fn introduce_unrated<R: Rng>(
        size: GroupSize,
        ctx: &SelectionContext,
        pool: &[EntityId],
        ranked: &[RankedEntity],
        recency: &AntiRepeatMemory,
        rng: &mut R
    ) -> Option<ComparisonGroup> {
        let unrated = unrated_pool(pool, ctx.store);
        if unrated.is_empty() {
            return None;
        }

        // Prefer individuals the user has not just seen
        let fresh: Vec<EntityId> = unrated
            .iter()
            .copied()
            .filter(|&id| !recency.is_recent_entity(id))
            .collect();
        let primary_pool = if fresh.is_empty() { &unrated } else { &fresh };

        let mut members = vec![*primary_pool.choose(rng)?];

        while members.len() < size.len() {
            let next_unrated: Vec<EntityId> = unrated
                .iter()
                .copied()
                .filter(|id| !members.contains(id))
                .collect();

            let next = next_unrated.choose(rng).copied().or_else(|| {
                // No second unrated entity: borrow signal from the most
                // uncertain bottom-tier member
                ranked
                    .iter()
                    .skip(ctx.active_tier.size())
                    .filter(|r| !members.contains(&r.id))
                    .max_by(|a, b| a.uncertainty.total_cmp(&b.uncertainty))
                    .map(|r| r.id)
            });

            members.push(next?);
        }

        Some(ComparisonGroup::new(members))
    }

    /// Sharpens the ordering inside the active tier: the primary comes from
    /// the tier's highest-uncertainty members, the opponents are its
    /// nearest neighbors by mean.
    fn refine_top_n<R: Rng>(
        size: GroupSize,
        ctx: &SelectionContext,
        ranked: &[RankedEntity],
        rng: &mut R
    ) -> Option<ComparisonGroup> {
        let tier: Vec<&RankedEntity> = ranked.iter().take(ctx.active_tier.size()).collect();
        if tier.len() < size.len() {
            return None;
        }

        let mut by_uncertainty: Vec<&RankedEntity> = tier.clone();
        by_uncertainty.sort_by(|a, b| b.uncertainty.total_cmp(&a.uncertainty));
        let primary = **by_uncertainty[..ctx.config.refine_uncertainty_pool.min(by_uncertainty.len())]
            .choose(rng)?;

        let mut members = vec![primary.id];
        while members.len() < size.len() {
            let next = tier
                .iter()
                .filter(|r| !members.contains(&r.id))
                .min_by(|a, b| {
                    (a.mean - primary.mean)
                        .abs()
                        .total_cmp(&(b.mean - primary.mean).abs())
                })
                .map(|r| r.id)?;
            members.push(next);
        }

        Some(ComparisonGroup::new(members))
    }

    /// Pits the strongest claim from just outside the tier against a
    /// gatekeeper from its bottom ranks.
    fn bubble_challenge<R: Rng>(
        size: GroupSize,
        ctx: &SelectionContext,
        ranked: &[RankedEntity],
        rng: &mut R
    ) -> Option<ComparisonGroup> {
        let tier_size = ctx.active_tier.size().min(ranked.len());
        if ranked.len() <= tier_size {
            return None;
        }

        let near_end = (tier_size + ctx.config.bubble_near_window).min(ranked.len());
        let far_end = (tier_size + ctx.config.bubble_far_window).min(ranked.len());

        let mut challengers: Vec<&RankedEntity> = ranked[tier_size..near_end].iter().collect();
        challengers.extend(
            ranked[near_end..far_end]
                .iter()
                .filter(|r| r.uncertainty > ctx.config.bubble_far_uncertainty_min)
        );

        let challenger = challengers.into_iter().max_by(|a, b| a.uncertainty.total_cmp(&b.uncertainty))?;

        let gate_start = tier_size.saturating_sub(ctx.config.bubble_gatekeeper_depth);
        let gatekeepers: Vec<&RankedEntity> = ranked[gate_start..tier_size].iter().collect();

        let mut members = vec![challenger.id];
        let mut gate_pool: Vec<EntityId> = gatekeepers.iter().map(|r| r.id).collect();
        while members.len() < size.len() {
            gate_pool.retain(|id| !members.contains(id));
            members.push(gate_pool.choose(rng).copied()?);
        }

        Some(ComparisonGroup::new(members))
    }

    /// Confirms that a settled bottom-tier entity belongs where it sits;
    /// occasionally probes it against the tier instead.
    fn bottom_confirmation<R: Rng>(
        size: GroupSize,
        ctx: &SelectionContext,
        ranked: &[RankedEntity],
        rng: &mut R
    ) -> Option<ComparisonGroup> {
        let tier_size = ctx.active_tier.size().min(ranked.len());
        let bottom: Vec<&RankedEntity> = ranked[tier_size..].iter().collect();

        let settled: Vec<&&RankedEntity> = bottom
            .iter()
            .filter(|r| {
                ctx.store.get(r.id).confidence_percent(ctx.config.initial_uncertainty)
                    >= ctx.config.freeze_min_confidence
            })
            .collect();

        let primary = ***settled.choose(rng)?;
        let mut members = vec![primary.id];

        let probe_top = !rng.random_bool(ctx.config.bottom_peer_probability);
        while members.len() < size.len() {
            let opponent = if probe_top && members.len() == 1 {
                // Upset probe against a random tier member
                let tier: Vec<EntityId> = ranked[..tier_size]
                    .iter()
                    .map(|r| r.id)
                    .filter(|id| !members.contains(id))
                    .collect();
                tier.choose(rng).copied()
            } else {
                let peers: Vec<EntityId> = bottom
                    .iter()
                    .map(|r| r.id)
                    .filter(|id| !members.contains(id))
                    .collect();
                peers.choose(rng).copied()
            };

            members.push(opponent?);
        }

        Some(ComparisonGroup::new(members))
    }

    /// Shuffled pick over the pool with recency filtering, progressively
    /// relaxed (halve the recent set, then clear it) until a full group
    /// can be formed.
    fn random_fallback<R: Rng>(
        size: GroupSize,
        pool: &[EntityId],
        recency: &mut AntiRepeatMemory,
        rng: &mut R
    ) -> ComparisonGroup {
        let required = size.len();

        let mut candidates: Vec<EntityId> = pool
            .iter()
            .copied()
            .filter(|&id| !recency.is_recent_entity(id))
            .collect();

        if candidates.len() < required {
            recency.relax_entities();
            candidates = pool
                .iter()
                .copied()
                .filter(|&id| !recency.is_recent_entity(id))
                .collect();
        }

        if candidates.len() < required {
            recency.clear_entities();
            candidates = pool.to_vec();
        }

        candidates.shuffle(rng);
        candidates.truncate(required);
        ComparisonGroup::new(candidates)
    }
}

fn unrated_pool(pool: &[EntityId], store: &RatingStore) -> Vec<EntityId> {
    pool.iter().copied().filter(|&id| !store.is_rated(id)).collect()
}

/// Candidate minimizing |metric - target|, skipping excluded ids.
fn closest_by<F: Fn(&RankedEntity) -> f64>(
    ranked: &[RankedEntity],
    target: f64,
    metric: F,
    exclude: &[EntityId]
) -> Option<EntityId> {
    ranked
        .iter()
        .filter(|r| !exclude.contains(&r.id))
        .min_by(|a, b| (metric(a) - target).abs().total_cmp(&(metric(b) - target).abs()))
        .map(|r| r.id)
}

fn random_excluding<R: Rng>(pool: &[EntityId], exclude: &[EntityId], rng: &mut R) -> Option<EntityId> {
    let remaining: Vec<EntityId> = pool.iter().copied().filter(|id| !exclude.contains(id)).collect();
    remaining.choose(rng).copied()
}
