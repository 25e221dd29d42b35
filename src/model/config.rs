use serde::{Deserialize, Serialize};

use crate::model::{constants, error::EngineError, structures::tier::TierId};

/// Relative weights of the four rollable strategies. Must sum to 1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StrategyBands {
    pub introduce_unrated: f64,
    pub refine_top_n: f64,
    pub bubble_challenge: f64,
    pub bottom_confirmation: f64
}

impl Default for StrategyBands {
    fn default() -> Self {
        StrategyBands {
            introduce_unrated: constants::BAND_INTRODUCE_UNRATED,
            refine_top_n: constants::BAND_REFINE_TOP_N,
            bubble_challenge: constants::BAND_BUBBLE_CHALLENGE,
            bottom_confirmation: constants::BAND_BOTTOM_CONFIRMATION
        }
    }
}

impl StrategyBands {
    pub fn sum(&self) -> f64 {
        self.introduce_unrated + self.refine_top_n + self.bubble_challenge + self.bottom_confirmation
    }
}

/// Full engine configuration. `validate()` runs once at session
/// construction; a malformed configuration is the only fatal error the
/// engine produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Prior mean assigned on first comparison.
    pub initial_mean: f64,
    /// Prior uncertainty; also the ceiling the confidence percent is
    /// measured against.
    pub initial_uncertainty: f64,
    /// Uncertainty never shrinks below this floor.
    pub uncertainty_floor: f64,
    /// Multiplier `k` in `conservative = mean - k * uncertainty`.
    pub conservative_multiplier: f64,
    pub bands: StrategyBands,
    /// Selections in the bootstrap phase of a fresh session.
    pub bootstrap_comparisons: u32,
    /// Size of the fixed random subset used during bootstrap.
    pub bootstrap_pool_size: usize,
    pub recent_entity_cap: usize,
    pub recent_entity_population_share: f64,
    pub recent_pair_cap: usize,
    pub freeze_min_comparisons: u32,
    pub freeze_min_confidence: f64,
    pub refine_uncertainty_pool: usize,
    pub bubble_near_window: usize,
    pub bubble_far_window: usize,
    pub bubble_far_uncertainty_min: f64,
    pub bubble_gatekeeper_depth: usize,
    pub bottom_peer_probability: f64,
    pub initial_tier: TierId,
    /// Comparison counts at which a milestone snapshot is surfaced.
    pub milestones: Vec<u32>,
    /// Beyond the last configured milestone, fire every this many.
    pub milestone_interval_beyond: u32
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            initial_mean: constants::DEFAULT_MEAN,
            initial_uncertainty: constants::DEFAULT_UNCERTAINTY,
            uncertainty_floor: constants::UNCERTAINTY_FLOOR,
            conservative_multiplier: constants::CONSERVATIVE_MULTIPLIER,
            bands: StrategyBands::default(),
            bootstrap_comparisons: constants::BOOTSTRAP_COMPARISONS,
            bootstrap_pool_size: constants::BOOTSTRAP_POOL_SIZE,
            recent_entity_cap: constants::RECENT_ENTITY_CAP,
            recent_entity_population_share: constants::RECENT_ENTITY_POPULATION_SHARE,
            recent_pair_cap: constants::RECENT_PAIR_CAP,
            freeze_min_comparisons: constants::FREEZE_MIN_COMPARISONS,
            freeze_min_confidence: constants::FREEZE_MIN_CONFIDENCE,
            refine_uncertainty_pool: constants::REFINE_UNCERTAINTY_POOL,
            bubble_near_window: constants::BUBBLE_NEAR_WINDOW,
            bubble_far_window: constants::BUBBLE_FAR_WINDOW,
            bubble_far_uncertainty_min: constants::BUBBLE_FAR_UNCERTAINTY_MIN,
            bubble_gatekeeper_depth: constants::BUBBLE_GATEKEEPER_DEPTH,
            bottom_peer_probability: constants::BOTTOM_PEER_PROBABILITY,
            initial_tier: TierId(constants::DEFAULT_TIER_SIZE),
            milestones: constants::DEFAULT_MILESTONES.clone(),
            milestone_interval_beyond: constants::MILESTONE_INTERVAL_BEYOND
        }
    }
}

impl EngineConfig {
    /// The effective recency cap for individuals given a population size:
    /// `min(recent_entity_cap, share * population)`.
    pub fn effective_entity_cap(&self, population: usize) -> usize {
        let share = (population as f64 * self.recent_entity_population_share) as usize;
        self.recent_entity_cap.min(share.max(1))
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.initial_mean.is_finite() || self.initial_mean <= 0.0 {
            return Err(EngineError::configuration("initial_mean must be positive and finite"));
        }

        if !self.initial_uncertainty.is_finite() || self.initial_uncertainty <= 0.0 {
            return Err(EngineError::configuration(
                "initial_uncertainty must be positive and finite"
            ));
        }

        if self.uncertainty_floor < 0.0 || self.uncertainty_floor >= self.initial_uncertainty {
            return Err(EngineError::configuration(
                "uncertainty_floor must be in [0, initial_uncertainty)"
            ));
        }

        if self.conservative_multiplier <= 0.0 {
            return Err(EngineError::configuration("conservative_multiplier must be positive"));
        }

        if (self.bands.sum() - 1.0).abs() > 1e-9 {
            return Err(EngineError::configuration("strategy bands must sum to 1.0"));
        }

        if self.bootstrap_pool_size < 2 {
            return Err(EngineError::configuration("bootstrap_pool_size must be at least 2"));
        }

        if self.recent_pair_cap == 0 || self.recent_entity_cap == 0 {
            return Err(EngineError::configuration("recency capacities must be non-zero"));
        }

        if !(0.0..=1.0).contains(&self.bottom_peer_probability) {
            return Err(EngineError::configuration("bottom_peer_probability must be in [0, 1]"));
        }

        if self.initial_tier.size() < 2 {
            return Err(EngineError::configuration("tier size must be at least 2"));
        }

        if self.milestones.is_empty() {
            return Err(EngineError::configuration("milestone sequence must be non-empty"));
        }

        if self.milestones.windows(2).any(|w| w[0] >= w[1]) || self.milestones[0] == 0 {
            return Err(EngineError::configuration(
                "milestone sequence must be strictly increasing and start above zero"
            ));
        }

        if self.milestone_interval_beyond == 0 {
            return Err(EngineError::configuration("milestone_interval_beyond must be non-zero"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(EngineConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_bands_must_sum_to_one() {
        let mut config = EngineConfig::default();
        config.bands.refine_top_n = 0.9;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_milestones_must_increase() {
        let mut config = EngineConfig::default();
        config.milestones = vec![10, 10, 50];

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_effective_entity_cap_scales_with_population() {
        let config = EngineConfig::default();

        // 30% of 40 = 12, under the fixed cap of 50
        assert_eq!(config.effective_entity_cap(40), 12);
        // 30% of 1000 would be 300; fixed cap wins
        assert_eq!(config.effective_entity_cap(1000), 50);
        // Tiny populations never collapse to zero
        assert_eq!(config.effective_entity_cap(2), 1);
    }
}
