// Engine defaults. Everything here is surfaced through EngineConfig;
// nothing outside the Default impl should read these directly.
pub const DEFAULT_MEAN: f64 = 25.0;
pub const DEFAULT_UNCERTAINTY: f64 = DEFAULT_MEAN / 3.0;
pub const UNCERTAINTY_FLOOR: f64 = DEFAULT_UNCERTAINTY / 10.0;
pub const BETA: f64 = DEFAULT_UNCERTAINTY / 2.0;
pub const KAPPA: f64 = 0.0001;

// Conservative score: mean - CONSERVATIVE_MULTIPLIER * uncertainty.
// With the default prior this puts an unrated entity at exactly 0, which
// the freeze policy's negative-score criterion relies on.
pub const CONSERVATIVE_MULTIPLIER: f64 = 3.0;

// Strategy roll bands, in declared order. Must sum to 1.0.
pub const BAND_INTRODUCE_UNRATED: f64 = 0.15;
pub const BAND_REFINE_TOP_N: f64 = 0.50;
pub const BAND_BUBBLE_CHALLENGE: f64 = 0.20;
pub const BAND_BOTTOM_CONFIRMATION: f64 = 0.15;

// Bootstrap phase: the first BOOTSTRAP_COMPARISONS selections draw only
// from a fixed random subset of BOOTSTRAP_POOL_SIZE entities.
pub const BOOTSTRAP_COMPARISONS: u32 = 25;
pub const BOOTSTRAP_POOL_SIZE: usize = 15;

// Recency memory capacities.
pub const RECENT_ENTITY_CAP: usize = 50;
pub const RECENT_ENTITY_POPULATION_SHARE: f64 = 0.30;
pub const RECENT_PAIR_CAP: usize = 100;

// Tier freeze policy.
pub const FREEZE_MIN_COMPARISONS: u32 = 5;
pub const FREEZE_MIN_CONFIDENCE: f64 = 60.0;

// Refine-top-N primary pool: how many highest-uncertainty members of the
// tier are candidates for the primary slot.
pub const REFINE_UNCERTAINTY_POOL: usize = 5;

// Bubble challenge windows, as rank offsets past the tier boundary.
pub const BUBBLE_NEAR_WINDOW: usize = 20;
pub const BUBBLE_FAR_WINDOW: usize = 50;
pub const BUBBLE_FAR_UNCERTAINTY_MIN: f64 = 2.5;
pub const BUBBLE_GATEKEEPER_DEPTH: usize = 5;

// Bottom confirmation: chance the opponent comes from the bottom tier
// rather than being an upset probe against the top-N.
pub const BOTTOM_PEER_PROBABILITY: f64 = 0.80;

pub const DEFAULT_TIER_SIZE: u32 = 40;

// Milestones: the explicit sequence, then every interval beyond its end.
pub const MILESTONE_INTERVAL_BEYOND: u32 = 50;

lazy_static::lazy_static! {
    pub static ref DEFAULT_MILESTONES: Vec<u32> = vec![10, 25, 50, 100, 150, 200, 250, 300];
}
