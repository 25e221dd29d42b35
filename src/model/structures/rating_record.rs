use serde::{Deserialize, Serialize};

/// Skill belief for a single entity. Created lazily with the configured
/// prior on first comparison and mutated exclusively by the outcome
/// processor. Uncertainty never grows under normal updates; it is clamped
/// to the configured floor instead of reaching zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub mean: f64,
    pub uncertainty: f64,
    pub comparisons: u32
}

impl RatingRecord {
    pub fn prior(mean: f64, uncertainty: f64) -> RatingRecord {
        RatingRecord {
            mean,
            uncertainty,
            comparisons: 0
        }
    }

    /// Pessimistic point estimate used for sorting: `mean - k * uncertainty`.
    pub fn conservative_score(&self, multiplier: f64) -> f64 {
        self.mean - multiplier * self.uncertainty
    }

    /// Percent confidence derived from how far uncertainty has shrunk from
    /// the ceiling, clamped to 0..=100.
    pub fn confidence_percent(&self, uncertainty_ceiling: f64) -> f64 {
        (100.0 * (1.0 - self.uncertainty / uncertainty_ceiling)).clamp(0.0, 100.0)
    }

    pub fn is_rated(&self) -> bool {
        self.comparisons > 0
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_conservative_score() {
        let record = RatingRecord {
            mean: 25.0,
            uncertainty: 8.0,
            comparisons: 3
        };

        assert_abs_diff_eq!(record.conservative_score(3.0), 1.0);
        assert_abs_diff_eq!(record.conservative_score(1.0), 17.0);
    }

    #[test]
    fn test_confidence_clamped() {
        let fresh = RatingRecord::prior(25.0, 10.0);
        assert_abs_diff_eq!(fresh.confidence_percent(10.0), 0.0);

        let settled = RatingRecord {
            mean: 20.0,
            uncertainty: 2.5,
            comparisons: 12
        };
        assert_abs_diff_eq!(settled.confidence_percent(10.0), 75.0);

        // Uncertainty above the ceiling never produces a negative percent
        let degenerate = RatingRecord {
            mean: 20.0,
            uncertainty: 15.0,
            comparisons: 1
        };
        assert_abs_diff_eq!(degenerate.confidence_percent(10.0), 0.0);
    }
}
