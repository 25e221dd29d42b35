use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

/// How the matchmaker arrived at a comparison group. The first two variants
/// are priority sources consumed before any strategy roll; the rest are the
/// weighted strategies plus the always-available fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
pub enum SelectionStrategy {
    /// A "compare this entity now" request from the host.
    FocusRequest,
    /// Head of the refinement queue (manual reorder validation).
    Refinement,
    /// Bring an entity with zero comparisons into the pool.
    IntroduceUnrated,
    /// Sharpen ordering inside the current top-N.
    RefineTopN,
    /// Challenger just outside the top-N vs. a gatekeeper inside it.
    BubbleChallenge,
    /// Confirm a settled bottom-tier entity, occasionally as an upset probe.
    BottomConfirmation,
    /// Recency-filtered random group when nothing else applies.
    RandomFallback
}

impl SelectionStrategy {
    /// True for the strategies eligible in a weighted roll (everything the
    /// priority sources and the fallback do not cover).
    pub fn is_weighted(&self) -> bool {
        matches!(
            self,
            SelectionStrategy::IntroduceUnrated
                | SelectionStrategy::RefineTopN
                | SelectionStrategy::BubbleChallenge
                | SelectionStrategy::BottomConfirmation
        )
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_weighted_set() {
        let weighted: Vec<SelectionStrategy> = SelectionStrategy::iter().filter(|s| s.is_weighted()).collect();

        assert_eq!(
            weighted,
            vec![
                SelectionStrategy::IntroduceUnrated,
                SelectionStrategy::RefineTopN,
                SelectionStrategy::BubbleChallenge,
                SelectionStrategy::BottomConfirmation
            ]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(SelectionStrategy::RefineTopN.to_string(), "RefineTopN");
    }
}
