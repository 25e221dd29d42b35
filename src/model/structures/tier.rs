use serde::{Deserialize, Serialize};

/// A tier is the "top-N" scope some matchmaking strategies and the freeze
/// policy operate in. It is identified by its size: top-40 and top-100 are
/// distinct tiers with independent freeze flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TierId(pub u32);

impl TierId {
    pub fn size(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for TierId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "top-{}", self.0)
    }
}
