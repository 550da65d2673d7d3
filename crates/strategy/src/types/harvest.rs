use alloy::primitives::U256;

/// Result of one harvest, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HarvestReport {
    /// Reward tokens held after claiming (claimed plus any dust left earlier).
    pub reward_claimed: U256,
    /// Base asset actually received from the swaps.
    pub want_gained: U256,
    /// Base asset the route quoted for the full reward balance before swapping.
    pub quoted_want: U256,
}
