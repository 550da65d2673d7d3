use alloy::primitives::U256;

use super::wad_ray::Wad;

/// Risk parameters governing the leverage loop and the safety evaluator.
///
/// Ratios are WAD-scaled; `*_bps` fields use 10_000 = 100%.
/// `target_ltv + allowed_ltv_drift < collateral factor` is checked by the
/// setters when a new target is installed, not continuously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskParams {
    pub target_ltv: Wad,
    pub allowed_ltv_drift: Wad,
    /// Maximum loop iterations per engine run.
    pub borrow_depth: u32,
    /// Upper bound for `borrow_depth`.
    pub max_borrow_depth: u32,
    /// Dust threshold: loops stop once the remaining amount is at or below it.
    pub min_want_to_leverage: U256,
    pub withdraw_slippage_tolerance_bps: u32,
    pub ltv_scale_of_safe_cf_bps: u32,
    /// Absolute market cash floor, base-asset units.
    pub min_liquidity: U256,
    pub principal_scale_of_safe_liquidity_bps: u32,
    pub borrow_rate_offset_bps: u32,
}

impl RiskParams {
    /// `target + drift`: above this the position is over-levered.
    pub fn upper_band(&self) -> Wad {
        self.target_ltv.saturating_add(self.allowed_ltv_drift)
    }

    /// `target - drift`, floored at zero: below this the position is under-levered.
    pub fn lower_band(&self) -> Wad {
        self.target_ltv.saturating_sub(self.allowed_ltv_drift)
    }
}
