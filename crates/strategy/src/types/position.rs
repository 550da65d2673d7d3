use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

use super::wad_ray::{mul_div, Wad};
use crate::constants::WAD;

/// Supplied and borrowed amounts (base-asset units) read from the market at
/// one point in time. Every risk decision takes one of these explicitly
/// instead of consulting the strategy's cached balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PositionSnapshot {
    pub supplied: U256,
    pub borrowed: U256,
}

impl PositionSnapshot {
    pub fn new(supplied: U256, borrowed: U256) -> Self {
        Self { supplied, borrowed }
    }

    /// Supply net of borrow: the depositor's true claim.
    pub fn net(&self) -> U256 {
        self.supplied.saturating_sub(self.borrowed)
    }

    /// `borrowed * 1e18 / supplied`. No position means zero risk, not undefined.
    pub fn ltv(&self) -> Wad {
        if self.supplied.is_zero() || self.borrowed.is_zero() {
            return Wad::ZERO;
        }
        Wad(mul_div(self.borrowed, WAD, self.supplied))
    }

    pub fn is_empty(&self) -> bool {
        self.supplied.is_zero() && self.borrowed.is_zero()
    }
}

/// Amount requested from the deleverage engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawRequest {
    /// Rebalance only, or withdraw a bounded amount.
    Amount(U256),
    /// Unwind everything.
    Unbounded,
}

impl WithdrawRequest {
    pub const NONE: WithdrawRequest = WithdrawRequest::Amount(U256::ZERO);

    /// Clamp against what the position can actually release.
    pub fn clamp(self, available: U256) -> U256 {
        match self {
            Self::Amount(amount) => amount.min(available),
            Self::Unbounded => available,
        }
    }
}

/// Why a leverage/deleverage loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStop {
    /// Nothing to do: position already at or beyond the goal on entry.
    AlreadyAtTarget,
    /// Remaining amount fell to the dust threshold.
    DustThreshold,
    /// Protocol headroom ran out before the goal was reached.
    NoHeadroom,
    /// `borrow_depth` iterations used up. Not an error.
    DepthExhausted,
}

/// Result of one engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopOutcome {
    pub iterations: u32,
    pub stop: LoopStop,
    pub position: PositionSnapshot,
}

impl LoopOutcome {
    pub fn idle(position: PositionSnapshot) -> Self {
        Self {
            iterations: 0,
            stop: LoopStop::AlreadyAtTarget,
            position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ltv_zero_without_borrow() {
        let pos = PositionSnapshot::new(U256::from(1000u64), U256::ZERO);
        assert_eq!(pos.ltv(), Wad::ZERO);
    }

    #[test]
    fn test_ltv_zero_without_supply() {
        let pos = PositionSnapshot::new(U256::ZERO, U256::from(5u64));
        assert_eq!(pos.ltv(), Wad::ZERO);
    }

    #[test]
    fn test_ltv_scaled() {
        let pos = PositionSnapshot::new(U256::from(1000u64), U256::from(700u64));
        assert_eq!(pos.ltv().to_decimal(), dec!(0.7));
        assert_eq!(pos.net(), U256::from(300u64));
    }

    #[test]
    fn test_withdraw_request_clamp() {
        let available = U256::from(300u64);
        assert_eq!(WithdrawRequest::Amount(U256::from(500u64)).clamp(available), available);
        assert_eq!(
            WithdrawRequest::Amount(U256::from(100u64)).clamp(available),
            U256::from(100u64)
        );
        assert_eq!(WithdrawRequest::Unbounded.clamp(available), available);
        assert_eq!(WithdrawRequest::NONE.clamp(available), U256::ZERO);
    }

    proptest! {
        #[test]
        fn ltv_matches_ratio_within_collateral_factor(
            supplied in 1u128..1_000_000_000_000_000_000_000u128,
            cf_bps in 1u128..9_500u128,
            fill_bps in 0u128..=10_000u128,
        ) {
            // borrowed ≤ supplied · cf
            let borrowed = supplied * cf_bps / 10_000 * fill_bps / 10_000;
            let pos = PositionSnapshot::new(U256::from(supplied), U256::from(borrowed));
            let expected = U256::from(borrowed) * WAD / U256::from(supplied);
            prop_assert_eq!(pos.ltv().raw(), expected);
            prop_assert!(pos.ltv() < Wad::ONE);
            if borrowed == 0 {
                prop_assert_eq!(pos.ltv(), Wad::ZERO);
            }
        }
    }
}
