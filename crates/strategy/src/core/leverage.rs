//! Leverage engine: borrow and re-supply until the target LTV is reached
//! from below.
//!
//! The loop is bounded by `borrow_depth` and lands within one step of the
//! target. Every borrow is capped by the live collateral headroom, so the
//! position never exceeds the target or the collateral factor.

use alloy::primitives::U256;
use tracing::{debug, info};

use crate::config::MarketAddresses;
use crate::constants::MIN_BORROW_STEP;
use crate::errors::StrategyError;
use crate::execution::{LendingMarket, TokenLedger};
use crate::types::wad_ray::{max_borrow_from_supplied, mul_wad};
use crate::types::{LoopOutcome, LoopStop, PositionSnapshot, RiskParams, Wad};

use super::position_oracle::PositionOracle;

pub struct LeverageEngine<'a> {
    pub oracle: &'a PositionOracle,
    pub addrs: &'a MarketAddresses,
    pub risk: &'a RiskParams,
    pub collateral_factor: Wad,
}

impl LeverageEngine<'_> {
    /// Lever `position` up towards `risk.target_ltv`.
    ///
    /// The borrow goal is computed once from `position`; headroom is re-read
    /// from the market before every step. Any failing market call aborts.
    pub fn run<C>(&self, chain: &mut C, position: PositionSnapshot) -> Result<LoopOutcome, StrategyError>
    where
        C: LendingMarket + TokenLedger + ?Sized,
    {
        let desired = max_borrow_from_supplied(position.net(), self.risk.target_ltv);
        if desired <= position.borrowed {
            return Ok(LoopOutcome::idle(position));
        }
        let mut remaining = desired - position.borrowed;
        let min_step = U256::from(MIN_BORROW_STEP);

        let mut current = position;
        let mut iterations = 0;
        let mut stop = LoopStop::DepthExhausted;

        while iterations < self.risk.borrow_depth {
            if remaining <= self.risk.min_want_to_leverage {
                stop = LoopStop::DustThreshold;
                break;
            }

            current = self.oracle.peek(chain)?;
            let can_borrow = mul_wad(current.supplied, self.collateral_factor)
                .saturating_sub(current.borrowed);
            let step = remaining.min(can_borrow);

            if step <= min_step {
                stop = if can_borrow <= min_step {
                    LoopStop::NoHeadroom
                } else {
                    LoopStop::DustThreshold
                };
                break;
            }

            chain.borrow(self.addrs.ctoken, self.addrs.strategy, step)?;
            let idle = chain.balance_of(self.addrs.want, self.addrs.strategy)?;
            chain.supply(self.addrs.ctoken, self.addrs.strategy, idle)?;

            remaining -= step;
            iterations += 1;
            debug!(
                iteration = iterations,
                %step,
                supplied = %idle,
                %remaining,
                "leverage step"
            );
        }

        if stop == LoopStop::DepthExhausted && remaining <= self.risk.min_want_to_leverage {
            stop = LoopStop::DustThreshold;
        }
        if iterations > 0 {
            current = self.oracle.peek(chain)?;
        }

        info!(
            iterations,
            stop = ?stop,
            supplied = %current.supplied,
            borrowed = %current.borrowed,
            ltv = %current.ltv(),
            "leverage loop finished"
        );
        Ok(LoopOutcome {
            iterations,
            stop,
            position: current,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::WAD;
    use crate::sim::fixtures::{self, units, CTOKEN, STRATEGY, VAULT, WANT};
    use crate::sim::SimChain;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn addrs() -> MarketAddresses {
        MarketAddresses {
            strategy: STRATEGY,
            vault: VAULT,
            want: WANT,
            ctoken: CTOKEN,
            reward_token: fixtures::REWARD,
        }
    }

    fn risk(target: Decimal, depth: u32) -> RiskParams {
        RiskParams {
            target_ltv: Wad::from_decimal(target),
            allowed_ltv_drift: Wad::from_decimal(dec!(0.01)),
            borrow_depth: depth,
            max_borrow_depth: 50,
            min_want_to_leverage: U256::ZERO,
            withdraw_slippage_tolerance_bps: 10,
            ltv_scale_of_safe_cf_bps: 11_000,
            min_liquidity: U256::ZERO,
            principal_scale_of_safe_liquidity_bps: 20_000,
            borrow_rate_offset_bps: 0,
        }
    }

    fn supplied_chain(amount: U256) -> (SimChain, PositionOracle) {
        let mut chain = fixtures::standard_chain();
        chain.mint(WANT, STRATEGY, amount);
        chain.supply(CTOKEN, STRATEGY, amount).unwrap();
        (chain, PositionOracle::new(&addrs()))
    }

    fn run(chain: &mut SimChain, oracle: &PositionOracle, risk: &RiskParams) -> LoopOutcome {
        let addrs = addrs();
        let engine = LeverageEngine {
            oracle,
            addrs: &addrs,
            risk,
            collateral_factor: Wad::from_decimal(dec!(0.8)),
        };
        let position = oracle.refresh(chain).unwrap();
        engine.run(chain, position).unwrap()
    }

    #[test]
    fn test_lever_up_from_zero_reaches_target() {
        let (mut chain, oracle) = supplied_chain(units(1000));
        let risk = risk(dec!(0.7), 12);
        let outcome = run(&mut chain, &oracle, &risk);

        let ltv = outcome.position.ltv();
        assert!(ltv <= risk.target_ltv);
        assert!(ltv >= Wad::from_decimal(dec!(0.699)));
        assert_eq!(outcome.stop, LoopStop::DustThreshold);
        // 1000 net at 70% → 2333.33 borrowed
        assert_eq!(outcome.position.net(), units(1000));
        assert!(outcome.iterations <= 12);
        assert_eq!(chain.balance_of(WANT, STRATEGY).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_depth_one_stops_on_headroom() {
        let (mut chain, oracle) = supplied_chain(units(1000));
        let outcome = run(&mut chain, &oracle, &risk(dec!(0.7), 1));
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.stop, LoopStop::DepthExhausted);
        // first step borrows the full 80% headroom
        assert_eq!(outcome.position.borrowed, units(800));
    }

    #[test]
    fn test_already_at_target_is_idle() {
        let (mut chain, oracle) = supplied_chain(units(1000));
        chain.borrow(CTOKEN, STRATEGY, units(750)).unwrap();
        let outcome = run(&mut chain, &oracle, &risk(dec!(0.7), 12));
        assert_eq!(outcome.iterations, 0);
        assert_eq!(outcome.stop, LoopStop::AlreadyAtTarget);
    }

    #[test]
    fn test_failing_borrow_propagates() {
        let (mut chain, oracle) = supplied_chain(units(1000));
        chain.set_failing("borrow", true);
        let addrs = addrs();
        let risk = risk(dec!(0.7), 12);
        let engine = LeverageEngine {
            oracle: &oracle,
            addrs: &addrs,
            risk: &risk,
            collateral_factor: Wad::from_decimal(dec!(0.8)),
        };
        let position = oracle.refresh(&mut chain).unwrap();
        let err = engine.run(&mut chain, position).unwrap_err();
        assert!(matches!(err, StrategyError::Chain(_)));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn lever_up_never_exceeds_target_or_cf(
            deposit in 1u64..5_000u64,
            target_bps in 0u64..7_900u64,
            depth in 1u32..20u32,
        ) {
            let (mut chain, oracle) = supplied_chain(units(deposit));
            let target = Decimal::from(target_bps) / dec!(10000);
            let risk = risk(target, depth);
            let outcome = run(&mut chain, &oracle, &risk);

            let pos = outcome.position;
            prop_assert!(pos.ltv() <= risk.target_ltv);
            prop_assert!(pos.borrowed <= pos.supplied * U256::from(8u8) / U256::from(10u8));
            prop_assert!(outcome.iterations <= depth);
            prop_assert_eq!(pos.net(), units(deposit));
            prop_assert!(pos.ltv().raw() < WAD);
        }
    }
}
