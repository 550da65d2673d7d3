//! Safety evaluator: decides whether the position must be unwound.
//!
//! Pure view over the market: checks run in priority order and the first
//! one that holds wins. Callers pass the position explicitly.

use alloy::primitives::U256;
use tracing::{debug, warn};

use crate::config::MarketAddresses;
use crate::constants::{BPS_PRECISION, PROFITABILITY_HORIZON_BLOCKS, WAD};
use crate::errors::StrategyError;
use crate::execution::{quote_route, Chain};
use crate::types::wad_ray::{mul_bps, mul_div};
use crate::types::{DeleverageReason, PositionSnapshot, RiskParams, SwapRoute, Wad};

/// Yield and cost of the position projected over
/// [`PROFITABILITY_HORIZON_BLOCKS`], in want.
///
/// `supply_interest` is reported only; the profitability check counts
/// reward emissions against the borrow cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProfitabilityQuote {
    pub supply_interest: U256,
    pub supply_reward_value: U256,
    pub borrow_reward_value: U256,
    pub borrow_cost: U256,
}

impl ProfitabilityQuote {
    pub fn reward_value(&self) -> U256 {
        self.supply_reward_value
            .saturating_add(self.borrow_reward_value)
    }

    /// Rewards minus borrow cost, or `None` when the cost exceeds the rewards.
    pub fn net_yield(&self) -> Option<U256> {
        self.reward_value().checked_sub(self.borrow_cost)
    }

    /// Net yield below the borrow cost marked up by `offset_bps`.
    pub fn is_unprofitable(&self, offset_bps: u32) -> bool {
        let threshold = mul_bps(self.borrow_cost, BPS_PRECISION.saturating_add(offset_bps));
        match self.net_yield() {
            Some(net) => net < threshold,
            None => true,
        }
    }
}

pub struct SafetyEvaluator<'a> {
    pub addrs: &'a MarketAddresses,
    pub risk: &'a RiskParams,
    pub route: &'a SwapRoute,
    pub collateral_factor: Wad,
}

impl SafetyEvaluator<'_> {
    pub fn evaluate<C: Chain + ?Sized>(
        &self,
        chain: &C,
        position: PositionSnapshot,
    ) -> Result<DeleverageReason, StrategyError> {
        let reason = self.first_breach(chain, position)?;
        if reason.should_deleverage() {
            warn!(
                code = reason.code(),
                reason = reason.description(),
                supplied = %position.supplied,
                borrowed = %position.borrowed,
                "safety check triggered"
            );
        }
        Ok(reason)
    }

    fn first_breach<C: Chain + ?Sized>(
        &self,
        chain: &C,
        position: PositionSnapshot,
    ) -> Result<DeleverageReason, StrategyError> {
        let ltv = position.ltv();

        // 1. Liquidation proximity
        let scaled = ltv.scale_bps(self.risk.ltv_scale_of_safe_cf_bps);
        if !ltv.is_zero() && scaled >= self.collateral_factor {
            return Ok(DeleverageReason::LtvNearLiquidation);
        }

        // 2. Drift above the band
        if ltv > self.risk.upper_band() {
            return Ok(DeleverageReason::LtvAboveTarget);
        }

        // 3. Absolute market liquidity
        let cash = chain.get_cash(self.addrs.ctoken)?;
        if cash < self.risk.min_liquidity {
            return Ok(DeleverageReason::MarketLiquidityLow);
        }

        // 4. Liquidity relative to our own principal
        let principal_floor = mul_bps(
            position.net(),
            self.risk.principal_scale_of_safe_liquidity_bps,
        );
        if cash < principal_floor {
            return Ok(DeleverageReason::LiquidityBelowPrincipal);
        }

        // 5. Profitability
        if !position.borrowed.is_zero() {
            let quote = self.profitability(chain, position)?;
            if quote.is_unprofitable(self.risk.borrow_rate_offset_bps) {
                return Ok(DeleverageReason::Unprofitable);
            }
        }

        Ok(DeleverageReason::None)
    }

    /// Project interest and rewards over the horizon. Supply rewards are
    /// scaled by our share of cTokens, borrow rewards by our share of total
    /// borrows. Each stream is valued separately through a router quote of
    /// the configured route; no trade executes.
    pub fn profitability<C: Chain + ?Sized>(
        &self,
        chain: &C,
        position: PositionSnapshot,
    ) -> Result<ProfitabilityQuote, StrategyError> {
        let ctoken = self.addrs.ctoken;
        let horizon = U256::from(PROFITABILITY_HORIZON_BLOCKS);

        let borrow_rate = chain.borrow_rate_per_block(ctoken)?;
        let supply_rate = chain.supply_rate_per_block(ctoken)?;
        let borrow_cost = mul_div(position.borrowed, borrow_rate.saturating_mul(horizon), WAD);
        let supply_interest =
            mul_div(position.supplied, supply_rate.saturating_mul(horizon), WAD);

        let account = chain.get_account_snapshot(ctoken, self.addrs.strategy)?;
        let supply_rewards = mul_div(
            chain.supply_reward_rate(ctoken)?.saturating_mul(horizon),
            account.token_balance,
            chain.total_supply(ctoken)?,
        );
        let borrow_rewards = mul_div(
            chain.borrow_reward_rate(ctoken)?.saturating_mul(horizon),
            position.borrowed,
            chain.total_borrows(ctoken)?,
        );
        let supply_reward_value = quote_rewards(chain, self.route, supply_rewards)?;
        let borrow_reward_value = quote_rewards(chain, self.route, borrow_rewards)?;

        let quote = ProfitabilityQuote {
            supply_interest,
            supply_reward_value,
            borrow_reward_value,
            borrow_cost,
        };
        debug!(
            %supply_interest,
            %supply_rewards,
            %borrow_rewards,
            reward_value = %quote.reward_value(),
            %borrow_cost,
            "profitability projected"
        );
        Ok(quote)
    }
}

fn quote_rewards<C: Chain + ?Sized>(
    chain: &C,
    route: &SwapRoute,
    amount: U256,
) -> Result<U256, StrategyError> {
    if amount.is_zero() {
        return Ok(U256::ZERO);
    }
    Ok(quote_route(chain, route, amount)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::LendingMarket;
    use crate::sim::fixtures::{self, units, CTOKEN, MID, REWARD, STRATEGY, VAULT, WANT};
    use crate::sim::SimChain;
    use crate::types::RouteVenue;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn addrs() -> MarketAddresses {
        MarketAddresses {
            strategy: STRATEGY,
            vault: VAULT,
            want: WANT,
            ctoken: CTOKEN,
            reward_token: REWARD,
        }
    }

    fn risk() -> RiskParams {
        RiskParams {
            target_ltv: Wad::from_decimal(dec!(0.7)),
            allowed_ltv_drift: Wad::from_decimal(dec!(0.01)),
            borrow_depth: 12,
            max_borrow_depth: 15,
            min_want_to_leverage: U256::ZERO,
            withdraw_slippage_tolerance_bps: 10,
            ltv_scale_of_safe_cf_bps: 11_000,
            min_liquidity: units(1_000),
            principal_scale_of_safe_liquidity_bps: 20_000,
            borrow_rate_offset_bps: 0,
        }
    }

    fn route() -> SwapRoute {
        SwapRoute::new(vec![REWARD, MID, WANT], RouteVenue::ConstantProduct)
    }

    fn evaluate(chain: &SimChain, risk: &RiskParams, position: PositionSnapshot) -> DeleverageReason {
        let addrs = addrs();
        let route = route();
        let evaluator = SafetyEvaluator {
            addrs: &addrs,
            risk,
            route: &route,
            collateral_factor: Wad::from_decimal(dec!(0.8)),
        };
        evaluator.evaluate(chain, position).unwrap()
    }

    fn pos(supplied: u64, borrowed: u64) -> PositionSnapshot {
        PositionSnapshot::new(units(supplied), units(borrowed))
    }

    #[test]
    fn test_healthy_position_needs_nothing() {
        let chain = fixtures::standard_chain();
        assert_eq!(evaluate(&chain, &risk(), pos(1000, 700)), DeleverageReason::None);
        assert_eq!(evaluate(&chain, &risk(), pos(0, 0)), DeleverageReason::None);
    }

    #[test]
    fn test_near_liquidation() {
        let chain = fixtures::standard_chain();
        // 0.73 * 1.1 = 0.803 >= 0.8
        assert_eq!(
            evaluate(&chain, &risk(), pos(1000, 730)),
            DeleverageReason::LtvNearLiquidation
        );
    }

    #[test]
    fn test_drift_above_target() {
        let chain = fixtures::standard_chain();
        // 0.72 * 1.1 = 0.792 < 0.8, but above 0.71
        assert_eq!(
            evaluate(&chain, &risk(), pos(1000, 720)),
            DeleverageReason::LtvAboveTarget
        );
    }

    #[test]
    fn test_market_liquidity_low() {
        let chain = fixtures::standard_chain();
        let mut risk = risk();
        risk.min_liquidity = units(2_000_000);
        assert_eq!(
            evaluate(&chain, &risk, pos(1000, 700)),
            DeleverageReason::MarketLiquidityLow
        );
    }

    #[test]
    fn test_liquidity_below_principal() {
        let chain = fixtures::standard_chain();
        // 1M cash < 2 * 600k net
        assert_eq!(
            evaluate(&chain, &risk(), pos(2_000_000, 1_400_000)),
            DeleverageReason::LiquidityBelowPrincipal
        );
    }

    #[test]
    fn test_unprofitable_without_rewards() {
        let mut chain = fixtures::standard_chain();
        chain.market_mut().borrow_rate_per_block = WAD / U256::from(1_000_000u64);
        // Nobody borrows from the market, so suppliers earn nothing and no
        // rewards are emitted to offset the borrow cost.
        assert_eq!(
            evaluate(&chain, &risk(), pos(1000, 700)),
            DeleverageReason::Unprofitable
        );
    }

    #[test]
    fn test_rewards_restore_profitability() {
        let mut chain = fixtures::rewarding_chain();
        chain.mint(WANT, STRATEGY, units(1000));
        chain.supply(CTOKEN, STRATEGY, units(1000)).unwrap();
        chain.borrow(CTOKEN, STRATEGY, units(700)).unwrap();
        let position = pos(1000, 700);

        let addrs = addrs();
        let route = route();
        let risk = risk();
        let evaluator = SafetyEvaluator {
            addrs: &addrs,
            risk: &risk,
            route: &route,
            collateral_factor: Wad::from_decimal(dec!(0.8)),
        };
        let quote = evaluator.profitability(&chain, position).unwrap();
        assert!(quote.borrow_reward_value > U256::ZERO);
        assert!(quote.supply_reward_value > U256::ZERO);
        assert!(!quote.is_unprofitable(0));
        assert_eq!(evaluator.evaluate(&chain, position).unwrap(), DeleverageReason::None);
    }

    #[test]
    fn test_offset_raises_threshold() {
        // Net yield 1150 against a cost of 1000.
        let quote = ProfitabilityQuote {
            supply_interest: U256::ZERO,
            supply_reward_value: U256::from(1400u64),
            borrow_reward_value: U256::from(750u64),
            borrow_cost: U256::from(1000u64),
        };
        assert_eq!(quote.net_yield(), Some(U256::from(1150u64)));
        assert!(!quote.is_unprofitable(0));
        assert!(!quote.is_unprofitable(1500));
        assert!(quote.is_unprofitable(1600));
    }

    #[test]
    fn test_supply_interest_does_not_offset_cost() {
        let quote = ProfitabilityQuote {
            supply_interest: U256::from(2000u64),
            supply_reward_value: U256::ZERO,
            borrow_reward_value: U256::ZERO,
            borrow_cost: U256::from(1000u64),
        };
        assert_eq!(quote.net_yield(), None);
        assert!(quote.is_unprofitable(0));
    }

    proptest! {
        #[test]
        fn near_liquidation_wins_regardless_of_other_params(
            borrowed in 728u64..800u64,
            min_liquidity in 0u64..10_000_000u64,
            principal_scale in 0u32..100_000u32,
            offset in 0u32..10_000u32,
        ) {
            let chain = fixtures::standard_chain();
            let mut risk = risk();
            risk.min_liquidity = units(min_liquidity);
            risk.principal_scale_of_safe_liquidity_bps = principal_scale;
            risk.borrow_rate_offset_bps = offset;
            prop_assert_eq!(
                evaluate(&chain, &risk, pos(1000, borrowed)),
                DeleverageReason::LtvNearLiquidation
            );
        }
    }
}
