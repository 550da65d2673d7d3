//! Reward harvester: claim, swap to want along the configured route.
//!
//! Re-depositing the proceeds is the caller's job, since it depends on
//! whether the strategy is paused.

use alloy::primitives::U256;
use tracing::{debug, info};

use crate::config::MarketAddresses;
use crate::constants::SWAP_DEADLINE_SECONDS;
use crate::errors::StrategyError;
use crate::execution::{execute_route, quote_route, Chain};
use crate::types::{HarvestReport, SwapRoute};

pub struct Harvester<'a> {
    pub addrs: &'a MarketAddresses,
    pub route: &'a SwapRoute,
}

impl Harvester<'_> {
    /// Claim rewards from the market and swap the whole reward balance to
    /// want.
    pub fn harvest<C: Chain + ?Sized>(&self, chain: &mut C) -> Result<HarvestReport, StrategyError> {
        let strategy = self.addrs.strategy;
        chain.claim_rewards(strategy, &[self.addrs.ctoken])?;

        let reward = chain.balance_of(self.addrs.reward_token, strategy)?;
        if reward.is_zero() {
            debug!("no rewards to harvest");
            return Ok(HarvestReport::default());
        }

        let quoted = quote_route(chain, self.route, reward)?;
        let before = chain.balance_of(self.addrs.want, strategy)?;
        let deadline = chain
            .block_timestamp()
            .saturating_add(SWAP_DEADLINE_SECONDS);
        execute_route(chain, self.route, strategy, reward, deadline)?;
        let after = chain.balance_of(self.addrs.want, strategy)?;

        let report = HarvestReport {
            reward_claimed: reward,
            want_gained: after.saturating_sub(before),
            quoted_want: quoted,
        };
        info!(
            reward = %report.reward_claimed,
            want_gained = %report.want_gained,
            quoted = %report.quoted_want,
            venue = self.route.venue.as_str(),
            "rewards harvested"
        );
        Ok(report)
    }

    /// Want value of claimable plus already-held rewards at the current
    /// router quote.
    pub fn estimate<C: Chain + ?Sized>(&self, chain: &C) -> Result<U256, StrategyError> {
        let strategy = self.addrs.strategy;
        let pending = chain.rewards_accrued(strategy)?;
        let held = chain.balance_of(self.addrs.reward_token, strategy)?;
        let total = pending.saturating_add(held);
        if total.is_zero() {
            return Ok(U256::ZERO);
        }
        Ok(quote_route(chain, self.route, total)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{LendingMarket, TokenLedger};
    use crate::sim::fixtures::{self, units, CL_FEE, CTOKEN, MID, REWARD, STRATEGY, VAULT, WANT};
    use crate::types::RouteVenue;

    fn addrs() -> MarketAddresses {
        MarketAddresses {
            strategy: STRATEGY,
            vault: VAULT,
            want: WANT,
            ctoken: CTOKEN,
            reward_token: REWARD,
        }
    }

    fn accrued_chain() -> crate::sim::SimChain {
        let mut chain = fixtures::rewarding_chain();
        chain.mint(WANT, STRATEGY, units(1000));
        chain.supply(CTOKEN, STRATEGY, units(1000)).unwrap();
        chain.borrow(CTOKEN, STRATEGY, units(500)).unwrap();
        chain.mine(10);
        chain
    }

    #[test]
    fn test_harvest_constant_product_route() {
        let mut chain = accrued_chain();
        let addrs = addrs();
        let route = SwapRoute::new(vec![REWARD, MID, WANT], RouteVenue::ConstantProduct);
        let harvester = Harvester { addrs: &addrs, route: &route };

        let estimate = harvester.estimate(&chain).unwrap();
        let report = harvester.harvest(&mut chain).unwrap();

        // 10 blocks of the full borrow-side emission plus a sliver of supply-side.
        assert!(report.reward_claimed > units(10));
        assert!(report.reward_claimed < units(11));
        assert_eq!(report.want_gained, report.quoted_want);
        assert_eq!(estimate, report.quoted_want);
        assert_eq!(chain.balance_of(REWARD, STRATEGY).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_harvest_concentrated_route() {
        let mut chain = accrued_chain();
        let addrs = addrs();
        let route = SwapRoute::new(vec![REWARD, WANT], RouteVenue::Concentrated { pool_fee: CL_FEE });
        let harvester = Harvester { addrs: &addrs, route: &route };

        let report = harvester.harvest(&mut chain).unwrap();
        // 0.5 want per reward, less the 0.3% pool fee
        let expected = report.reward_claimed / U256::from(2u8) * U256::from(997u64)
            / U256::from(1000u64);
        assert!(report.want_gained.abs_diff(expected) <= U256::from(1u8));
        assert_eq!(report.want_gained, report.quoted_want);
    }

    #[test]
    fn test_harvest_without_rewards_is_noop() {
        let mut chain = fixtures::standard_chain();
        let addrs = addrs();
        let route = SwapRoute::new(vec![REWARD, MID, WANT], RouteVenue::ConstantProduct);
        let harvester = Harvester { addrs: &addrs, route: &route };
        assert_eq!(harvester.harvest(&mut chain).unwrap(), HarvestReport::default());
        assert_eq!(harvester.estimate(&chain).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_missing_pool_fails_harvest() {
        let mut chain = accrued_chain();
        let addrs = addrs();
        let route = SwapRoute::new(vec![REWARD, WANT], RouteVenue::Concentrated { pool_fee: 500 });
        let harvester = Harvester { addrs: &addrs, route: &route };
        let err = harvester.harvest(&mut chain).unwrap_err();
        assert!(matches!(err, StrategyError::Chain(_)));
    }
}
