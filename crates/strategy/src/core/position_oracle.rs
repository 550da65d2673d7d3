//! Reads the strategy's position from the lending market.

use alloy::primitives::Address;
use tracing::debug;

use crate::config::MarketAddresses;
use crate::errors::StrategyError;
use crate::execution::{LendingMarket, MarketRegistry};
use crate::types::{PositionSnapshot, Wad};

#[derive(Debug, Clone, Copy)]
pub struct PositionOracle {
    account: Address,
    ctoken: Address,
}

impl PositionOracle {
    pub fn new(addrs: &MarketAddresses) -> Self {
        Self {
            account: addrs.strategy,
            ctoken: addrs.ctoken,
        }
    }

    /// Accrue interest and read the current position. Mutates market state.
    pub fn refresh<C: LendingMarket + ?Sized>(
        &self,
        chain: &mut C,
    ) -> Result<PositionSnapshot, StrategyError> {
        let supplied = chain.balance_of_underlying(self.ctoken, self.account)?;
        let borrowed = chain.borrow_balance_current(self.ctoken, self.account)?;
        let position = PositionSnapshot::new(supplied, borrowed);
        debug!(%supplied, %borrowed, ltv = %position.ltv(), "position refreshed");
        Ok(position)
    }

    /// Position at the last accrual, without side effects.
    pub fn peek<C: LendingMarket + ?Sized>(
        &self,
        chain: &C,
    ) -> Result<PositionSnapshot, StrategyError> {
        let snapshot = chain.get_account_snapshot(self.ctoken, self.account)?;
        Ok(PositionSnapshot::new(
            snapshot.supplied_underlying(),
            snapshot.borrowed,
        ))
    }

    /// Live collateral factor. An unlisted market is an error.
    pub fn collateral_factor<C: MarketRegistry + ?Sized>(
        &self,
        chain: &C,
    ) -> Result<Wad, StrategyError> {
        let info = chain.markets(self.ctoken)?;
        if !info.is_listed {
            return Err(StrategyError::MarketNotListed(self.ctoken));
        }
        Ok(info.collateral_factor)
    }
}

/// `borrowed * 1e18 / supplied`, zero when either side is zero.
pub fn current_ltv(position: &PositionSnapshot) -> Wad {
    position.ltv()
}
