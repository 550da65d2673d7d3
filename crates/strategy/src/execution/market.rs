use alloy::primitives::{Address, U256};

use crate::constants::WAD;
use crate::errors::ChainError;
use crate::types::wad_ray::{mul_div, Wad};

use super::venues::{ConcentratedVenue, ConstantProductVenue};

/// `getAccountSnapshot` result: cToken balance, borrow balance (stored, no
/// accrual) and the stored exchange rate (WAD-scaled underlying per cToken).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccountSnapshot {
    pub token_balance: U256,
    pub borrowed: U256,
    pub exchange_rate: U256,
}

impl AccountSnapshot {
    /// Underlying value of the cToken balance at the stored exchange rate.
    pub fn supplied_underlying(&self) -> U256 {
        mul_div(self.token_balance, self.exchange_rate, WAD)
    }
}

/// `markets(cToken)` result from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketInfo {
    pub is_listed: bool,
    pub collateral_factor: Wad,
    pub is_comped: bool,
}

/// Compound-style lending market. `account` is the position owner
/// (the caller on-chain).
pub trait LendingMarket {
    fn supply(&mut self, market: Address, account: Address, amount: U256) -> Result<(), ChainError>;

    fn borrow(&mut self, market: Address, account: Address, amount: U256) -> Result<(), ChainError>;

    fn redeem_underlying(
        &mut self,
        market: Address,
        account: Address,
        amount: U256,
    ) -> Result<(), ChainError>;

    fn repay_borrow(
        &mut self,
        market: Address,
        account: Address,
        amount: U256,
    ) -> Result<(), ChainError>;

    /// Accrues interest, then returns the account's supplied underlying.
    fn balance_of_underlying(&mut self, market: Address, account: Address)
        -> Result<U256, ChainError>;

    /// Accrues interest, then returns the account's borrow balance.
    fn borrow_balance_current(
        &mut self,
        market: Address,
        account: Address,
    ) -> Result<U256, ChainError>;

    /// Side-effect-free view at the last accrual.
    fn get_account_snapshot(
        &self,
        market: Address,
        account: Address,
    ) -> Result<AccountSnapshot, ChainError>;

    /// WAD-scaled rate per block.
    fn borrow_rate_per_block(&self, market: Address) -> Result<U256, ChainError>;

    /// WAD-scaled rate per block.
    fn supply_rate_per_block(&self, market: Address) -> Result<U256, ChainError>;

    fn get_cash(&self, market: Address) -> Result<U256, ChainError>;

    fn total_reserves(&self, market: Address) -> Result<U256, ChainError>;

    fn total_borrows(&self, market: Address) -> Result<U256, ChainError>;

    /// Total cToken supply (not underlying).
    fn total_supply(&self, market: Address) -> Result<U256, ChainError>;
}

/// Comptroller-style registry: collateral factors and reward distribution.
pub trait MarketRegistry {
    fn markets(&self, market: Address) -> Result<MarketInfo, ChainError>;

    /// Transfer all rewards accrued by `account` in `markets` to `account`.
    fn claim_rewards(&mut self, account: Address, markets: &[Address]) -> Result<(), ChainError>;

    /// Rewards accrued but not yet claimed.
    fn rewards_accrued(&self, account: Address) -> Result<U256, ChainError>;

    /// Reward tokens per block distributed to all borrowers of `market`.
    fn borrow_reward_rate(&self, market: Address) -> Result<U256, ChainError>;

    /// Reward tokens per block distributed to all suppliers of `market`.
    fn supply_reward_rate(&self, market: Address) -> Result<U256, ChainError>;
}

/// Token balances. Transfer semantics are the ledger's concern.
pub trait TokenLedger {
    fn balance_of(&self, token: Address, account: Address) -> Result<U256, ChainError>;

    fn transfer(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), ChainError>;
}

/// Transaction-level atomicity: every façade operation runs between a
/// `snapshot` and either `commit` or `revert_to`.
pub trait Checkpoint {
    fn snapshot(&mut self) -> usize;

    fn revert_to(&mut self, id: usize) -> Result<(), ChainError>;

    fn commit(&mut self, id: usize) -> Result<(), ChainError>;

    /// Seconds; used for swap deadlines.
    fn block_timestamp(&self) -> u64;
}

/// Everything the strategy needs from the outside world.
pub trait Chain:
    LendingMarket + MarketRegistry + TokenLedger + ConstantProductVenue + ConcentratedVenue + Checkpoint
{
}

impl<T> Chain for T where
    T: LendingMarket
        + MarketRegistry
        + TokenLedger
        + ConstantProductVenue
        + ConcentratedVenue
        + Checkpoint
{
}
