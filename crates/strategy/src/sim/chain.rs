//! In-memory chain implementing every collaborator trait.

use std::collections::{HashMap, HashSet};

use alloy::primitives::{address, Address, U256};
use tracing::debug;

use crate::core::keeper::BlockProducer;
use crate::errors::ChainError;
use crate::execution::{
    AccountSnapshot, Checkpoint, ConcentratedVenue, ConstantProductVenue, ExactInputSingleParams,
    Hop, LendingMarket, MarketInfo, MarketRegistry, TokenLedger,
};
use crate::types::Wad;

use super::market::SimMarket;
use super::venues::{ClPool, CpPool};

/// Holder of constant-product pool reserves.
pub const CP_ROUTER: Address = address!("00000000000000000000000000000000000000f1");
/// Holder of concentrated pool liquidity.
pub const CL_ROUTER: Address = address!("00000000000000000000000000000000000000f2");

/// Everything a checkpoint captures.
#[derive(Debug, Clone)]
struct SimState {
    block: u64,
    balances: HashMap<(Address, Address), U256>,
    market: SimMarket,
    cp_pools: HashMap<(Address, Address, bool), CpPool>,
    cl_pools: HashMap<(Address, Address, u32), ClPool>,
}

/// Simulated chain: one lending market, a registry paying `reward_token`,
/// two swap venues and a token ledger.
#[derive(Debug, Clone)]
pub struct SimChain {
    state: SimState,
    checkpoints: Vec<SimState>,
    reward_token: Address,
    genesis_timestamp: u64,
    seconds_per_block: u64,
    /// Calls forced to revert. Survives checkpoint reverts.
    failing: HashSet<&'static str>,
}

impl SimChain {
    pub fn new(market: SimMarket, reward_token: Address) -> Self {
        Self {
            state: SimState {
                block: 0,
                balances: HashMap::new(),
                market,
                cp_pools: HashMap::new(),
                cl_pools: HashMap::new(),
            },
            checkpoints: Vec::new(),
            reward_token,
            genesis_timestamp: 1_700_000_000,
            seconds_per_block: 3,
            failing: HashSet::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Test and paper-mode controls
    // -----------------------------------------------------------------------

    pub fn block(&self) -> u64 {
        self.state.block
    }

    /// Advance `blocks` blocks. Interest accrues lazily on the next
    /// mutating market call.
    pub fn mine(&mut self, blocks: u64) {
        self.state.block = self.state.block.saturating_add(blocks);
    }

    pub fn market(&self) -> &SimMarket {
        &self.state.market
    }

    pub fn market_mut(&mut self) -> &mut SimMarket {
        &mut self.state.market
    }

    pub fn reward_token(&self) -> Address {
        self.reward_token
    }

    /// Credit `amount` of `token` out of thin air.
    pub fn mint(&mut self, token: Address, to: Address, amount: U256) {
        let balance = self.state.balances.entry((token, to)).or_default();
        *balance = balance.saturating_add(amount);
    }

    /// Force every subsequent `call` to revert (or stop doing so).
    pub fn set_failing(&mut self, call: &'static str, failing: bool) {
        if failing {
            self.failing.insert(call);
        } else {
            self.failing.remove(call);
        }
    }

    pub fn add_cp_pool(
        &mut self,
        a: Address,
        b: Address,
        reserve_a: U256,
        reserve_b: U256,
        stable: bool,
    ) {
        self.mint(a, CP_ROUTER, reserve_a);
        self.mint(b, CP_ROUTER, reserve_b);
        self.state
            .cp_pools
            .insert(CpPool::key(a, b, stable), CpPool::new(a, b, reserve_a, reserve_b, stable));
    }

    /// Add a one-directional concentrated pool and fund its output side.
    pub fn add_cl_pool(
        &mut self,
        token_in: Address,
        token_out: Address,
        fee: u32,
        price: U256,
        liquidity: U256,
    ) {
        self.mint(token_out, CL_ROUTER, liquidity);
        self.state.cl_pools.insert(
            (token_in, token_out, fee),
            ClPool { token_in, token_out, fee, price },
        );
    }

    /// Reserves of the pool as `(reserve_a, reserve_b)`.
    pub fn cp_reserves(&self, a: Address, b: Address, stable: bool) -> Option<(U256, U256)> {
        let pool = self.state.cp_pools.get(&CpPool::key(a, b, stable))?;
        Some(if pool.token0 == a {
            (pool.reserve0, pool.reserve1)
        } else {
            (pool.reserve1, pool.reserve0)
        })
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn check_failing(&self, call: &'static str) -> Result<(), ChainError> {
        if self.failing.contains(call) {
            return Err(ChainError::reverted(call, "forced failure"));
        }
        Ok(())
    }

    fn ensure_market(&self, call: &'static str, market: Address) -> Result<(), ChainError> {
        if market != self.state.market.address {
            return Err(ChainError::reverted(call, format!("unknown market {market}")));
        }
        Ok(())
    }

    fn cash(&self) -> U256 {
        let m = &self.state.market;
        self.balance(m.underlying, m.address)
    }

    fn balance(&self, token: Address, account: Address) -> U256 {
        self.state
            .balances
            .get(&(token, account))
            .copied()
            .unwrap_or_default()
    }

    fn move_tokens(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), ChainError> {
        let have = self.balance(token, from);
        if have < amount {
            return Err(ChainError::InsufficientBalance {
                token,
                account: from,
                have,
                need: amount,
            });
        }
        self.state.balances.insert((token, from), have - amount);
        let to_balance = self.state.balances.entry((token, to)).or_default();
        *to_balance = to_balance.saturating_add(amount);
        Ok(())
    }

    fn accrue(&mut self) {
        let block = self.state.block;
        self.state.market.accrue(block);
    }

    fn check_deadline(&self, call: &'static str, deadline: u64) -> Result<(), ChainError> {
        if deadline < self.block_timestamp() {
            return Err(ChainError::reverted(call, "deadline expired"));
        }
        Ok(())
    }

    fn best_cp_pool(&self, token_in: Address, token_out: Address, amount_in: U256) -> Option<(U256, bool)> {
        [false, true]
            .into_iter()
            .filter_map(|stable| {
                self.state
                    .cp_pools
                    .get(&CpPool::key(token_in, token_out, stable))
                    .map(|pool| (pool.amount_out(token_in, amount_in), stable))
            })
            .max_by_key(|(out, _)| *out)
    }
}

// ---------------------------------------------------------------------------
// Lending market
// ---------------------------------------------------------------------------

impl LendingMarket for SimChain {
    fn supply(&mut self, market: Address, account: Address, amount: U256) -> Result<(), ChainError> {
        self.check_failing("supply")?;
        self.ensure_market("supply", market)?;
        self.accrue();
        let cash = self.cash();
        let underlying = self.state.market.underlying;
        let have = self.balance(underlying, account);
        if have < amount {
            return Err(ChainError::InsufficientBalance {
                token: underlying,
                account,
                have,
                need: amount,
            });
        }
        self.state.market.mint(account, amount, cash)?;
        self.move_tokens(underlying, account, market, amount)
    }

    fn borrow(&mut self, market: Address, account: Address, amount: U256) -> Result<(), ChainError> {
        self.check_failing("borrow")?;
        self.ensure_market("borrow", market)?;
        self.accrue();
        let cash = self.cash();
        self.state.market.borrow(account, amount, cash)?;
        let underlying = self.state.market.underlying;
        self.move_tokens(underlying, market, account, amount)
    }

    fn redeem_underlying(
        &mut self,
        market: Address,
        account: Address,
        amount: U256,
    ) -> Result<(), ChainError> {
        self.check_failing("redeem_underlying")?;
        self.ensure_market("redeem_underlying", market)?;
        self.accrue();
        let cash = self.cash();
        self.state.market.redeem_underlying(account, amount, cash)?;
        let underlying = self.state.market.underlying;
        self.move_tokens(underlying, market, account, amount)
    }

    fn repay_borrow(
        &mut self,
        market: Address,
        account: Address,
        amount: U256,
    ) -> Result<(), ChainError> {
        self.check_failing("repay_borrow")?;
        self.ensure_market("repay_borrow", market)?;
        self.accrue();
        let underlying = self.state.market.underlying;
        let have = self.balance(underlying, account);
        if have < amount {
            return Err(ChainError::InsufficientBalance {
                token: underlying,
                account,
                have,
                need: amount,
            });
        }
        self.state.market.repay(account, amount)?;
        self.move_tokens(underlying, account, market, amount)
    }

    fn balance_of_underlying(&mut self, market: Address, account: Address) -> Result<U256, ChainError> {
        self.check_failing("balance_of_underlying")?;
        self.ensure_market("balance_of_underlying", market)?;
        self.accrue();
        let cash = self.cash();
        Ok(self.state.market.supplied_underlying(account, cash))
    }

    fn borrow_balance_current(
        &mut self,
        market: Address,
        account: Address,
    ) -> Result<U256, ChainError> {
        self.check_failing("borrow_balance_current")?;
        self.ensure_market("borrow_balance_current", market)?;
        self.accrue();
        Ok(self.state.market.borrow_balance(account))
    }

    fn get_account_snapshot(
        &self,
        market: Address,
        account: Address,
    ) -> Result<AccountSnapshot, ChainError> {
        self.check_failing("get_account_snapshot")?;
        self.ensure_market("get_account_snapshot", market)?;
        let m = &self.state.market;
        Ok(AccountSnapshot {
            token_balance: m.ctokens_of(account),
            borrowed: m.borrow_balance(account),
            exchange_rate: m.exchange_rate(self.cash()),
        })
    }

    fn borrow_rate_per_block(&self, market: Address) -> Result<U256, ChainError> {
        self.ensure_market("borrow_rate_per_block", market)?;
        Ok(self.state.market.borrow_rate_per_block)
    }

    fn supply_rate_per_block(&self, market: Address) -> Result<U256, ChainError> {
        self.ensure_market("supply_rate_per_block", market)?;
        Ok(self.state.market.supply_rate_per_block(self.cash()))
    }

    fn get_cash(&self, market: Address) -> Result<U256, ChainError> {
        self.check_failing("get_cash")?;
        self.ensure_market("get_cash", market)?;
        Ok(self.cash())
    }

    fn total_reserves(&self, market: Address) -> Result<U256, ChainError> {
        self.ensure_market("total_reserves", market)?;
        Ok(self.state.market.total_reserves())
    }

    fn total_borrows(&self, market: Address) -> Result<U256, ChainError> {
        self.ensure_market("total_borrows", market)?;
        Ok(self.state.market.total_borrows())
    }

    fn total_supply(&self, market: Address) -> Result<U256, ChainError> {
        self.ensure_market("total_supply", market)?;
        Ok(self.state.market.total_supply())
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

impl MarketRegistry for SimChain {
    fn markets(&self, market: Address) -> Result<MarketInfo, ChainError> {
        let m = &self.state.market;
        if market != m.address {
            return Ok(MarketInfo {
                is_listed: false,
                collateral_factor: Wad::ZERO,
                is_comped: false,
            });
        }
        Ok(MarketInfo {
            is_listed: m.listed,
            collateral_factor: m.collateral_factor,
            is_comped: !(m.supply_reward_rate.is_zero() && m.borrow_reward_rate.is_zero()),
        })
    }

    fn claim_rewards(&mut self, account: Address, markets: &[Address]) -> Result<(), ChainError> {
        self.check_failing("claim_rewards")?;
        if !markets.contains(&self.state.market.address) {
            return Ok(());
        }
        self.accrue();
        let amount = self.state.market.take_rewards(account);
        if !amount.is_zero() {
            let reward = self.reward_token;
            self.mint(reward, account, amount);
            debug!(%account, %amount, "sim rewards claimed");
        }
        Ok(())
    }

    fn rewards_accrued(&self, account: Address) -> Result<U256, ChainError> {
        Ok(self.state.market.pending_rewards(account, self.state.block))
    }

    fn borrow_reward_rate(&self, market: Address) -> Result<U256, ChainError> {
        self.ensure_market("borrow_reward_rate", market)?;
        Ok(self.state.market.borrow_reward_rate)
    }

    fn supply_reward_rate(&self, market: Address) -> Result<U256, ChainError> {
        self.ensure_market("supply_reward_rate", market)?;
        Ok(self.state.market.supply_reward_rate)
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

impl TokenLedger for SimChain {
    fn balance_of(&self, token: Address, account: Address) -> Result<U256, ChainError> {
        Ok(self.balance(token, account))
    }

    fn transfer(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), ChainError> {
        self.check_failing("transfer")?;
        self.move_tokens(token, from, to, amount)
    }
}

// ---------------------------------------------------------------------------
// Venues
// ---------------------------------------------------------------------------

impl ConstantProductVenue for SimChain {
    fn quote(
        &self,
        amount_in: U256,
        token_in: Address,
        token_out: Address,
    ) -> Result<(U256, bool), ChainError> {
        self.check_failing("quote")?;
        self.best_cp_pool(token_in, token_out, amount_in)
            .ok_or_else(|| ChainError::reverted("quote", format!("no pool {token_in} -> {token_out}")))
    }

    fn swap_exact_in(
        &mut self,
        sender: Address,
        amount_in: U256,
        min_out: U256,
        hops: &[Hop],
        recipient: Address,
        deadline: u64,
    ) -> Result<U256, ChainError> {
        self.check_failing("swap_exact_in")?;
        self.check_deadline("swap_exact_in", deadline)?;
        let first = hops
            .first()
            .ok_or_else(|| ChainError::reverted("swap_exact_in", "empty route"))?;
        self.move_tokens(first.from, sender, CP_ROUTER, amount_in)?;

        let mut amount = amount_in;
        for hop in hops {
            let key = CpPool::key(hop.from, hop.to, hop.stable);
            let pool = self.state.cp_pools.get_mut(&key).ok_or_else(|| {
                ChainError::reverted("swap_exact_in", format!("no pool {} -> {}", hop.from, hop.to))
            })?;
            let out = pool.amount_out(hop.from, amount);
            pool.apply_swap(hop.from, amount, out);
            amount = out;
        }

        if amount < min_out {
            return Err(ChainError::reverted("swap_exact_in", "insufficient output amount"));
        }
        let last = hops.last().map(|h| h.to).unwrap_or(first.to);
        self.move_tokens(last, CP_ROUTER, recipient, amount)?;
        Ok(amount)
    }
}

impl ConcentratedVenue for SimChain {
    fn quote_exact_in_single(
        &self,
        token_in: Address,
        token_out: Address,
        fee: u32,
        amount_in: U256,
    ) -> Result<U256, ChainError> {
        self.check_failing("quote_exact_in_single")?;
        self.state
            .cl_pools
            .get(&(token_in, token_out, fee))
            .map(|pool| pool.amount_out(amount_in))
            .ok_or_else(|| {
                ChainError::reverted(
                    "quote_exact_in_single",
                    format!("no pool {token_in} -> {token_out} fee {fee}"),
                )
            })
    }

    fn swap_exact_in_single(
        &mut self,
        sender: Address,
        params: ExactInputSingleParams,
    ) -> Result<U256, ChainError> {
        self.check_failing("swap_exact_in_single")?;
        self.check_deadline("swap_exact_in_single", params.deadline)?;
        let out = self.quote_exact_in_single(
            params.token_in,
            params.token_out,
            params.fee,
            params.amount_in,
        )?;
        if out < params.amount_out_minimum {
            return Err(ChainError::reverted("swap_exact_in_single", "too little received"));
        }
        self.move_tokens(params.token_in, sender, CL_ROUTER, params.amount_in)?;
        self.move_tokens(params.token_out, CL_ROUTER, params.recipient, out)?;
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Checkpoints
// ---------------------------------------------------------------------------

impl BlockProducer for SimChain {
    fn advance(&mut self, blocks: u64) {
        self.mine(blocks);
        debug!(block = self.state.block, "mined");
    }
}

impl Checkpoint for SimChain {
    fn snapshot(&mut self) -> usize {
        self.checkpoints.push(self.state.clone());
        self.checkpoints.len() - 1
    }

    /// Restore the state captured by `id` and drop it with every later one.
    fn revert_to(&mut self, id: usize) -> Result<(), ChainError> {
        if id >= self.checkpoints.len() {
            return Err(ChainError::UnknownCheckpoint(id));
        }
        self.checkpoints.truncate(id + 1);
        if let Some(state) = self.checkpoints.pop() {
            self.state = state;
        }
        Ok(())
    }

    fn commit(&mut self, id: usize) -> Result<(), ChainError> {
        if id >= self.checkpoints.len() {
            return Err(ChainError::UnknownCheckpoint(id));
        }
        self.checkpoints.truncate(id);
        Ok(())
    }

    fn block_timestamp(&self) -> u64 {
        self.genesis_timestamp + self.state.block * self.seconds_per_block
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::fixtures::{self, units, ALICE, MID, REWARD, WANT};

    #[test]
    fn test_supply_moves_tokens_into_market() {
        let mut chain = fixtures::standard_chain();
        let ctoken = fixtures::CTOKEN;
        let before = chain.get_cash(ctoken).unwrap();
        chain.supply(ctoken, ALICE, units(100)).unwrap();
        assert_eq!(chain.get_cash(ctoken).unwrap(), before + units(100));
        assert_eq!(chain.balance_of_underlying(ctoken, ALICE).unwrap(), units(100));
    }

    #[test]
    fn test_supply_without_funds_fails() {
        let mut chain = fixtures::standard_chain();
        let err = chain
            .supply(fixtures::CTOKEN, fixtures::STRATEGY, units(1))
            .unwrap_err();
        assert!(matches!(err, ChainError::InsufficientBalance { .. }));
    }

    #[test]
    fn test_repay_more_than_debt_reverts() {
        let mut chain = fixtures::standard_chain();
        let ctoken = fixtures::CTOKEN;
        chain.supply(ctoken, ALICE, units(100)).unwrap();
        chain.borrow(ctoken, ALICE, units(50)).unwrap();
        let err = chain.repay_borrow(ctoken, ALICE, units(51)).unwrap_err();
        assert!(matches!(err, ChainError::Reverted { call: "repay_borrow", .. }));
    }

    #[test]
    fn test_snapshot_revert_restores_balances() {
        let mut chain = fixtures::standard_chain();
        let id = chain.snapshot();
        chain.supply(fixtures::CTOKEN, ALICE, units(10)).unwrap();
        chain.mine(5);
        chain.revert_to(id).unwrap();
        assert_eq!(chain.balance_of(WANT, ALICE).unwrap(), fixtures::user_funds());
        assert_eq!(chain.block(), 0);
        assert!(chain.revert_to(id).is_err());
    }

    #[test]
    fn test_commit_discards_checkpoint() {
        let mut chain = fixtures::standard_chain();
        let id = chain.snapshot();
        chain.mint(WANT, ALICE, units(1));
        chain.commit(id).unwrap();
        assert!(matches!(chain.revert_to(id), Err(ChainError::UnknownCheckpoint(0))));
    }

    #[test]
    fn test_forced_failure_survives_revert() {
        let mut chain = fixtures::standard_chain();
        let id = chain.snapshot();
        chain.set_failing("borrow", true);
        chain.revert_to(id).unwrap();
        assert!(chain.borrow(fixtures::CTOKEN, ALICE, units(1)).is_err());
    }

    #[test]
    fn test_cp_multi_hop_swap() {
        let mut chain = fixtures::standard_chain();
        chain.mint(REWARD, ALICE, units(10));
        let hops = [
            Hop { from: REWARD, to: MID, stable: false },
            Hop { from: MID, to: WANT, stable: false },
        ];
        let deadline = chain.block_timestamp() + 60;
        let out = chain
            .swap_exact_in(ALICE, units(10), U256::ZERO, &hops, ALICE, deadline)
            .unwrap();
        assert!(!out.is_zero());
        assert_eq!(chain.balance_of(REWARD, ALICE).unwrap(), U256::ZERO);
        assert_eq!(chain.balance_of(WANT, ALICE).unwrap(), fixtures::user_funds() + out);
    }

    #[test]
    fn test_expired_deadline_reverts() {
        let mut chain = fixtures::standard_chain();
        chain.mint(REWARD, ALICE, units(1));
        chain.mine(100);
        let hops = [Hop { from: REWARD, to: MID, stable: false }];
        let err = chain
            .swap_exact_in(ALICE, units(1), U256::ZERO, &hops, ALICE, 0)
            .unwrap_err();
        assert!(err.to_string().contains("deadline"));
    }

    #[test]
    fn test_unknown_market_is_unlisted() {
        let chain = fixtures::standard_chain();
        let info = chain.markets(MID).unwrap();
        assert!(!info.is_listed);
        assert!(chain.markets(fixtures::CTOKEN).unwrap().is_listed);
    }
}
