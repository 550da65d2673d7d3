//! Compound-style single-asset market with per-block interest and rewards.
//!
//! Cash is not stored here: it lives in the ledger under the market's
//! address and is passed in by [`super::SimChain`].

use std::collections::HashMap;

use alloy::primitives::{Address, U256};

use crate::constants::WAD;
use crate::errors::ChainError;
use crate::types::wad_ray::{mul_div, mul_wad, Wad};

#[derive(Debug, Clone, Default)]
struct SimAccount {
    ctokens: U256,
    borrow_principal: U256,
    borrow_index: U256,
}

/// Lending market state.
#[derive(Debug, Clone)]
pub struct SimMarket {
    pub address: Address,
    pub underlying: Address,
    pub listed: bool,
    pub collateral_factor: Wad,
    pub borrow_rate_per_block: U256,
    pub reserve_factor: Wad,
    pub supply_reward_rate: U256,
    pub borrow_reward_rate: U256,
    initial_exchange_rate: U256,
    total_supply: U256,
    total_borrows: U256,
    total_reserves: U256,
    borrow_index: U256,
    accrual_block: u64,
    accounts: HashMap<Address, SimAccount>,
    rewards: HashMap<Address, U256>,
}

impl SimMarket {
    pub fn new(address: Address, underlying: Address, collateral_factor: Wad) -> Self {
        Self {
            address,
            underlying,
            listed: true,
            collateral_factor,
            borrow_rate_per_block: U256::ZERO,
            reserve_factor: Wad::ZERO,
            supply_reward_rate: U256::ZERO,
            borrow_reward_rate: U256::ZERO,
            initial_exchange_rate: WAD,
            total_supply: U256::ZERO,
            total_borrows: U256::ZERO,
            total_reserves: U256::ZERO,
            borrow_index: WAD,
            accrual_block: 0,
            accounts: HashMap::new(),
            rewards: HashMap::new(),
        }
    }

    pub fn total_supply(&self) -> U256 {
        self.total_supply
    }

    pub fn total_borrows(&self) -> U256 {
        self.total_borrows
    }

    pub fn total_reserves(&self) -> U256 {
        self.total_reserves
    }

    /// Underlying per cToken, WAD-scaled.
    pub fn exchange_rate(&self, cash: U256) -> U256 {
        if self.total_supply.is_zero() {
            return self.initial_exchange_rate;
        }
        let assets = cash
            .saturating_add(self.total_borrows)
            .saturating_sub(self.total_reserves);
        mul_div(assets, WAD, self.total_supply)
    }

    pub fn ctokens_of(&self, account: Address) -> U256 {
        self.accounts
            .get(&account)
            .map(|a| a.ctokens)
            .unwrap_or_default()
    }

    pub fn borrow_balance(&self, account: Address) -> U256 {
        match self.accounts.get(&account) {
            Some(a) if !a.borrow_principal.is_zero() => {
                mul_div(a.borrow_principal, self.borrow_index, a.borrow_index)
            }
            _ => U256::ZERO,
        }
    }

    pub fn supplied_underlying(&self, account: Address, cash: U256) -> U256 {
        mul_div(self.ctokens_of(account), self.exchange_rate(cash), WAD)
    }

    /// Derived supply rate: `borrow_rate * utilization * (1 - reserve_factor)`.
    pub fn supply_rate_per_block(&self, cash: U256) -> U256 {
        let assets = cash
            .saturating_add(self.total_borrows)
            .saturating_sub(self.total_reserves);
        if assets.is_zero() {
            return U256::ZERO;
        }
        let utilization = mul_div(self.total_borrows, WAD, assets);
        let gross = mul_div(self.borrow_rate_per_block, utilization, WAD);
        mul_wad(gross, Wad::ONE.saturating_sub(self.reserve_factor))
    }

    /// Rewards stored for `account` plus whatever accrues up to `block`.
    pub fn pending_rewards(&self, account: Address, block: u64) -> U256 {
        let stored = self.rewards.get(&account).copied().unwrap_or_default();
        let blocks = U256::from(block.saturating_sub(self.accrual_block));
        stored.saturating_add(self.reward_delta(account, blocks))
    }

    pub fn take_rewards(&mut self, account: Address) -> U256 {
        self.rewards.remove(&account).unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Accrual
    // -----------------------------------------------------------------------

    /// Bring interest, reserves and reward accounting up to `block`.
    pub fn accrue(&mut self, block: u64) {
        if block <= self.accrual_block {
            return;
        }
        let blocks = U256::from(block - self.accrual_block);

        let accounts: Vec<Address> = self.accounts.keys().copied().collect();
        for account in accounts {
            let delta = self.reward_delta(account, blocks);
            if !delta.is_zero() {
                let entry = self.rewards.entry(account).or_default();
                *entry = entry.saturating_add(delta);
            }
        }

        let factor = self.borrow_rate_per_block.saturating_mul(blocks);
        let interest = mul_div(self.total_borrows, factor, WAD);
        self.total_borrows = self.total_borrows.saturating_add(interest);
        self.total_reserves = self
            .total_reserves
            .saturating_add(mul_wad(interest, self.reserve_factor));
        self.borrow_index = self
            .borrow_index
            .saturating_add(mul_div(self.borrow_index, factor, WAD));
        self.accrual_block = block;
    }

    fn reward_delta(&self, account: Address, blocks: U256) -> U256 {
        let mut delta = U256::ZERO;
        if !self.total_supply.is_zero() {
            let emitted = self.supply_reward_rate.saturating_mul(blocks);
            delta += mul_div(emitted, self.ctokens_of(account), self.total_supply);
        }
        if !self.total_borrows.is_zero() {
            let emitted = self.borrow_reward_rate.saturating_mul(blocks);
            delta += mul_div(emitted, self.borrow_balance(account), self.total_borrows);
        }
        delta
    }

    // -----------------------------------------------------------------------
    // Mutations (ledger movement is done by the caller)
    // -----------------------------------------------------------------------

    /// Mint cTokens for `amount` underlying. `cash` is the balance before
    /// the transfer in.
    pub fn mint(&mut self, account: Address, amount: U256, cash: U256) -> Result<(), ChainError> {
        self.ensure_listed("supply")?;
        let rate = self.exchange_rate(cash);
        let minted = mul_div(amount, WAD, rate);
        if minted.is_zero() {
            return Err(ChainError::reverted("supply", "mint amount rounds to zero"));
        }
        self.accounts.entry(account).or_default().ctokens += minted;
        self.total_supply += minted;
        Ok(())
    }

    pub fn borrow(&mut self, account: Address, amount: U256, cash: U256) -> Result<(), ChainError> {
        self.ensure_listed("borrow")?;
        if amount > cash {
            return Err(ChainError::reverted("borrow", "insufficient market cash"));
        }
        let current = self.borrow_balance(account);
        let limit = mul_wad(self.supplied_underlying(account, cash), self.collateral_factor);
        if current.saturating_add(amount) > limit {
            return Err(ChainError::reverted(
                "borrow",
                format!("insufficient collateral: borrow {} > limit {limit}", current + amount),
            ));
        }
        let index = self.borrow_index;
        let entry = self.accounts.entry(account).or_default();
        entry.borrow_principal = current + amount;
        entry.borrow_index = index;
        self.total_borrows += amount;
        Ok(())
    }

    pub fn redeem_underlying(
        &mut self,
        account: Address,
        amount: U256,
        cash: U256,
    ) -> Result<(), ChainError> {
        self.ensure_listed("redeem_underlying")?;
        if amount > cash {
            return Err(ChainError::reverted("redeem_underlying", "insufficient market cash"));
        }
        let rate = self.exchange_rate(cash);
        // cTokens to burn, rounded up.
        let burn = mul_div(amount, WAD, rate)
            + U256::from(u8::from(!(amount.saturating_mul(WAD) % rate).is_zero()));
        let held = self.ctokens_of(account);
        if burn > held {
            return Err(ChainError::reverted(
                "redeem_underlying",
                format!("redeem {amount} exceeds supplied balance"),
            ));
        }
        let remaining_supply = mul_div(held - burn, rate, WAD);
        let borrowed = self.borrow_balance(account);
        if borrowed > mul_wad(remaining_supply, self.collateral_factor) {
            return Err(ChainError::reverted(
                "redeem_underlying",
                "redeem would breach collateral factor",
            ));
        }
        if let Some(entry) = self.accounts.get_mut(&account) {
            entry.ctokens = held - burn;
        }
        self.total_supply = self.total_supply.saturating_sub(burn);
        Ok(())
    }

    pub fn repay(&mut self, account: Address, amount: U256) -> Result<(), ChainError> {
        self.ensure_listed("repay_borrow")?;
        let current = self.borrow_balance(account);
        if amount > current {
            return Err(ChainError::reverted(
                "repay_borrow",
                format!("repay {amount} exceeds borrow balance {current}"),
            ));
        }
        let index = self.borrow_index;
        if let Some(entry) = self.accounts.get_mut(&account) {
            entry.borrow_principal = current - amount;
            entry.borrow_index = index;
        }
        self.total_borrows = self.total_borrows.saturating_sub(amount);
        Ok(())
    }

    fn ensure_listed(&self, call: &'static str) -> Result<(), ChainError> {
        if self.listed {
            Ok(())
        } else {
            Err(ChainError::reverted(call, "market not listed"))
        }
    }
}
