//! Shared simulated-chain fixtures for unit tests.

use alloy::primitives::{address, Address, U256};
use rust_decimal_macros::dec;

use super::{SimChain, SimMarket};
use crate::constants::WAD;
use crate::execution::LendingMarket;
use crate::types::Wad;

pub const REWARD: Address = address!("00000000000000000000000000000000000000a1");
pub const MID: Address = address!("00000000000000000000000000000000000000a2");
pub const WANT: Address = address!("00000000000000000000000000000000000000a3");
pub const CTOKEN: Address = address!("00000000000000000000000000000000000000c1");
pub const STRATEGY: Address = address!("00000000000000000000000000000000000000b1");
pub const VAULT: Address = address!("00000000000000000000000000000000000000b2");
pub const KEEPER: Address = address!("00000000000000000000000000000000000000b3");
pub const ALICE: Address = address!("0000000000000000000000000000000000000001");
pub const WHALE: Address = address!("00000000000000000000000000000000000000e1");

/// Concentrated pool fee used by the fixtures (0.3%).
pub const CL_FEE: u32 = 3000;

/// `n` whole 18-decimal tokens.
pub fn units(n: u64) -> U256 {
    U256::from(n) * WAD
}

pub fn user_funds() -> U256 {
    units(10_000)
}

/// Market at CF 0.8 with no interest or rewards, 1M want of outside cash,
/// funded `ALICE` and `VAULT`, and pools on both venues:
/// - constant product: REWARD/MID (volatile and a shallow stable pool),
///   MID/WANT
/// - concentrated: REWARD → WANT at 0.5 want per reward
pub fn standard_chain() -> SimChain {
    let market = SimMarket::new(CTOKEN, WANT, Wad::from_decimal(dec!(0.8)));
    let mut chain = SimChain::new(market, REWARD);

    chain.mint(WANT, WHALE, units(1_000_000));
    chain.supply(CTOKEN, WHALE, units(1_000_000)).unwrap();

    chain.mint(WANT, ALICE, user_funds());
    chain.mint(WANT, VAULT, user_funds());

    chain.add_cp_pool(REWARD, MID, units(1_000_000), units(1_000_000), false);
    chain.add_cp_pool(REWARD, MID, units(1_000), units(1_000), true);
    chain.add_cp_pool(MID, WANT, units(1_000_000), units(1_000_000), false);
    chain.add_cl_pool(REWARD, WANT, CL_FEE, WAD / U256::from(2u8), units(1_000_000));
    chain
}

/// [`standard_chain`] with interest and reward emissions switched on:
/// 0.0001% borrow interest per block, 10% reserve factor, 1 reward token
/// per block to each side.
pub fn rewarding_chain() -> SimChain {
    let mut chain = standard_chain();
    let market = chain.market_mut();
    market.borrow_rate_per_block = WAD / U256::from(1_000_000u64);
    market.reserve_factor = Wad::from_decimal(dec!(0.1));
    market.supply_reward_rate = units(1);
    market.borrow_reward_rate = units(1);
    chain
}
