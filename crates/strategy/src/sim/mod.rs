//! In-memory chain backing tests and paper mode.
//!
//! Deterministic: no clocks, no randomness. Time moves only through
//! [`SimChain::mine`].

pub mod chain;
pub mod market;
pub mod venues;

#[cfg(test)]
pub mod fixtures;

pub use chain::SimChain;
pub use market::SimMarket;

use alloy::primitives::{address, Address};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tracing::info;

use crate::config::{MarketAddresses, MarketConfig, RoutingConfig, SimulationConfig};
use crate::execution::LendingMarket;
use crate::types::wad_ray::{to_raw_units, Wad};
use crate::types::RouteVenue;

/// Supplier whose deposit provides the market's cash in paper mode.
pub const LIQUIDITY_PROVIDER: Address = address!("00000000000000000000000000000000000000e1");

/// Build a simulated chain from `simulation.json`: the market, a pool for
/// every hop of the configured route, outside liquidity, and the vault's
/// initial funds.
pub fn build_chain(
    market: &MarketConfig,
    routing: &RoutingConfig,
    sim: &SimulationConfig,
) -> Result<SimChain> {
    let addrs: MarketAddresses = market.addresses()?;
    let route = routing.to_route()?;

    let mut m = SimMarket::new(addrs.ctoken, addrs.want, Wad::from_decimal(sim.collateral_factor));
    m.borrow_rate_per_block = Wad::from_decimal(sim.borrow_rate_per_block).raw();
    m.reserve_factor = Wad::from_decimal(sim.reserve_factor);
    m.supply_reward_rate = to_raw_units(sim.supply_reward_per_block, market.reward_decimals);
    m.borrow_reward_rate = to_raw_units(sim.borrow_reward_per_block, market.reward_decimals);

    let mut chain = SimChain::new(m, addrs.reward_token);

    let decimals = |token: Address| -> u8 {
        if token == addrs.want {
            market.want_decimals
        } else if token == addrs.reward_token {
            market.reward_decimals
        } else {
            18
        }
    };
    // Value of one whole token in want.
    let value = |token: Address| -> Decimal {
        if token == addrs.reward_token {
            sim.reward_price
        } else {
            Decimal::ONE
        }
    };

    for (from, to) in route.hops() {
        match route.venue {
            RouteVenue::ConstantProduct => {
                let reserve_from =
                    to_raw_units(in_tokens(sim.pool_liquidity, value(from)), decimals(from));
                let reserve_to =
                    to_raw_units(in_tokens(sim.pool_liquidity, value(to)), decimals(to));
                chain.add_cp_pool(from, to, reserve_from, reserve_to, false);
            }
            RouteVenue::Concentrated { pool_fee } => {
                // Raw-unit price: whole-token price adjusted for decimals.
                let whole_price = in_tokens(value(from), value(to));
                let shift = i32::from(decimals(to)) - i32::from(decimals(from));
                let price = if shift >= 0 {
                    whole_price
                        .checked_mul(Decimal::from(10u64.pow(shift.unsigned_abs())))
                        .unwrap_or_default()
                } else {
                    whole_price / Decimal::from(10u64.pow(shift.unsigned_abs()))
                };
                let liquidity =
                    to_raw_units(in_tokens(sim.pool_liquidity, value(to)), decimals(to));
                chain.add_cl_pool(from, to, pool_fee, Wad::from_decimal(price).raw(), liquidity);
            }
        }
    }

    let liquidity = to_raw_units(sim.market_liquidity, market.want_decimals);
    chain.mint(addrs.want, LIQUIDITY_PROVIDER, liquidity);
    chain
        .supply(addrs.ctoken, LIQUIDITY_PROVIDER, liquidity)
        .context("seeding simulated market liquidity")?;

    let deposit = to_raw_units(sim.initial_deposit, market.want_decimals);
    chain.mint(addrs.want, addrs.vault, deposit);

    info!(
        ctoken = %addrs.ctoken,
        want = %addrs.want,
        collateral_factor = %sim.collateral_factor,
        venue = route.venue.as_str(),
        hops = route.hops().count(),
        "simulated chain ready"
    );
    Ok(chain)
}

/// `want_amount` expressed in a token worth `value` want each.
fn in_tokens(want_amount: Decimal, value: Decimal) -> Decimal {
    want_amount.checked_div(value).unwrap_or_default()
}
