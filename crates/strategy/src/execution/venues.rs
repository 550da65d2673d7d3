//! Swap venues and route dispatch.
//!
//! Two venue shapes exist behind the same "quote, then execute" contract.
//! The configured [`RouteVenue`] picks one; callers never branch on the
//! venue themselves.

use alloy::primitives::{Address, U256};
use tracing::debug;

use crate::errors::ChainError;
use crate::types::{RouteVenue, SwapRoute};

/// One leg of a constant-product route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hop {
    pub from: Address,
    pub to: Address,
    pub stable: bool,
}

/// Venue A: multi-hop constant-product router.
pub trait ConstantProductVenue {
    /// Best output for `amount_in` and whether it comes from the stable pool.
    fn quote(
        &self,
        amount_in: U256,
        token_in: Address,
        token_out: Address,
    ) -> Result<(U256, bool), ChainError>;

    /// Pull `amount_in` of `hops[0].from` from `sender`, route through every
    /// hop and pay the output to `recipient`.
    #[allow(clippy::too_many_arguments)]
    fn swap_exact_in(
        &mut self,
        sender: Address,
        amount_in: U256,
        min_out: U256,
        hops: &[Hop],
        recipient: Address,
        deadline: u64,
    ) -> Result<U256, ChainError>;
}

/// `exactInputSingle` parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExactInputSingleParams {
    pub token_in: Address,
    pub token_out: Address,
    pub fee: u32,
    pub recipient: Address,
    pub deadline: u64,
    pub amount_in: U256,
    pub amount_out_minimum: U256,
    pub sqrt_price_limit: U256,
}

/// Venue B: single-pool concentrated-liquidity router.
pub trait ConcentratedVenue {
    fn quote_exact_in_single(
        &self,
        token_in: Address,
        token_out: Address,
        fee: u32,
        amount_in: U256,
    ) -> Result<U256, ChainError>;

    /// Pull `params.amount_in` from `sender` and swap through one pool.
    fn swap_exact_in_single(
        &mut self,
        sender: Address,
        params: ExactInputSingleParams,
    ) -> Result<U256, ChainError>;
}

/// Quote `amount_in` of the route's first token into its last token.
/// Read-only: no trade is executed.
pub fn quote_route<V>(venue: &V, route: &SwapRoute, amount_in: U256) -> Result<U256, ChainError>
where
    V: ConstantProductVenue + ConcentratedVenue + ?Sized,
{
    let mut amount = amount_in;
    for (from, to) in route.hops() {
        if amount.is_zero() {
            return Ok(U256::ZERO);
        }
        amount = quote_hop(venue, route.venue, from, to, amount)?.0;
    }
    Ok(amount)
}

/// Swap `amount_in` along the route, one hop at a time, paying `account`.
///
/// Each hop is quoted immediately before it executes. No per-hop minimum
/// output is enforced.
pub fn execute_route<V>(
    venue: &mut V,
    route: &SwapRoute,
    account: Address,
    amount_in: U256,
    deadline: u64,
) -> Result<U256, ChainError>
where
    V: ConstantProductVenue + ConcentratedVenue + ?Sized,
{
    let mut amount = amount_in;
    for (from, to) in route.hops() {
        if amount.is_zero() {
            return Ok(U256::ZERO);
        }
        let (quoted, stable) = quote_hop(venue, route.venue, from, to, amount)?;

        let received = match route.venue {
            RouteVenue::ConstantProduct => {
                let hop = Hop { from, to, stable };
                venue.swap_exact_in(account, amount, U256::ZERO, &[hop], account, deadline)?
            }
            RouteVenue::Concentrated { pool_fee } => venue.swap_exact_in_single(
                account,
                ExactInputSingleParams {
                    token_in: from,
                    token_out: to,
                    fee: pool_fee,
                    recipient: account,
                    deadline,
                    amount_in: amount,
                    amount_out_minimum: U256::ZERO,
                    sqrt_price_limit: U256::ZERO,
                },
            )?,
        };

        debug!(
            venue = route.venue.as_str(),
            %from,
            %to,
            amount_in = %amount,
            %quoted,
            %received,
            "swap hop executed"
        );
        amount = received;
    }
    Ok(amount)
}

fn quote_hop<V>(
    venue: &V,
    kind: RouteVenue,
    from: Address,
    to: Address,
    amount: U256,
) -> Result<(U256, bool), ChainError>
where
    V: ConstantProductVenue + ConcentratedVenue + ?Sized,
{
    match kind {
        RouteVenue::ConstantProduct => venue.quote(amount, from, to),
        RouteVenue::Concentrated { pool_fee } => venue
            .quote_exact_in_single(from, to, pool_fee, amount)
            .map(|out| (out, false)),
    }
}
