//! Simulated swap pools.
//!
//! Constant-product pools hold real reserves; concentrated pools trade at a
//! fixed WAD price and draw on whatever the venue's holder address owns.

use alloy::primitives::{Address, U256};

use crate::constants::{BPS_PRECISION, WAD};
use crate::types::wad_ray::mul_div;

/// Fee of a volatile constant-product pool, basis points.
pub const VOLATILE_FEE_BPS: u32 = 30;
/// Fee of a stable constant-product pool, basis points.
pub const STABLE_FEE_BPS: u32 = 5;
/// Concentrated pool fees are quoted in hundredths of a basis point.
pub const FEE_PRECISION: u32 = 1_000_000;

/// `x * y = k` pool. `token0 < token1`.
#[derive(Debug, Clone)]
pub struct CpPool {
    pub token0: Address,
    pub token1: Address,
    pub reserve0: U256,
    pub reserve1: U256,
    pub stable: bool,
}

impl CpPool {
    pub fn new(a: Address, b: Address, reserve_a: U256, reserve_b: U256, stable: bool) -> Self {
        if a < b {
            Self { token0: a, token1: b, reserve0: reserve_a, reserve1: reserve_b, stable }
        } else {
            Self { token0: b, token1: a, reserve0: reserve_b, reserve1: reserve_a, stable }
        }
    }

    pub fn key(a: Address, b: Address, stable: bool) -> (Address, Address, bool) {
        if a < b {
            (a, b, stable)
        } else {
            (b, a, stable)
        }
    }

    fn fee_bps(&self) -> u32 {
        if self.stable {
            STABLE_FEE_BPS
        } else {
            VOLATILE_FEE_BPS
        }
    }

    fn reserves(&self, token_in: Address) -> (U256, U256) {
        if token_in == self.token0 {
            (self.reserve0, self.reserve1)
        } else {
            (self.reserve1, self.reserve0)
        }
    }

    /// `getAmountOut` with the pool fee taken from the input.
    pub fn amount_out(&self, token_in: Address, amount_in: U256) -> U256 {
        let (reserve_in, reserve_out) = self.reserves(token_in);
        let fee_factor = U256::from(BPS_PRECISION - self.fee_bps());
        let in_with_fee = amount_in.saturating_mul(fee_factor);
        let denominator = reserve_in
            .saturating_mul(U256::from(BPS_PRECISION))
            .saturating_add(in_with_fee);
        mul_div(in_with_fee, reserve_out, denominator)
    }

    pub fn apply_swap(&mut self, token_in: Address, amount_in: U256, amount_out: U256) {
        if token_in == self.token0 {
            self.reserve0 = self.reserve0.saturating_add(amount_in);
            self.reserve1 = self.reserve1.saturating_sub(amount_out);
        } else {
            self.reserve1 = self.reserve1.saturating_add(amount_in);
            self.reserve0 = self.reserve0.saturating_sub(amount_out);
        }
    }
}

/// Single fee-tier pool at a fixed price: `price` is `token_out` per
/// `token_in`, WAD-scaled.
#[derive(Debug, Clone)]
pub struct ClPool {
    pub token_in: Address,
    pub token_out: Address,
    pub fee: u32,
    pub price: U256,
}

impl ClPool {
    pub fn amount_out(&self, amount_in: U256) -> U256 {
        let gross = mul_div(amount_in, self.price, WAD);
        mul_div(
            gross,
            U256::from(FEE_PRECISION.saturating_sub(self.fee)),
            U256::from(FEE_PRECISION),
        )
    }
}
