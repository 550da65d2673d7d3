//! Fixed-point helpers for on-chain values.
//!
//! Ratios (LTV, collateral factor, exchange rate) are WAD-scaled `U256`s
//! wrapped in [`Wad`] so they cannot be mixed up with raw token amounts.
//! Percentage tunables are plain `u32` basis points.

use alloy::primitives::{U256, U512};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::constants::{BPS_PRECISION, WAD, WAD_DECIMAL};

// ---------------------------------------------------------------------------
// WAD (1e18) ratios
// ---------------------------------------------------------------------------

/// WAD-scaled ratio (18 decimals). `Wad::ONE` is 100%.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Wad(pub U256);

impl Wad {
    pub const ONE: Wad = Wad(WAD);
    pub const ZERO: Wad = Wad(U256::ZERO);

    /// Convert on-chain WAD (U256) to off-chain `Decimal`.
    pub fn to_decimal(self) -> Decimal {
        u256_to_decimal(self.0) / WAD_DECIMAL
    }

    /// Scale an off-chain fraction (`0.7` = 70%) to WAD. Negative inputs
    /// clamp to zero.
    pub fn from_decimal(val: Decimal) -> Self {
        Self(
            val.checked_mul(WAD_DECIMAL)
                .map(decimal_to_u256)
                .unwrap_or_default(),
        )
    }

    /// Create from a `U256` that is already WAD-scaled.
    pub fn from_raw(val: U256) -> Self {
        Self(val)
    }

    /// Inner `U256`.
    pub fn raw(self) -> U256 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn saturating_add(self, other: Wad) -> Wad {
        Wad(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Wad) -> Wad {
        Wad(self.0.saturating_sub(other.0))
    }

    /// Multiply by a basis-point factor (`11_000` = ×1.1).
    pub fn scale_bps(self, bps: u32) -> Wad {
        Wad(mul_bps(self.0, bps))
    }
}

impl fmt::Debug for Wad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Wad({})", self.to_decimal())
    }
}

impl fmt::Display for Wad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl From<U256> for Wad {
    fn from(val: U256) -> Self {
        Self(val)
    }
}

// ---------------------------------------------------------------------------
// Integer fixed-point arithmetic
// ---------------------------------------------------------------------------

/// `a * b / c`, rounded down, with a 512-bit intermediate product. Returns
/// zero when `c` is zero and `None` when the quotient exceeds `U256`.
pub fn checked_mul_div(a: U256, b: U256, c: U256) -> Option<U256> {
    if c.is_zero() || a.is_zero() || b.is_zero() {
        return Some(U256::ZERO);
    }
    if let Some(product) = a.checked_mul(b) {
        return Some(product / c);
    }
    let wide = U512::from(a) * U512::from(b) / U512::from(c);
    U256::checked_from_uint(wide)
}

/// [`checked_mul_div`] clamped to `U256::MAX`, which only a ratio far
/// outside any market's range can reach. Clamping is logged.
pub fn mul_div(a: U256, b: U256, c: U256) -> U256 {
    checked_mul_div(a, b, c).unwrap_or_else(|| {
        warn!(%a, %b, %c, "mul_div quotient overflows U256, clamping");
        U256::MAX
    })
}

/// `amount * ratio / 1e18`.
pub fn mul_wad(amount: U256, ratio: Wad) -> U256 {
    mul_div(amount, ratio.0, WAD)
}

/// `amount * 1e18 / ratio`. Returns zero when `ratio` is zero.
pub fn div_wad(amount: U256, ratio: Wad) -> U256 {
    mul_div(amount, WAD, ratio.0)
}

/// `amount * bps / 10_000`.
pub fn mul_bps(amount: U256, bps: u32) -> U256 {
    mul_div(amount, U256::from(bps), U256::from(BPS_PRECISION))
}

/// Largest borrow that keeps `borrow / (net + borrow) == ratio`:
/// `net * ratio / (1 - ratio)`. Returns zero for `ratio >= 1`.
pub fn max_borrow_from_supplied(net: U256, ratio: Wad) -> U256 {
    if ratio >= Wad::ONE {
        return U256::ZERO;
    }
    mul_div(net, ratio.0, WAD - ratio.0)
}

// ---------------------------------------------------------------------------
// Decimal conversion helpers
// ---------------------------------------------------------------------------

/// Convert a raw U256 to `Decimal`. Values beyond `Decimal` range become zero.
pub fn u256_to_decimal(val: U256) -> Decimal {
    Decimal::from_str(&val.to_string()).unwrap_or_default()
}

/// Truncate a non-negative `Decimal` to a U256. Negative values become zero.
pub fn decimal_to_u256(val: Decimal) -> U256 {
    if val <= Decimal::ZERO {
        return U256::ZERO;
    }
    let truncated = val.trunc();
    match truncated.to_u128() {
        Some(v) => U256::from(v),
        None => U256::from_str(&truncated.to_string()).unwrap_or_default(),
    }
}

/// Whole-token amount to raw units (`1.5` with 18 decimals → `1.5e18`).
pub fn to_raw_units(amount: Decimal, decimals: u8) -> U256 {
    let scale = Decimal::from(10u64.pow(u32::from(decimals.min(18))));
    amount
        .checked_mul(scale)
        .map(decimal_to_u256)
        .unwrap_or_default()
}

/// Raw units to a whole-token `Decimal`.
pub fn from_raw_units(raw: U256, decimals: u8) -> Decimal {
    let scale = Decimal::from(10u64.pow(u32::from(decimals.min(18))));
    u256_to_decimal(raw) / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn wad(v: &str) -> Wad {
        Wad::from_decimal(Decimal::from_str(v).unwrap())
    }

    #[test]
    fn test_wad_one_is_one() {
        assert_eq!(Wad::ONE.to_decimal(), dec!(1));
    }

    #[test]
    fn test_wad_from_decimal_roundtrip() {
        let ltv = Wad::from_decimal(dec!(0.7));
        assert_eq!(ltv.raw(), U256::from(700_000_000_000_000_000u128));
        assert_eq!(ltv.to_decimal(), dec!(0.7));
    }

    #[test]
    fn test_negative_decimal_clamps_to_zero() {
        assert_eq!(Wad::from_decimal(dec!(-0.5)), Wad::ZERO);
    }

    #[test]
    fn test_mul_div_zero_divisor() {
        assert_eq!(mul_div(U256::from(5u8), U256::from(5u8), U256::ZERO), U256::ZERO);
    }

    #[test]
    fn test_mul_div_wide_product_is_exact() {
        assert_eq!(mul_div(U256::MAX, WAD, WAD), U256::MAX);
        assert_eq!(mul_div(U256::MAX, WAD, WAD * U256::from(2u8)), U256::MAX / U256::from(2u8));
        assert_eq!(checked_mul_div(U256::MAX, U256::from(2u8), U256::from(1u8)), None);
        assert_eq!(mul_div(U256::MAX, U256::from(2u8), U256::from(1u8)), U256::MAX);
    }

    #[test]
    fn test_max_borrow_from_supplied() {
        // 1000 net at 70% target → 1000 * 0.7 / 0.3 = 2333
        let borrow = max_borrow_from_supplied(U256::from(1000u64), wad("0.7"));
        assert_eq!(borrow, U256::from(2333u64));
    }

    #[test]
    fn test_max_borrow_at_full_ratio_is_zero() {
        assert_eq!(max_borrow_from_supplied(U256::from(1000u64), Wad::ONE), U256::ZERO);
    }

    #[test]
    fn test_scale_bps() {
        assert_eq!(wad("0.7").scale_bps(11_000), wad("0.77"));
    }

    #[test]
    fn test_raw_units() {
        assert_eq!(
            to_raw_units(dec!(1.5), 18),
            U256::from(1_500_000_000_000_000_000u128)
        );
        assert_eq!(to_raw_units(dec!(2.5), 6), U256::from(2_500_000u64));
        assert_eq!(from_raw_units(U256::from(2_500_000u64), 6), dec!(2.5));
    }
}
