use alloy::primitives::U256;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ---------------------------------------------------------------------------
// Numeric Constants
// ---------------------------------------------------------------------------

/// WAD: 1e18, the fixed-point scale for LTV, collateral factors and exchange rates.
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Same scale as [`WAD`], for off-chain `Decimal` conversions.
pub const WAD_DECIMAL: Decimal = dec!(1_000_000_000_000_000_000);

/// Basis-point precision: 10_000 = 100%. Scale for every percentage tunable.
pub const BPS_PRECISION: u32 = 10_000;

// ---------------------------------------------------------------------------
// Loop tuning
// ---------------------------------------------------------------------------

/// Borrow steps at or below this many base units are skipped.
pub const MIN_BORROW_STEP: u64 = 10;

/// Subtracted from the post-deleverage borrow target so the loop never lands
/// exactly on the borrow ceiling.
pub const DELEVERAGE_SAFETY_MARGIN: u64 = 100_000;

/// Subtracted from each redeem step's collateral headroom to absorb
/// exchange-rate rounding in the market.
pub const REDEEM_ROUNDING_BUFFER: u64 = 10;

/// Hard ceiling for `max_borrow_depth`.
pub const MAX_BORROW_DEPTH_CAP: u32 = 50;

// ---------------------------------------------------------------------------
// Safety evaluator / harvester
// ---------------------------------------------------------------------------

/// Blocks over which the profitability check projects interest and rewards.
pub const PROFITABILITY_HORIZON_BLOCKS: u64 = 86_400;

/// Added to the current block timestamp to form a swap deadline.
pub const SWAP_DEADLINE_SECONDS: u64 = 600;

// ---------------------------------------------------------------------------
// Default risk values
// ---------------------------------------------------------------------------

pub const DEFAULT_TARGET_LTV: Decimal = dec!(0.70);
pub const DEFAULT_ALLOWED_LTV_DRIFT: Decimal = dec!(0.01);
pub const DEFAULT_BORROW_DEPTH: u32 = 12;
pub const DEFAULT_MAX_BORROW_DEPTH: u32 = 15;
pub const DEFAULT_WITHDRAW_SLIPPAGE_BPS: u32 = 10;
pub const DEFAULT_LTV_SCALE_OF_SAFE_CF_BPS: u32 = 11_000;
pub const DEFAULT_PRINCIPAL_SCALE_OF_SAFE_LIQUIDITY_BPS: u32 = 20_000;
