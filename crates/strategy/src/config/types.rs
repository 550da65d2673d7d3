use std::collections::HashMap;
use std::str::FromStr;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::types::wad_ray::{to_raw_units, Wad};
use crate::types::{RiskParams, Role, RouteVenue, SwapRoute};

// ---------------------------------------------------------------------------
// Top-level aggregate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    pub app: AppConfig,
    pub market: MarketConfig,
    pub risk: RiskConfig,
    pub routing: RoutingConfig,
    pub roles: RolesConfig,
    pub keeper: KeeperConfig,
    pub simulation: Option<SimulationConfig>,
}

// ---------------------------------------------------------------------------
// app.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub log_dir: String,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub default_filter: String,
    #[serde(default = "default_log_file")]
    pub file_name: String,
}

fn default_log_filter() -> String {
    "leverage_strategy=info,warn".into()
}

fn default_log_file() -> String {
    "strategy.log".into()
}

// ---------------------------------------------------------------------------
// market.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    /// Address the strategy holds its position under.
    pub strategy: String,
    /// Recipient of withdrawals.
    pub vault: String,
    pub want: String,
    pub ctoken: String,
    pub reward_token: String,
    pub want_decimals: u8,
    pub reward_decimals: u8,
}

/// `MarketConfig` with every address parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketAddresses {
    pub strategy: Address,
    pub vault: Address,
    pub want: Address,
    pub ctoken: Address,
    pub reward_token: Address,
}

impl MarketConfig {
    pub fn addresses(&self) -> Result<MarketAddresses> {
        Ok(MarketAddresses {
            strategy: parse_address("market.strategy", &self.strategy)?,
            vault: parse_address("market.vault", &self.vault)?,
            want: parse_address("market.want", &self.want)?,
            ctoken: parse_address("market.ctoken", &self.ctoken)?,
            reward_token: parse_address("market.reward_token", &self.reward_token)?,
        })
    }
}

// ---------------------------------------------------------------------------
// risk.json
// ---------------------------------------------------------------------------

/// Risk parameters as written by operators: ratios as decimal fractions
/// (`"0.70"`), token amounts in whole tokens.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    #[serde(with = "rust_decimal::serde::str")]
    pub target_ltv: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub allowed_ltv_drift: Decimal,
    pub borrow_depth: u32,
    pub max_borrow_depth: u32,
    #[serde(with = "rust_decimal::serde::str")]
    pub min_want_to_leverage: Decimal,
    pub withdraw_slippage_tolerance_bps: u32,
    pub ltv_scale_of_safe_cf_bps: u32,
    #[serde(with = "rust_decimal::serde::str")]
    pub min_liquidity: Decimal,
    pub principal_scale_of_safe_liquidity_bps: u32,
    pub borrow_rate_offset_bps: u32,
}

impl RiskConfig {
    pub fn to_params(&self, want_decimals: u8) -> RiskParams {
        RiskParams {
            target_ltv: Wad::from_decimal(self.target_ltv),
            allowed_ltv_drift: Wad::from_decimal(self.allowed_ltv_drift),
            borrow_depth: self.borrow_depth,
            max_borrow_depth: self.max_borrow_depth,
            min_want_to_leverage: to_raw_units(self.min_want_to_leverage, want_decimals),
            withdraw_slippage_tolerance_bps: self.withdraw_slippage_tolerance_bps,
            ltv_scale_of_safe_cf_bps: self.ltv_scale_of_safe_cf_bps,
            min_liquidity: to_raw_units(self.min_liquidity, want_decimals),
            principal_scale_of_safe_liquidity_bps: self.principal_scale_of_safe_liquidity_bps,
            borrow_rate_offset_bps: self.borrow_rate_offset_bps,
        }
    }
}

// ---------------------------------------------------------------------------
// routing.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    /// Token path from the reward token to want.
    pub path: Vec<String>,
    pub venue: RouteVenue,
}

impl RoutingConfig {
    pub fn to_route(&self) -> Result<SwapRoute> {
        let path = self
            .path
            .iter()
            .enumerate()
            .map(|(i, a)| parse_address(&format!("routing.path[{i}]"), a))
            .collect::<Result<Vec<_>>>()?;
        Ok(SwapRoute::new(path, self.venue))
    }
}

// ---------------------------------------------------------------------------
// roles.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RolesConfig {
    #[serde(default)]
    pub operate: Vec<String>,
    #[serde(default)]
    pub risk_control: Vec<String>,
    #[serde(default)]
    pub custody: Vec<String>,
}

impl RolesConfig {
    pub fn grants(&self) -> Result<HashMap<Role, Vec<Address>>> {
        let mut grants = HashMap::new();
        for (role, list) in [
            (Role::Operate, &self.operate),
            (Role::RiskControl, &self.risk_control),
            (Role::Custody, &self.custody),
        ] {
            let parsed = list
                .iter()
                .map(|a| parse_address(&format!("roles.{}", role.as_str()), a))
                .collect::<Result<Vec<_>>>()?;
            grants.insert(role, parsed);
        }
        Ok(grants)
    }
}

// ---------------------------------------------------------------------------
// keeper.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct KeeperConfig {
    /// Principal the keeper acts as. Needs `risk_control` for unwinds.
    pub operator: String,
    /// Paper mode: drive a simulated chain and mine blocks each tick.
    pub dry_run: bool,
    pub poll_interval_seconds: u64,
    #[serde(default = "default_harvest_every")]
    pub harvest_every_ticks: u32,
    #[serde(default = "default_max_failures")]
    pub max_consecutive_failures: u32,
    /// Blocks mined per tick in paper mode.
    #[serde(default = "default_blocks_per_tick")]
    pub blocks_per_tick: u64,
}

fn default_harvest_every() -> u32 {
    10
}

fn default_max_failures() -> u32 {
    3
}

fn default_blocks_per_tick() -> u64 {
    20
}

// ---------------------------------------------------------------------------
// simulation.json (paper mode only)
// ---------------------------------------------------------------------------

/// Initial state of the simulated chain. Amounts in whole tokens, rates as
/// per-block fractions.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    #[serde(with = "rust_decimal::serde::str")]
    pub collateral_factor: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub borrow_rate_per_block: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub reserve_factor: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub supply_reward_per_block: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub borrow_reward_per_block: Decimal,
    /// Cash other suppliers keep in the market.
    #[serde(with = "rust_decimal::serde::str")]
    pub market_liquidity: Decimal,
    /// Funds handed to the vault for the first deposit.
    #[serde(with = "rust_decimal::serde::str")]
    pub initial_deposit: Decimal,
    /// Want per reward token.
    #[serde(with = "rust_decimal::serde::str")]
    pub reward_price: Decimal,
    /// Reserve depth of each swap pool, in want.
    #[serde(with = "rust_decimal::serde::str")]
    pub pool_liquidity: Decimal,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn parse_address(field: &str, value: &str) -> Result<Address> {
    Address::from_str(value).with_context(|| format!("{field}: invalid address {value:?}"))
}
