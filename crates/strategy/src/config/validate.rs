use std::str::FromStr;

use alloy::primitives::Address;
use anyhow::{bail, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::types::StrategyConfig;
use crate::constants::{BPS_PRECISION, MAX_BORROW_DEPTH_CAP};
use crate::types::RouteVenue;

/// Validate invariants across the merged config that serde alone cannot
/// enforce. Called automatically by [`super::load_config`].
///
/// `target + drift < collateral factor` needs the live market and is checked
/// by the strategy when parameters are installed.
pub fn validate_config(config: &StrategyConfig) -> Result<()> {
    let mut errors: Vec<String> = Vec::new();

    validate_market_config(config, &mut errors);
    validate_risk_config(config, &mut errors);
    validate_routing_config(config, &mut errors);
    validate_roles_config(config, &mut errors);
    validate_keeper_config(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        let msg = format!(
            "Configuration validation failed ({} error{}):\n  - {}",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" },
            errors.join("\n  - ")
        );
        bail!("{msg}");
    }
}

// ---------------------------------------------------------------------------
// Market config
// ---------------------------------------------------------------------------

fn validate_market_config(config: &StrategyConfig, errors: &mut Vec<String>) {
    let market = &config.market;
    let addrs = [
        ("strategy", &market.strategy),
        ("vault", &market.vault),
        ("want", &market.want),
        ("ctoken", &market.ctoken),
        ("reward_token", &market.reward_token),
    ];
    for (name, addr) in &addrs {
        if let Err(e) = validate_address(addr) {
            errors.push(format!("market.{name}: {e}"));
        }
    }

    if same_address(&market.want, &market.reward_token) {
        errors.push("market: reward_token must differ from want".into());
    }

    if market.want_decimals > 18 || market.reward_decimals > 18 {
        errors.push(format!(
            "market: decimals must be <= 18 (want {}, reward {})",
            market.want_decimals, market.reward_decimals
        ));
    }
}

// ---------------------------------------------------------------------------
// Risk config
// ---------------------------------------------------------------------------

fn validate_risk_config(config: &StrategyConfig, errors: &mut Vec<String>) {
    let risk = &config.risk;

    if risk.target_ltv < Decimal::ZERO || risk.allowed_ltv_drift < Decimal::ZERO {
        errors.push("risk: target_ltv and allowed_ltv_drift must be non-negative".into());
    }
    if risk.target_ltv + risk.allowed_ltv_drift >= dec!(1) {
        errors.push(format!(
            "risk: target_ltv + allowed_ltv_drift ({}) must be < 1",
            risk.target_ltv + risk.allowed_ltv_drift
        ));
    }

    if risk.borrow_depth > risk.max_borrow_depth {
        errors.push(format!(
            "risk: borrow_depth ({}) must be <= max_borrow_depth ({})",
            risk.borrow_depth, risk.max_borrow_depth
        ));
    }
    if risk.max_borrow_depth > MAX_BORROW_DEPTH_CAP {
        errors.push(format!(
            "risk: max_borrow_depth ({}) must be <= {MAX_BORROW_DEPTH_CAP}",
            risk.max_borrow_depth
        ));
    }

    if risk.withdraw_slippage_tolerance_bps > BPS_PRECISION {
        errors.push(format!(
            "risk: withdraw_slippage_tolerance_bps ({}) must be <= {BPS_PRECISION}",
            risk.withdraw_slippage_tolerance_bps
        ));
    }
    if risk.ltv_scale_of_safe_cf_bps < BPS_PRECISION {
        errors.push(format!(
            "risk: ltv_scale_of_safe_cf_bps ({}) must be >= {BPS_PRECISION}",
            risk.ltv_scale_of_safe_cf_bps
        ));
    }

    if risk.min_want_to_leverage < Decimal::ZERO || risk.min_liquidity < Decimal::ZERO {
        errors.push("risk: min_want_to_leverage and min_liquidity must be non-negative".into());
    }
}

// ---------------------------------------------------------------------------
// Routing config
// ---------------------------------------------------------------------------

fn validate_routing_config(config: &StrategyConfig, errors: &mut Vec<String>) {
    let path = &config.routing.path;

    if path.len() < 2 {
        errors.push(format!("routing.path: needs at least 2 tokens, got {}", path.len()));
    }
    for (i, addr) in path.iter().enumerate() {
        if let Err(e) = validate_address(addr) {
            errors.push(format!("routing.path[{i}]: {e}"));
        }
    }
    if let Some(first) = path.first() {
        if !same_address(first, &config.market.reward_token) {
            errors.push("routing.path: must start at market.reward_token".into());
        }
    }
    if let Some(last) = path.last() {
        if path.len() >= 2 && !same_address(last, &config.market.want) {
            errors.push("routing.path: must end at market.want".into());
        }
    }
    if path.windows(2).any(|w| same_address(&w[0], &w[1])) {
        errors.push("routing.path: consecutive tokens must differ".into());
    }

    if let RouteVenue::Concentrated { pool_fee } = config.routing.venue {
        if pool_fee == 0 || pool_fee >= 1_000_000 {
            errors.push(format!("routing.venue: pool_fee ({pool_fee}) must be in (0, 1000000)"));
        }
    }
}

// ---------------------------------------------------------------------------
// Roles / keeper
// ---------------------------------------------------------------------------

fn validate_roles_config(config: &StrategyConfig, errors: &mut Vec<String>) {
    let roles = &config.roles;
    if roles.custody.is_empty() {
        errors.push("roles.custody: at least one custody principal is required".into());
    }
    for (name, list) in [
        ("operate", &roles.operate),
        ("risk_control", &roles.risk_control),
        ("custody", &roles.custody),
    ] {
        for addr in list {
            if let Err(e) = validate_address(addr) {
                errors.push(format!("roles.{name}: {e}"));
            }
        }
    }
}

fn validate_keeper_config(config: &StrategyConfig, errors: &mut Vec<String>) {
    let keeper = &config.keeper;
    if let Err(e) = validate_address(&keeper.operator) {
        errors.push(format!("keeper.operator: {e}"));
    }
    if keeper.poll_interval_seconds == 0 {
        errors.push("keeper.poll_interval_seconds: must be > 0".into());
    }
    if keeper.max_consecutive_failures == 0 {
        errors.push("keeper.max_consecutive_failures: must be > 0".into());
    }
    if keeper.dry_run && config.simulation.is_none() {
        errors.push("keeper.dry_run: simulation.json is required in paper mode".into());
    }
    if let Some(sim) = &config.simulation {
        if sim.collateral_factor <= Decimal::ZERO || sim.collateral_factor >= dec!(1) {
            errors.push(format!(
                "simulation.collateral_factor ({}) must be in (0, 1)",
                sim.collateral_factor
            ));
        }
        if sim.reward_price <= Decimal::ZERO {
            errors.push("simulation.reward_price: must be > 0".into());
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn validate_address(addr: &str) -> Result<(), String> {
    if addr.is_empty() {
        return Err("address is empty".into());
    }
    if !addr.starts_with("0x") && !addr.starts_with("0X") {
        return Err(format!("address '{addr}' must start with 0x"));
    }
    if addr.len() != 42 {
        return Err(format!(
            "address '{addr}' has length {} (expected 42)",
            addr.len()
        ));
    }
    if !addr[2..].chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("address '{addr}' contains non-hex characters"));
    }
    Ok(())
}

/// Case-insensitive address comparison; malformed input never matches.
fn same_address(a: &str, b: &str) -> bool {
    match (Address::from_str(a), Address::from_str(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_address_valid() {
        assert!(validate_address("0x5C0401e81Bc07Ca70fAD469b451682c0d747Ef1c").is_ok());
    }

    #[test]
    fn test_validate_address_no_prefix() {
        let err = validate_address("5C0401e81Bc07Ca70fAD469b451682c0d747Ef1c").unwrap_err();
        assert!(err.contains("must start with 0x"));
    }

    #[test]
    fn test_validate_address_wrong_length() {
        let err = validate_address("0x5C0401e81Bc07Ca70fAD").unwrap_err();
        assert!(err.contains("length"));
    }

    #[test]
    fn test_validate_address_non_hex() {
        let err = validate_address("0xZZ0401e81Bc07Ca70fAD469b451682c0d747Ef1c").unwrap_err();
        assert!(err.contains("non-hex"));
    }

    #[test]
    fn test_same_address_ignores_case() {
        assert!(same_address(
            "0x5c0401e81bc07ca70fad469b451682c0d747ef1c",
            "0x5C0401e81Bc07Ca70fAD469b451682c0d747Ef1c"
        ));
        assert!(!same_address("0x01", "0x01"));
    }
}
