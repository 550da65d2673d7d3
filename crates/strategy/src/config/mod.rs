pub mod types;
pub mod validate;

pub use types::*;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Load and merge all config JSON files into a single [`StrategyConfig`],
/// then apply environment variable overrides and validate.
///
/// Expected directory layout:
/// ```text
/// config/
///   app.json
///   market.json
///   risk.json
///   routing.json
///   roles.json
///   keeper.json
///   simulation.json   (required in paper mode)
/// ```
///
/// # Environment variable overrides
///
/// | Env Var                            | Config Field                             |
/// |------------------------------------|------------------------------------------|
/// | `STRATEGY_TARGET_LTV`              | `risk.target_ltv`                        |
/// | `STRATEGY_ALLOWED_LTV_DRIFT`       | `risk.allowed_ltv_drift`                 |
/// | `STRATEGY_BORROW_DEPTH`            | `risk.borrow_depth`                      |
/// | `STRATEGY_WITHDRAW_SLIPPAGE_BPS`   | `risk.withdraw_slippage_tolerance_bps`   |
/// | `KEEPER_DRY_RUN`                   | `keeper.dry_run`                         |
/// | `KEEPER_POLL_INTERVAL_SECONDS`     | `keeper.poll_interval_seconds`           |
pub fn load_config(config_dir: &Path) -> Result<StrategyConfig> {
    let read = |name: &str| -> Result<String> {
        let path = config_dir.join(name);
        std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {}", path.display()))
    };

    let app: AppConfig = serde_json::from_str(&read("app.json")?).context("parsing app.json")?;

    let market: MarketConfig =
        serde_json::from_str(&read("market.json")?).context("parsing market.json")?;

    let risk: RiskConfig =
        serde_json::from_str(&read("risk.json")?).context("parsing risk.json")?;

    let routing: RoutingConfig =
        serde_json::from_str(&read("routing.json")?).context("parsing routing.json")?;

    let roles: RolesConfig =
        serde_json::from_str(&read("roles.json")?).context("parsing roles.json")?;

    let keeper: KeeperConfig =
        serde_json::from_str(&read("keeper.json")?).context("parsing keeper.json")?;

    // Simulation config is optional outside paper mode.
    let simulation: Option<SimulationConfig> = match read("simulation.json") {
        Ok(contents) => {
            Some(serde_json::from_str(&contents).context("parsing simulation.json")?)
        }
        Err(_) => None,
    };

    let mut config = StrategyConfig {
        app,
        market,
        risk,
        routing,
        roles,
        keeper,
        simulation,
    };

    apply_env_overrides(&mut config);
    validate::validate_config(&config)?;

    Ok(config)
}

// ---------------------------------------------------------------------------
// Environment variable overrides
// ---------------------------------------------------------------------------

/// Only non-empty env vars take effect. Parse failures are skipped and the
/// JSON value remains.
fn apply_env_overrides(config: &mut StrategyConfig) {
    // -- Risk ----------------------------------------------------------------
    if let Some(val) = env_decimal("STRATEGY_TARGET_LTV") {
        info!(%val, "env override: STRATEGY_TARGET_LTV");
        config.risk.target_ltv = val;
    }

    if let Some(val) = env_decimal("STRATEGY_ALLOWED_LTV_DRIFT") {
        info!(%val, "env override: STRATEGY_ALLOWED_LTV_DRIFT");
        config.risk.allowed_ltv_drift = val;
    }

    if let Some(val) = env_parse::<u32>("STRATEGY_BORROW_DEPTH") {
        info!(val, "env override: STRATEGY_BORROW_DEPTH");
        config.risk.borrow_depth = val;
    }

    if let Some(val) = env_parse::<u32>("STRATEGY_WITHDRAW_SLIPPAGE_BPS") {
        info!(val, "env override: STRATEGY_WITHDRAW_SLIPPAGE_BPS");
        config.risk.withdraw_slippage_tolerance_bps = val;
    }

    // -- Keeper --------------------------------------------------------------
    if let Some(val) = env_bool("KEEPER_DRY_RUN") {
        info!(dry_run = val, "env override: KEEPER_DRY_RUN");
        config.keeper.dry_run = val;
    }

    if let Some(val) = env_parse::<u64>("KEEPER_POLL_INTERVAL_SECONDS") {
        info!(val, "env override: KEEPER_POLL_INTERVAL_SECONDS");
        config.keeper.poll_interval_seconds = val;
    }
}

/// Read a non-empty env var as a `String`.
fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Read a non-empty env var as a bool (`true`, `1`, `yes` → true).
fn env_bool(key: &str) -> Option<bool> {
    env_string(key).map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
}

/// Read a non-empty env var and parse it as `T`.
fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}

/// Read a non-empty env var and parse it as `Decimal`.
fn env_decimal(key: &str) -> Option<Decimal> {
    env_string(key).and_then(|v| Decimal::from_str(&v).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Role, RouteVenue};
    use rust_decimal_macros::dec;
    use serial_test::serial;
    use std::path::PathBuf;

    fn project_config_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("config")
    }

    // -----------------------------------------------------------------------
    // Helper: write a minimal set of config JSON files to a temp dir.
    // -----------------------------------------------------------------------

    const WANT: &str = "0x8AC76a51cc950d9822D68b83fE1Ad97B32Cd580d";
    const REWARD: &str = "0xcF6BB5389c92Bdda8a3747Ddb454cB7a64626C63";
    const MID: &str = "0xbb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c";

    fn write_test_configs(dir: &Path) {
        std::fs::write(
            dir.join("app.json"),
            r#"{ "logging": { "log_dir": "logs" } }"#,
        )
        .unwrap();

        std::fs::write(
            dir.join("market.json"),
            format!(
                r#"{{
                "strategy": "0x5000000000000000000000000000000000000001",
                "vault": "0x5000000000000000000000000000000000000002",
                "want": "{WANT}",
                "ctoken": "0xecA88125a5ADbe82614ffC12D0DB554E2e2CdC78",
                "reward_token": "{REWARD}",
                "want_decimals": 18,
                "reward_decimals": 18
            }}"#
            ),
        )
        .unwrap();

        std::fs::write(
            dir.join("risk.json"),
            r#"{
                "target_ltv": "0.70",
                "allowed_ltv_drift": "0.01",
                "borrow_depth": 12,
                "max_borrow_depth": 15,
                "min_want_to_leverage": "0.001",
                "withdraw_slippage_tolerance_bps": 10,
                "ltv_scale_of_safe_cf_bps": 11000,
                "min_liquidity": "100",
                "principal_scale_of_safe_liquidity_bps": 20000,
                "borrow_rate_offset_bps": 0
            }"#,
        )
        .unwrap();

        std::fs::write(
            dir.join("routing.json"),
            format!(
                r#"{{
                "path": ["{REWARD}", "{MID}", "{WANT}"],
                "venue": {{ "kind": "constant_product" }}
            }}"#
            ),
        )
        .unwrap();

        std::fs::write(
            dir.join("roles.json"),
            r#"{
                "operate": ["0x5000000000000000000000000000000000000003"],
                "risk_control": [],
                "custody": ["0x5000000000000000000000000000000000000002"]
            }"#,
        )
        .unwrap();

        std::fs::write(
            dir.join("keeper.json"),
            r#"{
                "operator": "0x5000000000000000000000000000000000000003",
                "dry_run": false,
                "poll_interval_seconds": 15
            }"#,
        )
        .unwrap();
    }

    fn write_simulation_config(dir: &Path) {
        std::fs::write(
            dir.join("simulation.json"),
            r#"{
                "collateral_factor": "0.8",
                "borrow_rate_per_block": "0.00000001",
                "reserve_factor": "0.1",
                "supply_reward_per_block": "0.5",
                "borrow_reward_per_block": "0.5",
                "market_liquidity": "1000000",
                "initial_deposit": "10000",
                "reward_price": "2.5",
                "pool_liquidity": "1000000"
            }"#,
        )
        .unwrap();
    }

    // -----------------------------------------------------------------------
    // Env cleanup helper.
    // -----------------------------------------------------------------------

    fn clean_strategy_env() {
        for key in [
            "STRATEGY_TARGET_LTV",
            "STRATEGY_ALLOWED_LTV_DRIFT",
            "STRATEGY_BORROW_DEPTH",
            "STRATEGY_WITHDRAW_SLIPPAGE_BPS",
            "KEEPER_DRY_RUN",
            "KEEPER_POLL_INTERVAL_SECONDS",
        ] {
            std::env::remove_var(key);
        }
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[test]
    #[serial]
    fn test_load_real_configs() {
        clean_strategy_env();
        let dir = project_config_dir();
        if !dir.exists() {
            eprintln!("skipping: config dir not found at {}", dir.display());
            return;
        }
        let config = load_config(&dir).expect("config should load and validate");
        assert!(config.keeper.dry_run);
        assert!(config.simulation.is_some());
        assert_eq!(config.risk.target_ltv, dec!(0.70));
        clean_strategy_env();
    }

    #[test]
    #[serial]
    fn test_load_test_configs() {
        clean_strategy_env();
        let tmp = tempfile::tempdir().unwrap();
        write_test_configs(tmp.path());
        let config = load_config(tmp.path()).expect("test config should load");
        assert!(!config.keeper.dry_run);
        assert!(config.simulation.is_none());
        assert_eq!(config.keeper.harvest_every_ticks, 10);
        assert_eq!(config.routing.venue, RouteVenue::ConstantProduct);

        let route = config.routing.to_route().unwrap();
        let addrs = config.market.addresses().unwrap();
        assert!(route.check(addrs.reward_token, addrs.want).is_ok());

        let grants = config.roles.grants().unwrap();
        assert_eq!(grants[&Role::Custody].len(), 1);
        assert!(grants[&Role::RiskControl].is_empty());
        clean_strategy_env();
    }

    #[test]
    #[serial]
    fn test_risk_amounts_scale_by_decimals() {
        clean_strategy_env();
        let tmp = tempfile::tempdir().unwrap();
        write_test_configs(tmp.path());
        let config = load_config(tmp.path()).unwrap();
        let params = config.risk.to_params(config.market.want_decimals);
        assert_eq!(params.target_ltv.to_decimal(), dec!(0.70));
        assert_eq!(
            params.min_liquidity,
            alloy::primitives::U256::from(100u128 * 10u128.pow(18))
        );
        clean_strategy_env();
    }

    #[test]
    #[serial]
    fn test_missing_config_file_errors() {
        clean_strategy_env();
        let tmp = tempfile::tempdir().unwrap();
        let err = load_config(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
        clean_strategy_env();
    }

    #[test]
    #[serial]
    fn test_dry_run_requires_simulation() {
        clean_strategy_env();
        let tmp = tempfile::tempdir().unwrap();
        write_test_configs(tmp.path());
        std::env::set_var("KEEPER_DRY_RUN", "true");
        let err = load_config(tmp.path()).unwrap_err();
        assert!(format!("{err:#}").contains("simulation.json is required"));

        write_simulation_config(tmp.path());
        let config = load_config(tmp.path()).unwrap();
        assert!(config.keeper.dry_run);
        assert_eq!(config.simulation.unwrap().reward_price, dec!(2.5));
        clean_strategy_env();
    }

    #[test]
    #[serial]
    fn test_env_override_target_ltv() {
        clean_strategy_env();
        let tmp = tempfile::tempdir().unwrap();
        write_test_configs(tmp.path());

        std::env::set_var("STRATEGY_TARGET_LTV", "0.65");
        std::env::set_var("STRATEGY_BORROW_DEPTH", "8");
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.risk.target_ltv, dec!(0.65));
        assert_eq!(config.risk.borrow_depth, 8);
        clean_strategy_env();
    }

    #[test]
    #[serial]
    fn test_env_override_rejected_by_validation() {
        clean_strategy_env();
        let tmp = tempfile::tempdir().unwrap();
        write_test_configs(tmp.path());

        std::env::set_var("STRATEGY_BORROW_DEPTH", "40");
        let err = load_config(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("borrow_depth (40) must be <= max_borrow_depth"));
        clean_strategy_env();
    }

    #[test]
    #[serial]
    fn test_env_override_empty_string_ignored() {
        clean_strategy_env();
        let tmp = tempfile::tempdir().unwrap();
        write_test_configs(tmp.path());

        std::env::set_var("KEEPER_POLL_INTERVAL_SECONDS", "");
        std::env::set_var("STRATEGY_WITHDRAW_SLIPPAGE_BPS", "not-a-number");
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.keeper.poll_interval_seconds, 15);
        assert_eq!(config.risk.withdraw_slippage_tolerance_bps, 10);
        clean_strategy_env();
    }

    #[test]
    #[serial]
    fn test_validation_collects_every_error() {
        clean_strategy_env();
        let tmp = tempfile::tempdir().unwrap();
        write_test_configs(tmp.path());
        std::fs::write(
            tmp.path().join("routing.json"),
            format!(r#"{{ "path": ["{WANT}"], "venue": {{ "kind": "concentrated", "pool_fee": 0 }} }}"#),
        )
        .unwrap();
        std::fs::write(tmp.path().join("roles.json"), r#"{ "custody": [] }"#).unwrap();

        let msg = load_config(tmp.path()).unwrap_err().to_string();
        assert!(msg.contains("at least 2 tokens"));
        assert!(msg.contains("must start at market.reward_token"));
        assert!(msg.contains("pool_fee (0)"));
        assert!(msg.contains("custody principal"));
        clean_strategy_env();
    }
}
