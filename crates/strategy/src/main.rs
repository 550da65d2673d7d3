use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use leverage_strategy::config;
use leverage_strategy::core::keeper;
use leverage_strategy::core::{AccessControl, Keeper, KeeperSettings, Strategy, StrategyParams};
use leverage_strategy::execution::TokenLedger;
use leverage_strategy::logging;
use leverage_strategy::sim;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignore if missing).
    let _ = dotenvy::dotenv();

    let config_dir = std::env::var("STRATEGY_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config"));

    let config = config::load_config(&config_dir)?;

    // Hold the guard for the process lifetime.
    let _guard = logging::init_tracing(&config.app.logging)?;

    let settings = KeeperSettings::from_config(&config.keeper)?;
    info!(
        config_dir = %config_dir.display(),
        dry_run = settings.dry_run,
        venue = config.routing.venue.as_str(),
        "leverage strategy keeper starting"
    );

    if !settings.dry_run {
        anyhow::bail!("live mode has no chain client wired in; set keeper.dry_run = true");
    }
    let simulation = config
        .simulation
        .as_ref()
        .context("simulation.json is required in dry-run mode")?;

    // -----------------------------------------------------------------------
    // Component construction
    // -----------------------------------------------------------------------

    let chain = sim::build_chain(&config.market, &config.routing, simulation)?;
    let addrs = config.market.addresses()?;
    let params = StrategyParams {
        addrs,
        want_decimals: config.market.want_decimals,
        risk: config.risk.to_params(config.market.want_decimals),
        route: config.routing.to_route()?,
        access: AccessControl::from_grants(&config.roles.grants()?),
    };
    let mut strategy = Strategy::new(chain, params).context("failed to initialise strategy")?;

    let funds = strategy.chain().balance_of(addrs.want, addrs.vault)?;
    if funds.is_zero() {
        warn!("vault holds no want; keeper will idle");
    } else {
        let position = strategy
            .deposit(addrs.vault, funds)
            .context("initial vault deposit failed")?;
        info!(
            supplied = %position.supplied,
            borrowed = %position.borrowed,
            ltv = %position.ltv(),
            "initial deposit levered"
        );
    }

    // -----------------------------------------------------------------------
    // Keeper task
    // -----------------------------------------------------------------------

    let shutdown = CancellationToken::new();
    let handle = keeper::spawn(Keeper::new(strategy, settings, shutdown.clone()));

    info!("keeper running, press Ctrl+C to shutdown");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    info!("shutdown signal received, stopping gracefully...");
    shutdown.cancel();

    let strategy = handle.await.context("keeper task panicked")??;
    let status = strategy.status()?;
    info!(
        status = %serde_json::to_string(&status).context("failed to serialise status")?,
        "final strategy status"
    );

    Ok(())
}
