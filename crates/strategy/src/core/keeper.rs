//! Keeper, the one async component.
//!
//! Owns the [`Strategy`] and drives it from a single task:
//! - polls `should_deleverage` every `poll_interval_seconds`
//! - reasons 1-2 lever down to the band, reasons 3-5 repay all debt
//! - harvests every `harvest_every_ticks` ticks
//! - pauses the strategy after `max_consecutive_failures` failed ticks
//! - stops through a `CancellationToken`
//!
//! In paper mode each tick first mines `blocks_per_tick` simulated blocks.

use std::time::Duration;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{parse_address, KeeperConfig};
use crate::errors::StrategyError;
use crate::execution::Chain;
use crate::types::{DeleverageReason, HarvestReport, LoopOutcome};

use super::strategy::Strategy;

/// A chain whose clock the keeper may move forward. Only simulated chains
/// implement this.
pub trait BlockProducer {
    fn advance(&mut self, blocks: u64);
}

#[derive(Debug, Clone)]
pub struct KeeperSettings {
    pub operator: Address,
    pub dry_run: bool,
    pub poll_interval: Duration,
    pub harvest_every_ticks: u32,
    pub max_consecutive_failures: u32,
    pub blocks_per_tick: u64,
}

impl KeeperSettings {
    pub fn from_config(config: &KeeperConfig) -> Result<Self> {
        Ok(Self {
            operator: parse_address("keeper.operator", &config.operator)?,
            dry_run: config.dry_run,
            poll_interval: Duration::from_secs(config.poll_interval_seconds),
            harvest_every_ticks: config.harvest_every_ticks,
            max_consecutive_failures: config.max_consecutive_failures,
            blocks_per_tick: config.blocks_per_tick,
        })
    }
}

/// What a tick did about the safety reason it saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeeperAction {
    None,
    LeverDown(LoopOutcome),
    DeleverageAll(LoopOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub reason: DeleverageReason,
    pub action: KeeperAction,
    pub harvest: Option<HarvestReport>,
}

pub struct Keeper<C: Chain + BlockProducer> {
    strategy: Strategy<C>,
    settings: KeeperSettings,
    shutdown: CancellationToken,
    ticks: u64,
    consecutive_failures: u32,
}

impl<C: Chain + BlockProducer> Keeper<C> {
    pub fn new(strategy: Strategy<C>, settings: KeeperSettings, shutdown: CancellationToken) -> Self {
        Self {
            strategy,
            settings,
            shutdown,
            ticks: 0,
            consecutive_failures: 0,
        }
    }

    /// Main loop. Returns the strategy once the token is cancelled.
    pub async fn run(mut self) -> Result<Strategy<C>> {
        info!(
            operator = %self.settings.operator,
            dry_run = self.settings.dry_run,
            interval_secs = self.settings.poll_interval.as_secs(),
            "keeper started"
        );

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    info!(ticks = self.ticks, "keeper shutting down");
                    break;
                }
                () = tokio::time::sleep(self.settings.poll_interval) => {
                    match self.tick() {
                        Ok(_) => self.consecutive_failures = 0,
                        Err(e) => {
                            self.consecutive_failures += 1;
                            error!(
                                error = %e,
                                consecutive_failures = self.consecutive_failures,
                                "keeper tick failed"
                            );
                            if self.consecutive_failures >= self.settings.max_consecutive_failures {
                                self.trip_breaker();
                            }
                        }
                    }
                }
            }
        }

        Ok(self.strategy)
    }

    /// One poll: advance the simulated clock, accrue, evaluate, act.
    pub fn tick(&mut self) -> Result<TickReport, StrategyError> {
        if self.settings.dry_run {
            self.strategy
                .chain_mut()
                .advance(self.settings.blocks_per_tick);
        }
        self.ticks += 1;
        let operator = self.settings.operator;

        self.strategy.refresh_position()?;
        let reason = self.strategy.should_deleverage()?;
        let action = match reason {
            DeleverageReason::None => KeeperAction::None,
            DeleverageReason::LtvNearLiquidation | DeleverageReason::LtvAboveTarget => {
                KeeperAction::LeverDown(self.strategy.lever_down(operator)?)
            }
            DeleverageReason::MarketLiquidityLow
            | DeleverageReason::LiquidityBelowPrincipal
            | DeleverageReason::Unprofitable => {
                KeeperAction::DeleverageAll(self.strategy.deleverage_all(operator)?)
            }
        };

        let harvest = if self.settings.harvest_every_ticks > 0
            && self.ticks % u64::from(self.settings.harvest_every_ticks) == 0
        {
            Some(self.strategy.harvest(operator)?)
        } else {
            None
        };

        let status = self.strategy.status()?;
        info!(
            tick = self.ticks,
            reason = reason.description(),
            ltv = %status.ltv,
            supplied = %status.supplied,
            borrowed = %status.borrowed,
            paused = status.paused,
            "keeper tick"
        );
        if let Ok(json) = serde_json::to_string(&status) {
            debug!(status = %json, "strategy status");
        }

        Ok(TickReport {
            tick: self.ticks,
            reason,
            action,
            harvest,
        })
    }

    fn trip_breaker(&mut self) {
        if self.strategy.is_paused() {
            return;
        }
        error!(
            failures = self.consecutive_failures,
            "too many consecutive keeper failures, pausing strategy"
        );
        if let Err(e) = self.strategy.pause(self.settings.operator) {
            warn!(error = %e, "circuit breaker could not pause the strategy");
        }
    }

    pub fn strategy(&self) -> &Strategy<C> {
        &self.strategy
    }

    pub fn strategy_mut(&mut self) -> &mut Strategy<C> {
        &mut self.strategy
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

/// Spawn `keeper` on the runtime and hand back its join handle.
pub fn spawn<C>(keeper: Keeper<C>) -> tokio::task::JoinHandle<Result<Strategy<C>>>
where
    C: Chain + BlockProducer + Send + 'static,
{
    tokio::spawn(async move { keeper.run().await.context("keeper exited with error") })
}
