//! Strategy façade: every external entry point.
//!
//! Each mutating operation checks the caller's role, then runs inside an
//! atomic scope: a chain checkpoint plus a copy of [`StrategyState`]. Any
//! error reverts both before it is returned, so a failed operation leaves
//! no trace.

use alloy::primitives::{Address, U256};
use tracing::{info, warn};

use crate::config::MarketAddresses;
use crate::constants::{BPS_PRECISION, MAX_BORROW_DEPTH_CAP, REDEEM_ROUNDING_BUFFER};
use crate::errors::StrategyError;
use crate::execution::Chain;
use crate::types::wad_ray::{div_wad, from_raw_units};
use crate::types::{
    Action, DeleverageReason, HarvestReport, LoopOutcome, PositionSnapshot, RiskParams, Role,
    StrategyStatus, SwapRoute, Wad, WithdrawRequest,
};

use super::access::AccessControl;
use super::deleverage::DeleverageEngine;
use super::harvester::Harvester;
use super::leverage::LeverageEngine;
use super::position_oracle::PositionOracle;
use super::safety::{ProfitabilityQuote, SafetyEvaluator};

/// Everything needed to stand up a [`Strategy`].
#[derive(Debug, Clone)]
pub struct StrategyParams {
    pub addrs: MarketAddresses,
    pub want_decimals: u8,
    pub risk: RiskParams,
    pub route: SwapRoute,
    pub access: AccessControl,
}

/// Strategy-owned state restored on rollback.
#[derive(Debug, Clone)]
pub struct StrategyState {
    pub risk: RiskParams,
    pub route: SwapRoute,
    pub access: AccessControl,
    pub paused: bool,
    /// `supplied - borrowed` at the last refresh. Reporting only.
    pub cached_net_balance: U256,
}

pub struct Strategy<C: Chain> {
    chain: C,
    addrs: MarketAddresses,
    want_decimals: u8,
    oracle: PositionOracle,
    state: StrategyState,
}

/// Where a withdrawal leaves the remaining position relative to the band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WithdrawPath {
    OverBand,
    InsideBand,
    UnderBand,
}

impl<C: Chain> Strategy<C> {
    pub fn new(chain: C, params: StrategyParams) -> Result<Self, StrategyError> {
        let oracle = PositionOracle::new(&params.addrs);
        let cf = oracle.collateral_factor(&chain)?;
        validate_risk(&params.risk, cf)?;
        params
            .route
            .check(params.addrs.reward_token, params.addrs.want)
            .map_err(|reason| StrategyError::InvalidRoute { reason })?;
        if params.access.members(Role::Custody).is_empty() {
            return Err(StrategyError::invalid("at least one custody principal is required"));
        }

        info!(
            strategy = %params.addrs.strategy,
            ctoken = %params.addrs.ctoken,
            target_ltv = %params.risk.target_ltv,
            collateral_factor = %cf,
            venue = params.route.venue.as_str(),
            "strategy initialised"
        );
        Ok(Self {
            chain,
            addrs: params.addrs,
            want_decimals: params.want_decimals,
            oracle,
            state: StrategyState {
                risk: params.risk,
                route: params.route,
                access: params.access,
                paused: false,
                cached_net_balance: U256::ZERO,
            },
        })
    }

    // -----------------------------------------------------------------------
    // Operate
    // -----------------------------------------------------------------------

    /// Pull `amount` of want from `caller`, supply it and rebalance.
    pub fn deposit(&mut self, caller: Address, amount: U256) -> Result<PositionSnapshot, StrategyError> {
        self.authorize(Action::Deposit, caller)?;
        self.ensure_active()?;
        if amount.is_zero() {
            return Err(StrategyError::invalid("deposit amount is zero"));
        }
        self.atomic("deposit", |s| {
            s.chain
                .transfer(s.addrs.want, caller, s.addrs.strategy, amount)?;
            let position = s.deposit_idle()?;
            info!(%caller, %amount, ltv = %position.ltv(), "deposit complete");
            Ok(position)
        })
    }

    /// Supply whatever want the strategy already holds and rebalance.
    pub fn deposit_all(&mut self, caller: Address) -> Result<PositionSnapshot, StrategyError> {
        self.authorize(Action::DepositAll, caller)?;
        self.ensure_active()?;
        self.atomic("deposit_all", |s| s.deposit_idle())
    }

    /// Claim and swap rewards, then re-deposit the proceeds unless paused.
    pub fn harvest(&mut self, caller: Address) -> Result<HarvestReport, StrategyError> {
        self.authorize(Action::Harvest, caller)?;
        self.atomic("harvest", |s| {
            let report = Harvester {
                addrs: &s.addrs,
                route: &s.state.route,
            }
            .harvest(&mut s.chain)?;
            if !s.state.paused && !report.want_gained.is_zero() {
                s.deposit_idle()?;
            }
            Ok(report)
        })
    }

    // -----------------------------------------------------------------------
    // Risk control
    // -----------------------------------------------------------------------

    pub fn lever_max(&mut self, caller: Address) -> Result<LoopOutcome, StrategyError> {
        self.authorize(Action::LeverMax, caller)?;
        self.ensure_active()?;
        self.atomic("lever_max", |s| {
            s.supply_idle()?;
            let position = s.refresh_position()?;
            let outcome = s.lever_up(position)?;
            s.refresh_position()?;
            Ok(outcome)
        })
    }

    /// Deleverage back under the band without withdrawing anything.
    pub fn lever_down(&mut self, caller: Address) -> Result<LoopOutcome, StrategyError> {
        self.authorize(Action::LeverDown, caller)?;
        self.atomic("lever_down", |s| {
            let position = s.refresh_position()?;
            let outcome = s.deleverage(position, WithdrawRequest::NONE)?;
            s.refresh_position()?;
            Ok(outcome)
        })
    }

    /// Repay as much debt as `borrow_depth` allows. Funds stay supplied.
    pub fn deleverage_all(&mut self, caller: Address) -> Result<LoopOutcome, StrategyError> {
        self.authorize(Action::DeleverageAll, caller)?;
        self.atomic("deleverage_all", |s| {
            let position = s.refresh_position()?;
            let outcome = s.deleverage(position, WithdrawRequest::Unbounded)?;
            s.refresh_position()?;
            Ok(outcome)
        })
    }

    pub fn pause(&mut self, caller: Address) -> Result<(), StrategyError> {
        self.authorize(Action::Pause, caller)?;
        if !self.state.paused {
            self.state.paused = true;
            warn!(%caller, "strategy paused");
        }
        Ok(())
    }

    /// Lift the pause and put idle funds back to work.
    pub fn unpause(&mut self, caller: Address) -> Result<PositionSnapshot, StrategyError> {
        self.authorize(Action::Unpause, caller)?;
        self.atomic("unpause", |s| {
            s.state.paused = false;
            info!(%caller, "strategy unpaused");
            s.deposit_idle()
        })
    }

    /// Emergency unwind: repay everything, redeem everything, keep the funds
    /// idle in the strategy and pause.
    pub fn panic(&mut self, caller: Address) -> Result<U256, StrategyError> {
        self.authorize(Action::Panic, caller)?;
        self.atomic("panic", |s| {
            s.unwind_all()?;
            s.state.paused = true;
            let idle = s.idle()?;
            warn!(%caller, %idle, "panic: position unwound and strategy paused");
            Ok(idle)
        })
    }

    pub fn set_risk_params(&mut self, caller: Address, params: RiskParams) -> Result<(), StrategyError> {
        self.authorize(Action::SetRiskParams, caller)?;
        let cf = self.oracle.collateral_factor(&self.chain)?;
        validate_risk(&params, cf)?;
        info!(
            target_ltv = %params.target_ltv,
            drift = %params.allowed_ltv_drift,
            borrow_depth = params.borrow_depth,
            "risk parameters updated"
        );
        self.state.risk = params;
        Ok(())
    }

    pub fn set_target_ltv(
        &mut self,
        caller: Address,
        target_ltv: Wad,
        allowed_ltv_drift: Wad,
    ) -> Result<(), StrategyError> {
        let mut params = self.state.risk.clone();
        params.target_ltv = target_ltv;
        params.allowed_ltv_drift = allowed_ltv_drift;
        self.set_risk_params(caller, params)
    }

    pub fn set_borrow_depth(&mut self, caller: Address, depth: u32) -> Result<(), StrategyError> {
        let mut params = self.state.risk.clone();
        params.borrow_depth = depth;
        self.set_risk_params(caller, params)
    }

    pub fn set_route(&mut self, caller: Address, route: SwapRoute) -> Result<(), StrategyError> {
        self.authorize(Action::SetRoute, caller)?;
        route
            .check(self.addrs.reward_token, self.addrs.want)
            .map_err(|reason| StrategyError::InvalidRoute { reason })?;
        info!(venue = route.venue.as_str(), hops = route.hops().count(), "swap route updated");
        self.state.route = route;
        Ok(())
    }

    /// One redeem + repay pair of `amount`.
    pub fn manual_deleverage(&mut self, caller: Address, amount: U256) -> Result<PositionSnapshot, StrategyError> {
        self.authorize(Action::ManualDeleverage, caller)?;
        self.atomic("manual_deleverage", |s| {
            s.chain
                .redeem_underlying(s.addrs.ctoken, s.addrs.strategy, amount)?;
            s.chain.repay_borrow(s.addrs.ctoken, s.addrs.strategy, amount)?;
            info!(%amount, "manual deleverage");
            s.refresh_position()
        })
    }

    /// Redeem `amount` and leave it idle.
    pub fn manual_release_want(&mut self, caller: Address, amount: U256) -> Result<PositionSnapshot, StrategyError> {
        self.authorize(Action::ManualReleaseWant, caller)?;
        self.atomic("manual_release_want", |s| {
            s.chain
                .redeem_underlying(s.addrs.ctoken, s.addrs.strategy, amount)?;
            info!(%amount, "manual release");
            s.refresh_position()
        })
    }

    /// Repay `amount` of debt from idle want.
    pub fn manual_reduce_borrow(&mut self, caller: Address, amount: U256) -> Result<PositionSnapshot, StrategyError> {
        self.authorize(Action::ManualReduceBorrow, caller)?;
        self.atomic("manual_reduce_borrow", |s| {
            s.chain.repay_borrow(s.addrs.ctoken, s.addrs.strategy, amount)?;
            info!(%amount, "manual borrow reduction");
            s.refresh_position()
        })
    }

    // -----------------------------------------------------------------------
    // Custody
    // -----------------------------------------------------------------------

    /// Pay `amount` to the vault, idle funds first. Returns the amount paid.
    pub fn withdraw(&mut self, caller: Address, amount: U256) -> Result<U256, StrategyError> {
        self.authorize(Action::Withdraw, caller)?;
        if amount.is_zero() {
            return Err(StrategyError::invalid("withdraw amount is zero"));
        }
        self.atomic("withdraw", |s| s.withdraw_inner(amount))
    }

    /// Unwind everything and pay it all to the vault.
    pub fn withdraw_all(&mut self, caller: Address) -> Result<U256, StrategyError> {
        self.authorize(Action::WithdrawAll, caller)?;
        self.atomic("withdraw_all", |s| {
            s.unwind_all()?;
            let left = s.peek_position()?;
            if !left.borrowed.is_zero() || left.supplied > U256::from(REDEEM_ROUNDING_BUFFER) {
                return Err(StrategyError::InsufficientLiquidity {
                    reason: format!(
                        "{} still supplied against {} borrowed after unwinding",
                        left.supplied, left.borrowed
                    ),
                });
            }
            let paid = s.idle()?;
            if !paid.is_zero() {
                s.chain
                    .transfer(s.addrs.want, s.addrs.strategy, s.addrs.vault, paid)?;
            }
            info!(%paid, "withdraw_all complete");
            Ok(paid)
        })
    }

    /// Send the strategy's whole balance of `token` to the caller. Want and
    /// the market token are never sweepable.
    pub fn sweep(&mut self, caller: Address, token: Address) -> Result<U256, StrategyError> {
        self.authorize(Action::Sweep, caller)?;
        if token == self.addrs.want || token == self.addrs.ctoken {
            return Err(StrategyError::invalid(format!("cannot sweep protected token {token}")));
        }
        self.atomic("sweep", |s| {
            let amount = s.chain.balance_of(token, s.addrs.strategy)?;
            if !amount.is_zero() {
                s.chain.transfer(token, s.addrs.strategy, caller, amount)?;
            }
            info!(%token, %amount, %caller, "swept");
            Ok(amount)
        })
    }

    pub fn grant_role(&mut self, caller: Address, role: Role, principal: Address) -> Result<bool, StrategyError> {
        self.authorize(Action::ManageRoles, caller)?;
        Ok(self.state.access.grant(role, principal))
    }

    pub fn revoke_role(&mut self, caller: Address, role: Role, principal: Address) -> Result<bool, StrategyError> {
        self.authorize(Action::ManageRoles, caller)?;
        self.state.access.revoke(role, principal)
    }

    // -----------------------------------------------------------------------
    // Position oracle
    // -----------------------------------------------------------------------

    /// Accrue interest, read the position and cache its net balance.
    pub fn refresh_position(&mut self) -> Result<PositionSnapshot, StrategyError> {
        let position = self.oracle.refresh(&mut self.chain)?;
        self.state.cached_net_balance = position.net();
        Ok(position)
    }

    pub fn peek_position(&self) -> Result<PositionSnapshot, StrategyError> {
        self.oracle.peek(&self.chain)
    }

    pub fn collateral_factor(&self) -> Result<Wad, StrategyError> {
        self.oracle.collateral_factor(&self.chain)
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    /// Evaluate the safety checks against the stored position. Debt only
    /// includes interest accrued up to the last market touch, so call
    /// [`Self::refresh_position`] first when the result must be current.
    pub fn should_deleverage(&self) -> Result<DeleverageReason, StrategyError> {
        let position = self.peek_position()?;
        self.evaluator(self.collateral_factor()?).evaluate(&self.chain, position)
    }

    /// Same staleness as [`Self::should_deleverage`].
    pub fn profitability(&self) -> Result<ProfitabilityQuote, StrategyError> {
        let position = self.peek_position()?;
        self.evaluator(self.collateral_factor()?)
            .profitability(&self.chain, position)
    }

    /// Idle want plus the cached net position. Stale until the next refresh.
    pub fn balance_of(&self) -> Result<U256, StrategyError> {
        Ok(self.idle()?.saturating_add(self.state.cached_net_balance))
    }

    pub fn estimate_harvest(&self) -> Result<U256, StrategyError> {
        Harvester {
            addrs: &self.addrs,
            route: &self.state.route,
        }
        .estimate(&self.chain)
    }

    pub fn status(&self) -> Result<StrategyStatus, StrategyError> {
        let position = self.peek_position()?;
        let cf = self.collateral_factor()?;
        let reason = self.evaluator(cf).evaluate(&self.chain, position)?;
        let decimals = self.want_decimals;
        Ok(StrategyStatus {
            supplied: from_raw_units(position.supplied, decimals),
            borrowed: from_raw_units(position.borrowed, decimals),
            idle: from_raw_units(self.idle()?, decimals),
            ltv: position.ltv().to_decimal(),
            target_ltv: self.state.risk.target_ltv.to_decimal(),
            collateral_factor: cf.to_decimal(),
            reason,
            paused: self.state.paused,
            timestamp: chrono::Utc::now().timestamp(),
        })
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused
    }

    pub fn cached_net_balance(&self) -> U256 {
        self.state.cached_net_balance
    }

    pub fn risk(&self) -> &RiskParams {
        &self.state.risk
    }

    pub fn route(&self) -> &SwapRoute {
        &self.state.route
    }

    pub fn access(&self) -> &AccessControl {
        &self.state.access
    }

    pub fn addresses(&self) -> &MarketAddresses {
        &self.addrs
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut C {
        &mut self.chain
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn authorize(&self, action: Action, caller: Address) -> Result<(), StrategyError> {
        self.state.access.require(action, caller)
    }

    fn ensure_active(&self) -> Result<(), StrategyError> {
        if self.state.paused {
            return Err(StrategyError::Paused);
        }
        Ok(())
    }

    fn atomic<T>(
        &mut self,
        op: &'static str,
        f: impl FnOnce(&mut Self) -> Result<T, StrategyError>,
    ) -> Result<T, StrategyError> {
        let checkpoint = self.chain.snapshot();
        let saved = self.state.clone();
        match f(self) {
            Ok(value) => {
                self.chain.commit(checkpoint)?;
                Ok(value)
            }
            Err(err) => {
                self.chain.revert_to(checkpoint)?;
                self.state = saved;
                warn!(op, error = %err, "operation reverted");
                Err(err)
            }
        }
    }

    fn idle(&self) -> Result<U256, StrategyError> {
        Ok(self.chain.balance_of(self.addrs.want, self.addrs.strategy)?)
    }

    fn supply_idle(&mut self) -> Result<U256, StrategyError> {
        let idle = self.idle()?;
        if !idle.is_zero() {
            self.chain
                .supply(self.addrs.ctoken, self.addrs.strategy, idle)?;
        }
        Ok(idle)
    }

    /// Supply idle want, then lever up or down if the LTV left the band.
    fn deposit_idle(&mut self) -> Result<PositionSnapshot, StrategyError> {
        self.supply_idle()?;
        let position = self.refresh_position()?;
        let ltv = position.ltv();
        if ltv < self.state.risk.lower_band() {
            self.lever_up(position)?;
        } else if ltv > self.state.risk.upper_band() {
            self.deleverage(position, WithdrawRequest::NONE)?;
        } else {
            return Ok(position);
        }
        self.refresh_position()
    }

    fn withdraw_inner(&mut self, amount: U256) -> Result<U256, StrategyError> {
        let idle = self.idle()?;
        if idle >= amount {
            self.chain
                .transfer(self.addrs.want, self.addrs.strategy, self.addrs.vault, amount)?;
            info!(%amount, "withdraw paid from idle funds");
            return Ok(amount);
        }

        let shortfall = amount - idle;
        let position = self.refresh_position()?;
        let path = self.withdraw_path(position, shortfall);

        match path {
            WithdrawPath::OverBand => {
                self.deleverage(position, WithdrawRequest::Amount(shortfall))?;
                let position = self.refresh_position()?;
                self.withdraw_underlying(shortfall, position)?;
            }
            WithdrawPath::InsideBand | WithdrawPath::UnderBand => {
                self.withdraw_underlying(shortfall, position)?;
            }
        }

        let paid = self.idle()?.min(amount);
        self.chain
            .transfer(self.addrs.want, self.addrs.strategy, self.addrs.vault, paid)?;

        let position = self.refresh_position()?;
        if path == WithdrawPath::UnderBand && !self.state.paused {
            self.lever_up(position)?;
            self.refresh_position()?;
        }
        info!(requested = %amount, %paid, path = ?path, "withdraw complete");
        Ok(paid)
    }

    fn withdraw_path(&self, position: PositionSnapshot, shortfall: U256) -> WithdrawPath {
        if position.supplied <= shortfall {
            return WithdrawPath::OverBand;
        }
        let post = PositionSnapshot::new(position.supplied - shortfall, position.borrowed).ltv();
        if post > self.state.risk.upper_band() {
            WithdrawPath::OverBand
        } else if post < self.state.risk.lower_band() {
            WithdrawPath::UnderBand
        } else {
            WithdrawPath::InsideBand
        }
    }

    /// Full deleverage, then redeem all the collateral the market releases.
    fn unwind_all(&mut self) -> Result<U256, StrategyError> {
        let position = self.refresh_position()?;
        self.deleverage(position, WithdrawRequest::Unbounded)?;

        let position = self.refresh_position()?;
        let redeemable = if position.borrowed.is_zero() {
            position.supplied
        } else {
            let cf = self.collateral_factor()?;
            warn!(borrowed = %position.borrowed, "debt remains after full deleverage");
            position
                .supplied
                .saturating_sub(div_wad(position.borrowed, cf))
                .saturating_sub(U256::from(REDEEM_ROUNDING_BUFFER))
        };
        let cash = self.chain.get_cash(self.addrs.ctoken)?;
        let amount = redeemable.min(cash);
        if !amount.is_zero() {
            self.chain
                .redeem_underlying(self.addrs.ctoken, self.addrs.strategy, amount)?;
        }
        self.refresh_position()?;
        Ok(amount)
    }

    fn lever_up(&mut self, position: PositionSnapshot) -> Result<LoopOutcome, StrategyError> {
        let cf = self.collateral_factor()?;
        LeverageEngine {
            oracle: &self.oracle,
            addrs: &self.addrs,
            risk: &self.state.risk,
            collateral_factor: cf,
        }
        .run(&mut self.chain, position)
    }

    fn deleverage(
        &mut self,
        position: PositionSnapshot,
        request: WithdrawRequest,
    ) -> Result<LoopOutcome, StrategyError> {
        let cf = self.collateral_factor()?;
        DeleverageEngine {
            oracle: &self.oracle,
            addrs: &self.addrs,
            risk: &self.state.risk,
            collateral_factor: cf,
        }
        .run(&mut self.chain, position, request)
    }

    fn withdraw_underlying(&mut self, amount: U256, position: PositionSnapshot) -> Result<U256, StrategyError> {
        let cf = self.collateral_factor()?;
        DeleverageEngine {
            oracle: &self.oracle,
            addrs: &self.addrs,
            risk: &self.state.risk,
            collateral_factor: cf,
        }
        .withdraw_underlying(&mut self.chain, amount, position)
    }

    fn evaluator(&self, cf: Wad) -> SafetyEvaluator<'_> {
        SafetyEvaluator {
            addrs: &self.addrs,
            risk: &self.state.risk,
            route: &self.state.route,
            collateral_factor: cf,
        }
    }
}

/// Checks a new parameter set against the live collateral factor.
pub fn validate_risk(risk: &RiskParams, collateral_factor: Wad) -> Result<(), StrategyError> {
    if risk.upper_band() >= collateral_factor {
        return Err(StrategyError::invalid(format!(
            "target_ltv + allowed_ltv_drift ({}) must be below the collateral factor ({collateral_factor})",
            risk.upper_band()
        )));
    }
    if risk.borrow_depth > risk.max_borrow_depth {
        return Err(StrategyError::invalid(format!(
            "borrow_depth ({}) exceeds max_borrow_depth ({})",
            risk.borrow_depth, risk.max_borrow_depth
        )));
    }
    if risk.max_borrow_depth > MAX_BORROW_DEPTH_CAP {
        return Err(StrategyError::invalid(format!(
            "max_borrow_depth ({}) exceeds {MAX_BORROW_DEPTH_CAP}",
            risk.max_borrow_depth
        )));
    }
    if risk.withdraw_slippage_tolerance_bps > BPS_PRECISION {
        return Err(StrategyError::invalid(format!(
            "withdraw_slippage_tolerance_bps ({}) exceeds {BPS_PRECISION}",
            risk.withdraw_slippage_tolerance_bps
        )));
    }
    if risk.ltv_scale_of_safe_cf_bps < BPS_PRECISION {
        return Err(StrategyError::invalid(format!(
            "ltv_scale_of_safe_cf_bps ({}) must be at least {BPS_PRECISION}",
            risk.ltv_scale_of_safe_cf_bps
        )));
    }
    Ok(())
}
