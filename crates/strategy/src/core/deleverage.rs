//! Deleverage engine: redeem collateral and repay debt until the position
//! can release a requested amount at the target LTV.

use alloy::primitives::U256;
use tracing::{debug, info, warn};

use crate::config::MarketAddresses;
use crate::constants::{BPS_PRECISION, DELEVERAGE_SAFETY_MARGIN, REDEEM_ROUNDING_BUFFER};
use crate::errors::StrategyError;
use crate::execution::{LendingMarket, TokenLedger};
use crate::types::wad_ray::{div_wad, max_borrow_from_supplied, mul_bps};
use crate::types::{LoopOutcome, LoopStop, PositionSnapshot, RiskParams, Wad, WithdrawRequest};

use super::position_oracle::PositionOracle;

pub struct DeleverageEngine<'a> {
    pub oracle: &'a PositionOracle,
    pub addrs: &'a MarketAddresses,
    pub risk: &'a RiskParams,
    pub collateral_factor: Wad,
}

impl DeleverageEngine<'_> {
    /// Unwind enough debt that `request` can be withdrawn while the rest of
    /// the position stays at the target LTV. Requests beyond the net
    /// position are clamped, never rejected.
    pub fn run<C>(
        &self,
        chain: &mut C,
        position: PositionSnapshot,
        request: WithdrawRequest,
    ) -> Result<LoopOutcome, StrategyError>
    where
        C: LendingMarket + TokenLedger + ?Sized,
    {
        let unwound = position.net();
        let withdraw = request.clamp(unwound);
        let desired_after = max_borrow_from_supplied(unwound - withdraw, self.risk.target_ltv)
            .saturating_sub(U256::from(DELEVERAGE_SAFETY_MARGIN));
        if position.borrowed <= desired_after {
            return Ok(LoopOutcome::idle(position));
        }
        let mut remaining = position.borrowed - desired_after;
        debug!(%withdraw, %desired_after, total_repay = %remaining, "deleverage planned");

        // a full unwind repays every last wei of debt
        let full_unwind = request == WithdrawRequest::Unbounded;
        let buffer = U256::from(REDEEM_ROUNDING_BUFFER);
        let mut current = position;
        let mut iterations = 0;
        let mut stop = LoopStop::DepthExhausted;

        while iterations < self.risk.borrow_depth {
            if remaining.is_zero() || (!full_unwind && remaining < self.risk.min_want_to_leverage) {
                stop = LoopStop::DustThreshold;
                break;
            }

            current = self.oracle.peek(chain)?;
            if current.borrowed.is_zero() {
                stop = LoopStop::DustThreshold;
                break;
            }
            let max_redeem = current
                .supplied
                .saturating_sub(div_wad(current.borrowed, self.collateral_factor))
                .saturating_sub(buffer);
            let step = max_redeem.min(remaining).min(current.borrowed);
            if step.is_zero() {
                stop = LoopStop::NoHeadroom;
                break;
            }

            chain.redeem_underlying(self.addrs.ctoken, self.addrs.strategy, step)?;
            chain.repay_borrow(self.addrs.ctoken, self.addrs.strategy, step)?;

            remaining -= step;
            iterations += 1;
            debug!(iteration = iterations, %step, %remaining, "deleverage step");
        }

        if stop == LoopStop::DepthExhausted && remaining.is_zero() {
            stop = LoopStop::DustThreshold;
        }
        if iterations > 0 {
            current = self.oracle.peek(chain)?;
        }
        if stop == LoopStop::NoHeadroom {
            warn!(%remaining, "deleverage stopped without collateral headroom");
        }

        info!(
            iterations,
            stop = ?stop,
            supplied = %current.supplied,
            borrowed = %current.borrowed,
            ltv = %current.ltv(),
            "deleverage loop finished"
        );
        Ok(LoopOutcome {
            iterations,
            stop,
            position: current,
        })
    }

    /// Redeem up to `amount` without pushing the remaining position above
    /// `target + drift`. Fails if market cash or collateral headroom cut the
    /// amount by more than the slippage tolerance. Returns the amount
    /// redeemed.
    pub fn withdraw_underlying<C>(
        &self,
        chain: &mut C,
        amount: U256,
        position: PositionSnapshot,
    ) -> Result<U256, StrategyError>
    where
        C: LendingMarket + ?Sized,
    {
        let upper = self.risk.upper_band();
        let reserved = if position.borrowed.is_zero() {
            U256::ZERO
        } else if upper.is_zero() {
            position.supplied
        } else {
            div_wad(position.borrowed, upper)
        };
        let cash = chain.get_cash(self.addrs.ctoken)?;
        let available = position.supplied.saturating_sub(reserved);
        let final_amount = amount.min(available).min(cash);

        let tolerance = BPS_PRECISION.saturating_sub(self.risk.withdraw_slippage_tolerance_bps);
        let minimum = mul_bps(amount, tolerance);
        if final_amount < minimum {
            return Err(StrategyError::WithdrawSlippage {
                requested: amount,
                actual: final_amount,
                minimum,
            });
        }

        if !final_amount.is_zero() {
            chain.redeem_underlying(self.addrs.ctoken, self.addrs.strategy, final_amount)?;
        }
        debug!(requested = %amount, redeemed = %final_amount, %cash, %reserved, "underlying withdrawn");
        Ok(final_amount)
    }
}
