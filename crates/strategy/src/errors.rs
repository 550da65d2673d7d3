use alloy::primitives::{Address, U256};
use thiserror::Error;

use crate::types::{Action, Role};

/// Failure reported by an external collaborator (market, registry, venue,
/// token ledger). Always fatal to the enclosing strategy operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("{call} reverted: {reason}")]
    Reverted { call: &'static str, reason: String },

    #[error("insufficient {token} balance for {account}: have {have}, need {need}")]
    InsufficientBalance {
        token: Address,
        account: Address,
        have: U256,
        need: U256,
    },

    #[error("unknown checkpoint {0}")]
    UnknownCheckpoint(usize),
}

impl ChainError {
    pub fn reverted(call: &'static str, reason: impl Into<String>) -> Self {
        Self::Reverted {
            call,
            reason: reason.into(),
        }
    }
}

/// Typed error hierarchy for the strategy.
///
/// Every variant aborts the whole operation; the façade restores chain and
/// strategy state before returning it. Application code wraps with
/// `anyhow::Context` for propagation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StrategyError {
    // -- Parameter validation -----------------------------------------------
    #[error("invalid parameter: {reason}")]
    InvalidParameter { reason: String },

    #[error("invalid swap route: {reason}")]
    InvalidRoute { reason: String },

    // -- Liquidity / slippage -----------------------------------------------
    #[error("withdraw slippage: got {actual}, need at least {minimum} (requested {requested})")]
    WithdrawSlippage {
        requested: U256,
        actual: U256,
        minimum: U256,
    },

    #[error("insufficient liquidity: {reason}")]
    InsufficientLiquidity { reason: String },

    // -- Access -------------------------------------------------------------
    #[error("{caller} lacks role {required:?} for {action:?}")]
    Unauthorized {
        caller: Address,
        action: Action,
        required: Role,
    },

    #[error("strategy is paused")]
    Paused,

    #[error("market {0} is not listed")]
    MarketNotListed(Address),

    // -- Forwarded errors ---------------------------------------------------
    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl StrategyError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            reason: reason.into(),
        }
    }
}
