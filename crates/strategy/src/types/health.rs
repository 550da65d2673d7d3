use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Outcome of the safety evaluator, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleverageReason {
    /// No action needed.
    None,
    /// LTV scaled by the safety factor reaches the collateral factor.
    LtvNearLiquidation,
    /// LTV drifted above `target + drift`.
    LtvAboveTarget,
    /// Market cash below the absolute liquidity floor.
    MarketLiquidityLow,
    /// Market cash below a multiple of this strategy's own principal.
    LiquidityBelowPrincipal,
    /// Projected income no longer covers the (offset) borrow cost.
    Unprofitable,
}

impl DeleverageReason {
    /// Stable numeric code (0 = no action).
    pub fn code(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::LtvNearLiquidation => 1,
            Self::LtvAboveTarget => 2,
            Self::MarketLiquidityLow => 3,
            Self::LiquidityBelowPrincipal => 4,
            Self::Unprofitable => 5,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::None => "no action needed",
            Self::LtvNearLiquidation => "LTV too close to liquidation threshold",
            Self::LtvAboveTarget => "LTV drifted above target",
            Self::MarketLiquidityLow => "market liquidity too low to safely unwind",
            Self::LiquidityBelowPrincipal => {
                "liquidity insufficient relative to this strategy's own principal"
            }
            Self::Unprofitable => "position no longer profitable",
        }
    }

    pub fn should_deleverage(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Point-in-time view of the strategy, emitted by the keeper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyStatus {
    #[serde(with = "rust_decimal::serde::str")]
    pub supplied: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub borrowed: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub idle: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub ltv: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub target_ltv: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub collateral_factor: Decimal,
    pub reason: DeleverageReason,
    pub paused: bool,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_codes_are_ordered() {
        let reasons = [
            DeleverageReason::None,
            DeleverageReason::LtvNearLiquidation,
            DeleverageReason::LtvAboveTarget,
            DeleverageReason::MarketLiquidityLow,
            DeleverageReason::LiquidityBelowPrincipal,
            DeleverageReason::Unprofitable,
        ];
        for (i, reason) in reasons.iter().enumerate() {
            assert_eq!(reason.code() as usize, i);
        }
        assert!(!DeleverageReason::None.should_deleverage());
        assert!(DeleverageReason::Unprofitable.should_deleverage());
    }

    #[test]
    fn test_reason_serializes_snake_case() {
        let json = serde_json::to_string(&DeleverageReason::LtvAboveTarget).unwrap();
        assert_eq!(json, "\"ltv_above_target\"");
    }
}
