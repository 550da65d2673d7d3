use serde::{Deserialize, Serialize};

/// Privilege tiers, ordered. Holding a tier implies every tier below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Operational triggers: deposit, harvest.
    Operate,
    /// Risk parameters and emergency controls.
    RiskControl,
    /// Fund custody: withdrawals, sweeps, role management.
    Custody,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Operate, Role::RiskControl, Role::Custody];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Operate => "operate",
            Self::RiskControl => "risk_control",
            Self::Custody => "custody",
        }
    }
}

/// Every privileged entry point of the strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Deposit,
    DepositAll,
    Harvest,
    LeverMax,
    LeverDown,
    DeleverageAll,
    Pause,
    Unpause,
    Panic,
    SetRiskParams,
    SetRoute,
    ManualDeleverage,
    ManualReleaseWant,
    ManualReduceBorrow,
    Withdraw,
    WithdrawAll,
    Sweep,
    ManageRoles,
}

impl Action {
    /// Minimum tier allowed to perform this action.
    pub fn required_role(&self) -> Role {
        match self {
            Self::Deposit | Self::DepositAll | Self::Harvest => Role::Operate,
            Self::LeverMax
            | Self::LeverDown
            | Self::DeleverageAll
            | Self::Pause
            | Self::Unpause
            | Self::Panic
            | Self::SetRiskParams
            | Self::SetRoute
            | Self::ManualDeleverage
            | Self::ManualReleaseWant
            | Self::ManualReduceBorrow => Role::RiskControl,
            Self::Withdraw | Self::WithdrawAll | Self::Sweep | Self::ManageRoles => Role::Custody,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::DepositAll => "deposit_all",
            Self::Harvest => "harvest",
            Self::LeverMax => "lever_max",
            Self::LeverDown => "lever_down",
            Self::DeleverageAll => "deleverage_all",
            Self::Pause => "pause",
            Self::Unpause => "unpause",
            Self::Panic => "panic",
            Self::SetRiskParams => "set_risk_params",
            Self::SetRoute => "set_route",
            Self::ManualDeleverage => "manual_deleverage",
            Self::ManualReleaseWant => "manual_release_want",
            Self::ManualReduceBorrow => "manual_reduce_borrow",
            Self::Withdraw => "withdraw",
            Self::WithdrawAll => "withdraw_all",
            Self::Sweep => "sweep",
            Self::ManageRoles => "manage_roles",
        }
    }
}
