//! Role-based access control.
//!
//! Tiers are ordered: a principal holding `Custody` may perform every
//! `RiskControl` and `Operate` action as well.

use std::collections::{HashMap, HashSet};

use alloy::primitives::Address;
use tracing::info;

use crate::errors::StrategyError;
use crate::types::{Action, Role};

#[derive(Debug, Clone, Default)]
pub struct AccessControl {
    grants: HashMap<Role, HashSet<Address>>,
}

impl AccessControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_grants(grants: &HashMap<Role, Vec<Address>>) -> Self {
        let mut access = Self::new();
        for (role, principals) in grants {
            for principal in principals {
                access.grant(*role, *principal);
            }
        }
        access
    }

    /// Highest tier `principal` holds, if any.
    pub fn tier_of(&self, principal: Address) -> Option<Role> {
        Role::ALL
            .iter()
            .rev()
            .find(|role| {
                self.grants
                    .get(role)
                    .is_some_and(|members| members.contains(&principal))
            })
            .copied()
    }

    pub fn has(&self, role: Role, principal: Address) -> bool {
        self.tier_of(principal).is_some_and(|tier| tier >= role)
    }

    pub fn require(&self, action: Action, caller: Address) -> Result<(), StrategyError> {
        let required = action.required_role();
        if self.has(required, caller) {
            Ok(())
        } else {
            Err(StrategyError::Unauthorized {
                caller,
                action,
                required,
            })
        }
    }

    /// Returns `false` if the grant already existed.
    pub fn grant(&mut self, role: Role, principal: Address) -> bool {
        let added = self.grants.entry(role).or_default().insert(principal);
        if added {
            info!(role = role.as_str(), %principal, "role granted");
        }
        added
    }

    /// Revoke an explicit grant. The last custody principal cannot be
    /// removed.
    pub fn revoke(&mut self, role: Role, principal: Address) -> Result<bool, StrategyError> {
        if role == Role::Custody && self.members(Role::Custody) == [principal] {
            return Err(StrategyError::invalid("cannot revoke the last custody principal"));
        }
        let removed = self
            .grants
            .get_mut(&role)
            .is_some_and(|members| members.remove(&principal));
        if removed {
            info!(role = role.as_str(), %principal, "role revoked");
        }
        Ok(removed)
    }

    /// Principals explicitly granted `role`, sorted.
    pub fn members(&self, role: Role) -> Vec<Address> {
        let mut members: Vec<Address> = self
            .grants
            .get(&role)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default();
        members.sort();
        members
    }
}
