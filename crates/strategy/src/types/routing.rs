use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

/// Swap venue used to convert reward tokens to the base asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteVenue {
    /// Multi-hop constant-product router. The stable/volatile pool flag of
    /// each hop is taken from the router's quote.
    ConstantProduct,
    /// Single-pool concentrated-liquidity router. `pool_fee` is in
    /// hundredths of a basis point (3000 = 0.3%).
    Concentrated { pool_fee: u32 },
}

impl RouteVenue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConstantProduct => "constant_product",
            Self::Concentrated { .. } => "concentrated",
        }
    }
}

/// Ordered token path from the reward token to the base asset plus the
/// venue that executes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRoute {
    pub path: Vec<Address>,
    pub venue: RouteVenue,
}

impl SwapRoute {
    pub fn new(path: Vec<Address>, venue: RouteVenue) -> Self {
        Self { path, venue }
    }

    /// Consecutive `(token_in, token_out)` pairs.
    pub fn hops(&self) -> impl Iterator<Item = (Address, Address)> + '_ {
        self.path.windows(2).map(|w| (w[0], w[1]))
    }

    /// Check the route starts at `from`, ends at `to` and never hops a token
    /// into itself.
    pub fn check(&self, from: Address, to: Address) -> Result<(), String> {
        if self.path.len() < 2 {
            return Err(format!("route needs at least 2 tokens, got {}", self.path.len()));
        }
        if self.path.first() != Some(&from) {
            return Err(format!("route must start at reward token {from}"));
        }
        if self.path.last() != Some(&to) {
            return Err(format!("route must end at want token {to}"));
        }
        if self.hops().any(|(a, b)| a == b) {
            return Err("route contains a hop from a token to itself".into());
        }
        if let RouteVenue::Concentrated { pool_fee } = self.venue {
            if pool_fee == 0 || pool_fee >= 1_000_000 {
                return Err(format!("pool fee {pool_fee} out of range (0, 1_000_000)"));
            }
        }
        Ok(())
    }
}
