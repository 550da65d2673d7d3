pub mod harvest;
pub mod health;
pub mod position;
pub mod risk;
pub mod roles;
pub mod routing;
pub mod wad_ray;

pub use harvest::HarvestReport;
pub use health::{DeleverageReason, StrategyStatus};
pub use position::{LoopOutcome, LoopStop, PositionSnapshot, WithdrawRequest};
pub use risk::RiskParams;
pub use roles::{Action, Role};
pub use routing::{RouteVenue, SwapRoute};
pub use wad_ray::Wad;
