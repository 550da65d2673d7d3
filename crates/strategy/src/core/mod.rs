pub mod access;
pub mod deleverage;
pub mod harvester;
pub mod keeper;
pub mod leverage;
pub mod position_oracle;
pub mod safety;
pub mod strategy;

pub use access::AccessControl;
pub use keeper::{BlockProducer, Keeper, KeeperSettings};
pub use strategy::{Strategy, StrategyParams};
