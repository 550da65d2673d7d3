//! Call contracts of the external collaborators.
//!
//! The strategy never talks to a concrete market or router; it is generic
//! over [`Chain`], the union of these traits. [`crate::sim::SimChain`] is the
//! in-memory implementation used by tests and paper mode.

pub mod market;
pub mod venues;

pub use market::{
    AccountSnapshot, Chain, Checkpoint, LendingMarket, MarketInfo, MarketRegistry, TokenLedger,
};
pub use venues::{
    execute_route, quote_route, ConcentratedVenue, ConstantProductVenue, ExactInputSingleParams,
    Hop,
};
