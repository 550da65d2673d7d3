//! Leveraged lending strategy engine.
//!
//! Supplies a "want" token to a Compound-style market, borrows against it
//! and re-supplies in a bounded loop to hold a target loan-to-value ratio.
//! Market rewards are harvested and swapped back to want. Every external
//! system sits behind the traits in [`execution`]; [`sim`] implements them
//! in memory for tests and paper trading.

pub mod config;
pub mod constants;
pub mod core;
pub mod errors;
pub mod execution;
pub mod logging;
pub mod sim;
pub mod types;
