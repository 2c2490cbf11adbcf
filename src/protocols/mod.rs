//! Simulated external protocols
//!
//! Their state lives in the shared ledger so batch reverts cover it.

pub mod amm;
pub mod lending;

pub use amm::AmmPools;
pub use lending::{LendingMarkets, Market};
