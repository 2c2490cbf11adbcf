//! Smart Wallet Registry
//!
//! Account abstraction for a multi-protocol DeFi platform:
//! - A registry, behind an upgradeable proxy, maps owners to wallets and
//!   decides which logic modules wallets may call
//! - Each owner's wallet runs atomic batches of module calls and withholds
//!   the protocol fee on realized inflows
//! - Owners authorize delegates, or sign batches for a relayer to submit
//!
//! # Execution Model
//!
//! - All balances live in one journaled ledger; a batch commits or reverts as a whole
//! - Events of a batch are published only after it committed
//! - Wallet code is resolved from the registry on every call, so an
//!   implementation change reaches every wallet at once

pub mod config;
pub mod environment;
pub mod events;
pub mod ledger;
pub mod modules;
pub mod protocols;
pub mod proxy;
pub mod registry;
pub mod signer;
pub mod tokens;
pub mod wallet;

mod error;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::{BurnPolicy, Config, GasTokenConfig, PRIVATE_KEY_ENV};
pub use environment::{Code, Environment};
pub use error::{Error, Result};
pub use proxy::{Proxy, ProxyAdmin};
pub use registry::{Registry, RegistryInit};
pub use wallet::{ExecutionReceipt, Wallet};
