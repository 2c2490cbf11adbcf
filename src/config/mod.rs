//! Configuration for the wallet registry

use crate::tokens::addresses::CHI;
use crate::{Error, Result};
use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable holding the signing key
pub const PRIVATE_KEY_ENV: &str = "PRIVATE_KEY";

/// Fees are parts of this denominator (1000 = 1%)
pub const FEE_DENOMINATOR: u64 = 100_000;

/// Supported blockchain networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Ethereum,
    Arbitrum,
    Optimism,
    Base,
}

impl Network {
    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Ethereum => 1,
            Network::Arbitrum => 42161,
            Network::Optimism => 10,
            Network::Base => 8453,
        }
    }
}

/// What a failed gas-token burn does to its batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BurnPolicy {
    /// Roll back only the burn, log it and keep the batch
    #[default]
    BestEffort,
    /// Abort the whole batch
    Atomic,
}

/// Gas rebate token burned when a batch asks for it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasTokenConfig {
    pub token: Address,
    /// Units burned for every batch
    pub base_units: u64,
    /// Extra units per batch step
    pub units_per_step: u64,
    #[serde(default)]
    pub policy: BurnPolicy,
}

impl GasTokenConfig {
    pub fn units_for(&self, steps: usize) -> u64 {
        self.base_units
            .saturating_add(self.units_per_step.saturating_mul(steps as u64))
    }
}

impl Default for GasTokenConfig {
    fn default() -> Self {
        Self {
            token: CHI,
            base_units: 1,
            units_per_step: 1,
            policy: BurnPolicy::BestEffort,
        }
    }
}

/// Registry fee settings applied at deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Defaults to the registry owner
    pub recipient: Option<Address>,
    /// Parts of [`FEE_DENOMINATOR`]
    pub bps: u64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            recipient: None,
            bps: 1_000, // 1%
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Network whose chain id domain-separates meta-transactions
    #[serde(default)]
    pub network: Network,
    #[serde(default)]
    pub fee: FeeConfig,
    #[serde(default)]
    pub gas_token: GasTokenConfig,
    /// Path to the JSONL event log
    #[serde(default)]
    pub event_log_path: Option<String>,
}

impl Config {
    /// Read a JSON config file, or the defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
                serde_json::from_str(&content).map_err(|e| Error::Config(e.to_string()))?
            }
            None => Config::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fee.bps >= FEE_DENOMINATOR {
            return Err(Error::Config(format!(
                "fee.bps {} must be below {}",
                self.fee.bps, FEE_DENOMINATOR
            )));
        }
        Ok(())
    }

    pub fn chain_id(&self) -> u64 {
        self.network.chain_id()
    }
}
