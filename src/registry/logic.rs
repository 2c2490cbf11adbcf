//! Registry storage and implementation code

use crate::config::FEE_DENOMINATOR;
use crate::proxy::StorageLayout;
use crate::{Error, Result};
use alloy::primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Field order of [`RegistryStorage`]; new fields are only ever appended
pub const REGISTRY_LAYOUT_V1: StorageLayout = StorageLayout(&[
    "initialized",
    "owner",
    "fee_recipient",
    "fee_bps",
    "wallet_implementation",
    "wallets",
    "enabled_modules",
    "not_allowed",
]);

/// State kept by the registry proxy across upgrades
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryStorage {
    pub initialized: bool,
    pub owner: Address,
    pub fee_recipient: Address,
    pub fee_bps: u64,
    pub wallet_implementation: Address,
    /// owner -> wallet
    pub wallets: HashMap<Address, Address>,
    pub enabled_modules: HashSet<Address>,
    pub not_allowed: HashSet<Address>,
}

/// Arguments of the one-shot initializer
#[derive(Debug, Clone, Copy)]
pub struct RegistryInit {
    pub wallet_implementation: Address,
    pub owner: Address,
    pub fee_recipient: Address,
    pub fee_bps: u64,
}

fn check_fee(bps: u64) -> Result<()> {
    if bps >= FEE_DENOMINATOR {
        return Err(Error::InvalidFee(bps));
    }
    Ok(())
}

/// Registry implementation
///
/// Every method operates on the proxy's storage. Implementations override
/// what changes between versions and inherit the rest.
pub trait RegistryLogic: Send + Sync {
    fn version(&self) -> &'static str;

    fn layout(&self) -> StorageLayout {
        REGISTRY_LAYOUT_V1
    }

    fn initialize(&self, storage: &mut RegistryStorage, init: RegistryInit) -> Result<()> {
        if storage.initialized {
            return Err(Error::AlreadyInitialized);
        }
        check_fee(init.fee_bps)?;
        storage.initialized = true;
        storage.owner = init.owner;
        storage.fee_recipient = init.fee_recipient;
        storage.fee_bps = init.fee_bps;
        storage.wallet_implementation = init.wallet_implementation;
        Ok(())
    }

    fn only_owner(&self, storage: &RegistryStorage, caller: Address) -> Result<()> {
        if caller != storage.owner {
            return Err(Error::AccessDenied(
                "Ownable: caller is not the owner".to_string(),
            ));
        }
        Ok(())
    }

    /// Record a new wallet; returns false when `owner` already has one
    fn record_wallet(&self, storage: &mut RegistryStorage, owner: Address, wallet: Address) -> bool {
        if storage.wallets.contains_key(&owner) {
            return false;
        }
        storage.wallets.insert(owner, wallet);
        true
    }

    fn enable_logic(&self, storage: &mut RegistryStorage, caller: Address, module: Address) -> Result<()> {
        self.only_owner(storage, caller)?;
        storage.enabled_modules.insert(module);
        Ok(())
    }

    fn enable_logic_multiple(
        &self,
        storage: &mut RegistryStorage,
        caller: Address,
        modules: &[Address],
    ) -> Result<()> {
        self.only_owner(storage, caller)?;
        storage.enabled_modules.extend(modules.iter().copied());
        Ok(())
    }

    fn disable_logic(&self, storage: &mut RegistryStorage, caller: Address, module: Address) -> Result<()> {
        self.only_owner(storage, caller)?;
        storage.enabled_modules.remove(&module);
        Ok(())
    }

    fn set_implementation(
        &self,
        storage: &mut RegistryStorage,
        caller: Address,
        implementation: Address,
    ) -> Result<()> {
        self.only_owner(storage, caller)?;
        storage.wallet_implementation = implementation;
        Ok(())
    }

    fn set_fee(
        &self,
        storage: &mut RegistryStorage,
        caller: Address,
        recipient: Address,
        bps: u64,
    ) -> Result<()> {
        self.only_owner(storage, caller)?;
        check_fee(bps)?;
        storage.fee_recipient = recipient;
        storage.fee_bps = bps;
        Ok(())
    }

    fn set_not_allowed(
        &self,
        storage: &mut RegistryStorage,
        caller: Address,
        assets: &[Address],
        flag: bool,
    ) -> Result<()> {
        self.only_owner(storage, caller)?;
        for asset in assets {
            if flag {
                storage.not_allowed.insert(*asset);
            } else {
                storage.not_allowed.remove(asset);
            }
        }
        Ok(())
    }

    fn transfer_ownership(
        &self,
        storage: &mut RegistryStorage,
        caller: Address,
        new_owner: Address,
    ) -> Result<()> {
        self.only_owner(storage, caller)?;
        if new_owner == Address::ZERO {
            return Err(Error::AccessDenied(
                "Ownable: new owner is the zero address".to_string(),
            ));
        }
        storage.owner = new_owner;
        Ok(())
    }

    /// Functions this implementation does not know about
    fn fallback(&self, _storage: &mut RegistryStorage, _caller: Address, data: &[u8]) -> Result<Bytes> {
        Err(Error::InvalidPayload(format!(
            "function selector 0x{} was not recognized",
            alloy::hex::encode(data.get(..4).unwrap_or(data))
        )))
    }
}

/// First registry release
#[derive(Debug, Default)]
pub struct RegistryV1;

impl RegistryLogic for RegistryV1 {
    fn version(&self) -> &'static str {
        "1"
    }
}
