//! Wallet storage and implementation code

use crate::config::FEE_DENOMINATOR;
use crate::proxy::StorageLayout;
use crate::{Error, Result};
use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Field order of [`WalletStorage`]; `nonce` was appended for meta-transactions
pub const WALLET_LAYOUT_V1: StorageLayout =
    StorageLayout(&["initialized", "registry", "owner", "delegates", "nonce"]);

/// State kept by one wallet proxy across implementation changes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletStorage {
    pub initialized: bool,
    pub registry: Address,
    pub owner: Address,
    pub delegates: HashSet<Address>,
    /// Meta-transaction replay counter
    pub nonce: u64,
}

/// Wallet implementation shared by every wallet proxy
pub trait WalletLogic: Send + Sync {
    fn version(&self) -> &'static str;

    fn layout(&self) -> StorageLayout {
        WALLET_LAYOUT_V1
    }

    fn initialize(&self, storage: &mut WalletStorage, registry: Address, owner: Address) -> Result<()> {
        if storage.initialized {
            return Err(Error::AlreadyInitialized);
        }
        storage.initialized = true;
        storage.registry = registry;
        storage.owner = owner;
        Ok(())
    }

    /// Owner or delegate
    fn authorize(&self, storage: &WalletStorage, caller: Address) -> Result<()> {
        if caller == storage.owner || storage.delegates.contains(&caller) {
            Ok(())
        } else {
            Err(Error::AccessDenied(format!(
                "{} is neither owner nor delegate",
                caller
            )))
        }
    }

    fn only_owner(&self, storage: &WalletStorage, caller: Address) -> Result<()> {
        if caller != storage.owner {
            return Err(Error::AccessDenied("ONLY-OWNER".to_string()));
        }
        Ok(())
    }

    fn add_delegate(&self, storage: &mut WalletStorage, caller: Address, delegate: Address) -> Result<()> {
        self.only_owner(storage, caller)?;
        storage.delegates.insert(delegate);
        Ok(())
    }

    fn remove_delegate(
        &self,
        storage: &mut WalletStorage,
        caller: Address,
        delegate: Address,
    ) -> Result<()> {
        self.only_owner(storage, caller)?;
        storage.delegates.remove(&delegate);
        Ok(())
    }

    /// Part of a realized `amount` withheld for the fee recipient,
    /// `floor(amount * bps / FEE_DENOMINATOR)` without a wide intermediate
    ///
    /// `bps` is below the denominator, so neither product can overflow.
    fn fee_amount(&self, amount: U256, bps: u64) -> U256 {
        let denominator = U256::from(FEE_DENOMINATOR);
        let bps = U256::from(bps);
        let (whole, rest) = amount.div_rem(denominator);
        whole * bps + rest * bps / denominator
    }

    /// Meta-transaction digest: `keccak256(chain_id ‖ wallet ‖ nonce ‖ payload)`
    fn digest(&self, chain_id: u64, wallet: Address, nonce: u64, payload: &[u8]) -> B256 {
        let mut preimage = Vec::with_capacity(32 + 20 + 32 + payload.len());
        preimage.extend_from_slice(&U256::from(chain_id).to_be_bytes::<32>());
        preimage.extend_from_slice(wallet.as_slice());
        preimage.extend_from_slice(&U256::from(nonce).to_be_bytes::<32>());
        preimage.extend_from_slice(payload);
        keccak256(preimage)
    }

    /// Functions this implementation does not know about
    fn fallback(&self, _storage: &mut WalletStorage, _caller: Address, data: &[u8]) -> Result<Bytes> {
        Err(Error::InvalidPayload(format!(
            "function selector 0x{} was not recognized",
            alloy::hex::encode(data.get(..4).unwrap_or(data))
        )))
    }
}

/// First wallet release
#[derive(Debug, Default)]
pub struct WalletV1;

impl WalletLogic for WalletV1 {
    fn version(&self) -> &'static str {
        "1"
    }
}
