//! In-process execution environment
//!
//! Stands in for the chain: a [`World`] holding the journaled ledger and the
//! simulated external protocols, plus a code table mapping deployed addresses
//! to the code living there.

use crate::ledger::Ledger;
use crate::modules::LogicModule;
use crate::protocols::amm::AmmPools;
use crate::protocols::lending::LendingMarkets;
use crate::registry::RegistryLogic;
use crate::tokens::addresses::NATIVE_ETH;
use crate::wallet::WalletLogic;
use crate::{Error, Result};
use alloy::primitives::{Address, FixedBytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};

sol! {
    interface IERC721Receiver {
        function onERC721Received(address operator, address from, uint256 tokenId, bytes data) external returns (bytes4);
    }

    interface IERC1155Receiver {
        function onERC1155Received(address operator, address from, uint256 id, uint256 value, bytes data) external returns (bytes4);
        function onERC1155BatchReceived(address operator, address from, uint256[] ids, uint256[] values, bytes data) external returns (bytes4);
    }
}

pub const ERC721_RECEIVED: FixedBytes<4> =
    FixedBytes(IERC721Receiver::onERC721ReceivedCall::SELECTOR);
pub const ERC1155_RECEIVED: FixedBytes<4> =
    FixedBytes(IERC1155Receiver::onERC1155ReceivedCall::SELECTOR);
pub const ERC1155_BATCH_RECEIVED: FixedBytes<4> =
    FixedBytes(IERC1155Receiver::onERC1155BatchReceivedCall::SELECTOR);

/// Acceptance hooks a contract exposes to receive non-fungible assets
pub trait TokenReceiver: Send + Sync {
    fn on_erc721_received(
        &self,
        operator: Address,
        from: Address,
        token_id: U256,
        data: &[u8],
    ) -> FixedBytes<4>;

    fn on_erc1155_received(
        &self,
        operator: Address,
        from: Address,
        id: U256,
        value: U256,
        data: &[u8],
    ) -> FixedBytes<4>;

    fn on_erc1155_batch_received(
        &self,
        operator: Address,
        from: Address,
        ids: &[U256],
        values: &[U256],
        data: &[u8],
    ) -> FixedBytes<4>;
}

/// Code deployed at an address
#[derive(Clone)]
pub enum Code {
    Module(Arc<dyn LogicModule>),
    Wallet(Arc<dyn WalletLogic>),
    Registry(Arc<dyn RegistryLogic>),
}

impl Code {
    pub fn kind(&self) -> &'static str {
        match self {
            Code::Module(_) => "module",
            Code::Wallet(_) => "wallet",
            Code::Registry(_) => "registry",
        }
    }
}

/// Mutable state shared by every contract
#[derive(Default)]
pub struct World {
    pub ledger: Ledger,
    pub lending: LendingMarkets,
    pub amm: AmmPools,
    contracts: HashSet<Address>,
    receivers: HashMap<Address, Arc<dyn TokenReceiver>>,
}

impl World {
    pub fn register_contract(&mut self, address: Address) {
        self.contracts.insert(address);
    }

    pub fn is_contract(&self, address: Address) -> bool {
        self.contracts.contains(&address)
    }

    pub fn set_receiver(&mut self, address: Address, receiver: Arc<dyn TokenReceiver>) {
        self.register_contract(address);
        self.receivers.insert(address, receiver);
    }

    /// Move an NFT, asking contract recipients to accept it first
    pub fn safe_transfer_nft(
        &mut self,
        collection: Address,
        from: Address,
        to: Address,
        token_id: U256,
    ) -> Result<()> {
        if self.is_contract(to) {
            let accepted = self
                .receivers
                .get(&to)
                .map(|r| r.on_erc721_received(from, from, token_id, &[]) == ERC721_RECEIVED)
                .unwrap_or(false);
            if !accepted {
                return Err(Error::ExternalCallFailed(
                    "ERC721: transfer to non ERC721Receiver implementer".to_string(),
                ));
            }
        }
        self.ledger.transfer_nft(collection, from, to, token_id)
    }

    /// Move a semi-fungible balance, asking contract recipients to accept it first
    pub fn safe_transfer_multi(
        &mut self,
        collection: Address,
        from: Address,
        to: Address,
        id: U256,
        amount: U256,
    ) -> Result<()> {
        if self.is_contract(to) {
            let accepted = self
                .receivers
                .get(&to)
                .map(|r| r.on_erc1155_received(from, from, id, amount, &[]) == ERC1155_RECEIVED)
                .unwrap_or(false);
            if !accepted {
                return Err(Error::ExternalCallFailed(
                    "ERC1155: transfer to non ERC1155Receiver implementer".to_string(),
                ));
            }
        }
        self.ledger.transfer_multi(collection, from, to, id, amount)
    }

    pub fn safe_batch_transfer_multi(
        &mut self,
        collection: Address,
        from: Address,
        to: Address,
        ids: &[U256],
        amounts: &[U256],
    ) -> Result<()> {
        if ids.len() != amounts.len() {
            return Err(Error::InvalidPayload(
                "ERC1155: ids and amounts length mismatch".to_string(),
            ));
        }
        if self.is_contract(to) {
            let accepted = self
                .receivers
                .get(&to)
                .map(|r| {
                    r.on_erc1155_batch_received(from, from, ids, amounts, &[])
                        == ERC1155_BATCH_RECEIVED
                })
                .unwrap_or(false);
            if !accepted {
                return Err(Error::ExternalCallFailed(
                    "ERC1155: transfer to non ERC1155Receiver implementer".to_string(),
                ));
            }
        }
        let checkpoint = self.ledger.checkpoint();
        for (id, amount) in ids.iter().zip(amounts) {
            if let Err(e) = self.ledger.transfer_multi(collection, from, to, *id, *amount) {
                self.ledger.revert_to(checkpoint);
                return Err(e);
            }
        }
        self.ledger.commit(checkpoint);
        Ok(())
    }
}

/// Shared handle on the world and the code table
#[derive(Clone)]
pub struct Environment {
    chain_id: u64,
    world: Arc<Mutex<World>>,
    code: Arc<RwLock<HashMap<Address, Code>>>,
    nonce: Arc<AtomicU64>,
}

impl Environment {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            world: Arc::new(Mutex::new(World::default())),
            code: Arc::new(RwLock::new(HashMap::new())),
            nonce: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Fresh contract address for `deployer`
    pub fn next_address(&self, deployer: Address) -> Address {
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        deployer.create(nonce)
    }

    /// Deploy `code` and return its address
    pub async fn deploy(&self, deployer: Address, code: Code) -> Address {
        let address = self.next_address(deployer);
        let kind = code.kind();
        self.code.write().await.insert(address, code);
        self.world.lock().await.register_contract(address);
        tracing::debug!(address = %address, kind, "Deployed code");
        address
    }

    pub async fn deploy_module(
        &self,
        deployer: Address,
        module: Arc<dyn LogicModule>,
    ) -> Address {
        let name = module.name();
        let address = self.deploy(deployer, Code::Module(module)).await;
        tracing::info!(module = name, address = %address, "Deployed logic module");
        address
    }

    pub async fn code_at(&self, address: Address) -> Option<Code> {
        self.code.read().await.get(&address).cloned()
    }

    pub async fn module_at(&self, address: Address) -> Option<Arc<dyn LogicModule>> {
        match self.code_at(address).await {
            Some(Code::Module(module)) => Some(module),
            _ => None,
        }
    }

    pub async fn wallet_logic_at(&self, address: Address) -> Option<Arc<dyn WalletLogic>> {
        match self.code_at(address).await {
            Some(Code::Wallet(logic)) => Some(logic),
            _ => None,
        }
    }

    pub async fn registry_logic_at(&self, address: Address) -> Option<Arc<dyn RegistryLogic>> {
        match self.code_at(address).await {
            Some(Code::Registry(logic)) => Some(logic),
            _ => None,
        }
    }

    /// Exclusive access to the world, held for the length of a batch
    pub async fn lock(&self) -> MutexGuard<'_, World> {
        self.world.lock().await
    }

    /// Mint `amount` of `asset` to `to`
    pub async fn fund(&self, asset: Address, to: Address, amount: U256) -> Result<()> {
        self.world.lock().await.ledger.mint(asset, to, amount)
    }

    pub async fn transfer(
        &self,
        asset: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<()> {
        self.world.lock().await.ledger.transfer(asset, from, to, amount)
    }

    pub async fn balance_of(&self, asset: Address, holder: Address) -> U256 {
        self.world.lock().await.ledger.balance_of(asset, holder)
    }

    pub async fn native_balance(&self, holder: Address) -> U256 {
        self.balance_of(NATIVE_ETH, holder).await
    }
}
