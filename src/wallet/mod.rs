//! Smart wallets
//!
//! One proxy per owner. A wallet custodies assets in the ledger, runs batches
//! of logic-module calls and withholds the protocol fee on realized inflows.
//! Its code is never stored on the wallet itself: every call resolves the
//! registry's current wallet implementation, so `set_implementation` takes
//! effect for all wallets at once.

mod dispatch;
mod hooks;
mod logic;
mod metatx;

pub use dispatch::{ExecutionReceipt, FeeCharge};
pub use hooks::WalletHooks;
pub use logic::{WalletLogic, WalletStorage, WalletV1, WALLET_LAYOUT_V1};
pub use metatx::IWallet;

use crate::events::WalletEvent;
use crate::registry::Registry;
use crate::Result;
use alloy::primitives::{Address, Bytes, U256};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Handle on one wallet proxy
#[derive(Clone)]
pub struct Wallet {
    address: Address,
    storage: Arc<Mutex<WalletStorage>>,
    registry: Registry,
}

impl Wallet {
    pub(crate) fn new(address: Address, storage: Arc<Mutex<WalletStorage>>, registry: Registry) -> Self {
        Self {
            address,
            storage,
            registry,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    async fn logic(&self) -> Result<Arc<dyn WalletLogic>> {
        let registry_state = self.registry.storage().await;
        self.registry.wallet_logic(&registry_state).await
    }

    pub async fn owner(&self) -> Address {
        self.storage.lock().await.owner
    }

    pub async fn nonce(&self) -> u64 {
        self.storage.lock().await.nonce
    }

    pub async fn is_delegate(&self, account: Address) -> bool {
        self.storage.lock().await.delegates.contains(&account)
    }

    /// Snapshot of the proxy's storage
    pub async fn storage(&self) -> WalletStorage {
        self.storage.lock().await.clone()
    }

    pub async fn initialize(&self, registry: Address, owner: Address) -> Result<()> {
        let mut storage = self.storage.lock().await;
        let logic = self.logic().await?;
        logic.initialize(&mut storage, registry, owner)
    }

    pub async fn add_delegate(&self, caller: Address, delegate: Address) -> Result<()> {
        let mut storage = self.storage.lock().await;
        let logic = self.logic().await?;
        logic.add_delegate(&mut storage, caller, delegate)?;
        drop(storage);

        tracing::info!(wallet = %self.address, delegate = %delegate, "Added delegate");
        self.registry
            .publish(self.address, None, vec![WalletEvent::DelegateAdded { delegate }])
            .await;
        Ok(())
    }

    pub async fn remove_delegate(&self, caller: Address, delegate: Address) -> Result<()> {
        let mut storage = self.storage.lock().await;
        let logic = self.logic().await?;
        logic.remove_delegate(&mut storage, caller, delegate)?;
        drop(storage);

        tracing::info!(wallet = %self.address, delegate = %delegate, "Removed delegate");
        self.registry
            .publish(self.address, None, vec![WalletEvent::DelegateRemoved { delegate }])
            .await;
        Ok(())
    }

    /// Route a call the wallet has no named method for to its implementation
    pub async fn call(&self, caller: Address, data: &[u8]) -> Result<Bytes> {
        let mut storage = self.storage.lock().await;
        let logic = self.logic().await?;
        logic.fallback(&mut storage, caller, data)
    }

    pub async fn balance_of(&self, asset: Address) -> U256 {
        self.registry.env().balance_of(asset, self.address).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Code;
    use crate::testing::{Fixture, MULTISIG, RANDOM, USER};
    use crate::Error;
    use alloy::sol;
    use alloy::sol_types::{SolCall, SolValue};

    sol! {
        interface IWalletV2 {
            function foo() external view returns (string);
        }
    }

    struct WalletMockV2;

    impl WalletLogic for WalletMockV2 {
        fn version(&self) -> &'static str {
            "2-mock"
        }

        fn fallback(&self, _storage: &mut WalletStorage, _caller: Address, data: &[u8]) -> Result<Bytes> {
            IWalletV2::fooCall::abi_decode(data)?;
            Ok("bar".to_string().abi_encode().into())
        }
    }

    #[tokio::test]
    async fn test_existing_wallet_runs_new_implementation() {
        let fx = Fixture::new().await;
        let wallet = fx.wallet_of(USER).await;
        let foo = IWalletV2::fooCall {}.abi_encode();

        assert!(wallet.call(USER, &foo).await.is_err());

        let v2 = fx
            .env
            .deploy(fx.deployer, Code::Wallet(Arc::new(WalletMockV2)))
            .await;
        fx.registry.set_implementation(MULTISIG, v2).await.unwrap();

        let out = wallet.call(USER, &foo).await.unwrap();
        assert_eq!(String::abi_decode(&out).unwrap(), "bar");
        // Storage untouched
        assert_eq!(wallet.owner().await, USER);
    }

    #[tokio::test]
    async fn test_delegate_management_emits_events() {
        let fx = Fixture::new().await;
        let wallet = fx.wallet_of(USER).await;

        let err = wallet.add_delegate(RANDOM, RANDOM).await.unwrap_err();
        assert!(matches!(err, Error::AccessDenied(ref m) if m == "ONLY-OWNER"));

        wallet.add_delegate(USER, RANDOM).await.unwrap();
        assert!(wallet.is_delegate(RANDOM).await);
        wallet.remove_delegate(USER, RANDOM).await.unwrap();
        assert!(!wallet.is_delegate(RANDOM).await);

        let events = fx.events.events_of(wallet.address()).await;
        assert_eq!(
            events,
            vec![
                WalletEvent::DelegateAdded { delegate: RANDOM },
                WalletEvent::DelegateRemoved { delegate: RANDOM },
            ]
        );
    }

    #[tokio::test]
    async fn test_wallet_initializes_once() {
        let fx = Fixture::new().await;
        let wallet = fx.wallet_of(USER).await;
        let err = wallet.initialize(fx.registry.address(), RANDOM).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyInitialized));
        assert_eq!(wallet.owner().await, USER);
    }
}
