//! Wallet registry
//!
//! Central directory behind an upgradeable proxy. It maps owners to their
//! wallets, decides which logic modules wallets may call, holds the fee
//! configuration and the wallet implementation every wallet runs.

mod logic;

pub use logic::{RegistryInit, RegistryLogic, RegistryStorage, RegistryV1, REGISTRY_LAYOUT_V1};

use crate::config::GasTokenConfig;
use crate::environment::Environment;
use crate::events::{EventRecord, EventSink, WalletEvent};
use crate::proxy::{Proxy, ProxyAdmin, StorageLayout};
use crate::wallet::{Wallet, WalletHooks, WalletLogic, WalletStorage};
use crate::{Error, Result};
use alloy::primitives::{Address, Bytes};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard};
use tracing::{info, warn};
use uuid::Uuid;

struct RegistryInner {
    address: Address,
    admin: Address,
    implementation: RwLock<Address>,
    storage: RwLock<RegistryStorage>,
    /// wallet address -> wallet storage
    wallets: RwLock<HashMap<Address, Arc<Mutex<WalletStorage>>>>,
    env: Environment,
    events: Arc<dyn EventSink>,
    gas_token: GasTokenConfig,
}

/// Handle on the registry proxy
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    /// Deploy a registry proxy administered by `admin`, pointing at
    /// `implementation`, and initialize it
    pub async fn deploy(
        env: &Environment,
        admin: &ProxyAdmin,
        implementation: Address,
        init: RegistryInit,
        gas_token: GasTokenConfig,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        if env.registry_logic_at(implementation).await.is_none() {
            return Err(Error::InvalidImplementation(implementation));
        }
        if env.wallet_logic_at(init.wallet_implementation).await.is_none() {
            return Err(Error::InvalidImplementation(init.wallet_implementation));
        }

        let address = env.next_address(admin.address());
        env.lock().await.register_contract(address);

        let registry = Self {
            inner: Arc::new(RegistryInner {
                address,
                admin: admin.address(),
                implementation: RwLock::new(implementation),
                storage: RwLock::new(RegistryStorage::default()),
                wallets: RwLock::new(HashMap::new()),
                env: env.clone(),
                events,
                gas_token,
            }),
        };
        registry.initialize(init).await?;

        info!(
            registry = %address,
            implementation = %implementation,
            owner = %init.owner,
            fee_bps = init.fee_bps,
            "Deployed registry"
        );
        Ok(registry)
    }

    pub fn address(&self) -> Address {
        self.inner.address
    }

    /// Code the proxy currently forwards to
    async fn logic(&self) -> Result<Arc<dyn RegistryLogic>> {
        let implementation = *self.inner.implementation.read().await;
        self.inner
            .env
            .registry_logic_at(implementation)
            .await
            .ok_or(Error::InvalidImplementation(implementation))
    }

    pub async fn initialize(&self, init: RegistryInit) -> Result<()> {
        let logic = self.logic().await?;
        let mut storage = self.inner.storage.write().await;
        logic.initialize(&mut storage, init)
    }

    /// Run an owner-gated storage mutation through the current implementation
    async fn admin_call<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&dyn RegistryLogic, &mut RegistryStorage) -> Result<()>,
    {
        let logic = self.logic().await?;
        let mut storage = self.inner.storage.write().await;
        f(logic.as_ref(), &mut storage)
    }

    async fn view<R>(&self, f: impl FnOnce(&RegistryStorage) -> R) -> R {
        f(&*self.inner.storage.read().await)
    }

    /// Create the caller's wallet, or return the one it already has
    pub async fn deploy_wallet(&self, caller: Address) -> Result<Address> {
        let logic = self.logic().await?;
        let mut storage = self.inner.storage.write().await;
        if let Some(existing) = storage.wallets.get(&caller) {
            return Ok(*existing);
        }

        let implementation = storage.wallet_implementation;
        let wallet_logic = self
            .inner
            .env
            .wallet_logic_at(implementation)
            .await
            .ok_or(Error::InvalidImplementation(implementation))?;

        let address = self.inner.env.next_address(self.inner.address);
        let mut wallet_storage = WalletStorage::default();
        wallet_logic.initialize(&mut wallet_storage, self.inner.address, caller)?;
        logic.record_wallet(&mut storage, caller, address);
        self.inner
            .wallets
            .write()
            .await
            .insert(address, Arc::new(Mutex::new(wallet_storage)));
        self.inner
            .env
            .lock()
            .await
            .set_receiver(address, Arc::new(WalletHooks::new(address)));
        drop(storage);

        info!(owner = %caller, wallet = %address, "Deployed wallet");
        self.publish(
            self.inner.address,
            None,
            vec![WalletEvent::WalletCreated {
                owner: caller,
                wallet: address,
            }],
        )
        .await;
        Ok(address)
    }

    /// Wallet of `owner`, if it has one
    pub async fn wallet(&self, owner: Address) -> Option<Wallet> {
        let address = self.view(|s| s.wallets.get(&owner).copied()).await?;
        self.wallet_at(address).await
    }

    pub async fn wallet_at(&self, address: Address) -> Option<Wallet> {
        let storage = self.inner.wallets.read().await.get(&address).cloned()?;
        Some(Wallet::new(address, storage, self.clone()))
    }

    pub async fn enable_logic(&self, caller: Address, module: Address) -> Result<()> {
        self.admin_call(|logic, storage| logic.enable_logic(storage, caller, module))
            .await?;
        info!(module = %module, "Enabled logic module");
        Ok(())
    }

    pub async fn enable_logic_multiple(&self, caller: Address, modules: &[Address]) -> Result<()> {
        self.admin_call(|logic, storage| logic.enable_logic_multiple(storage, caller, modules))
            .await?;
        info!(modules = ?modules, "Enabled logic modules");
        Ok(())
    }

    pub async fn disable_logic(&self, caller: Address, module: Address) -> Result<()> {
        self.admin_call(|logic, storage| logic.disable_logic(storage, caller, module))
            .await?;
        info!(module = %module, "Disabled logic module");
        Ok(())
    }

    /// Point every wallet at new code
    pub async fn set_implementation(&self, caller: Address, implementation: Address) -> Result<()> {
        let new_logic = self
            .inner
            .env
            .wallet_logic_at(implementation)
            .await
            .ok_or(Error::InvalidImplementation(implementation))?;
        let current = self.implementation().await;

        self.admin_call(|logic, storage| logic.set_implementation(storage, caller, implementation))
            .await?;

        if let Some(old_logic) = self.inner.env.wallet_logic_at(current).await {
            if !old_logic.layout().is_compatible_successor(&new_logic.layout()) {
                warn!(
                    old = ?old_logic.layout().fields(),
                    new = ?new_logic.layout().fields(),
                    "Wallet implementation changes existing storage layout"
                );
            }
        }
        info!(
            from = %current,
            to = %implementation,
            version = new_logic.version(),
            "Set wallet implementation"
        );
        Ok(())
    }

    pub async fn set_fee(&self, caller: Address, recipient: Address, bps: u64) -> Result<()> {
        self.admin_call(|logic, storage| logic.set_fee(storage, caller, recipient, bps))
            .await?;
        info!(recipient = %recipient, bps, "Set fee");
        Ok(())
    }

    pub async fn set_not_allowed(&self, caller: Address, assets: &[Address], flag: bool) -> Result<()> {
        self.admin_call(|logic, storage| logic.set_not_allowed(storage, caller, assets, flag))
            .await?;
        info!(assets = ?assets, not_allowed = flag, "Updated not-allowed assets");
        Ok(())
    }

    pub async fn transfer_ownership(&self, caller: Address, new_owner: Address) -> Result<()> {
        self.admin_call(|logic, storage| logic.transfer_ownership(storage, caller, new_owner))
            .await?;
        info!(owner = %new_owner, "Registry ownership transferred");
        Ok(())
    }

    /// Route a call the registry has no named method for to its implementation
    pub async fn call(&self, caller: Address, data: &[u8]) -> Result<Bytes> {
        let logic = self.logic().await?;
        let mut storage = self.inner.storage.write().await;
        logic.fallback(&mut storage, caller, data)
    }

    /// Wallet of `owner`, zero when it has none
    pub async fn wallets(&self, owner: Address) -> Address {
        self.view(|s| s.wallets.get(&owner).copied().unwrap_or(Address::ZERO))
            .await
    }

    pub async fn not_allowed(&self, asset: Address) -> bool {
        self.view(|s| s.not_allowed.contains(&asset)).await
    }

    /// Whether `module` is currently enabled
    pub async fn logic_proxies(&self, module: Address) -> bool {
        self.view(|s| s.enabled_modules.contains(&module)).await
    }

    pub async fn fee_recipient(&self) -> Address {
        self.view(|s| s.fee_recipient).await
    }

    pub async fn fee_bps(&self) -> u64 {
        self.view(|s| s.fee_bps).await
    }

    /// Current wallet implementation
    pub async fn implementation(&self) -> Address {
        self.view(|s| s.wallet_implementation).await
    }

    pub async fn owner(&self) -> Address {
        self.view(|s| s.owner).await
    }

    pub(crate) async fn storage(&self) -> RwLockReadGuard<'_, RegistryStorage> {
        self.inner.storage.read().await
    }

    /// Wallet code resolved from the current implementation pointer
    pub(crate) async fn wallet_logic(&self, storage: &RegistryStorage) -> Result<Arc<dyn WalletLogic>> {
        let implementation = storage.wallet_implementation;
        self.inner
            .env
            .wallet_logic_at(implementation)
            .await
            .ok_or(Error::InvalidImplementation(implementation))
    }

    pub fn env(&self) -> &Environment {
        &self.inner.env
    }

    pub fn gas_token(&self) -> &GasTokenConfig {
        &self.inner.gas_token
    }

    pub(crate) async fn publish(
        &self,
        emitter: Address,
        batch_id: Option<Uuid>,
        events: Vec<WalletEvent>,
    ) {
        if events.is_empty() {
            return;
        }
        let records: Vec<EventRecord> = events
            .into_iter()
            .map(|event| EventRecord::new(emitter, batch_id, event))
            .collect();
        self.inner.events.publish(&records).await;
    }
}

#[async_trait]
impl Proxy for Registry {
    fn address(&self) -> Address {
        self.inner.address
    }

    fn proxy_admin(&self) -> Address {
        self.inner.admin
    }

    async fn proxy_implementation(&self) -> Address {
        *self.inner.implementation.read().await
    }

    async fn layout_of(&self, implementation: Address) -> Option<StorageLayout> {
        self.inner
            .env
            .registry_logic_at(implementation)
            .await
            .map(|logic| logic.layout())
    }

    async fn upgrade_to(&self, caller: Address, implementation: Address) -> Result<()> {
        if caller != self.inner.admin {
            return Err(Error::AccessDenied(
                "only the proxy admin can upgrade".to_string(),
            ));
        }
        if self.inner.env.registry_logic_at(implementation).await.is_none() {
            return Err(Error::InvalidImplementation(implementation));
        }
        *self.inner.implementation.write().await = implementation;
        Ok(())
    }
}
