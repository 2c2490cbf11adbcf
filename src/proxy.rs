//! Upgradeable proxies and their admin
//!
//! A proxy owns its storage and forwards every call to whatever code its
//! implementation pointer resolves to. [`ProxyAdmin`] holds the authority to
//! move that pointer.

use crate::environment::Environment;
use crate::{Error, Result};
use alloy::primitives::Address;
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Ordered storage fields of an implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageLayout(pub &'static [&'static str]);

impl StorageLayout {
    /// `next` keeps every field of `self` in place and only appends
    pub fn is_compatible_successor(&self, next: &StorageLayout) -> bool {
        next.0.len() >= self.0.len() && next.0.iter().zip(self.0).all(|(a, b)| a == b)
    }

    pub fn fields(&self) -> &'static [&'static str] {
        self.0
    }
}

/// Something whose implementation pointer a [`ProxyAdmin`] can move
#[async_trait]
pub trait Proxy: Send + Sync {
    fn address(&self) -> Address;

    fn proxy_admin(&self) -> Address;

    async fn proxy_implementation(&self) -> Address;

    /// Layout of the code at `implementation`, if it is code this proxy runs
    async fn layout_of(&self, implementation: Address) -> Option<StorageLayout>;

    /// Swap the implementation; only the admin contract may call this
    async fn upgrade_to(&self, caller: Address, implementation: Address) -> Result<()>;
}

/// Owner-gated upgrade authority
pub struct ProxyAdmin {
    address: Address,
    owner: RwLock<Address>,
    env: Environment,
}

impl ProxyAdmin {
    pub async fn deploy(env: &Environment, owner: Address) -> Self {
        let address = env.next_address(owner);
        tracing::info!(admin = %address, owner = %owner, "Deployed proxy admin");
        Self {
            address,
            owner: RwLock::new(owner),
            env: env.clone(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub async fn owner(&self) -> Address {
        *self.owner.read().await
    }

    pub async fn transfer_ownership(&self, caller: Address, new_owner: Address) -> Result<()> {
        let mut owner = self.owner.write().await;
        if caller != *owner {
            return Err(Error::AccessDenied(
                "Ownable: caller is not the owner".to_string(),
            ));
        }
        let previous = *owner;
        tracing::info!(
            admin = %self.address,
            from = %previous,
            to = %new_owner,
            "Proxy admin ownership transferred"
        );
        *owner = new_owner;
        Ok(())
    }

    pub async fn get_proxy_admin(&self, proxy: &dyn Proxy) -> Address {
        proxy.proxy_admin()
    }

    pub async fn get_proxy_implementation(&self, proxy: &dyn Proxy) -> Address {
        proxy.proxy_implementation().await
    }

    /// Point `proxy` at `implementation`
    ///
    /// The new code must be of the same kind as the current one. A layout that
    /// is not an append-only successor is logged but not refused.
    pub async fn upgrade(
        &self,
        caller: Address,
        proxy: &dyn Proxy,
        implementation: Address,
    ) -> Result<()> {
        if caller != self.owner().await {
            return Err(Error::AccessDenied(
                "Ownable: caller is not the owner".to_string(),
            ));
        }

        let current = proxy.proxy_implementation().await;
        let same_kind = match (
            self.env.code_at(current).await,
            self.env.code_at(implementation).await,
        ) {
            (Some(a), Some(b)) => a.kind() == b.kind(),
            _ => false,
        };
        if !same_kind {
            return Err(Error::InvalidImplementation(implementation));
        }

        if let (Some(old), Some(new)) = (
            proxy.layout_of(current).await,
            proxy.layout_of(implementation).await,
        ) {
            if !old.is_compatible_successor(&new) {
                tracing::warn!(
                    proxy = %proxy.address(),
                    old = ?old.fields(),
                    new = ?new.fields(),
                    "Upgrade changes existing storage layout"
                );
            }
        }

        proxy.upgrade_to(self.address, implementation).await?;
        tracing::info!(
            proxy = %proxy.address(),
            from = %current,
            to = %implementation,
            "Upgraded proxy"
        );
        Ok(())
    }
}
