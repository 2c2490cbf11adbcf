//! Shared test fixture: a deployed registry with every module enabled,
//! lending markets listed and an ETH/DAI pool seeded

use crate::config::GasTokenConfig;
use crate::environment::{Code, Environment};
use crate::events::MemoryEventLog;
use crate::modules::{LendingModule, SwapModule, TransferModule};
use crate::protocols::Market;
use crate::proxy::ProxyAdmin;
use crate::registry::{Registry, RegistryInit, RegistryV1};
use crate::tokens::addresses::{CDAI, CETH, CUSDC, DAI, NATIVE_ETH, USDC};
use crate::wallet::{Wallet, WalletV1};
use alloy::primitives::{address, Address, U256};
use std::sync::Arc;

pub const DEPLOYER: Address = address!("00000000000000000000000000000000000de910");
pub const MULTISIG: Address = address!("9fd332a4e9c7f2f0dba90745c1324cc170d16fe4");
pub const USER: Address = address!("dd79dc5b781b14ff091686961adc5d47e434f4b0");
pub const RANDOM: Address = address!("000000000000000000000000000000000000beef");
pub const LIQUIDITY_PROVIDER: Address = address!("0000000000000000000000000000000000001111");

pub fn e18(n: u64) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(18))
}

pub struct Fixture {
    pub env: Environment,
    pub admin: ProxyAdmin,
    pub registry: Registry,
    pub events: Arc<MemoryEventLog>,
    pub deployer: Address,
    pub registry_v1: Address,
    pub wallet_v1: Address,
    pub transfer: Address,
    pub lending: Address,
    pub swap: Address,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_gas_token(GasTokenConfig::default()).await
    }

    pub async fn with_gas_token(gas_token: GasTokenConfig) -> Self {
        let env = Environment::new(1);
        let events = Arc::new(MemoryEventLog::new());

        let transfer = env.deploy_module(DEPLOYER, Arc::new(TransferModule)).await;
        let lending = env.deploy_module(DEPLOYER, Arc::new(LendingModule)).await;
        let swap = env.deploy_module(DEPLOYER, Arc::new(SwapModule)).await;
        let wallet_v1 = env.deploy(DEPLOYER, Code::Wallet(Arc::new(WalletV1))).await;
        let registry_v1 = env
            .deploy(DEPLOYER, Code::Registry(Arc::new(RegistryV1)))
            .await;

        let admin = ProxyAdmin::deploy(&env, DEPLOYER).await;
        let registry = Registry::deploy(
            &env,
            &admin,
            registry_v1,
            RegistryInit {
                wallet_implementation: wallet_v1,
                owner: MULTISIG,
                fee_recipient: MULTISIG,
                fee_bps: 1_000,
            },
            gas_token,
            events.clone(),
        )
        .await
        .unwrap();
        registry
            .enable_logic_multiple(MULTISIG, &[transfer, lending, swap])
            .await
            .unwrap();

        {
            let mut world = env.lock().await;
            world.lending.list(Market::new(DAI, CDAI, 7_500));
            world.lending.list(Market::new(USDC, CUSDC, 8_000));
            world.lending.list(Market::new(NATIVE_ETH, CETH, 7_500));
            world.amm.create_pool(NATIVE_ETH, DAI);

            world.ledger.mint(NATIVE_ETH, LIQUIDITY_PROVIDER, e18(100)).unwrap();
            world.ledger.mint(DAI, LIQUIDITY_PROVIDER, e18(350_000)).unwrap();
            let crate::environment::World { ledger, amm, .. } = &mut *world;
            amm.add_liquidity(
                ledger,
                LIQUIDITY_PROVIDER,
                NATIVE_ETH,
                DAI,
                e18(100),
                e18(350_000),
            )
            .unwrap();
        }

        Self {
            env,
            admin,
            registry,
            events,
            deployer: DEPLOYER,
            registry_v1,
            wallet_v1,
            transfer,
            lending,
            swap,
        }
    }

    /// Deploy (or fetch) the wallet of `owner`
    pub async fn wallet_of(&self, owner: Address) -> Wallet {
        let address = self.registry.deploy_wallet(owner).await.unwrap();
        self.registry.wallet_at(address).await.unwrap()
    }
}
