//! Smart wallet CLI
//!
//! Command-line interface for meta-transaction tooling and an in-memory demo.

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::SolCall;
use clap::{Parser, Subcommand};
use smart_wallet_registry::environment::Code;
use smart_wallet_registry::events::{EventSink, FanoutSink, JsonlEventLog, MemoryEventLog};
use smart_wallet_registry::modules::{
    ILendingModule, ISwapModule, ITransferModule, LendingModule, SwapModule, TransferModule,
};
use smart_wallet_registry::protocols::Market;
use smart_wallet_registry::registry::RegistryV1;
use smart_wallet_registry::signer::AccountSigner;
use smart_wallet_registry::tokens::{self, addresses::*};
use smart_wallet_registry::wallet::{IWallet, WalletLogic, WalletV1};
use smart_wallet_registry::{
    Config, Environment, Error, ProxyAdmin, Registry, RegistryInit, Result, PRIVATE_KEY_ENV,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "smart-wallet")]
#[command(about = "Smart wallet registry tooling")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show current configuration
    Config,

    /// Compute the meta-transaction digest of an execute payload
    Hash {
        /// Wallet the payload is meant for
        #[arg(long)]
        wallet: Address,

        /// Current wallet nonce
        #[arg(long, default_value_t = 0)]
        nonce: u64,

        /// ABI-encoded execute call (hex)
        #[arg(long)]
        payload: Bytes,
    },

    /// Sign a digest with the key in PRIVATE_KEY
    Sign {
        /// 32-byte digest (hex)
        #[arg(long)]
        digest: B256,
    },

    /// Deploy everything in memory and run a few batches
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let subscriber = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber.with(fmt::layer()).init();
    }

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Hash {
            wallet,
            nonce,
            payload,
        } => {
            let digest = WalletV1.digest(config.chain_id(), wallet, nonce, &payload);
            println!("{}", digest);
        }
        Commands::Sign { digest } => {
            let signer = AccountSigner::from_env(PRIVATE_KEY_ENV)?;
            let signature = signer.sign_digest(digest)?;
            tracing::info!(signer = %signer.address(), "Signed digest");
            println!("{}", Bytes::from(signature.as_bytes()));
        }
        Commands::Demo => {
            run_demo(config).await?;
        }
    }

    Ok(())
}

fn e18(n: u64) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(18))
}

async fn run_demo(config: Config) -> Result<()> {
    let env = Environment::new(config.chain_id());
    let memory = Arc::new(MemoryEventLog::new());
    let mut sinks: Vec<Arc<dyn EventSink>> = vec![memory.clone()];
    if let Some(path) = &config.event_log_path {
        sinks.push(Arc::new(JsonlEventLog::new(path)));
    }
    let events = Arc::new(FanoutSink::new(sinks));

    let deployer = Address::repeat_byte(0xde);
    let liquidity_provider = Address::repeat_byte(0x11);
    let owner = match AccountSigner::from_env(PRIVATE_KEY_ENV) {
        Ok(signer) => {
            tracing::info!(address = %signer.address(), "Loaded owner from PRIVATE_KEY");
            signer
        }
        Err(_) => {
            tracing::warn!("No PRIVATE_KEY set - using a throwaway owner key");
            AccountSigner::random()
        }
    };

    let transfer = env.deploy_module(deployer, Arc::new(TransferModule)).await;
    let lending = env.deploy_module(deployer, Arc::new(LendingModule)).await;
    let swap = env.deploy_module(deployer, Arc::new(SwapModule)).await;
    let wallet_v1 = env.deploy(deployer, Code::Wallet(Arc::new(WalletV1))).await;
    let registry_v1 = env
        .deploy(deployer, Code::Registry(Arc::new(RegistryV1)))
        .await;

    let admin = ProxyAdmin::deploy(&env, deployer).await;
    let registry = Registry::deploy(
        &env,
        &admin,
        registry_v1,
        RegistryInit {
            wallet_implementation: wallet_v1,
            owner: deployer,
            fee_recipient: config.fee.recipient.unwrap_or(deployer),
            fee_bps: config.fee.bps,
        },
        config.gas_token.clone(),
        events,
    )
    .await?;
    registry
        .enable_logic_multiple(deployer, &[transfer, lending, swap])
        .await?;
    registry
        .set_not_allowed(deployer, &tokens::registry().receipt_tokens(), true)
        .await?;

    {
        let mut world = env.lock().await;
        world.lending.list(Market::new(DAI, CDAI, 7_500));
        world.lending.list(Market::new(USDC, CUSDC, 8_000));
        world.amm.create_pool(NATIVE_ETH, DAI);
        world.ledger.mint(NATIVE_ETH, liquidity_provider, e18(100))?;
        world.ledger.mint(DAI, liquidity_provider, e18(350_000))?;
        let smart_wallet_registry::environment::World { ledger, amm, .. } = &mut *world;
        amm.add_liquidity(
            ledger,
            liquidity_provider,
            NATIVE_ETH,
            DAI,
            e18(100),
            e18(350_000),
        )?;
    }

    env.fund(DAI, owner.address(), e18(500)).await?;
    env.fund(NATIVE_ETH, owner.address(), e18(1)).await?;
    env.fund(CHI, owner.address(), U256::from(100)).await?;

    let address = registry.deploy_wallet(owner.address()).await?;
    let wallet = registry
        .wallet_at(address)
        .await
        .ok_or_else(|| Error::ExternalCallFailed(format!("no wallet at {}", address)))?;

    // Deposit and supply in one batch
    let receipt = wallet
        .execute(
            owner.address(),
            U256::ZERO,
            &[transfer, lending],
            &[
                ITransferModule::depositCall {
                    erc20: DAI,
                    amount: e18(500),
                }
                .abi_encode()
                .into(),
                ILendingModule::mintCTokenCall {
                    erc20: DAI,
                    cErc20: CDAI,
                    tokenAmt: e18(50),
                }
                .abi_encode()
                .into(),
            ],
            false,
        )
        .await?;
    tracing::info!(batch_id = %receipt.batch_id, events = receipt.events.len(), "Deposited and supplied");

    // Redeem through a relayer
    let payload = IWallet::executeCall {
        targets: vec![lending],
        datas: vec![ILendingModule::redeemUnderlyingCall {
            erc20: DAI,
            cErc20: CDAI,
            tokenAmt: e18(50),
        }
        .abi_encode()
        .into()],
        burnGasToken: true,
    }
    .abi_encode();
    let signature = owner.sign_digest(wallet.get_hash(&payload).await?)?;
    let receipt = wallet
        .execute_meta_transaction(deployer, &signature.as_bytes(), &payload)
        .await?;
    tracing::info!(batch_id = %receipt.batch_id, fees = ?receipt.fees, "Relayed redeem");

    // Swap half of the attached ETH
    let half = e18(1) / U256::from(2);
    let receipt = wallet
        .execute(
            owner.address(),
            e18(1),
            &[swap],
            &[ISwapModule::swapV2Call {
                fromToken: NATIVE_ETH,
                destToken: DAI,
                amount: half,
            }
            .abi_encode()
            .into()],
            false,
        )
        .await?;
    tracing::info!(batch_id = %receipt.batch_id, "Swapped");

    let registry_tokens = tokens::registry();
    for asset in [DAI, CDAI, NATIVE_ETH] {
        println!(
            "{:>6}: {}",
            registry_tokens.symbol(&asset),
            wallet.balance_of(asset).await
        );
    }
    println!("events: {}", memory.records().await.len());

    Ok(())
}
