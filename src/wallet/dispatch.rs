//! Batch execution
//!
//! A batch runs under one ledger checkpoint: the attached value, every step
//! and every fee either land together or not at all. Events are buffered and
//! published only once the checkpoint committed.

use super::{Wallet, WalletLogic, WalletStorage};
use crate::config::BurnPolicy;
use crate::environment::World;
use crate::events::WalletEvent;
use crate::modules::ModuleContext;
use crate::registry::RegistryStorage;
use crate::tokens::addresses::NATIVE_ETH;
use crate::{Error, Result};
use alloy::primitives::{Address, Bytes, U256};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Fee withheld from one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeeCharge {
    pub asset: Address,
    pub recipient: Address,
    pub amount: U256,
}

/// Result of a committed batch
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReceipt {
    pub batch_id: Uuid,
    /// Return data of each step, in order
    pub outputs: Vec<Bytes>,
    pub events: Vec<WalletEvent>,
    pub fees: Vec<FeeCharge>,
}

struct BatchOutput {
    outputs: Vec<Bytes>,
    events: Vec<WalletEvent>,
    fees: Vec<FeeCharge>,
}

impl Wallet {
    /// Run `payloads[i]` against module `targets[i]` in order
    ///
    /// `caller` must be the owner or a delegate. `value` of the native asset
    /// moves from the caller into the wallet as part of the batch.
    pub async fn execute(
        &self,
        caller: Address,
        value: U256,
        targets: &[Address],
        payloads: &[Bytes],
        burn_gas_token: bool,
    ) -> Result<ExecutionReceipt> {
        let mut storage = self.storage.lock().await;
        self.execute_locked(&mut storage, caller, value, targets, payloads, burn_gas_token)
            .await
    }

    /// Batch body; the caller holds the wallet's storage lock
    pub(super) async fn execute_locked(
        &self,
        storage: &mut WalletStorage,
        caller: Address,
        value: U256,
        targets: &[Address],
        payloads: &[Bytes],
        burn_gas_token: bool,
    ) -> Result<ExecutionReceipt> {
        let registry_state = self.registry.storage().await;
        let logic = self.registry.wallet_logic(&registry_state).await?;
        logic.authorize(storage, caller)?;
        if targets.len() != payloads.len() {
            return Err(Error::InvalidPayload(format!(
                "{} targets but {} payloads",
                targets.len(),
                payloads.len()
            )));
        }

        let batch_id = Uuid::new_v4();
        info!(
            wallet = %self.address,
            caller = %caller,
            batch_id = %batch_id,
            steps = targets.len(),
            "Executing batch"
        );

        let mut world = self.registry.env().lock().await;
        let checkpoint = world.ledger.checkpoint();
        let result = self
            .run_batch(
                &mut world,
                &registry_state,
                logic.as_ref(),
                storage.owner,
                caller,
                value,
                targets,
                payloads,
                burn_gas_token,
            )
            .await;

        match result {
            Ok(batch) => {
                world.ledger.commit(checkpoint);
                drop(world);
                drop(registry_state);
                info!(
                    wallet = %self.address,
                    batch_id = %batch_id,
                    fees = batch.fees.len(),
                    "Batch committed"
                );
                self.registry
                    .publish(self.address, Some(batch_id), batch.events.clone())
                    .await;
                Ok(ExecutionReceipt {
                    batch_id,
                    outputs: batch.outputs,
                    events: batch.events,
                    fees: batch.fees,
                })
            }
            Err(e) => {
                world.ledger.revert_to(checkpoint);
                warn!(
                    wallet = %self.address,
                    batch_id = %batch_id,
                    error = %e,
                    "Batch reverted"
                );
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_batch(
        &self,
        world: &mut World,
        registry_state: &RegistryStorage,
        logic: &dyn WalletLogic,
        owner: Address,
        caller: Address,
        value: U256,
        targets: &[Address],
        payloads: &[Bytes],
        burn_gas_token: bool,
    ) -> Result<BatchOutput> {
        if !value.is_zero() {
            world
                .ledger
                .transfer(NATIVE_ETH, caller, self.address, value)?;
        }

        let mut ctx = ModuleContext::new(
            self.address,
            owner,
            caller,
            value,
            &registry_state.not_allowed,
            &mut *world,
        );
        let mut outputs = Vec::with_capacity(targets.len());
        let mut fees = Vec::new();

        for (step, (target, payload)) in targets.iter().zip(payloads).enumerate() {
            if !registry_state.enabled_modules.contains(target) {
                return Err(Error::InvalidModule(*target));
            }
            let module = self
                .registry
                .env()
                .module_at(*target)
                .await
                .ok_or(Error::InvalidModule(*target))?;

            let outcome = module.call(&mut ctx, payload)?;
            debug!(
                wallet = %self.address,
                step,
                module = module.name(),
                "Step succeeded"
            );

            if let Some(realized) = outcome.realized {
                let amount = logic.fee_amount(realized.amount, registry_state.fee_bps);
                if !amount.is_zero() {
                    let recipient = registry_state.fee_recipient;
                    ctx.world
                        .ledger
                        .transfer(realized.asset, self.address, recipient, amount)?;
                    info!(
                        wallet = %self.address,
                        asset = %realized.asset,
                        recipient = %recipient,
                        amount = %amount,
                        "Fee charged"
                    );
                    ctx.emit(WalletEvent::FeeCharged {
                        asset: realized.asset,
                        recipient,
                        amount,
                    });
                    fees.push(FeeCharge {
                        asset: realized.asset,
                        recipient,
                        amount,
                    });
                }
            }
            outputs.push(outcome.output);
        }
        let events = ctx.into_events();

        if burn_gas_token {
            self.burn_gas_token(world, caller, targets.len())?;
        }

        Ok(BatchOutput {
            outputs,
            events,
            fees,
        })
    }

    fn burn_gas_token(&self, world: &mut World, from: Address, steps: usize) -> Result<()> {
        let config = self.registry.gas_token();
        let units = U256::from(config.units_for(steps));
        match config.policy {
            BurnPolicy::Atomic => {
                world.ledger.burn(config.token, from, units)?;
                info!(wallet = %self.address, from = %from, units = %units, "Burned gas token");
            }
            BurnPolicy::BestEffort => {
                let checkpoint = world.ledger.checkpoint();
                match world.ledger.burn(config.token, from, units) {
                    Ok(()) => {
                        world.ledger.commit(checkpoint);
                        info!(wallet = %self.address, from = %from, units = %units, "Burned gas token");
                    }
                    Err(e) => {
                        world.ledger.revert_to(checkpoint);
                        warn!(
                            wallet = %self.address,
                            from = %from,
                            error = %e,
                            "Gas token burn failed, keeping batch"
                        );
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GasTokenConfig;
    use crate::modules::{ILendingModule, ISwapModule, ITransferModule};
    use crate::testing::{e18, Fixture, MULTISIG, RANDOM, USER};
    use crate::tokens::addresses::{CDAI, CHI, DAI};
    use alloy::sol_types::SolCall;

    fn deposit(erc20: Address, amount: U256) -> Bytes {
        ITransferModule::depositCall { erc20, amount }
            .abi_encode()
            .into()
    }

    fn mint(amount: U256) -> Bytes {
        ILendingModule::mintCTokenCall {
            erc20: DAI,
            cErc20: CDAI,
            tokenAmt: amount,
        }
        .abi_encode()
        .into()
    }

    fn redeem(amount: U256) -> Bytes {
        ILendingModule::redeemUnderlyingCall {
            erc20: DAI,
            cErc20: CDAI,
            tokenAmt: amount,
        }
        .abi_encode()
        .into()
    }

    #[tokio::test]
    async fn test_deposit_credits_exact_amount() {
        let fx = Fixture::new().await;
        let wallet = fx.wallet_of(USER).await;
        fx.env.fund(DAI, USER, e18(500)).await.unwrap();

        let receipt = wallet
            .execute(USER, U256::ZERO, &[fx.transfer], &[deposit(DAI, e18(500))], false)
            .await
            .unwrap();

        assert_eq!(wallet.balance_of(DAI).await, e18(500));
        assert_eq!(fx.env.balance_of(DAI, USER).await, U256::ZERO);
        assert_eq!(
            receipt.events,
            vec![WalletEvent::LogDeposit {
                erc20: DAI,
                amount: e18(500)
            }]
        );
        assert_eq!(fx.events.events_of(wallet.address()).await, receipt.events);
    }

    #[tokio::test]
    async fn test_native_deposit_with_value() {
        let fx = Fixture::new().await;
        let wallet = fx.wallet_of(USER).await;
        fx.env.fund(NATIVE_ETH, USER, e18(2)).await.unwrap();

        wallet
            .execute(USER, e18(1), &[fx.transfer], &[deposit(NATIVE_ETH, e18(1))], false)
            .await
            .unwrap();

        assert_eq!(wallet.balance_of(NATIVE_ETH).await, e18(1));
        assert_eq!(fx.env.native_balance(USER).await, e18(1));
    }

    #[tokio::test]
    async fn test_fee_withheld_on_redeem() {
        let fx = Fixture::new().await;
        let wallet = fx.wallet_of(USER).await;
        fx.env.fund(DAI, USER, e18(50)).await.unwrap();
        let recipient_before = fx.env.balance_of(DAI, MULTISIG).await;

        wallet
            .execute(
                USER,
                U256::ZERO,
                &[fx.transfer, fx.lending],
                &[deposit(DAI, e18(50)), mint(e18(50))],
                false,
            )
            .await
            .unwrap();
        // Supplying is not an inflow
        assert_eq!(fx.env.balance_of(DAI, MULTISIG).await, recipient_before);

        let receipt = wallet
            .execute(USER, U256::ZERO, &[fx.lending], &[redeem(e18(50))], false)
            .await
            .unwrap();

        let fee = e18(50) / U256::from(100);
        assert_eq!(wallet.balance_of(DAI).await, e18(50) - fee);
        assert_eq!(fx.env.balance_of(DAI, MULTISIG).await, recipient_before + fee);
        assert_eq!(
            receipt.fees,
            vec![FeeCharge {
                asset: DAI,
                recipient: MULTISIG,
                amount: fee
            }]
        );
    }

    #[tokio::test]
    async fn test_failing_step_reverts_whole_batch() {
        let fx = Fixture::new().await;
        let wallet = fx.wallet_of(USER).await;
        fx.env.fund(NATIVE_ETH, USER, e18(1)).await.unwrap();

        let swap: Bytes = ISwapModule::swapV2Call {
            fromToken: NATIVE_ETH,
            destToken: DAI,
            amount: e18(1),
        }
        .abi_encode()
        .into();
        // More DAI than the swap can produce
        let supply = mint(e18(1_000_000));

        let err = wallet
            .execute(
                USER,
                e18(1),
                &[fx.swap, fx.lending],
                &[swap, supply],
                false,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InsufficientBalance { .. }));
        assert_eq!(wallet.balance_of(DAI).await, U256::ZERO);
        assert_eq!(wallet.balance_of(NATIVE_ETH).await, U256::ZERO);
        assert_eq!(fx.env.native_balance(USER).await, e18(1));
        assert!(fx.events.events_of(wallet.address()).await.is_empty());
    }

    #[tokio::test]
    async fn test_only_enabled_modules_run() {
        let fx = Fixture::new().await;
        let wallet = fx.wallet_of(USER).await;
        fx.env.fund(DAI, USER, e18(10)).await.unwrap();

        let unknown = Address::repeat_byte(0x42);
        let err = wallet
            .execute(USER, U256::ZERO, &[unknown], &[deposit(DAI, e18(1))], false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidModule(a) if a == unknown));

        fx.registry.disable_logic(MULTISIG, fx.transfer).await.unwrap();
        let err = wallet
            .execute(USER, U256::ZERO, &[fx.transfer], &[deposit(DAI, e18(1))], false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidModule(_)));

        fx.registry.enable_logic(MULTISIG, fx.transfer).await.unwrap();
        wallet
            .execute(USER, U256::ZERO, &[fx.transfer], &[deposit(DAI, e18(1))], false)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_enabled_address_without_module_code() {
        let fx = Fixture::new().await;
        let wallet = fx.wallet_of(USER).await;
        let not_a_module = Address::repeat_byte(0x43);
        fx.registry
            .enable_logic(MULTISIG, not_a_module)
            .await
            .unwrap();

        let err = wallet
            .execute(USER, U256::ZERO, &[not_a_module], &[Bytes::new()], false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidModule(_)));
    }

    #[tokio::test]
    async fn test_delegate_authorization() {
        let fx = Fixture::new().await;
        let wallet = fx.wallet_of(USER).await;
        fx.env.fund(DAI, RANDOM, e18(10)).await.unwrap();
        let batch = [deposit(DAI, e18(1))];

        let err = wallet
            .execute(RANDOM, U256::ZERO, &[fx.transfer], &batch, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AccessDenied(_)));

        wallet.add_delegate(USER, RANDOM).await.unwrap();
        wallet
            .execute(RANDOM, U256::ZERO, &[fx.transfer], &batch, false)
            .await
            .unwrap();

        wallet.remove_delegate(USER, RANDOM).await.unwrap();
        assert!(wallet
            .execute(RANDOM, U256::ZERO, &[fx.transfer], &batch, false)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_mismatched_lengths() {
        let fx = Fixture::new().await;
        let wallet = fx.wallet_of(USER).await;
        let err = wallet
            .execute(USER, U256::ZERO, &[fx.transfer, fx.lending], &[Bytes::new()], false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn test_gas_token_burn_best_effort() {
        let fx = Fixture::new().await;
        let wallet = fx.wallet_of(USER).await;
        fx.env.fund(DAI, USER, e18(2)).await.unwrap();

        // No CHI held: the batch still commits
        wallet
            .execute(USER, U256::ZERO, &[fx.transfer], &[deposit(DAI, e18(1))], true)
            .await
            .unwrap();
        assert_eq!(wallet.balance_of(DAI).await, e18(1));

        fx.env.fund(CHI, USER, U256::from(10)).await.unwrap();
        wallet
            .execute(USER, U256::ZERO, &[fx.transfer], &[deposit(DAI, e18(1))], true)
            .await
            .unwrap();
        // base 1 + 1 per step
        assert_eq!(fx.env.balance_of(CHI, USER).await, U256::from(8));
    }

    #[tokio::test]
    async fn test_gas_token_burn_atomic() {
        let fx = Fixture::with_gas_token(GasTokenConfig {
            policy: BurnPolicy::Atomic,
            ..GasTokenConfig::default()
        })
        .await;
        let wallet = fx.wallet_of(USER).await;
        fx.env.fund(DAI, USER, e18(1)).await.unwrap();

        let err = wallet
            .execute(USER, U256::ZERO, &[fx.transfer], &[deposit(DAI, e18(1))], true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { asset, .. } if asset == CHI));
        assert_eq!(wallet.balance_of(DAI).await, U256::ZERO);
    }

    #[tokio::test]
    async fn test_fee_conservation_across_amounts() {
        let fx = Fixture::new().await;
        let wallet = fx.wallet_of(USER).await;
        fx.env.fund(DAI, USER, e18(100)).await.unwrap();
        wallet
            .execute(
                USER,
                U256::ZERO,
                &[fx.transfer, fx.lending],
                &[deposit(DAI, e18(100)), mint(e18(100))],
                false,
            )
            .await
            .unwrap();

        for amount in [U256::from(1), U256::from(99_999), U256::from(123_456_789)] {
            let wallet_before = wallet.balance_of(DAI).await;
            let recipient_before = fx.env.balance_of(DAI, MULTISIG).await;

            wallet
                .execute(USER, U256::ZERO, &[fx.lending], &[redeem(amount)], false)
                .await
                .unwrap();

            let fee = amount * U256::from(1_000) / U256::from(100_000);
            assert_eq!(fx.env.balance_of(DAI, MULTISIG).await - recipient_before, fee);
            assert_eq!(wallet.balance_of(DAI).await - wallet_before, amount - fee);
        }
    }
}
