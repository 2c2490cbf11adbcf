//! Moves assets between the caller and the wallet

use super::{LogicModule, ModuleContext, StepOutcome};
use crate::events::WalletEvent;
use crate::tokens::addresses::NATIVE_ETH;
use crate::{Error, Result};
use alloy::sol;
use alloy::sol_types::SolInterface;

sol! {
    interface ITransferModule {
        function deposit(address erc20, uint256 amount) external payable;
        function withdraw(address erc20, uint256 amount) external;
    }
}

use ITransferModule::ITransferModuleCalls;

#[derive(Debug, Default)]
pub struct TransferModule;

impl LogicModule for TransferModule {
    fn name(&self) -> &'static str {
        "transfer"
    }

    fn call(&self, ctx: &mut ModuleContext<'_>, data: &[u8]) -> Result<StepOutcome> {
        match ITransferModuleCalls::abi_decode(data)? {
            ITransferModuleCalls::deposit(call) => {
                if call.erc20 == NATIVE_ETH {
                    // Native funds arrived with the batch value
                    ctx.claim_value(call.amount)?;
                } else {
                    let (sender, wallet) = (ctx.sender(), ctx.wallet());
                    ctx.world
                        .ledger
                        .transfer(call.erc20, sender, wallet, call.amount)?;
                }
                ctx.emit(WalletEvent::LogDeposit {
                    erc20: call.erc20,
                    amount: call.amount,
                });
            }
            ITransferModuleCalls::withdraw(call) => {
                if ctx.is_not_allowed(call.erc20) {
                    return Err(Error::AssetNotAllowed(call.erc20));
                }
                let (wallet, owner) = (ctx.wallet(), ctx.owner());
                ctx.world
                    .ledger
                    .transfer(call.erc20, wallet, owner, call.amount)?;
                ctx.emit(WalletEvent::LogWithdraw {
                    erc20: call.erc20,
                    amount: call.amount,
                });
            }
        }
        Ok(StepOutcome::default())
    }
}
