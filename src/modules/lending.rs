//! Lending market adapter
//!
//! `tokenAmt == type(uint256).max` supplies the whole wallet balance and
//! repays the whole debt.

use super::{LogicModule, ModuleContext, StepOutcome};
use crate::events::WalletEvent;
use crate::Result;
use alloy::primitives::U256;
use alloy::sol;
use alloy::sol_types::{SolInterface, SolValue};

sol! {
    interface ILendingModule {
        function mintCToken(address erc20, address cErc20, uint256 tokenAmt) external payable;
        function redeemUnderlying(address erc20, address cErc20, uint256 tokenAmt) external;
        function borrow(address erc20, address cErc20, uint256 tokenAmt) external;
        function repayToken(address erc20, address cErc20, uint256 tokenAmt) external payable;
    }
}

use ILendingModule::ILendingModuleCalls;

#[derive(Debug, Default)]
pub struct LendingModule;

impl LogicModule for LendingModule {
    fn name(&self) -> &'static str {
        "lending"
    }

    fn call(&self, ctx: &mut ModuleContext<'_>, data: &[u8]) -> Result<StepOutcome> {
        let wallet = ctx.wallet();
        match ILendingModuleCalls::abi_decode(data)? {
            ILendingModuleCalls::mintCToken(call) => {
                let amount = if call.tokenAmt == U256::MAX {
                    ctx.world.ledger.balance_of(call.erc20, wallet)
                } else {
                    call.tokenAmt
                };
                let world = &mut *ctx.world;
                let minted =
                    world
                        .lending
                        .supply(&mut world.ledger, wallet, call.erc20, call.cErc20, amount)?;
                ctx.emit(WalletEvent::LogMint {
                    erc20: call.erc20,
                    token_amt: amount,
                });
                Ok(StepOutcome::new(minted.abi_encode()))
            }
            ILendingModuleCalls::redeemUnderlying(call) => {
                let world = &mut *ctx.world;
                world.lending.redeem_underlying(
                    &mut world.ledger,
                    wallet,
                    call.erc20,
                    call.cErc20,
                    call.tokenAmt,
                )?;
                ctx.emit(WalletEvent::LogRedeem {
                    erc20: call.erc20,
                    token_amt: call.tokenAmt,
                });
                Ok(StepOutcome::default().with_realized(call.erc20, call.tokenAmt))
            }
            ILendingModuleCalls::borrow(call) => {
                let world = &mut *ctx.world;
                world
                    .lending
                    .borrow(&mut world.ledger, wallet, call.erc20, call.cErc20, call.tokenAmt)?;
                ctx.emit(WalletEvent::LogBorrow {
                    erc20: call.erc20,
                    token_amt: call.tokenAmt,
                });
                Ok(StepOutcome::default())
            }
            ILendingModuleCalls::repayToken(call) => {
                let world = &mut *ctx.world;
                let repaid = world.lending.repay(
                    &mut world.ledger,
                    wallet,
                    call.erc20,
                    call.cErc20,
                    call.tokenAmt,
                )?;
                ctx.emit(WalletEvent::LogPayback {
                    erc20: call.erc20,
                    token_amt: repaid,
                });
                Ok(StepOutcome::new(repaid.abi_encode()))
            }
        }
    }
}
