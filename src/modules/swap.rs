//! Constant-product AMM adapter

use super::{LogicModule, ModuleContext, StepOutcome};
use crate::events::WalletEvent;
use crate::Result;
use alloy::primitives::U256;
use alloy::sol;
use alloy::sol_types::{SolInterface, SolValue};

sol! {
    interface ISwapModule {
        function swapV2(address fromToken, address destToken, uint256 amount) external payable returns (uint256);
        function addLiquidity(address tokenA, address tokenB, uint256 amtA, uint256 amtB) external payable;
        function removeLiquidity(address tokenA, address tokenB, uint256 poolAmount) external;
    }
}

use ISwapModule::ISwapModuleCalls;

#[derive(Debug, Default)]
pub struct SwapModule;

impl LogicModule for SwapModule {
    fn name(&self) -> &'static str {
        "swap"
    }

    fn call(&self, ctx: &mut ModuleContext<'_>, data: &[u8]) -> Result<StepOutcome> {
        let wallet = ctx.wallet();
        match ISwapModuleCalls::abi_decode(data)? {
            ISwapModuleCalls::swapV2(call) => {
                let world = &mut *ctx.world;
                let amount = if call.amount == U256::MAX {
                    world.ledger.balance_of(call.fromToken, wallet)
                } else {
                    call.amount
                };
                let received = world.amm.swap(
                    &mut world.ledger,
                    wallet,
                    call.fromToken,
                    call.destToken,
                    amount,
                )?;
                tracing::debug!(
                    wallet = %wallet,
                    src = %call.fromToken,
                    dest = %call.destToken,
                    amount_in = %amount,
                    amount_out = %received,
                    "Swapped"
                );
                ctx.emit(WalletEvent::LogSwap {
                    src: call.fromToken,
                    dest: call.destToken,
                    amount,
                });
                Ok(StepOutcome::new(received.abi_encode()))
            }
            ISwapModuleCalls::addLiquidity(call) => {
                let world = &mut *ctx.world;
                let shares = world.amm.add_liquidity(
                    &mut world.ledger,
                    wallet,
                    call.tokenA,
                    call.tokenB,
                    call.amtA,
                    call.amtB,
                )?;
                ctx.emit(WalletEvent::LogLiquidityAdd {
                    token_a: call.tokenA,
                    token_b: call.tokenB,
                    amount: shares,
                });
                Ok(StepOutcome::new(shares.abi_encode()))
            }
            ISwapModuleCalls::removeLiquidity(call) => {
                let world = &mut *ctx.world;
                let (amount_a, amount_b) = world.amm.remove_liquidity(
                    &mut world.ledger,
                    wallet,
                    call.tokenA,
                    call.tokenB,
                    call.poolAmount,
                )?;
                ctx.emit(WalletEvent::LogLiquidityRemove {
                    token_a: call.tokenA,
                    token_b: call.tokenB,
                });
                Ok(StepOutcome::new((amount_a, amount_b).abi_encode()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::World;
    use crate::tokens::addresses::{DAI, NATIVE_ETH};
    use alloy::primitives::Address;
    use alloy::sol_types::SolCall;
    use std::collections::HashSet;

    const WALLET: Address = Address::repeat_byte(0x5a);
    const LP: Address = Address::repeat_byte(0x1b);

    fn e18(n: u64) -> U256 {
        U256::from(n) * U256::from(10u64).pow(U256::from(18))
    }

    fn world() -> World {
        let mut world = World::default();
        world.amm.create_pool(NATIVE_ETH, DAI);
        world.ledger.mint(NATIVE_ETH, LP, e18(100)).unwrap();
        world.ledger.mint(DAI, LP, e18(350_000)).unwrap();
        let World { ledger, amm, .. } = &mut world;
        amm.add_liquidity(ledger, LP, NATIVE_ETH, DAI, e18(100), e18(350_000))
            .unwrap();
        world
    }

    #[test]
    fn test_swap_native_for_token() {
        let mut world = world();
        world.ledger.mint(NATIVE_ETH, WALLET, e18(1)).unwrap();
        let not_allowed = HashSet::new();
        let mut ctx = ModuleContext::new(WALLET, LP, LP, U256::ZERO, &not_allowed, &mut world);

        let data = ISwapModule::swapV2Call {
            fromToken: NATIVE_ETH,
            destToken: DAI,
            amount: e18(1),
        }
        .abi_encode();
        let outcome = SwapModule.call(&mut ctx, &data).unwrap();
        let received = U256::abi_decode(&outcome.output).unwrap();
        let events = ctx.into_events();

        assert_eq!(world.ledger.balance_of(DAI, WALLET), received);
        assert!(matches!(events[0], WalletEvent::LogSwap { src, .. } if src == NATIVE_ETH));
    }

    #[test]
    fn test_liquidity_round_trip_emits_events() {
        let mut world = world();
        world.ledger.mint(NATIVE_ETH, WALLET, e18(1)).unwrap();
        world.ledger.mint(DAI, WALLET, e18(3_500)).unwrap();
        let not_allowed = HashSet::new();
        let mut ctx = ModuleContext::new(WALLET, LP, LP, U256::ZERO, &not_allowed, &mut world);

        let add = ISwapModule::addLiquidityCall {
            tokenA: NATIVE_ETH,
            tokenB: DAI,
            amtA: e18(1),
            amtB: e18(3_500),
        }
        .abi_encode();
        let shares = U256::abi_decode(&SwapModule.call(&mut ctx, &add).unwrap().output).unwrap();

        let remove = ISwapModule::removeLiquidityCall {
            tokenA: NATIVE_ETH,
            tokenB: DAI,
            poolAmount: shares,
        }
        .abi_encode();
        SwapModule.call(&mut ctx, &remove).unwrap();

        let events = ctx.into_events();
        assert!(matches!(events[0], WalletEvent::LogLiquidityAdd { amount, .. } if amount == shares));
        assert!(matches!(events[1], WalletEvent::LogLiquidityRemove { .. }));
    }
}
