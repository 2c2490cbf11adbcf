//! Constant-product AMM pools
//!
//! Two-token pools with a 0.3% swap fee. Reserves are the pool address's
//! ledger balances and LP shares are a token at the pool address.

use crate::ledger::Ledger;
use crate::tokens::addresses::ZERO_ADDRESS;
use crate::{Error, Result};
use alloy::primitives::{keccak256, Address, U256};
use std::collections::HashMap;

/// Shares locked forever on the first deposit
pub const MINIMUM_LIQUIDITY: u64 = 1_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    pub token0: Address,
    pub token1: Address,
    /// Holds the reserves and is the LP token
    pub address: Address,
}

impl Pool {
    fn reserves(&self, ledger: &Ledger) -> (U256, U256) {
        (
            ledger.balance_of(self.token0, self.address),
            ledger.balance_of(self.token1, self.address),
        )
    }
}

fn sort_tokens(a: Address, b: Address) -> (Address, Address) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Deterministic pool address for a token pair
pub fn pool_address(a: Address, b: Address) -> Address {
    let (token0, token1) = sort_tokens(a, b);
    let mut preimage = b"pair".to_vec();
    preimage.extend_from_slice(token0.as_slice());
    preimage.extend_from_slice(token1.as_slice());
    Address::from_word(keccak256(preimage))
}

/// Output amount for an exact input, 0.3% fee
pub fn get_amount_out(amount_in: U256, reserve_in: U256, reserve_out: U256) -> Result<U256> {
    if amount_in.is_zero() {
        return Err(Error::ExternalCallFailed(
            "insufficient input amount".to_string(),
        ));
    }
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return Err(Error::ExternalCallFailed("insufficient liquidity".to_string()));
    }
    let amount_in_with_fee = mul(amount_in, U256::from(997))?;
    let numerator = mul(amount_in_with_fee, reserve_out)?;
    let denominator = mul(reserve_in, U256::from(1000))?
        .checked_add(amount_in_with_fee)
        .ok_or_else(overflow)?;
    Ok(numerator / denominator)
}

fn overflow() -> Error {
    Error::ExternalCallFailed("arithmetic overflow".to_string())
}

fn mul(a: U256, b: U256) -> Result<U256> {
    a.checked_mul(b).ok_or_else(overflow)
}

fn isqrt(value: U256) -> U256 {
    if value < U256::from(4) {
        return if value.is_zero() { U256::ZERO } else { U256::from(1) };
    }
    let mut x = value;
    let mut y = (x >> 1) + U256::from(1);
    while y < x {
        x = y;
        y = (x + value / x) >> 1;
    }
    x
}

#[derive(Debug, Default)]
pub struct AmmPools {
    pools: HashMap<(Address, Address), Pool>,
}

impl AmmPools {
    pub fn create_pool(&mut self, a: Address, b: Address) -> Pool {
        let (token0, token1) = sort_tokens(a, b);
        let pool = self
            .pools
            .entry((token0, token1))
            .or_insert_with(|| Pool {
                token0,
                token1,
                address: pool_address(token0, token1),
            })
            .clone();
        tracing::debug!(token0 = %token0, token1 = %token1, pool = %pool.address, "Created pool");
        pool
    }

    pub fn pool(&self, a: Address, b: Address) -> Result<&Pool> {
        self.pools.get(&sort_tokens(a, b)).ok_or_else(|| {
            Error::ExternalCallFailed(format!("no pool for {} / {}", a, b))
        })
    }

    /// Swap an exact `amount_in` of `from` for `dest`, returns the output
    pub fn swap(
        &self,
        ledger: &mut Ledger,
        account: Address,
        from: Address,
        dest: Address,
        amount_in: U256,
    ) -> Result<U256> {
        let pool = self.pool(from, dest)?;
        let reserve_in = ledger.balance_of(from, pool.address);
        let reserve_out = ledger.balance_of(dest, pool.address);
        let amount_out = get_amount_out(amount_in, reserve_in, reserve_out)?;
        if amount_out.is_zero() {
            return Err(Error::ExternalCallFailed(
                "insufficient output amount".to_string(),
            ));
        }
        ledger.transfer(from, account, pool.address, amount_in)?;
        ledger.transfer(dest, pool.address, account, amount_out)?;
        Ok(amount_out)
    }

    /// Deposit both tokens, returns LP shares minted
    pub fn add_liquidity(
        &self,
        ledger: &mut Ledger,
        account: Address,
        token_a: Address,
        token_b: Address,
        amount_a: U256,
        amount_b: U256,
    ) -> Result<U256> {
        let pool = self.pool(token_a, token_b)?;
        let (amount0, amount1) = if token_a == pool.token0 {
            (amount_a, amount_b)
        } else {
            (amount_b, amount_a)
        };
        let (reserve0, reserve1) = pool.reserves(ledger);
        let total_supply = ledger.total_supply(pool.address);

        let shares = if total_supply.is_zero() {
            let root = isqrt(mul(amount0, amount1)?);
            let minimum = U256::from(MINIMUM_LIQUIDITY);
            if root <= minimum {
                return Err(Error::ExternalCallFailed(
                    "insufficient liquidity minted".to_string(),
                ));
            }
            ledger.mint(pool.address, ZERO_ADDRESS, minimum)?;
            root - minimum
        } else {
            std::cmp::min(
                mul(amount0, total_supply)? / reserve0,
                mul(amount1, total_supply)? / reserve1,
            )
        };
        if shares.is_zero() {
            return Err(Error::ExternalCallFailed(
                "insufficient liquidity minted".to_string(),
            ));
        }

        ledger.transfer(pool.token0, account, pool.address, amount0)?;
        ledger.transfer(pool.token1, account, pool.address, amount1)?;
        ledger.mint(pool.address, account, shares)?;
        Ok(shares)
    }

    /// Burn LP shares, returns the amounts paid out as (token_a, token_b)
    pub fn remove_liquidity(
        &self,
        ledger: &mut Ledger,
        account: Address,
        token_a: Address,
        token_b: Address,
        shares: U256,
    ) -> Result<(U256, U256)> {
        let pool = self.pool(token_a, token_b)?;
        let (reserve0, reserve1) = pool.reserves(ledger);
        let total_supply = ledger.total_supply(pool.address);
        if total_supply.is_zero() {
            return Err(Error::ExternalCallFailed("empty pool".to_string()));
        }

        let amount0 = mul(shares, reserve0)? / total_supply;
        let amount1 = mul(shares, reserve1)? / total_supply;
        ledger.burn(pool.address, account, shares)?;
        ledger.transfer(pool.token0, pool.address, account, amount0)?;
        ledger.transfer(pool.token1, pool.address, account, amount1)?;

        if token_a == pool.token0 {
            Ok((amount0, amount1))
        } else {
            Ok((amount1, amount0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::addresses::{DAI, NATIVE_ETH};

    const LP: Address = Address::repeat_byte(0x10);
    const TRADER: Address = Address::repeat_byte(0x20);

    fn e18(n: u64) -> U256 {
        U256::from(n) * U256::from(10u64).pow(U256::from(18))
    }

    fn seeded() -> (AmmPools, Ledger) {
        let mut pools = AmmPools::default();
        pools.create_pool(NATIVE_ETH, DAI);
        let mut ledger = Ledger::new();
        ledger.mint(NATIVE_ETH, LP, e18(100)).unwrap();
        ledger.mint(DAI, LP, e18(350_000)).unwrap();
        pools
            .add_liquidity(&mut ledger, LP, NATIVE_ETH, DAI, e18(100), e18(350_000))
            .unwrap();
        (pools, ledger)
    }

    #[test]
    fn test_get_amount_out() {
        let out = get_amount_out(U256::from(1000), U256::from(10_000), U256::from(10_000)).unwrap();
        // 1000 * 997 * 10000 / (10000 * 1000 + 997000)
        assert_eq!(out, U256::from(906));
        assert!(get_amount_out(U256::ZERO, U256::from(1), U256::from(1)).is_err());
    }

    #[test]
    fn test_get_amount_out_rejects_overflow() {
        let huge = U256::from(1) << 200;
        let err = get_amount_out(huge, e18(350_000), e18(100)).unwrap_err();
        assert!(matches!(err, Error::ExternalCallFailed(ref msg) if msg == "arithmetic overflow"));
        assert!(get_amount_out(U256::from(1) << 250, e18(350_000), e18(100)).is_err());
        assert!(get_amount_out(U256::MAX, U256::from(1), U256::from(1)).is_err());
    }

    #[test]
    fn test_overflowing_swap_leaves_balances() {
        let (pools, mut ledger) = seeded();
        let huge = U256::from(1) << 200;
        ledger.mint(NATIVE_ETH, TRADER, huge).unwrap();

        assert!(pools
            .swap(&mut ledger, TRADER, NATIVE_ETH, DAI, huge)
            .is_err());
        assert_eq!(ledger.balance_of(NATIVE_ETH, TRADER), huge);
        assert_eq!(ledger.balance_of(DAI, TRADER), U256::ZERO);
    }

    #[test]
    fn test_isqrt() {
        assert_eq!(isqrt(U256::ZERO), U256::ZERO);
        assert_eq!(isqrt(U256::from(2)), U256::from(1));
        assert_eq!(isqrt(U256::from(16)), U256::from(4));
        assert_eq!(isqrt(U256::from(17)), U256::from(4));
        assert_eq!(isqrt(U256::MAX), U256::MAX >> 128);
    }

    #[test]
    fn test_swap_moves_reserves() {
        let (pools, mut ledger) = seeded();
        ledger.mint(NATIVE_ETH, TRADER, e18(1)).unwrap();

        let out = pools
            .swap(&mut ledger, TRADER, NATIVE_ETH, DAI, e18(1))
            .unwrap();

        assert!(out > U256::ZERO);
        assert_eq!(ledger.balance_of(DAI, TRADER), out);
        assert_eq!(ledger.balance_of(NATIVE_ETH, TRADER), U256::ZERO);
    }

    #[test]
    fn test_add_then_remove_liquidity() {
        let (pools, mut ledger) = seeded();
        let pool = pools.pool(DAI, NATIVE_ETH).unwrap().clone();
        let shares = ledger.balance_of(pool.address, LP);
        assert!(shares > U256::ZERO);

        let (eth_out, dai_out) = pools
            .remove_liquidity(&mut ledger, LP, NATIVE_ETH, DAI, shares)
            .unwrap();

        assert!(eth_out > U256::ZERO && eth_out <= e18(100));
        assert!(dai_out > U256::ZERO && dai_out <= e18(350_000));
        assert_eq!(ledger.balance_of(pool.address, LP), U256::ZERO);
    }

    #[test]
    fn test_missing_pool() {
        let pools = AmmPools::default();
        assert!(pools.pool(DAI, NATIVE_ETH).is_err());
    }
}
