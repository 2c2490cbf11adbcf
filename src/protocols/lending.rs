//! Pooled lending markets
//!
//! A market per underlying asset. Supplying moves the underlying into the
//! market's cash (held at the receipt token address) and mints receipt tokens
//! 1:1. Borrowing mints a non-transferable debt token and pays out cash.
//! Collateral is the receipt balance weighted by the market's collateral
//! factor; every operation that increases risk checks account liquidity.

use crate::ledger::Ledger;
use crate::tokens;
use crate::{Error, Result};
use alloy::primitives::{keccak256, Address, U256};
use std::collections::HashMap;

/// Collateral factors are expressed in parts of 10_000
pub const COLLATERAL_SCALE: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct Market {
    pub underlying: Address,
    /// Receipt token; also the address holding the market's cash
    pub receipt: Address,
    pub debt_token: Address,
    pub collateral_factor: u64,
    pub price_usd: u64,
    pub decimals: u8,
}

impl Market {
    /// Build a market using the token registry for price and decimals
    pub fn new(underlying: Address, receipt: Address, collateral_factor: u64) -> Self {
        let registry = tokens::registry();
        let info = registry.get(&underlying);
        Self {
            underlying,
            receipt,
            debt_token: debt_token_address(receipt),
            collateral_factor,
            price_usd: info.map(|i| i.price_usd).unwrap_or(1),
            decimals: info.map(|i| i.decimals).unwrap_or(18),
        }
    }

    /// USD value with 18 decimals
    fn value_of(&self, amount: U256) -> U256 {
        let priced = amount.saturating_mul(U256::from(self.price_usd));
        if self.decimals <= 18 {
            priced.saturating_mul(U256::from(10u64).pow(U256::from(18 - self.decimals)))
        } else {
            priced / U256::from(10u64).pow(U256::from(self.decimals - 18))
        }
    }
}

/// Debt token address derived from the receipt token
pub fn debt_token_address(receipt: Address) -> Address {
    let mut preimage = b"debt".to_vec();
    preimage.extend_from_slice(receipt.as_slice());
    Address::from_word(keccak256(preimage))
}

/// Collateral and debt of one account, USD with 18 decimals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountLiquidity {
    pub borrow_limit: U256,
    pub debt: U256,
}

impl AccountLiquidity {
    pub fn is_healthy(&self) -> bool {
        self.borrow_limit >= self.debt
    }
}

#[derive(Debug, Default)]
pub struct LendingMarkets {
    markets: HashMap<Address, Market>,
}

impl LendingMarkets {
    pub fn list(&mut self, market: Market) {
        tracing::debug!(
            underlying = %market.underlying,
            receipt = %market.receipt,
            "Listed lending market"
        );
        self.markets.insert(market.underlying, market);
    }

    pub fn market(&self, underlying: &Address) -> Option<&Market> {
        self.markets.get(underlying)
    }

    /// Resolve the market for an (underlying, receipt) pair
    pub fn market_for(&self, underlying: Address, receipt: Address) -> Result<&Market> {
        self.markets
            .get(&underlying)
            .filter(|m| m.receipt == receipt)
            .ok_or_else(|| {
                Error::ExternalCallFailed(format!(
                    "no market for {} with receipt {}",
                    underlying, receipt
                ))
            })
    }

    pub fn account_liquidity(&self, ledger: &Ledger, account: Address) -> AccountLiquidity {
        let mut borrow_limit = U256::ZERO;
        let mut debt = U256::ZERO;
        for market in self.markets.values() {
            let collateral = market.value_of(ledger.balance_of(market.receipt, account));
            borrow_limit = borrow_limit.saturating_add(
                collateral.saturating_mul(U256::from(market.collateral_factor))
                    / U256::from(COLLATERAL_SCALE),
            );
            debt = debt.saturating_add(market.value_of(ledger.balance_of(market.debt_token, account)));
        }
        AccountLiquidity { borrow_limit, debt }
    }

    /// Supply `amount` of underlying, returns receipt tokens minted
    pub fn supply(
        &self,
        ledger: &mut Ledger,
        account: Address,
        underlying: Address,
        receipt: Address,
        amount: U256,
    ) -> Result<U256> {
        let market = self.market_for(underlying, receipt)?;
        ledger.transfer(underlying, account, market.receipt, amount)?;
        ledger.mint(market.receipt, account, amount)?;
        Ok(amount)
    }

    /// Redeem receipts for exactly `amount` of underlying
    pub fn redeem_underlying(
        &self,
        ledger: &mut Ledger,
        account: Address,
        underlying: Address,
        receipt: Address,
        amount: U256,
    ) -> Result<()> {
        let market = self.market_for(underlying, receipt)?;
        self.ensure_healthy_after(ledger, account, market, amount, U256::ZERO)?;
        ledger.burn(market.receipt, account, amount)?;
        ledger.transfer(underlying, market.receipt, account, amount)
    }

    pub fn borrow(
        &self,
        ledger: &mut Ledger,
        account: Address,
        underlying: Address,
        receipt: Address,
        amount: U256,
    ) -> Result<()> {
        let market = self.market_for(underlying, receipt)?;
        self.ensure_healthy_after(ledger, account, market, U256::ZERO, amount)?;
        ledger.mint(market.debt_token, account, amount)?;
        ledger.transfer(underlying, market.receipt, account, amount)
    }

    /// Repay debt; `U256::MAX` repays everything. Returns the amount repaid.
    pub fn repay(
        &self,
        ledger: &mut Ledger,
        account: Address,
        underlying: Address,
        receipt: Address,
        amount: U256,
    ) -> Result<U256> {
        let market = self.market_for(underlying, receipt)?;
        let outstanding = ledger.balance_of(market.debt_token, account);
        let amount = if amount == U256::MAX {
            outstanding
        } else {
            amount
        };
        if amount > outstanding {
            return Err(Error::ExternalCallFailed(format!(
                "repay amount {} exceeds debt {}",
                amount, outstanding
            )));
        }
        ledger.transfer(underlying, account, market.receipt, amount)?;
        ledger.burn(market.debt_token, account, amount)?;
        Ok(amount)
    }

    /// Check the account stays healthy once `withdrawn` collateral leaves and
    /// `borrowed` debt is added in `market`
    fn ensure_healthy_after(
        &self,
        ledger: &Ledger,
        account: Address,
        market: &Market,
        withdrawn: U256,
        borrowed: U256,
    ) -> Result<()> {
        let mut liquidity = self.account_liquidity(ledger, account);
        let lost_limit = market
            .value_of(withdrawn)
            .saturating_mul(U256::from(market.collateral_factor))
            / U256::from(COLLATERAL_SCALE);
        liquidity.borrow_limit = liquidity.borrow_limit.saturating_sub(lost_limit);
        liquidity.debt = liquidity.debt.saturating_add(market.value_of(borrowed));
        if liquidity.is_healthy() {
            Ok(())
        } else {
            Err(Error::ExternalCallFailed(format!(
                "insufficient liquidity: limit {} below debt {}",
                liquidity.borrow_limit, liquidity.debt
            )))
        }
    }
}
