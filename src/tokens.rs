//! Shared token registry
//!
//! Centralizes token metadata (addresses, decimals, symbols) used by the
//! lending price oracle, the default not-allowed list and the CLI demo.

use alloy::primitives::{address, Address};
use std::collections::HashMap;

/// What role a token plays in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// The chain's native asset
    Native,
    /// A plain fungible asset
    Underlying,
    /// Interest-bearing receipt minted by a lending market
    Receipt,
    /// Gas rebate token burned on request
    GasRebate,
}

/// Token metadata
#[derive(Debug, Clone, Copy)]
pub struct TokenInfo {
    /// Token symbol (e.g., "DAI", "cDAI")
    pub symbol: &'static str,
    /// Number of decimals
    pub decimals: u8,
    /// Role of the token
    pub kind: TokenKind,
    /// Reference price in whole USD, used by the lending oracle
    pub price_usd: u64,
}

impl TokenInfo {
    pub const fn underlying(symbol: &'static str, decimals: u8, price_usd: u64) -> Self {
        Self {
            symbol,
            decimals,
            kind: TokenKind::Underlying,
            price_usd,
        }
    }

    pub const fn receipt(symbol: &'static str, decimals: u8) -> Self {
        Self {
            symbol,
            decimals,
            kind: TokenKind::Receipt,
            price_usd: 0,
        }
    }
}

/// Well-known token addresses
pub mod addresses {
    use super::*;

    /// Native asset placeholder used by every module ABI
    pub const NATIVE_ETH: Address = address!("eeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee");
    pub const ZERO_ADDRESS: Address = address!("0000000000000000000000000000000000000000");

    pub const DAI: Address = address!("6b175474e89094c44da98b954eedeac495271d0f");
    pub const USDC: Address = address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
    pub const WETH: Address = address!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");

    // Lending receipts
    pub const CDAI: Address = address!("5d3a536e4d6dbd6114cc1ead35777bab948e3643");
    pub const CUSDC: Address = address!("39aa39c021dfbae8fac545936693ac917d5e7563");
    pub const CETH: Address = address!("4ddc2d193948926d02f9b1fe9e1daa0718270ed5");

    /// Gas rebate token (CHI)
    pub const CHI: Address = address!("0000000000004946c0e9f43f4dee607b0ef1fa1c");
}

/// Token registry providing token info lookups
pub struct TokenRegistry {
    tokens: HashMap<Address, TokenInfo>,
}

impl TokenRegistry {
    /// Create a new token registry with all known tokens
    pub fn new() -> Self {
        use addresses::*;

        let mut tokens = HashMap::new();

        tokens.insert(
            NATIVE_ETH,
            TokenInfo {
                symbol: "ETH",
                decimals: 18,
                kind: TokenKind::Native,
                price_usd: 3500,
            },
        );
        tokens.insert(DAI, TokenInfo::underlying("DAI", 18, 1));
        tokens.insert(USDC, TokenInfo::underlying("USDC", 6, 1));
        tokens.insert(WETH, TokenInfo::underlying("WETH", 18, 3500));

        tokens.insert(CDAI, TokenInfo::receipt("cDAI", 18));
        tokens.insert(CUSDC, TokenInfo::receipt("cUSDC", 6));
        tokens.insert(CETH, TokenInfo::receipt("cETH", 18));

        tokens.insert(
            CHI,
            TokenInfo {
                symbol: "CHI",
                decimals: 0,
                kind: TokenKind::GasRebate,
                price_usd: 0,
            },
        );

        Self { tokens }
    }

    /// Get token info by address
    pub fn get(&self, address: &Address) -> Option<&TokenInfo> {
        self.tokens.get(address)
    }

    /// Decimals for a token, 18 when unknown
    pub fn decimals(&self, address: &Address) -> u8 {
        self.tokens.get(address).map(|t| t.decimals).unwrap_or(18)
    }

    /// Receipt tokens, which must only leave a wallet through their redeem path
    pub fn receipt_tokens(&self) -> Vec<Address> {
        self.tokens
            .iter()
            .filter(|(_, info)| info.kind == TokenKind::Receipt)
            .map(|(addr, _)| *addr)
            .collect()
    }

    /// Human-readable symbol, falling back to the address
    pub fn symbol(&self, address: &Address) -> String {
        self.tokens
            .get(address)
            .map(|t| t.symbol.to_string())
            .unwrap_or_else(|| address.to_string())
    }
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Global token registry (lazy initialized)
static REGISTRY: std::sync::OnceLock<TokenRegistry> = std::sync::OnceLock::new();

/// Get the global token registry
pub fn registry() -> &'static TokenRegistry {
    REGISTRY.get_or_init(TokenRegistry::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_info() {
        let registry = TokenRegistry::new();

        let usdc = registry.get(&addresses::USDC).unwrap();
        assert_eq!(usdc.symbol, "USDC");
        assert_eq!(usdc.decimals, 6);
        assert_eq!(usdc.kind, TokenKind::Underlying);

        assert_eq!(registry.decimals(&addresses::NATIVE_ETH), 18);
        assert_eq!(registry.decimals(&Address::repeat_byte(0x42)), 18);
    }

    #[test]
    fn test_receipt_tokens() {
        let registry = TokenRegistry::new();
        let receipts = registry.receipt_tokens();
        assert!(receipts.contains(&addresses::CDAI));
        assert!(receipts.contains(&addresses::CUSDC));
        assert!(!receipts.contains(&addresses::DAI));
    }

    #[test]
    fn test_global_registry() {
        let reg = registry();
        assert_eq!(reg.symbol(&addresses::CHI), "CHI");
    }
}
