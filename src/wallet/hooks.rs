//! Passive asset receipt

use super::Wallet;
use crate::environment::{TokenReceiver, ERC1155_BATCH_RECEIVED, ERC1155_RECEIVED, ERC721_RECEIVED};
use crate::tokens::addresses::NATIVE_ETH;
use crate::Result;
use alloy::primitives::{Address, FixedBytes, U256};

/// Accepts every NFT offered to a wallet
#[derive(Debug, Clone, Copy)]
pub struct WalletHooks {
    wallet: Address,
}

impl WalletHooks {
    pub fn new(wallet: Address) -> Self {
        Self { wallet }
    }
}

impl TokenReceiver for WalletHooks {
    fn on_erc721_received(
        &self,
        _operator: Address,
        from: Address,
        token_id: U256,
        _data: &[u8],
    ) -> FixedBytes<4> {
        tracing::debug!(wallet = %self.wallet, from = %from, token_id = %token_id, "Received ERC721");
        ERC721_RECEIVED
    }

    fn on_erc1155_received(
        &self,
        _operator: Address,
        from: Address,
        id: U256,
        value: U256,
        _data: &[u8],
    ) -> FixedBytes<4> {
        tracing::debug!(wallet = %self.wallet, from = %from, id = %id, value = %value, "Received ERC1155");
        ERC1155_RECEIVED
    }

    fn on_erc1155_batch_received(
        &self,
        _operator: Address,
        from: Address,
        ids: &[U256],
        _values: &[U256],
        _data: &[u8],
    ) -> FixedBytes<4> {
        tracing::debug!(wallet = %self.wallet, from = %from, count = ids.len(), "Received ERC1155 batch");
        ERC1155_BATCH_RECEIVED
    }
}

impl Wallet {
    /// Plain native transfer into the wallet
    pub async fn receive(&self, from: Address, amount: U256) -> Result<()> {
        self.registry
            .env()
            .transfer(NATIVE_ETH, from, self.address, amount)
            .await
    }
}
