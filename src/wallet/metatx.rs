//! Meta-transaction relay
//!
//! The owner signs the digest of an `execute` payload off-line and anyone can
//! submit it. The digest binds chain id, wallet address and the wallet's
//! nonce, so a signature is valid exactly once, on one wallet, on one chain.

use super::{ExecutionReceipt, Wallet};
use crate::{Error, Result};
use alloy::primitives::{Address, Signature, B256, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

sol! {
    interface IWallet {
        function execute(address[] targets, bytes[] datas, bool burnGasToken) external payable returns (bytes[]);
    }
}

impl Wallet {
    /// Digest the owner signs (EIP-191) to authorize `payload`
    pub async fn get_hash(&self, payload: &[u8]) -> Result<B256> {
        let storage = self.storage.lock().await;
        let logic = self.logic().await?;
        let chain_id = self.registry.env().chain_id();
        Ok(logic.digest(chain_id, self.address, storage.nonce, payload))
    }

    /// Run an owner-signed `execute` payload on behalf of `relayer`
    pub async fn execute_meta_transaction(
        &self,
        relayer: Address,
        signature: &[u8],
        payload: &[u8],
    ) -> Result<ExecutionReceipt> {
        let mut storage = self.storage.lock().await;
        let logic = self.logic().await?;
        let chain_id = self.registry.env().chain_id();
        let digest = logic.digest(chain_id, self.address, storage.nonce, payload);

        // Malformed or unrecoverable signatures recover to nobody
        let recovered = Signature::try_from(signature)
            .and_then(|signature| signature.recover_address_from_msg(digest))
            .unwrap_or_else(|e| {
                tracing::debug!(wallet = %self.address, error = %e, "Signature did not recover");
                Address::ZERO
            });
        if recovered != storage.owner {
            return Err(Error::InvalidSignature {
                recovered,
                expected: storage.owner,
            });
        }

        let call = IWallet::executeCall::abi_decode(payload)?;
        let owner = storage.owner;
        let receipt = self
            .execute_locked(
                &mut storage,
                owner,
                U256::ZERO,
                &call.targets,
                &call.datas,
                call.burnGasToken,
            )
            .await?;
        storage.nonce += 1;

        tracing::info!(
            wallet = %self.address,
            relayer = %relayer,
            nonce = storage.nonce,
            "Relayed meta-transaction"
        );
        Ok(receipt)
    }
}
