//! Owner key handling for meta-transactions
//!
//! SECURITY: This is the ONLY place where private keys exist.
//! - Keys are held in alloy's PrivateKeySigner which handles crypto securely
//! - Keys are never serialized and never logged

use crate::{Error, Result};
use alloy::primitives::{Address, Signature, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use secrecy::{ExposeSecret, SecretString};

/// Signs meta-transaction digests on behalf of a wallet owner
pub struct AccountSigner {
    signer: PrivateKeySigner,
    /// Public address (safe to expose)
    address: Address,
}

impl AccountSigner {
    /// Create a signer from an environment variable
    ///
    /// # Arguments
    /// * `var_name` - Name of the environment variable containing the private key
    pub fn from_env(var_name: &str) -> Result<Self> {
        let key = std::env::var(var_name).map(SecretString::from).map_err(|_| {
            Error::Signer(format!(
                "Environment variable {} not set. Required for signing.",
                var_name
            ))
        })?;

        Self::from_hex(key.expose_secret())
    }

    /// Create a signer from a hex-encoded private key
    pub fn from_hex(key_hex: &str) -> Result<Self> {
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| Error::Signer(format!("Invalid private key: {}", e)))?;

        let address = signer.address();
        Ok(Self { signer, address })
    }

    /// Fresh throwaway key
    pub fn random() -> Self {
        let signer = PrivateKeySigner::random();
        let address = signer.address();
        Self { signer, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// EIP-191 signature over a 32-byte digest, as `eth_sign` produces it
    pub fn sign_digest(&self, digest: B256) -> Result<Signature> {
        self.signer
            .sign_message_sync(digest.as_slice())
            .map_err(|e| Error::Signer(format!("Signing failed: {}", e)))
    }
}

// Implement Debug manually to avoid exposing the signer
impl std::fmt::Debug for AccountSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountSigner")
            .field("address", &self.address)
            .field("signer", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test private key (DO NOT use in production!)
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_signer_from_hex() {
        let signer = AccountSigner::from_hex(TEST_KEY).unwrap();
        assert_eq!(
            signer.address().to_string().to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
        assert!(AccountSigner::from_hex("0xnothex").is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let signer = AccountSigner::from_hex(TEST_KEY).unwrap();
        let debug_str = format!("{:?}", signer);

        assert!(!debug_str.contains("ac0974bec"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[test]
    fn test_signature_recovers_to_signer() {
        let signer = AccountSigner::random();
        let digest = B256::repeat_byte(0x42);

        let signature = signer.sign_digest(digest).unwrap();
        let recovered = signature.recover_address_from_msg(digest).unwrap();
        assert_eq!(recovered, signer.address());
    }

    #[test]
    fn test_missing_env_var() {
        let err = AccountSigner::from_env("SMART_WALLET_TEST_UNSET_KEY").unwrap_err();
        assert!(matches!(err, Error::Signer(_)));
    }
}
