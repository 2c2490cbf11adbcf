//! Error types for the wallet registry

use alloy::primitives::{Address, U256};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Invalid module: {0} is not an enabled logic module")]
    InvalidModule(Address),

    #[error("Contract instance has already been initialized")]
    AlreadyInitialized,

    #[error("Invalid signature: recovered {recovered}, expected {expected}")]
    InvalidSignature { recovered: Address, expected: Address },

    #[error("Invalid fee: {0} must be below 100000")]
    InvalidFee(u64),

    #[error("Insufficient balance of {asset} for {holder}: have {available}, need {needed}")]
    InsufficientBalance {
        asset: Address,
        holder: Address,
        available: U256,
        needed: U256,
    },

    #[error("External call failed: {0}")]
    ExternalCallFailed(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid implementation: {0}")]
    InvalidImplementation(Address),

    #[error("Asset {0} cannot be moved through this path")]
    AssetNotAllowed(Address),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Signer error: {0}")]
    Signer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<alloy::sol_types::Error> for Error {
    fn from(err: alloy::sol_types::Error) -> Self {
        Error::InvalidPayload(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
