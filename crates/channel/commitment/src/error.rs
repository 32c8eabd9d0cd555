use channel_types::{Address, AssetType, TypesError};
use thiserror::Error;

/// Errors from building or completing a commitment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommitmentError {
    #[error("asset type mismatch: free balance holds {expected:?}, app terms use {actual:?}")]
    AssetMismatch {
        expected: AssetType,
        actual: AssetType,
    },

    #[error("deposit token mismatch: initiator uses {initiator}, responder uses {responder}")]
    TokenMismatch {
        initiator: Address,
        responder: Address,
    },

    #[error("expected {expected} signatures, got {actual}")]
    SignatureCount { expected: usize, actual: usize },

    #[error("signature {index} recovers to {recovered}, expected {expected}")]
    SignerMismatch {
        index: usize,
        expected: Address,
        recovered: Address,
    },

    #[error("crypto error: {0}")]
    Crypto(#[from] TypesError),
}
