use thiserror::Error;

/// Errors from parsing or validating primitive values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    #[error("signer recovery failed: {0}")]
    Recovery(String),
}
