use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("mining empty blocks is not allowed")]
    EmptyBlock,

    #[error("mining cancelled")]
    MiningCancelled,

    #[error("signature error: {0}")]
    Signature(#[from] secp256k1::Error),

    #[error("keystore error: {0}")]
    Keystore(String),

    #[error("invalid account address '{0}'")]
    InvalidAddress(String),

    #[error("invalid hash '{0}'")]
    InvalidHash(String),
}
