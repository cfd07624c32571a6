use ethereum_types::H256;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Block {height} with hash {hash:#x} not found")]
    BlockNotFound { height: u64, hash: H256 },
    #[error("Failed to decode block at line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to encode block {height}: {source}")]
    Encode {
        height: u64,
        #[source]
        source: serde_json::Error,
    },
    #[error("Refusing to overwrite existing file {0}")]
    AlreadyExists(PathBuf),
    #[error("Failed to acquire lock on the store")]
    LockError,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Custom(String),
}
