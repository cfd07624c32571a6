use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("Failed to parse url: {0}")]
    ParseUrlError(String),
    #[error("Failed to serialize request body: {0}")]
    FailedToSerializeRequestBody(String),
    #[error("{method}: {message} (code: {code}, data: {data:?})")]
    RPCError {
        method: String,
        code: i32,
        message: String,
        data: Option<String>,
    },
    #[error("{method}: malformed outcome: {reason}")]
    InvalidOutcome { method: String, reason: String },
    #[error("Giving up on {method} after {attempts} attempts: {source}")]
    RetriesExhausted {
        method: String,
        attempts: u64,
        #[source]
        source: Box<LedgerError>,
    },
    #[error("Cannot submit an empty batch")]
    EmptyBatch,
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("Failed to read credentials file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to decode credentials file {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Credentials belong to {found}, expected {expected}")]
    AccountMismatch { expected: String, found: String },
    #[error("Key {0} must be an ed25519 key")]
    UnsupportedKey(&'static str),
}
