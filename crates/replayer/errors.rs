//! Error types for the replay pipeline.

use ethereum_types::H256;
use evmload_ledger::{LedgerError, errors::CredentialsError};
use evmload_storage::error::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// A value that cannot be represented in the ledger's fixed-width wire format.
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("value {value} does not fit in {width} bytes")]
    OutOfRange { value: String, width: usize },
    #[error("failed to serialize {method} arguments: {reason}")]
    Serialize { method: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum ReplayError {
    // Configuration errors (exit code 10)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("conflicting options: {0}")]
    ConfigConflict(String),

    // Cancellation (exit code 20)
    #[error("run canceled")]
    Canceled,

    // Local chain errors (exit code 30)
    #[error("target block {height} with hash {hash:#x} not found")]
    TargetNotFound { height: u64, hash: H256 },

    #[error("chain gap: block {height} with hash {hash:#x} not found")]
    ChainGap { height: u64, hash: H256 },

    #[error("hash cache {path} is corrupt at line {line}: {reason}")]
    CorruptCache {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    // Encoding errors (exit code 40)
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    // Remote errors (exit code 50)
    #[error("{method} at {} failed: {reason}", position(.block, .tx))]
    RemoteSubmission {
        block: Option<u64>,
        tx: Option<usize>,
        method: String,
        reason: String,
        /// Rendering of the offending transaction, absent in batch mode.
        diagnostic: Option<String>,
    },

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    // Breakpoint errors (exit code 60)
    #[error("breakpoint bundle {0} already exists")]
    BundleExists(PathBuf),

    #[error("breakpoint bundle error: {0}")]
    Bundle(String),

    #[error("credentials error: {0}")]
    Credentials(#[from] CredentialsError),

    // Internal errors (exit code 70)
    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error raised while generating calls, tagged with where generation stopped.
    #[error("aborted at {}: {source}", position(.block, .tx))]
    Aborted {
        block: Option<u64>,
        tx: Option<usize>,
        #[source]
        source: Box<ReplayError>,
    },
}

fn position(block: &Option<u64>, tx: &Option<usize>) -> String {
    match (block, tx) {
        (Some(block), Some(tx)) => format!("block {block} tx {tx}"),
        (Some(block), None) => format!("block {block}"),
        (None, _) => "chain setup".to_string(),
    }
}

impl ReplayError {
    /// Returns the typed error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "config/invalid_argument",
            Self::ConfigConflict(_) => "config/conflict",
            Self::Canceled => "run/canceled",
            Self::TargetNotFound { .. } => "store/target_not_found",
            Self::ChainGap { .. } => "store/chain_gap",
            Self::CorruptCache { .. } => "store/corrupt_cache",
            Self::Storage(_) => "store/error",
            Self::Encoding(EncodingError::OutOfRange { .. }) => "encoding/out_of_range",
            Self::Encoding(EncodingError::Serialize { .. }) => "encoding/serialize",
            Self::RemoteSubmission { .. } => "remote/submission_failed",
            Self::Ledger(_) => "remote/ledger_error",
            Self::BundleExists(_) => "breakpoint/bundle_exists",
            Self::Bundle(_) => "breakpoint/bundle_error",
            Self::Credentials(_) => "breakpoint/credentials",
            Self::InvalidTransition { .. } => "internal/invalid_transition",
            Self::Internal(_) => "internal/unexpected",
            Self::Io(_) => "internal/io_error",
            Self::Json(_) => "internal/json_error",
            Self::Aborted { source, .. } => source.error_code(),
        }
    }

    /// Returns the process exit code
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) | Self::ConfigConflict(_) => 10,
            Self::Canceled => 20,
            Self::TargetNotFound { .. }
            | Self::ChainGap { .. }
            | Self::CorruptCache { .. }
            | Self::Storage(_) => 30,
            Self::Encoding(_) => 40,
            Self::RemoteSubmission { .. } | Self::Ledger(_) => 50,
            Self::BundleExists(_) | Self::Bundle(_) | Self::Credentials(_) => 60,
            Self::InvalidTransition { .. } | Self::Internal(_) | Self::Io(_) | Self::Json(_) => 70,
            Self::Aborted { source, .. } => source.exit_code(),
        }
    }

    /// Transaction rendering attached to a failed submission, if any.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Self::RemoteSubmission { diagnostic, .. } => diagnostic.as_deref(),
            Self::Aborted { source, .. } => source.diagnostic(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aborted_errors_keep_the_inner_code() {
        let err = ReplayError::Aborted {
            block: Some(4),
            tx: None,
            source: Box::new(ReplayError::ChainGap {
                height: 4,
                hash: H256::zero(),
            }),
        };
        assert_eq!(err.error_code(), "store/chain_gap");
        assert_eq!(err.exit_code(), 30);
        assert!(err.to_string().starts_with("aborted at block 4:"));
    }

    #[test]
    fn remote_failures_render_position() {
        let err = ReplayError::RemoteSubmission {
            block: Some(2),
            tx: Some(1),
            method: "submit".to_string(),
            reason: "out of gas".to_string(),
            diagnostic: Some("nonce: 3".to_string()),
        };
        assert_eq!(err.to_string(), "submit at block 2 tx 1 failed: out of gas");
        assert_eq!(err.exit_code(), 50);
        assert_eq!(err.diagnostic(), Some("nonce: 3"));
    }
}
