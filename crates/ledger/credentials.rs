use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::CredentialsError;

const ED25519_PREFIX: &str = "ed25519:";

/// Key file of the signing account, in the layout the ledger's tooling writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCredentials {
    pub account_id: String,
    pub public_key: String,
    pub private_key: String,
}

impl AccountCredentials {
    /// Reads the key file at `path` and checks that it belongs to `account_id`.
    pub fn load(path: &Path, account_id: &str) -> Result<Self, CredentialsError> {
        let contents = std::fs::read(path).map_err(|source| CredentialsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let credentials: Self =
            serde_json::from_slice(&contents).map_err(|source| CredentialsError::Decode {
                path: path.to_path_buf(),
                source,
            })?;
        credentials.validate(account_id)?;
        Ok(credentials)
    }

    pub fn validate(&self, account_id: &str) -> Result<(), CredentialsError> {
        if self.account_id != account_id {
            return Err(CredentialsError::AccountMismatch {
                expected: account_id.to_string(),
                found: self.account_id.clone(),
            });
        }
        if !self.public_key.starts_with(ED25519_PREFIX) {
            return Err(CredentialsError::UnsupportedKey("public_key"));
        }
        if !self.private_key.starts_with(ED25519_PREFIX) {
            return Err(CredentialsError::UnsupportedKey("private_key"));
        }
        Ok(())
    }
}

/// `<home>/.near-credentials/<network>/<account>.json`
pub fn credentials_path(home: &Path, network: &str, account_id: &str) -> PathBuf {
    home.join(".near-credentials")
        .join(network)
        .join(format!("{account_id}.json"))
}
