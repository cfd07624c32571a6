//! Breakpoint Manager: snapshots a run that stopped early into a portable, resumable bundle.
//!
//! A bundle is a directory holding the breakpoint descriptor, a copy of the signing account's
//! credentials and a full copy of the ledger daemon's local state. It is assembled under a
//! `.partial` name and renamed into place, then archived next to itself as `<dir>.tar.gz`.

use bytes::Bytes;
use evmload_ledger::{ExecutionOutcome, FunctionCall, LedgerClient, credentials::AccountCredentials};
use flate2::{Compression, write::GzEncoder};
use fs_extra::dir::CopyOptions;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

use crate::{
    call::{BreakSignal, Method},
    config::Position,
    errors::ReplayError,
    networks::Network,
};

pub const BREAKPOINT_FILE: &str = "breakpoint.json";
pub const CREDENTIALS_FILE: &str = "credentials.json";
pub const LEDGER_STATE_DIR: &str = "ledger-state";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub chain_id: u64,
    pub account_id: String,
    /// Commit of the ledger daemon the snapshot was taken with.
    pub ledger_revision: String,
    /// Commit of the EVM engine under test.
    pub engine_revision: String,
    pub position: Position,
    /// Hex encoded wire bytes of the transaction the run stopped before.
    pub transaction: Option<String>,
}

impl Breakpoint {
    pub fn new(
        chain_id: u64,
        account_id: &str,
        ledger_revision: String,
        engine_revision: String,
        signal: &BreakSignal,
    ) -> Self {
        Self {
            chain_id,
            account_id: account_id.to_string(),
            ledger_revision,
            engine_revision,
            position: signal.position,
            transaction: signal.trigger.as_ref().map(|tx| tx.raw_hex()),
        }
    }

    pub fn load(bundle_dir: &Path) -> Result<Self, ReplayError> {
        let path = bundle_dir.join(BREAKPOINT_FILE);
        let data = fs::read_to_string(&path).map_err(|err| {
            ReplayError::Bundle(format!("cannot read {}: {err}", path.display()))
        })?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn trigger_bytes(&self) -> Result<Option<Bytes>, ReplayError> {
        self.transaction
            .as_deref()
            .map(|hex_tx| {
                hex::decode(hex_tx.trim_start_matches("0x"))
                    .map(Bytes::from)
                    .map_err(|err| ReplayError::Bundle(format!("invalid trigger transaction: {err}")))
            })
            .transpose()
    }
}

/// Where bundles go and what they are made of.
#[derive(Debug, Clone)]
pub struct BundleSettings {
    pub output_dir: PathBuf,
    pub credentials: PathBuf,
    pub ledger_state: PathBuf,
    pub ledger_repo: Option<PathBuf>,
    pub engine_repo: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedBundle {
    pub dir: PathBuf,
    pub archive: Option<PathBuf>,
    /// Why archiving failed; the bundle directory is complete regardless.
    pub archive_error: Option<String>,
}

pub fn bundle_name(network: &Network, position: Position) -> String {
    match position.tx {
        Some(tx) => format!("{network}-breakpoint-block-{}-tx-{tx}", position.block),
        None => format!("{network}-breakpoint-block-{}-tx-none", position.block),
    }
}

/// Writes the bundle for `breakpoint` into `output_dir` and archives it.
pub fn save(
    output_dir: &Path,
    network: &Network,
    breakpoint: &Breakpoint,
    credentials: &Path,
    ledger_state: &Path,
) -> Result<SavedBundle, ReplayError> {
    AccountCredentials::load(credentials, &breakpoint.account_id)?;

    let name = bundle_name(network, breakpoint.position);
    let final_dir = output_dir.join(&name);
    if final_dir.exists() {
        return Err(ReplayError::BundleExists(final_dir));
    }

    let partial_dir = output_dir.join(format!("{name}.partial"));
    if partial_dir.exists() {
        warn!(path = %partial_dir.display(), "Removing leftover partial bundle");
        fs::remove_dir_all(&partial_dir)?;
    }
    fs::create_dir_all(&partial_dir)?;

    // 1. Descriptor
    let json = serde_json::to_string_pretty(breakpoint)?;
    fs::write(partial_dir.join(BREAKPOINT_FILE), json)?;

    // 2. Credentials
    fs::copy(credentials, partial_dir.join(CREDENTIALS_FILE)).map_err(|err| {
        ReplayError::Bundle(format!("cannot copy {}: {err}", credentials.display()))
    })?;

    // 3. Ledger local state
    copy_dir(ledger_state, &partial_dir.join(LEDGER_STATE_DIR))?;

    // 4. Publish
    fs::rename(&partial_dir, &final_dir)?;
    info!(path = %final_dir.display(), position = %breakpoint.position, "Saved breakpoint bundle");

    // 5. Archive
    let (archive, archive_error) = match archive(&final_dir) {
        Ok(path) => (Some(path), None),
        Err(err) => {
            warn!(path = %final_dir.display(), %err, "Failed to archive breakpoint bundle");
            (None, Some(err.to_string()))
        }
    };

    Ok(SavedBundle {
        dir: final_dir,
        archive,
        archive_error,
    })
}

/// Packs `dir` into `<dir>.tar.gz`, rooted at the directory name.
pub fn archive(dir: &Path) -> Result<PathBuf, ReplayError> {
    let name = dir
        .file_name()
        .ok_or_else(|| ReplayError::Bundle(format!("{} has no file name", dir.display())))?;
    let archive_path = dir.with_file_name(format!("{}.tar.gz", name.to_string_lossy()));

    let file = fs::File::create(&archive_path)?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.append_dir_all(name, dir)?;
    builder.into_inner()?.finish()?;
    Ok(archive_path)
}

/// Puts the bundle's ledger state and credentials back in place, replacing what is there.
pub fn restore_ledger_state(
    bundle_dir: &Path,
    ledger_state_dir: &Path,
    credentials_dst: &Path,
) -> Result<Breakpoint, ReplayError> {
    let breakpoint = Breakpoint::load(bundle_dir)?;
    let saved_state = bundle_dir.join(LEDGER_STATE_DIR);
    if !saved_state.is_dir() {
        return Err(ReplayError::Bundle(format!(
            "{} has no ledger state",
            bundle_dir.display()
        )));
    }

    if ledger_state_dir.exists() {
        warn!(path = %ledger_state_dir.display(), "Replacing ledger state");
        fs::remove_dir_all(ledger_state_dir)?;
    }
    copy_dir(&saved_state, ledger_state_dir)?;

    if let Some(parent) = credentials_dst.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(bundle_dir.join(CREDENTIALS_FILE), credentials_dst)?;

    info!(bundle = %bundle_dir.display(), position = %breakpoint.position, "Restored ledger state");
    Ok(breakpoint)
}

/// Submits the transaction the breakpoint stopped before, once.
pub async fn replay_trigger(
    client: &dyn LedgerClient,
    breakpoint: &Breakpoint,
    gas: u64,
) -> Result<ExecutionOutcome, ReplayError> {
    let raw = breakpoint.trigger_bytes()?.ok_or_else(|| {
        ReplayError::Bundle(format!(
            "breakpoint at {} has no trigger transaction",
            breakpoint.position
        ))
    })?;
    if client.account_id() != breakpoint.account_id {
        warn!(
            client = client.account_id(),
            breakpoint = %breakpoint.account_id,
            "Replaying with a different account than the one that saved the breakpoint"
        );
    }
    Ok(client
        .submit(FunctionCall::new(Method::Submit.as_str(), raw, gas))
        .await?)
}

fn copy_dir(from: &Path, to: &Path) -> Result<(), ReplayError> {
    fs::create_dir_all(to)?;
    let options = CopyOptions {
        overwrite: true,
        content_only: true,
        ..CopyOptions::new()
    };
    fs_extra::dir::copy(from, to, &options).map_err(|err| {
        ReplayError::Bundle(format!(
            "cannot copy {} to {}: {err}",
            from.display(),
            to.display()
        ))
    })?;
    Ok(())
}
