use directories::{BaseDirs, ProjectDirs};
use evmload_common::types::Genesis;
use evmload_ledger::{credentials::credentials_path, rpc::RpcLedgerClient};
use evmload_replayer::{ChainLocation, Network, ReplayError, locate};
use evmload_storage::{EngineType, Store};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, Layer, Registry, filter::Directive, fmt, layer::SubscriberExt};

use crate::cli::{ChainOptions, LedgerOptions, Options};

pub const PROJECT_NAME: &str = "evmload";
pub const DUMP_FILE: &str = "chain.dump";
pub const GENESIS_FILE: &str = "genesis.json";

pub fn init_tracing(opts: &Options) {
    let log_filter = EnvFilter::builder()
        .with_default_directive(Directive::from(opts.log_level))
        .from_env_lossy();
    let subscriber = Registry::default().with(fmt::layer().with_filter(log_filter));

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {err}");
    }
}

fn project_dirs() -> Result<ProjectDirs, ReplayError> {
    ProjectDirs::from("", "", PROJECT_NAME)
        .ok_or_else(|| ReplayError::InvalidArgument("couldn't find home directory".to_string()))
}

/// `<datadir>/<network>`, where chain data and genesis of a network live by default.
pub fn network_dir(opts: &ChainOptions, network: &Network) -> Result<PathBuf, ReplayError> {
    let datadir = match &opts.datadir {
        Some(datadir) => datadir.clone(),
        None => project_dirs()?.data_local_dir().to_path_buf(),
    };
    Ok(datadir.join(network.to_string()))
}

pub fn cache_dir(opts: &ChainOptions, network: &Network) -> Result<PathBuf, ReplayError> {
    match &opts.cache_dir {
        Some(cache_dir) => Ok(cache_dir.clone()),
        None => Ok(project_dirs()?.config_dir().join(network.to_string())),
    }
}

/// The dump file holding the local chain data.
pub fn dump_path(opts: &ChainOptions, network: &Network) -> Result<PathBuf, ReplayError> {
    match &opts.dump {
        Some(path) => Ok(path.clone()),
        None => Ok(network_dir(opts, network)?.join(DUMP_FILE)),
    }
}

pub fn open_store(path: &Path) -> Result<Store, ReplayError> {
    info!(path = %path.display(), "Opening chain data");
    Ok(Store::new(path, EngineType::Dump)?)
}

pub fn load_genesis(opts: &ChainOptions, network: &Network) -> Result<Genesis, ReplayError> {
    let path = match &opts.genesis {
        Some(path) => path.clone(),
        None => network_dir(opts, network)?.join(GENESIS_FILE),
    };
    let genesis = Genesis::try_from(path.as_path()).map_err(|err| {
        ReplayError::InvalidArgument(format!("cannot load genesis {}: {err}", path.display()))
    })?;
    if genesis.chain_id() != network.chain_id() {
        warn!(
            genesis = genesis.chain_id(),
            network = network.chain_id(),
            "Genesis chain id does not match the network"
        );
    }
    Ok(genesis)
}

/// Runs chain I/O on the blocking pool so it never stalls the async workers.
pub async fn run_blocking<T, F>(task: &'static str, f: F) -> Result<T, ReplayError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ReplayError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| ReplayError::Internal(format!("{task} panicked: {err}")))?
}

/// Opens the store and resolves the chain up to the requested target.
///
/// Loading the dump, waiting for the cache lock and walking the chain all block.
pub async fn locate_chain(
    opts: &ChainOptions,
    network: Network,
) -> Result<(Store, ChainLocation), ReplayError> {
    let target = network.resolve_target(opts.block, opts.hash)?;
    let dump = dump_path(opts, &network)?;
    let cache_dir = cache_dir(opts, &network)?;
    run_blocking("chain locator", move || {
        let store = open_store(&dump)?;
        let location = locate(&store, &cache_dir, target.height, target.hash)?;
        Ok((store, location))
    })
    .await
}

pub fn init_ledger_client(
    opts: &LedgerOptions,
    account_id: &str,
) -> Result<RpcLedgerClient, ReplayError> {
    info!(endpoint = %opts.endpoint, account = account_id, contract = %opts.contract, "Connecting to ledger");
    Ok(RpcLedgerClient::new(
        &opts.endpoint,
        account_id,
        &opts.contract,
    )?)
}

fn home_dir() -> Result<PathBuf, ReplayError> {
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .ok_or_else(|| ReplayError::InvalidArgument("couldn't find home directory".to_string()))
}

/// Key file of `account_id`, unless overridden on the command line.
pub fn credentials_file(opts: &LedgerOptions, account_id: &str) -> Result<PathBuf, ReplayError> {
    match &opts.credentials {
        Some(path) => Ok(path.clone()),
        None => Ok(credentials_path(&home_dir()?, &opts.ledger_network, account_id)),
    }
}

/// Working directory of the local ledger daemon.
pub fn ledger_state_dir(opts: &LedgerOptions) -> Result<PathBuf, ReplayError> {
    match &opts.ledger_state {
        Some(path) => Ok(path.clone()),
        None => Ok(home_dir()?.join(".near")),
    }
}

pub fn display_path(path: &Path) -> String {
    path.canonicalize()
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}
