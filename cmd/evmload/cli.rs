use std::{path::PathBuf, sync::Arc};

use clap::{ArgAction, Parser as ClapParser, Subcommand as ClapSubcommand};
use ethereum_types::H256;
use evmload_replayer::{
    Network, Position, ReplayConfig, ReplayError, ReplayOptions, Replayer, RunReport,
    breakpoint::{self, Breakpoint, BundleSettings},
    config::DEFAULT_GAS,
    stats,
};
use evmload_storage::dump;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};

use crate::initializers::{
    credentials_file, display_path, init_ledger_client, ledger_state_dir, load_genesis,
    locate_chain, run_blocking,
};

pub const VERSION_STRING: &str = env!("CARGO_PKG_VERSION");

#[allow(clippy::upper_case_acronyms)]
#[derive(ClapParser)]
#[command(name = "evmload", author, version = VERSION_STRING, about = "Replays an Ethereum chain against an EVM hosted on a remote ledger", long_about = None)]
pub struct CLI {
    #[command(flatten)]
    pub opts: Options,
    #[command(subcommand)]
    pub command: Subcommand,
}

#[derive(ClapParser)]
pub struct Options {
    #[arg(long = "log.level", default_value_t = Level::INFO, value_name = "LOG_LEVEL", global = true)]
    pub log_level: Level,
}

/// Where the local chain comes from and how far to replay it.
#[derive(ClapParser, Debug)]
pub struct ChainOptions {
    #[arg(
        long = "network",
        default_value = "goerli",
        value_name = "NETWORK",
        env = "EVMLOAD_NETWORK",
        help = "One of goerli, rinkeby or ropsten",
        help_heading = "Chain options"
    )]
    pub network: Network,
    #[arg(
        long = "chain-id",
        value_name = "CHAIN_ID",
        env = "EVMLOAD_CHAIN_ID",
        help = "Replay a chain that is not a known network",
        help_heading = "Chain options"
    )]
    pub chain_id: Option<u64>,
    #[arg(
        long = "block",
        value_name = "HEIGHT",
        requires = "hash",
        help = "Height of the last block to replay, defaults to the network target",
        help_heading = "Chain options"
    )]
    pub block: Option<u64>,
    #[arg(
        long = "hash",
        value_name = "HASH",
        value_parser = parse_hash,
        requires = "block",
        help_heading = "Chain options"
    )]
    pub hash: Option<H256>,
    #[arg(
        long = "datadir",
        value_name = "DATA_DIRECTORY",
        env = "EVMLOAD_DATADIR",
        help = "Holds <network>/chain.dump and <network>/genesis.json",
        help_heading = "Chain options"
    )]
    pub datadir: Option<PathBuf>,
    #[arg(long = "dump", value_name = "DUMP_FILE", help_heading = "Chain options")]
    pub dump: Option<PathBuf>,
    #[arg(long = "genesis", value_name = "GENESIS_FILE", help_heading = "Chain options")]
    pub genesis: Option<PathBuf>,
    #[arg(
        long = "cache-dir",
        value_name = "CACHE_DIRECTORY",
        env = "EVMLOAD_CACHE_DIR",
        help_heading = "Chain options"
    )]
    pub cache_dir: Option<PathBuf>,
}

impl ChainOptions {
    pub fn network(&self) -> Network {
        self.chain_id
            .map_or(self.network, Network::from_chain_id)
    }
}

/// How to reach the remote ledger and where its local files live.
#[derive(ClapParser, Debug)]
pub struct LedgerOptions {
    #[arg(
        long = "endpoint",
        default_value = "http://localhost:3030",
        value_name = "URL",
        env = "EVMLOAD_ENDPOINT",
        help_heading = "Ledger options"
    )]
    pub endpoint: String,
    #[arg(
        long = "account",
        value_name = "ACCOUNT_ID",
        env = "EVMLOAD_ACCOUNT",
        help = "Signing account",
        help_heading = "Ledger options"
    )]
    pub account: Option<String>,
    #[arg(
        long = "contract",
        default_value = "evm",
        value_name = "ACCOUNT_ID",
        env = "EVMLOAD_CONTRACT",
        help = "Account hosting the EVM",
        help_heading = "Ledger options"
    )]
    pub contract: String,
    #[arg(
        long = "ledger-network",
        default_value = "local",
        value_name = "NAME",
        help_heading = "Ledger options"
    )]
    pub ledger_network: String,
    #[arg(
        long = "credentials",
        value_name = "KEY_FILE",
        env = "EVMLOAD_CREDENTIALS",
        help = "Defaults to ~/.near-credentials/<ledger-network>/<account>.json",
        help_heading = "Ledger options"
    )]
    pub credentials: Option<PathBuf>,
    #[arg(
        long = "ledger-state",
        value_name = "DIRECTORY",
        env = "EVMLOAD_LEDGER_STATE",
        help = "Local state of the ledger daemon, defaults to ~/.near",
        help_heading = "Ledger options"
    )]
    pub ledger_state: Option<PathBuf>,
}

#[derive(ClapParser, Debug)]
pub struct RunOptions {
    #[arg(
        long = "gas",
        default_value_t = DEFAULT_GAS,
        value_name = "GAS",
        env = "EVMLOAD_GAS",
        help = "Gas budget of every remote transaction",
        help_heading = "Run options"
    )]
    pub gas: u64,
    #[arg(long = "batch", action = ArgAction::SetTrue, help = "Batch calls into one remote transaction", help_heading = "Run options")]
    pub batch: bool,
    #[arg(
        long = "batch-size",
        default_value_t = 10,
        value_name = "CALLS",
        help_heading = "Run options"
    )]
    pub batch_size: usize,
    #[arg(long = "skip-empty", action = ArgAction::SetTrue, help = "Do not submit empty blocks", help_heading = "Run options")]
    pub skip_empty: bool,
    #[arg(long = "start-block", value_name = "HEIGHT", help_heading = "Run options")]
    pub start_block: Option<u64>,
    #[arg(
        long = "start-tx",
        value_name = "INDEX",
        requires = "start_block",
        help_heading = "Run options"
    )]
    pub start_tx: Option<usize>,
    #[arg(long = "break-block", value_name = "HEIGHT", help_heading = "Run options")]
    pub break_block: Option<u64>,
    #[arg(
        long = "break-tx",
        value_name = "INDEX",
        requires = "break_block",
        help_heading = "Run options"
    )]
    pub break_tx: Option<usize>,
    #[arg(long = "autobreak", action = ArgAction::SetTrue, help = "Save a breakpoint before the first failing call", help_heading = "Run options")]
    pub autobreak: bool,
    #[arg(
        long = "breakpoint-dir",
        default_value = ".",
        value_name = "DIRECTORY",
        env = "EVMLOAD_BREAKPOINT_DIR",
        help_heading = "Breakpoint options"
    )]
    pub breakpoint_dir: PathBuf,
    #[arg(
        long = "ledger-repo",
        value_name = "GIT_DIRECTORY",
        help = "Checkout of the ledger daemon, pinned in breakpoints",
        help_heading = "Breakpoint options"
    )]
    pub ledger_repo: Option<PathBuf>,
    #[arg(
        long = "engine-repo",
        value_name = "GIT_DIRECTORY",
        help = "Checkout of the EVM engine, pinned in breakpoints",
        help_heading = "Breakpoint options"
    )]
    pub engine_repo: Option<PathBuf>,
}

impl RunOptions {
    pub fn replay_config(&self) -> Result<ReplayConfig, ReplayError> {
        ReplayConfig::new(ReplayOptions {
            gas: self.gas,
            batch_size: self.batch.then_some(self.batch_size),
            skip_empty: self.skip_empty,
            start: self.start_block.map(|block| Position {
                block,
                tx: self.start_tx,
            }),
            break_at: self.break_block.map(|block| Position {
                block,
                tx: self.break_tx,
            }),
            autobreak: self.autobreak,
        })
    }
}

#[derive(ClapSubcommand)]
pub enum Subcommand {
    #[command(name = "replay", about = "Replay the local chain against the remote ledger")]
    Replay {
        #[command(flatten)]
        chain: ChainOptions,
        #[command(flatten)]
        ledger: LedgerOptions,
        #[command(flatten)]
        run: RunOptions,
    },
    #[command(
        name = "replay-tx",
        about = "Restore a breakpoint bundle and resubmit its transaction"
    )]
    ReplayTx {
        #[arg(required = true, value_name = "BUNDLE_DIR")]
        bundle: PathBuf,
        #[command(flatten)]
        ledger: LedgerOptions,
        #[arg(long = "gas", default_value_t = DEFAULT_GAS, value_name = "GAS")]
        gas: u64,
    },
    #[command(name = "stats", about = "Print statistics of the chain up to the target")]
    Stats {
        #[command(flatten)]
        chain: ChainOptions,
    },
    #[command(name = "genesis", about = "Print the genesis accounts in address order")]
    Genesis {
        #[command(flatten)]
        chain: ChainOptions,
    },
    #[command(name = "dump", about = "Export the chain up to the target to a new dump file")]
    Dump {
        #[command(flatten)]
        chain: ChainOptions,
        #[arg(long = "out", required = true, value_name = "DUMP_FILE")]
        out: PathBuf,
    },
}

impl Subcommand {
    pub async fn run(self) -> eyre::Result<()> {
        match self {
            Subcommand::Replay { chain, ledger, run } => replay(chain, ledger, run).await?,
            Subcommand::ReplayTx {
                bundle,
                ledger,
                gas,
            } => replay_tx(bundle, ledger, gas).await?,
            Subcommand::Stats { chain } => {
                let network = chain.network();
                let (store, location) = locate_chain(&chain, network).await?;
                let target = location.target_height();
                let stats =
                    run_blocking("chain stats", move || stats::collect(&store, &location)).await?;
                println!("network:            {network}");
                println!("target:             {target}");
                println!("blocks:             {}", stats.blocks);
                println!("empty blocks:       {}", stats.empty_blocks);
                println!("transactions:       {}", stats.total_txs);
                println!("contract creations: {}", stats.contract_creations);
                println!(
                    "creation ratio:     {:.4}",
                    stats.contract_creation_ratio()
                );
            }
            Subcommand::Genesis { chain } => {
                let network = chain.network();
                let genesis = load_genesis(&chain, &network)?;
                println!("chain id {}", genesis.chain_id());
                for (address, balance) in genesis.sorted_accounts() {
                    println!("{address:#x} {balance}");
                }
            }
            Subcommand::Dump { chain, out } => {
                let network = chain.network();
                let (store, location) = locate_chain(&chain, network).await?;
                let path = out.clone();
                let written = run_blocking("chain dump", move || {
                    Ok(dump::write_dump(&store, location.hashes(), &path)?)
                })
                .await?;
                info!(blocks = written, path = %display_path(&out), "Wrote chain dump");
            }
        }
        Ok(())
    }
}

async fn replay(chain: ChainOptions, ledger: LedgerOptions, run: RunOptions) -> eyre::Result<()> {
    // Configuration errors surface before any chain data is read.
    let config = run.replay_config()?;
    let account_id = ledger.account.clone().ok_or_else(|| {
        ReplayError::InvalidArgument("--account is required to replay".to_string())
    })?;
    let network = chain.network();

    let genesis = load_genesis(&chain, &network)?;
    let (store, location) = locate_chain(&chain, network).await?;
    let client = init_ledger_client(&ledger, &account_id)?;
    let settings = BundleSettings {
        output_dir: run.breakpoint_dir.clone(),
        credentials: credentials_file(&ledger, &account_id)?,
        ledger_state: ledger_state_dir(&ledger)?,
        ledger_repo: run.ledger_repo.clone(),
        engine_repo: run.engine_repo.clone(),
    };
    let replayer =
        Replayer::new(store, location, genesis, network, Arc::new(client)).with_bundle_settings(settings);

    let cancel = CancellationToken::new();
    let signal_handler = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, stopping replay");
                cancel.cancel();
            }
        }
    });
    let report = replayer.run(&config, cancel).await;
    signal_handler.abort();

    print_report(&report?);
    Ok(())
}

fn print_report(report: &RunReport) {
    info!(
        state = ?report.state,
        calls = report.calls_submitted,
        batches = report.batches_submitted,
        skipped_blocks = report.skipped_blocks,
        "Replay finished"
    );
    if let Some(position) = report.autobreak_from {
        warn!(%position, "Submission failed, replayed up to the failing call");
    }
    if let Some(position) = report.break_position {
        println!("stopped before {position}");
    }
    if let Some(saved) = &report.breakpoint {
        println!("breakpoint saved to {}", display_path(&saved.dir));
        match (&saved.archive, &saved.archive_error) {
            (Some(archive), _) => println!("archive: {}", display_path(archive)),
            (None, Some(err)) => println!("archive failed: {err}"),
            (None, None) => {}
        }
    }
}

async fn replay_tx(bundle: PathBuf, ledger: LedgerOptions, gas: u64) -> eyre::Result<()> {
    let saved = Breakpoint::load(&bundle)?;
    let account_id = ledger
        .account
        .clone()
        .unwrap_or_else(|| saved.account_id.clone());

    let breakpoint = breakpoint::restore_ledger_state(
        &bundle,
        &ledger_state_dir(&ledger)?,
        &credentials_file(&ledger, &account_id)?,
    )?;
    info!(
        ledger = %breakpoint.ledger_revision,
        engine = %breakpoint.engine_revision,
        "Start the ledger daemon at the pinned revisions before resubmitting"
    );

    let client = init_ledger_client(&ledger, &account_id)?;
    let outcome = breakpoint::replay_trigger(&client, &breakpoint, gas).await?;
    match outcome.failure_payload() {
        None => println!(
            "transaction at {} succeeded, gas burnt {}",
            breakpoint.position, outcome.gas_burnt
        ),
        Some(payload) => println!(
            "transaction at {} failed, gas burnt {}: {payload}",
            breakpoint.position, outcome.gas_burnt
        ),
    }
    Ok(())
}

fn parse_hash(value: &str) -> Result<H256, String> {
    let bytes = hex::decode(value.trim_start_matches("0x")).map_err(|err| err.to_string())?;
    if bytes.len() != H256::len_bytes() {
        return Err(format!("expected 32 bytes, got {}", bytes.len()));
    }
    Ok(H256::from_slice(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CLI {
        CLI::try_parse_from(std::iter::once("evmload").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn replay_flags_build_a_config() {
        let CLI { command, .. } = parse(&[
            "replay",
            "--account",
            "replayer.test.near",
            "--batch",
            "--batch-size",
            "4",
            "--skip-empty",
            "--break-block",
            "12",
            "--break-tx",
            "3",
        ]);
        let Subcommand::Replay { chain, ledger, run } = command else {
            panic!("expected replay");
        };
        assert_eq!(chain.network(), Network::Goerli);
        assert_eq!(ledger.account.as_deref(), Some("replayer.test.near"));

        let config = run.replay_config().unwrap();
        assert_eq!(config.batch_size(), Some(4));
        assert!(config.skip_empty());
        assert_eq!(config.break_at(), Some(Position::tx(12, 3)));
        assert_eq!(config.gas_per_call(), DEFAULT_GAS / 4);
    }

    #[test]
    fn conflicting_positions_are_config_errors() {
        let CLI { command, .. } = parse(&[
            "replay",
            "--autobreak",
            "--start-block",
            "3",
        ]);
        let Subcommand::Replay { run, .. } = command else {
            panic!("expected replay");
        };
        let err = run.replay_config().unwrap_err();
        assert_eq!(err.error_code(), "config/conflict");
        assert_eq!(err.exit_code(), 10);
    }

    #[test]
    fn chain_id_selects_the_network() {
        let CLI { command, .. } = parse(&["stats", "--chain-id", "4"]);
        let Subcommand::Stats { chain } = command else {
            panic!("expected stats");
        };
        assert_eq!(chain.network(), Network::Rinkeby);

        let CLI { command, .. } = parse(&["stats", "--chain-id", "1337"]);
        let Subcommand::Stats { chain } = command else {
            panic!("expected stats");
        };
        assert_eq!(chain.network(), Network::Custom { chain_id: 1337 });
    }

    #[test]
    fn block_and_hash_go_together() {
        assert!(CLI::try_parse_from(["evmload", "stats", "--block", "10"]).is_err());

        let hash = format!("0x{}", "ab".repeat(32));
        let CLI { command, .. } = parse(&["stats", "--block", "10", "--hash", &hash]);
        let Subcommand::Stats { chain } = command else {
            panic!("expected stats");
        };
        assert_eq!(chain.block, Some(10));
        assert_eq!(chain.hash, Some(H256::repeat_byte(0xab)));
    }

    #[test]
    fn hashes_must_be_32_bytes() {
        assert!(parse_hash("0xabcd").is_err());
        assert!(parse_hash("zz").is_err());
    }
}
