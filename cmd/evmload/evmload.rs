use clap::Parser;
use evmload_replayer::ReplayError;
use tracing::error;

mod cli;
mod initializers;

use cli::CLI;
use initializers::init_tracing;

/// Exit code for failures outside the replay error taxonomy.
const GENERIC_FAILURE: i32 = 1;

#[tokio::main]
async fn main() {
    let CLI { opts, command } = CLI::parse();
    init_tracing(&opts);

    if let Err(err) = command.run().await {
        std::process::exit(report_failure(&err));
    }
}

/// Prints the failure with its typed code and positional context, returning the exit code.
fn report_failure(err: &eyre::Report) -> i32 {
    let Some(replay_err) = err.downcast_ref::<ReplayError>() else {
        error!("{err:?}");
        return GENERIC_FAILURE;
    };
    error!(code = replay_err.error_code(), "{replay_err}");
    if let Some(diagnostic) = replay_err.diagnostic() {
        eprintln!("offending transaction:\n{diagnostic}");
    }
    replay_err.exit_code()
}
