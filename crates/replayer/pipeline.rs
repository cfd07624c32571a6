//! Pipeline orchestration: one producer (call generation) feeding one consumer (submission)
//! through a bounded queue, plus the single autobreak retry.

use evmload_common::types::Genesis;
use evmload_ledger::LedgerClient;
use evmload_storage::Store;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    breakpoint::{self, Breakpoint, BundleSettings, SavedBundle},
    call::BreakSignal,
    config::{Position, ReplayConfig},
    engine::{PassOutcome, SubmissionEngine, SubmissionStats},
    errors::ReplayError,
    generator::CallGenerator,
    locator::ChainLocation,
    networks::Network,
    revision,
    source::BlockSource,
    state::RunState,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub state: RunState,
    pub calls_submitted: u64,
    pub batches_submitted: u64,
    pub skipped_blocks: u64,
    /// Failure that triggered the automatic retry.
    pub autobreak_from: Option<Position>,
    /// Where the run stopped, for broken runs.
    pub break_position: Option<Position>,
    pub breakpoint: Option<SavedBundle>,
}

/// Everything a replay run needs besides its [`ReplayConfig`].
pub struct Replayer {
    store: Store,
    location: ChainLocation,
    genesis: Arc<Genesis>,
    network: Network,
    client: Arc<dyn LedgerClient>,
    bundle: Option<BundleSettings>,
}

impl Replayer {
    pub fn new(
        store: Store,
        location: ChainLocation,
        genesis: Genesis,
        network: Network,
        client: Arc<dyn LedgerClient>,
    ) -> Self {
        Self {
            store,
            location,
            genesis: Arc::new(genesis),
            network,
            client,
            bundle: None,
        }
    }

    /// Without bundle settings, broken runs are reported but no bundle is written.
    pub fn with_bundle_settings(mut self, settings: BundleSettings) -> Self {
        self.bundle = Some(settings);
        self
    }

    pub fn location(&self) -> &ChainLocation {
        &self.location
    }

    /// Replays the chain under `config` until completion, a break, or a failure.
    ///
    /// With autobreak, the first failure at a block position triggers exactly one rerun that
    /// stops before the failing call and saves a breakpoint.
    pub async fn run(
        &self,
        config: &ReplayConfig,
        cancel: CancellationToken,
    ) -> Result<RunReport, ReplayError> {
        let mut state = RunState::Running;
        let mut config = config.clone();
        let mut totals = SubmissionStats::default();
        let mut autobreak_from = None;

        loop {
            info!(
                network = %self.network,
                target = self.location.target_height(),
                batch_size = ?config.batch_size(),
                start = ?config.start(),
                break_at = ?config.break_at(),
                "Starting replay pass"
            );
            let (outcome, stats, skipped_blocks) = self.run_pass(&config, &cancel).await?;
            totals.calls_submitted += stats.calls_submitted;
            totals.batches_submitted += stats.batches_submitted;

            let report = |state: RunState,
                          break_position: Option<Position>,
                          breakpoint: Option<SavedBundle>| RunReport {
                state,
                calls_submitted: totals.calls_submitted,
                batches_submitted: totals.batches_submitted,
                skipped_blocks,
                autobreak_from,
                break_position,
                breakpoint,
            };

            match outcome {
                PassOutcome::Completed => {
                    state = state.transition_to(RunState::Completed)?;
                    info!(calls = totals.calls_submitted, "Replay completed");
                    return Ok(report(state, None, None));
                }
                PassOutcome::Broken(signal) => {
                    state = state.transition_to(RunState::BrokenExplicit)?;
                    info!(position = %signal.position, "Replay stopped at break position");
                    let saved = self.save_breakpoint(&signal)?;
                    return Ok(report(state, Some(signal.position), saved));
                }
                PassOutcome::Failed(failure) => match failure.position() {
                    Some(position) if config.autobreak() => {
                        state = state.transition_to(RunState::BrokenAuto)?;
                        warn!(%position, error = %failure.error, "Submission failed, replaying up to the failure");
                        autobreak_from = Some(position);
                        config = config.autobreak_retry(position);
                        state = state.transition_to(RunState::Running)?;
                    }
                    _ => {
                        state = state.transition_to(RunState::Failed)?;
                        error!(?state, error = %failure.error, "Replay failed");
                        return Err(failure.error);
                    }
                },
            }
        }
    }

    async fn run_pass(
        &self,
        config: &ReplayConfig,
        cancel: &CancellationToken,
    ) -> Result<(PassOutcome, SubmissionStats, u64), ReplayError> {
        let (sender, mut receiver) = mpsc::channel(config.queue_capacity());
        let source = BlockSource::new(
            self.store.clone(),
            self.location.clone(),
            config.skip_empty(),
        );
        let mut generator = CallGenerator::new(
            source,
            self.network.chain_id(),
            self.genesis.clone(),
            config,
        );

        let producer_cancel = cancel.clone();
        let producer = tokio::task::spawn_blocking(move || {
            for event in generator.by_ref() {
                if producer_cancel.is_cancelled() {
                    debug!("Call generation canceled");
                    break;
                }
                // Fails only once the consumer has stopped reading.
                if sender.blocking_send(event).is_err() {
                    break;
                }
            }
            generator.skipped_blocks()
        });

        let mut engine = SubmissionEngine::new(self.client.as_ref(), config);
        let outcome = engine.drain(&mut receiver, cancel).await;
        drop(receiver);

        let skipped = producer
            .await
            .map_err(|err| ReplayError::Internal(format!("call generator panicked: {err}")))?;
        Ok((outcome?, engine.stats(), skipped))
    }

    fn save_breakpoint(&self, signal: &BreakSignal) -> Result<Option<SavedBundle>, ReplayError> {
        let Some(settings) = &self.bundle else {
            warn!(position = %signal.position, "No bundle settings, breakpoint not saved");
            return Ok(None);
        };
        let breakpoint = Breakpoint::new(
            self.network.chain_id(),
            self.client.account_id(),
            revision::resolve(settings.ledger_repo.as_deref())?,
            revision::resolve(settings.engine_repo.as_deref())?,
            signal,
        );
        breakpoint::save(
            &settings.output_dir,
            &self.network,
            &breakpoint,
            &settings.credentials,
            &settings.ledger_state,
        )
        .map(Some)
    }
}
