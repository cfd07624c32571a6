//! Submission Engine: drains the call queue into the remote ledger.

use bytes::Bytes;
use evmload_common::types::Transaction;
use evmload_ledger::{ExecutionOutcome, FunctionCall, LedgerClient, LedgerError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    call::{BreakSignal, CallKind, GeneratorEvent, Method},
    config::{Position, ReplayConfig},
    errors::ReplayError,
};

/// How one pass over the call queue ended.
#[derive(Debug)]
pub enum PassOutcome {
    Completed,
    Broken(BreakSignal),
    Failed(SubmissionFailure),
}

/// A remote submission that did not succeed.
#[derive(Debug)]
pub struct SubmissionFailure {
    /// Position of the failing call, or of the first call of a failing batch.
    pub block: Option<u64>,
    pub tx: Option<usize>,
    /// Always a [`ReplayError::RemoteSubmission`].
    pub error: ReplayError,
}

impl SubmissionFailure {
    /// `None` when the failure happened before any block was replayed.
    pub fn position(&self) -> Option<Position> {
        self.block.map(|block| Position {
            block,
            tx: self.tx,
        })
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionStats {
    /// Remote calls sent, batched or not.
    pub calls_submitted: u64,
    /// Batched transactions sent; zero when batching is off.
    pub batches_submitted: u64,
}

struct PendingCall {
    block: Option<u64>,
    tx: Option<usize>,
    call: FunctionCall,
}

pub struct SubmissionEngine<'a> {
    client: &'a dyn LedgerClient,
    gas_per_call: u64,
    batch_size: Option<usize>,
    batch: Vec<PendingCall>,
    stats: SubmissionStats,
}

impl<'a> SubmissionEngine<'a> {
    pub fn new(client: &'a dyn LedgerClient, config: &ReplayConfig) -> Self {
        Self {
            client,
            gas_per_call: config.gas_per_call(),
            batch_size: config.batch_size(),
            batch: Vec::with_capacity(config.batch_size().unwrap_or(0)),
            stats: SubmissionStats::default(),
        }
    }

    pub fn stats(&self) -> SubmissionStats {
        self.stats
    }

    /// Consumes events until the queue closes, a break is reached, or a submission fails.
    ///
    /// Remote failures are returned as [`PassOutcome::Failed`] so the caller can decide whether
    /// to retry; generation faults and cancellation are errors.
    pub async fn drain(
        &mut self,
        queue: &mut mpsc::Receiver<GeneratorEvent>,
        cancel: &CancellationToken,
    ) -> Result<PassOutcome, ReplayError> {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ReplayError::Canceled),
                event = queue.recv() => event,
            };

            let Some(event) = event else {
                // The producer also closes the queue when it observes cancellation.
                if cancel.is_cancelled() {
                    return Err(ReplayError::Canceled);
                }
                return Ok(match self.flush().await {
                    Some(failure) => PassOutcome::Failed(failure),
                    None => PassOutcome::Completed,
                });
            };

            match event {
                GeneratorEvent::Call(call) => match call.kind {
                    CallKind::Comment => info!("{}", call.comment),
                    CallKind::Remote {
                        method,
                        args,
                        source_tx,
                    } => {
                        debug!(block = ?call.block, tx = ?call.tx, %method, "{}", call.comment);
                        let failure = match self.batch_size {
                            None => {
                                self.submit_single(call.block, call.tx, method, args, source_tx)
                                    .await
                            }
                            Some(batch_size) => {
                                self.batch.push(PendingCall {
                                    block: call.block,
                                    tx: call.tx,
                                    call: FunctionCall::new(
                                        method.as_str(),
                                        args,
                                        self.gas_per_call,
                                    ),
                                });
                                if self.batch.len() >= batch_size {
                                    self.flush().await
                                } else {
                                    None
                                }
                            }
                        };
                        if let Some(failure) = failure {
                            return Ok(PassOutcome::Failed(failure));
                        }
                    }
                },
                GeneratorEvent::Break(signal) => {
                    // Everything before the break position must reach the ledger.
                    if let Some(failure) = self.flush().await {
                        return Ok(PassOutcome::Failed(failure));
                    }
                    return Ok(PassOutcome::Broken(signal));
                }
                GeneratorEvent::Fault { block, tx, error } => {
                    return Err(ReplayError::Aborted {
                        block,
                        tx,
                        source: Box::new(error),
                    });
                }
            }
        }
    }

    async fn submit_single(
        &mut self,
        block: Option<u64>,
        tx: Option<usize>,
        method: Method,
        args: Bytes,
        source_tx: Option<Transaction>,
    ) -> Option<SubmissionFailure> {
        let call = FunctionCall::new(method.as_str(), args, self.gas_per_call);
        let result = self.client.submit(call).await;
        self.stats.calls_submitted += 1;

        let reason = failure_reason(result)?;
        warn!(block = ?block, tx = ?tx, %method, %reason, "Submission failed");
        Some(SubmissionFailure {
            block,
            tx,
            error: ReplayError::RemoteSubmission {
                block,
                tx,
                method: method.to_string(),
                reason,
                diagnostic: source_tx.as_ref().map(Transaction::describe),
            },
        })
    }

    /// Sends the pending batch, if any.
    async fn flush(&mut self) -> Option<SubmissionFailure> {
        if self.batch.is_empty() {
            return None;
        }
        let pending = std::mem::take(&mut self.batch);
        // begin_chain has no position; blame the first call that has one.
        let (block, tx) = pending
            .iter()
            .find(|pending| pending.block.is_some())
            .map_or((None, None), |pending| (pending.block, pending.tx));
        let size = pending.len();
        let first_method = pending
            .first()
            .map(|pending| pending.call.method_name.clone())
            .unwrap_or_default();
        let calls: Vec<FunctionCall> = pending.into_iter().map(|pending| pending.call).collect();

        debug!(block = ?block, tx = ?tx, size, "Submitting batch");
        let result = self.client.submit_batch(calls).await;
        self.stats.batches_submitted += 1;
        self.stats.calls_submitted += size as u64;

        let reason = failure_reason(result)?;
        warn!(block = ?block, tx = ?tx, size, %reason, "Batch submission failed");
        Some(SubmissionFailure {
            block,
            tx,
            error: ReplayError::RemoteSubmission {
                block,
                tx,
                method: format!("batch of {size} calls starting with {first_method}"),
                reason,
                // A batch failure cannot be pinned to one transaction.
                diagnostic: None,
            },
        })
    }
}

/// `None` when the ledger executed the submission successfully.
fn failure_reason(result: Result<ExecutionOutcome, LedgerError>) -> Option<String> {
    match result {
        Ok(outcome) => outcome.failure_payload().map(ToString::to_string),
        Err(err) => Some(err.to_string()),
    }
}
