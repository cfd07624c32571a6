use async_trait::async_trait;

use crate::{FunctionCall, errors::LedgerError, outcome::ExecutionOutcome};

/// Submission interface of the remote ledger.
///
/// An `Ok` result means the ledger answered; whether the call itself succeeded is carried by
/// [`ExecutionOutcome::status`]. `Err` is reserved for transport or protocol failures.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Account that signs and pays for submissions.
    fn account_id(&self) -> &str;

    /// Account hosting the EVM contract.
    fn contract_id(&self) -> &str;

    async fn submit(&self, call: FunctionCall) -> Result<ExecutionOutcome, LedgerError>;

    async fn submit_batch(&self, calls: Vec<FunctionCall>)
    -> Result<ExecutionOutcome, LedgerError>;
}
