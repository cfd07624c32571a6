//! Client side of the remote ledger that hosts the EVM under test.
//!
//! The replayer only needs two operations from the ledger: submit one function call, or submit
//! several as a single batched transaction. [`LedgerClient`] captures that seam;
//! [`rpc::RpcLedgerClient`] is the JSON-RPC implementation used by the CLI.

mod call;
mod client;
pub mod credentials;
pub mod errors;
mod outcome;
pub mod rpc;

pub use call::FunctionCall;
pub use client::LedgerClient;
pub use errors::LedgerError;
pub use outcome::{ExecutionOutcome, ExecutionStatus};
