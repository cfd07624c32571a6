use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;

use crate::errors::LedgerError;

#[derive(Clone, Debug, PartialEq)]
pub enum ExecutionStatus {
    /// The call succeeded; the payload is the decoded return value.
    SuccessValue(Bytes),
    /// The ledger rejected the call; the structured failure is kept verbatim.
    Failure(Value),
}

/// Typed result of a submission, validated once at the client boundary.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionOutcome {
    pub transaction_hash: Option<String>,
    pub gas_burnt: u64,
    pub status: ExecutionStatus,
}

impl ExecutionOutcome {
    pub fn success(value: Bytes) -> Self {
        Self {
            transaction_hash: None,
            gas_burnt: 0,
            status: ExecutionStatus::SuccessValue(value),
        }
    }

    pub fn failure(payload: Value) -> Self {
        Self {
            transaction_hash: None,
            gas_burnt: 0,
            status: ExecutionStatus::Failure(payload),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, ExecutionStatus::SuccessValue(_))
    }

    pub fn failure_payload(&self) -> Option<&Value> {
        match &self.status {
            ExecutionStatus::Failure(payload) => Some(payload),
            ExecutionStatus::SuccessValue(_) => None,
        }
    }

    /// Validates the `result` member of a JSON-RPC response.
    pub fn from_rpc_result(method: &str, result: Value) -> Result<Self, LedgerError> {
        let invalid = |reason: String| LedgerError::InvalidOutcome {
            method: method.to_string(),
            reason,
        };
        let raw: RawOutcome =
            serde_json::from_value(result).map_err(|err| invalid(err.to_string()))?;

        let status = match (raw.status.success_value, raw.status.failure) {
            (Some(encoded), None) => {
                let value = STANDARD
                    .decode(encoded)
                    .map_err(|err| invalid(format!("SuccessValue is not base64: {err}")))?;
                ExecutionStatus::SuccessValue(Bytes::from(value))
            }
            (None, Some(failure)) => ExecutionStatus::Failure(failure),
            (Some(_), Some(_)) => {
                return Err(invalid(
                    "status carries both SuccessValue and Failure".to_string(),
                ));
            }
            (None, None) => return Err(invalid("status carries no result".to_string())),
        };

        let gas_burnt = raw
            .receipts_outcome
            .iter()
            .map(|receipt| receipt.outcome.gas_burnt)
            .chain(raw.transaction_outcome.map(|tx| tx.outcome.gas_burnt))
            .fold(0u64, u64::saturating_add);

        Ok(Self {
            transaction_hash: raw.transaction.map(|tx| tx.hash),
            gas_burnt,
            status,
        })
    }
}

#[derive(Deserialize)]
struct RawOutcome {
    status: RawStatus,
    #[serde(default)]
    transaction: Option<RawTransaction>,
    #[serde(default)]
    transaction_outcome: Option<RawExecution>,
    #[serde(default)]
    receipts_outcome: Vec<RawExecution>,
}

#[derive(Deserialize)]
struct RawStatus {
    #[serde(rename = "SuccessValue")]
    success_value: Option<String>,
    #[serde(rename = "Failure")]
    failure: Option<Value>,
}

#[derive(Deserialize)]
struct RawTransaction {
    hash: String,
}

#[derive(Deserialize)]
struct RawExecution {
    outcome: RawGas,
}

#[derive(Deserialize)]
struct RawGas {
    #[serde(default)]
    gas_burnt: u64,
}
