use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, trace, warn};

use crate::{
    FunctionCall, LedgerClient,
    errors::LedgerError,
    outcome::ExecutionOutcome,
};

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

pub const MAX_NUMBER_OF_RETRIES: u64 = 5;
pub const BACKOFF_FACTOR: u64 = 2;
/// Milliseconds before the first retry.
pub const MIN_RETRY_DELAY: u64 = 500;
/// Milliseconds, upper bound for any single wait.
pub const MAX_RETRY_DELAY: u64 = 30_000;
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum RpcRequestId {
    Number(u64),
    String(String),
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RpcRequest {
    pub id: RpcRequestId,
    pub jsonrpc: String,
    pub method: String,
    pub params: Option<Vec<Value>>,
}

impl RpcRequest {
    pub fn new(method: &str, params: Option<Vec<Value>>) -> Self {
        Self {
            id: RpcRequestId::Number(REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed)),
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct RpcErrorMetadata {
    pub code: i32,
    #[serde(default)]
    pub data: Option<Value>,
    pub message: String,
}

#[derive(Deserialize, Debug)]
pub struct RpcSuccessResponse {
    pub id: RpcRequestId,
    pub jsonrpc: String,
    pub result: Value,
}

#[derive(Deserialize, Debug)]
pub struct RpcErrorResponse {
    pub id: RpcRequestId,
    pub jsonrpc: String,
    pub error: RpcErrorMetadata,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum RpcResponse {
    Success(RpcSuccessResponse),
    Error(RpcErrorResponse),
}

/// Exponential backoff schedule, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub max_number_of_retries: u64,
    pub backoff_factor: u64,
    pub min_retry_delay: u64,
    pub max_retry_delay: u64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            max_number_of_retries: MAX_NUMBER_OF_RETRIES,
            backoff_factor: BACKOFF_FACTOR,
            min_retry_delay: MIN_RETRY_DELAY,
            max_retry_delay: MAX_RETRY_DELAY,
        }
    }
}

impl Backoff {
    /// Delay before retry number `retry` (0-based).
    pub fn delay(&self, retry: u64) -> Duration {
        let exponent = u32::try_from(retry).unwrap_or(u32::MAX);
        let millis = self
            .backoff_factor
            .checked_pow(exponent)
            .and_then(|factor| factor.checked_mul(self.min_retry_delay))
            .unwrap_or(self.max_retry_delay)
            .min(self.max_retry_delay);
        Duration::from_millis(millis)
    }
}

/// JSON-RPC client for a ledger node that signs on behalf of `account_id`.
#[derive(Debug, Clone)]
pub struct RpcLedgerClient {
    client: Client,
    pub url: Url,
    pub account_id: String,
    pub contract_id: String,
    pub backoff: Backoff,
}

impl RpcLedgerClient {
    pub fn new(url: &str, account_id: &str, contract_id: &str) -> Result<Self, LedgerError> {
        Self::new_with_config(
            url,
            account_id,
            contract_id,
            REQUEST_TIMEOUT,
            Backoff::default(),
        )
    }

    pub fn new_with_config(
        url: &str,
        account_id: &str,
        contract_id: &str,
        timeout: Duration,
        backoff: Backoff,
    ) -> Result<Self, LedgerError> {
        let url = Url::parse(url).map_err(|err| LedgerError::ParseUrlError(err.to_string()))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url,
            account_id: account_id.to_string(),
            contract_id: contract_id.to_string(),
            backoff,
        })
    }

    fn action(call: &FunctionCall) -> Value {
        json!({
            "method_name": call.method_name,
            "args": STANDARD.encode(&call.args),
            "gas": call.gas,
            "deposit": call.deposit.to_string(),
        })
    }

    fn function_call_request(&self, call: &FunctionCall) -> RpcRequest {
        let mut params = Self::action(call);
        params["signer_id"] = json!(self.account_id);
        params["receiver_id"] = json!(self.contract_id);
        RpcRequest::new("function_call", Some(vec![params]))
    }

    fn batch_request(&self, calls: &[FunctionCall]) -> RpcRequest {
        let actions: Vec<Value> = calls.iter().map(Self::action).collect();
        let params = json!({
            "signer_id": self.account_id,
            "receiver_id": self.contract_id,
            "actions": actions,
        });
        RpcRequest::new("batch_function_call", Some(vec![params]))
    }

    async fn send_request(&self, request: &RpcRequest) -> Result<RpcResponse, LedgerError> {
        trace!(endpoint = %self.url, id = ?request.id, method = %request.method, "Sending RPC request");

        let body = serde_json::to_string(request).map_err(|error| {
            LedgerError::FailedToSerializeRequestBody(format!("{error}: {request:?}"))
        })?;
        self.client
            .post(self.url.as_str())
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await?
            .json::<RpcResponse>()
            .await
            .inspect_err(|err| trace!(endpoint = %self.url, %err, "Failed to deserialize response"))
            .map_err(LedgerError::from)
    }

    /// Sends `request`, retrying only when the connection could not be opened.
    ///
    /// Calls are not idempotent: once the request may have reached the node, timeouts,
    /// decode failures, node errors and failed executions are returned as they are.
    async fn send_with_retry(&self, request: RpcRequest) -> Result<ExecutionOutcome, LedgerError> {
        let mut retry = 0;
        let response = loop {
            match self.send_request(&request).await {
                Ok(response) => break response,
                Err(LedgerError::ReqwestError(error)) if error.is_connect() => {
                    if retry >= self.backoff.max_number_of_retries {
                        return Err(LedgerError::RetriesExhausted {
                            method: request.method.clone(),
                            attempts: retry + 1,
                            source: Box::new(LedgerError::ReqwestError(error)),
                        });
                    }
                    let delay = self.backoff.delay(retry);
                    warn!(
                        endpoint = %self.url,
                        method = %request.method,
                        %error,
                        retry_in_ms = delay.as_millis() as u64,
                        "Could not reach ledger node"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(error) => return Err(error),
            }
        };

        match response {
            RpcResponse::Success(success) => {
                let outcome = ExecutionOutcome::from_rpc_result(&request.method, success.result)?;
                debug!(
                    method = %request.method,
                    success = outcome.is_success(),
                    gas_burnt = outcome.gas_burnt,
                    "Ledger answered"
                );
                Ok(outcome)
            }
            RpcResponse::Error(error_response) => Err(LedgerError::RPCError {
                method: request.method,
                code: error_response.error.code,
                message: error_response.error.message,
                data: error_response.error.data.map(|data| data.to_string()),
            }),
        }
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    fn account_id(&self) -> &str {
        &self.account_id
    }

    fn contract_id(&self) -> &str {
        &self.contract_id
    }

    async fn submit(&self, call: FunctionCall) -> Result<ExecutionOutcome, LedgerError> {
        let request = self.function_call_request(&call);
        self.send_with_retry(request).await
    }

    async fn submit_batch(
        &self,
        calls: Vec<FunctionCall>,
    ) -> Result<ExecutionOutcome, LedgerError> {
        if calls.is_empty() {
            return Err(LedgerError::EmptyBatch);
        }
        let request = self.batch_request(&calls);
        self.send_with_retry(request).await
    }
}
