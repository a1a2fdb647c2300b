//! The signing/RPC collaborator that actually submits actions.
//!
//! The queue only requires `submit(action) -> transaction hash`; the
//! production implementation speaks JSON-RPC 2.0 to the wallet signing node.

use std::future::Future;

use action_queue_core::{
    ActionPayload,
    QueuedAction,
};

use serde::{
    Deserialize,
    Serialize,
};
use url::Url;

/// Outcome of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub transaction_hash: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("node URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("node rejected submission (code {code}): {message}")]
    Rpc { code: i32, message: String },
    #[error("invalid node response: {0}")]
    InvalidResponse(String),
    #[error("submission timed out")]
    Timeout,
}

/// External executor for queued actions. The processor maps every error to a
/// `Failed` entry; it never retries on its own.
pub trait ActionExecutor: Send + Sync + 'static {
    fn submit(
        &self,
        action: &QueuedAction,
    ) -> impl Future<Output = Result<SubmissionReceipt, ExecutionError>> + Send;
}

/// JSON-RPC request structure
#[derive(Debug, Serialize)]
struct JsonRpcRequest<T> {
    jsonrpc: String,
    method: String,
    params: T,
    id: u64,
}

/// JSON-RPC response structure for successful responses
#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    jsonrpc: String,
    result: Option<T>,
    error: Option<JsonRpcError>,
    id: u64,
}

/// JSON-RPC error structure
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResult {
    transaction_hash: String,
}

/// Submits actions to the wallet signing node over JSON-RPC.
#[derive(Debug)]
pub struct RpcExecutor {
    client: reqwest::Client,
    node_url: Url,
    request_id: std::sync::atomic::AtomicU64,
}

impl RpcExecutor {
    pub fn new(node_url: &str) -> Result<Self, ExecutionError> {
        let node_url = Url::parse(node_url)?;
        let client = reqwest::Client::new();

        Ok(Self {
            client,
            node_url,
            request_id: std::sync::atomic::AtomicU64::new(1),
        })
    }

    fn next_request_id(&self) -> u64 {
        self.request_id
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }

    /// Make a JSON-RPC request and validate the response envelope.
    async fn make_request<P, R>(&self, method: &str, params: P) -> Result<R, ExecutionError>
    where
        P: Serialize,
        R: for<'de> Deserialize<'de>,
    {
        let request_id = self.next_request_id();
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: request_id,
        };

        let response = self
            .client
            .post(self.node_url.clone())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ExecutionError::InvalidResponse(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let response_body: JsonRpcResponse<R> = response.json().await?;

        if response_body.jsonrpc != "2.0" {
            return Err(ExecutionError::InvalidResponse(format!(
                "Invalid JSON-RPC version: expected '2.0', got '{}'",
                response_body.jsonrpc
            )));
        }

        if response_body.id != request_id {
            return Err(ExecutionError::InvalidResponse(format!(
                "Request/response ID mismatch: expected {}, got {}",
                request_id, response_body.id
            )));
        }

        if let Some(error) = response_body.error {
            return Err(ExecutionError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        response_body.result.ok_or_else(|| {
            ExecutionError::InvalidResponse("Missing result in successful response".to_string())
        })
    }
}

impl ActionExecutor for RpcExecutor {
    async fn submit(&self, action: &QueuedAction) -> Result<SubmissionReceipt, ExecutionError> {
        let (method, params) = match &action.payload {
            ActionPayload::Transaction(tx) => ("wallet_sendTransaction", serde_json::json!([tx])),
            ActionPayload::DeployAccount(account) => {
                ("wallet_deployAccount", serde_json::json!([account]))
            }
            ActionPayload::Upgrade(upgrade) => {
                ("wallet_upgradeAccount", serde_json::json!([upgrade]))
            }
        };

        let result: SubmitResult = self.make_request(method, params).await?;
        Ok(SubmissionReceipt {
            transaction_hash: result.transaction_hash,
        })
    }
}
