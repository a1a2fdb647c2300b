use http::header;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use url::Url;

pub use action_queue_core::{
    ActionHash, ActionMeta, ActionPayload, ActionRequest, QueuedAction, TransactionPayload,
};

/// A client for the wallet action-queue daemon.
///
/// Used by UI processes to queue wallet-mutating actions, cancel them, and
/// poll submission status. Pushing is non-blocking on the daemon side: the
/// returned hash identifies the queued entry, and completion is observed by
/// polling `get_actions`.
///
/// ``` no_run
/// use action_queue_client::{ActionPayload, ActionRequest, QueueClient};
/// use action_queue_client::{ActionMeta, TransactionPayload};
///
/// #[tokio::main]
/// async fn main() {
///     let client = QueueClient::new("http://localhost:5040").unwrap();
///     let request = ActionRequest {
///         payload: ActionPayload::Transaction(TransactionPayload {
///             contract_address: "0xabc".to_string(),
///             entrypoint: "changeGuardian".to_string(),
///             calldata: vec!["0".to_string()],
///         }),
///         meta: ActionMeta::default(),
///     };
///     let action_hash = client.push_action(&request).await.unwrap();
///     let queued = client.get_actions().await.unwrap();
///     assert!(queued.iter().any(|action| action.hash == action_hash));
/// }
/// ```
#[derive(Debug)]
pub struct QueueClient {
    client: Client,
    base_url: Url,
    request_id: std::sync::atomic::AtomicU64,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueClientError {
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),
    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("JSON-RPC error code {code}: {message}")]
    JsonRpcError { code: i32, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
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

impl QueueClient {
    /// Create a new queue client
    pub fn new(queue_url: &str) -> Result<Self, QueueClientError> {
        let base_url = Url::parse(queue_url)?;
        let client = Client::new();

        Ok(Self {
            client,
            base_url,
            request_id: std::sync::atomic::AtomicU64::new(1),
        })
    }

    /// Create a new queue client with a session authorization header
    pub fn new_with_auth(queue_url: &str, auth: &str) -> Result<Self, QueueClientError> {
        let base_url = Url::parse(queue_url)?;
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            auth.parse().map_err(|_| {
                QueueClientError::InvalidResponse("Invalid authorization header".to_string())
            })?,
        );

        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            base_url,
            request_id: std::sync::atomic::AtomicU64::new(1),
        })
    }

    /// Get next request ID
    fn next_request_id(&self) -> u64 {
        self.request_id
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }

    /// Make a JSON-RPC request
    async fn make_request<P, R>(&self, method: &str, params: P) -> Result<R, QueueClientError>
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
            .post(self.base_url.clone())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(QueueClientError::InvalidResponse(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let response_body: JsonRpcResponse<R> = response.json().await?;

        // Validate JSON-RPC 2.0 compliance
        if response_body.jsonrpc != "2.0" {
            return Err(QueueClientError::InvalidResponse(format!(
                "Invalid JSON-RPC version: expected '2.0', got '{}'",
                response_body.jsonrpc
            )));
        }

        if response_body.id != request_id {
            return Err(QueueClientError::InvalidResponse(format!(
                "Request/response ID mismatch: expected {}, got {}",
                request_id, response_body.id
            )));
        }

        if let Some(error) = response_body.error {
            return Err(QueueClientError::JsonRpcError {
                code: error.code,
                message: error.message,
            });
        }

        response_body.result.ok_or_else(|| {
            QueueClientError::InvalidResponse("Missing result in successful response".to_string())
        })
    }

    /// Queue an action for on-chain submission and return its hash
    pub async fn push_action(
        &self,
        request: &ActionRequest,
    ) -> Result<ActionHash, QueueClientError> {
        let params = vec![serde_json::to_value(request)?];
        self.make_request("queue_pushAction", params).await
    }

    /// Remove a queued action. Returns whether anything was removed;
    /// removing an unknown hash is not an error.
    pub async fn remove_action(&self, action_hash: ActionHash) -> Result<bool, QueueClientError> {
        let params = vec![action_hash.to_string()];
        self.make_request("queue_removeAction", params).await
    }

    /// Fetch every queued action in insertion order
    pub async fn get_actions(&self) -> Result<Vec<QueuedAction>, QueueClientError> {
        let params: Vec<serde_json::Value> = vec![];
        self.make_request("queue_getActions", params).await
    }
}
