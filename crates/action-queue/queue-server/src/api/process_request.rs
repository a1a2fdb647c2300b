use std::net::SocketAddr;

use crate::{
    api::json_validation::{
        JsonRpcErrorCode,
        JsonRpcRequest,
        MAX_JSON_SIZE,
        validate_hash_param,
        validate_push_params,
    },
    queue::ActionQueue,
};

use action_queue_core::{
    ActionHash,
    ActionRequest,
};

use anyhow::Result;
use serde_json::{
    Value,
    json,
};
use uuid::Uuid;

use http_body_util::BodyExt;
use hyper::{
    Error,
    Request,
};
use tracing::{
    debug,
    warn,
};

/// Matches the incoming method sent by a client to a corresponding function.
#[tracing::instrument(
    level = "debug",
    skip_all,
    target = "api::match_method",
    fields(request_id, client_addr)
)]
pub async fn match_method<B>(
    req: Request<B>,
    queue: &ActionQueue,
    client_addr: SocketAddr,
) -> Result<String>
where
    B: hyper::body::Body<Error = Error>,
{
    // Unique request ID for correlation
    let request_id = Uuid::new_v4();
    let client_ip = client_addr.ip().to_string();

    tracing::Span::current().record("request_id", tracing::field::display(&request_id));
    tracing::Span::current().record("client_addr", tracing::field::display(&client_addr));

    let body = req.into_body().collect().await?.to_bytes();

    if body.len() > MAX_JSON_SIZE {
        warn!(target: "json_rpc", %request_id, %client_ip, size = body.len(), "Request payload too large");
        return Ok(error_response(
            Value::Null,
            JsonRpcErrorCode::InvalidRequest,
            "Request too large",
        ));
    }

    let json_value: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            warn!(target: "json_rpc", %request_id, %client_ip, error = %e, "Failed to parse JSON");
            return Ok(error_response(
                Value::Null,
                JsonRpcErrorCode::ParseError,
                "Parse error",
            ));
        }
    };

    let json_rpc = match JsonRpcRequest::validate(json_value) {
        Ok(req) => req,
        Err((code, msg)) => {
            warn!(target: "json_rpc", %request_id, %client_ip, error = msg, "Invalid JSON-RPC structure");
            return Ok(error_response(Value::Null, code, msg));
        }
    };

    let id = json_rpc.id.clone();
    debug!(target: "json_rpc", %request_id, method = %json_rpc.method, "Dispatching request");

    match json_rpc.method.as_str() {
        "queue_pushAction" => {
            let params = json_rpc.params.as_deref().unwrap_or_default();
            if let Err(msg) = validate_push_params(params) {
                return Ok(error_response(id, JsonRpcErrorCode::InvalidParams, msg));
            }
            let request: ActionRequest = match json_rpc.deserialize_param(0) {
                Ok(request) => request,
                Err(msg) => {
                    return Ok(error_response(id, JsonRpcErrorCode::InvalidParams, msg));
                }
            };

            match queue.push(request) {
                Ok(hash) => Ok(result_response(id, json!(hash))),
                Err(invalid) => {
                    warn!(target: "json_rpc", %request_id, error = %invalid, "Rejected malformed action");
                    Ok(error_response(
                        id,
                        JsonRpcErrorCode::InvalidParams,
                        &invalid.to_string(),
                    ))
                }
            }
        }

        "queue_removeAction" => {
            let params = json_rpc.params.as_deref().unwrap_or_default();
            if let Err(msg) = validate_hash_param(params) {
                return Ok(error_response(id, JsonRpcErrorCode::InvalidParams, msg));
            }
            let hash: ActionHash = match json_rpc.get_string_param(0).map(str::parse) {
                Ok(Ok(hash)) => hash,
                _ => {
                    return Ok(error_response(
                        id,
                        JsonRpcErrorCode::InvalidParams,
                        "Malformed action hash",
                    ));
                }
            };

            Ok(result_response(id, json!(queue.remove(&hash))))
        }

        "queue_getActions" => {
            match serde_json::to_value(queue.get_all()) {
                Ok(actions) => Ok(result_response(id, actions)),
                Err(e) => {
                    warn!(target: "json_rpc", %request_id, error = %e, "Failed to serialize queue contents");
                    Ok(error_response(
                        id,
                        JsonRpcErrorCode::InternalError,
                        "Internal error",
                    ))
                }
            }
        }

        _ => {
            Ok(error_response(
                id,
                JsonRpcErrorCode::MethodNotFound,
                "Method not found",
            ))
        }
    }
}

fn result_response(id: Value, result: Value) -> String {
    json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": id,
    })
    .to_string()
}

fn error_response(id: Value, code: JsonRpcErrorCode, message: &str) -> String {
    json!({
        "jsonrpc": "2.0",
        "error": {
            "code": code as i32,
            "message": message,
        },
        "id": id,
    })
    .to_string()
}
