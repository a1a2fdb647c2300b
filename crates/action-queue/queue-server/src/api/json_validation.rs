use serde::{
    Deserialize,
    Serialize,
};
use serde_json::Value;
use std::fmt;

/// Maximum allowed JSON payload size (1MB). Actions are small; anything
/// larger is hostile or broken.
pub const MAX_JSON_SIZE: usize = 1024 * 1024;

/// Standard JSON-RPC error codes
#[derive(Debug, Clone, Copy)]
pub enum JsonRpcErrorCode {
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,
}

impl fmt::Display for JsonRpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as i32)
    }
}

/// Validated JSON-RPC request structure
#[derive(Debug, Deserialize, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Option<Vec<Value>>,
    pub id: Value,
}

/// Strict validation for queue_pushAction params
pub fn validate_push_params(params: &[Value]) -> Result<(), &'static str> {
    if params.len() != 1 {
        return Err("Expected exactly one parameter");
    }

    let obj = params[0].as_object().ok_or("Parameter must be an object")?;

    let expected_fields = ["payload", "meta"];
    let mut has_payload = false;

    for (key, value) in obj {
        if !expected_fields.contains(&key.as_str()) {
            return Err("Unexpected field in action request");
        }
        match key.as_str() {
            "payload" => {
                if !value.is_object() {
                    return Err("payload must be an object");
                }
                has_payload = true;
            }
            "meta" => {
                if !value.is_object() {
                    return Err("meta must be an object");
                }
            }
            _ => {}
        }
    }

    if !has_payload {
        return Err("Missing required field");
    }

    Ok(())
}

/// Validate params for methods expecting a single action-hash string
pub fn validate_hash_param(params: &[Value]) -> Result<(), &'static str> {
    if params.len() != 1 {
        return Err("Expected exactly one parameter");
    }

    let hash = params[0].as_str().ok_or("Parameter must be a string")?;
    let digits = hash
        .strip_prefix("0x")
        .ok_or("Action hash must be 0x-prefixed")?;
    if digits.len() != 64 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err("Action hash must be 32 hex-encoded bytes");
    }

    Ok(())
}

/// Safe parameter access result
pub enum ParamAccess<'a> {
    Value(&'a Value),
    Missing,
}

impl JsonRpcRequest {
    /// Validates and parses a JSON-RPC request from raw JSON value
    pub fn validate(json: Value) -> Result<Self, (JsonRpcErrorCode, &'static str)> {
        let obj = json.as_object().ok_or((
            JsonRpcErrorCode::InvalidRequest,
            "Request must be a JSON object",
        ))?;

        let jsonrpc = obj.get("jsonrpc").and_then(|v| v.as_str()).ok_or((
            JsonRpcErrorCode::InvalidRequest,
            "Missing or invalid 'jsonrpc' field",
        ))?;

        if jsonrpc != "2.0" {
            return Err((
                JsonRpcErrorCode::InvalidRequest,
                "JSON-RPC version must be 2.0",
            ));
        }

        let method = obj.get("method").and_then(|v| v.as_str()).ok_or((
            JsonRpcErrorCode::InvalidRequest,
            "Missing or invalid 'method' field",
        ))?;

        // id can be number, string, or null
        let id = obj.get("id").cloned().unwrap_or(Value::Null);

        let params = if let Some(params_value) = obj.get("params") {
            match params_value {
                Value::Array(arr) => Some(arr.clone()),
                Value::Null => None,
                _ => {
                    return Err((
                        JsonRpcErrorCode::InvalidParams,
                        "Params must be an array or null",
                    ));
                }
            }
        } else {
            None
        };

        Ok(JsonRpcRequest {
            jsonrpc: jsonrpc.to_string(),
            method: method.to_string(),
            params,
            id,
        })
    }

    /// Safely access a parameter by index
    pub fn get_param(&self, index: usize) -> ParamAccess<'_> {
        match &self.params {
            Some(params) => {
                params
                    .get(index)
                    .map(ParamAccess::Value)
                    .unwrap_or(ParamAccess::Missing)
            }
            None => ParamAccess::Missing,
        }
    }

    /// Safely get a string parameter
    pub fn get_string_param(&self, index: usize) -> Result<&str, &'static str> {
        match self.get_param(index) {
            ParamAccess::Value(v) => v.as_str().ok_or("Parameter is not a string"),
            ParamAccess::Missing => Err("Missing parameter"),
        }
    }

    /// Safely deserialize a parameter into a specific type
    pub fn deserialize_param<T: for<'de> Deserialize<'de>>(
        &self,
        index: usize,
    ) -> Result<T, &'static str> {
        match self.get_param(index) {
            ParamAccess::Value(v) => {
                serde_json::from_value(v.clone()).map_err(|_| "Failed to deserialize parameter")
            }
            ParamAccess::Missing => Err("Missing parameter"),
        }
    }
}
