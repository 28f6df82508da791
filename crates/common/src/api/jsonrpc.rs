use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version tag carried by every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Envelope methods understood by the dispatcher.
pub const METHOD_LIST_TOOLS: &str = "tools/list";
pub const METHOD_CALL_TOOL: &str = "tools/call";

/// Body was not valid JSON.
pub const PARSE_ERROR: i64 = -32700;
/// Dispatch-level failure: malformed request, unknown method, unknown tool,
/// missing tool name, or an internal fault while dispatching.
pub const INTERNAL_ERROR: i64 = -32603;

/// Incoming request envelope.
///
/// Every field is optional at the wire level so that a structurally valid but
/// incomplete request still deserializes and can be answered with a proper
/// error envelope instead of being dropped.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<CallToolParams>,
    /// Correlation id: number, string, or null.
    #[serde(default)]
    pub id: Value,
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Option<CallToolParams>, id: Value) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            method: Some(method.into()),
            params,
            id,
        }
    }
}

/// `params` of a `tools/call` request.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CallToolParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Map<String, Value>>,
}

impl CallToolParams {
    pub fn new(name: impl Into<String>, arguments: serde_json::Map<String, Value>) -> Self {
        Self {
            name: Some(name.into()),
            arguments: Some(arguments),
        }
    }
}

/// Outgoing response envelope. Exactly one of `result` / `error` is set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Structured envelope-level error.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ErrorData>,
}

impl JsonRpcError {
    /// Build an error stamped with the current time.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(ErrorData {
                timestamp: Utc::now(),
            }),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorData {
    pub timestamp: DateTime<Utc>,
}
