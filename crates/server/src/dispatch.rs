use std::sync::Arc;

use serde_json::Value;

use multiapi_common::api::jsonrpc::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, INTERNAL_ERROR, METHOD_CALL_TOOL,
    METHOD_LIST_TOOLS, PARSE_ERROR,
};
use multiapi_common::api::tools::{CallToolResult, ListToolsResult};

use crate::tools::schema::validate_arguments;
use crate::tools::ToolRegistry;

/// Envelope-level failures. These populate the response's `error` object;
/// handler failures never do.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Missing tool name")]
    MissingToolName,

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    pub fn code(&self) -> i64 {
        match self {
            Self::Parse(_) => PARSE_ERROR,
            _ => INTERNAL_ERROR,
        }
    }

    fn into_rpc_error(self) -> JsonRpcError {
        JsonRpcError::new(self.code(), self.to_string())
    }
}

/// Validates envelopes and routes them to registered tools.
///
/// Holds no per-request state; clones share the same registry and may
/// dispatch concurrently.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Dispatch a raw request body. A body that is not JSON still gets an
    /// envelope back.
    pub async fn dispatch_str(&self, body: &str) -> JsonRpcResponse {
        self.dispatch_bytes(body.as_bytes()).await
    }

    /// Dispatch a request body as received off the wire. Bytes that are not
    /// valid UTF-8 JSON are answered with a parse error.
    pub async fn dispatch_bytes(&self, body: &[u8]) -> JsonRpcResponse {
        match serde_json::from_slice::<Value>(body) {
            Ok(value) => self.dispatch_value(value).await,
            Err(e) => {
                tracing::warn!(error = %e, "Unparsable request body");
                JsonRpcResponse::error(
                    Value::Null,
                    DispatchError::Parse(e.to_string()).into_rpc_error(),
                )
            }
        }
    }

    /// Dispatch an already-parsed JSON value.
    pub async fn dispatch_value(&self, value: Value) -> JsonRpcResponse {
        let id = value.get("id").cloned().unwrap_or(Value::Null);

        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => {
                tracing::warn!(error = %e, "Malformed request envelope");
                JsonRpcResponse::error(
                    id,
                    DispatchError::InvalidRequest(e.to_string()).into_rpc_error(),
                )
            }
        }
    }

    /// Dispatch one request. Always produces exactly one response.
    pub async fn dispatch(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let start = std::time::Instant::now();
        let id = request.id.clone();
        let method = request.method.clone().unwrap_or_default();

        let outcome = self.route(request).await;
        let latency = start.elapsed().as_secs_f64();

        match outcome {
            Ok(result) => {
                metrics::counter!("dispatch.requests", "outcome" => "ok").increment(1);
                tracing::info!(method = %method, latency_s = latency, "Request completed");
                JsonRpcResponse::success(id, result)
            }
            Err(e) => {
                metrics::counter!("dispatch.requests", "outcome" => "error").increment(1);
                match &e {
                    DispatchError::Internal(_) => {
                        tracing::error!(method = %method, error = %e, "Request failed")
                    }
                    _ => tracing::warn!(method = %method, error = %e, "Request rejected"),
                }
                JsonRpcResponse::error(id, e.into_rpc_error())
            }
        }
    }

    async fn route(&self, request: JsonRpcRequest) -> Result<Value, DispatchError> {
        let method = request
            .method
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| {
                DispatchError::InvalidRequest("missing required field: method".into())
            })?;

        tracing::info!(method = %method, "Request received");

        match method.as_str() {
            METHOD_LIST_TOOLS => to_result(&ListToolsResult {
                tools: self.registry.list(),
            }),
            METHOD_CALL_TOOL => {
                let params = request.params.unwrap_or_default();
                let name = params
                    .name
                    .filter(|n| !n.is_empty())
                    .ok_or(DispatchError::MissingToolName)?;
                let result = self.call_tool(&name, params.arguments).await?;
                to_result(&result)
            }
            other => Err(DispatchError::UnknownMethod(other.to_string())),
        }
    }

    /// Invoke a tool. Handler failures come back as `isError` content;
    /// only an unknown tool or a panicking handler is a [`DispatchError`].
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<serde_json::Map<String, Value>>,
    ) -> Result<CallToolResult, DispatchError> {
        let start = std::time::Instant::now();

        let Some(registration) = self.registry.resolve(name) else {
            metrics::counter!("tools.execution.errors", "tool" => name.to_string()).increment(1);
            return Err(DispatchError::UnknownTool(name.to_string()));
        };

        tracing::info!(tool = %name, "Tool call started");

        let outcome = match validate_arguments(&registration.definition.input_schema, arguments) {
            Ok(args) => {
                // Run on its own task so a panicking handler is contained.
                let future = (registration.handler)(args, self.registry.context());
                tokio::spawn(future).await.map_err(|e| {
                    let detail = if e.is_panic() {
                        panic_message(e.into_panic())
                    } else {
                        e.to_string()
                    };
                    tracing::error!(tool = %name, error = %detail, "Tool handler panicked");
                    DispatchError::Internal(format!("tool '{}' failed: {}", name, detail))
                })?
            }
            Err(e) => Err(e),
        };

        let latency = start.elapsed().as_secs_f64();
        metrics::histogram!("tools.execution.latency", "tool" => name.to_string()).record(latency);
        metrics::counter!("tools.execution.count", "tool" => name.to_string()).increment(1);

        match outcome {
            Ok(value) => {
                let text = render_text(value);
                tracing::info!(
                    tool = %name,
                    latency_s = latency,
                    result_len = text.len(),
                    "Tool call succeeded"
                );
                Ok(CallToolResult::text(text))
            }
            Err(e) => {
                tracing::warn!(
                    tool = %name,
                    latency_s = latency,
                    error = %e,
                    "Tool call failed"
                );
                metrics::counter!("tools.execution.errors", "tool" => name.to_string())
                    .increment(1);
                Ok(CallToolResult::error(e.to_content_text()))
            }
        }
    }
}

/// Strings pass through; anything else becomes pretty-printed JSON.
fn render_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => serde_json::to_string_pretty(&other).unwrap_or_else(|e| {
            format!("{{\"error\": \"Failed to serialize result: {}\"}}", e)
        }),
    }
}

fn to_result<T: serde::Serialize>(result: &T) -> Result<Value, DispatchError> {
    serde_json::to_value(result).map_err(|e| DispatchError::Internal(e.to_string()))
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
