//! Integration layer: the weather, finance and news tools.
//!
//! Each tool follows the same contract: parse arguments, check the cache,
//! admit one request against its rate-limit category, call the upstream API,
//! reshape the payload and cache it.

mod finance;
mod news;
mod weather;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::ToolError;
use super::registry::ToolRegistry;

/// Register every integration tool with the registry.
pub fn register_all(registry: &mut ToolRegistry) {
    weather::register(registry);
    finance::register(registry);
    news::register(registry);
}

/// Deserialize validated arguments into a handler's argument struct.
fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// Look up a JSON pointer in an upstream payload, failing if it is absent.
fn required<'a>(body: &'a Value, what: &str, pointer: &str) -> Result<&'a Value, ToolError> {
    body.pointer(pointer).ok_or_else(|| {
        ToolError::Upstream(format!(
            "Failed to fetch {}: unexpected response shape (missing {})",
            what, pointer
        ))
    })
}

/// Copy an optional field, mapping absence to null.
fn optional(body: &Value, pointer: &str) -> Value {
    body.pointer(pointer).cloned().unwrap_or(Value::Null)
}

/// Upstreams that encode numbers as strings. Unparsable values become null.
fn number_from_str(value: &Value) -> Value {
    value
        .as_str()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .map(Value::from)
        .unwrap_or(Value::Null)
}

fn timestamp() -> Value {
    Value::String(chrono::Utc::now().to_rfc3339())
}
