use serde_json::{Map, Value};

use multiapi_common::api::tools::InputSchema;

use super::error::ToolError;

/// Check `arguments` against `schema` and fill in declared defaults.
///
/// Checks required fields, JSON types, enumerated values and numeric bounds
/// of declared properties. Undeclared keys pass through untouched. Returns
/// the arguments as a JSON object ready for the handler.
pub fn validate_arguments(
    schema: &InputSchema,
    arguments: Option<Map<String, Value>>,
) -> Result<Value, ToolError> {
    let mut arguments = arguments.unwrap_or_default();

    // An explicit null reads as "not provided".
    arguments.retain(|_, value| !value.is_null());

    for name in &schema.required {
        if !arguments.contains_key(name) {
            return Err(ToolError::InvalidArguments(format!(
                "missing required field '{}'",
                name
            )));
        }
    }

    for (name, property) in &schema.properties {
        let Some(value) = arguments.get(name) else {
            if let Some(default) = &property.default {
                arguments.insert(name.clone(), default.clone());
            }
            continue;
        };

        if !property.property_type.matches(value) {
            return Err(ToolError::InvalidArguments(format!(
                "field '{}' must be of type {}",
                name,
                property.property_type.as_str()
            )));
        }

        if let Some(allowed) = &property.allowed {
            if !allowed.contains(value) {
                let options: Vec<String> = allowed.iter().map(Value::to_string).collect();
                return Err(ToolError::InvalidArguments(format!(
                    "field '{}' must be one of {}",
                    name,
                    options.join(", ")
                )));
            }
        }

        if let Some(number) = value.as_f64() {
            if property.minimum.is_some_and(|min| number < min)
                || property.maximum.is_some_and(|max| number > max)
            {
                return Err(ToolError::InvalidArguments(format!(
                    "field '{}' is out of range ({}..={})",
                    name,
                    bound(property.minimum),
                    bound(property.maximum)
                )));
            }
        }
    }

    Ok(Value::Object(arguments))
}

fn bound(limit: Option<f64>) -> String {
    limit.map(|v| v.to_string()).unwrap_or_default()
}
