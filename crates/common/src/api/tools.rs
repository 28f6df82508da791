use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool as advertised by `tools/list`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: InputSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Declarative shape of a tool's `arguments` object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    /// Always `"object"` on the wire.
    #[serde(rename = "type", default = "object_type")]
    pub schema_type: String,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

fn object_type() -> String {
    "object".to_string()
}

impl Default for InputSchema {
    fn default() -> Self {
        Self {
            schema_type: object_type(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }
}

impl InputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an optional property.
    pub fn property(mut self, name: &str, schema: PropertySchema) -> Self {
        self.properties.insert(name.to_string(), schema);
        self
    }

    /// Add a property and mark it required.
    pub fn required_property(mut self, name: &str, schema: PropertySchema) -> Self {
        self.properties.insert(name.to_string(), schema);
        self.required.push(name.to_string());
        self
    }
}

/// JSON type of a single argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl PropertyType {
    /// Whether `value` has this JSON type.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

/// Schema of a single argument.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
}

impl PropertySchema {
    pub fn new(property_type: PropertyType) -> Self {
        Self {
            property_type,
            description: None,
            allowed: None,
            default: None,
            minimum: None,
            maximum: None,
        }
    }

    pub fn string(description: &str) -> Self {
        Self::new(PropertyType::String).describe(description)
    }

    pub fn number(description: &str) -> Self {
        Self::new(PropertyType::Number).describe(description)
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.allowed = Some(values.iter().map(|v| Value::from(*v)).collect());
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn range(mut self, minimum: f64, maximum: f64) -> Self {
        self.minimum = Some(minimum);
        self.maximum = Some(maximum);
        self
    }
}

/// Result of `tools/list`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<ToolDefinition>,
}

/// Result of `tools/call`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl CallToolResult {
    /// Successful call carrying one text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::Text { text: text.into() }],
            is_error: None,
        }
    }

    /// Application-level failure carrying one text block, marked `isError`.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::Text { text: text.into() }],
            is_error: Some(true),
        }
    }
}

/// A content block in a call result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Text { text: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_definition_wire_shape() {
        let def = ToolDefinition::new(
            "search_news",
            "Search news articles",
            InputSchema::new()
                .required_property("query", PropertySchema::string("Search query"))
                .property(
                    "sortBy",
                    PropertySchema::string("Sort results by")
                        .one_of(&["relevancy", "popularity", "publishedAt"])
                        .with_default("relevancy"),
                ),
        );

        let wire = serde_json::to_value(&def).unwrap();
        assert_eq!(wire["inputSchema"]["type"], json!("object"));
        assert_eq!(wire["inputSchema"]["required"], json!(["query"]));
        assert_eq!(
            wire["inputSchema"]["properties"]["sortBy"]["enum"],
            json!(["relevancy", "popularity", "publishedAt"])
        );
        assert_eq!(
            wire["inputSchema"]["properties"]["sortBy"]["default"],
            json!("relevancy")
        );
        assert!(wire["inputSchema"]["properties"]["query"]
            .get("minimum")
            .is_none());
    }

    #[test]
    fn test_call_result_wire_shape() {
        let ok = serde_json::to_value(CallToolResult::text("hi")).unwrap();
        assert_eq!(ok, json!({ "content": [{ "type": "text", "text": "hi" }] }));

        let err = serde_json::to_value(CallToolResult::error("Error: nope")).unwrap();
        assert_eq!(
            err,
            json!({ "content": [{ "type": "text", "text": "Error: nope" }], "isError": true })
        );
    }

    #[test]
    fn test_integer_type_rejects_fractions() {
        assert!(PropertyType::Integer.matches(&json!(3)));
        assert!(!PropertyType::Integer.matches(&json!(3.5)));
        assert!(PropertyType::Number.matches(&json!(3.5)));
    }
}
