//! End-to-end dispatch tests against an in-process registry.
use serde_json::{json, Value};

use multiapi_common::api::jsonrpc::{CallToolParams, JsonRpcRequest, METHOD_CALL_TOOL};
use multiapi_common::api::tools::{InputSchema, PropertySchema, PropertyType, ToolDefinition};
use multiapi_common::config::SystemConfig;
use multiapi_server::tools::{handler_fn, ToolError, ToolRegistry};
use multiapi_server::App;

fn register_test_tools(registry: &mut ToolRegistry) {
    registry.register(
        ToolDefinition::new("echo", "Echo the arguments back", InputSchema::new()),
        handler_fn(|args, _ctx| async move { Ok(args) }),
    );

    registry.register(
        ToolDefinition::new(
            "greet",
            "Greet someone",
            InputSchema::new()
                .required_property("name", PropertySchema::string("Who to greet"))
                .property(
                    "times",
                    PropertySchema::new(PropertyType::Integer)
                        .range(1.0, 3.0)
                        .with_default(1),
                ),
        ),
        handler_fn(|args, _ctx| async move {
            let name = args["name"].as_str().unwrap_or_default().to_string();
            let times = args["times"].as_u64().unwrap_or(1) as usize;
            Ok(Value::String(vec![format!("hello {}", name); times].join(" ")))
        }),
    );

    registry.register(
        ToolDefinition::new("broken", "Always fails", InputSchema::new()),
        handler_fn(|_args, _ctx| async move {
            Err::<Value, _>(ToolError::Upstream("upstream exploded".into()))
        }),
    );

    registry.register(
        ToolDefinition::new("panics", "Panics inside the handler", InputSchema::new()),
        handler_fn(|_args, _ctx| async move {
            if true {
                panic!("handler blew up");
            }
            Ok(Value::Null)
        }),
    );
}

fn app() -> App {
    App::with_tools(&SystemConfig::with_default_policies(), register_test_tools).unwrap()
}

async fn dispatch(app: &App, request: Value) -> Value {
    let response = app.dispatcher.dispatch_value(request).await;
    serde_json::to_value(response).unwrap()
}

async fn call(app: &App, name: &str, arguments: Value) -> Value {
    dispatch(
        app,
        json!({
            "jsonrpc": "2.0",
            "method": "tools/call",
            "params": { "name": name, "arguments": arguments },
            "id": 1,
        }),
    )
    .await
}

#[tokio::test]
async fn test_echo_round_trip_exact_shape() {
    let app = app();
    let response = app
        .dispatcher
        .dispatch_str(
            r#"{"method":"tools/call","params":{"name":"echo","arguments":{"a":1}},"id":7}"#,
        )
        .await;

    assert_eq!(
        serde_json::to_string(&response).unwrap(),
        r#"{"jsonrpc":"2.0","result":{"content":[{"type":"text","text":"{\n  \"a\": 1\n}"}]},"id":7}"#
    );
}

#[tokio::test]
async fn test_list_tools_in_registration_order() {
    let app = app();
    let response = dispatch(
        &app,
        json!({ "jsonrpc": "2.0", "method": "tools/list", "id": "a" }),
    )
    .await;

    assert_eq!(response["id"], json!("a"));
    assert!(response.get("error").is_none());

    let names: Vec<&str> = response["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["echo", "greet", "broken", "panics"]);

    let greet = &response["result"]["tools"][1];
    assert_eq!(greet["inputSchema"]["type"], json!("object"));
    assert_eq!(greet["inputSchema"]["required"], json!(["name"]));
}

#[tokio::test]
async fn test_unknown_tool_is_envelope_error() {
    let app = app();
    let response = call(&app, "nope", json!({})).await;

    assert!(response.get("result").is_none());
    assert_eq!(response["error"]["code"], json!(-32603));
    assert!(response["error"]["message"]
        .as_str()
        .unwrap()
        .contains("Unknown tool: nope"));
    assert!(response["error"]["data"]["timestamp"].is_string());
    assert_eq!(response["id"], json!(1));
}

#[tokio::test]
async fn test_handler_failure_is_tool_level_error() {
    let app = app();
    let response = call(&app, "broken", json!({})).await;

    assert!(response.get("error").is_none());
    assert_eq!(response["result"]["isError"], json!(true));
    assert_eq!(
        response["result"]["content"][0]["text"],
        json!("Error: upstream exploded")
    );
}

#[tokio::test]
async fn test_panicking_handler_is_contained() {
    let app = app();
    let response = call(&app, "panics", json!({})).await;

    assert_eq!(response["error"]["code"], json!(-32603));
    assert!(response["error"]["message"]
        .as_str()
        .unwrap()
        .contains("handler blew up"));

    // The dispatcher keeps serving afterwards.
    let response = call(&app, "echo", json!({ "ok": true })).await;
    assert!(response.get("error").is_none());
}

#[tokio::test]
async fn test_missing_method() {
    let app = app();
    let response = dispatch(&app, json!({ "jsonrpc": "2.0", "id": 3 })).await;

    assert_eq!(response["error"]["code"], json!(-32603));
    assert!(response["error"]["message"]
        .as_str()
        .unwrap()
        .contains("missing required field: method"));
    assert_eq!(response["id"], json!(3));
}

#[tokio::test]
async fn test_unknown_method() {
    let app = app();
    let response = dispatch(
        &app,
        json!({ "jsonrpc": "2.0", "method": "resources/list", "id": 4 }),
    )
    .await;

    assert_eq!(response["error"]["code"], json!(-32603));
    assert!(response["error"]["message"]
        .as_str()
        .unwrap()
        .contains("resources/list"));
}

#[tokio::test]
async fn test_missing_tool_name() {
    let app = app();
    let response = dispatch(
        &app,
        json!({ "jsonrpc": "2.0", "method": "tools/call", "params": { "arguments": {} }, "id": 5 }),
    )
    .await;

    assert_eq!(response["error"]["code"], json!(-32603));
    assert_eq!(response["error"]["message"], json!("Missing tool name"));
}

#[tokio::test]
async fn test_unparsable_body_is_parse_error() {
    let app = app();
    let response = app.dispatcher.dispatch_str("{not json").await;

    assert!(response.is_error());
    let response = serde_json::to_value(response).unwrap();
    assert_eq!(response["error"]["code"], json!(-32700));
    assert_eq!(response["id"], Value::Null);
}

#[tokio::test]
async fn test_missing_id_echoed_as_null() {
    let app = app();
    let response = dispatch(&app, json!({ "jsonrpc": "2.0", "method": "tools/list" })).await;

    assert_eq!(response["id"], Value::Null);
    assert!(response["result"]["tools"].is_array());
}

#[tokio::test]
async fn test_schema_defaults_and_validation() {
    let app = app();

    let response = call(&app, "greet", json!({ "name": "ada" })).await;
    assert_eq!(response["result"]["content"][0]["text"], json!("hello ada"));

    let response = call(&app, "greet", json!({ "name": "ada", "times": 2 })).await;
    assert_eq!(
        response["result"]["content"][0]["text"],
        json!("hello ada hello ada")
    );

    let response = call(&app, "greet", json!({})).await;
    assert!(response.get("error").is_none());
    assert_eq!(response["result"]["isError"], json!(true));
    assert!(response["result"]["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("name"));

    let response = call(&app, "greet", json!({ "name": "ada", "times": 9 })).await;
    assert_eq!(response["result"]["isError"], json!(true));
}

#[tokio::test]
async fn test_concurrent_calls_all_answered() {
    let app = app();

    let mut handles = Vec::new();
    for i in 0..32 {
        let dispatcher = app.dispatcher.clone();
        handles.push(tokio::spawn(async move {
            let response = dispatcher
                .dispatch_value(json!({
                    "jsonrpc": "2.0",
                    "method": "tools/call",
                    "params": { "name": "echo", "arguments": { "i": i } },
                    "id": i,
                }))
                .await;
            (i, serde_json::to_value(response).unwrap())
        }));
    }

    for handle in handles {
        let (i, response) = handle.await.unwrap();
        assert_eq!(response["id"], json!(i));
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        let echoed: Value = serde_json::from_str(text).unwrap();
        assert_eq!(echoed, json!({ "i": i }));
    }
}

#[tokio::test]
async fn test_typed_request() {
    let app = app();
    let mut arguments = serde_json::Map::new();
    arguments.insert("name".into(), json!("grace"));

    let request = JsonRpcRequest::new(
        METHOD_CALL_TOOL,
        Some(CallToolParams::new("greet", arguments)),
        json!(9),
    );
    let response = app.dispatcher.dispatch(request).await;

    assert!(!response.is_error());
    assert_eq!(response.id, json!(9));
    assert_eq!(
        response.result.unwrap()["content"][0]["text"],
        json!("hello grace")
    );
}
