//! Full MCP dispatch scenarios against the mock backend

mod harness;

use std::sync::Arc;

use harness::mock_odoo::MockOdoo;
use odoo_mcp_config::OdooMcpConfig;
use odoo_mcp_connection::{Backend, ConnectionManager};
use odoo_mcp_registry::ModelRegistry;
use odoo_mcp_resources::{ResourceProvider, ServerIdentity};
use odoo_mcp_safety::{AuditLogger, RateLimiter, SafetyPolicy};
use odoo_mcp_server::{McpServer, PromptProvider};
use odoo_mcp_toolsets::core::CoreToolset;
use odoo_mcp_toolsets::sales::SalesToolset;
use odoo_mcp_toolsets::{ToolContext, Toolset, ToolsetRegistry};
use serde_json::{Value, json};

fn config_for(url: &str, mode: &str) -> OdooMcpConfig {
    let raw = json!({
        "connection": {
            "url": url,
            "database": "test",
            "username": "svc",
            "password": "good",
        },
        "safety": {"mode": mode, "write_allowlist": []},
    });
    serde_json::from_value(raw).expect("valid config")
}

async fn build_server(config: OdooMcpConfig) -> (Arc<McpServer>, Arc<ConnectionManager>) {
    let manager = Arc::new(ConnectionManager::new(config.clone()));
    manager.connect().await.expect("connects");

    let backend: Arc<dyn Backend> = Arc::clone(&manager) as Arc<dyn Backend>;
    let policy = Arc::new(SafetyPolicy::from_config(&config.safety));
    let registry = Arc::new(ModelRegistry::new());
    let report = Arc::new(std::sync::RwLock::new(None));
    let context = ToolContext {
        backend: Arc::clone(&backend),
        policy: Arc::clone(&policy),
        registry: Arc::clone(&registry),
        errors: odoo_mcp_errors::ErrorHandler::new(),
        search: config.search.clone(),
        display: config.display.clone(),
        version: manager.odoo_version().await,
        report: Arc::clone(&report),
    };

    let toolsets: Vec<Box<dyn Toolset>> = vec![Box::new(CoreToolset), Box::new(SalesToolset)];
    let installed = manager.installed_modules().await;
    let tools = ToolsetRegistry::register_all(&toolsets, &context, &config.toolsets, &installed)
        .expect("registers");

    let resources = Arc::new(ResourceProvider::new(
        backend,
        registry,
        policy,
        report,
        ServerIdentity::default(),
    ));
    let prompts = PromptProvider::new("17.0".to_owned(), "test".to_owned(), vec!["core".to_owned()]);

    let server = Arc::new(McpServer::new(
        tools,
        resources,
        prompts,
        RateLimiter::new(&config.rate_limit),
        AuditLogger::disabled(),
        2,
    ));
    (server, manager)
}

async fn rpc(server: &McpServer, id: u32, method: &str, params: Value) -> Value {
    let line = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}).to_string();
    let response = server
        .handle_line(&line, "test-session")
        .await
        .expect("response");
    serde_json::from_str(&response).expect("valid JSON response")
}

async fn initialize(server: &McpServer) {
    let response = rpc(
        server,
        1,
        "initialize",
        json!({"protocolVersion": "2025-06-18", "capabilities": {}, "clientInfo": {}}),
    )
    .await;
    assert_eq!(
        response["result"]["capabilities"]["resources"]["subscribe"],
        json!(true)
    );
}

fn tool_result_payload(response: &Value) -> (bool, Value) {
    let is_error = response["result"]["isError"].as_bool().expect("isError");
    let text = response["result"]["content"][0]["text"]
        .as_str()
        .expect("text content");
    (is_error, serde_json::from_str(text).expect("payload JSON"))
}

#[tokio::test]
async fn create_with_missing_field_is_classified_validation() {
    let mock = MockOdoo::start().await.expect("mock starts");
    let (server, _manager) = build_server(config_for(&mock.url(), "full")).await;
    initialize(&server).await;

    let response = rpc(
        &server,
        2,
        "tools/call",
        json!({
            "name": "odoo_core_create",
            "arguments": {"model": "sale.order", "values": {}},
        }),
    )
    .await;

    let (is_error, payload) = tool_result_payload(&response);
    assert!(is_error);
    assert_eq!(payload["category"], json!("validation"));
    assert_eq!(payload["code"], json!("MISSING_REQUIRED_FIELD"));
    assert_eq!(payload["retry"], json!(true));
    assert_eq!(payload["details"]["field"], json!("partner_id"));
    assert!(
        payload["suggestion"]
            .as_str()
            .expect("suggestion")
            .contains("fields_get")
    );
    // The traceback stays in original_error and nowhere else
    assert!(payload["message"].as_str().expect("message").len() < 200);
}

#[tokio::test]
async fn readonly_mode_hides_unlink_entirely() {
    let mock = MockOdoo::start().await.expect("mock starts");
    let (server, _manager) = build_server(config_for(&mock.url(), "readonly")).await;
    initialize(&server).await;

    let listing = rpc(&server, 2, "tools/list", json!({})).await;
    let tools = listing["result"]["tools"].as_array().expect("tools");
    let names: Vec<&str> = tools
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert!(names.contains(&"odoo_core_search_read"));
    assert!(!names.contains(&"odoo_core_unlink"));
    assert!(!names.contains(&"odoo_core_create"));
    // Sales tools are write-only, so the whole toolset is absent
    assert!(!names.iter().any(|n| n.starts_with("odoo_sales_")));

    // Calling the hidden tool by name is a protocol-level method-not-found
    let response = rpc(
        &server,
        3,
        "tools/call",
        json!({"name": "odoo_core_unlink", "arguments": {"model": "sale.order", "ids": [1]}}),
    )
    .await;
    assert_eq!(response["error"]["code"], json!(-32601));
}

#[tokio::test]
async fn search_read_normalizes_relational_pairs() {
    let mock = MockOdoo::start().await.expect("mock starts");
    let (server, _manager) = build_server(config_for(&mock.url(), "readonly")).await;
    initialize(&server).await;

    let response = rpc(
        &server,
        2,
        "tools/call",
        json!({
            "name": "odoo_core_search_read",
            "arguments": {"model": "sale.order", "fields": ["name", "partner_id", "state"]},
        }),
    )
    .await;

    let (is_error, payload) = tool_result_payload(&response);
    assert!(!is_error);
    assert_eq!(payload["records"][0]["partner_id"], json!({"id": 7, "name": "Acme"}));
    assert_eq!(payload["model"], json!("sale.order"));
}

#[tokio::test]
async fn unknown_tool_and_unknown_method_are_protocol_errors() {
    let mock = MockOdoo::start().await.expect("mock starts");
    let (server, _manager) = build_server(config_for(&mock.url(), "readonly")).await;
    initialize(&server).await;

    let response = rpc(
        &server,
        2,
        "tools/call",
        json!({"name": "odoo_core_frobnicate", "arguments": {}}),
    )
    .await;
    assert_eq!(response["error"]["code"], json!(-32601));

    let response = rpc(&server, 3, "bogus/method", json!({})).await;
    assert_eq!(response["error"]["code"], json!(-32601));
}

#[tokio::test]
async fn rate_limited_call_returns_retry_after() {
    let mock = MockOdoo::start().await.expect("mock starts");
    let mut config = config_for(&mock.url(), "readonly");
    config.rate_limit.enabled = true;
    config.rate_limit.burst = 1;
    let (server, _manager) = build_server(config).await;
    initialize(&server).await;

    let call = json!({
        "name": "odoo_core_count",
        "arguments": {"model": "sale.order"},
    });
    let first = rpc(&server, 2, "tools/call", call.clone()).await;
    let (is_error, _) = tool_result_payload(&first);
    assert!(!is_error);

    let second = rpc(&server, 3, "tools/call", call).await;
    let (is_error, payload) = tool_result_payload(&second);
    assert!(is_error);
    assert_eq!(payload["category"], json!("rate_limit"));
    assert_eq!(payload["code"], json!("RATE_LIMITED"));
    assert!(payload["retry_after"].as_u64().expect("retry_after") >= 1);
}

#[tokio::test]
async fn resources_read_and_subscribe_over_mcp() {
    let mock = MockOdoo::start().await.expect("mock starts");
    let (server, _manager) = build_server(config_for(&mock.url(), "readonly")).await;
    initialize(&server).await;

    let response = rpc(
        &server,
        2,
        "resources/read",
        json!({"uri": "odoo://config/safety"}),
    )
    .await;
    let text = response["result"]["contents"][0]["text"]
        .as_str()
        .expect("text");
    let safety: Value = serde_json::from_str(text).expect("valid JSON");
    assert_eq!(safety["mode"], json!("readonly"));

    let response = rpc(
        &server,
        3,
        "resources/subscribe",
        json!({"uri": "odoo://record/sale.order/1"}),
    )
    .await;
    assert_eq!(response["result"]["subscribed"], json!(true));

    let response = rpc(
        &server,
        4,
        "resources/unsubscribe",
        json!({"uri": "odoo://record/sale.order/1"}),
    )
    .await;
    assert_eq!(response["result"]["unsubscribed"], json!(true));
}
