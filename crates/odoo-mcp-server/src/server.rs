//! MCP request dispatcher
//!
//! Routes JSON-RPC requests to tool, resource, and prompt handlers. Tool
//! invocations pass through the rate limiter before their handler runs and
//! through the audit writer after; tool failures come back as `isError`
//! tool results, while protocol errors are reserved for unknown
//! methods/tools, malformed parameters, and crashes.

use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use odoo_mcp_errors::{ErrorCategory, ErrorResponse, codes};
use odoo_mcp_resources::ResourceProvider;
use odoo_mcp_safety::{AuditEntry, AuditLogger, RateLimiter};
use odoo_mcp_toolsets::ToolsetRegistry;
use serde_json::{Value, json};

use crate::prompts::PromptProvider;
use crate::protocol::{
    GetPromptResult, InitializeParams, InitializeResult, JsonRpcErrorResponse, JsonRpcRequest,
    JsonRpcResponse, MCP_PROTOCOL_VERSION, PromptsGetParams, ResourceContents, ResourceDescriptor,
    ResourceReadParams, ResourceReadResult, ResourceTemplateDescriptor,
    ResourceTemplatesListResult, ResourcesListResult, SUPPORTED_PROTOCOL_VERSIONS,
    ServerCapabilities, ServerInfo, ToolCallParams, ToolCallResult, ToolDescriptor,
    ToolsListResult, error_codes,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerState {
    Uninitialized,
    Ready,
}

/// The MCP server core shared by every transport
pub struct McpServer {
    state: std::sync::Mutex<ServerState>,
    tools: ToolsetRegistry,
    resources: Arc<ResourceProvider>,
    prompts: PromptProvider,
    limiter: RateLimiter,
    audit: AuditLogger,
    uid: i64,
}

impl McpServer {
    pub fn new(
        tools: ToolsetRegistry,
        resources: Arc<ResourceProvider>,
        prompts: PromptProvider,
        limiter: RateLimiter,
        audit: AuditLogger,
        uid: i64,
    ) -> Self {
        Self {
            state: std::sync::Mutex::new(ServerState::Uninitialized),
            tools,
            resources,
            prompts,
            limiter,
            audit,
            uid,
        }
    }

    pub fn resources(&self) -> &Arc<ResourceProvider> {
        &self.resources
    }

    /// Handle one raw JSON-RPC line; `None` means nothing to send back
    pub async fn handle_line(&self, line: &str, session: &str) -> Option<String> {
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable request");
                let response = JsonRpcErrorResponse::new(
                    Value::Null,
                    error_codes::PARSE_ERROR,
                    "Parse error",
                );
                return serde_json::to_string(&response).ok();
            }
        };
        let response = self.handle(request, session).await?;
        serde_json::to_string(&response).ok()
    }

    /// Dispatch one request
    pub async fn handle(&self, request: JsonRpcRequest, session: &str) -> Option<Value> {
        // Client notifications need no response
        let Some(id) = request.id.clone() else {
            if request.method == "notifications/initialized" {
                tracing::debug!("client completed initialization");
            }
            return None;
        };

        let method = request.method.as_str();
        tracing::debug!(method, "handling request");

        if method == "initialize" {
            return Some(self.initialize(id, request.params));
        }
        if *self.state.lock().expect("state lock") != ServerState::Ready {
            return Some(error_response(
                id,
                error_codes::INTERNAL_ERROR,
                "server not initialized",
            ));
        }

        match method {
            "ping" => Some(result_response(id, json!({}))),
            "tools/list" => Some(self.tools_list(id)),
            "tools/call" => Some(self.tools_call(id, request.params, session).await),
            "resources/list" => Some(self.resources_list(id)),
            "resources/templates/list" => Some(self.resource_templates_list(id)),
            "resources/read" => Some(self.resources_read(id, request.params).await),
            "resources/subscribe" => Some(self.resources_subscribe(id, request.params, session).await),
            "resources/unsubscribe" => {
                Some(self.resources_unsubscribe(id, request.params, session).await)
            }
            "prompts/list" => Some(result_response(
                id,
                serde_json::to_value(self.prompts.list()).unwrap_or_default(),
            )),
            "prompts/get" => Some(self.prompts_get(id, request.params)),
            other => Some(error_response(
                id,
                error_codes::METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            )),
        }
    }

    fn initialize(&self, id: Value, params: Option<Value>) -> Value {
        let params: InitializeParams = match serde_json::from_value(params.unwrap_or(Value::Null)) {
            Ok(params) => params,
            Err(e) => {
                return error_response(
                    id,
                    error_codes::INVALID_PARAMS,
                    format!("Invalid params: {e}"),
                );
            }
        };

        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&params.protocol_version.as_str()) {
            return error_response(
                id,
                error_codes::INVALID_PARAMS,
                format!("Unsupported protocol version: {}", params.protocol_version),
            );
        }

        *self.state.lock().expect("state lock") = ServerState::Ready;
        tracing::info!(protocol = %params.protocol_version, "session initialized");

        let result = InitializeResult {
            protocol_version: MCP_PROTOCOL_VERSION.to_owned(),
            capabilities: ServerCapabilities::advertised(),
            server_info: ServerInfo {
                name: "odoo-mcp".to_owned(),
                version: env!("CARGO_PKG_VERSION").to_owned(),
            },
        };
        result_response(id, serde_json::to_value(result).unwrap_or_default())
    }

    fn tools_list(&self, id: Value) -> Value {
        let tools: Vec<ToolDescriptor> = self
            .tools
            .tools()
            .map(|spec| ToolDescriptor {
                name: spec.name.clone(),
                description: spec.description.clone(),
                input_schema: spec.input_schema.clone(),
                annotations: serde_json::to_value(spec.annotations).unwrap_or_default(),
            })
            .collect();
        result_response(
            id,
            serde_json::to_value(ToolsListResult { tools }).unwrap_or_default(),
        )
    }

    async fn tools_call(&self, id: Value, params: Option<Value>, session: &str) -> Value {
        let params: ToolCallParams = match serde_json::from_value(params.unwrap_or(Value::Null)) {
            Ok(params) => params,
            Err(e) => {
                return error_response(
                    id,
                    error_codes::INVALID_PARAMS,
                    format!("Invalid params: {e}"),
                );
            }
        };

        // Hidden tools were never registered, so an unknown name is a
        // protocol-level method-not-found either way
        let Some(spec) = self.tools.get_tool(&params.name) else {
            return error_response(
                id,
                error_codes::METHOD_NOT_FOUND,
                format!("Unknown tool: {}", params.name),
            );
        };

        if let Err(exceeded) = self.limiter.check(session, spec.operation) {
            let response = ErrorResponse::new(
                ErrorCategory::RateLimit,
                codes::RATE_LIMITED,
                exceeded.to_string(),
                format!(
                    "Rate limit exceeded. Wait {} seconds before retrying.",
                    exceeded.retry_after
                ),
            )
            .with_retry_after(exceeded.retry_after);
            let payload = serde_json::to_value(&response).unwrap_or_default();
            return result_response(
                id,
                serde_json::to_value(ToolCallResult::error(&payload)).unwrap_or_default(),
            );
        }

        let arguments = params.arguments.unwrap_or_default();
        let model = arguments
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let values = arguments.get("values").and_then(Value::as_object).cloned();

        let started = Instant::now();
        let handler = Arc::clone(&spec.handler);
        let operation = spec.operation;
        let tool_name = spec.name.clone();

        // An unhandled crash in a tool is a framework error, not a tool
        // result
        let outcome = std::panic::AssertUnwindSafe(handler(arguments))
            .catch_unwind()
            .await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let result = match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(tool = %tool_name, "tool handler panicked");
                return error_response(id, error_codes::INTERNAL_ERROR, "internal server error");
            }
        };

        let (payload, success) = match &result {
            Ok(payload) => (ToolCallResult::success(payload), true),
            Err(error) => (
                ToolCallResult::error(&serde_json::to_value(error).unwrap_or_default()),
                false,
            ),
        };

        self.audit.record(&AuditEntry {
            session_id: session.to_owned(),
            tool: tool_name,
            model,
            operation,
            values,
            result: result.as_ref().ok().and_then(|v| v.get("id").cloned()),
            success,
            duration_ms,
            uid: self.uid,
        });

        result_response(id, serde_json::to_value(payload).unwrap_or_default())
    }

    fn resources_list(&self, id: Value) -> Value {
        let resources: Vec<ResourceDescriptor> = ResourceProvider::resource_definitions()
            .iter()
            .map(|definition| ResourceDescriptor {
                uri: definition.uri.to_owned(),
                name: definition.name.to_owned(),
                mime_type: definition.mime_type.to_owned(),
                description: definition.description.to_owned(),
            })
            .collect();
        result_response(
            id,
            serde_json::to_value(ResourcesListResult { resources }).unwrap_or_default(),
        )
    }

    fn resource_templates_list(&self, id: Value) -> Value {
        let resource_templates: Vec<ResourceTemplateDescriptor> =
            ResourceProvider::resource_templates()
                .iter()
                .map(|template| ResourceTemplateDescriptor {
                    uri_template: template.uri_template.to_owned(),
                    name: template.name.to_owned(),
                    mime_type: template.mime_type.to_owned(),
                    description: template.description.to_owned(),
                })
                .collect();
        result_response(
            id,
            serde_json::to_value(ResourceTemplatesListResult { resource_templates })
                .unwrap_or_default(),
        )
    }

    async fn resources_read(&self, id: Value, params: Option<Value>) -> Value {
        let params: ResourceReadParams = match serde_json::from_value(params.unwrap_or(Value::Null))
        {
            Ok(params) => params,
            Err(e) => {
                return error_response(
                    id,
                    error_codes::INVALID_PARAMS,
                    format!("Invalid params: {e}"),
                );
            }
        };

        let content = self.resources.read_resource(&params.uri).await;
        let result = ResourceReadResult {
            contents: vec![ResourceContents {
                uri: params.uri,
                mime_type: "application/json".to_owned(),
                text: serde_json::to_string_pretty(&content).unwrap_or_default(),
            }],
        };
        result_response(id, serde_json::to_value(result).unwrap_or_default())
    }

    async fn resources_subscribe(&self, id: Value, params: Option<Value>, session: &str) -> Value {
        let Some(uri) = params
            .as_ref()
            .and_then(|p| p.get("uri"))
            .and_then(Value::as_str)
        else {
            return error_response(id, error_codes::INVALID_PARAMS, "Invalid params: missing uri");
        };
        let result = self.resources.subscribe(session, uri).await;
        result_response(id, result)
    }

    async fn resources_unsubscribe(&self, id: Value, params: Option<Value>, session: &str) -> Value {
        let Some(uri) = params
            .as_ref()
            .and_then(|p| p.get("uri"))
            .and_then(Value::as_str)
        else {
            return error_response(id, error_codes::INVALID_PARAMS, "Invalid params: missing uri");
        };
        let result = self.resources.unsubscribe(session, uri).await;
        result_response(id, result)
    }

    fn prompts_get(&self, id: Value, params: Option<Value>) -> Value {
        let params: PromptsGetParams = match serde_json::from_value(params.unwrap_or(Value::Null)) {
            Ok(params) => params,
            Err(e) => {
                return error_response(
                    id,
                    error_codes::INVALID_PARAMS,
                    format!("Invalid params: {e}"),
                );
            }
        };

        let result: Option<GetPromptResult> =
            self.prompts.get(&params.name, params.arguments.as_ref());
        match result {
            Some(result) => {
                result_response(id, serde_json::to_value(result).unwrap_or_default())
            }
            None => error_response(
                id,
                error_codes::INVALID_PARAMS,
                format!("Unknown prompt: {}", params.name),
            ),
        }
    }
}

fn result_response(id: Value, result: Value) -> Value {
    serde_json::to_value(JsonRpcResponse::new(id, result)).unwrap_or_default()
}

fn error_response(id: Value, code: i64, message: impl Into<String>) -> Value {
    serde_json::to_value(JsonRpcErrorResponse::new(id, code, message)).unwrap_or_default()
}
