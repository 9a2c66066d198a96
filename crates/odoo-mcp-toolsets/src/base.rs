//! Toolset contract and tool plumbing
//!
//! Toolsets are discovered from one explicit list, without reflection. Each
//! implements the two-operation contract: describe yourself, hand over
//! your tools.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use odoo_mcp_config::{DisplayConfig, SearchConfig};
use odoo_mcp_connection::Backend;
use odoo_mcp_core::OdooVersion;
use odoo_mcp_errors::{ErrorHandler, ErrorResponse};
use odoo_mcp_registry::ModelRegistry;
use odoo_mcp_safety::{Operation, SafetyPolicy};
use serde::Serialize;
use serde_json::{Map, Value};

/// Canonical tool naming: `odoo_{toolset}_{action}`
pub fn tool_name(toolset: &str, action: &str) -> String {
    format!("odoo_{toolset}_{action}")
}

/// MCP tool annotations
///
/// Every tool talks to an external backend, so `open_world` is always on.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ToolAnnotations {
    pub title: &'static str,
    #[serde(rename = "readOnlyHint")]
    pub read_only: bool,
    #[serde(rename = "destructiveHint")]
    pub destructive: bool,
    #[serde(rename = "idempotentHint")]
    pub idempotent: bool,
    #[serde(rename = "openWorldHint")]
    pub open_world: bool,
}

impl ToolAnnotations {
    pub const fn read_only(title: &'static str) -> Self {
        Self {
            title,
            read_only: true,
            destructive: false,
            idempotent: true,
            open_world: true,
        }
    }

    pub const fn write(title: &'static str) -> Self {
        Self {
            title,
            read_only: false,
            destructive: false,
            idempotent: false,
            open_world: true,
        }
    }

    pub const fn write_idempotent(title: &'static str) -> Self {
        Self {
            title,
            read_only: false,
            destructive: false,
            idempotent: true,
            open_world: true,
        }
    }

    pub const fn destructive(title: &'static str) -> Self {
        Self {
            title,
            read_only: false,
            destructive: true,
            idempotent: true,
            open_world: true,
        }
    }
}

/// Boxed async tool handler: JSON arguments in, success payload or
/// structured error out
pub type ToolFuture = Pin<Box<dyn Future<Output = Result<Value, ErrorResponse>> + Send>>;
pub type ToolFn = Arc<dyn Fn(Map<String, Value>) -> ToolFuture + Send + Sync>;

/// One registered tool
#[derive(Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub annotations: ToolAnnotations,
    /// The operation kind used for visibility, rate limiting, and audit
    pub operation: Operation,
    pub handler: ToolFn,
}

/// Shared dependencies handed to toolsets at registration time
#[derive(Clone)]
pub struct ToolContext {
    pub backend: Arc<dyn Backend>,
    pub policy: Arc<SafetyPolicy>,
    pub registry: Arc<ModelRegistry>,
    pub errors: ErrorHandler,
    pub search: SearchConfig,
    pub display: DisplayConfig,
    pub version: Option<OdooVersion>,
    /// Filled by the registry once registration completes; read by the
    /// toolset-listing meta tool
    pub report: Arc<std::sync::RwLock<Option<crate::registry::RegistrationReport>>>,
}

/// Toolset identity and prerequisites
#[derive(Debug, Clone, Serialize)]
pub struct ToolsetMetadata {
    pub name: String,
    pub description: String,
    pub version: String,
    /// Backend modules that must be installed
    pub required_modules: Vec<String>,
    pub min_backend_major: Option<u32>,
    pub max_backend_major: Option<u32>,
    /// Toolsets that must already be registered
    pub depends_on: Vec<String>,
    pub tags: Vec<String>,
}

impl ToolsetMetadata {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_owned(),
            description: description.to_owned(),
            version: "1.0.0".to_owned(),
            required_modules: Vec::new(),
            min_backend_major: None,
            max_backend_major: None,
            depends_on: Vec::new(),
            tags: Vec::new(),
        }
    }
}

/// The two-operation toolset contract
pub trait Toolset: Send + Sync {
    fn metadata(&self) -> ToolsetMetadata;

    /// Build this toolset's tools against the shared context
    ///
    /// Tools whose operation is hidden in the current mode must not be
    /// returned at all.
    fn tools(&self, context: &ToolContext) -> Vec<ToolSpec>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naming_convention() {
        assert_eq!(tool_name("core", "search_read"), "odoo_core_search_read");
        assert_eq!(tool_name("sales", "confirm_order"), "odoo_sales_confirm_order");
    }

    #[test]
    fn annotations_serialize_as_mcp_hints() {
        let json =
            serde_json::to_value(ToolAnnotations::destructive("Delete Record")).expect("serializes");
        assert_eq!(json["readOnlyHint"], false);
        assert_eq!(json["destructiveHint"], true);
        assert_eq!(json["idempotentHint"], true);
        assert_eq!(json["openWorldHint"], true);
    }
}
