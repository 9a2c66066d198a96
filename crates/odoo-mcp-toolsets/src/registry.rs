//! Toolset registry
//!
//! Orders the declared toolsets by dependency, gates each on its
//! prerequisites, and registers their tools. Unmet prerequisites skip the
//! toolset with a recorded reason; duplicate tool names and dependency
//! cycles are fatal startup errors.

use std::collections::{BTreeMap, HashMap, HashSet};

use odoo_mcp_config::ToolsetFilterConfig;
use serde::Serialize;
use thiserror::Error;

use crate::base::{ToolContext, ToolSpec, Toolset, ToolsetMetadata};

/// Fatal registration failures
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("circular toolset dependency: {0}")]
    CircularDependency(String),

    #[error("duplicate tool name '{tool}': declared by both '{first}' and '{second}'")]
    DuplicateTool {
        tool: String,
        first: String,
        second: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolsetStatus {
    Registered,
    Skipped,
}

/// Outcome for one toolset
#[derive(Debug, Clone, Serialize)]
pub struct ToolsetRegistrationResult {
    pub name: String,
    pub status: ToolsetStatus,
    pub tools_registered: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

/// Registration report, exposed to clients via `odoo://system/toolsets`
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistrationReport {
    pub results: Vec<ToolsetRegistrationResult>,
    pub total_toolsets: usize,
    pub registered_toolsets: usize,
    pub total_tools: usize,
    pub timestamp: String,
}

/// Registers toolsets and owns the resulting tool table
pub struct ToolsetRegistry {
    tools: BTreeMap<String, ToolSpec>,
    tool_owner: HashMap<String, String>,
    registered: Vec<ToolsetMetadata>,
    report: RegistrationReport,
}

impl std::fmt::Debug for ToolsetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolsetRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("tool_owner", &self.tool_owner)
            .field("registered", &self.registered)
            .field("report", &self.report)
            .finish()
    }
}

impl ToolsetRegistry {
    /// Run the registration pipeline over the declared toolset list
    ///
    /// # Errors
    ///
    /// Returns a fatal error on a dependency cycle or a duplicate tool
    /// name; prerequisite failures only skip the affected toolset.
    pub fn register_all(
        toolsets: &[Box<dyn Toolset>],
        context: &ToolContext,
        filter: &ToolsetFilterConfig,
        installed_modules: &[String],
    ) -> Result<Self, RegistryError> {
        let ordered = topological_order(toolsets)?;
        let installed: HashSet<&str> = installed_modules.iter().map(String::as_str).collect();
        let backend_major = context.version.as_ref().map(|v| v.major);

        let mut registry = Self {
            tools: BTreeMap::new(),
            tool_owner: HashMap::new(),
            registered: Vec::new(),
            report: RegistrationReport {
                total_toolsets: ordered.len(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                ..RegistrationReport::default()
            },
        };

        let mut registered_names: HashSet<String> = HashSet::new();

        for index in ordered {
            let toolset = &toolsets[index];
            let meta = toolset.metadata();

            let skip_reason = check_filter(&meta.name, filter)
                .or_else(|| check_modules(&meta, &installed))
                .or_else(|| check_version(&meta, backend_major))
                .or_else(|| check_dependencies(&meta, &registered_names));

            if let Some(reason) = skip_reason {
                tracing::info!(toolset = %meta.name, reason = %reason, "toolset skipped");
                registry.report.results.push(ToolsetRegistrationResult {
                    name: meta.name.clone(),
                    status: ToolsetStatus::Skipped,
                    tools_registered: Vec::new(),
                    skip_reason: Some(reason),
                });
                continue;
            }

            let specs = toolset.tools(context);
            let mut names = Vec::with_capacity(specs.len());
            for spec in specs {
                if let Some(existing) = registry.tool_owner.get(&spec.name) {
                    return Err(RegistryError::DuplicateTool {
                        tool: spec.name.clone(),
                        first: existing.clone(),
                        second: meta.name.clone(),
                    });
                }
                registry
                    .tool_owner
                    .insert(spec.name.clone(), meta.name.clone());
                names.push(spec.name.clone());
                registry.tools.insert(spec.name.clone(), spec);
            }

            tracing::info!(
                toolset = %meta.name,
                tools = names.len(),
                "toolset registered"
            );
            registered_names.insert(meta.name.clone());
            registry.report.results.push(ToolsetRegistrationResult {
                name: meta.name.clone(),
                status: ToolsetStatus::Registered,
                tools_registered: names,
                skip_reason: None,
            });
            registry.registered.push(meta);
        }

        registry.report.registered_toolsets = registry.registered.len();
        registry.report.total_tools = registry.tools.len();
        tracing::info!(
            toolsets = registry.report.registered_toolsets,
            total = registry.report.total_toolsets,
            tools = registry.report.total_tools,
            "toolset registration complete"
        );

        *context.report.write().expect("report lock") = Some(registry.report.clone());
        Ok(registry)
    }

    pub fn tools(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools.values()
    }

    pub fn get_tool(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name)
    }

    pub fn registered_toolsets(&self) -> &[ToolsetMetadata] {
        &self.registered
    }

    pub fn report(&self) -> &RegistrationReport {
        &self.report
    }
}

/// Depth-first topological order over `depends_on`, with a readable cycle
/// report
fn topological_order(toolsets: &[Box<dyn Toolset>]) -> Result<Vec<usize>, RegistryError> {
    let metas: Vec<ToolsetMetadata> = toolsets.iter().map(|t| t.metadata()).collect();
    let by_name: HashMap<&str, usize> = metas
        .iter()
        .enumerate()
        .map(|(i, m)| (m.name.as_str(), i))
        .collect();

    let mut visited = vec![false; metas.len()];
    let mut in_stack = vec![false; metas.len()];
    let mut order = Vec::with_capacity(metas.len());

    fn visit(
        index: usize,
        metas: &[ToolsetMetadata],
        by_name: &HashMap<&str, usize>,
        visited: &mut [bool],
        in_stack: &mut [bool],
        order: &mut Vec<usize>,
        path: &mut Vec<String>,
    ) -> Result<(), RegistryError> {
        if in_stack[index] {
            let start = path
                .iter()
                .position(|n| n == &metas[index].name)
                .unwrap_or(0);
            let mut cycle = path[start..].to_vec();
            cycle.push(metas[index].name.clone());
            return Err(RegistryError::CircularDependency(cycle.join(" -> ")));
        }
        if visited[index] {
            return Ok(());
        }
        in_stack[index] = true;
        path.push(metas[index].name.clone());
        for dep in &metas[index].depends_on {
            if let Some(&dep_index) = by_name.get(dep.as_str()) {
                visit(dep_index, metas, by_name, visited, in_stack, order, path)?;
            }
        }
        path.pop();
        in_stack[index] = false;
        visited[index] = true;
        order.push(index);
        Ok(())
    }

    let mut path = Vec::new();
    for index in 0..metas.len() {
        visit(
            index,
            &metas,
            &by_name,
            &mut visited,
            &mut in_stack,
            &mut order,
            &mut path,
        )?;
    }
    Ok(order)
}

fn check_filter(name: &str, filter: &ToolsetFilterConfig) -> Option<String> {
    if !filter.enabled.is_empty() && !filter.enabled.iter().any(|n| n == name) {
        return Some("not in the enabled toolsets list".to_owned());
    }
    if filter.disabled.iter().any(|n| n == name) {
        return Some("in the disabled toolsets list".to_owned());
    }
    None
}

fn check_modules(meta: &ToolsetMetadata, installed: &HashSet<&str>) -> Option<String> {
    // With no module list from the backend, module checks are skipped
    if meta.required_modules.is_empty() || installed.is_empty() {
        return None;
    }
    let missing: Vec<&str> = meta
        .required_modules
        .iter()
        .map(String::as_str)
        .filter(|m| !installed.contains(m))
        .collect();
    if missing.is_empty() {
        None
    } else {
        Some(format!("module(s) not installed: {}", missing.join(", ")))
    }
}

fn check_version(meta: &ToolsetMetadata, backend_major: Option<u32>) -> Option<String> {
    let major = backend_major?;
    if let Some(min) = meta.min_backend_major
        && major < min
    {
        return Some(format!("requires Odoo >= {min}, got {major}"));
    }
    if let Some(max) = meta.max_backend_major
        && major > max
    {
        return Some(format!("requires Odoo <= {max}, got {major}"));
    }
    None
}

fn check_dependencies(meta: &ToolsetMetadata, registered: &HashSet<String>) -> Option<String> {
    let missing: Vec<&str> = meta
        .depends_on
        .iter()
        .map(String::as_str)
        .filter(|d| !registered.contains(*d))
        .collect();
    if missing.is_empty() {
        None
    } else {
        Some(format!(
            "depends on unregistered toolset(s): {}",
            missing.join(", ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{ToolAnnotations, ToolContext};
    use odoo_mcp_config::{DisplayConfig, SearchConfig};
    use odoo_mcp_errors::ErrorHandler;
    use odoo_mcp_registry::ModelRegistry;
    use odoo_mcp_safety::{Operation, SafetyPolicy};
    use serde_json::json;
    use std::sync::Arc;

    struct StubToolset {
        meta: ToolsetMetadata,
        tool_names: Vec<String>,
    }

    impl Toolset for StubToolset {
        fn metadata(&self) -> ToolsetMetadata {
            self.meta.clone()
        }

        fn tools(&self, _context: &ToolContext) -> Vec<ToolSpec> {
            self.tool_names
                .iter()
                .map(|name| ToolSpec {
                    name: name.clone(),
                    description: String::new(),
                    input_schema: json!({"type": "object"}),
                    annotations: ToolAnnotations::read_only("stub"),
                    operation: Operation::Read,
                    handler: Arc::new(|_| Box::pin(async { Ok(json!({})) })),
                })
                .collect()
        }
    }

    fn stub(name: &str, depends_on: &[&str], tools: &[&str]) -> Box<dyn Toolset> {
        let mut meta = ToolsetMetadata::new(name, "stub");
        meta.depends_on = depends_on.iter().map(|&s| s.to_owned()).collect();
        Box::new(StubToolset {
            meta,
            tool_names: tools.iter().map(|&s| s.to_owned()).collect(),
        })
    }

    fn stub_with_modules(name: &str, modules: &[&str]) -> Box<dyn Toolset> {
        let mut meta = ToolsetMetadata::new(name, "stub");
        meta.required_modules = modules.iter().map(|&s| s.to_owned()).collect();
        Box::new(StubToolset {
            meta,
            tool_names: vec![format!("odoo_{name}_noop")],
        })
    }

    fn context() -> ToolContext {
        use async_trait::async_trait;
        use odoo_mcp_connection::Backend;
        use odoo_mcp_core::OdooError;
        use serde_json::{Map, Value};

        struct NullBackend;

        #[async_trait]
        impl Backend for NullBackend {
            async fn execute_kw(
                &self,
                _: &str,
                _: &str,
                _: Vec<Value>,
                _: Map<String, Value>,
                _: Option<&Map<String, Value>>,
            ) -> Result<Value, OdooError> {
                Ok(Value::Null)
            }

            async fn search_read(
                &self,
                _: &str,
                _: Value,
                _: &[&str],
                _: Option<u32>,
                _: u32,
                _: Option<&str>,
            ) -> Result<Vec<Map<String, Value>>, OdooError> {
                Ok(Vec::new())
            }

            async fn search_count(&self, _: &str, _: Value) -> Result<i64, OdooError> {
                Ok(0)
            }
        }

        ToolContext {
            backend: Arc::new(NullBackend),
            policy: Arc::new(SafetyPolicy::from_config(&odoo_mcp_config::SafetyConfig::default())),
            registry: Arc::new(ModelRegistry::new()),
            errors: ErrorHandler::new(),
            search: SearchConfig::default(),
            display: DisplayConfig::default(),
            version: None,
            report: Arc::new(std::sync::RwLock::new(None)),
        }
    }

    #[test]
    fn dependencies_register_before_dependants() {
        let toolsets = vec![
            stub("sales", &["core"], &["odoo_sales_confirm_order"]),
            stub("core", &[], &["odoo_core_search_read"]),
        ];
        let registry = ToolsetRegistry::register_all(
            &toolsets,
            &context(),
            &ToolsetFilterConfig::default(),
            &[],
        )
        .expect("registers");
        let report = registry.report();
        assert_eq!(report.registered_toolsets, 2);
        assert_eq!(report.results[0].name, "core");
        assert_eq!(report.results[1].name, "sales");
    }

    #[test]
    fn cycle_is_fatal_with_a_readable_report() {
        let toolsets = vec![stub("a", &["b"], &[]), stub("b", &["a"], &[])];
        let err = ToolsetRegistry::register_all(
            &toolsets,
            &context(),
            &ToolsetFilterConfig::default(),
            &[],
        )
        .expect_err("cycle must fail");
        let message = err.to_string();
        assert!(message.contains("circular"));
        assert!(message.contains("->"));
    }

    #[test]
    fn duplicate_tool_name_is_fatal() {
        let toolsets = vec![
            stub("one", &[], &["odoo_core_read"]),
            stub("two", &[], &["odoo_core_read"]),
        ];
        let err = ToolsetRegistry::register_all(
            &toolsets,
            &context(),
            &ToolsetFilterConfig::default(),
            &[],
        )
        .expect_err("duplicate must fail");
        assert!(matches!(err, RegistryError::DuplicateTool { .. }));
    }

    #[test]
    fn missing_module_skips_with_reason() {
        let toolsets = vec![
            stub("core", &[], &["odoo_core_search_read"]),
            stub_with_modules("helpdesk", &["helpdesk"]),
        ];
        let registry = ToolsetRegistry::register_all(
            &toolsets,
            &context(),
            &ToolsetFilterConfig::default(),
            &["base".to_owned(), "sale".to_owned()],
        )
        .expect("registers");
        let report = registry.report();
        let helpdesk = report
            .results
            .iter()
            .find(|r| r.name == "helpdesk")
            .expect("present");
        assert_eq!(helpdesk.status, ToolsetStatus::Skipped);
        assert!(
            helpdesk
                .skip_reason
                .as_deref()
                .expect("reason")
                .contains("helpdesk")
        );
        assert_eq!(report.registered_toolsets, 1);
    }

    #[test]
    fn skipped_dependency_cascades() {
        let toolsets = vec![
            stub_with_modules("core", &["nonexistent_module"]),
            stub("sales", &["core"], &["odoo_sales_x"]),
        ];
        let registry = ToolsetRegistry::register_all(
            &toolsets,
            &context(),
            &ToolsetFilterConfig::default(),
            &["base".to_owned()],
        )
        .expect("registers");
        let report = registry.report();
        assert_eq!(report.registered_toolsets, 0);
        let sales = report
            .results
            .iter()
            .find(|r| r.name == "sales")
            .expect("present");
        assert!(
            sales
                .skip_reason
                .as_deref()
                .expect("reason")
                .contains("core")
        );
    }

    #[test]
    fn disabled_filter_skips() {
        let toolsets = vec![stub("core", &[], &["odoo_core_search_read"])];
        let filter = ToolsetFilterConfig {
            enabled: Vec::new(),
            disabled: vec!["core".to_owned()],
        };
        let registry =
            ToolsetRegistry::register_all(&toolsets, &context(), &filter, &[]).expect("registers");
        assert_eq!(registry.report().registered_toolsets, 0);
    }
}
