//! Core toolset: model-generic CRUD, deep search, and discovery tools
//!
//! Every handler runs the safety gate before touching the backend and
//! normalizes records before returning. Backend faults go through the
//! classifier so the caller always receives a category, a code, and an
//! actionable suggestion.

use std::future::Future;
use std::sync::Arc;

use odoo_mcp_errors::{ErrorCategory, ErrorResponse, codes};
use odoo_mcp_registry::NO_KWARGS_METHODS;
use odoo_mcp_safety::{Operation, SafetyError};
use odoo_mcp_search::{DeepSearchParams, ProgressiveSearch, validate_domain};
use serde_json::{Map, Value, json};

use crate::base::{ToolAnnotations, ToolContext, ToolSpec, Toolset, tool_name};
use crate::formatting::normalize_records;

/// Methods the execute tool treats as reads for mode checks
const READ_METHODS: &[&str] = &[
    "read",
    "search",
    "search_read",
    "search_count",
    "fields_get",
    "default_get",
    "name_get",
    "name_search",
    "check_access_rights",
    "check_access_rule",
];

const DOMAIN_SYNTAX_HELP: &str = "\
Domain syntax: list of conditions in Odoo domain format.
Each condition is a triple: [field, operator, value]
Operators: =, !=, >, >=, <, <=, like, ilike, in, not in, child_of, parent_of
Logical: '|' for OR, '&' for AND (default), '!' for NOT, in prefix notation.
Examples:
  [] -> all records
  [[\"state\", \"=\", \"draft\"]] -> records where state is draft
  [[\"name\", \"ilike\", \"acme\"]] -> name contains 'acme' (case-insensitive)
  [[\"amount\", \">=\", 1000], [\"state\", \"=\", \"posted\"]] -> AND of both
  [\"|\", [\"state\", \"=\", \"draft\"], [\"state\", \"=\", \"sent\"]] -> OR
  [[\"partner_id.country_id.code\", \"=\", \"PT\"]] -> related field traversal";

/// The core toolset
pub struct CoreToolset;

impl Toolset for CoreToolset {
    fn metadata(&self) -> crate::base::ToolsetMetadata {
        let mut meta = crate::base::ToolsetMetadata::new(
            "core",
            "Core CRUD operations on any Odoo model",
        );
        meta.min_backend_major = Some(14);
        meta.tags = vec!["core".to_owned(), "crud".to_owned()];
        meta
    }

    #[allow(clippy::too_many_lines)]
    fn tools(&self, context: &ToolContext) -> Vec<ToolSpec> {
        let core = Arc::new(Core {
            ctx: context.clone(),
        });

        let mut specs = vec![
            tool(
                &core,
                tool_name("core", "search_read"),
                format!("Search records and return field values.\n\n{DOMAIN_SYNTAX_HELP}"),
                search_read_schema(),
                ToolAnnotations::read_only("Search & Read Records"),
                Operation::Read,
                Core::search_read,
            ),
            tool(
                &core,
                tool_name("core", "read"),
                "Read specific records by ID.".to_owned(),
                read_schema(),
                ToolAnnotations::read_only("Read Records"),
                Operation::Read,
                Core::read,
            ),
            tool(
                &core,
                tool_name("core", "count"),
                format!("Count records matching a domain.\n\n{DOMAIN_SYNTAX_HELP}"),
                count_schema(),
                ToolAnnotations::read_only("Count Records"),
                Operation::Read,
                Core::count,
            ),
            tool(
                &core,
                tool_name("core", "fields_get"),
                "Get field definitions for a model, formatted for LLM consumption.".to_owned(),
                fields_get_schema(),
                ToolAnnotations::read_only("Get Field Definitions"),
                Operation::Read,
                Core::fields_get,
            ),
            tool(
                &core,
                tool_name("core", "name_get"),
                "Get display names for record IDs.".to_owned(),
                name_get_schema(),
                ToolAnnotations::read_only("Get Record Names"),
                Operation::Read,
                Core::name_get,
            ),
            tool(
                &core,
                tool_name("core", "default_get"),
                "Get default values for a model's fields.".to_owned(),
                default_get_schema(),
                ToolAnnotations::read_only("Get Default Values"),
                Operation::Read,
                Core::default_get,
            ),
            tool(
                &core,
                tool_name("core", "list_models"),
                "List available Odoo models with basic metadata.".to_owned(),
                list_models_schema(),
                ToolAnnotations::read_only("List Available Models"),
                Operation::Read,
                Core::list_models,
            ),
            tool(
                &core,
                tool_name("core", "list_toolsets"),
                "List all available toolsets and their tools. Use this to discover what operations are available."
                    .to_owned(),
                json!({"type": "object", "properties": {}, "additionalProperties": false}),
                ToolAnnotations::read_only("List Toolsets"),
                Operation::Read,
                Core::list_toolsets,
            ),
            tool(
                &core,
                tool_name("core", "deep_search"),
                "Progressive deep search across Odoo models. Automatically broadens the search strategy when initial attempts find nothing."
                    .to_owned(),
                deep_search_schema(),
                ToolAnnotations::read_only("Deep Search"),
                Operation::Read,
                Core::deep_search,
            ),
        ];

        // Write tools are dropped from the tool list entirely when the mode
        // hides them; a client calling one by name gets method-not-found.
        let write_tools = [
            tool(
                &core,
                tool_name("core", "create"),
                "Create a new record.".to_owned(),
                create_schema(),
                ToolAnnotations::write("Create Record"),
                Operation::Create,
                Core::create,
            ),
            tool(
                &core,
                tool_name("core", "write"),
                "Update existing record(s).".to_owned(),
                write_schema(),
                ToolAnnotations::write_idempotent("Update Record"),
                Operation::Write,
                Core::write,
            ),
            tool(
                &core,
                tool_name("core", "unlink"),
                "Delete record(s). Only available in full mode.".to_owned(),
                unlink_schema(),
                ToolAnnotations::destructive("Delete Record"),
                Operation::Unlink,
                Core::unlink,
            ),
            tool(
                &core,
                tool_name("core", "execute"),
                "Execute any callable method on an Odoo model.".to_owned(),
                execute_schema(),
                ToolAnnotations::write("Execute Method"),
                Operation::Execute,
                Core::execute,
            ),
        ];
        for spec in write_tools {
            if context.policy.tool_visible(spec.operation) {
                specs.push(spec);
            }
        }

        specs
    }
}

fn tool<F, Fut>(
    core: &Arc<Core>,
    name: String,
    description: String,
    input_schema: Value,
    annotations: ToolAnnotations,
    operation: Operation,
    f: F,
) -> ToolSpec
where
    F: Fn(Arc<Core>, Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ErrorResponse>> + Send + 'static,
{
    let core = Arc::clone(core);
    ToolSpec {
        name,
        description,
        input_schema,
        annotations,
        operation,
        handler: Arc::new(move |args| Box::pin(f(Arc::clone(&core), args))),
    }
}

struct Core {
    ctx: ToolContext,
}

impl Core {
    async fn search_read(self: Arc<Self>, args: Map<String, Value>) -> Result<Value, ErrorResponse> {
        let model = require_str(&args, "model")?;
        self.check_read(&model)?;

        let domain = args.get("domain").cloned().unwrap_or(json!([]));
        check_domain(&domain)?;

        let requested: Option<Vec<String>> = opt_string_list(&args, "fields");
        let wildcard = requested
            .as_ref()
            .is_some_and(|fields| fields.len() == 1 && fields[0] == "*");
        let fields: Vec<String> = match &requested {
            Some(fields) if !wildcard => fields.clone(),
            Some(_) => Vec::new(),
            None => vec!["id".to_owned(), "name".to_owned(), "display_name".to_owned()],
        };

        let max_limit = self.ctx.search.max_limit;
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .and_then(|l| u32::try_from(l).ok())
            .unwrap_or(self.ctx.search.default_limit)
            .clamp(1, max_limit);
        let offset = args.get("offset").and_then(Value::as_u64).unwrap_or(0);

        let mut kwargs = Map::new();
        if !fields.is_empty() {
            let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
            kwargs.insert("fields".to_owned(), json!(self.ctx.policy.filter_field_names(&refs)));
        }
        kwargs.insert("limit".to_owned(), json!(limit));
        kwargs.insert("offset".to_owned(), json!(offset));
        if let Some(order) = args.get("order").and_then(Value::as_str) {
            kwargs.insert("order".to_owned(), json!(order));
        }

        let context = opt_object(&args, "context");
        let result = self
            .ctx
            .backend
            .execute_kw(&model, "search_read", vec![domain], kwargs, context.as_ref())
            .await
            .map_err(|e| self.ctx.errors.classify_error(&e))?;

        let mut records = rows_of(result);
        self.normalize(&model, &mut records, requested.as_deref());
        let count = records.len();

        Ok(json!({
            "records": records,
            "count": count,
            "model": model,
            "limit": limit,
            "offset": offset,
            "has_more": count as u32 == limit,
        }))
    }

    async fn read(self: Arc<Self>, args: Map<String, Value>) -> Result<Value, ErrorResponse> {
        let model = require_str(&args, "model")?;
        self.check_read(&model)?;
        let ids = require_ids(&args, "ids", 100)?;

        let requested: Option<Vec<String>> = opt_string_list(&args, "fields");
        let mut kwargs = Map::new();
        if let Some(fields) = &requested {
            let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
            kwargs.insert("fields".to_owned(), json!(self.ctx.policy.filter_field_names(&refs)));
        }
        let context = opt_object(&args, "context");

        let result = self
            .ctx
            .backend
            .execute_kw(&model, "read", vec![json!(ids)], kwargs.clone(), context.as_ref())
            .await;

        let (mut records, missing_ids) = match result {
            Ok(value) => (rows_of(value), Vec::new()),
            Err(e) if is_missing_error(&e) => {
                // Some of the IDs are gone; find the survivors one by one
                let mut records = Vec::new();
                let mut missing = Vec::new();
                for id in &ids {
                    match self
                        .ctx
                        .backend
                        .execute_kw(&model, "read", vec![json!([id])], kwargs.clone(), context.as_ref())
                        .await
                    {
                        Ok(value) => records.extend(rows_of(value)),
                        Err(_) => missing.push(*id),
                    }
                }
                (records, missing)
            }
            Err(e) => return Err(self.ctx.errors.classify_error(&e)),
        };

        self.normalize(&model, &mut records, requested.as_deref());
        Ok(json!({"records": records, "missing_ids": missing_ids}))
    }

    async fn count(self: Arc<Self>, args: Map<String, Value>) -> Result<Value, ErrorResponse> {
        let model = require_str(&args, "model")?;
        self.check_read(&model)?;
        let domain = args.get("domain").cloned().unwrap_or(json!([]));
        check_domain(&domain)?;

        let count = self
            .ctx
            .backend
            .search_count(&model, domain.clone())
            .await
            .map_err(|e| self.ctx.errors.classify_error(&e))?;
        Ok(json!({"model": model, "domain": domain, "count": count}))
    }

    async fn fields_get(self: Arc<Self>, args: Map<String, Value>) -> Result<Value, ErrorResponse> {
        let model = require_str(&args, "model")?;
        self.check_read(&model)?;

        let attributes = opt_string_list(&args, "attributes").unwrap_or_else(|| {
            ["string", "type", "required", "readonly", "help", "selection", "relation"]
                .iter()
                .map(|&s| s.to_owned())
                .collect()
        });

        let mut kwargs = Map::new();
        kwargs.insert("attributes".to_owned(), json!(attributes));
        let context = opt_object(&args, "context");
        let raw = self
            .ctx
            .backend
            .execute_kw(&model, "fields_get", Vec::new(), kwargs, context.as_ref())
            .await
            .map_err(|e| self.ctx.errors.classify_error(&e))?;

        let mut fields_out = Map::new();
        if let Value::Object(raw) = raw {
            for (name, info) in raw {
                if self.ctx.policy.is_field_blocked(&name) {
                    continue;
                }
                let mut formatted = Map::new();
                if let Some(label) = info.get("string") {
                    formatted.insert("label".to_owned(), label.clone());
                }
                if let Some(field_type) = info.get("type") {
                    formatted.insert("type".to_owned(), field_type.clone());
                }
                for attribute in ["required", "readonly", "relation", "selection", "help"] {
                    if let Some(value) = info.get(attribute)
                        && value.as_bool() != Some(false)
                        && !value.is_null()
                    {
                        formatted.insert(attribute.to_owned(), value.clone());
                    }
                }
                fields_out.insert(name, Value::Object(formatted));
            }
        }

        let field_count = fields_out.len();
        Ok(json!({"model": model, "fields": fields_out, "field_count": field_count}))
    }

    async fn name_get(self: Arc<Self>, args: Map<String, Value>) -> Result<Value, ErrorResponse> {
        let model = require_str(&args, "model")?;
        self.check_read(&model)?;
        let ids = require_ids(&args, "ids", 200)?;

        let result = self
            .ctx
            .backend
            .execute_kw(&model, "name_get", vec![json!(ids)], Map::new(), None)
            .await
            .map_err(|e| self.ctx.errors.classify_error(&e))?;

        let names: Vec<Value> = result
            .as_array()
            .map(|pairs| {
                pairs
                    .iter()
                    .filter_map(|pair| {
                        let pair = pair.as_array()?;
                        Some(json!({"id": pair.first()?, "name": pair.get(1)?}))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(json!({"model": model, "names": names}))
    }

    async fn default_get(self: Arc<Self>, args: Map<String, Value>) -> Result<Value, ErrorResponse> {
        let model = require_str(&args, "model")?;
        self.check_read(&model)?;

        let fields = opt_string_list(&args, "fields").unwrap_or_default();
        let context = opt_object(&args, "context");
        let defaults = self
            .ctx
            .backend
            .execute_kw(&model, "default_get", vec![json!(fields)], Map::new(), context.as_ref())
            .await
            .map_err(|e| self.ctx.errors.classify_error(&e))?;

        Ok(json!({"model": model, "defaults": defaults}))
    }

    async fn list_models(self: Arc<Self>, args: Map<String, Value>) -> Result<Value, ErrorResponse> {
        let mut domain_parts = Vec::new();
        if let Some(filter) = args.get("filter").and_then(Value::as_str) {
            domain_parts.push(json!(["model", "ilike", filter]));
        }
        if !args.get("transient").and_then(Value::as_bool).unwrap_or(false) {
            domain_parts.push(json!(["transient", "=", false]));
        }

        let rows = self
            .ctx
            .backend
            .search_read(
                "ir.model",
                Value::Array(domain_parts),
                &["model", "name", "transient", "field_id"],
                None,
                0,
                None,
            )
            .await
            .map_err(|e| self.ctx.errors.classify_error(&e))?;

        let mut models_out = Vec::new();
        for row in rows {
            let Some(model_name) = row.get("model").and_then(Value::as_str) else {
                continue;
            };
            // Blocklisted models never appear, and reader rights are
            // checked against the backend
            if self.ctx.policy.is_model_blocked(model_name) {
                continue;
            }
            if !self.check_access_right(model_name, "read").await {
                continue;
            }

            let mut access = vec!["read"];
            for right in ["write", "create", "unlink"] {
                if self.check_access_right(model_name, right).await {
                    access.push(right);
                }
            }

            let field_count = row
                .get("field_id")
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            models_out.push(json!({
                "model": model_name,
                "name": row.get("name").cloned().unwrap_or(json!("")),
                "transient": row.get("transient").and_then(Value::as_bool).unwrap_or(false),
                "field_count": field_count,
                "access": access.join(","),
            }));
        }

        let count = models_out.len();
        Ok(json!({"models": models_out, "count": count}))
    }

    async fn list_toolsets(self: Arc<Self>, _args: Map<String, Value>) -> Result<Value, ErrorResponse> {
        let report = self.ctx.report.read().expect("report lock").clone();
        let mut toolsets = Vec::new();
        let mut total_tools = 0;
        if let Some(report) = &report {
            for result in &report.results {
                if result.status == crate::registry::ToolsetStatus::Registered {
                    total_tools += result.tools_registered.len();
                    toolsets.push(json!({
                        "name": result.name,
                        "tools": result.tools_registered,
                        "status": "active",
                    }));
                }
            }
        }

        Ok(json!({
            "toolsets": toolsets,
            "total_tools": total_tools,
            "odoo_version": self
                .ctx
                .version
                .as_ref()
                .map_or_else(|| "unknown".to_owned(), ToString::to_string),
        }))
    }

    async fn deep_search(self: Arc<Self>, args: Map<String, Value>) -> Result<Value, ErrorResponse> {
        let query = require_str(&args, "query")?;
        let model = args
            .get("model")
            .and_then(Value::as_str)
            .map(str::to_owned);
        if let Some(model) = &model {
            self.check_read(model)?;
        }

        let params = DeepSearchParams {
            query,
            model,
            max_depth: args
                .get("max_depth")
                .and_then(Value::as_u64)
                .and_then(|d| u32::try_from(d).ok())
                .unwrap_or(self.ctx.search.deep_search_depth),
            limit: args
                .get("limit")
                .and_then(Value::as_u64)
                .and_then(|l| u32::try_from(l).ok())
                .unwrap_or(20),
            fields: opt_string_list(&args, "fields"),
            exhaustive: args
                .get("exhaustive")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        };
        let requested = params.fields.clone();

        let engine = ProgressiveSearch::new(Arc::clone(&self.ctx.backend));
        let mut result = engine.search(params).await;

        for (model_name, records) in &mut result.results {
            let info = self.ctx.registry.get_model(model_name);
            let refs: Option<Vec<&str>> = requested
                .as_ref()
                .map(|fields| fields.iter().map(String::as_str).collect());
            normalize_records(records, info.as_ref(), &self.ctx.display, refs.as_deref());
            for record in records.iter_mut() {
                self.ctx.policy.strip_blocked_fields(record);
            }
        }

        serde_json::to_value(&result).map_err(|e| {
            ErrorResponse::new(
                ErrorCategory::Unknown,
                codes::UNKNOWN_ERROR,
                format!("failed to serialize search result: {e}"),
                "Retry the search with a smaller limit.",
            )
        })
    }

    async fn create(self: Arc<Self>, args: Map<String, Value>) -> Result<Value, ErrorResponse> {
        let model = require_str(&args, "model")?;
        let values = require_object(&args, "values")?;
        self.check_write(&model, Operation::Create)?;
        self.ctx
            .policy
            .check_write_fields(&values)
            .map_err(from_safety)?;

        let context = opt_object(&args, "context");
        let new_id = self
            .ctx
            .backend
            .execute_kw(&model, "create", vec![Value::Object(values)], Map::new(), context.as_ref())
            .await
            .map_err(|e| self.ctx.errors.classify_error(&e))?;

        Ok(json!({
            "id": new_id,
            "model": model,
            "message": format!("Created {model} record with ID {new_id}"),
        }))
    }

    async fn write(self: Arc<Self>, args: Map<String, Value>) -> Result<Value, ErrorResponse> {
        let model = require_str(&args, "model")?;
        let ids = require_ids(&args, "ids", 100)?;
        let values = require_object(&args, "values")?;
        self.check_write(&model, Operation::Write)?;
        self.ctx
            .policy
            .check_write_fields(&values)
            .map_err(from_safety)?;

        // Writes to fields the registry knows to be readonly are rejected
        // up front rather than bounced off the backend
        let readonly: Vec<&String> = values
            .keys()
            .filter(|key| {
                self.ctx
                    .registry
                    .get_field(&model, key)
                    .is_some_and(|f| f.readonly)
            })
            .collect();
        if !readonly.is_empty() {
            let names: Vec<&str> = readonly.iter().map(|s| s.as_str()).collect();
            return Err(ErrorResponse::new(
                ErrorCategory::Validation,
                codes::VALIDATION_ERROR,
                format!("cannot write to readonly field(s): {}", names.join(", ")),
                format!(
                    "Remove the readonly fields from the values. Use odoo_core_fields_get with model='{model}' to check which fields are writable."
                ),
            ));
        }

        let context = opt_object(&args, "context");
        self.ctx
            .backend
            .execute_kw(
                &model,
                "write",
                vec![json!(ids), Value::Object(values)],
                Map::new(),
                context.as_ref(),
            )
            .await
            .map_err(|e| self.ctx.errors.classify_error(&e))?;

        Ok(json!({
            "success": true,
            "model": model,
            "ids": ids,
            "message": format!("Updated {} {model} record(s)", ids.len()),
        }))
    }

    async fn unlink(self: Arc<Self>, args: Map<String, Value>) -> Result<Value, ErrorResponse> {
        let model = require_str(&args, "model")?;
        let ids = require_ids(&args, "ids", 50)?;
        self.check_write(&model, Operation::Unlink)?;

        let context = opt_object(&args, "context");
        self.ctx
            .backend
            .execute_kw(&model, "unlink", vec![json!(ids)], Map::new(), context.as_ref())
            .await
            .map_err(|e| self.ctx.errors.classify_error(&e))?;

        Ok(json!({
            "success": true,
            "model": model,
            "deleted_ids": ids,
            "message": format!("Deleted {} {model} record(s)", ids.len()),
        }))
    }

    async fn execute(self: Arc<Self>, args: Map<String, Value>) -> Result<Value, ErrorResponse> {
        let model = require_str(&args, "model")?;
        let method = require_str(&args, "method")?;

        self.ctx
            .policy
            .check_model(&model, Operation::Execute)
            .map_err(from_safety)?;

        // Private methods cannot cross the RPC boundary
        if method.starts_with('_') {
            return Err(ErrorResponse::new(
                ErrorCategory::Access,
                codes::ACCESS_DENIED,
                format!("private methods (starting with '_') cannot be called via RPC: '{method}'"),
                "Call a public method instead.",
            ));
        }
        self.ctx.policy.check_method(&method).map_err(from_safety)?;

        if !READ_METHODS.contains(&method.as_str()) {
            self.ctx
                .policy
                .enforce_mode(Operation::Execute, &model)
                .map_err(from_safety)?;
        }

        let call_args = args
            .get("args")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut kwargs = args
            .get("kwargs")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        if NO_KWARGS_METHODS.contains(&method.as_str()) {
            kwargs.clear();
        }
        let context = opt_object(&args, "context");

        let result = self
            .ctx
            .backend
            .execute_kw(&model, &method, call_args, kwargs, context.as_ref())
            .await
            .map_err(|e| self.ctx.errors.classify_error(&e))?;

        Ok(format_action_result(result))
    }

    // -- shared checks --

    fn check_read(&self, model: &str) -> Result<(), ErrorResponse> {
        self.ctx
            .policy
            .check_model(model, Operation::Read)
            .map_err(from_safety)
    }

    fn check_write(&self, model: &str, operation: Operation) -> Result<(), ErrorResponse> {
        self.ctx
            .policy
            .check_model(model, operation)
            .map_err(from_safety)?;
        self.ctx
            .policy
            .enforce_mode(operation, model)
            .map_err(from_safety)
    }

    async fn check_access_right(&self, model: &str, right: &str) -> bool {
        let mut kwargs = Map::new();
        kwargs.insert("raise_exception".to_owned(), json!(false));
        matches!(
            self.ctx
                .backend
                .execute_kw(model, "check_access_rights", vec![json!(right)], kwargs, None)
                .await,
            Ok(Value::Bool(true))
        )
    }

    fn normalize(
        &self,
        model: &str,
        records: &mut [Map<String, Value>],
        requested: Option<&[String]>,
    ) {
        let info = self.ctx.registry.get_model(model);
        let refs: Option<Vec<&str>> =
            requested.map(|fields| fields.iter().map(String::as_str).collect());
        normalize_records(records, info.as_ref(), &self.ctx.display, refs.as_deref());
        for record in records {
            self.ctx.policy.strip_blocked_fields(record);
        }
    }
}

/// Detect action dicts in execute results
fn format_action_result(result: Value) -> Value {
    if let Value::Object(action) = &result
        && action
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|t| t.starts_with("ir.actions."))
    {
        let res_model = action
            .get("res_model")
            .and_then(Value::as_str)
            .unwrap_or("?");
        let summary = match action.get("res_id").and_then(Value::as_i64) {
            Some(res_id) => format!("Opens {res_model} form view for record {res_id}"),
            None => {
                let view_mode = action
                    .get("view_mode")
                    .and_then(Value::as_str)
                    .unwrap_or("form");
                format!("Opens {res_model} {view_mode} view")
            }
        };
        return json!({
            "result_type": "action",
            "action": {
                "type": action.get("type").cloned().unwrap_or(Value::Null),
                "res_model": action.get("res_model").cloned().unwrap_or(json!("")),
                "res_id": action.get("res_id").cloned().unwrap_or(Value::Null),
                "view_mode": action.get("view_mode").cloned().unwrap_or(json!("")),
                "target": action.get("target").cloned().unwrap_or(Value::Null),
                "summary": summary,
            },
        });
    }
    json!({"result_type": "value", "result": result})
}

// -- argument helpers --

fn require_str(args: &Map<String, Value>, key: &str) -> Result<String, ErrorResponse> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| {
            ErrorResponse::new(
                ErrorCategory::Validation,
                codes::VALIDATION_ERROR,
                format!("missing required argument '{key}'"),
                format!("Provide '{key}' as a non-empty string."),
            )
        })
}

fn require_object(args: &Map<String, Value>, key: &str) -> Result<Map<String, Value>, ErrorResponse> {
    args.get(key)
        .and_then(Value::as_object)
        .cloned()
        .ok_or_else(|| {
            ErrorResponse::new(
                ErrorCategory::Validation,
                codes::VALIDATION_ERROR,
                format!("missing required argument '{key}'"),
                format!("Provide '{key}' as a JSON object."),
            )
        })
}

fn require_ids(args: &Map<String, Value>, key: &str, max: usize) -> Result<Vec<i64>, ErrorResponse> {
    let ids: Vec<i64> = args
        .get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_i64).collect())
        .unwrap_or_default();
    if ids.is_empty() {
        return Err(ErrorResponse::new(
            ErrorCategory::Validation,
            codes::VALIDATION_ERROR,
            format!("missing required argument '{key}'"),
            format!("Provide '{key}' as a non-empty list of record IDs."),
        ));
    }
    if ids.len() > max {
        return Err(ErrorResponse::new(
            ErrorCategory::Validation,
            codes::VALIDATION_ERROR,
            format!("maximum {max} IDs per call, got {}", ids.len()),
            "Split the call into smaller batches.",
        ));
    }
    Ok(ids)
}

fn opt_string_list(args: &Map<String, Value>, key: &str) -> Option<Vec<String>> {
    args.get(key).and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect()
    })
}

fn opt_object(args: &Map<String, Value>, key: &str) -> Option<Map<String, Value>> {
    args.get(key).and_then(Value::as_object).cloned()
}

fn rows_of(value: Value) -> Vec<Map<String, Value>> {
    match value {
        Value::Array(rows) => rows
            .into_iter()
            .filter_map(|row| match row {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn is_missing_error(error: &odoo_mcp_core::OdooError) -> bool {
    match error {
        odoo_mcp_core::OdooError::Rpc(fault) => {
            fault
                .error_class
                .as_deref()
                .is_some_and(|c| c.contains("MissingError"))
                || fault.message.contains("does not exist or has been deleted")
        }
        _ => false,
    }
}

fn check_domain(domain: &Value) -> Result<(), ErrorResponse> {
    validate_domain(domain).map_err(|e| {
        ErrorResponse::new(
            ErrorCategory::Validation,
            codes::INVALID_DOMAIN,
            e.message,
            e.suggestion,
        )
    })
}

fn from_safety(error: SafetyError) -> ErrorResponse {
    match &error {
        SafetyError::FieldBlocked(message) => ErrorResponse::new(
            ErrorCategory::Validation,
            codes::VALIDATION_ERROR,
            message.clone(),
            "Remove the blocked fields from the values.",
        ),
        SafetyError::ModeViolation(message)
        | SafetyError::ModelBlocked(message)
        | SafetyError::MethodBlocked(message) => ErrorResponse::new(
            ErrorCategory::Access,
            codes::ACCESS_DENIED,
            message.clone(),
            "This operation is blocked by the server's safety configuration.",
        ),
    }
}

// -- JSON schemas --

fn model_property() -> Value {
    json!({"type": "string", "description": "Odoo model name, e.g. 'res.partner'"})
}

fn context_property() -> Value {
    json!({"type": "object", "description": "Extra context merged into the call"})
}

fn search_read_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "model": model_property(),
            "domain": {"type": "array", "description": "Odoo search domain", "default": []},
            "fields": {"type": "array", "items": {"type": "string"}, "description": "Fields to return; ['*'] for all"},
            "limit": {"type": "integer", "minimum": 1, "maximum": 500, "default": 80},
            "offset": {"type": "integer", "minimum": 0, "default": 0},
            "order": {"type": "string", "description": "Sort specification, e.g. 'date_order desc'"},
            "context": context_property(),
        },
        "required": ["model"],
        "additionalProperties": false,
    })
}

fn read_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "model": model_property(),
            "ids": {"type": "array", "items": {"type": "integer"}, "minItems": 1, "maxItems": 100},
            "fields": {"type": "array", "items": {"type": "string"}},
            "context": context_property(),
        },
        "required": ["model", "ids"],
        "additionalProperties": false,
    })
}

fn count_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "model": model_property(),
            "domain": {"type": "array", "default": []},
            "context": context_property(),
        },
        "required": ["model"],
        "additionalProperties": false,
    })
}

fn fields_get_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "model": model_property(),
            "attributes": {"type": "array", "items": {"type": "string"}},
            "context": context_property(),
        },
        "required": ["model"],
        "additionalProperties": false,
    })
}

fn name_get_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "model": model_property(),
            "ids": {"type": "array", "items": {"type": "integer"}, "minItems": 1, "maxItems": 200},
        },
        "required": ["model", "ids"],
        "additionalProperties": false,
    })
}

fn default_get_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "model": model_property(),
            "fields": {"type": "array", "items": {"type": "string"}},
            "context": context_property(),
        },
        "required": ["model"],
        "additionalProperties": false,
    })
}

fn list_models_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "filter": {"type": "string", "description": "Substring filter on the model name"},
            "transient": {"type": "boolean", "description": "Include transient (wizard) models", "default": false},
        },
        "additionalProperties": false,
    })
}

fn deep_search_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {"type": "string", "description": "Search text"},
            "model": {"type": "string", "description": "Target model; omit to search the default catalog"},
            "max_depth": {"type": "integer", "minimum": 1, "maximum": 5, "default": 3},
            "limit": {"type": "integer", "minimum": 1, "maximum": 100, "default": 20},
            "fields": {"type": "array", "items": {"type": "string"}},
            "exhaustive": {"type": "boolean", "default": false, "description": "Run all levels even after results are found"},
        },
        "required": ["query"],
        "additionalProperties": false,
    })
}

fn create_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "model": model_property(),
            "values": {"type": "object", "description": "Field values for the new record"},
            "context": context_property(),
        },
        "required": ["model", "values"],
        "additionalProperties": false,
    })
}

fn write_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "model": model_property(),
            "ids": {"type": "array", "items": {"type": "integer"}, "minItems": 1, "maxItems": 100},
            "values": {"type": "object", "description": "Field values to update"},
            "context": context_property(),
        },
        "required": ["model", "ids", "values"],
        "additionalProperties": false,
    })
}

fn unlink_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "model": model_property(),
            "ids": {"type": "array", "items": {"type": "integer"}, "minItems": 1, "maxItems": 50},
            "context": context_property(),
        },
        "required": ["model", "ids"],
        "additionalProperties": false,
    })
}

fn execute_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "model": model_property(),
            "method": {"type": "string", "description": "Public method name to call"},
            "args": {"type": "array", "description": "Positional arguments", "default": []},
            "kwargs": {"type": "object", "description": "Keyword arguments", "default": {}},
            "context": context_property(),
        },
        "required": ["model", "method"],
        "additionalProperties": false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::ToolContext;
    use async_trait::async_trait;
    use odoo_mcp_config::{DisplayConfig, OperationMode, SafetyConfig, SearchConfig};
    use odoo_mcp_connection::Backend;
    use odoo_mcp_core::{OdooError, RpcFault};
    use odoo_mcp_errors::ErrorHandler;
    use odoo_mcp_registry::ModelRegistry;
    use odoo_mcp_safety::SafetyPolicy;

    struct FakeBackend {
        respond: Box<dyn Fn(&str, &str, &[Value]) -> Result<Value, OdooError> + Send + Sync>,
    }

    #[async_trait]
    impl Backend for FakeBackend {
        async fn execute_kw(
            &self,
            model: &str,
            method: &str,
            args: Vec<Value>,
            _kwargs: Map<String, Value>,
            _context: Option<&Map<String, Value>>,
        ) -> Result<Value, OdooError> {
            (self.respond)(model, method, &args)
        }

        async fn search_read(
            &self,
            model: &str,
            domain: Value,
            _fields: &[&str],
            _limit: Option<u32>,
            _offset: u32,
            _order: Option<&str>,
        ) -> Result<Vec<Map<String, Value>>, OdooError> {
            let value = (self.respond)(model, "search_read", &[domain])?;
            Ok(rows_of(value))
        }

        async fn search_count(&self, model: &str, domain: Value) -> Result<i64, OdooError> {
            Ok((self.respond)(model, "search_count", &[domain])?
                .as_i64()
                .unwrap_or(0))
        }
    }

    fn context_with(
        mode: OperationMode,
        respond: impl Fn(&str, &str, &[Value]) -> Result<Value, OdooError> + Send + Sync + 'static,
    ) -> ToolContext {
        ToolContext {
            backend: Arc::new(FakeBackend {
                respond: Box::new(respond),
            }),
            policy: Arc::new(SafetyPolicy::from_config(&SafetyConfig {
                mode,
                write_allowlist: vec!["sale.order".to_owned()],
                ..SafetyConfig::default()
            })),
            registry: Arc::new(ModelRegistry::new()),
            errors: ErrorHandler::new(),
            search: SearchConfig::default(),
            display: DisplayConfig::default(),
            version: None,
            report: Arc::new(std::sync::RwLock::new(None)),
        }
    }

    fn core(ctx: ToolContext) -> Arc<Core> {
        Arc::new(Core { ctx })
    }

    fn args(raw: Value) -> Map<String, Value> {
        raw.as_object().expect("object").clone()
    }

    #[tokio::test]
    async fn search_read_normalizes_and_reports_has_more() {
        let core = core(context_with(OperationMode::Readonly, |_, method, _| {
            assert_eq!(method, "search_read");
            Ok(json!([
                {"id": 1, "name": "A", "partner_id": [5, "Acme"]},
                {"id": 2, "name": "B", "partner_id": false},
            ]))
        }));
        let result = core
            .search_read(args(json!({"model": "sale.order", "limit": 2})))
            .await
            .expect("succeeds");
        assert_eq!(result["count"], json!(2));
        assert_eq!(result["has_more"], json!(true));
        assert_eq!(result["records"][0]["partner_id"], json!({"id": 5, "name": "Acme"}));
    }

    #[tokio::test]
    async fn search_read_rejects_bad_domain_before_dispatch() {
        let core = core(context_with(OperationMode::Readonly, |_, _, _| {
            panic!("backend must not be called")
        }));
        let err = core
            .search_read(args(json!({
                "model": "sale.order",
                "domain": [["state", "=="]],
            })))
            .await
            .expect_err("must fail");
        assert_eq!(err.code, codes::INVALID_DOMAIN);
    }

    #[tokio::test]
    async fn blocked_model_is_rejected() {
        let core = core(context_with(OperationMode::Full, |_, _, _| {
            panic!("backend must not be called")
        }));
        let err = core
            .search_read(args(json!({"model": "ir.cron"})))
            .await
            .expect_err("must fail");
        assert_eq!(err.category, ErrorCategory::Access);
    }

    #[tokio::test]
    async fn create_blocked_in_readonly() {
        let core = core(context_with(OperationMode::Readonly, |_, _, _| {
            panic!("backend must not be called")
        }));
        let err = core
            .create(args(json!({"model": "sale.order", "values": {"name": "x"}})))
            .await
            .expect_err("must fail");
        assert_eq!(err.category, ErrorCategory::Access);
        assert!(!err.retry);
    }

    #[tokio::test]
    async fn create_validation_error_is_classified() {
        let core = core(context_with(OperationMode::Full, |model, method, _| {
            assert_eq!((model, method), ("sale.order", "create"));
            Err(OdooError::Rpc(RpcFault {
                message: "Missing required fields: 'partner_id'".to_owned(),
                error_class: Some("odoo.exceptions.ValidationError".to_owned()),
                traceback: None,
                model: Some("sale.order".to_owned()),
                method: Some("create".to_owned()),
            }))
        }));
        let err = core
            .create(args(json!({"model": "sale.order", "values": {}})))
            .await
            .expect_err("must fail");
        assert_eq!(err.category, ErrorCategory::Validation);
        assert_eq!(err.code, codes::MISSING_REQUIRED_FIELD);
        assert!(err.retry);
        assert!(err.suggestion.contains("fields_get"));
        assert_eq!(err.details.expect("details")["field"], json!("partner_id"));
    }

    #[tokio::test]
    async fn write_rejects_blocked_fields() {
        let core = core(context_with(OperationMode::Full, |_, _, _| Ok(json!(true))));
        let err = core
            .write(args(json!({
                "model": "sale.order",
                "ids": [1],
                "values": {"password": "x"},
            })))
            .await
            .expect_err("must fail");
        assert_eq!(err.category, ErrorCategory::Validation);
    }

    #[tokio::test]
    async fn unlink_caps_ids_at_fifty() {
        let core = core(context_with(OperationMode::Full, |_, _, _| Ok(json!(true))));
        let ids: Vec<i64> = (1..=51).collect();
        let err = core
            .unlink(args(json!({"model": "sale.order", "ids": ids})))
            .await
            .expect_err("must fail");
        assert!(err.message.contains("50"));
    }

    #[tokio::test]
    async fn execute_rejects_private_and_blocked_methods() {
        let core = core(context_with(OperationMode::Full, |_, _, _| Ok(json!(true))));
        let err = core
            .clone()
            .execute(args(json!({"model": "sale.order", "method": "_compute_totals"})))
            .await
            .expect_err("private must fail");
        assert!(err.message.contains("private"));

        let err = core
            .execute(args(json!({"model": "sale.order", "method": "sudo"})))
            .await
            .expect_err("blocked must fail");
        assert_eq!(err.category, ErrorCategory::Access);
    }

    #[tokio::test]
    async fn execute_strips_kwargs_for_no_kwargs_methods() {
        let core = core(context_with(OperationMode::Full, |_, method, _| {
            assert_eq!(method, "action_confirm");
            Ok(json!(true))
        }));
        let result = core
            .execute(args(json!({
                "model": "sale.order",
                "method": "action_confirm",
                "args": [[1]],
                "kwargs": {"unexpected": true},
            })))
            .await
            .expect("succeeds");
        assert_eq!(result["result_type"], json!("value"));
    }

    #[tokio::test]
    async fn execute_detects_action_results() {
        let core = core(context_with(OperationMode::Full, |_, _, _| {
            Ok(json!({
                "type": "ir.actions.act_window",
                "res_model": "account.move",
                "res_id": 9,
                "view_mode": "form",
            }))
        }));
        let result = core
            .execute(args(json!({"model": "sale.order", "method": "action_view_invoice"})))
            .await
            .expect("succeeds");
        assert_eq!(result["result_type"], json!("action"));
        assert_eq!(result["action"]["res_model"], json!("account.move"));
        assert!(result["action"]["summary"].as_str().expect("summary").contains("record 9"));
    }

    #[tokio::test]
    async fn read_collects_missing_ids() {
        let core = core(context_with(OperationMode::Readonly, |_, method, call_args| {
            assert_eq!(method, "read");
            let ids = call_args[0].as_array().expect("ids");
            if ids.len() > 1 {
                return Err(OdooError::Rpc(RpcFault {
                    message: "Record does not exist or has been deleted.".to_owned(),
                    error_class: Some("odoo.exceptions.MissingError".to_owned()),
                    traceback: None,
                    model: None,
                    method: None,
                }));
            }
            if ids[0] == json!(2) {
                return Err(OdooError::Rpc(RpcFault::new("missing")));
            }
            Ok(json!([{"id": ids[0], "name": "ok"}]))
        }));
        let result = core
            .read(args(json!({"model": "res.partner", "ids": [1, 2, 3]})))
            .await
            .expect("succeeds");
        assert_eq!(result["missing_ids"], json!([2]));
        assert_eq!(result["records"].as_array().expect("records").len(), 2);
    }
}
