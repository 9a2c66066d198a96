//! Sales workflow toolset
//!
//! Quotation lifecycle helpers on top of the core machinery. Registers
//! through the standard contract: requires the `sale` backend module,
//! depends on the core toolset, and is hidden entirely in readonly mode.
//! Confirm and cancel run the wizard-encounter protocol, since the backend
//! may answer either with a dialog.

use std::sync::Arc;

use odoo_mcp_errors::{ErrorCategory, ErrorResponse, codes};
use odoo_mcp_safety::Operation;
use serde_json::{Map, Value, json};

use crate::base::{ToolAnnotations, ToolContext, ToolSpec, Toolset, ToolsetMetadata, tool_name};
use crate::wizard::handle_wizard_encounter;

pub struct SalesToolset;

impl Toolset for SalesToolset {
    fn metadata(&self) -> ToolsetMetadata {
        let mut meta = ToolsetMetadata::new("sales", "Sales order workflows: quotations, confirmation, cancellation");
        meta.required_modules = vec!["sale".to_owned()];
        meta.depends_on = vec!["core".to_owned()];
        meta.min_backend_major = Some(14);
        meta.tags = vec!["sales".to_owned(), "workflow".to_owned()];
        meta
    }

    fn tools(&self, context: &ToolContext) -> Vec<ToolSpec> {
        // All three tools write; none are registered in readonly mode
        if !context.policy.tool_visible(Operation::Create) {
            return Vec::new();
        }

        let sales = Arc::new(Sales {
            ctx: context.clone(),
        });

        vec![
            sales_tool(
                &sales,
                tool_name("sales", "create_quotation"),
                "Create a draft quotation for a customer, optionally with order lines.",
                create_quotation_schema(),
                ToolAnnotations::write("Create Quotation"),
                Operation::Create,
                Sales::create_quotation,
            ),
            sales_tool(
                &sales,
                tool_name("sales", "confirm_order"),
                "Confirm a quotation, turning it into a sales order.",
                order_id_schema(),
                ToolAnnotations::write_idempotent("Confirm Sales Order"),
                Operation::Execute,
                Sales::confirm_order,
            ),
            sales_tool(
                &sales,
                tool_name("sales", "cancel_order"),
                "Cancel a quotation or sales order.",
                order_id_schema(),
                ToolAnnotations::write_idempotent("Cancel Sales Order"),
                Operation::Execute,
                Sales::cancel_order,
            ),
        ]
    }
}

fn sales_tool<F, Fut>(
    sales: &Arc<Sales>,
    name: String,
    description: &str,
    input_schema: Value,
    annotations: ToolAnnotations,
    operation: Operation,
    f: F,
) -> ToolSpec
where
    F: Fn(Arc<Sales>, Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Value, ErrorResponse>> + Send + 'static,
{
    let sales = Arc::clone(sales);
    ToolSpec {
        name,
        description: description.to_owned(),
        input_schema,
        annotations,
        operation,
        handler: Arc::new(move |args| Box::pin(f(Arc::clone(&sales), args))),
    }
}

struct Sales {
    ctx: ToolContext,
}

impl Sales {
    async fn create_quotation(
        self: Arc<Self>,
        args: Map<String, Value>,
    ) -> Result<Value, ErrorResponse> {
        self.gate(Operation::Create)?;

        let Some(partner_id) = args.get("partner_id").and_then(Value::as_i64) else {
            return Err(missing_arg("partner_id", "the customer's res.partner ID"));
        };

        let mut values = Map::new();
        values.insert("partner_id".to_owned(), json!(partner_id));
        if let Some(lines) = args.get("order_lines").and_then(Value::as_array) {
            // One-shot line creation via the (0, 0, values) command form
            let commands: Vec<Value> = lines
                .iter()
                .filter_map(Value::as_object)
                .map(|line| {
                    let mut line_values = Map::new();
                    if let Some(product_id) = line.get("product_id") {
                        line_values.insert("product_id".to_owned(), product_id.clone());
                    }
                    if let Some(quantity) = line.get("quantity") {
                        line_values.insert("product_uom_qty".to_owned(), quantity.clone());
                    }
                    if let Some(price) = line.get("price_unit") {
                        line_values.insert("price_unit".to_owned(), price.clone());
                    }
                    json!([0, 0, line_values])
                })
                .collect();
            if !commands.is_empty() {
                values.insert("order_line".to_owned(), json!(commands));
            }
        }
        if let Some(note) = args.get("note").and_then(Value::as_str) {
            values.insert("note".to_owned(), json!(note));
        }

        let order_id = self
            .ctx
            .backend
            .execute_kw("sale.order", "create", vec![Value::Object(values)], Map::new(), None)
            .await
            .map_err(|e| self.ctx.errors.classify_error(&e))?;

        Ok(json!({
            "order_id": order_id,
            "state": "draft",
            "message": format!("Created quotation with ID {order_id}"),
        }))
    }

    async fn confirm_order(self: Arc<Self>, args: Map<String, Value>) -> Result<Value, ErrorResponse> {
        self.run_order_action(args, "action_confirm", "confirmed").await
    }

    async fn cancel_order(self: Arc<Self>, args: Map<String, Value>) -> Result<Value, ErrorResponse> {
        self.run_order_action(args, "action_cancel", "cancelled").await
    }

    async fn run_order_action(
        &self,
        args: Map<String, Value>,
        method: &str,
        past_tense: &str,
    ) -> Result<Value, ErrorResponse> {
        self.gate(Operation::Execute)?;

        let Some(order_id) = args.get("order_id").and_then(Value::as_i64) else {
            return Err(missing_arg("order_id", "the sale.order ID"));
        };

        let result = self
            .ctx
            .backend
            .execute_kw("sale.order", method, vec![json!([order_id])], Map::new(), None)
            .await
            .map_err(|e| self.ctx.errors.classify_error(&e))?;

        // The backend may answer with a wizard (e.g. a cancel-confirmation
        // dialog); known wizards complete automatically, unknown ones come
        // back as guidance.
        if let Some(wizard_response) = handle_wizard_encounter(
            self.ctx.backend.as_ref(),
            &result,
            Some("sale.order"),
            &[order_id],
        )
        .await
        .map_err(|e| self.ctx.errors.classify_error(&e))?
        {
            return Ok(wizard_response);
        }

        Ok(json!({
            "order_id": order_id,
            "message": format!("Order {order_id} {past_tense}"),
        }))
    }

    fn gate(&self, operation: Operation) -> Result<(), ErrorResponse> {
        self.ctx
            .policy
            .check_model("sale.order", operation)
            .and_then(|()| self.ctx.policy.enforce_mode(operation, "sale.order"))
            .map_err(|e| {
                ErrorResponse::new(
                    ErrorCategory::Access,
                    codes::ACCESS_DENIED,
                    e.to_string(),
                    "This operation is blocked by the server's safety configuration.",
                )
            })
    }
}

fn missing_arg(name: &str, what: &str) -> ErrorResponse {
    ErrorResponse::new(
        ErrorCategory::Validation,
        codes::VALIDATION_ERROR,
        format!("missing required argument '{name}'"),
        format!("Provide '{name}': {what}."),
    )
}

fn create_quotation_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "partner_id": {"type": "integer", "description": "Customer (res.partner) ID"},
            "order_lines": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "product_id": {"type": "integer"},
                        "quantity": {"type": "number", "default": 1},
                        "price_unit": {"type": "number"},
                    },
                    "required": ["product_id"],
                },
            },
            "note": {"type": "string", "description": "Internal note on the quotation"},
        },
        "required": ["partner_id"],
        "additionalProperties": false,
    })
}

fn order_id_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "order_id": {"type": "integer", "description": "sale.order ID"},
        },
        "required": ["order_id"],
        "additionalProperties": false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use odoo_mcp_config::{DisplayConfig, OperationMode, SafetyConfig, SearchConfig};
    use odoo_mcp_connection::Backend;
    use odoo_mcp_core::OdooError;
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

    #[test]
    fn hidden_in_readonly_mode() {
        let context = context_with(OperationMode::Readonly, |_, _, _| Ok(Value::Null));
        assert!(SalesToolset.tools(&context).is_empty());

        let context = context_with(OperationMode::Restricted, |_, _, _| Ok(Value::Null));
        assert_eq!(SalesToolset.tools(&context).len(), 3);
    }

    #[tokio::test]
    async fn quotation_lines_use_command_form() {
        let context = context_with(OperationMode::Full, |model, method, args| {
            assert_eq!((model, method), ("sale.order", "create"));
            let values = args[0].as_object().expect("values");
            assert_eq!(values["partner_id"], json!(7));
            let lines = values["order_line"].as_array().expect("lines");
            assert_eq!(lines[0][0], json!(0));
            assert_eq!(lines[0][1], json!(0));
            assert_eq!(lines[0][2]["product_id"], json!(31));
            assert_eq!(lines[0][2]["product_uom_qty"], json!(2));
            Ok(json!(88))
        });
        let sales = Arc::new(Sales { ctx: context });
        let result = sales
            .create_quotation(
                json!({
                    "partner_id": 7,
                    "order_lines": [{"product_id": 31, "quantity": 2}],
                })
                .as_object()
                .expect("args")
                .clone(),
            )
            .await
            .expect("succeeds");
        assert_eq!(result["order_id"], json!(88));
        assert_eq!(result["state"], json!("draft"));
    }

    #[tokio::test]
    async fn confirm_passes_plain_results_through() {
        let context = context_with(OperationMode::Full, |_, method, _| {
            assert_eq!(method, "action_confirm");
            Ok(json!(true))
        });
        let sales = Arc::new(Sales { ctx: context });
        let result = sales
            .confirm_order(json!({"order_id": 5}).as_object().expect("args").clone())
            .await
            .expect("succeeds");
        assert!(result["message"].as_str().expect("message").contains("confirmed"));
    }

    #[tokio::test]
    async fn confirm_surfaces_unknown_wizard_guidance() {
        let context = context_with(OperationMode::Full, |_, method, _| match method {
            "action_confirm" => Ok(json!({
                "type": "ir.actions.act_window",
                "target": "new",
                "res_model": "x.confirm.wizard",
            })),
            "fields_get" => Ok(json!({
                "reason": {"type": "char", "required": true, "string": "Reason"},
            })),
            other => panic!("unexpected method {other}"),
        });
        let sales = Arc::new(Sales { ctx: context });
        let result = sales
            .confirm_order(json!({"order_id": 5}).as_object().expect("args").clone())
            .await
            .expect("succeeds");
        assert_eq!(result["wizard_required"], json!(true));
        assert_eq!(result["wizard_model"], json!("x.confirm.wizard"));
        assert_eq!(result["context_hint"]["active_model"], json!("sale.order"));
    }

    #[tokio::test]
    async fn restricted_mode_requires_allowlist() {
        let context = ToolContext {
            policy: Arc::new(SafetyPolicy::from_config(&SafetyConfig {
                mode: OperationMode::Restricted,
                ..SafetyConfig::default()
            })),
            ..context_with(OperationMode::Restricted, |_, _, _| Ok(Value::Null))
        };
        let sales = Arc::new(Sales { ctx: context });
        let err = sales
            .confirm_order(json!({"order_id": 5}).as_object().expect("args").clone())
            .await
            .expect_err("must fail without allowlist");
        assert_eq!(err.category, ErrorCategory::Access);
    }
}
