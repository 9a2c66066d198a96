//! Wizard execution protocol
//!
//! A backend result is a wizard when it is an action dict with
//! `type='ir.actions.act_window'` and `target='new'`. Known wizards are
//! completed automatically from the catalog; unknown wizards come back as
//! structured guidance telling the caller how to finish with the generic
//! execute tool. Chains are followed to a bounded depth.

use std::collections::BTreeMap;

use odoo_mcp_connection::Backend;
use odoo_mcp_core::OdooError;
use serde::Serialize;
use serde_json::{Map, Value, json};

/// Chains deeper than this are treated as cycles
pub const MAX_WIZARD_CHAIN_DEPTH: u32 = 3;

/// One field of a known wizard
#[derive(Debug, Clone, Serialize)]
pub struct WizardField {
    #[serde(rename = "type")]
    pub field_type: &'static str,
    pub required: bool,
    pub description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relation: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<&'static [(&'static str, &'static str)]>,
}

impl WizardField {
    const fn new(field_type: &'static str, required: bool, description: &'static str) -> Self {
        Self {
            field_type,
            required,
            description,
            relation: None,
            selection: None,
        }
    }

    const fn related(mut self, relation: &'static str) -> Self {
        self.relation = Some(relation);
        self
    }

    const fn with_selection(mut self, selection: &'static [(&'static str, &'static str)]) -> Self {
        self.selection = Some(selection);
        self
    }
}

/// Catalog entry for a known wizard
#[derive(Debug, Clone, Serialize)]
pub struct KnownWizard {
    pub model: &'static str,
    pub description: &'static str,
    pub source_model: &'static str,
    pub action_method: &'static str,
    pub fields: &'static [(&'static str, WizardField)],
    pub context_keys: &'static [&'static str],
    /// Alternate action methods and what they do; callers pick one with a
    /// flag on the owning tool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternative_actions: Option<&'static [(&'static str, &'static str)]>,
    pub min_backend_major: u32,
    pub max_backend_major: Option<u32>,
}

/// The known-wizard catalog
pub fn known_wizards() -> &'static [KnownWizard] {
    &CATALOG
}

static CATALOG: [KnownWizard; 6] = [
    KnownWizard {
        model: "account.payment.register",
        description: "Register payment for invoices",
        source_model: "account.move",
        action_method: "action_create_payments",
        fields: &[
            (
                "journal_id",
                WizardField::new("many2one", true, "Payment journal (bank/cash)")
                    .related("account.journal"),
            ),
            (
                "amount",
                WizardField::new(
                    "monetary",
                    false,
                    "Payment amount. Default: full invoice amount.",
                ),
            ),
            (
                "payment_date",
                WizardField::new("date", true, "Payment date. Default: today."),
            ),
            (
                "payment_method_line_id",
                WizardField::new("many2one", true, "Payment method")
                    .related("account.payment.method.line"),
            ),
            (
                "communication",
                WizardField::new("char", false, "Payment memo/reference"),
            ),
            (
                "group_payment",
                WizardField::new("boolean", false, "Group payments for same partner"),
            ),
        ],
        context_keys: &["active_model", "active_ids"],
        alternative_actions: None,
        min_backend_major: 14,
        max_backend_major: None,
    },
    KnownWizard {
        model: "stock.immediate.transfer",
        description: "Process all quantities immediately (no backorder). Only exists in v15-v16.",
        source_model: "stock.picking",
        action_method: "process",
        fields: &[(
            "pick_ids",
            WizardField::new("many2many", true, "Pickings to process")
                .related("stock.picking"),
        )],
        context_keys: &["active_model", "active_ids", "button_validate_picking_ids"],
        alternative_actions: None,
        min_backend_major: 14,
        max_backend_major: Some(16),
    },
    KnownWizard {
        model: "stock.backorder.confirmation",
        description: "Create backorder for remaining quantities",
        source_model: "stock.picking",
        action_method: "process",
        fields: &[
            (
                "pick_ids",
                WizardField::new("many2many", true, "").related("stock.picking"),
            ),
            (
                "backorder_confirmation_line_ids",
                WizardField::new("one2many", false, ""),
            ),
        ],
        context_keys: &["active_model", "active_ids", "button_validate_picking_ids"],
        alternative_actions: Some(&[
            ("process", "Create backorder for remaining items"),
            (
                "process_cancel_backorder",
                "Process without backorder (ignore remaining)",
            ),
        ]),
        min_backend_major: 14,
        max_backend_major: None,
    },
    KnownWizard {
        model: "sale.advance.payment.inv",
        description: "Create invoice from sales order",
        source_model: "sale.order",
        action_method: "create_invoices",
        fields: &[
            (
                "advance_payment_method",
                WizardField::new("selection", true, "Invoicing method").with_selection(&[
                    ("delivered", "Regular invoice (delivered quantities)"),
                    ("percentage", "Down payment (percentage)"),
                    ("fixed", "Down payment (fixed amount)"),
                ]),
            ),
            (
                "amount",
                WizardField::new("float", false, "Down payment amount (for percentage/fixed)"),
            ),
        ],
        context_keys: &["active_model", "active_ids"],
        alternative_actions: None,
        min_backend_major: 14,
        max_backend_major: None,
    },
    KnownWizard {
        model: "crm.lead2opportunity.partner",
        description: "Convert a CRM lead into an opportunity",
        source_model: "crm.lead",
        action_method: "action_apply",
        fields: &[
            (
                "name",
                WizardField::new("selection", true, "").with_selection(&[
                    ("convert", "Convert to opportunity"),
                    ("merge", "Merge with existing opportunity"),
                ]),
            ),
            (
                "action",
                WizardField::new("selection", true, "").with_selection(&[
                    ("create", "Create a new customer"),
                    ("exist", "Link to an existing customer"),
                    ("nothing", "Do not create a customer"),
                ]),
            ),
            (
                "partner_id",
                WizardField::new("many2one", false, "Existing customer to link")
                    .related("res.partner"),
            ),
            (
                "user_id",
                WizardField::new("many2one", false, "Salesperson").related("res.users"),
            ),
            (
                "team_id",
                WizardField::new("many2one", false, "Sales team").related("crm.team"),
            ),
        ],
        context_keys: &["active_model", "active_id", "active_ids"],
        alternative_actions: None,
        min_backend_major: 14,
        max_backend_major: None,
    },
    KnownWizard {
        model: "account.move.reversal",
        description: "Create a credit note / reversal for an invoice",
        source_model: "account.move",
        action_method: "reverse_moves",
        fields: &[
            ("reason", WizardField::new("char", false, "Reason for reversal")),
            (
                "date",
                WizardField::new("date", true, "Reversal date. Default: today."),
            ),
            (
                "refund_method",
                WizardField::new("selection", true, "").with_selection(&[
                    ("refund", "Partial refund - create credit note"),
                    ("cancel", "Full refund - create credit note and reconcile"),
                    (
                        "modify",
                        "Full refund - create credit note, reconcile, and create new draft invoice",
                    ),
                ]),
            ),
            (
                "journal_id",
                WizardField::new("many2one", false, "").related("account.journal"),
            ),
        ],
        context_keys: &["active_model", "active_ids"],
        alternative_actions: None,
        min_backend_major: 14,
        max_backend_major: None,
    },
];

pub fn get_known_wizard(model: &str) -> Option<&'static KnownWizard> {
    known_wizards().iter().find(|w| w.model == model)
}

/// Whether an execute result is a wizard action (dialog)
pub fn is_wizard_action(result: &Value) -> bool {
    result.get("type").and_then(Value::as_str) == Some("ir.actions.act_window")
        && result.get("target").and_then(Value::as_str) == Some("new")
}

pub fn wizard_model_of(action: &Value) -> Option<&str> {
    if !is_wizard_action(action) {
        return None;
    }
    action.get("res_model").and_then(Value::as_str)
}

/// Interpretation of a wizard execution result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardOutcome {
    /// null/true/false, a close action, or a plain redirect
    Complete,
    Close,
    /// Another dialog opened: recurse (bounded)
    Chain,
    Report,
    Url,
}

pub fn classify_wizard_result(result: &Value) -> WizardOutcome {
    let Some(action_type) = result.get("type").and_then(Value::as_str) else {
        return WizardOutcome::Complete;
    };
    match action_type {
        "ir.actions.act_window_close" => WizardOutcome::Close,
        "ir.actions.act_window" if result.get("target").and_then(Value::as_str) == Some("new") => {
            WizardOutcome::Chain
        }
        "ir.actions.report" => WizardOutcome::Report,
        "ir.actions.act_url" => WizardOutcome::Url,
        _ => WizardOutcome::Complete,
    }
}

/// Execute a wizard through its standard lifecycle
///
/// Build the active-record context, fetch defaults, overlay the caller's
/// values, create the transient record, invoke the action method.
pub async fn execute_wizard(
    backend: &dyn Backend,
    wizard_model: &str,
    wizard_values: Map<String, Value>,
    action_method: &str,
    source_model: Option<&str>,
    source_ids: &[i64],
    context_extra: Option<&Map<String, Value>>,
) -> Result<Value, OdooError> {
    let mut context = Map::new();
    if let Some(source_model) = source_model
        && !source_ids.is_empty()
    {
        context.insert("active_model".to_owned(), json!(source_model));
        context.insert("active_ids".to_owned(), json!(source_ids));
        context.insert("active_id".to_owned(), json!(source_ids[0]));
    }
    if let Some(extra) = context_extra {
        for (key, value) in extra {
            context.insert(key.clone(), value.clone());
        }
    }
    let context = (!context.is_empty()).then_some(&context);

    // Defaults cover the caller's fields plus everything the catalog knows
    let mut field_names: Vec<&str> = wizard_values.keys().map(String::as_str).collect();
    if let Some(known) = get_known_wizard(wizard_model) {
        for (name, _) in known.fields {
            if !field_names.contains(name) {
                field_names.push(name);
            }
        }
    }

    let defaults = backend
        .execute_kw(
            wizard_model,
            "default_get",
            vec![json!(field_names)],
            Map::new(),
            context,
        )
        .await?;

    let mut merged = match defaults {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    for (key, value) in wizard_values {
        merged.insert(key, value);
    }

    let wizard_id = backend
        .execute_kw(
            wizard_model,
            "create",
            vec![Value::Object(merged)],
            Map::new(),
            context,
        )
        .await?;
    let wizard_id = wizard_id.as_i64().unwrap_or(0);

    backend
        .execute_kw(
            wizard_model,
            action_method,
            vec![json!([wizard_id])],
            Map::new(),
            context,
        )
        .await
}

/// Handle a wizard result, following known chains up to the depth cap
pub async fn handle_wizard_result(
    backend: &dyn Backend,
    result: Value,
    depth: u32,
) -> Result<Value, OdooError> {
    match classify_wizard_result(&result) {
        WizardOutcome::Complete | WizardOutcome::Close => Ok(json!({
            "status": "success",
            "result_type": "complete",
            "message": "Operation completed successfully.",
        })),
        WizardOutcome::Report => Ok(json!({
            "status": "success",
            "result_type": "report",
            "report_action": result,
            "message": "Report generated.",
        })),
        WizardOutcome::Url => Ok(json!({
            "status": "success",
            "result_type": "url",
            "url": result.get("url").cloned().unwrap_or(Value::Null),
            "message": "External URL action returned.",
        })),
        WizardOutcome::Chain => {
            if depth >= MAX_WIZARD_CHAIN_DEPTH {
                return Ok(json!({
                    "status": "error",
                    "message": format!(
                        "Wizard chain exceeded maximum depth of {MAX_WIZARD_CHAIN_DEPTH}. Stopping to prevent an infinite loop."
                    ),
                    "wizard_action": result,
                }));
            }

            let Some(next_model) = wizard_model_of(&result).map(str::to_owned) else {
                return Ok(json!({
                    "status": "error",
                    "message": "Wizard chain action has no res_model.",
                    "wizard_action": result,
                }));
            };

            if let Some(known) = get_known_wizard(&next_model) {
                tracing::info!(wizard = %next_model, depth = depth + 1, "auto-handling chained wizard");
                let chain_result = execute_wizard(
                    backend,
                    &next_model,
                    Map::new(),
                    known.action_method,
                    None,
                    &[],
                    None,
                )
                .await?;
                return Box::pin(handle_wizard_result(backend, chain_result, depth + 1)).await;
            }

            build_unknown_wizard_response(backend, &next_model, &result, None, &[]).await
        }
    }
}

/// Handle a wizard encountered mid-workflow
///
/// Returns `None` when the result is not a wizard action; otherwise the
/// wizard is either auto-completed from the catalog or described for the
/// caller.
pub async fn handle_wizard_encounter(
    backend: &dyn Backend,
    result: &Value,
    source_model: Option<&str>,
    source_ids: &[i64],
) -> Result<Option<Value>, OdooError> {
    let Some(wizard_model) = wizard_model_of(result).map(str::to_owned) else {
        return Ok(None);
    };

    if let Some(known) = get_known_wizard(&wizard_model) {
        tracing::info!(wizard = %wizard_model, "auto-handling known wizard");
        let wizard_result = execute_wizard(
            backend,
            &wizard_model,
            Map::new(),
            known.action_method,
            source_model,
            source_ids,
            None,
        )
        .await?;
        return handle_wizard_result(backend, wizard_result, 0)
            .await
            .map(Some);
    }

    build_unknown_wizard_response(backend, &wizard_model, result, source_model, source_ids)
        .await
        .map(Some)
}

/// Describe an unknown wizard so the caller can complete it manually
///
/// Fields are discovered via `fields_get`; the response is never silently
/// discarded.
pub async fn build_unknown_wizard_response(
    backend: &dyn Backend,
    wizard_model: &str,
    action: &Value,
    source_model: Option<&str>,
    source_ids: &[i64],
) -> Result<Value, OdooError> {
    const SKIPPED: &[&str] = &[
        "id",
        "create_uid",
        "create_date",
        "write_uid",
        "write_date",
        "display_name",
    ];

    let mut kwargs = Map::new();
    kwargs.insert(
        "attributes".to_owned(),
        json!(["type", "required", "string", "relation", "selection"]),
    );
    let mut wizard_fields: BTreeMap<String, Value> = BTreeMap::new();
    match backend
        .execute_kw(wizard_model, "fields_get", Vec::new(), kwargs, None)
        .await
    {
        Ok(Value::Object(raw)) => {
            for (name, info) in raw {
                if name.starts_with("__") || SKIPPED.contains(&name.as_str()) {
                    continue;
                }
                let mut described = Map::new();
                described.insert(
                    "type".to_owned(),
                    info.get("type").cloned().unwrap_or(json!("unknown")),
                );
                described.insert(
                    "required".to_owned(),
                    info.get("required").cloned().unwrap_or(json!(false)),
                );
                described.insert(
                    "label".to_owned(),
                    info.get("string").cloned().unwrap_or(json!(name.clone())),
                );
                if let Some(relation) = info.get("relation").filter(|r| !r.is_null()) {
                    described.insert("relation".to_owned(), relation.clone());
                }
                if let Some(selection) = info.get("selection").filter(|s| s.is_array()) {
                    described.insert("selection".to_owned(), selection.clone());
                }
                wizard_fields.insert(name, Value::Object(described));
            }
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(wizard = %wizard_model, error = %e, "could not introspect wizard fields");
        }
    }

    let mut context_hint = Map::new();
    if let Some(source_model) = source_model {
        context_hint.insert("active_model".to_owned(), json!(source_model));
    }
    if !source_ids.is_empty() {
        context_hint.insert("active_ids".to_owned(), json!(source_ids));
        context_hint.insert("active_id".to_owned(), json!(source_ids[0]));
    }

    Ok(json!({
        "wizard_required": true,
        "wizard_model": wizard_model,
        "wizard_action": {
            "type": action.get("type").cloned().unwrap_or(json!("ir.actions.act_window")),
            "res_model": wizard_model,
            "target": action.get("target").cloned().unwrap_or(json!("new")),
            "view_mode": action.get("view_mode").cloned().unwrap_or(json!("form")),
        },
        "wizard_fields": wizard_fields,
        "instructions": format!(
            "This operation requires a wizard. To complete it: \
             1) Create a wizard record using odoo_core_create with model='{wizard_model}' and the required field values. \
             2) Execute the wizard using odoo_core_execute with model='{wizard_model}', method='<action_method>' \
             (check available methods), and args=[[wizard_id]]."
        ),
        "context_hint": context_hint,
    }))
}
