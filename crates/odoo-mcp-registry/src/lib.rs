//! Model registry
//!
//! A merged static/dynamic knowledge base of the backend's models, fields,
//! methods, and state machines, with bounded-concurrency live
//! introspection. Built once at startup and on explicit refresh, never on
//! a timer.

mod model;
mod registry;

pub use model::{FieldInfo, FieldType, MethodInfo, ModelInfo, Registry, RegistryBuildMode};
pub use registry::ModelRegistry;

/// Default introspection targets
///
/// The authoritative list; overridable via `registry.introspect_models`.
pub const DEFAULT_INTROSPECTION_MODELS: &[&str] = &[
    "res.partner",
    "res.users",
    "res.company",
    "sale.order",
    "sale.order.line",
    "purchase.order",
    "purchase.order.line",
    "account.move",
    "account.move.line",
    "stock.picking",
    "stock.move",
    "stock.move.line",
    "stock.quant",
    "stock.warehouse",
    "stock.location",
    "product.template",
    "product.product",
    "product.category",
    "crm.lead",
    "crm.stage",
    "helpdesk.ticket",
    "helpdesk.stage",
    "helpdesk.team",
    "project.project",
    "project.task",
    "project.milestone",
    "hr.employee",
    "hr.department",
    "hr.leave",
    "calendar.event",
    "mail.message",
    "mail.activity",
    "ir.attachment",
];

/// Methods known to reject keyword arguments over RPC
///
/// Consulted by the execute tool to strip kwargs before dispatch.
pub const NO_KWARGS_METHODS: &[&str] = &[
    "action_cancel",
    "action_confirm",
    "action_draft",
    "action_done",
    "action_lock",
    "action_unlock",
    "button_validate",
    "button_draft",
    "button_cancel",
    "button_confirm",
    "action_post",
    "action_open",
    "action_set_draft",
    "action_quotation_send",
    "action_view_invoice",
    "copy",
    "name_get",
    "name_search",
    "read",
    "search",
    "search_read",
    "search_count",
    "fields_get",
    "default_get",
    "onchange",
];

/// Whether a method accepts keyword arguments over RPC
pub fn method_accepts_kwargs(method: &str) -> bool {
    !NO_KWARGS_METHODS.contains(&method)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kwargs_consultation() {
        assert!(!method_accepts_kwargs("action_confirm"));
        assert!(!method_accepts_kwargs("button_validate"));
        assert!(method_accepts_kwargs("write"));
        assert!(method_accepts_kwargs("message_post"));
    }

    #[test]
    fn default_targets_cover_the_core_catalog() {
        for model in ["res.partner", "sale.order", "account.move", "crm.lead"] {
            assert!(DEFAULT_INTROSPECTION_MODELS.contains(&model), "{model}");
        }
        assert!(DEFAULT_INTROSPECTION_MODELS.len() >= 30);
    }
}
