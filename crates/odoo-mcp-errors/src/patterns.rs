//! Error pattern database
//!
//! Ordered by specificity; first match wins. New patterns are added by
//! appending; the classifier never removes entries.

use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};

use crate::ErrorCategory;

/// A single classification pattern
///
/// Named capture groups fill `{placeholders}` in the templates. A group
/// named `x_alt` fills `{x}` only when the `x` group did not capture,
/// covering alternations where either branch may match.
pub struct ErrorPattern {
    pub id: &'static str,
    pub regex: Regex,
    /// When set, the pattern only applies to faults carrying this backend
    /// exception class (substring match); faults without a class still try
    /// the regex.
    pub error_class: Option<&'static str>,
    pub category: ErrorCategory,
    pub code: &'static str,
    pub message_template: &'static str,
    pub suggestion_template: &'static str,
}

fn pattern(
    id: &'static str,
    raw: &str,
    error_class: Option<&'static str>,
    category: ErrorCategory,
    code: &'static str,
    message_template: &'static str,
    suggestion_template: &'static str,
) -> ErrorPattern {
    ErrorPattern {
        id,
        regex: RegexBuilder::new(raw)
            .case_insensitive(true)
            .build()
            .unwrap_or_else(|e| panic!("invalid error pattern {id}: {e}")),
        error_class,
        category,
        code,
        message_template,
        suggestion_template,
    }
}

/// The seeded pattern list
pub fn error_patterns() -> &'static [ErrorPattern] {
    static PATTERNS: OnceLock<Vec<ErrorPattern>> = OnceLock::new();
    PATTERNS.get_or_init(build_patterns)
}

#[allow(clippy::too_many_lines)]
fn build_patterns() -> Vec<ErrorPattern> {
    use crate::codes;
    use ErrorCategory::{Access, Connection, Constraint, NotFound, State, Validation};

    vec![
        // Validation: missing required fields
        pattern(
            "VAL-001",
            r#"(?:Missing required|Required) fields?[:\s]*['"]?(?P<field>\w+(?:\.\w+)?)['"]?"#,
            Some("odoo.exceptions.ValidationError"),
            Validation,
            codes::MISSING_REQUIRED_FIELD,
            "Required field '{field}' is missing",
            "Include '{field}' in the values. Use odoo_core_fields_get with model='{model}' to see field details and requirements.",
        ),
        pattern(
            "VAL-001b",
            r#"null value in column "(?P<field>\w+)".*violates not-null constraint"#,
            None,
            Validation,
            codes::MISSING_REQUIRED_FIELD,
            "Required field '{field}' cannot be empty (database constraint)",
            "Include a value for '{field}'. This field is required at the database level.",
        ),
        // Validation: invalid field
        pattern(
            "VAL-002",
            r"Invalid field '(?P<field>\w+)' on model '(?P<model>[\w.]+)'",
            None,
            Validation,
            codes::INVALID_FIELD,
            "Field '{field}' does not exist on model '{model}'",
            "Use odoo_core_fields_get with model='{model}' to see available fields. The field '{field}' may be misspelled or not available in this Odoo version.",
        ),
        // Validation: wrong value
        pattern(
            "VAL-003",
            r"Wrong value for (?P<field>\w+):\s*'(?P<value>[^']*)'",
            Some("odoo.exceptions.ValidationError"),
            Validation,
            codes::WRONG_VALUE,
            "Invalid value '{value}' for field '{field}'",
            "Check the valid values for '{field}'. Use odoo_core_fields_get to see the field type and constraints.",
        ),
        // Validation: expected singleton
        pattern(
            "VAL-004",
            r"Expected singleton.*got (?P<count>\d+) records",
            Some("ValueError"),
            Validation,
            codes::SINGLETON_EXPECTED,
            "Expected a single record but got {count} records",
            "The operation expects exactly one record. Narrow your selection to a single record ID.",
        ),
        // Validation: invalid selection value
        pattern(
            "VAL-005",
            r"Selection '(?P<value>\w+)' invalid for field '(?P<field>\w+)' on model '(?P<model>[\w.]+)'",
            None,
            Validation,
            codes::INVALID_SELECTION,
            "Value '{value}' is not valid for selection field '{field}' on {model}",
            "Use odoo_core_fields_get with model='{model}' to see valid selection values for '{field}'.",
        ),
        // Validation: type mismatch
        pattern(
            "VAL-006",
            r"expected\s+(?P<expected_type>\w+).*?(?:got|received)\s+(?P<actual_type>\w+)",
            Some("TypeError"),
            Validation,
            codes::TYPE_MISMATCH,
            "Type mismatch: expected {expected_type}, got {actual_type}",
            "Check the field type. Many2one fields expect an integer (record ID), not a string or list.",
        ),
        // Validation: invalid integer literal
        pattern(
            "VAL-007",
            r"invalid literal for int\(\) with base 10: '(?P<value>[^']*)'",
            Some("ValueError"),
            Validation,
            codes::INVALID_INTEGER,
            "Cannot convert '{value}' to integer",
            "The field expects an integer value. If this is a Many2one field, use the record's integer ID, not its name.",
        ),
        // Access: denied
        pattern(
            "ACC-001",
            r"Access Denied",
            Some("odoo.exceptions.AccessDenied"),
            Access,
            codes::ACCESS_DENIED,
            "Access denied. Authentication credentials are invalid or expired.",
            "Check the username and password/API key. The session may have expired.",
        ),
        // Access: operation not allowed
        pattern(
            "ACC-002",
            r"(?:You are not allowed to|Sorry, you are not allowed to)\s+(?P<operation>\w+)\s+(?:this|this type of|the)\s+(?P<resource>[\w. ]+)",
            Some("odoo.exceptions.AccessError"),
            Access,
            codes::OPERATION_NOT_ALLOWED,
            "You do not have permission to {operation} on {resource}",
            "The current user lacks the required Odoo permissions for this operation. Contact an administrator to grant the necessary access rights.",
        ),
        // Access: record rule violation
        pattern(
            "ACC-003",
            r"Record rule.*prevented.*?(?P<model>[\w.]+)",
            Some("odoo.exceptions.AccessError"),
            Access,
            codes::RECORD_RULE_VIOLATION,
            "Access to this record is restricted by security rules on {model}",
            "The current user cannot access this specific record due to Odoo record rules. Try accessing a different record or contact an administrator.",
        ),
        // Access: model access denied
        pattern(
            "ACC-004",
            r"Access to model '(?P<model>[\w.]+)' is not allowed",
            Some("odoo.exceptions.AccessError"),
            Access,
            codes::MODEL_ACCESS_DENIED,
            "No access to model '{model}'",
            "The current user does not have access to the '{model}' model. This model may require specific Odoo groups/permissions.",
        ),
        // Not found: record
        pattern(
            "NF-001",
            r"Record does not exist or has been deleted.*?(?P<model>[\w.]+)\((?P<ids>\d+(?:,\s*\d+)*)\)",
            Some("odoo.exceptions.MissingError"),
            NotFound,
            codes::RECORD_NOT_FOUND,
            "Record(s) {ids} not found in model {model}",
            "The record(s) with ID(s) {ids} do not exist in '{model}'. They may have been deleted. Use odoo_core_search_read to find valid records.",
        ),
        // Not found: model
        pattern(
            "NF-002",
            r"(?:(?:model\s+)?'?(?P<model>[\w.]+)'?\s+(?:does not exist|doesn't exist))|(?:unknown model[:\s]*'?(?P<model_alt>[\w.]+)'?)",
            None,
            NotFound,
            codes::MODEL_NOT_FOUND,
            "Model '{model}' does not exist",
            "The model '{model}' is not available. It may require a module that isn't installed. Use odoo_core_list_models to see available models.",
        ),
        // Constraint: unique violation
        pattern(
            "CON-001",
            r#"duplicate key value violates unique constraint "(?P<constraint>\w+)".*?Key \((?P<field>\w+)\)=\((?P<value>[^)]+)\)"#,
            Some("psycopg2.errors.UniqueViolation"),
            Constraint,
            codes::UNIQUE_VIOLATION,
            "A record with {field}='{value}' already exists (constraint: {constraint})",
            "A record with this value already exists. Either use a different value or search for the existing record using odoo_core_search_read.",
        ),
        // Constraint: check constraint
        pattern(
            "CON-002",
            r#"check constraint "(?P<constraint>\w+)".*?violat"#,
            Some("psycopg2.errors.CheckViolation"),
            Constraint,
            codes::CHECK_CONSTRAINT,
            "Value violates check constraint '{constraint}'",
            "The value doesn't meet the database constraint '{constraint}'. Check the valid range of values for the field.",
        ),
        // Constraint: foreign key
        pattern(
            "CON-003",
            r#"foreign key constraint "(?P<constraint>\w+)".*?referenced.*?"(?P<table>\w+)""#,
            Some("psycopg2.errors.ForeignKeyViolation"),
            Constraint,
            codes::FK_VIOLATION,
            "Foreign key constraint violation: referenced record in '{table}' not found",
            "The referenced record does not exist. Verify the ID is correct by searching in the related model.",
        ),
        // State: invalid transition
        pattern(
            "ST-001",
            r"(?:Cannot|can't|unable to)\s+(?P<action>\w+).*?(?:in state|state)\s+'(?P<state>\w+)'",
            Some("odoo.exceptions.UserError"),
            State,
            codes::INVALID_STATE_TRANSITION,
            "Cannot {action} when record is in state '{state}'",
            "The record is currently in state '{state}'. Check the valid state transitions using the odoo://model/{model}/states resource.",
        ),
        // State: draft required
        pattern(
            "ST-002",
            r"Only\s+(?:draft|quotation).*?can be (?P<action>\w+)",
            Some("odoo.exceptions.UserError"),
            State,
            codes::DRAFT_REQUIRED,
            "Record must be in draft state to {action}",
            "Reset the record to draft first using odoo_core_execute with method='action_draft', then retry the operation.",
        ),
        // State: already processed
        pattern(
            "ST-003",
            r"(?:already|has been)\s+(?:confirmed|validated|posted|cancelled|done|locked)",
            Some("odoo.exceptions.UserError"),
            State,
            codes::ALREADY_PROCESSED,
            "The record has already been processed",
            "This operation has already been completed. Read the current record state to confirm.",
        ),
        // Business: missing accounting config
        pattern(
            "BIZ-001",
            r"No\s+(?:account|journal).*?(?:configured|defined|found)",
            Some("odoo.exceptions.UserError"),
            Validation,
            codes::MISSING_ACCOUNTING_CONFIG,
            "Missing accounting configuration",
            "The Odoo instance needs accounting configuration. An administrator should configure default accounts and journals in the Invoicing settings.",
        ),
        // Business: insufficient stock
        pattern(
            "BIZ-002",
            r"(?:not enough|insufficient)\s+(?:stock|quantity|qty)",
            Some("odoo.exceptions.UserError"),
            Validation,
            codes::INSUFFICIENT_STOCK,
            "Insufficient stock for this operation",
            "Check available stock before attempting this operation.",
        ),
        // Business: document without lines
        pattern(
            "BIZ-003",
            r"(?:order|invoice|picking).*?(?:has no|without any)\s+(?:lines?|items?)",
            Some("odoo.exceptions.UserError"),
            Validation,
            codes::MISSING_LINES,
            "The document has no lines/items",
            "Add at least one line/item before confirming. Use odoo_core_write to add lines using the (0, 0, {{values}}) command syntax.",
        ),
        // Business: already reconciled
        pattern(
            "BIZ-004",
            r"The move.*?is already reconciled",
            Some("odoo.exceptions.UserError"),
            State,
            codes::ALREADY_RECONCILED,
            "The journal entry is already reconciled",
            "This payment/entry has already been reconciled. To modify it, you need to unreconcile first.",
        ),
        // Business: cannot delete processed
        pattern(
            "BIZ-005",
            r"(?:You can not|cannot)\s+(?:delete|remove|unlink).*?(?:posted|validated|confirmed)",
            Some("odoo.exceptions.UserError"),
            State,
            codes::CANNOT_DELETE_PROCESSED,
            "Cannot delete a processed/posted record",
            "Reset the record to draft first (using action_draft or action_cancel), then delete it.",
        ),
        // Connection: refused
        pattern(
            "CONN-001",
            r"(?:Connection refused|ECONNREFUSED)",
            None,
            Connection,
            codes::CONNECTION_REFUSED,
            "Cannot connect to Odoo server",
            "The Odoo server is not responding. Check that the server is running and the URL is correct.",
        ),
        // Connection: timeout
        pattern(
            "CONN-002",
            r"(?:timed out|timeout|ETIMEDOUT)",
            None,
            Connection,
            codes::TIMEOUT,
            "Request timed out",
            "The Odoo server took too long to respond. The operation may still be processing. Wait a moment and check the result, or retry with a simpler query.",
        ),
        // Connection: session expired
        pattern(
            "CONN-003",
            r"Session expired|session_expired|Invalid session",
            None,
            Connection,
            codes::SESSION_EXPIRED,
            "Odoo session has expired",
            "The session needs to be refreshed. This should happen automatically. If the error persists, restart the MCP server.",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_patterns_compile() {
        let patterns = error_patterns();
        assert!(patterns.len() >= 20);
    }

    #[test]
    fn ids_are_unique() {
        let patterns = error_patterns();
        let mut ids: Vec<&str> = patterns.iter().map(|p| p.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), patterns.len());
    }

    #[test]
    fn declared_category_matches_on_match() {
        // For every pattern that matches a crafted message, the declared
        // category and code come back verbatim via the classifier.
        let handler = crate::ErrorHandler::new();
        let resp = handler.classify(
            "Missing required fields: 'partner_id'",
            Some("odoo.exceptions.ValidationError"),
            Some("sale.order"),
            None,
        );
        assert_eq!(resp.category, ErrorCategory::Validation);
        assert_eq!(resp.code, crate::codes::MISSING_REQUIRED_FIELD);
    }
}
