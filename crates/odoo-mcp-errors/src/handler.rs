//! Error classifier
//!
//! Matching order: patterns declaring an `error_class` are skipped when the
//! fault carries a different class; among the rest, the first regex match
//! wins. Named groups plus the call-site model/method fill the templates.
//! No match falls back to `unknown` with `retry=false`.

use std::collections::HashMap;

use odoo_mcp_core::{OdooError, RpcFault};

use crate::patterns::error_patterns;
use crate::{ErrorCategory, ErrorResponse, codes};

/// Exception-class fallback used when no pattern matches but the backend
/// reported a recognizable class
const CLASS_MAP: &[(&str, ErrorCategory, &str)] = &[
    (
        "odoo.exceptions.ValidationError",
        ErrorCategory::Validation,
        codes::VALIDATION_ERROR,
    ),
    (
        "odoo.exceptions.UserError",
        ErrorCategory::Validation,
        codes::USER_ERROR,
    ),
    (
        "odoo.exceptions.AccessError",
        ErrorCategory::Access,
        codes::ACCESS_DENIED,
    ),
    (
        "odoo.exceptions.AccessDenied",
        ErrorCategory::Access,
        codes::ACCESS_DENIED,
    ),
    (
        "odoo.exceptions.MissingError",
        ErrorCategory::NotFound,
        codes::NOT_FOUND,
    ),
    (
        "psycopg2.errors.UniqueViolation",
        ErrorCategory::Constraint,
        codes::UNIQUE_VIOLATION,
    ),
    (
        "psycopg2.errors.CheckViolation",
        ErrorCategory::Constraint,
        codes::CHECK_CONSTRAINT,
    ),
    (
        "psycopg2.errors.ForeignKeyViolation",
        ErrorCategory::Constraint,
        codes::FK_VIOLATION,
    ),
];

/// Seconds suggested before retrying a connection-category error
const CONNECTION_RETRY_AFTER: u64 = 5;

/// The error classifier
///
/// Stateless apart from the shared pattern database; cheap to share.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorHandler;

impl ErrorHandler {
    pub fn new() -> Self {
        Self
    }

    /// Classify a raw error message against the pattern database
    pub fn classify(
        &self,
        message: &str,
        error_class: Option<&str>,
        model: Option<&str>,
        method: Option<&str>,
    ) -> ErrorResponse {
        for pattern in error_patterns() {
            if let (Some(required), Some(actual)) = (pattern.error_class, error_class)
                && !actual.contains(required)
            {
                continue;
            }

            let Some(caps) = pattern.regex.captures(message) else {
                continue;
            };

            let mut groups: HashMap<&str, String> = HashMap::new();
            for name in pattern.regex.capture_names().flatten() {
                let value = caps.name(name).map(|m| m.as_str().to_owned());
                match name.strip_suffix("_alt") {
                    Some(base) => {
                        if let Some(v) = value
                            && groups.get(base).is_none_or(|existing| existing.is_empty())
                        {
                            groups.insert(base, v);
                        }
                    }
                    None => {
                        groups.insert(name, value.unwrap_or_default());
                    }
                }
            }
            if let Some(model) = model {
                groups.insert("model", model.to_owned());
            }
            groups
                .entry("model")
                .or_insert_with(|| "unknown".to_owned());
            groups
                .entry("method")
                .or_insert_with(|| method.unwrap_or_default().to_owned());

            let mut response = ErrorResponse::new(
                pattern.category,
                pattern.code,
                fill_template(pattern.message_template, &groups),
                fill_template(pattern.suggestion_template, &groups),
            )
            .with_original(message);
            if pattern.category == ErrorCategory::Connection {
                response.retry_after = Some(CONNECTION_RETRY_AFTER);
            }
            if !groups.is_empty() {
                let details: serde_json::Map<String, serde_json::Value> = groups
                    .into_iter()
                    .filter(|(_, v)| !v.is_empty())
                    .map(|(k, v)| (k.to_owned(), serde_json::Value::String(v)))
                    .collect();
                response.details = Some(serde_json::Value::Object(details));
            }

            self.log(&response, model, method);
            return response;
        }

        // Class-based fallback before giving up
        if let Some(class) = error_class {
            for (known, category, code) in CLASS_MAP {
                if class.contains(known) {
                    let response = ErrorResponse::new(
                        *category,
                        code,
                        truncate(message, 200),
                        fallback_suggestion(*category, model),
                    )
                    .with_original(message);
                    self.log(&response, model, method);
                    return response;
                }
            }
        }

        let response = ErrorResponse::new(
            ErrorCategory::Unknown,
            codes::UNKNOWN_ERROR,
            format!("Odoo error: {}", truncate(message, 200)),
            "An unexpected error occurred. Check the error details and try a different approach.",
        )
        .with_original(message);
        self.log(&response, model, method);
        response
    }

    /// Classify a structured backend fault
    pub fn classify_fault(&self, fault: &RpcFault) -> ErrorResponse {
        let mut response = self.classify(
            &fault.message,
            fault.error_class.as_deref(),
            fault.model.as_deref(),
            fault.method.as_deref(),
        );
        // The traceback goes into original_error only, never to the client
        // in any other field.
        if let Some(tb) = &fault.traceback {
            response.original_error = Some(tb.clone());
        }
        response
    }

    /// Classify an adapter-level error
    pub fn classify_error(&self, error: &OdooError) -> ErrorResponse {
        match error {
            OdooError::Rpc(fault) => self.classify_fault(fault),
            OdooError::Authentication(msg) => {
                let response = ErrorResponse::new(
                    ErrorCategory::Access,
                    codes::ACCESS_DENIED,
                    "Access denied. Authentication credentials are invalid or expired.",
                    "Check the username and password/API key. The session may have expired.",
                )
                .with_original(msg.clone());
                self.log(&response, None, None);
                response
            }
            OdooError::SessionExpired(msg) => {
                let response = ErrorResponse::new(
                    ErrorCategory::Connection,
                    codes::SESSION_EXPIRED,
                    "Odoo session has expired",
                    "The session is refreshed automatically; retry the operation.",
                )
                .with_retry_after(CONNECTION_RETRY_AFTER)
                .with_original(msg.clone());
                self.log(&response, None, None);
                response
            }
            OdooError::AccessDenied(msg) => {
                let response = ErrorResponse::new(
                    ErrorCategory::Access,
                    codes::ACCESS_DENIED,
                    truncate(msg, 200),
                    fallback_suggestion(ErrorCategory::Access, None),
                )
                .with_original(msg.clone());
                self.log(&response, None, None);
                response
            }
            OdooError::EndpointNotFound { model, method } => {
                let response = ErrorResponse::new(
                    ErrorCategory::Connection,
                    codes::ENDPOINT_NOT_FOUND,
                    format!("API endpoint not found for {model}/{method}"),
                    "The Odoo API endpoint was not found. Check the server URL and protocol.",
                )
                .with_retry_after(CONNECTION_RETRY_AFTER);
                self.log(&response, Some(model), Some(method));
                response
            }
            OdooError::Connection(msg) => {
                // Reuse the pattern DB so refused/timeout get their codes
                let mut response = self.classify(msg, None, None, None);
                if response.category != ErrorCategory::Connection {
                    response = ErrorResponse::new(
                        ErrorCategory::Connection,
                        codes::CONNECTION_ERROR,
                        truncate(msg, 200),
                        fallback_suggestion(ErrorCategory::Connection, None),
                    )
                    .with_retry_after(CONNECTION_RETRY_AFTER)
                    .with_original(msg.clone());
                    self.log(&response, None, None);
                }
                response
            }
        }
    }

    fn log(&self, response: &ErrorResponse, model: Option<&str>, method: Option<&str>) {
        let model = model.unwrap_or_default();
        let method = method.unwrap_or_default();
        match response.category {
            ErrorCategory::Access | ErrorCategory::Connection | ErrorCategory::Unknown => {
                tracing::error!(
                    code = %response.code,
                    model,
                    method,
                    "{}",
                    response.message
                );
            }
            _ => {
                tracing::warn!(
                    code = %response.code,
                    model,
                    method,
                    "{}",
                    response.message
                );
            }
        }
        if let Some(original) = &response.original_error {
            tracing::debug!(code = %response.code, "full error: {original}");
        }
    }
}

fn fill_template(template: &str, groups: &HashMap<&str, String>) -> String {
    let mut out = template.to_owned();
    for (name, value) in groups {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out.replace("{{", "{").replace("}}", "}")
}

fn fallback_suggestion(category: ErrorCategory, model: Option<&str>) -> String {
    match category {
        ErrorCategory::Validation => model.map_or_else(
            || "Check the field values and try again.".to_owned(),
            |m| {
                format!(
                    "Check the field values. Use odoo_core_fields_get with model='{m}' to see field types and requirements."
                )
            },
        ),
        ErrorCategory::Access => {
            "The current user does not have permission for this operation.".to_owned()
        }
        ErrorCategory::NotFound => {
            "The record or model was not found. Verify the ID or model name.".to_owned()
        }
        ErrorCategory::Constraint => {
            "A database constraint was violated. Check for duplicate or invalid values.".to_owned()
        }
        ErrorCategory::State => {
            "The record is in an invalid state for this operation. Check the current state first."
                .to_owned()
        }
        ErrorCategory::Wizard => {
            "This operation requires a wizard interaction. Follow the wizard protocol.".to_owned()
        }
        ErrorCategory::Connection => {
            "A connection error occurred. The server may be down or unreachable.".to_owned()
        }
        ErrorCategory::RateLimit => "Too many requests. Wait before retrying.".to_owned(),
        ErrorCategory::Configuration => {
            "A configuration error was detected. An administrator needs to fix the server configuration."
                .to_owned()
        }
        ErrorCategory::Unknown => {
            "An unexpected error occurred. Check the error details and try a different approach."
                .to_owned()
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_owned()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s[..end].to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_required_field_scenario() {
        let handler = ErrorHandler::new();
        let fault = RpcFault {
            message: "Missing required fields: 'partner_id'".to_owned(),
            error_class: Some("odoo.exceptions.ValidationError".to_owned()),
            traceback: None,
            model: Some("sale.order".to_owned()),
            method: Some("create".to_owned()),
        };
        let resp = handler.classify_fault(&fault);
        assert_eq!(resp.category, ErrorCategory::Validation);
        assert_eq!(resp.code, codes::MISSING_REQUIRED_FIELD);
        assert!(resp.retry);
        assert!(resp.suggestion.contains("fields_get"));
        assert!(resp.suggestion.contains("sale.order"));
        let details = resp.details.expect("details present");
        assert_eq!(details["field"], "partner_id");
    }

    #[test]
    fn class_filter_skips_mismatched_patterns() {
        let handler = ErrorHandler::new();
        // ST-001 requires UserError; with a different class the message
        // should not classify as a state error.
        let resp = handler.classify(
            "Cannot confirm order in state 'cancel'",
            Some("odoo.exceptions.AccessError"),
            Some("sale.order"),
            None,
        );
        assert_ne!(resp.code, codes::INVALID_STATE_TRANSITION);
    }

    #[test]
    fn no_class_still_matches_class_bound_patterns() {
        let handler = ErrorHandler::new();
        let resp = handler.classify("Cannot confirm order in state 'cancel'", None, None, None);
        assert_eq!(resp.category, ErrorCategory::State);
        assert_eq!(resp.code, codes::INVALID_STATE_TRANSITION);
    }

    #[test]
    fn unmatched_message_is_unknown_no_retry() {
        let handler = ErrorHandler::new();
        let resp = handler.classify("zorp gleebled the flux capacitor", None, None, None);
        assert_eq!(resp.category, ErrorCategory::Unknown);
        assert_eq!(resp.code, codes::UNKNOWN_ERROR);
        assert!(!resp.retry);
    }

    #[test]
    fn class_fallback_when_regex_misses() {
        let handler = ErrorHandler::new();
        let resp = handler.classify(
            "something domain-specific went sideways",
            Some("odoo.exceptions.UserError"),
            Some("account.move"),
            None,
        );
        assert_eq!(resp.category, ErrorCategory::Validation);
        assert_eq!(resp.code, codes::USER_ERROR);
    }

    #[test]
    fn model_not_found_alternation() {
        let handler = ErrorHandler::new();
        let resp = handler.classify("unknown model: 'helpdesk.ticket'", None, None, None);
        assert_eq!(resp.code, codes::MODEL_NOT_FOUND);
        assert!(resp.message.contains("helpdesk.ticket"));
    }

    #[test]
    fn connection_errors_carry_retry_after() {
        let handler = ErrorHandler::new();
        let resp = handler.classify_error(&OdooError::Connection("Connection refused".into()));
        assert_eq!(resp.category, ErrorCategory::Connection);
        assert_eq!(resp.code, codes::CONNECTION_REFUSED);
        assert!(resp.retry);
        assert_eq!(resp.retry_after, Some(CONNECTION_RETRY_AFTER));
    }

    #[test]
    fn traceback_only_in_original_error() {
        let handler = ErrorHandler::new();
        let tb = "Traceback (most recent call last):\n  ...\nodoo.exceptions.UserError: Only draft orders can be confirmed";
        let fault = RpcFault {
            message: "Only draft orders can be confirmed".to_owned(),
            error_class: Some("odoo.exceptions.UserError".to_owned()),
            traceback: Some(tb.to_owned()),
            model: None,
            method: None,
        };
        let resp = handler.classify_fault(&fault);
        assert_eq!(resp.original_error.as_deref(), Some(tb));
        assert!(!resp.message.contains("Traceback"));
        assert!(!resp.suggestion.contains("Traceback"));
    }
}
