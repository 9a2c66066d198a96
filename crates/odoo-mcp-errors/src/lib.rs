//! Error classification for the Odoo MCP bridge
//!
//! Turns raw backend faults into structured, LLM-consumable error
//! responses: a category, a machine-readable code, an actionable suggestion
//! referencing concrete tool names, and a retry flag.

mod handler;
mod patterns;

pub use handler::ErrorHandler;
pub use patterns::{ErrorPattern, error_patterns};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error classification categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Access,
    NotFound,
    Constraint,
    State,
    Wizard,
    Connection,
    RateLimit,
    Configuration,
    Unknown,
}

impl ErrorCategory {
    /// Retry guidance by category
    pub const fn retryable(self) -> bool {
        !matches!(self, Self::Access | Self::Configuration | Self::Unknown)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Access => "access",
            Self::NotFound => "not_found",
            Self::Constraint => "constraint",
            Self::State => "state",
            Self::Wizard => "wizard",
            Self::Connection => "connection",
            Self::RateLimit => "rate_limit",
            Self::Configuration => "configuration",
            Self::Unknown => "unknown",
        }
    }
}

/// Machine-readable error codes
pub mod codes {
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const MISSING_REQUIRED_FIELD: &str = "MISSING_REQUIRED_FIELD";
    pub const INVALID_FIELD: &str = "INVALID_FIELD";
    pub const INVALID_DOMAIN: &str = "INVALID_DOMAIN";
    pub const WRONG_VALUE: &str = "WRONG_VALUE";
    pub const SINGLETON_EXPECTED: &str = "SINGLETON_EXPECTED";
    pub const INVALID_SELECTION: &str = "INVALID_SELECTION";
    pub const TYPE_MISMATCH: &str = "TYPE_MISMATCH";
    pub const INVALID_INTEGER: &str = "INVALID_INTEGER";
    pub const USER_ERROR: &str = "USER_ERROR";
    pub const MISSING_ACCOUNTING_CONFIG: &str = "MISSING_ACCOUNTING_CONFIG";
    pub const INSUFFICIENT_STOCK: &str = "INSUFFICIENT_STOCK";
    pub const MISSING_LINES: &str = "MISSING_LINES";

    pub const ACCESS_DENIED: &str = "ACCESS_DENIED";
    pub const OPERATION_NOT_ALLOWED: &str = "OPERATION_NOT_ALLOWED";
    pub const RECORD_RULE_VIOLATION: &str = "RECORD_RULE_VIOLATION";
    pub const MODEL_ACCESS_DENIED: &str = "MODEL_ACCESS_DENIED";
    pub const SESSION_EXPIRED: &str = "SESSION_EXPIRED";

    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const RECORD_NOT_FOUND: &str = "RECORD_NOT_FOUND";
    pub const MODEL_NOT_FOUND: &str = "MODEL_NOT_FOUND";

    pub const UNIQUE_VIOLATION: &str = "UNIQUE_VIOLATION";
    pub const CHECK_CONSTRAINT: &str = "CHECK_CONSTRAINT";
    pub const FK_VIOLATION: &str = "FK_VIOLATION";

    pub const INVALID_STATE_TRANSITION: &str = "INVALID_STATE_TRANSITION";
    pub const DRAFT_REQUIRED: &str = "DRAFT_REQUIRED";
    pub const ALREADY_PROCESSED: &str = "ALREADY_PROCESSED";
    pub const ALREADY_RECONCILED: &str = "ALREADY_RECONCILED";
    pub const CANNOT_DELETE_PROCESSED: &str = "CANNOT_DELETE_PROCESSED";

    pub const WIZARD_REQUIRED: &str = "WIZARD_REQUIRED";
    pub const WIZARD_CHAIN_TOO_DEEP: &str = "WIZARD_CHAIN_TOO_DEEP";

    pub const CONNECTION_ERROR: &str = "CONNECTION_ERROR";
    pub const CONNECTION_REFUSED: &str = "CONNECTION_REFUSED";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const ENDPOINT_NOT_FOUND: &str = "ENDPOINT_NOT_FOUND";

    pub const RATE_LIMITED: &str = "RATE_LIMITED";
    pub const CONFIG_ERROR: &str = "CONFIG_ERROR";
    pub const UNKNOWN_ERROR: &str = "UNKNOWN_ERROR";
}

/// Structured, LLM-facing error response
///
/// Always returned inside a tool-result envelope with `isError=true`; the
/// full backend traceback only ever appears in `original_error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: bool,
    pub category: ErrorCategory,
    pub code: String,
    pub message: String,
    pub suggestion: String,
    pub retry: bool,
    /// Seconds to wait before retrying (connection and rate-limit errors)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_error: Option<String>,
}

impl ErrorResponse {
    pub fn new(
        category: ErrorCategory,
        code: &str,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            error: true,
            category,
            code: code.to_owned(),
            message: message.into(),
            suggestion: suggestion.into(),
            retry: category.retryable(),
            retry_after: None,
            details: None,
            original_error: None,
        }
    }

    #[must_use]
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    #[must_use]
    pub fn with_original(mut self, original: impl Into<String>) -> Self {
        self.original_error = Some(original.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_by_category() {
        assert!(ErrorCategory::Validation.retryable());
        assert!(ErrorCategory::NotFound.retryable());
        assert!(ErrorCategory::Constraint.retryable());
        assert!(ErrorCategory::State.retryable());
        assert!(ErrorCategory::Wizard.retryable());
        assert!(ErrorCategory::Connection.retryable());
        assert!(ErrorCategory::RateLimit.retryable());
        assert!(!ErrorCategory::Access.retryable());
        assert!(!ErrorCategory::Configuration.retryable());
        assert!(!ErrorCategory::Unknown.retryable());
    }

    #[test]
    fn optional_fields_omitted_from_json() {
        let resp = ErrorResponse::new(
            ErrorCategory::Validation,
            codes::VALIDATION_ERROR,
            "bad value",
            "fix it",
        );
        let json = serde_json::to_value(&resp).expect("serializes");
        assert_eq!(json["error"], true);
        assert_eq!(json["category"], "validation");
        assert!(json.get("retry_after").is_none());
        assert!(json.get("details").is_none());
        assert!(json.get("original_error").is_none());
    }
}
