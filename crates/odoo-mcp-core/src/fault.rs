use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified backend fault produced by every wire adapter
///
/// Carries whatever structure could be recovered from the raw error: the
/// backend exception class when the protocol reports one, and the full
/// traceback when the backend includes it (never forwarded to MCP clients).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcFault {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

impl RpcFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_class: None,
            traceback: None,
            model: None,
            method: None,
        }
    }

    #[must_use]
    pub fn with_call(mut self, model: &str, method: &str) -> Self {
        self.model = Some(model.to_owned());
        self.method = Some(method.to_owned());
        self
    }

    /// Build a fault from an XML-RPC fault string
    ///
    /// The fault string is either a bare message, a `Class: message` pair,
    /// or a full traceback whose last line carries the exception.
    pub fn from_fault_string(fault_string: &str) -> Self {
        let (class, message) = if fault_string.contains("Traceback") {
            extract_exception_line(fault_string)
        } else {
            split_class_message(fault_string)
        };

        Self {
            message: if message.is_empty() {
                fault_string.to_owned()
            } else {
                message
            },
            error_class: (!class.is_empty()).then_some(class),
            traceback: fault_string
                .contains("Traceback")
                .then(|| fault_string.to_owned()),
            model: None,
            method: None,
        }
    }

    /// Build a fault from a JSON-RPC error `data` object
    /// (`name` = exception class, `message`, `debug` = traceback)
    pub fn from_jsonrpc_data(data: &serde_json::Value) -> Self {
        let mut name = data
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_owned();
        let mut message = data
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_owned();
        let debug = data
            .get("debug")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        if !debug.is_empty() {
            let (tb_class, tb_msg) = extract_exception_line(debug);
            if name.is_empty() && !tb_class.is_empty() {
                name = tb_class;
            }
            if message.is_empty() && !tb_msg.is_empty() {
                message = tb_msg;
            }
        }

        Self {
            message,
            error_class: (!name.is_empty()).then_some(name),
            traceback: (!debug.is_empty()).then(|| debug.to_owned()),
            model: None,
            method: None,
        }
    }
}

impl fmt::Display for RpcFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_class {
            Some(class) => write!(f, "{class}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Errors crossing the adapter boundary
///
/// Tools re-wrap `Rpc` faults into client-facing error responses; the
/// remaining variants drive the connection manager's recovery policy.
#[derive(Debug, Error)]
pub enum OdooError {
    /// Backend rejected the credentials (uid 0/false counts as rejection)
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The session cookie or token is no longer accepted
    #[error("session expired: {0}")]
    SessionExpired(String),

    /// Backend refused the operation outright (HTTP 403)
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// JSON-2 endpoint missing for this model/method (drives XML-RPC fallback)
    #[error("endpoint not found: {model}/{method}")]
    EndpointNotFound { model: String, method: String },

    /// Network-level failure: refused, reset, timed out
    #[error("connection error: {0}")]
    Connection(String),

    /// Structured fault reported by the backend
    #[error("{0}")]
    Rpc(RpcFault),
}

impl OdooError {
    /// Whether the connection manager should reconnect and retry once
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::SessionExpired(_) | Self::Connection(_))
    }
}

fn exception_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([\w.]+(?:Error|Exception|Warning|Denied|Violation))\s*:?\s*(.*)$")
            .expect("valid exception line regex")
    })
}

/// Extract `(class, message)` from the last line of a traceback
///
/// Returns empty strings when the line does not look like an exception;
/// in that case the caller keeps the raw text as the message.
pub fn extract_exception_line(traceback: &str) -> (String, String) {
    let Some(last) = traceback.trim().lines().last().map(str::trim) else {
        return (String::new(), String::new());
    };

    if let Some(caps) = exception_line_re().captures(last) {
        return (caps[1].to_owned(), caps[2].trim().to_owned());
    }
    (String::new(), last.to_owned())
}

fn split_class_message(s: &str) -> (String, String) {
    if let Some(caps) = exception_line_re().captures(s.trim()) {
        (caps[1].to_owned(), caps[2].trim().to_owned())
    } else {
        (String::new(), s.trim().to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traceback_last_line_extracted() {
        let tb = "Traceback (most recent call last):\n  File \"x.py\", line 1\nodoo.exceptions.ValidationError: Missing required field: partner_id";
        let fault = RpcFault::from_fault_string(tb);
        assert_eq!(
            fault.error_class.as_deref(),
            Some("odoo.exceptions.ValidationError")
        );
        assert_eq!(fault.message, "Missing required field: partner_id");
        assert!(fault.traceback.is_some());
    }

    #[test]
    fn bare_class_message_pair() {
        let fault = RpcFault::from_fault_string("AccessError: You are not allowed to modify this");
        assert_eq!(fault.error_class.as_deref(), Some("AccessError"));
        assert_eq!(fault.message, "You are not allowed to modify this");
        assert!(fault.traceback.is_none());
    }

    #[test]
    fn plain_message_kept_verbatim() {
        let fault = RpcFault::from_fault_string("something odd happened");
        assert!(fault.error_class.is_none());
        assert_eq!(fault.message, "something odd happened");
    }

    #[test]
    fn jsonrpc_data_prefers_explicit_fields() {
        let data = serde_json::json!({
            "name": "odoo.exceptions.UserError",
            "message": "Only draft orders can be confirmed",
            "debug": "Traceback ...\nValueError: unrelated",
        });
        let fault = RpcFault::from_jsonrpc_data(&data);
        assert_eq!(
            fault.error_class.as_deref(),
            Some("odoo.exceptions.UserError")
        );
        assert_eq!(fault.message, "Only draft orders can be confirmed");
    }

    #[test]
    fn jsonrpc_data_falls_back_to_debug() {
        let data = serde_json::json!({
            "debug": "Traceback (most recent call last):\npsycopg2.errors.UniqueViolation: duplicate key",
        });
        let fault = RpcFault::from_jsonrpc_data(&data);
        assert_eq!(
            fault.error_class.as_deref(),
            Some("psycopg2.errors.UniqueViolation")
        );
        assert_eq!(fault.message, "duplicate key");
    }

    #[test]
    fn recoverable_classification() {
        assert!(OdooError::SessionExpired("x".into()).is_recoverable());
        assert!(OdooError::Connection("x".into()).is_recoverable());
        assert!(!OdooError::Authentication("x".into()).is_recoverable());
        assert!(!OdooError::Rpc(RpcFault::new("x")).is_recoverable());
    }
}
