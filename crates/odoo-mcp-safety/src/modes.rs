//! Mode enforcement and model/field/method filtering
//!
//! Enforcement is a pure function of (mode, operation, model, fields,
//! method). Default blocklists are always unioned with user-provided ones;
//! user records stay readable but never writable unless explicitly
//! overridden.

use std::collections::HashSet;

use odoo_mcp_config::{OperationMode, SafetyConfig};
use serde_json::{Map, Value};

use crate::SafetyError;

/// Models blocked by default: configuration, automation, security, mail
/// infrastructure, and payment providers
const DEFAULT_MODEL_BLOCKLIST: &[&str] = &[
    "ir.config_parameter",
    "ir.cron",
    "base.automation",
    "ir.rule",
    "ir.model.access",
    "ir.mail_server",
    "fetchmail.server",
    "payment.provider",
];

/// Fields blocked by default: credentials and secrets
const DEFAULT_FIELD_BLOCKLIST: &[&str] = &[
    "password",
    "password_crypt",
    "oauth_access_token",
    "oauth_provider_id",
    "api_key",
    "api_key_ids",
    "totp_secret",
    "totp_enabled",
    "signature",
];

/// Methods blocked by default: privilege escalation, environment rewrites,
/// cache invalidation, and module management
const DEFAULT_METHOD_BLOCKLIST: &[&str] = &[
    "sudo",
    "with_user",
    "with_env",
    "with_context",
    "invalidate_cache",
    "clear_caches",
    "init",
    "uninstall",
    "module_uninstall",
];

/// The gated operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Create,
    Write,
    Unlink,
    Execute,
}

impl Operation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Create => "create",
            Self::Write => "write",
            Self::Unlink => "unlink",
            Self::Execute => "execute",
        }
    }

    pub const fn is_write(self) -> bool {
        !matches!(self, Self::Read)
    }
}

/// Effective safety policy: user configuration with the defaults merged in
///
/// Immutable between configuration reloads.
#[derive(Debug, Clone)]
pub struct SafetyPolicy {
    pub mode: OperationMode,
    model_allowlist: Vec<String>,
    write_allowlist: Vec<String>,
    model_blocklist: HashSet<String>,
    field_blocklist: HashSet<String>,
    method_blocklist: HashSet<String>,
}

impl SafetyPolicy {
    pub fn from_config(config: &SafetyConfig) -> Self {
        let union = |defaults: &[&str], extra: &[String]| {
            defaults
                .iter()
                .map(|&s| s.to_owned())
                .chain(extra.iter().cloned())
                .collect::<HashSet<String>>()
        };
        Self {
            mode: config.mode,
            model_allowlist: config.model_allowlist.clone(),
            write_allowlist: config.write_allowlist.clone(),
            model_blocklist: union(DEFAULT_MODEL_BLOCKLIST, &config.model_blocklist),
            field_blocklist: union(DEFAULT_FIELD_BLOCKLIST, &config.field_blocklist),
            method_blocklist: union(DEFAULT_METHOD_BLOCKLIST, &config.method_blocklist),
        }
    }

    /// Enforce the operation mode
    pub fn enforce_mode(&self, operation: Operation, model: &str) -> Result<(), SafetyError> {
        match self.mode {
            OperationMode::Readonly => {
                if operation.is_write() {
                    return Err(SafetyError::ModeViolation(format!(
                        "'{}' not allowed in readonly mode",
                        operation.as_str()
                    )));
                }
            }
            OperationMode::Restricted => match operation {
                Operation::Unlink => {
                    return Err(SafetyError::ModeViolation(
                        "delete not allowed in restricted mode".to_owned(),
                    ));
                }
                Operation::Create | Operation::Write | Operation::Execute => {
                    if !self.write_allowlist.iter().any(|m| m == model) {
                        return Err(SafetyError::ModeViolation(format!(
                            "'{}' on '{model}' not allowed in restricted mode; writable models: {}",
                            operation.as_str(),
                            self.write_allowlist.join(", ")
                        )));
                    }
                }
                Operation::Read => {}
            },
            OperationMode::Full => {}
        }
        Ok(())
    }

    /// Validate model access for an operation
    ///
    /// `res.users` is readable but write access stays blocked for safety.
    pub fn check_model(&self, model: &str, operation: Operation) -> Result<(), SafetyError> {
        if model == "res.users" {
            if operation == Operation::Read {
                return Ok(());
            }
            return Err(SafetyError::ModelBlocked(
                "write access to 'res.users' is blocked for safety; read access is allowed"
                    .to_owned(),
            ));
        }

        if self.model_blocklist.contains(model) {
            return Err(SafetyError::ModelBlocked(format!(
                "access to model '{model}' is blocked by safety configuration"
            )));
        }

        if !self.model_allowlist.is_empty() && !self.model_allowlist.iter().any(|m| m == model) {
            return Err(SafetyError::ModelBlocked(format!(
                "model '{model}' is not in the model allowlist"
            )));
        }

        Ok(())
    }

    pub fn is_model_blocked(&self, model: &str) -> bool {
        self.check_model(model, Operation::Read).is_err()
    }

    pub fn is_field_blocked(&self, field: &str) -> bool {
        self.field_blocklist.contains(field)
    }

    /// Strip blocked fields from read results
    pub fn strip_blocked_fields(&self, record: &mut Map<String, Value>) {
        record.retain(|key, _| !self.field_blocklist.contains(key));
    }

    /// Drop blocked names from a requested field list
    pub fn filter_field_names<'f>(&self, fields: &[&'f str]) -> Vec<&'f str> {
        fields
            .iter()
            .copied()
            .filter(|f| !self.field_blocklist.contains(*f))
            .collect()
    }

    /// Reject write values touching blocked fields
    pub fn check_write_fields(&self, values: &Map<String, Value>) -> Result<(), SafetyError> {
        let mut blocked: Vec<&str> = values
            .keys()
            .map(String::as_str)
            .filter(|k| self.field_blocklist.contains(*k))
            .collect();
        if blocked.is_empty() {
            return Ok(());
        }
        blocked.sort_unstable();
        Err(SafetyError::FieldBlocked(format!(
            "cannot write to blocked field(s): {}; these fields are restricted for security",
            blocked.join(", ")
        )))
    }

    /// Reject blocked methods
    pub fn check_method(&self, method: &str) -> Result<(), SafetyError> {
        if self.method_blocklist.contains(method) {
            return Err(SafetyError::MethodBlocked(format!(
                "method '{method}' is blocked by safety configuration"
            )));
        }
        Ok(())
    }

    /// Whether a tool gated on `operation` should be registered at all
    ///
    /// Hidden tools never enter the MCP tool list; calling one by name
    /// yields a protocol-level method-not-found, not a runtime reject.
    pub fn tool_visible(&self, operation: Operation) -> bool {
        match self.mode {
            OperationMode::Readonly => {
                !matches!(
                    operation,
                    Operation::Create | Operation::Write | Operation::Unlink
                )
            }
            OperationMode::Restricted => operation != Operation::Unlink,
            OperationMode::Full => true,
        }
    }

    /// Summary for the `config/safety` resource
    pub fn describe(&self) -> Value {
        let mut model_blocklist: Vec<&String> = self.model_blocklist.iter().collect();
        model_blocklist.sort();
        let mut field_blocklist: Vec<&String> = self.field_blocklist.iter().collect();
        field_blocklist.sort();
        let mut method_blocklist: Vec<&String> = self.method_blocklist.iter().collect();
        method_blocklist.sort();
        serde_json::json!({
            "mode": self.mode.as_str(),
            "model_allowlist": self.model_allowlist,
            "write_allowlist": self.write_allowlist,
            "model_blocklist": model_blocklist,
            "field_blocklist": field_blocklist,
            "method_blocklist": method_blocklist,
        })
    }
}
