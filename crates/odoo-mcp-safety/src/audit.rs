//! Audit writer
//!
//! One JSON object per line, appended by a background task fed over a
//! channel so the tool path never blocks on the filesystem. Order within a
//! session is the channel order. Secrets never appear; binary contents are
//! elided to their size.

use std::path::PathBuf;

use odoo_mcp_config::AuditConfig;
use serde_json::{Map, Value, json};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::Operation;

/// Field names that must never be logged
const SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "password_crypt",
    "passwd",
    "secret",
    "api_key",
    "api_key_ids",
    "token",
    "access_token",
    "oauth_access_token",
    "totp_secret",
    "new_password",
    "confirm_password",
];

/// One tool invocation to record
#[derive(Debug)]
pub struct AuditEntry {
    pub session_id: String,
    pub tool: String,
    pub model: String,
    pub operation: Operation,
    pub values: Option<Map<String, Value>>,
    pub result: Option<Value>,
    pub success: bool,
    pub duration_ms: u64,
    pub uid: i64,
}

/// Audit logger handle; cheap to clone
#[derive(Clone)]
pub struct AuditLogger {
    config: AuditConfig,
    tx: Option<mpsc::UnboundedSender<String>>,
}

impl AuditLogger {
    /// Create the logger and spawn its writer task when enabled
    pub fn new(config: &AuditConfig) -> Self {
        let mut tx = None;
        if config.enabled
            && let Some(file) = &config.file
        {
            let (sender, rx) = mpsc::unbounded_channel();
            tokio::spawn(writer_loop(PathBuf::from(file), rx));
            tx = Some(sender);
        }
        Self {
            config: config.clone(),
            tx,
        }
    }

    /// Disabled logger for tests and readonly deployments
    pub fn disabled() -> Self {
        Self {
            config: AuditConfig::default(),
            tx: None,
        }
    }

    /// Record one operation; returns immediately
    pub fn record(&self, entry: &AuditEntry) {
        let Some(tx) = &self.tx else { return };
        if !self.should_log(entry.operation) {
            return;
        }

        let mut line = Map::new();
        line.insert(
            "timestamp".to_owned(),
            json!(chrono::Utc::now().to_rfc3339()),
        );
        line.insert("session_id".to_owned(), json!(entry.session_id));
        line.insert("tool".to_owned(), json!(entry.tool));
        line.insert("model".to_owned(), json!(entry.model));
        line.insert("operation".to_owned(), json!(entry.operation.as_str()));
        line.insert("success".to_owned(), json!(entry.success));
        line.insert("duration_ms".to_owned(), json!(entry.duration_ms));
        line.insert("uid".to_owned(), json!(entry.uid));

        if let Some(values) = &entry.values {
            line.insert("values".to_owned(), Value::Object(sanitize_values(values)));
        }
        if let Some(result) = &entry.result {
            for (key, value) in summarize_result(result, entry.operation) {
                line.insert(key, value);
            }
        }

        match serde_json::to_string(&Value::Object(line)) {
            Ok(serialized) => {
                if tx.send(serialized).is_err() {
                    tracing::warn!("audit writer task is gone, dropping entry");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize audit entry"),
        }
    }

    fn should_log(&self, operation: Operation) -> bool {
        match operation {
            Operation::Read => self.config.log_reads,
            Operation::Create | Operation::Write | Operation::Execute => self.config.log_writes,
            Operation::Unlink => self.config.log_deletes,
        }
    }
}

async fn writer_loop(path: PathBuf, mut rx: mpsc::UnboundedReceiver<String>) {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = tokio::fs::create_dir_all(parent).await
    {
        tracing::error!(error = %e, path = %parent.display(), "cannot create audit directory");
        return;
    }

    let mut file = match tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
    {
        Ok(file) => file,
        Err(e) => {
            tracing::error!(error = %e, path = %path.display(), "cannot open audit log");
            return;
        }
    };

    while let Some(line) = rx.recv().await {
        let line = format!("{line}\n");
        if let Err(e) = file.write_all(line.as_bytes()).await {
            tracing::error!(error = %e, "audit write failed");
        }
    }
    let _ = file.flush().await;
}

/// Mask secrets and elide binary payloads
fn sanitize_values(values: &Map<String, Value>) -> Map<String, Value> {
    values
        .iter()
        .map(|(key, value)| {
            let lowered = key.to_lowercase();
            if SENSITIVE_FIELDS.iter().any(|s| lowered == *s) {
                return (key.clone(), json!("***REDACTED***"));
            }
            if let Value::String(s) = value
                && s.len() > 1000
                && looks_like_base64(s)
            {
                return (key.clone(), json!(format!("<binary-b64 {} chars>", s.len())));
            }
            (key.clone(), value.clone())
        })
        .collect()
}

/// Keep only IDs and outcomes, never record data
fn summarize_result(result: &Value, operation: Operation) -> Map<String, Value> {
    let mut out = Map::new();
    match operation {
        Operation::Create => {
            if let Some(id) = result.as_i64() {
                out.insert("result_id".to_owned(), json!(id));
            } else if let Some(ids) = result.as_array()
                && ids.iter().all(Value::is_i64)
            {
                out.insert("result_ids".to_owned(), result.clone());
            }
        }
        Operation::Read => {
            if let Some(rows) = result.as_array() {
                out.insert("result_count".to_owned(), json!(rows.len()));
                let ids: Vec<i64> = rows
                    .iter()
                    .filter_map(|row| match row {
                        Value::Object(map) => map.get("id").and_then(Value::as_i64),
                        Value::Number(n) => n.as_i64(),
                        _ => None,
                    })
                    .take(20)
                    .collect();
                if !ids.is_empty() {
                    out.insert("result_ids".to_owned(), json!(ids));
                }
            }
        }
        Operation::Write | Operation::Unlink => {
            out.insert(
                "result".to_owned(),
                json!(result.as_bool().unwrap_or(!result.is_null())),
            );
        }
        Operation::Execute => {}
    }
    out
}

fn looks_like_base64(s: &str) -> bool {
    if s.len() < 100 {
        return false;
    }
    let sample = &s.as_bytes()[..s.len().min(200)];
    let non_b64 = sample
        .iter()
        .filter(|b| !matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'+' | b'/' | b'=' | b'\n' | b'\r'))
        .count();
    non_b64 < sample.len() / 20
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_redacted() {
        let mut values = Map::new();
        values.insert("name".to_owned(), json!("Acme"));
        values.insert("password".to_owned(), json!("hunter2"));
        values.insert("api_key".to_owned(), json!("sk-123"));

        let sanitized = sanitize_values(&values);
        assert_eq!(sanitized["name"], json!("Acme"));
        assert_eq!(sanitized["password"], json!("***REDACTED***"));
        assert_eq!(sanitized["api_key"], json!("***REDACTED***"));
    }

    #[test]
    fn binary_content_elided_to_size() {
        let payload = "QUJD".repeat(500);
        let mut values = Map::new();
        values.insert("datas".to_owned(), json!(payload));
        let sanitized = sanitize_values(&values);
        let logged = sanitized["datas"].as_str().expect("string");
        assert!(logged.starts_with("<binary-b64"));
        assert!(!logged.contains("QUJD"));
    }

    #[test]
    fn read_results_keep_ids_only() {
        let result = json!([
            {"id": 1, "name": "secret customer"},
            {"id": 2, "name": "another"},
        ]);
        let summary = summarize_result(&result, Operation::Read);
        assert_eq!(summary["result_count"], json!(2));
        assert_eq!(summary["result_ids"], json!([1, 2]));
        assert!(!serde_json::to_string(&summary)
            .expect("serializes")
            .contains("secret customer"));
    }

    #[test]
    fn create_result_captures_id() {
        let summary = summarize_result(&json!(42), Operation::Create);
        assert_eq!(summary["result_id"], json!(42));
    }

    #[tokio::test]
    async fn disabled_logger_is_a_no_op() {
        let logger = AuditLogger::disabled();
        logger.record(&AuditEntry {
            session_id: "s".into(),
            tool: "odoo_core_create".into(),
            model: "res.partner".into(),
            operation: Operation::Create,
            values: None,
            result: None,
            success: true,
            duration_ms: 5,
            uid: 2,
        });
    }
}
