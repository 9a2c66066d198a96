use serde::Deserialize;

/// Audit log settings (append-only JSONL)
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub log_reads: bool,
    #[serde(default = "default_log_writes")]
    pub log_writes: bool,
    #[serde(default = "default_log_deletes")]
    pub log_deletes: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            file: None,
            log_reads: false,
            log_writes: default_log_writes(),
            log_deletes: default_log_deletes(),
        }
    }
}

fn default_log_writes() -> bool {
    true
}
fn default_log_deletes() -> bool {
    true
}
