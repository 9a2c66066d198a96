use std::path::Path;

use crate::OdooMcpConfig;
use crate::env::apply_env_overrides;

impl OdooMcpConfig {
    /// Load configuration from an optional JSON file, then overlay
    /// `ODOO_MCP_*` environment variables
    ///
    /// CLI overrides are applied by the binary after this returns;
    /// [`OdooMcpConfig::validate`] runs last, once every layer has merged.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read, is not valid JSON, or
    /// an environment variable fails to parse.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    anyhow::anyhow!("failed to read config file {}: {e}", path.display())
                })?;
                serde_json::from_str(&raw).map_err(|e| {
                    anyhow::anyhow!("failed to parse config file {}: {e}", path.display())
                })?
            }
            None => Self::default(),
        };

        apply_env_overrides(&mut config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OperationMode, ProtocolChoice, TransportKind};

    #[test]
    fn defaults_without_file() {
        let config = OdooMcpConfig::default();
        assert_eq!(config.connection.url, "http://localhost:8069");
        assert_eq!(config.connection.timeout, 30);
        assert_eq!(config.connection.protocol, ProtocolChoice::Auto);
        assert_eq!(config.transport.kind, TransportKind::Stdio);
        assert_eq!(config.safety.mode, OperationMode::Readonly);
        assert_eq!(config.search.max_limit, 500);
        assert_eq!(config.health.check_interval, 300);
        assert_eq!(config.registry.introspect_timeout, 60);
    }

    #[test]
    fn json_file_sections_parse() {
        let raw = r#"{
            "connection": {
                "url": "https://erp.example.com",
                "database": "prod",
                "username": "svc",
                "api_key": "k3y",
                "protocol": "jsonrpc",
                "verify_ssl": false
            },
            "safety": {"mode": "restricted", "write_allowlist": ["sale.order"]},
            "transport": {"kind": "sse", "port": 9000},
            "rate_limit": {"enabled": true, "burst": 5}
        }"#;
        let config: OdooMcpConfig = serde_json::from_str(raw).expect("valid config");
        assert_eq!(config.connection.url, "https://erp.example.com");
        assert_eq!(config.connection.protocol, ProtocolChoice::Jsonrpc);
        assert!(!config.connection.verify_ssl);
        assert_eq!(config.safety.mode, OperationMode::Restricted);
        assert_eq!(config.safety.write_allowlist, vec!["sale.order"]);
        assert_eq!(config.transport.kind, TransportKind::Sse);
        assert_eq!(config.transport.port, 9000);
        assert!(config.rate_limit.enabled);
        assert_eq!(config.rate_limit.burst, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_keys_rejected() {
        let raw = r#"{"connection": {"not_a_key": 1}}"#;
        assert!(serde_json::from_str::<OdooMcpConfig>(raw).is_err());
    }

    #[test]
    fn missing_database_fails_validation() {
        let raw = r#"{"connection": {"url": "http://x:8069", "password": "p"}}"#;
        let config: OdooMcpConfig = serde_json::from_str(raw).expect("valid config");
        assert!(config.validate().is_err());
    }
}
