//! Configuration for the Odoo MCP bridge
//!
//! Options resolve with priority CLI > environment > JSON config file >
//! defaults. The binary applies CLI overrides after [`OdooMcpConfig::load`]
//! has merged file and environment.

mod audit;
mod connection;
mod env;
mod loader;
mod rate_limit;
mod registry;
mod safety;
mod search;
mod transport;

pub use audit::AuditConfig;
pub use connection::{ConnectionConfig, ProtocolChoice};
pub use rate_limit::RateLimitConfig;
pub use registry::RegistryConfig;
pub use safety::{OperationMode, SafetyConfig};
pub use search::{DisplayConfig, SearchConfig};
pub use transport::{TransportConfig, TransportKind};

use serde::Deserialize;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OdooMcpConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub toolsets: ToolsetFilterConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub context: BackendContextConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

/// Enable/disable filters for toolset registration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsetFilterConfig {
    /// When non-empty, only these toolsets register
    #[serde(default)]
    pub enabled: Vec<String>,
    /// Toolsets that never register
    #[serde(default)]
    pub disabled: Vec<String>,
}

/// Base context merged into every backend call
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendContextConfig {
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default = "default_tz")]
    pub tz: String,
    #[serde(default)]
    pub company_id: Option<i64>,
    #[serde(default)]
    pub company_ids: Vec<i64>,
}

impl Default for BackendContextConfig {
    fn default() -> Self {
        Self {
            lang: default_lang(),
            tz: default_tz(),
            company_id: None,
            company_ids: Vec::new(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Tracing filter directive (e.g. `info`, `odoo_mcp=debug`)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Health check and reconnection tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthConfig {
    /// Inactivity window in seconds before the next operation re-verifies
    /// the connection
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,
    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,
    /// Base backoff delay in seconds, doubled per attempt
    #[serde(default = "default_backoff_base")]
    pub backoff_base: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            reconnect_max_attempts: default_reconnect_max_attempts(),
            backoff_base: default_backoff_base(),
        }
    }
}

impl OdooMcpConfig {
    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error when required connection settings are missing or the
    /// safety lists violate their invariants. Validation failures are fatal
    /// at startup.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.connection.validate()?;
        self.safety.validate()?;
        self.transport.validate()?;

        if self.rate_limit.enabled && self.rate_limit.burst == 0 {
            anyhow::bail!("rate_limit.burst must be greater than 0 when rate limiting is enabled");
        }
        if self.audit.enabled && self.audit.file.is_none() {
            anyhow::bail!("audit.file must be set when audit logging is enabled");
        }

        Ok(())
    }
}

fn default_lang() -> String {
    "en_US".to_owned()
}
fn default_tz() -> String {
    "UTC".to_owned()
}
fn default_log_level() -> String {
    "info".to_owned()
}
fn default_check_interval() -> u64 {
    300
}
fn default_reconnect_max_attempts() -> u32 {
    3
}
fn default_backoff_base() -> u64 {
    1
}
