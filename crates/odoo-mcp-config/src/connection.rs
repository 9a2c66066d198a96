use secrecy::SecretString;
use serde::Deserialize;

/// Backend connection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: Option<SecretString>,
    #[serde(default)]
    pub api_key: Option<SecretString>,
    #[serde(default)]
    pub protocol: ProtocolChoice,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,
    /// Path to a CA certificate bundle (PEM)
    #[serde(default)]
    pub ca_cert: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            database: String::new(),
            username: String::new(),
            password: None,
            api_key: None,
            protocol: ProtocolChoice::default(),
            timeout: default_timeout(),
            verify_ssl: default_verify_ssl(),
            ca_cert: None,
        }
    }
}

impl ConnectionConfig {
    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        url::Url::parse(&self.url)
            .map_err(|e| anyhow::anyhow!("invalid connection.url '{}': {e}", self.url))?;

        if self.database.is_empty() {
            anyhow::bail!("connection.database is required");
        }
        if self.password.is_none() && self.api_key.is_none() {
            anyhow::bail!("one of connection.password or connection.api_key is required");
        }
        if self.protocol == ProtocolChoice::Json2 && self.api_key.is_none() {
            anyhow::bail!("connection.protocol=json2 requires connection.api_key");
        }
        Ok(())
    }
}

/// Protocol selection: auto picks from the detected backend version
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolChoice {
    #[default]
    Auto,
    Xmlrpc,
    Jsonrpc,
    Json2,
}

impl std::str::FromStr for ProtocolChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "xmlrpc" | "legacy-xml" => Ok(Self::Xmlrpc),
            "jsonrpc" | "legacy-json" => Ok(Self::Jsonrpc),
            "json2" | "modern-rest" => Ok(Self::Json2),
            other => Err(format!(
                "unknown protocol '{other}' (expected auto, xmlrpc, jsonrpc, or json2)"
            )),
        }
    }
}

fn default_url() -> String {
    "http://localhost:8069".to_owned()
}
fn default_timeout() -> u64 {
    30
}
fn default_verify_ssl() -> bool {
    true
}
