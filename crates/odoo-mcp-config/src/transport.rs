use serde::Deserialize;

/// MCP transport selection
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    #[serde(default)]
    pub kind: TransportKind,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Endpoint path for the streamable HTTP transport
    #[serde(default = "default_path")]
    pub path: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::default(),
            host: default_host(),
            port: default_port(),
            path: default_path(),
        }
    }
}

impl TransportConfig {
    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        if self.kind == TransportKind::Http && !self.path.starts_with('/') {
            anyhow::bail!("transport.path must start with '/', got '{}'", self.path);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Stdio,
    Sse,
    Http,
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stdio" => Ok(Self::Stdio),
            "sse" => Ok(Self::Sse),
            "http" => Ok(Self::Http),
            other => Err(format!(
                "unknown transport '{other}' (expected stdio, sse, or http)"
            )),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}
fn default_port() -> u16 {
    8374
}
fn default_path() -> String {
    "/mcp".to_owned()
}
