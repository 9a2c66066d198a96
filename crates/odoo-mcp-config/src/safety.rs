use serde::Deserialize;

/// Safety gate configuration
///
/// The lists here are user additions; the safety crate unions the model,
/// field, and method blocklists with its built-in defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SafetyConfig {
    #[serde(default)]
    pub mode: OperationMode,
    #[serde(default)]
    pub model_allowlist: Vec<String>,
    #[serde(default)]
    pub model_blocklist: Vec<String>,
    /// Models writable in restricted mode
    #[serde(default)]
    pub write_allowlist: Vec<String>,
    #[serde(default)]
    pub field_blocklist: Vec<String>,
    #[serde(default)]
    pub method_blocklist: Vec<String>,
}

impl SafetyConfig {
    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        if !self.model_allowlist.is_empty() && !self.model_blocklist.is_empty() {
            anyhow::bail!("safety.model_allowlist and safety.model_blocklist cannot both be set");
        }
        if !self.model_allowlist.is_empty() {
            let outside: Vec<&str> = self
                .write_allowlist
                .iter()
                .filter(|m| !self.model_allowlist.contains(m))
                .map(String::as_str)
                .collect();
            if !outside.is_empty() {
                anyhow::bail!(
                    "safety.write_allowlist entries not in model_allowlist: {}",
                    outside.join(", ")
                );
            }
        }
        Ok(())
    }
}

/// Server operation mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    #[default]
    Readonly,
    Restricted,
    Full,
}

impl OperationMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Readonly => "readonly",
            Self::Restricted => "restricted",
            Self::Full => "full",
        }
    }
}

impl std::str::FromStr for OperationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "readonly" => Ok(Self::Readonly),
            "restricted" => Ok(Self::Restricted),
            "full" => Ok(Self::Full),
            other => Err(format!(
                "unknown mode '{other}' (expected readonly, restricted, or full)"
            )),
        }
    }
}

impl std::fmt::Display for OperationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
