use serde::Deserialize;

/// Model registry construction settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    /// Path to a previously generated static registry JSON file
    #[serde(default)]
    pub static_path: Option<String>,
    #[serde(default = "default_introspect_on_startup")]
    pub introspect_on_startup: bool,
    /// Models to introspect; empty means the built-in default list
    #[serde(default)]
    pub introspect_models: Vec<String>,
    /// Wall-clock budget in seconds for the whole introspection pass
    #[serde(default = "default_introspect_timeout")]
    pub introspect_timeout: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            static_path: None,
            introspect_on_startup: default_introspect_on_startup(),
            introspect_models: Vec::new(),
            introspect_timeout: default_introspect_timeout(),
        }
    }
}

fn default_introspect_on_startup() -> bool {
    true
}
fn default_introspect_timeout() -> u64 {
    60
}
