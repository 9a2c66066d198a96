use serde::Deserialize;

/// Search limits and deep-search tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    #[serde(default = "default_default_limit")]
    pub default_limit: u32,
    #[serde(default = "default_max_limit")]
    pub max_limit: u32,
    /// Default number of progressive search levels to run (1-5)
    #[serde(default = "default_deep_search_depth")]
    pub deep_search_depth: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_default_limit(),
            max_limit: default_max_limit(),
            deep_search_depth: default_deep_search_depth(),
        }
    }
}

/// Response display shaping
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DisplayConfig {
    /// Strip HTML fields to plain text
    #[serde(default = "default_strip_html")]
    pub strip_html: bool,
    /// Convert `[id, name]` relational values to `{id, name}` objects
    #[serde(default = "default_normalize_relational")]
    pub normalize_relational: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            strip_html: default_strip_html(),
            normalize_relational: default_normalize_relational(),
        }
    }
}

fn default_default_limit() -> u32 {
    80
}
fn default_max_limit() -> u32 {
    500
}
fn default_deep_search_depth() -> u32 {
    3
}
fn default_strip_html() -> bool {
    true
}
fn default_normalize_relational() -> bool {
    true
}
