use serde::Deserialize;

/// Per-session rate limit budgets
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_calls_per_minute")]
    pub calls_per_minute: u32,
    #[serde(default = "default_calls_per_hour")]
    pub calls_per_hour: u32,
    /// Calls allowed in a one-second burst
    #[serde(default = "default_burst")]
    pub burst: u32,
    #[serde(default = "default_read_calls_per_minute")]
    pub read_calls_per_minute: u32,
    #[serde(default = "default_write_calls_per_minute")]
    pub write_calls_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            calls_per_minute: default_calls_per_minute(),
            calls_per_hour: default_calls_per_hour(),
            burst: default_burst(),
            read_calls_per_minute: default_read_calls_per_minute(),
            write_calls_per_minute: default_write_calls_per_minute(),
        }
    }
}

fn default_calls_per_minute() -> u32 {
    60
}
fn default_calls_per_hour() -> u32 {
    1000
}
fn default_burst() -> u32 {
    10
}
fn default_read_calls_per_minute() -> u32 {
    120
}
fn default_write_calls_per_minute() -> u32 {
    30
}
