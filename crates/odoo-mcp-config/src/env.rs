//! Environment variable overlay
//!
//! Every recognized option can be set as `ODOO_MCP_<SECTION>_<KEY>`.
//! List options accept comma-separated strings; booleans accept
//! `true/1/yes` and `false/0/no`.

use std::str::FromStr;

use secrecy::SecretString;

use crate::OdooMcpConfig;

pub(crate) fn apply_env_overrides(config: &mut OdooMcpConfig) -> anyhow::Result<()> {
    // connection
    set_string("ODOO_MCP_CONNECTION_URL", &mut config.connection.url);
    set_string(
        "ODOO_MCP_CONNECTION_DATABASE",
        &mut config.connection.database,
    );
    set_string(
        "ODOO_MCP_CONNECTION_USERNAME",
        &mut config.connection.username,
    );
    set_secret(
        "ODOO_MCP_CONNECTION_PASSWORD",
        &mut config.connection.password,
    );
    set_secret("ODOO_MCP_CONNECTION_API_KEY", &mut config.connection.api_key);
    set_parsed(
        "ODOO_MCP_CONNECTION_PROTOCOL",
        &mut config.connection.protocol,
    )?;
    set_number("ODOO_MCP_CONNECTION_TIMEOUT", &mut config.connection.timeout)?;
    set_bool(
        "ODOO_MCP_CONNECTION_VERIFY_SSL",
        &mut config.connection.verify_ssl,
    )?;
    set_opt_string("ODOO_MCP_CONNECTION_CA_CERT", &mut config.connection.ca_cert);

    // transport
    set_parsed("ODOO_MCP_TRANSPORT_KIND", &mut config.transport.kind)?;
    set_string("ODOO_MCP_TRANSPORT_HOST", &mut config.transport.host);
    set_number("ODOO_MCP_TRANSPORT_PORT", &mut config.transport.port)?;
    set_string("ODOO_MCP_TRANSPORT_PATH", &mut config.transport.path);

    // safety
    set_parsed("ODOO_MCP_SAFETY_MODE", &mut config.safety.mode)?;
    set_list(
        "ODOO_MCP_SAFETY_MODEL_ALLOWLIST",
        &mut config.safety.model_allowlist,
    );
    set_list(
        "ODOO_MCP_SAFETY_MODEL_BLOCKLIST",
        &mut config.safety.model_blocklist,
    );
    set_list(
        "ODOO_MCP_SAFETY_WRITE_ALLOWLIST",
        &mut config.safety.write_allowlist,
    );
    set_list(
        "ODOO_MCP_SAFETY_FIELD_BLOCKLIST",
        &mut config.safety.field_blocklist,
    );
    set_list(
        "ODOO_MCP_SAFETY_METHOD_BLOCKLIST",
        &mut config.safety.method_blocklist,
    );

    // toolsets
    set_list("ODOO_MCP_TOOLSETS_ENABLED", &mut config.toolsets.enabled);
    set_list("ODOO_MCP_TOOLSETS_DISABLED", &mut config.toolsets.disabled);

    // registry
    set_opt_string(
        "ODOO_MCP_REGISTRY_STATIC_PATH",
        &mut config.registry.static_path,
    );
    set_bool(
        "ODOO_MCP_REGISTRY_INTROSPECT_ON_STARTUP",
        &mut config.registry.introspect_on_startup,
    )?;
    set_list(
        "ODOO_MCP_REGISTRY_INTROSPECT_MODELS",
        &mut config.registry.introspect_models,
    );
    set_number(
        "ODOO_MCP_REGISTRY_INTROSPECT_TIMEOUT",
        &mut config.registry.introspect_timeout,
    )?;

    // rate limit
    set_bool("ODOO_MCP_RATE_LIMIT_ENABLED", &mut config.rate_limit.enabled)?;
    set_number(
        "ODOO_MCP_RATE_LIMIT_CALLS_PER_MINUTE",
        &mut config.rate_limit.calls_per_minute,
    )?;
    set_number(
        "ODOO_MCP_RATE_LIMIT_CALLS_PER_HOUR",
        &mut config.rate_limit.calls_per_hour,
    )?;
    set_number("ODOO_MCP_RATE_LIMIT_BURST", &mut config.rate_limit.burst)?;
    set_number(
        "ODOO_MCP_RATE_LIMIT_READ_CALLS_PER_MINUTE",
        &mut config.rate_limit.read_calls_per_minute,
    )?;
    set_number(
        "ODOO_MCP_RATE_LIMIT_WRITE_CALLS_PER_MINUTE",
        &mut config.rate_limit.write_calls_per_minute,
    )?;

    // audit
    set_bool("ODOO_MCP_AUDIT_ENABLED", &mut config.audit.enabled)?;
    set_opt_string("ODOO_MCP_AUDIT_FILE", &mut config.audit.file);
    set_bool("ODOO_MCP_AUDIT_LOG_READS", &mut config.audit.log_reads)?;
    set_bool("ODOO_MCP_AUDIT_LOG_WRITES", &mut config.audit.log_writes)?;
    set_bool("ODOO_MCP_AUDIT_LOG_DELETES", &mut config.audit.log_deletes)?;

    // backend context
    set_string("ODOO_MCP_CONTEXT_LANG", &mut config.context.lang);
    set_string("ODOO_MCP_CONTEXT_TZ", &mut config.context.tz);
    if let Some(raw) = read("ODOO_MCP_CONTEXT_COMPANY_ID") {
        config.context.company_id = Some(parse_number(&raw, "ODOO_MCP_CONTEXT_COMPANY_ID")?);
    }
    if let Some(raw) = read("ODOO_MCP_CONTEXT_COMPANY_IDS") {
        config.context.company_ids = raw
            .split(',')
            .map(|s| parse_number(s.trim(), "ODOO_MCP_CONTEXT_COMPANY_IDS"))
            .collect::<anyhow::Result<_>>()?;
    }

    // search / display
    set_number(
        "ODOO_MCP_SEARCH_DEFAULT_LIMIT",
        &mut config.search.default_limit,
    )?;
    set_number("ODOO_MCP_SEARCH_MAX_LIMIT", &mut config.search.max_limit)?;
    set_number(
        "ODOO_MCP_SEARCH_DEEP_SEARCH_DEPTH",
        &mut config.search.deep_search_depth,
    )?;
    set_bool("ODOO_MCP_DISPLAY_STRIP_HTML", &mut config.display.strip_html)?;
    set_bool(
        "ODOO_MCP_DISPLAY_NORMALIZE_RELATIONAL",
        &mut config.display.normalize_relational,
    )?;

    // logging / health
    set_string("ODOO_MCP_LOGGING_LEVEL", &mut config.logging.level);
    set_number(
        "ODOO_MCP_HEALTH_CHECK_INTERVAL",
        &mut config.health.check_interval,
    )?;
    set_number(
        "ODOO_MCP_HEALTH_RECONNECT_MAX_ATTEMPTS",
        &mut config.health.reconnect_max_attempts,
    )?;
    set_number(
        "ODOO_MCP_HEALTH_BACKOFF_BASE",
        &mut config.health.backoff_base,
    )?;

    Ok(())
}

fn read(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn set_string(name: &str, target: &mut String) {
    if let Some(v) = read(name) {
        *target = v;
    }
}

fn set_opt_string(name: &str, target: &mut Option<String>) {
    if let Some(v) = read(name) {
        *target = Some(v);
    }
}

fn set_secret(name: &str, target: &mut Option<SecretString>) {
    if let Some(v) = read(name) {
        *target = Some(SecretString::from(v));
    }
}

fn set_list(name: &str, target: &mut Vec<String>) {
    if let Some(v) = read(name) {
        *target = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
    }
}

fn set_bool(name: &str, target: &mut bool) -> anyhow::Result<()> {
    if let Some(v) = read(name) {
        *target = parse_bool(&v)
            .ok_or_else(|| anyhow::anyhow!("{name}: expected true/1/yes or false/0/no, got '{v}'"))?;
    }
    Ok(())
}

fn set_number<T: FromStr>(name: &str, target: &mut T) -> anyhow::Result<()>
where
    T::Err: std::fmt::Display,
{
    if let Some(v) = read(name) {
        *target = parse_number(&v, name)?;
    }
    Ok(())
}

fn set_parsed<T: FromStr<Err = String>>(name: &str, target: &mut T) -> anyhow::Result<()> {
    if let Some(v) = read(name) {
        *target = v.parse().map_err(|e| anyhow::anyhow!("{name}: {e}"))?;
    }
    Ok(())
}

fn parse_number<T: FromStr>(raw: &str, name: &str) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| anyhow::anyhow!("{name}: invalid number '{raw}': {e}"))
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_forms() {
        for v in ["true", "1", "yes", "YES"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["false", "0", "no", "No"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }
}
