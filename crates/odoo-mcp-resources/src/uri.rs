//! `odoo://` URI parsing
//!
//! Grammar: `odoo://{category}/{path}` with categories `system`, `config`,
//! `model`, and `record`. Record listings accept a URL-encoded JSON domain
//! and a limit query parameter.

use serde_json::Value;
use thiserror::Error;

pub const MAX_LIMIT: u32 = 100;
pub const DEFAULT_LIMIT: u32 = 20;

const SCHEME: &str = "odoo://";

#[derive(Debug, Error)]
#[error("{0}")]
pub struct UriError(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UriCategory {
    System,
    Config,
    Model,
    Record,
}

impl UriCategory {
    fn parse(raw: &str) -> Result<Self, UriError> {
        match raw {
            "system" => Ok(Self::System),
            "config" => Ok(Self::Config),
            "model" => Ok(Self::Model),
            "record" => Ok(Self::Record),
            other => Err(UriError(format!(
                "invalid category '{other}', must be one of: system, config, model, record"
            ))),
        }
    }
}

/// Parsed representation of an `odoo://` URI
#[derive(Debug, Clone)]
pub struct OdooUri {
    pub category: UriCategory,
    pub path_segments: Vec<String>,
    pub domain: Option<Value>,
    pub limit: u32,
    pub raw: String,
}

impl OdooUri {
    /// Model name for model/record URIs
    pub fn model_name(&self) -> Option<&str> {
        match self.category {
            UriCategory::Model | UriCategory::Record => {
                self.path_segments.first().map(String::as_str)
            }
            _ => None,
        }
    }

    /// Record ID for single-record URIs
    pub fn record_id(&self) -> Option<i64> {
        if self.category != UriCategory::Record {
            return None;
        }
        self.path_segments.get(1)?.parse().ok()
    }

    /// Sub-resource type (`fields`, `methods`, `states`, `info`, ...)
    pub fn resource_type(&self) -> Option<&str> {
        let index = match self.category {
            UriCategory::Model => 1,
            UriCategory::System | UriCategory::Config => 0,
            UriCategory::Record => return None,
        };
        self.path_segments.get(index).map(String::as_str)
    }
}

/// Parse an `odoo://` URI string
pub fn parse_odoo_uri(uri: &str) -> Result<OdooUri, UriError> {
    let Some(rest) = uri.strip_prefix(SCHEME) else {
        return Err(UriError(format!(
            "URI must start with '{SCHEME}', got: {uri}"
        )));
    };

    let (path_part, query) = match rest.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (rest, None),
    };

    let mut segments: Vec<String> = path_part
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect();
    if segments.is_empty() {
        return Err(UriError(format!("URI has no category: {uri}")));
    }

    let category = UriCategory::parse(&segments.remove(0))?;

    match category {
        UriCategory::System if segments.is_empty() => {
            return Err(UriError(format!("system URI requires a resource type: {uri}")));
        }
        UriCategory::Config if segments.is_empty() => {
            return Err(UriError(format!("config URI requires a resource type: {uri}")));
        }
        UriCategory::Model if segments.len() < 2 => {
            return Err(UriError(format!(
                "model URI requires a model name and resource type: {uri}"
            )));
        }
        UriCategory::Record if segments.is_empty() => {
            return Err(UriError(format!("record URI requires a model name: {uri}")));
        }
        _ => {}
    }

    let mut domain = None;
    let mut limit = DEFAULT_LIMIT;
    if let Some(query) = query {
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                "domain" => {
                    let decoded = urlencoding::decode(value)
                        .map_err(|e| UriError(format!("invalid domain encoding: {e}")))?;
                    let parsed: Value = serde_json::from_str(&decoded)
                        .map_err(|e| UriError(format!("invalid JSON in domain parameter: {e}")))?;
                    domain = Some(parsed);
                }
                "limit" => {
                    let parsed: u32 = value
                        .parse()
                        .map_err(|e| UriError(format!("invalid limit parameter: {e}")))?;
                    limit = parsed.clamp(1, MAX_LIMIT);
                }
                _ => {}
            }
        }
    }

    Ok(OdooUri {
        category,
        path_segments: segments,
        domain,
        limit,
        raw: uri.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn system_and_config_uris() {
        let uri = parse_odoo_uri("odoo://system/info").expect("parses");
        assert_eq!(uri.category, UriCategory::System);
        assert_eq!(uri.resource_type(), Some("info"));
        assert!(uri.model_name().is_none());

        let uri = parse_odoo_uri("odoo://config/safety").expect("parses");
        assert_eq!(uri.category, UriCategory::Config);
        assert_eq!(uri.resource_type(), Some("safety"));
    }

    #[test]
    fn model_uris() {
        let uri = parse_odoo_uri("odoo://model/sale.order/fields").expect("parses");
        assert_eq!(uri.category, UriCategory::Model);
        assert_eq!(uri.model_name(), Some("sale.order"));
        assert_eq!(uri.resource_type(), Some("fields"));
    }

    #[test]
    fn single_record_uri() {
        let uri = parse_odoo_uri("odoo://record/res.partner/42").expect("parses");
        assert_eq!(uri.category, UriCategory::Record);
        assert_eq!(uri.model_name(), Some("res.partner"));
        assert_eq!(uri.record_id(), Some(42));
    }

    #[test]
    fn record_listing_with_domain_and_limit() {
        let domain = urlencoding::encode(r#"[["is_company","=",true]]"#).into_owned();
        let uri = parse_odoo_uri(&format!("odoo://record/res.partner?domain={domain}&limit=10"))
            .expect("parses");
        assert_eq!(uri.record_id(), None);
        assert_eq!(uri.limit, 10);
        assert_eq!(uri.domain, Some(json!([["is_company", "=", true]])));
    }

    #[test]
    fn limit_is_capped_and_defaulted() {
        let uri = parse_odoo_uri("odoo://record/res.partner?limit=9999").expect("parses");
        assert_eq!(uri.limit, MAX_LIMIT);
        let uri = parse_odoo_uri("odoo://record/res.partner").expect("parses");
        assert_eq!(uri.limit, DEFAULT_LIMIT);
    }

    #[test]
    fn malformed_uris_rejected() {
        assert!(parse_odoo_uri("http://example.com").is_err());
        assert!(parse_odoo_uri("odoo://").is_err());
        assert!(parse_odoo_uri("odoo://bogus/info").is_err());
        assert!(parse_odoo_uri("odoo://system").is_err());
        assert!(parse_odoo_uri("odoo://model/sale.order").is_err());
        assert!(parse_odoo_uri("odoo://record").is_err());
        assert!(parse_odoo_uri("odoo://record/res.partner?domain=notjson").is_err());
    }
}
