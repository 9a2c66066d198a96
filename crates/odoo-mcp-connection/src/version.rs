//! Multi-probe backend version detection
//!
//! Three probes in order, each bounded by the connection timeout: the
//! unauthenticated XML-RPC `version()` call, a JSON-RPC authenticate, and a
//! scrape of the login page. When everything fails the bridge assumes 14.0
//! and the legacy-XML protocol, with a warning.

use std::sync::OnceLock;

use odoo_mcp_core::{Edition, OdooVersion};
use regex::Regex;
use serde_json::{Value, json};

use crate::adapter::OdooAdapter;
use crate::jsonrpc::build_client;
use crate::xmlrpc::XmlRpcAdapter;

/// Parse any version self-description the backend may produce
///
/// Accepts the tuple form `[major, minor, micro, level, serial]` as well as
/// the string grammar (`N.N`, `N.N-datestamp`, `N.Ne`, `saas-N.N`,
/// `saas~N.N`).
pub fn parse_version_value(info: &Value) -> Option<OdooVersion> {
    match info {
        Value::Array(parts) if !parts.is_empty() => {
            let number = |i: usize| {
                parts
                    .get(i)
                    .and_then(Value::as_u64)
                    .and_then(|v| u32::try_from(v).ok())
                    .unwrap_or(0)
            };
            let full_string = parts
                .iter()
                .take(3)
                .map(|p| match p {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(".");
            Some(OdooVersion {
                major: number(0),
                minor: number(1),
                micro: number(2),
                level: parts
                    .get(3)
                    .and_then(Value::as_str)
                    .unwrap_or("final")
                    .to_owned(),
                serial: number(4),
                full_string,
                edition: Edition::Unknown,
            })
        }
        Value::String(s) => parse_version_str(s),
        _ => None,
    }
}

/// Parse the string grammar
pub fn parse_version_str(raw: &str) -> Option<OdooVersion> {
    let cleaned = raw.trim().replace("saas~", "saas-");
    let is_saas = cleaned.starts_with("saas-");
    let is_enterprise = cleaned.ends_with('e');

    let mut cleaned = cleaned.trim_end_matches('e').to_owned();
    if is_saas {
        cleaned = cleaned["saas-".len()..].to_owned();
    } else if let Some((head, _datestamp)) = cleaned.split_once('-') {
        cleaned = head.to_owned();
    }

    let mut parts = cleaned.split('.');
    let major: u32 = parts.next()?.parse().ok()?;
    let minor: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);

    Some(OdooVersion {
        major,
        minor,
        micro: 0,
        level: if is_saas { "saas" } else { "final" }.to_owned(),
        serial: 0,
        full_string: raw.to_owned(),
        edition: if is_enterprise {
            Edition::Enterprise
        } else {
            Edition::Community
        },
    })
}

/// Probe 1: unauthenticated XML-RPC `version()`
async fn probe_xmlrpc(url: &str, timeout: u64, verify_ssl: bool, ca_cert: Option<&str>) -> Option<OdooVersion> {
    let adapter = XmlRpcAdapter::new(url, timeout, verify_ssl, ca_cert.map(str::to_owned));
    let info = match adapter.version_info().await {
        Ok(info) => info,
        Err(e) => {
            tracing::debug!(error = %e, "XML-RPC version probe failed");
            return None;
        }
    };
    adapter.close().await;
    version_from_info(&info)
}

/// Probe 2: JSON-RPC authenticate, reading `server_version` from the result
async fn probe_jsonrpc(
    url: &str,
    db: &str,
    login: &str,
    credential: &str,
    timeout: u64,
    verify_ssl: bool,
    ca_cert: Option<&str>,
) -> Option<OdooVersion> {
    let client = build_client(timeout, verify_ssl, ca_cert, false).ok()?;
    let payload = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "call",
        "params": {"db": db, "login": login, "password": credential},
    });
    let response = client
        .post(format!("{}/web/session/authenticate", url.trim_end_matches('/')))
        .json(&payload)
        .send()
        .await
        .ok()?;
    let data: Value = response.json().await.ok()?;
    let result = data.get("result")?;
    version_from_info(result)
}

/// Probe 3: scrape the login page for a generator meta tag or asset URLs
async fn probe_http(url: &str, timeout: u64, verify_ssl: bool, ca_cert: Option<&str>) -> Option<OdooVersion> {
    static GENERATOR_RE: OnceLock<Regex> = OnceLock::new();
    static ASSETS_RE: OnceLock<Regex> = OnceLock::new();

    let client = build_client(timeout, verify_ssl, ca_cert, false).ok()?;
    let body = client
        .get(format!("{}/web/login", url.trim_end_matches('/')))
        .send()
        .await
        .ok()?
        .text()
        .await
        .ok()?;

    let generator =
        GENERATOR_RE.get_or_init(|| Regex::new(r#"content="Odoo\s+(\d+)""#).expect("valid regex"));
    if let Some(caps) = generator.captures(&body) {
        return parse_version_str(&format!("{}.0", &caps[1]));
    }

    let assets =
        ASSETS_RE.get_or_init(|| Regex::new(r"/web/assets/(\d+\.\d+)").expect("valid regex"));
    if let Some(caps) = assets.captures(&body) {
        return parse_version_str(&caps[1]);
    }
    None
}

fn version_from_info(info: &Value) -> Option<OdooVersion> {
    if let Some(tuple) = info.get("server_version_info")
        && let Some(version) = parse_version_value(tuple)
    {
        // The tuple has no edition marker; the string form does
        if let Some(raw) = info.get("server_version").and_then(Value::as_str) {
            let mut version = version;
            version.full_string = raw.to_owned();
            if raw.trim_end().ends_with('e') {
                version.edition = Edition::Enterprise;
            }
            return Some(version);
        }
        return Some(version);
    }
    info.get("server_version")
        .and_then(Value::as_str)
        .and_then(parse_version_str)
}

/// Run the probes in order and return the best version info
pub async fn detect_version(
    url: &str,
    db: &str,
    login: &str,
    credential: &str,
    timeout: u64,
    verify_ssl: bool,
    ca_cert: Option<&str>,
) -> OdooVersion {
    if let Some(version) = probe_xmlrpc(url, timeout, verify_ssl, ca_cert).await {
        return version;
    }

    if !db.is_empty()
        && !login.is_empty()
        && let Some(version) =
            probe_jsonrpc(url, db, login, credential, timeout, verify_ssl, ca_cert).await
    {
        return version;
    }

    if let Some(version) = probe_http(url, timeout, verify_ssl, ca_cert).await {
        return version;
    }

    tracing::warn!("could not detect Odoo version, assuming 14.0 with the XML-RPC protocol");
    OdooVersion::fallback()
}

/// Detect community vs enterprise once connected
///
/// The session-info flag wins when present; otherwise probe for the
/// `web_enterprise` module.
pub(crate) async fn detect_edition(
    adapter: &dyn OdooAdapter,
    session_is_enterprise: Option<bool>,
) -> Edition {
    if session_is_enterprise == Some(true) {
        return Edition::Enterprise;
    }

    let domain = json!([["name", "=", "web_enterprise"], ["state", "=", "installed"]]);
    match adapter
        .search_read("ir.module.module", domain, &["name"], Some(1), 0, None)
        .await
    {
        Ok(rows) if !rows.is_empty() => Edition::Enterprise,
        Ok(_) => Edition::Community,
        Err(e) => {
            tracing::warn!(error = %e, "edition probe failed, assuming community");
            Edition::Community
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect(raw: &str) -> OdooVersion {
        parse_version_str(raw).unwrap_or_else(|| panic!("'{raw}' should parse"))
    }

    #[test]
    fn plain_versions() {
        let v = expect("17.0");
        assert_eq!((v.major, v.minor), (17, 0));
        assert_eq!(v.edition, Edition::Community);
        assert_eq!(v.full_string, "17.0");
    }

    #[test]
    fn datestamped_version() {
        let v = expect("17.0-20240101");
        assert_eq!((v.major, v.minor), (17, 0));
        assert_eq!(v.full_string, "17.0-20240101");
    }

    #[test]
    fn enterprise_suffix_round_trips() {
        let v = expect("16.0e");
        assert_eq!((v.major, v.minor), (16, 0));
        assert_eq!(v.edition, Edition::Enterprise);
        assert_eq!(v.full_string, "16.0e");
    }

    #[test]
    fn saas_forms() {
        for raw in ["saas-17.4", "saas~17.4"] {
            let v = expect(raw);
            assert_eq!((v.major, v.minor), (17, 4));
            assert_eq!(v.level, "saas");
            assert_eq!(v.to_string(), "saas-17.4");
        }
    }

    #[test]
    fn tuple_form() {
        let v = parse_version_value(&json!([18, 0, 0, "final", 0])).expect("parses");
        assert_eq!((v.major, v.minor, v.micro), (18, 0, 0));
        assert_eq!(v.level, "final");
    }

    #[test]
    fn parse_then_format_preserves_major_minor() {
        for raw in ["14.0", "16.3", "18.0-20250101", "19.0e", "saas~17.2"] {
            let v = expect(raw);
            let formatted = v.to_string();
            let reparsed = expect(&formatted);
            assert_eq!(reparsed.major, v.major, "{raw}");
            assert_eq!(reparsed.minor, v.minor, "{raw}");
        }
    }

    #[test]
    fn garbage_does_not_parse() {
        assert!(parse_version_str("not-a-version").is_none());
        assert!(parse_version_value(&json!({"x": 1})).is_none());
    }

    #[test]
    fn version_info_string_edition_marker() {
        let info = json!({
            "server_version": "17.0e",
            "server_version_info": [17, 0, 0, "final", 0],
        });
        let v = version_from_info(&info).expect("parses");
        assert_eq!(v.major, 17);
        assert_eq!(v.edition, Edition::Enterprise);
        assert_eq!(v.full_string, "17.0e");
    }
}
