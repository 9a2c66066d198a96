//! JSON-2 adapter (Odoo 19+)
//!
//! Bearer-token calls to `/json/2/{model}/{method}`. The endpoint takes
//! named parameters in the body and record IDs in the URL path, so the
//! `execute_kw` calling convention (positional args + kwargs) is translated
//! here. The token is stateless; expiry is just HTTP 401 and a retry with
//! the same token re-establishes nothing.

use async_trait::async_trait;
use odoo_mcp_core::{OdooError, RpcFault, WireProtocol};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value, json};

use crate::adapter::{OdooAdapter, merged_context};
use crate::jsonrpc::build_client;

/// Positional parameter names for common methods
const METHOD_ARG_NAMES: &[(&str, &[&str])] = &[
    ("search", &["domain"]),
    ("search_read", &["domain"]),
    ("search_count", &["domain"]),
    ("search_fetch", &["domain", "field_names"]),
    ("read_group", &["domain", "fields", "groupby"]),
    ("create", &["vals_list"]),
    ("name_search", &["name"]),
    ("name_create", &["name"]),
    ("default_get", &["fields_list"]),
    ("onchange", &["values", "field_name", "field_onchange"]),
];

/// Remaining positional names for recordset methods after the leading ID
/// list moves into the URL
const RECORDSET_ARG_NAMES: &[(&str, &[&str])] = &[("write", &["vals"])];

pub struct Json2Adapter {
    base_url: String,
    client: reqwest::Client,
    api_key: SecretString,
    base_context: Map<String, Value>,
    uid: std::sync::Mutex<Option<i64>>,
}

impl Json2Adapter {
    pub fn new(
        url: &str,
        api_key: SecretString,
        timeout: u64,
        verify_ssl: bool,
        ca_cert: Option<&str>,
    ) -> Result<Self, OdooError> {
        let client = build_client(timeout, verify_ssl, ca_cert, false)?;
        Ok(Self {
            base_url: url.trim_end_matches('/').to_owned(),
            client,
            api_key,
            base_context: Map::new(),
            uid: std::sync::Mutex::new(None),
        })
    }
}

fn is_id_list(value: &Value) -> bool {
    match value {
        Value::Array(items) => !items.is_empty() && items.iter().all(Value::is_i64),
        _ => false,
    }
}

fn is_recordset_method(method: &str) -> bool {
    method.starts_with("action_")
        || method.starts_with("button_")
        || method.starts_with("message_")
        || matches!(method, "read" | "write" | "unlink" | "copy" | "name_get")
}

fn lookup<'t>(table: &'t [(&str, &[&str])], method: &str) -> Option<&'t [&'t str]> {
    table
        .iter()
        .find(|(name, _)| *name == method)
        .map(|(_, names)| *names)
}

#[async_trait]
impl OdooAdapter for Json2Adapter {
    fn protocol(&self) -> WireProtocol {
        WireProtocol::Json2
    }

    fn set_base_context(&mut self, context: Map<String, Value>) {
        self.base_context = context;
    }

    async fn authenticate(
        &mut self,
        _db: &str,
        login: &str,
        _credential: &str,
    ) -> Result<i64, OdooError> {
        // The key authenticates every call; resolving the uid doubles as
        // the credential check.
        let result = self
            .execute_kw(
                "res.users",
                "search_read",
                vec![json!([["login", "=", login]])],
                {
                    let mut kwargs = Map::new();
                    kwargs.insert("fields".to_owned(), json!(["id"]));
                    kwargs.insert("limit".to_owned(), json!(1));
                    kwargs
                },
                None,
            )
            .await
            .map_err(|e| match e {
                OdooError::Rpc(fault) => OdooError::Authentication(fault.to_string()),
                other => other,
            })?;

        let uid = result
            .get(0)
            .and_then(|row| row.get("id"))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        if uid <= 0 {
            return Err(OdooError::Authentication(format!(
                "user not found: {login}"
            )));
        }
        *self.uid.lock().expect("uid lock") = Some(uid);
        Ok(uid)
    }

    async fn execute_kw(
        &self,
        model: &str,
        method: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
        context: Option<&Map<String, Value>>,
    ) -> Result<Value, OdooError> {
        let mut params = kwargs;
        if let Some(ctx) = merged_context(&self.base_context, context) {
            params.insert("context".to_owned(), Value::Object(ctx));
        }

        // Translate positional args into the JSON-2 named convention
        let mut remaining = args;
        let mut ids_for_url: Option<Vec<i64>> = None;

        if let Some(names) = lookup(METHOD_ARG_NAMES, method) {
            for (i, name) in names.iter().enumerate() {
                if i < remaining.len() {
                    params.insert((*name).to_owned(), remaining[i].take());
                }
            }
        } else if !remaining.is_empty() && is_id_list(&remaining[0]) {
            if !is_recordset_method(method) {
                tracing::debug!(model, method, "unknown method, assuming recordset IDs in URL");
            }
            let ids = remaining.remove(0);
            ids_for_url = Some(
                ids.as_array()
                    .map(|items| items.iter().filter_map(Value::as_i64).collect())
                    .unwrap_or_default(),
            );
            if let Some(names) = lookup(RECORDSET_ARG_NAMES, method) {
                for (i, name) in names.iter().enumerate() {
                    if i < remaining.len() {
                        params.insert((*name).to_owned(), remaining[i].take());
                    }
                }
            }
        }

        let endpoint = match &ids_for_url {
            Some(ids) => {
                let ids_str = ids
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                format!("{}/json/2/{model}/{ids_str}/{method}", self.base_url)
            }
            None => format!("{}/json/2/{model}/{method}", self.base_url),
        };

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&Value::Object(params))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OdooError::Connection("request timed out".to_owned())
                } else {
                    OdooError::Connection(format!("connection failed: {e}"))
                }
            })?;

        match response.status().as_u16() {
            401 => return Err(OdooError::SessionExpired("invalid API key".to_owned())),
            403 => {
                return Err(OdooError::AccessDenied(format!(
                    "access denied for {model}/{method}"
                )));
            }
            404 => {
                return Err(OdooError::EndpointNotFound {
                    model: model.to_owned(),
                    method: method.to_owned(),
                });
            }
            _ => {}
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| OdooError::Connection(format!("invalid JSON-2 response: {e}")))?;

        if let Some(error) = data.get("error") {
            return Err(OdooError::Rpc(
                RpcFault::from_jsonrpc_data(error).with_call(model, method),
            ));
        }

        // Lists and scalars come back bare; objects may carry a result
        // wrapper, and some SaaS controllers tuck exceptions inside it.
        match data {
            Value::Object(mut map) => {
                let result = map.remove("result").unwrap_or(Value::Object(map));
                if let Value::Object(inner) = &result
                    && inner.contains_key("name")
                    && inner.contains_key("message")
                    && inner
                        .get("name")
                        .and_then(Value::as_str)
                        .is_some_and(|n| {
                            n.ends_with("Error") || n.ends_with("Warning") || n.ends_with("Exception")
                        })
                {
                    return Err(OdooError::Rpc(
                        RpcFault::from_jsonrpc_data(&result).with_call(model, method),
                    ));
                }
                Ok(result)
            }
            other => Ok(other),
        }
    }

    async fn version_info(&self) -> Result<Value, OdooError> {
        let response = self
            .client
            .post(format!("{}/web/webclient/version_info", self.base_url))
            .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "call", "params": {}}))
            .send()
            .await
            .map_err(|e| OdooError::Connection(format!("version probe failed: {e}")))?;
        let data: Value = response
            .json()
            .await
            .map_err(|e| OdooError::Connection(format!("invalid version response: {e}")))?;
        Ok(data.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn close(&self) {
        self.uid.lock().expect("uid lock").take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_list_detection() {
        assert!(is_id_list(&json!([1, 2, 3])));
        assert!(!is_id_list(&json!([])));
        assert!(!is_id_list(&json!([["name", "=", "x"]])));
        assert!(!is_id_list(&json!("nope")));
    }

    #[test]
    fn recordset_method_detection() {
        assert!(is_recordset_method("action_confirm"));
        assert!(is_recordset_method("button_validate"));
        assert!(is_recordset_method("write"));
        assert!(is_recordset_method("message_post"));
        assert!(!is_recordset_method("search_read"));
        assert!(!is_recordset_method("create"));
    }

    #[test]
    fn known_method_positional_names() {
        assert_eq!(lookup(METHOD_ARG_NAMES, "search_read"), Some(&["domain"][..]));
        assert_eq!(lookup(METHOD_ARG_NAMES, "create"), Some(&["vals_list"][..]));
        assert_eq!(lookup(METHOD_ARG_NAMES, "frobnicate"), None);
    }
}
