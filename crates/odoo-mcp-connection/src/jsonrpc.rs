//! Legacy JSON-RPC adapter (Odoo 14-18)
//!
//! Session-cookie authentication via `/web/session/authenticate`, then
//! `/web/dataset/call_kw/{model}/{method}`. Session expiry shows up as
//! HTTP 401/403 or JSON-RPC error code 100.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use odoo_mcp_core::{OdooError, RpcFault, WireProtocol};
use serde_json::{Map, Value, json};

use crate::adapter::{OdooAdapter, merged_context};

/// JSON-RPC error code the backend uses for an expired session
const SESSION_EXPIRED_CODE: i64 = 100;

pub struct JsonRpcAdapter {
    base_url: String,
    client: reqwest::Client,
    base_context: Map<String, Value>,
    request_id: AtomicU64,
    uid: std::sync::Mutex<Option<i64>>,
    /// Session info captured at login (carries the server version)
    session_info: std::sync::Mutex<Map<String, Value>>,
}

impl JsonRpcAdapter {
    pub fn new(
        url: &str,
        timeout: u64,
        verify_ssl: bool,
        ca_cert: Option<&str>,
    ) -> Result<Self, OdooError> {
        let client = build_client(timeout, verify_ssl, ca_cert, true)?;
        Ok(Self {
            base_url: url.trim_end_matches('/').to_owned(),
            client,
            base_context: Map::new(),
            request_id: AtomicU64::new(0),
            uid: std::sync::Mutex::new(None),
            session_info: std::sync::Mutex::new(Map::new()),
        })
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    async fn post_rpc(
        &self,
        endpoint: &str,
        params: Value,
        model: &str,
        method: &str,
    ) -> Result<Value, OdooError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": self.next_id(),
            "method": "call",
            "params": params,
        });

        let response = self
            .client
            .post(format!("{}{endpoint}", self.base_url))
            .json(&payload)
            .send()
            .await
            .map_err(map_transport_error)?;

        match response.status().as_u16() {
            401 => return Err(OdooError::SessionExpired("HTTP 401".to_owned())),
            403 => return Err(OdooError::AccessDenied("HTTP 403".to_owned())),
            _ => {}
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| OdooError::Connection(format!("invalid JSON-RPC response: {e}")))?;

        if let Some(error) = data.get("error") {
            if error.get("code").and_then(Value::as_i64) == Some(SESSION_EXPIRED_CODE) {
                return Err(OdooError::SessionExpired("JSON-RPC error 100".to_owned()));
            }
            let empty = json!({});
            let error_data = error.get("data").unwrap_or(&empty);
            let mut fault = RpcFault::from_jsonrpc_data(error_data);
            if fault.message.is_empty() {
                fault.message = error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("JSON-RPC error")
                    .to_owned();
            }
            return Err(OdooError::Rpc(fault.with_call(model, method)));
        }

        Ok(data.get("result").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl OdooAdapter for JsonRpcAdapter {
    fn protocol(&self) -> WireProtocol {
        WireProtocol::Jsonrpc
    }

    fn set_base_context(&mut self, context: Map<String, Value>) {
        self.base_context = context;
    }

    async fn authenticate(
        &mut self,
        db: &str,
        login: &str,
        credential: &str,
    ) -> Result<i64, OdooError> {
        let params = json!({"db": db, "login": login, "password": credential});
        let result = self
            .post_rpc(
                "/web/session/authenticate",
                params,
                "res.users",
                "authenticate",
            )
            .await
            .map_err(|e| match e {
                OdooError::Rpc(fault) => OdooError::Authentication(fault.to_string()),
                other => other,
            })?;

        // uid is absent or false when the backend rejects the credentials
        let uid = result.get("uid").and_then(Value::as_i64).unwrap_or(0);
        if uid <= 0 {
            return Err(OdooError::Authentication("no uid returned".to_owned()));
        }

        *self.uid.lock().expect("uid lock") = Some(uid);
        if let Value::Object(info) = result {
            *self.session_info.lock().expect("session info lock") = info;
        }
        Ok(uid)
    }

    async fn execute_kw(
        &self,
        model: &str,
        method: &str,
        args: Vec<Value>,
        mut kwargs: Map<String, Value>,
        context: Option<&Map<String, Value>>,
    ) -> Result<Value, OdooError> {
        if let Some(ctx) = merged_context(&self.base_context, context) {
            kwargs.insert("context".to_owned(), Value::Object(ctx));
        }

        let params = json!({
            "model": model,
            "method": method,
            "args": args,
            "kwargs": kwargs,
        });
        let endpoint = format!("/web/dataset/call_kw/{model}/{method}");
        self.post_rpc(&endpoint, params, model, method).await
    }

    async fn version_info(&self) -> Result<Value, OdooError> {
        let info = self.session_info.lock().expect("session info lock").clone();
        if info.contains_key("server_version") {
            return Ok(json!({
                "server_version": info.get("server_version"),
                "server_version_info": info.get("server_version_info"),
            }));
        }
        self.post_rpc("/web/webclient/version_info", json!({}), "", "version_info")
            .await
    }

    async fn close(&self) {
        self.uid.lock().expect("uid lock").take();
        self.session_info.lock().expect("session info lock").clear();
    }
}

fn map_transport_error(error: reqwest::Error) -> OdooError {
    if error.is_timeout() {
        OdooError::Connection("request timed out".to_owned())
    } else if error.is_connect() {
        OdooError::Connection(format!("connection failed: {error}"))
    } else {
        OdooError::Connection(error.to_string())
    }
}

pub(crate) fn build_client(
    timeout: u64,
    verify_ssl: bool,
    ca_cert: Option<&str>,
    cookie_store: bool,
) -> Result<reqwest::Client, OdooError> {
    let mut builder = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout))
        .cookie_store(cookie_store);
    if !verify_ssl {
        builder = builder.danger_accept_invalid_certs(true);
    }
    if let Some(path) = ca_cert {
        let pem = std::fs::read(path)
            .map_err(|e| OdooError::Connection(format!("failed to read CA cert {path}: {e}")))?;
        let cert = reqwest::Certificate::from_pem(&pem)
            .map_err(|e| OdooError::Connection(format!("invalid CA cert {path}: {e}")))?;
        builder = builder.add_root_certificate(cert);
    }
    builder
        .build()
        .map_err(|e| OdooError::Connection(format!("failed to build HTTP client: {e}")))
}
