//! Legacy XML-RPC adapter (Odoo 14-18)
//!
//! The underlying `xmlrpc` client is synchronous, so every call is
//! dispatched through `spawn_blocking` and the shared scheduler loop is
//! never blocked. Credentials travel with every call (uid + secret);
//! session expiry surfaces as an auth fault on any call.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use odoo_mcp_core::{OdooError, RpcFault, WireProtocol};
use serde_json::{Map, Number, Value};

use crate::adapter::{OdooAdapter, merged_context};

/// XML-RPC adapter for `/xmlrpc/2/common` and `/xmlrpc/2/object`
pub struct XmlRpcAdapter {
    common_url: String,
    object_url: String,
    timeout: Duration,
    verify_ssl: bool,
    ca_cert: Option<String>,
    base_context: Map<String, Value>,
    /// Cached blocking client, built lazily on a worker thread and set back
    /// to `None` on close
    client: Arc<Mutex<Option<reqwest::blocking::Client>>>,
    auth: Arc<RwLock<Option<AuthState>>>,
}

#[derive(Clone)]
struct AuthState {
    db: String,
    uid: i64,
    credential: String,
}

impl XmlRpcAdapter {
    pub fn new(url: &str, timeout: u64, verify_ssl: bool, ca_cert: Option<String>) -> Self {
        let base = url.trim_end_matches('/');
        Self {
            common_url: format!("{base}/xmlrpc/2/common"),
            object_url: format!("{base}/xmlrpc/2/object"),
            timeout: Duration::from_secs(timeout),
            verify_ssl,
            ca_cert,
            base_context: Map::new(),
            client: Arc::new(Mutex::new(None)),
            auth: Arc::new(RwLock::new(None)),
        }
    }

    /// Run one XML-RPC request on the worker pool
    async fn call(
        &self,
        url: &str,
        method: &str,
        args: Vec<xmlrpc::Value>,
    ) -> Result<xmlrpc::Value, OdooError> {
        let url = url.to_owned();
        let method = method.to_owned();
        let client_slot = Arc::clone(&self.client);
        let timeout = self.timeout;
        let verify_ssl = self.verify_ssl;
        let ca_cert = self.ca_cert.clone();

        tokio::task::spawn_blocking(move || {
            let client = get_or_build_client(&client_slot, timeout, verify_ssl, ca_cert.as_deref())?;
            let mut request = xmlrpc::Request::new(&method);
            for arg in args {
                request = request.arg(arg);
            }
            request
                .call(BlockingTransport(client.post(&url)))
                .map_err(map_xmlrpc_error)
        })
        .await
        .map_err(|e| OdooError::Connection(format!("worker pool failure: {e}")))?
    }
}

#[async_trait]
impl OdooAdapter for XmlRpcAdapter {
    fn protocol(&self) -> WireProtocol {
        WireProtocol::Xmlrpc
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
        let args = vec![
            xmlrpc::Value::from(db),
            xmlrpc::Value::from(login),
            xmlrpc::Value::from(credential),
            xmlrpc::Value::Struct(BTreeMap::new()),
        ];
        let result = self
            .call(&self.common_url, "authenticate", args)
            .await
            .map_err(|e| match e {
                OdooError::Rpc(fault) => OdooError::Authentication(fault.to_string()),
                other => other,
            })?;

        // The backend reports bad credentials as uid=false (or 0)
        let uid = match result {
            xmlrpc::Value::Int(uid) => i64::from(uid),
            xmlrpc::Value::Int64(uid) => uid,
            _ => 0,
        };
        if uid <= 0 {
            return Err(OdooError::Authentication(
                "invalid credentials".to_owned(),
            ));
        }

        *self.auth.write().expect("auth lock") = Some(AuthState {
            db: db.to_owned(),
            uid,
            credential: credential.to_owned(),
        });
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
        let auth = self
            .auth
            .read()
            .expect("auth lock")
            .clone()
            .ok_or_else(|| OdooError::Connection("not authenticated".to_owned()))?;

        if let Some(ctx) = merged_context(&self.base_context, context) {
            kwargs.insert("context".to_owned(), Value::Object(ctx));
        }

        let call_args = vec![
            xmlrpc::Value::from(auth.db.as_str()),
            to_xmlrpc(&Value::Number(Number::from(auth.uid))),
            xmlrpc::Value::from(auth.credential.as_str()),
            xmlrpc::Value::from(model),
            xmlrpc::Value::from(method),
            to_xmlrpc(&Value::Array(args)),
            to_xmlrpc(&Value::Object(kwargs)),
        ];

        let result = self
            .call(&self.object_url, "execute_kw", call_args)
            .await
            .map_err(|e| attach_call(e, model, method))?;
        Ok(from_xmlrpc(result))
    }

    async fn version_info(&self) -> Result<Value, OdooError> {
        let result = self
            .call(&self.common_url, "version", Vec::new())
            .await?;
        Ok(from_xmlrpc(result))
    }

    async fn close(&self) {
        self.client.lock().expect("client lock").take();
        self.auth.write().expect("auth lock").take();
    }
}

fn attach_call(error: OdooError, model: &str, method: &str) -> OdooError {
    match error {
        OdooError::Rpc(fault) => {
            // An auth fault mid-connection means the credentials stopped
            // working; let the manager re-establish.
            if fault.message.contains("Access Denied")
                || fault
                    .error_class
                    .as_deref()
                    .is_some_and(|c| c.contains("AccessDenied"))
            {
                return OdooError::SessionExpired(fault.to_string());
            }
            OdooError::Rpc(fault.with_call(model, method))
        }
        other => other,
    }
}

fn map_xmlrpc_error(error: xmlrpc::Error) -> OdooError {
    if let Some(fault) = error.fault() {
        return OdooError::Rpc(RpcFault::from_fault_string(&fault.fault_string));
    }
    OdooError::Connection(error.to_string())
}

fn get_or_build_client(
    slot: &Mutex<Option<reqwest::blocking::Client>>,
    timeout: Duration,
    verify_ssl: bool,
    ca_cert: Option<&str>,
) -> Result<reqwest::blocking::Client, OdooError> {
    let mut guard = slot.lock().expect("client lock");
    if let Some(client) = guard.as_ref() {
        return Ok(client.clone());
    }

    let mut builder = reqwest::blocking::Client::builder().timeout(timeout);
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
    let client = builder
        .build()
        .map_err(|e| OdooError::Connection(format!("failed to build HTTP client: {e}")))?;
    *guard = Some(client.clone());
    Ok(client)
}

/// Transport over a configured blocking reqwest client
struct BlockingTransport(reqwest::blocking::RequestBuilder);

impl xmlrpc::Transport for BlockingTransport {
    type Stream = reqwest::blocking::Response;

    fn transmit(
        self,
        request: &xmlrpc::Request<'_>,
    ) -> Result<Self::Stream, Box<dyn std::error::Error + Send + Sync>> {
        let mut body = Vec::new();
        request.write_as_xml(&mut body)?;
        let response = self
            .0
            .header("Content-Type", "text/xml; charset=utf-8")
            .body(body)
            .send()?;
        Ok(response.error_for_status()?)
    }
}

/// JSON → XML-RPC value conversion
///
/// The wire limits integers to 32 bits; larger values go through the
/// non-standard i8 extension the backend accepts.
fn to_xmlrpc(value: &Value) -> xmlrpc::Value {
    match value {
        Value::Null => xmlrpc::Value::Nil,
        Value::Bool(b) => xmlrpc::Value::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                match i32::try_from(i) {
                    Ok(small) => xmlrpc::Value::Int(small),
                    Err(_) => xmlrpc::Value::Int64(i),
                }
            } else {
                xmlrpc::Value::Double(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => xmlrpc::Value::String(s.clone()),
        Value::Array(items) => xmlrpc::Value::Array(items.iter().map(to_xmlrpc).collect()),
        Value::Object(map) => xmlrpc::Value::Struct(
            map.iter()
                .map(|(k, v)| (k.clone(), to_xmlrpc(v)))
                .collect(),
        ),
    }
}

/// XML-RPC → JSON value conversion
///
/// Binary payloads become base64 strings; the empty scalar the backend uses
/// for "no value" arrives as `false` and is left for the tool layer to
/// normalize.
fn from_xmlrpc(value: xmlrpc::Value) -> Value {
    match value {
        xmlrpc::Value::Nil => Value::Null,
        xmlrpc::Value::Bool(b) => Value::Bool(b),
        xmlrpc::Value::Int(i) => Value::Number(Number::from(i)),
        xmlrpc::Value::Int64(i) => Value::Number(Number::from(i)),
        xmlrpc::Value::Double(d) => Number::from_f64(d).map_or(Value::Null, Value::Number),
        xmlrpc::Value::String(s) => Value::String(s),
        xmlrpc::Value::DateTime(dt) => Value::String(dt.to_string()),
        xmlrpc::Value::Base64(bytes) => {
            Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
        }
        xmlrpc::Value::Array(items) => Value::Array(items.into_iter().map(from_xmlrpc).collect()),
        xmlrpc::Value::Struct(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, from_xmlrpc(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_roundtrip_through_wire_values() {
        let original = json!({
            "name": "Acme",
            "active": true,
            "qty": 7,
            "price": 19.5,
            "tags": [1, 2, 3],
            "note": null,
        });
        let roundtripped = from_xmlrpc(to_xmlrpc(&original));
        assert_eq!(roundtripped, original);
    }

    #[test]
    fn wide_integers_use_the_i8_extension() {
        let big = json!(i64::from(i32::MAX) + 1);
        match to_xmlrpc(&big) {
            xmlrpc::Value::Int64(v) => assert_eq!(v, i64::from(i32::MAX) + 1),
            other => panic!("expected Int64, got {other:?}"),
        }
        let small = json!(42);
        assert!(matches!(to_xmlrpc(&small), xmlrpc::Value::Int(42)));
    }

    #[test]
    fn binary_becomes_base64() {
        let value = from_xmlrpc(xmlrpc::Value::Base64(vec![1, 2, 3]));
        assert_eq!(value, json!("AQID"));
    }

    #[test]
    fn execute_before_authenticate_fails() {
        let adapter = XmlRpcAdapter::new("http://localhost:8069", 30, true, None);
        let err = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime")
            .block_on(adapter.execute_kw("res.partner", "read", vec![], Map::new(), None))
            .expect_err("must fail");
        assert!(matches!(err, OdooError::Connection(_)));
    }
}
