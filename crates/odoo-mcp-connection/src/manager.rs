//! Connection lifecycle manager
//!
//! Owns the state machine, the single active adapter, health checks after
//! inactivity, reconnection with exponential backoff, and the JSON-2 →
//! XML-RPC per-method fallback. State transitions are serialized through
//! one lifecycle lock; operations arriving during a reconnect suspend on
//! the state watch until the connection is ready again.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use odoo_mcp_config::{OdooMcpConfig, ProtocolChoice};
use odoo_mcp_core::{Edition, OdooError, OdooVersion, WireProtocol};
use secrecy::ExposeSecret;
use serde_json::{Map, Value, json};
use tokio::sync::watch;

use crate::adapter::OdooAdapter;
use crate::json2::Json2Adapter;
use crate::jsonrpc::JsonRpcAdapter;
use crate::version::{detect_edition, detect_version};
use crate::xmlrpc::XmlRpcAdapter;

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticated,
    Ready,
    Error,
    Reconnecting,
}

impl ConnectionState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticated => "authenticated",
            Self::Ready => "ready",
            Self::Error => "error",
            Self::Reconnecting => "reconnecting",
        }
    }
}

/// Connection metadata exposed through resources
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConnectionInfo {
    pub url: String,
    pub database: String,
    pub uid: Option<i64>,
    pub username: String,
    pub odoo_version: Option<String>,
    pub protocol: Option<WireProtocol>,
    pub edition: Option<Edition>,
    pub state: ConnectionState,
    pub installed_modules: Vec<String>,
}

struct Inner {
    adapter: Option<Arc<dyn OdooAdapter>>,
    version: Option<OdooVersion>,
    uid: Option<i64>,
    installed_modules: Vec<String>,
}

pub struct ConnectionManager {
    config: OdooMcpConfig,
    state_tx: watch::Sender<ConnectionState>,
    inner: tokio::sync::RwLock<Inner>,
    /// Serializes connect/reconnect so no two callers race transitions
    lifecycle: tokio::sync::Mutex<()>,
    /// Lazily created legacy-XML adapter for JSON-2 endpoints that 404
    fallback: tokio::sync::Mutex<Option<Arc<XmlRpcAdapter>>>,
    /// `(model, method)` pairs known to need the fallback
    fallback_methods: std::sync::Mutex<HashSet<(String, String)>>,
    last_activity: std::sync::Mutex<Instant>,
}

impl ConnectionManager {
    pub fn new(config: OdooMcpConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            state_tx,
            inner: tokio::sync::RwLock::new(Inner {
                adapter: None,
                version: None,
                uid: None,
                installed_modules: Vec::new(),
            }),
            lifecycle: tokio::sync::Mutex::new(()),
            fallback: tokio::sync::Mutex::new(None),
            fallback_methods: std::sync::Mutex::new(HashSet::new()),
            last_activity: std::sync::Mutex::new(Instant::now()),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    pub async fn odoo_version(&self) -> Option<OdooVersion> {
        self.inner.read().await.version.clone()
    }

    pub async fn uid(&self) -> Option<i64> {
        self.inner.read().await.uid
    }

    pub async fn installed_modules(&self) -> Vec<String> {
        self.inner.read().await.installed_modules.clone()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    fn touch(&self) {
        *self.last_activity.lock().expect("activity lock") = Instant::now();
    }

    /// Full connection sequence: detect version, select protocol, build the
    /// adapter with the immutable base context, authenticate, detect edition
    pub async fn connect(&self) -> Result<(), OdooError> {
        let _guard = self.lifecycle.lock().await;
        self.connect_locked().await
    }

    async fn connect_locked(&self) -> Result<(), OdooError> {
        self.set_state(ConnectionState::Connecting);
        match self.establish().await {
            Ok(()) => {
                self.set_state(ConnectionState::Ready);
                self.touch();
                Ok(())
            }
            Err(e) => {
                self.set_state(ConnectionState::Error);
                tracing::error!(error = %e, "connection failed");
                Err(e)
            }
        }
    }

    async fn establish(&self) -> Result<(), OdooError> {
        let conn = &self.config.connection;
        let api_key = conn.api_key.as_ref().map(|k| k.expose_secret().to_owned());
        let password = conn.password.as_ref().map(|p| p.expose_secret().to_owned());
        // The API key doubles as the password credential on the legacy
        // protocols and takes precedence when both are configured.
        let credential = api_key.clone().or_else(|| password.clone()).unwrap_or_default();

        let version = detect_version(
            &conn.url,
            &conn.database,
            &conn.username,
            &credential,
            conn.timeout,
            conn.verify_ssl,
            conn.ca_cert.as_deref(),
        )
        .await;
        tracing::info!(version = %version, edition = %version.edition, "detected Odoo version");

        let protocol = match conn.protocol {
            ProtocolChoice::Auto => {
                let selected = version.recommended_protocol();
                tracing::info!(protocol = %selected, "auto-selected protocol");
                selected
            }
            ProtocolChoice::Xmlrpc => WireProtocol::Xmlrpc,
            ProtocolChoice::Jsonrpc => WireProtocol::Jsonrpc,
            ProtocolChoice::Json2 => WireProtocol::Json2,
        };

        let mut adapter = self.build_adapter(protocol, api_key.as_deref())?;
        adapter.set_base_context(self.base_context());

        let uid = match adapter
            .authenticate(&conn.database, &conn.username, &credential)
            .await
        {
            Ok(uid) => uid,
            Err(OdooError::Authentication(msg)) => {
                // Fall back to the password only when the API key was the
                // credential that failed, and never on JSON-2 where the
                // token is mandatory.
                match (&api_key, &password) {
                    (Some(_), Some(password)) if protocol != WireProtocol::Json2 => {
                        tracing::warn!("API key authentication failed, falling back to password");
                        adapter
                            .authenticate(&conn.database, &conn.username, password)
                            .await?
                    }
                    _ => return Err(OdooError::Authentication(msg)),
                }
            }
            Err(other) => return Err(other),
        };

        let adapter: Arc<dyn OdooAdapter> = Arc::from(adapter);
        self.set_state(ConnectionState::Authenticated);

        let mut version = version;
        if version.edition != Edition::Enterprise {
            version.edition = detect_edition(adapter.as_ref(), None).await;
        }

        let installed_modules = fetch_installed_modules(adapter.as_ref()).await;

        tracing::info!(
            url = %conn.url,
            db = %conn.database,
            uid,
            protocol = %protocol,
            version = %version,
            "connected to Odoo"
        );

        let mut inner = self.inner.write().await;
        if let Some(old) = inner.adapter.take() {
            old.close().await;
        }
        inner.adapter = Some(adapter);
        inner.version = Some(version);
        inner.uid = Some(uid);
        inner.installed_modules = installed_modules;
        Ok(())
    }

    fn build_adapter(
        &self,
        protocol: WireProtocol,
        api_key: Option<&str>,
    ) -> Result<Box<dyn OdooAdapter>, OdooError> {
        let conn = &self.config.connection;
        match protocol {
            WireProtocol::Xmlrpc => Ok(Box::new(XmlRpcAdapter::new(
                &conn.url,
                conn.timeout,
                conn.verify_ssl,
                conn.ca_cert.clone(),
            ))),
            WireProtocol::Jsonrpc => Ok(Box::new(JsonRpcAdapter::new(
                &conn.url,
                conn.timeout,
                conn.verify_ssl,
                conn.ca_cert.as_deref(),
            )?)),
            WireProtocol::Json2 => {
                let Some(api_key) = api_key else {
                    return Err(OdooError::Authentication(
                        "the JSON-2 protocol requires an API key".to_owned(),
                    ));
                };
                Ok(Box::new(Json2Adapter::new(
                    &conn.url,
                    api_key.to_owned().into(),
                    conn.timeout,
                    conn.verify_ssl,
                    conn.ca_cert.as_deref(),
                )?))
            }
        }
    }

    /// Built once per connection and never mutated afterwards
    fn base_context(&self) -> Map<String, Value> {
        let ctx_config = &self.config.context;
        let mut ctx = Map::new();
        ctx.insert("lang".to_owned(), json!(ctx_config.lang));
        ctx.insert("tz".to_owned(), json!(ctx_config.tz));
        if let Some(company_id) = ctx_config.company_id {
            ctx.insert("allowed_company_ids".to_owned(), json!([company_id]));
        } else if !ctx_config.company_ids.is_empty() {
            ctx.insert(
                "allowed_company_ids".to_owned(),
                json!(ctx_config.company_ids),
            );
        }
        ctx
    }

    async fn current_adapter(&self) -> Result<Arc<dyn OdooAdapter>, OdooError> {
        self.inner
            .read()
            .await
            .adapter
            .clone()
            .ok_or_else(|| OdooError::Connection("not connected".to_owned()))
    }

    /// Suspend while another caller is reconnecting
    async fn await_ready(&self) -> Result<(), OdooError> {
        let mut rx = self.state_tx.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            match state {
                ConnectionState::Ready | ConnectionState::Authenticated => return Ok(()),
                ConnectionState::Error | ConnectionState::Disconnected => {
                    return Err(OdooError::Connection("not connected".to_owned()));
                }
                ConnectionState::Connecting | ConnectionState::Reconnecting => {
                    if rx.changed().await.is_err() {
                        return Err(OdooError::Connection("connection closed".to_owned()));
                    }
                }
            }
        }
    }

    /// Cheap identity check after the inactivity window
    async fn ensure_healthy(&self) -> Result<(), OdooError> {
        if !self.is_ready() {
            return self.await_ready().await;
        }

        let elapsed = self.last_activity.lock().expect("activity lock").elapsed();
        if elapsed < Duration::from_secs(self.config.health.check_interval) {
            return Ok(());
        }

        tracing::debug!(idle_secs = elapsed.as_secs(), "running health check");
        let uid = self.uid().await.unwrap_or(0);
        let adapter = self.current_adapter().await?;
        match adapter
            .search_count("res.users", json!([["id", "=", uid]]))
            .await
        {
            Ok(1) => {
                self.touch();
                Ok(())
            }
            Ok(n) => {
                tracing::warn!(count = n, "health check failed: current uid not found");
                self.reconnect().await
            }
            Err(e) => {
                tracing::warn!(error = %e, "health check failed");
                self.reconnect().await
            }
        }
    }

    /// Reconnect with exponential backoff (1s, 2s, 4s by default)
    async fn reconnect(&self) -> Result<(), OdooError> {
        let _guard = self.lifecycle.lock().await;
        // Another caller may have reconnected while we waited for the lock
        if self.is_ready() {
            return Ok(());
        }
        self.set_state(ConnectionState::Reconnecting);

        // The fallback adapter is rebuilt on demand; its method cache is
        // kept because 404s are deterministic per backend version.
        if let Some(fallback) = self.fallback.lock().await.take() {
            fallback.close().await;
        }

        let max_attempts = self.config.health.reconnect_max_attempts;
        let base = self.config.health.backoff_base;
        for attempt in 1..=max_attempts {
            let delay = base * 2u64.pow(attempt - 1);
            tracing::info!(attempt, max_attempts, delay_secs = delay, "reconnecting");
            tokio::time::sleep(Duration::from_secs(delay)).await;

            if let Some(adapter) = self.inner.write().await.adapter.take() {
                adapter.close().await;
            }

            match self.connect_locked().await {
                Ok(()) => {
                    tracing::info!("reconnection successful");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "reconnection attempt failed");
                }
            }
        }

        self.set_state(ConnectionState::Error);
        Err(OdooError::Connection(format!(
            "failed to reconnect after {max_attempts} attempts"
        )))
    }

    async fn fallback_adapter(&self) -> Result<Arc<XmlRpcAdapter>, OdooError> {
        let mut slot = self.fallback.lock().await;
        if let Some(adapter) = slot.as_ref() {
            return Ok(Arc::clone(adapter));
        }

        let conn = &self.config.connection;
        let credential = conn
            .api_key
            .as_ref()
            .or(conn.password.as_ref())
            .map(|s| s.expose_secret().to_owned())
            .unwrap_or_default();

        let mut adapter = XmlRpcAdapter::new(
            &conn.url,
            conn.timeout,
            conn.verify_ssl,
            conn.ca_cert.clone(),
        );
        adapter.set_base_context(self.base_context());
        adapter
            .authenticate(&conn.database, &conn.username, &credential)
            .await?;

        let adapter = Arc::new(adapter);
        *slot = Some(Arc::clone(&adapter));
        tracing::info!("created XML-RPC fallback adapter for JSON-2 404s");
        Ok(adapter)
    }

    fn needs_fallback(&self, model: &str, method: &str) -> bool {
        self.fallback_methods
            .lock()
            .expect("fallback lock")
            .contains(&(model.to_owned(), method.to_owned()))
    }

    fn mark_fallback(&self, model: &str, method: &str) {
        self.fallback_methods
            .lock()
            .expect("fallback lock")
            .insert((model.to_owned(), method.to_owned()));
    }

    /// Execute a backend call with health check, JSON-2 fallback, and a
    /// single retry after a recoverable failure
    pub async fn execute_kw(
        &self,
        model: &str,
        method: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
        context: Option<&Map<String, Value>>,
    ) -> Result<Value, OdooError> {
        self.ensure_healthy().await?;

        if self.needs_fallback(model, method) {
            let fallback = self.fallback_adapter().await?;
            let result = fallback
                .execute_kw(model, method, args, kwargs, context)
                .await?;
            self.touch();
            return Ok(result);
        }

        let adapter = self.current_adapter().await?;
        match adapter
            .execute_kw(model, method, args.clone(), kwargs.clone(), context)
            .await
        {
            Ok(result) => {
                self.touch();
                Ok(result)
            }
            Err(OdooError::EndpointNotFound { .. }) => {
                tracing::warn!(model, method, "JSON-2 endpoint missing, using XML-RPC fallback");
                self.mark_fallback(model, method);
                let fallback = self.fallback_adapter().await?;
                let result = fallback
                    .execute_kw(model, method, args, kwargs, context)
                    .await?;
                self.touch();
                Ok(result)
            }
            Err(e) if e.is_recoverable() => {
                tracing::warn!(error = %e, "recoverable failure, reconnecting");
                self.reconnect().await?;
                // Retry the failed operation exactly once
                let adapter = self.current_adapter().await?;
                let result = adapter
                    .execute_kw(model, method, args, kwargs, context)
                    .await?;
                self.touch();
                Ok(result)
            }
            Err(e) => Err(e),
        }
    }

    /// Search and read through the managed connection
    pub async fn search_read(
        &self,
        model: &str,
        domain: Value,
        fields: &[&str],
        limit: Option<u32>,
        offset: u32,
        order: Option<&str>,
    ) -> Result<Vec<Map<String, Value>>, OdooError> {
        let mut kwargs = Map::new();
        if !fields.is_empty() {
            kwargs.insert("fields".to_owned(), json!(fields));
        }
        if let Some(limit) = limit {
            kwargs.insert("limit".to_owned(), json!(limit));
        }
        if offset > 0 {
            kwargs.insert("offset".to_owned(), json!(offset));
        }
        if let Some(order) = order {
            kwargs.insert("order".to_owned(), json!(order));
        }

        let result = self
            .execute_kw(model, "search_read", vec![domain], kwargs, None)
            .await?;
        match result {
            Value::Array(rows) => Ok(rows
                .into_iter()
                .filter_map(|row| match row {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect()),
            _ => Ok(Vec::new()),
        }
    }

    pub async fn search_count(&self, model: &str, domain: Value) -> Result<i64, OdooError> {
        let result = self
            .execute_kw(model, "search_count", vec![domain], Map::new(), None)
            .await?;
        Ok(result.as_i64().unwrap_or(0))
    }

    pub async fn connection_info(&self) -> ConnectionInfo {
        let inner = self.inner.read().await;
        ConnectionInfo {
            url: self.config.connection.url.clone(),
            database: self.config.connection.database.clone(),
            uid: inner.uid,
            username: self.config.connection.username.clone(),
            odoo_version: inner.version.as_ref().map(ToString::to_string),
            protocol: inner.adapter.as_ref().map(|a| a.protocol()),
            edition: inner.version.as_ref().map(|v| v.edition),
            state: self.state(),
            installed_modules: inner.installed_modules.clone(),
        }
    }

    /// Close the connection cleanly; adapter resources are released on
    /// every exit path
    pub async fn disconnect(&self) {
        let _guard = self.lifecycle.lock().await;
        if let Some(fallback) = self.fallback.lock().await.take() {
            fallback.close().await;
        }
        self.fallback_methods
            .lock()
            .expect("fallback lock")
            .clear();

        let mut inner = self.inner.write().await;
        if let Some(adapter) = inner.adapter.take() {
            adapter.close().await;
        }
        inner.uid = None;
        self.set_state(ConnectionState::Disconnected);
        tracing::info!("disconnected from Odoo");
    }
}

async fn fetch_installed_modules(adapter: &dyn OdooAdapter) -> Vec<String> {
    match adapter
        .search_read(
            "ir.module.module",
            json!([["state", "=", "installed"]]),
            &["name"],
            None,
            0,
            None,
        )
        .await
    {
        Ok(rows) => {
            let modules: Vec<String> = rows
                .into_iter()
                .filter_map(|mut row| {
                    row.remove("name")
                        .and_then(|v| v.as_str().map(str::to_owned))
                })
                .collect();
            tracing::info!(count = modules.len(), "fetched installed modules");
            modules
        }
        Err(e) => {
            tracing::warn!(error = %e, "could not fetch installed modules");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_disconnected() {
        let manager = ConnectionManager::new(OdooMcpConfig::default());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.is_ready());
    }

    #[tokio::test]
    async fn execute_before_connect_is_a_connection_error() {
        let manager = ConnectionManager::new(OdooMcpConfig::default());
        let err = manager
            .execute_kw("res.partner", "read", vec![], Map::new(), None)
            .await
            .expect_err("must fail");
        assert!(matches!(err, OdooError::Connection(_)));
    }

    #[test]
    fn fallback_method_cache() {
        let manager = ConnectionManager::new(OdooMcpConfig::default());
        assert!(!manager.needs_fallback("sale.order", "action_confirm"));
        manager.mark_fallback("sale.order", "action_confirm");
        assert!(manager.needs_fallback("sale.order", "action_confirm"));
        assert!(!manager.needs_fallback("sale.order", "write"));
    }

    #[test]
    fn base_context_prefers_single_company() {
        let mut config = OdooMcpConfig::default();
        config.context.company_id = Some(3);
        config.context.company_ids = vec![1, 2];
        let manager = ConnectionManager::new(config);
        let ctx = manager.base_context();
        assert_eq!(ctx["allowed_company_ids"], json!([3]));
        assert_eq!(ctx["lang"], json!("en_US"));
        assert_eq!(ctx["tz"], json!("UTC"));
    }
}
