//! MCP server host
//!
//! Wires the connection manager, model registry, safety gate, toolsets,
//! resources, and prompts together, then serves one of the three
//! transports. Startup order matters: connect (fatal on failure), build
//! the registry (best effort), register toolsets (fatal on duplicate names
//! or dependency cycles), then expose everything over the transport.

mod prompts;
mod protocol;
mod server;
mod transport;

pub use prompts::PromptProvider;
pub use server::McpServer;

use std::sync::Arc;
use std::time::Duration;

use odoo_mcp_config::{OdooMcpConfig, TransportKind};
use odoo_mcp_connection::{Backend, ConnectionManager};
use odoo_mcp_registry::{ModelRegistry, RegistryBuildMode};
use odoo_mcp_resources::{ResourceProvider, ServerIdentity};
use odoo_mcp_safety::{AuditLogger, RateLimiter, SafetyPolicy};
use odoo_mcp_toolsets::core::CoreToolset;
use odoo_mcp_toolsets::sales::SalesToolset;
use odoo_mcp_toolsets::{ToolContext, Toolset, ToolsetRegistry};
use tokio_util::sync::CancellationToken;

/// Subscription poll cadence
const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Grace period for in-flight work at shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// The assembled server, ready to serve a transport
pub struct Server {
    config: OdooMcpConfig,
    manager: Arc<ConnectionManager>,
    mcp: Arc<McpServer>,
}

impl Server {
    /// Run the startup sequence
    ///
    /// # Errors
    ///
    /// Fails when the backend is unreachable, credentials are rejected, or
    /// toolset registration hits a fatal condition (duplicate tool name,
    /// dependency cycle).
    pub async fn build(config: OdooMcpConfig) -> anyhow::Result<Self> {
        let manager = Arc::new(ConnectionManager::new(config.clone()));
        manager
            .connect()
            .await
            .map_err(|e| anyhow::anyhow!("failed to connect to Odoo: {e}"))?;

        let backend: Arc<dyn Backend> = Arc::clone(&manager) as Arc<dyn Backend>;
        let registry = Arc::new(ModelRegistry::new());
        build_registry(&config, &registry, &backend).await;

        let policy = Arc::new(SafetyPolicy::from_config(&config.safety));
        let version = manager.odoo_version().await;
        let report = Arc::new(std::sync::RwLock::new(None));
        let context = ToolContext {
            backend: Arc::clone(&backend),
            policy: Arc::clone(&policy),
            registry: Arc::clone(&registry),
            errors: odoo_mcp_errors::ErrorHandler::new(),
            search: config.search.clone(),
            display: config.display.clone(),
            version: version.clone(),
            report: Arc::clone(&report),
        };

        let toolsets: Vec<Box<dyn Toolset>> = vec![Box::new(CoreToolset), Box::new(SalesToolset)];
        let installed_modules = manager.installed_modules().await;
        let tools = ToolsetRegistry::register_all(
            &toolsets,
            &context,
            &config.toolsets,
            &installed_modules,
        )
        .map_err(|e| anyhow::anyhow!("toolset registration failed: {e}"))?;

        let info = manager.connection_info().await;
        let identity = ServerIdentity {
            url: info.url,
            database: info.database,
            username: info.username,
            uid: info.uid.unwrap_or(0),
            server_version: info.odoo_version.clone().unwrap_or_default(),
            server_edition: info
                .edition
                .map(|e| e.to_string())
                .unwrap_or_default(),
            protocol: info
                .protocol
                .map(|p| p.to_string())
                .unwrap_or_default(),
            mcp_server_version: env!("CARGO_PKG_VERSION").to_owned(),
            installed_modules,
        };

        let resources = Arc::new(ResourceProvider::new(
            Arc::clone(&backend),
            Arc::clone(&registry),
            Arc::clone(&policy),
            Arc::clone(&report),
            identity,
        ));

        let toolset_names: Vec<String> = tools
            .registered_toolsets()
            .iter()
            .map(|meta| meta.name.clone())
            .collect();
        let prompts = PromptProvider::new(
            info.odoo_version.unwrap_or_default(),
            config.connection.database.clone(),
            toolset_names,
        );

        let limiter = RateLimiter::new(&config.rate_limit);
        let audit = AuditLogger::new(&config.audit);
        let uid = manager.uid().await.unwrap_or(0);

        let mcp = Arc::new(McpServer::new(
            tools, resources, prompts, limiter, audit, uid,
        ));

        Ok(Self {
            config,
            manager,
            mcp,
        })
    }

    /// Serve the configured transport until shutdown
    ///
    /// On shutdown, cancellation reaches every pending operation; the
    /// active adapter closes after the transport, and a clean exit returns
    /// status 0 from the binary.
    pub async fn serve(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let (notify_tx, notify_rx) = tokio::sync::mpsc::unbounded_channel();

        let poller = Arc::clone(self.mcp.resources());
        let poll_cancel = shutdown.child_token();
        let poll_task =
            tokio::spawn(poller.poll_loop(POLL_INTERVAL, notify_tx, poll_cancel.clone()));

        let transport = &self.config.transport;
        let result = match transport.kind {
            TransportKind::Stdio => {
                transport::run_stdio(Arc::clone(&self.mcp), notify_rx, shutdown.clone()).await
            }
            TransportKind::Sse => {
                transport::run_sse(
                    Arc::clone(&self.mcp),
                    &transport.host,
                    transport.port,
                    notify_rx,
                    shutdown.clone(),
                )
                .await
            }
            TransportKind::Http => {
                transport::run_http(
                    Arc::clone(&self.mcp),
                    &transport.host,
                    transport.port,
                    &transport.path,
                    shutdown.clone(),
                )
                .await
            }
        };

        shutdown.cancel();
        if tokio::time::timeout(SHUTDOWN_GRACE, poll_task).await.is_err() {
            tracing::warn!("subscription poller did not stop within the grace period");
        }
        self.manager.disconnect().await;

        result
    }
}

/// Build the model registry per configuration: static file, live
/// introspection, or the merge of both. Failures here degrade the server
/// (empty registry) but never stop startup.
async fn build_registry(
    config: &OdooMcpConfig,
    registry: &Arc<ModelRegistry>,
    backend: &Arc<dyn Backend>,
) {
    let static_loaded = match &config.registry.static_path {
        Some(path) => match registry.load_static(std::path::Path::new(path)) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "static registry load failed");
                false
            }
        },
        None => false,
    };

    if !config.registry.introspect_on_startup {
        return;
    }

    let static_snapshot = static_loaded.then(|| registry.snapshot());
    let budget = Duration::from_secs(config.registry.introspect_timeout);
    let dynamic = registry
        .build_dynamic(
            Arc::clone(backend),
            &config.registry.introspect_models,
            budget,
        )
        .await;

    if let Some(static_registry) = static_snapshot {
        let merged = registry.merge(&static_registry, &dynamic);
        tracing::info!(
            models = merged.model_count,
            fields = merged.field_count,
            mode = ?RegistryBuildMode::Merged,
            "registry ready"
        );
    }
}
