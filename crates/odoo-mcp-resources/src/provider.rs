//! Resource provider
//!
//! Serves the static system/config resources and the templated model and
//! record resources, all read-only and filtered through the safety gate.
//! Subscriptions poll `write_date` and emit `resources/updated`
//! notifications through the server's channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use odoo_mcp_connection::Backend;
use odoo_mcp_registry::{FieldType, ModelRegistry};
use odoo_mcp_safety::SafetyPolicy;
use odoo_mcp_toolsets::RegistrationReport;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::uri::{OdooUri, UriCategory, parse_odoo_uri};
use crate::MAX_SUBSCRIPTIONS_PER_CLIENT;

/// Static resource definition for MCP registration
#[derive(Debug, Clone)]
pub struct ResourceDefinition {
    pub uri: &'static str,
    pub name: &'static str,
    pub mime_type: &'static str,
    pub description: &'static str,
}

/// Templated resource definition
#[derive(Debug, Clone)]
pub struct ResourceTemplate {
    pub uri_template: &'static str,
    pub name: &'static str,
    pub mime_type: &'static str,
    pub description: &'static str,
}

/// Identity and connection details captured at startup
#[derive(Debug, Clone, Default)]
pub struct ServerIdentity {
    pub url: String,
    pub database: String,
    pub username: String,
    pub uid: i64,
    pub server_version: String,
    pub server_edition: String,
    pub protocol: String,
    pub mcp_server_version: String,
    pub installed_modules: Vec<String>,
}

#[derive(Debug)]
struct SubscriptionEntry {
    model: Option<String>,
    record_id: Option<i64>,
    last_write_date: Option<String>,
}

pub struct ResourceProvider {
    backend: Arc<dyn Backend>,
    registry: Arc<ModelRegistry>,
    policy: Arc<SafetyPolicy>,
    report: Arc<std::sync::RwLock<Option<RegistrationReport>>>,
    identity: ServerIdentity,
    /// client_id -> uri -> entry; owned by the engine, mutated only from
    /// its own methods
    subscriptions: tokio::sync::Mutex<HashMap<String, HashMap<String, SubscriptionEntry>>>,
}

impl ResourceProvider {
    pub fn new(
        backend: Arc<dyn Backend>,
        registry: Arc<ModelRegistry>,
        policy: Arc<SafetyPolicy>,
        report: Arc<std::sync::RwLock<Option<RegistrationReport>>>,
        identity: ServerIdentity,
    ) -> Self {
        Self {
            backend,
            registry,
            policy,
            report,
            identity,
            subscriptions: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn resource_definitions() -> &'static [ResourceDefinition] {
        &[
            ResourceDefinition {
                uri: "odoo://system/info",
                name: "Odoo Instance Info",
                mime_type: "application/json",
                description: "Connection details, Odoo version, and server capabilities",
            },
            ResourceDefinition {
                uri: "odoo://system/modules",
                name: "Installed Modules",
                mime_type: "application/json",
                description: "List of installed Odoo modules",
            },
            ResourceDefinition {
                uri: "odoo://system/toolsets",
                name: "Available Toolsets",
                mime_type: "application/json",
                description: "Toolset registration report: registered and skipped toolsets",
            },
            ResourceDefinition {
                uri: "odoo://config/safety",
                name: "Safety Configuration",
                mime_type: "application/json",
                description: "Current safety configuration and access rules",
            },
        ]
    }

    pub fn resource_templates() -> &'static [ResourceTemplate] {
        &[
            ResourceTemplate {
                uri_template: "odoo://model/{model_name}/fields",
                name: "Model Fields",
                mime_type: "application/json",
                description: "Field definitions for an Odoo model",
            },
            ResourceTemplate {
                uri_template: "odoo://model/{model_name}/methods",
                name: "Model Methods",
                mime_type: "application/json",
                description: "Available methods for an Odoo model",
            },
            ResourceTemplate {
                uri_template: "odoo://model/{model_name}/states",
                name: "Model States",
                mime_type: "application/json",
                description: "State machine for an Odoo model",
            },
            ResourceTemplate {
                uri_template: "odoo://record/{model_name}/{record_id}",
                name: "Odoo Record",
                mime_type: "application/json",
                description: "Read a specific Odoo record by model and ID",
            },
            ResourceTemplate {
                uri_template: "odoo://record/{model_name}",
                name: "Record Listing",
                mime_type: "application/json",
                description: "Search and list records with an optional domain filter",
            },
        ]
    }

    /// Resolve a resource URI to its content
    pub async fn read_resource(&self, uri: &str) -> Value {
        let parsed = match parse_odoo_uri(uri) {
            Ok(parsed) => parsed,
            Err(e) => return json!({"error": true, "message": e.to_string()}),
        };

        if let Some(model) = parsed.model_name()
            && self.policy.is_model_blocked(model)
        {
            return json!({
                "error": true,
                "code": "MODEL_BLOCKED",
                "message": format!("Model '{model}' is blocked by safety configuration"),
            });
        }

        match parsed.category {
            UriCategory::System => self.read_system(&parsed),
            UriCategory::Config => self.read_config(&parsed),
            UriCategory::Model => self.read_model(&parsed),
            UriCategory::Record => self.read_record(&parsed).await,
        }
    }

    fn read_system(&self, parsed: &OdooUri) -> Value {
        match parsed.resource_type() {
            Some("info") => json!({
                "server_version": self.identity.server_version,
                "server_edition": self.identity.server_edition,
                "database": self.identity.database,
                "url": self.identity.url,
                "protocol": self.identity.protocol,
                "user": {"uid": self.identity.uid, "name": self.identity.username},
                "mcp_server_version": self.identity.mcp_server_version,
            }),
            Some("modules") => json!({
                "modules": self.identity.installed_modules,
                "count": self.identity.installed_modules.len(),
            }),
            Some("toolsets") => {
                let report = self.report.read().expect("report lock").clone();
                report.map_or_else(
                    || json!({"error": true, "message": "Toolset registration has not run yet"}),
                    |report| serde_json::to_value(&report).unwrap_or_default(),
                )
            }
            other => json!({
                "error": true,
                "message": format!("Unknown system resource: {}", other.unwrap_or("")),
            }),
        }
    }

    fn read_config(&self, parsed: &OdooUri) -> Value {
        match parsed.resource_type() {
            Some("safety") => self.policy.describe(),
            other => json!({
                "error": true,
                "message": format!("Unknown config resource: {}", other.unwrap_or("")),
            }),
        }
    }

    fn read_model(&self, parsed: &OdooUri) -> Value {
        let model_name = parsed.model_name().unwrap_or_default();
        let Some(model) = self.registry.get_model(model_name) else {
            return json!({
                "error": true,
                "message": format!("Model '{model_name}' not found in registry"),
            });
        };

        match parsed.resource_type() {
            Some("fields") => {
                let mut fields = serde_json::Map::new();
                for (name, info) in &model.fields {
                    if self.policy.is_field_blocked(name) || info.field_type == FieldType::Binary {
                        continue;
                    }
                    fields.insert(name.clone(), serde_json::to_value(info).unwrap_or_default());
                }
                let count = fields.len();
                json!({"model": model_name, "fields": fields, "count": count})
            }
            Some("methods") => {
                let methods: Vec<Value> = model
                    .methods
                    .values()
                    .map(|m| serde_json::to_value(m).unwrap_or_default())
                    .collect();
                json!({"model": model_name, "methods": methods})
            }
            Some("states") => match &model.states {
                Some(states) => json!({
                    "model": model_name,
                    "state_field": "state",
                    "states": states
                        .iter()
                        .map(|(value, label)| json!({"value": value, "label": label}))
                        .collect::<Vec<_>>(),
                }),
                None => json!({
                    "model": model_name,
                    "state_field": Value::Null,
                    "states": [],
                }),
            },
            other => json!({
                "error": true,
                "message": format!("Unknown model resource type: {}", other.unwrap_or("")),
            }),
        }
    }

    async fn read_record(&self, parsed: &OdooUri) -> Value {
        let model_name = parsed.model_name().unwrap_or_default().to_owned();
        let read_fields = self.readable_fields(&model_name);
        let field_refs: Vec<&str> = read_fields.iter().map(String::as_str).collect();

        if let Some(record_id) = parsed.record_id() {
            match self
                .backend
                .search_read(
                    &model_name,
                    json!([["id", "=", record_id]]),
                    &field_refs,
                    Some(1),
                    0,
                    None,
                )
                .await
            {
                Ok(records) if records.is_empty() => json!({
                    "error": true,
                    "message": format!("Record {model_name}/{record_id} not found"),
                }),
                Ok(mut records) => json!({"model": model_name, "record": records.remove(0)}),
                Err(e) => json!({
                    "error": true,
                    "code": "ACCESS_ERROR",
                    "message": format!("Cannot read {model_name}/{record_id}: {e}"),
                }),
            }
        } else {
            let domain = parsed.domain.clone().unwrap_or(json!([]));
            match self
                .backend
                .search_read(&model_name, domain, &field_refs, Some(parsed.limit), 0, None)
                .await
            {
                Ok(records) => json!({
                    "model": model_name,
                    "count": records.len(),
                    "records": records,
                    "limit": parsed.limit,
                }),
                Err(e) => json!({
                    "error": true,
                    "code": "ACCESS_ERROR",
                    "message": format!("Cannot search {model_name}: {e}"),
                }),
            }
        }
    }

    /// Registry-known fields minus binary and blocked ones; empty means let
    /// the backend pick its defaults
    fn readable_fields(&self, model_name: &str) -> Vec<String> {
        self.registry
            .get_model(model_name)
            .map(|model| {
                model
                    .fields
                    .iter()
                    .filter(|(name, info)| {
                        info.field_type != FieldType::Binary && !self.policy.is_field_blocked(name)
                    })
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    // -- Subscriptions --

    /// Subscribe a client to a resource
    ///
    /// Only individual records and `system/info` are watchable; at most
    /// [`MAX_SUBSCRIPTIONS_PER_CLIENT`] per client.
    pub async fn subscribe(&self, client_id: &str, uri: &str) -> Value {
        let parsed = match parse_odoo_uri(uri) {
            Ok(parsed) => parsed,
            Err(e) => return json!({"error": true, "message": e.to_string()}),
        };

        let entry = match (parsed.category, parsed.record_id()) {
            (UriCategory::Record, Some(record_id)) => SubscriptionEntry {
                model: parsed.model_name().map(str::to_owned),
                record_id: Some(record_id),
                last_write_date: None,
            },
            (UriCategory::System, _) if parsed.resource_type() == Some("info") => {
                SubscriptionEntry {
                    model: None,
                    record_id: None,
                    last_write_date: None,
                }
            }
            _ => {
                return json!({
                    "error": true,
                    "message": format!("Subscriptions not supported for {uri}"),
                });
            }
        };

        let mut subscriptions = self.subscriptions.lock().await;
        let client = subscriptions.entry(client_id.to_owned()).or_default();
        if client.len() >= MAX_SUBSCRIPTIONS_PER_CLIENT && !client.contains_key(uri) {
            return json!({
                "error": true,
                "code": "SUBSCRIPTION_LIMIT",
                "message": format!("Maximum {MAX_SUBSCRIPTIONS_PER_CLIENT} subscriptions reached"),
            });
        }
        client.insert(uri.to_owned(), entry);
        json!({"subscribed": true, "uri": uri})
    }

    pub async fn unsubscribe(&self, client_id: &str, uri: &str) -> Value {
        let mut subscriptions = self.subscriptions.lock().await;
        if let Some(client) = subscriptions.get_mut(client_id) {
            client.remove(uri);
            if client.is_empty() {
                subscriptions.remove(client_id);
            }
        }
        json!({"unsubscribed": true, "uri": uri})
    }

    /// Drop every subscription a client holds (disconnect path)
    pub async fn unsubscribe_client(&self, client_id: &str) {
        self.subscriptions.lock().await.remove(client_id);
    }

    pub async fn subscription_count(&self, client_id: &str) -> usize {
        self.subscriptions
            .lock()
            .await
            .get(client_id)
            .map_or(0, HashMap::len)
    }

    /// Poll watched records and emit changed URIs
    ///
    /// Runs until cancelled; shares the managed connection, so it suspends
    /// behind the same reconnection barrier as tool calls.
    pub async fn poll_loop(
        self: Arc<Self>,
        interval: Duration,
        notify: mpsc::UnboundedSender<String>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(interval) => {}
            }

            let watched: Vec<(String, String, i64, Option<String>)> = {
                let subscriptions = self.subscriptions.lock().await;
                subscriptions
                    .iter()
                    .flat_map(|(_, uris)| uris.iter())
                    .filter_map(|(uri, entry)| {
                        let model = entry.model.clone()?;
                        let record_id = entry.record_id?;
                        Some((uri.clone(), model, record_id, entry.last_write_date.clone()))
                    })
                    .collect()
            };

            for (uri, model, record_id, last_write_date) in watched {
                let result = self
                    .backend
                    .search_read(
                        &model,
                        json!([["id", "=", record_id]]),
                        &["write_date"],
                        Some(1),
                        0,
                        None,
                    )
                    .await;
                let records = match result {
                    Ok(records) => records,
                    // Losing access to the record kills the watch
                    Err(odoo_mcp_core::OdooError::AccessDenied(_)) => {
                        tracing::info!(uri = %uri, "access lost, dropping subscription");
                        let mut subscriptions = self.subscriptions.lock().await;
                        for uris in subscriptions.values_mut() {
                            uris.remove(&uri);
                        }
                        continue;
                    }
                    Err(e) => {
                        tracing::debug!(uri = %uri, error = %e, "subscription poll failed");
                        continue;
                    }
                };
                let Some(record) = records.first() else {
                    continue;
                };
                let new_write_date = record
                    .get("write_date")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned();

                if let Some(previous) = &last_write_date
                    && previous != &new_write_date
                    && notify.send(uri.clone()).is_err()
                {
                    return;
                }

                let mut subscriptions = self.subscriptions.lock().await;
                for uris in subscriptions.values_mut() {
                    if let Some(entry) = uris.get_mut(&uri) {
                        entry.last_write_date = Some(new_write_date.clone());
                    }
                }
            }
        }
    }
}
