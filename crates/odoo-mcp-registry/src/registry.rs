//! Registry construction and query API
//!
//! Static load, live introspection under a concurrency cap and wall-clock
//! budget, and the merge that overlays dynamic data on a static base.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use odoo_mcp_connection::Backend;
use odoo_mcp_core::OdooError;
use serde_json::{Map, Value, json};
use tokio::sync::Semaphore;

use crate::model::{FieldInfo, FieldType, ModelInfo, Registry, RegistryBuildMode};
use crate::{DEFAULT_INTROSPECTION_MODELS, method_accepts_kwargs};

/// Fields-in-flight cap for the introspection pass
const INTROSPECTION_CONCURRENCY: usize = 5;

/// Attributes requested from `fields_get`
const FIELD_ATTRIBUTES: &[&str] = &[
    "string",
    "type",
    "required",
    "readonly",
    "store",
    "help",
    "relation",
    "selection",
];

/// Central registry with query access to model/field/method metadata
///
/// Effectively immutable between refreshes; the existence cache lives for
/// the connection lifetime.
pub struct ModelRegistry {
    registry: std::sync::RwLock<Registry>,
    existence: std::sync::Mutex<HashMap<String, bool>>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            registry: std::sync::RwLock::new(Registry::new(RegistryBuildMode::Dynamic)),
            existence: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn snapshot(&self) -> Registry {
        self.registry.read().expect("registry lock").clone()
    }

    // -- Query surface --

    pub fn get_model(&self, model: &str) -> Option<ModelInfo> {
        self.registry
            .read()
            .expect("registry lock")
            .models
            .get(model)
            .cloned()
    }

    pub fn get_field(&self, model: &str, field: &str) -> Option<FieldInfo> {
        self.registry
            .read()
            .expect("registry lock")
            .models
            .get(model)?
            .fields
            .get(field)
            .cloned()
    }

    pub fn get_method(&self, model: &str, method: &str) -> Option<crate::MethodInfo> {
        self.registry
            .read()
            .expect("registry lock")
            .models
            .get(model)?
            .methods
            .get(method)
            .cloned()
    }

    /// Models matching an optional case-insensitive substring filter,
    /// ordered by technical name
    pub fn list_models(&self, filter: Option<&str>) -> Vec<ModelInfo> {
        let registry = self.registry.read().expect("registry lock");
        let mut models: Vec<ModelInfo> = match filter {
            Some(filter) => {
                let needle = filter.to_lowercase();
                registry
                    .models
                    .values()
                    .filter(|m| {
                        m.model.to_lowercase().contains(&needle)
                            || m.name.to_lowercase().contains(&needle)
                            || m.description
                                .as_deref()
                                .is_some_and(|d| d.to_lowercase().contains(&needle))
                    })
                    .cloned()
                    .collect()
            }
            None => registry.models.values().cloned().collect(),
        };
        models.sort_by(|a, b| a.model.cmp(&b.model));
        models
    }

    pub fn get_required_fields(&self, model: &str) -> Vec<FieldInfo> {
        self.get_model(model)
            .map(|m| m.fields.into_values().filter(|f| f.required).collect())
            .unwrap_or_default()
    }

    pub fn get_state_field(&self, model: &str) -> Option<FieldInfo> {
        self.get_field(model, "state")
    }

    pub fn get_relational_fields(&self, model: &str) -> Vec<FieldInfo> {
        self.get_model(model)
            .map(|m| {
                m.fields
                    .into_values()
                    .filter(|f| f.field_type.is_relational())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn method_accepts_kwargs(&self, method: &str) -> bool {
        method_accepts_kwargs(method)
    }

    /// Registry-first existence check with a cheap backend probe on miss
    ///
    /// Both outcomes are cached for the connection lifetime.
    pub async fn model_exists(&self, backend: &dyn Backend, model: &str) -> bool {
        if let Some(known) = self.existence.lock().expect("existence lock").get(model) {
            return *known;
        }
        if self
            .registry
            .read()
            .expect("registry lock")
            .models
            .contains_key(model)
        {
            self.existence
                .lock()
                .expect("existence lock")
                .insert(model.to_owned(), true);
            return true;
        }

        let mut kwargs = Map::new();
        kwargs.insert("limit".to_owned(), json!(0));
        let exists = backend
            .execute_kw(model, "search_count", vec![json!([])], kwargs, None)
            .await
            .is_ok();
        self.existence
            .lock()
            .expect("existence lock")
            .insert(model.to_owned(), exists);
        exists
    }

    // -- Construction --

    /// Load a previously generated static registry file
    pub fn load_static(&self, path: &Path) -> Result<(), OdooError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            OdooError::Connection(format!("failed to read registry {}: {e}", path.display()))
        })?;
        let mut registry: Registry = serde_json::from_str(&raw).map_err(|e| {
            OdooError::Connection(format!("invalid registry file {}: {e}", path.display()))
        })?;
        registry.update_counts();
        tracing::info!(
            models = registry.model_count,
            fields = registry.field_count,
            "loaded static registry"
        );
        self.install(registry);
        Ok(())
    }

    /// Introspect a live backend
    ///
    /// At most [`INTROSPECTION_CONCURRENCY`] `fields_get` calls run at once;
    /// whatever was collected when the wall-clock budget expires is kept.
    pub async fn build_dynamic(
        &self,
        backend: Arc<dyn Backend>,
        target_models: &[String],
        budget: Duration,
    ) -> Registry {
        let targets: Vec<String> = if target_models.is_empty() {
            DEFAULT_INTROSPECTION_MODELS
                .iter()
                .map(|&s| s.to_owned())
                .collect()
        } else {
            target_models.to_vec()
        };

        match backend
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
            Ok(modules) => tracing::info!(count = modules.len(), "found installed modules"),
            Err(e) => tracing::warn!(error = %e, "failed to list installed modules"),
        }

        // Only models the current uid can read come back from ir.model
        let accessible: HashMap<String, Map<String, Value>> = match backend
            .search_read(
                "ir.model",
                json!([["model", "in", targets]]),
                &["model", "name", "info", "transient"],
                None,
                0,
                None,
            )
            .await
        {
            Ok(rows) => rows
                .into_iter()
                .filter_map(|row| {
                    row.get("model")
                        .and_then(Value::as_str)
                        .map(|m| (m.to_owned(), row.clone()))
                })
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to list models");
                HashMap::new()
            }
        };

        let collected: Arc<tokio::sync::Mutex<BTreeMap<String, ModelInfo>>> =
            Arc::new(tokio::sync::Mutex::new(BTreeMap::new()));
        let semaphore = Arc::new(Semaphore::new(INTROSPECTION_CONCURRENCY));

        let tasks = targets.iter().map(|model| {
            let backend = Arc::clone(&backend);
            let semaphore = Arc::clone(&semaphore);
            let collected = Arc::clone(&collected);
            let meta = accessible.get(model).cloned();
            let model = model.clone();
            async move {
                let _permit = semaphore.acquire().await;
                if let Some(info) = introspect_model(backend.as_ref(), &model, meta.as_ref()).await
                {
                    collected.lock().await.insert(model, info);
                }
            }
        });

        if tokio::time::timeout(budget, futures_util::future::join_all(tasks))
            .await
            .is_err()
        {
            tracing::warn!(
                budget_secs = budget.as_secs(),
                "introspection budget expired, keeping partial results"
            );
        }

        let mut registry = Registry::new(RegistryBuildMode::Dynamic);
        registry.models = Arc::try_unwrap(collected)
            .map(tokio::sync::Mutex::into_inner)
            .unwrap_or_default();
        registry.update_counts();
        tracing::info!(
            models = registry.model_count,
            fields = registry.field_count,
            "dynamic registry built"
        );
        self.install(registry.clone());
        registry
    }

    /// Merge a dynamic overlay onto a static base
    ///
    /// Fields: dynamic wins. Methods: static wins (richer via source
    /// parsing), dynamic adds new ones. States: dynamic wins. Models only
    /// in dynamic are added wholesale.
    pub fn merge(&self, static_registry: &Registry, dynamic: &Registry) -> Registry {
        let mut merged = Registry::new(RegistryBuildMode::Merged);
        merged.version = if dynamic.version.is_empty() {
            static_registry.version.clone()
        } else {
            dynamic.version.clone()
        };
        merged.models = static_registry.models.clone();

        for (model_name, dynamic_model) in &dynamic.models {
            match merged.models.get_mut(model_name) {
                Some(base) => {
                    for (field_name, field) in &dynamic_model.fields {
                        if !base.fields.contains_key(field_name) {
                            tracing::debug!(
                                model = %model_name,
                                field = %field_name,
                                "merge: field added from dynamic"
                            );
                        }
                        base.fields.insert(field_name.clone(), field.clone());
                    }
                    for (method_name, method) in &dynamic_model.methods {
                        if !base.methods.contains_key(method_name) {
                            tracing::debug!(
                                model = %model_name,
                                method = %method_name,
                                "merge: method added from dynamic"
                            );
                            base.methods.insert(method_name.clone(), method.clone());
                        }
                    }
                    if let Some(states) = &dynamic_model.states {
                        if base.states.as_ref() != Some(states) {
                            tracing::debug!(model = %model_name, "merge: states updated from dynamic");
                        }
                        base.states = Some(states.clone());
                    }
                    if dynamic_model.has_chatter {
                        base.has_chatter = true;
                    }
                    for parent in &dynamic_model.parent_models {
                        if !base.parent_models.contains(parent) {
                            base.parent_models.push(parent.clone());
                        }
                    }
                }
                None => {
                    tracing::debug!(model = %model_name, "merge: new model from dynamic");
                    merged
                        .models
                        .insert(model_name.clone(), dynamic_model.clone());
                }
            }
        }

        merged.update_counts();
        self.install(merged.clone());
        merged
    }

    fn install(&self, registry: Registry) {
        *self.registry.write().expect("registry lock") = registry;
        self.existence.lock().expect("existence lock").clear();
    }
}

async fn introspect_model(
    backend: &dyn Backend,
    model: &str,
    meta: Option<&Map<String, Value>>,
) -> Option<ModelInfo> {
    let mut kwargs = Map::new();
    kwargs.insert("attributes".to_owned(), json!(FIELD_ATTRIBUTES));
    let raw = match backend
        .execute_kw(model, "fields_get", Vec::new(), kwargs, None)
        .await
    {
        Ok(Value::Object(map)) => map,
        Ok(_) => return None,
        Err(e) => {
            tracing::warn!(model, error = %e, "failed to introspect model");
            return None;
        }
    };

    let mut fields = BTreeMap::new();
    for (name, data) in &raw {
        let selection = data.get("selection").and_then(Value::as_array).map(|sel| {
            sel.iter()
                .filter_map(|pair| {
                    let pair = pair.as_array()?;
                    Some((
                        value_to_string(pair.first()?),
                        value_to_string(pair.get(1)?),
                    ))
                })
                .collect::<Vec<_>>()
        });
        fields.insert(
            name.clone(),
            FieldInfo {
                name: name.clone(),
                label: data
                    .get("string")
                    .and_then(Value::as_str)
                    .unwrap_or(name)
                    .to_owned(),
                field_type: data
                    .get("type")
                    .and_then(Value::as_str)
                    .map_or(FieldType::Char, FieldType::parse),
                required: data.get("required").and_then(Value::as_bool).unwrap_or(false),
                readonly: data.get("readonly").and_then(Value::as_bool).unwrap_or(false),
                store: data.get("store").and_then(Value::as_bool).unwrap_or(true),
                help: data
                    .get("help")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned),
                relation: data
                    .get("relation")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned),
                selection: selection.filter(|s| !s.is_empty()),
                default: None,
                groups: None,
                compute: false,
                depends: None,
            },
        );
    }

    let states = fields
        .get("state")
        .and_then(|f: &FieldInfo| f.selection.clone());
    let has_chatter = fields.contains_key("message_ids");
    let mut parent_models = Vec::new();
    if has_chatter {
        parent_models.push("mail.thread".to_owned());
    }
    if fields.contains_key("activity_ids") {
        parent_models.push("mail.activity.mixin".to_owned());
    }

    Some(ModelInfo {
        model: model.to_owned(),
        name: meta
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .unwrap_or(model)
            .to_owned(),
        description: meta
            .and_then(|m| m.get("info"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_owned),
        transient: meta
            .and_then(|m| m.get("transient"))
            .and_then(Value::as_bool)
            .unwrap_or(false),
        fields,
        methods: BTreeMap::new(),
        states,
        parent_models,
        has_chatter,
    })
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
