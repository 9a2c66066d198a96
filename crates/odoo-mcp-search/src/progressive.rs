//! Progressive deep search
//!
//! Up to five levels against a target model (or the default catalog),
//! stopping at the first level that yields results unless exhaustive mode
//! is on. The response carries a transparent search log, the depth
//! reached, the strategies used, and concrete next-step suggestions.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use odoo_mcp_connection::Backend;
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::domain::build_multi_word_ilike_domain;

/// Per-model search tuning
#[derive(Debug, Clone)]
pub struct ModelSearchConfig {
    pub model: String,
    pub name_field: String,
    pub search_fields: Vec<String>,
    pub deep_search_fields: Vec<String>,
    pub default_fields: Vec<String>,
    pub has_chatter: bool,
    pub related_models: Vec<String>,
}

struct ConfigRow {
    model: &'static str,
    name_field: &'static str,
    search_fields: &'static [&'static str],
    deep_search_fields: &'static [&'static str],
    default_fields: &'static [&'static str],
    has_chatter: bool,
    related_models: &'static [&'static str],
}

/// The shipped per-model catalog
const SEARCH_CONFIGS: &[ConfigRow] = &[
    ConfigRow {
        model: "res.partner",
        name_field: "name",
        search_fields: &["name", "display_name"],
        deep_search_fields: &[
            "email", "phone", "mobile", "vat", "ref", "website", "comment", "street", "city",
        ],
        default_fields: &["id", "name", "email", "phone", "is_company", "city", "country_id"],
        has_chatter: true,
        related_models: &["sale.order", "account.move", "crm.lead", "helpdesk.ticket"],
    },
    ConfigRow {
        model: "sale.order",
        name_field: "name",
        search_fields: &["name", "client_order_ref"],
        deep_search_fields: &["note", "origin"],
        default_fields: &["id", "name", "partner_id", "state", "amount_total", "date_order"],
        has_chatter: true,
        related_models: &["res.partner"],
    },
    ConfigRow {
        model: "account.move",
        name_field: "name",
        search_fields: &["name", "ref", "payment_reference"],
        deep_search_fields: &["narration"],
        default_fields: &[
            "id",
            "name",
            "partner_id",
            "move_type",
            "state",
            "amount_total",
            "invoice_date",
        ],
        has_chatter: true,
        related_models: &["res.partner"],
    },
    ConfigRow {
        model: "crm.lead",
        name_field: "name",
        search_fields: &["name", "contact_name", "partner_name"],
        deep_search_fields: &["email_from", "phone", "description"],
        default_fields: &["id", "name", "partner_id", "stage_id", "expected_revenue", "user_id"],
        has_chatter: true,
        related_models: &["res.partner"],
    },
    ConfigRow {
        model: "helpdesk.ticket",
        name_field: "name",
        search_fields: &["name"],
        deep_search_fields: &["description"],
        default_fields: &["id", "name", "partner_id", "stage_id", "user_id", "team_id", "priority"],
        has_chatter: true,
        related_models: &["res.partner"],
    },
    ConfigRow {
        model: "product.product",
        name_field: "name",
        search_fields: &["name", "default_code"],
        deep_search_fields: &["barcode", "description", "description_sale"],
        default_fields: &["id", "name", "default_code", "list_price", "qty_available", "type"],
        has_chatter: false,
        related_models: &[],
    },
    ConfigRow {
        model: "project.task",
        name_field: "name",
        search_fields: &["name"],
        deep_search_fields: &["description"],
        default_fields: &["id", "name", "project_id", "stage_id", "user_ids", "date_deadline", "priority"],
        has_chatter: true,
        related_models: &["project.project"],
    },
    ConfigRow {
        model: "stock.picking",
        name_field: "name",
        search_fields: &["name", "origin"],
        deep_search_fields: &["note"],
        default_fields: &["id", "name", "partner_id", "state", "picking_type_id", "scheduled_date"],
        has_chatter: true,
        related_models: &["res.partner"],
    },
];

/// Config for a model, falling back to name-only ilike for unlisted models
pub fn search_config_for(model: &str) -> ModelSearchConfig {
    let owned = |items: &[&str]| items.iter().map(|&s| s.to_owned()).collect::<Vec<_>>();
    SEARCH_CONFIGS
        .iter()
        .find(|row| row.model == model)
        .map_or_else(
            || ModelSearchConfig {
                model: model.to_owned(),
                name_field: "name".to_owned(),
                search_fields: vec!["name".to_owned()],
                deep_search_fields: Vec::new(),
                default_fields: vec!["id".to_owned(), "name".to_owned()],
                has_chatter: false,
                related_models: Vec::new(),
            },
            |row| ModelSearchConfig {
                model: row.model.to_owned(),
                name_field: row.name_field.to_owned(),
                search_fields: owned(row.search_fields),
                deep_search_fields: owned(row.deep_search_fields),
                default_fields: owned(row.default_fields),
                has_chatter: row.has_chatter,
                related_models: owned(row.related_models),
            },
        )
}

fn link_field_for(related_model: &str) -> Option<&'static str> {
    match related_model {
        "res.partner" => Some("partner_id"),
        "project.project" => Some("project_id"),
        "sale.order" => Some("order_id"),
        "account.move" => Some("move_id"),
        _ => None,
    }
}

/// One step of the transparent search log
#[derive(Debug, Clone, Serialize)]
pub struct SearchLogEntry {
    pub level: u32,
    pub strategy: &'static str,
    pub model: String,
    pub results_found: usize,
}

/// Deep search request
#[derive(Debug, Clone)]
pub struct DeepSearchParams {
    pub query: String,
    pub model: Option<String>,
    pub max_depth: u32,
    pub limit: u32,
    pub fields: Option<Vec<String>>,
    pub exhaustive: bool,
}

/// Deep search response
#[derive(Debug, Serialize)]
pub struct DeepSearchResult {
    pub query: String,
    pub results: BTreeMap<String, Vec<Map<String, Value>>>,
    pub search_log: Vec<SearchLogEntry>,
    pub depth_reached: u32,
    pub total_results: usize,
    pub strategies_used: Vec<String>,
    pub suggestions: Vec<String>,
}

/// The search engine
pub struct ProgressiveSearch {
    backend: Arc<dyn Backend>,
}

impl ProgressiveSearch {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub async fn search(&self, params: DeepSearchParams) -> DeepSearchResult {
        let max_depth = params.max_depth.clamp(1, 5);
        let limit = params.limit.clamp(1, 100);

        let models: Vec<String> = params.model.as_ref().map_or_else(
            || SEARCH_CONFIGS.iter().map(|r| r.model.to_owned()).collect(),
            |m| vec![m.clone()],
        );

        let mut results: BTreeMap<String, Vec<Map<String, Value>>> = BTreeMap::new();
        let mut search_log = Vec::new();
        let mut strategies_used = BTreeSet::new();
        let mut depth_reached = 0;

        for model in &models {
            let config = search_config_for(model);
            let fields: Vec<&str> = params.fields.as_ref().map_or_else(
                || config.default_fields.iter().map(String::as_str).collect(),
                |f| f.iter().map(String::as_str).collect(),
            );

            let mut model_results: Vec<Map<String, Value>> = Vec::new();
            let mut seen_ids: HashSet<i64> = HashSet::new();

            for level in 1..=max_depth {
                depth_reached = depth_reached.max(level);

                let (records, strategy) = self
                    .run_level(level, model, &config, &params.query, &fields, limit)
                    .await;
                search_log.push(SearchLogEntry {
                    level,
                    strategy,
                    model: model.clone(),
                    results_found: records.len(),
                });
                strategies_used.insert(strategy.to_owned());

                for record in records {
                    let id = record.get("id").and_then(Value::as_i64).unwrap_or(0);
                    if seen_ids.insert(id) {
                        model_results.push(record);
                    }
                }

                if !model_results.is_empty() && !params.exhaustive {
                    break;
                }
            }

            if !model_results.is_empty() {
                model_results.truncate(limit as usize);
                results.insert(model.clone(), model_results);
            }
        }

        let total_results = results.values().map(Vec::len).sum();
        let suggestions = generate_suggestions(&params.query, &results, &strategies_used);

        DeepSearchResult {
            query: params.query,
            results,
            search_log,
            depth_reached,
            total_results,
            strategies_used: strategies_used.into_iter().collect(),
            suggestions,
        }
    }

    async fn run_level(
        &self,
        level: u32,
        model: &str,
        config: &ModelSearchConfig,
        query: &str,
        fields: &[&str],
        limit: u32,
    ) -> (Vec<Map<String, Value>>, &'static str) {
        match level {
            1 => (
                self.do_search(model, json!([[config.name_field, "=", query]]), fields, limit)
                    .await,
                "exact_match",
            ),
            2 => {
                let search_fields: Vec<&str> =
                    config.search_fields.iter().map(String::as_str).collect();
                let domain = build_multi_word_ilike_domain(&search_fields, query);
                if domain.as_array().is_some_and(Vec::is_empty) {
                    return (Vec::new(), "standard_ilike");
                }
                (
                    self.do_search(model, domain, fields, limit).await,
                    "standard_ilike",
                )
            }
            3 => (
                self.level3_extended(model, config, query, fields, limit).await,
                "extended_fields",
            ),
            4 => (
                self.level4_related(model, config, query, fields, limit).await,
                "related_models",
            ),
            5 => (
                self.level5_chatter(model, config, query, fields, limit).await,
                "chatter_search",
            ),
            _ => (Vec::new(), "unknown"),
        }
    }

    /// Level 3: ilike across the deep-search fields that actually exist
    async fn level3_extended(
        &self,
        model: &str,
        config: &ModelSearchConfig,
        query: &str,
        fields: &[&str],
        limit: u32,
    ) -> Vec<Map<String, Value>> {
        if config.deep_search_fields.is_empty() {
            return Vec::new();
        }

        let valid = self
            .verify_fields(model, &config.deep_search_fields)
            .await;
        if valid.is_empty() {
            return Vec::new();
        }

        let valid_refs: Vec<&str> = valid.iter().map(String::as_str).collect();
        let domain = build_multi_word_ilike_domain(&valid_refs, query);
        if domain.as_array().is_some_and(Vec::is_empty) {
            return Vec::new();
        }
        self.do_search(model, domain, fields, limit).await
    }

    /// Level 4: find matches in related models, expand contact networks,
    /// then filter the primary model by the expanded IDs
    async fn level4_related(
        &self,
        model: &str,
        config: &ModelSearchConfig,
        query: &str,
        fields: &[&str],
        limit: u32,
    ) -> Vec<Map<String, Value>> {
        let mut all_records = Vec::new();

        for related_model in &config.related_models {
            let related_config = search_config_for(related_model);
            let search_fields: Vec<&str> = related_config
                .search_fields
                .iter()
                .map(String::as_str)
                .collect();
            let domain = build_multi_word_ilike_domain(&search_fields, query);
            if domain.as_array().is_some_and(Vec::is_empty) {
                continue;
            }

            let Ok(related_rows) = self
                .backend
                .search_read(
                    related_model,
                    domain,
                    &["id", "is_company", "parent_id"],
                    Some(limit),
                    0,
                    None,
                )
                .await
            else {
                continue;
            };
            if related_rows.is_empty() {
                continue;
            }

            let related_ids: Vec<i64> = related_rows
                .iter()
                .filter_map(|row| row.get("id").and_then(Value::as_i64))
                .collect();
            let expanded = self
                .expand_partner_ids(related_model, &related_rows, related_ids)
                .await;
            if expanded.is_empty() {
                continue;
            }

            let Some(link_field) = link_field_for(related_model) else {
                continue;
            };
            let records = self
                .do_search(model, json!([[link_field, "in", expanded]]), fields, limit)
                .await;
            all_records.extend(records);
        }

        all_records
    }

    /// Level 5: full-text search of chatter messages, then read the records
    /// the matching messages hang off
    async fn level5_chatter(
        &self,
        model: &str,
        config: &ModelSearchConfig,
        query: &str,
        fields: &[&str],
        limit: u32,
    ) -> Vec<Map<String, Value>> {
        if !config.has_chatter {
            return Vec::new();
        }

        let message_domain = json!([
            ["model", "=", model],
            ["body", "ilike", query],
            ["message_type", "in", ["email", "comment"]],
        ]);
        let Ok(messages) = self
            .backend
            .search_read("mail.message", message_domain, &["res_id"], Some(limit), 0, None)
            .await
        else {
            return Vec::new();
        };

        let mut record_ids: Vec<i64> = Vec::new();
        let mut seen = HashSet::new();
        for message in &messages {
            if let Some(res_id) = message.get("res_id").and_then(Value::as_i64)
                && res_id > 0
                && seen.insert(res_id)
            {
                record_ids.push(res_id);
            }
        }
        if record_ids.is_empty() {
            return Vec::new();
        }
        record_ids.truncate(limit as usize);

        let mut kwargs = Map::new();
        kwargs.insert("fields".to_owned(), json!(fields));
        match self
            .backend
            .execute_kw(model, "read", vec![json!(record_ids)], kwargs, None)
            .await
        {
            Ok(Value::Array(rows)) => rows
                .into_iter()
                .filter_map(|row| match row {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    async fn do_search(
        &self,
        model: &str,
        domain: Value,
        fields: &[&str],
        limit: u32,
    ) -> Vec<Map<String, Value>> {
        match self
            .backend
            .search_read(model, domain, fields, Some(limit), 0, None)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::debug!(model, error = %e, "search level failed");
                Vec::new()
            }
        }
    }

    /// Best-effort check of which candidate fields exist on the model
    async fn verify_fields(&self, model: &str, candidates: &[String]) -> Vec<String> {
        let mut kwargs = Map::new();
        kwargs.insert("attributes".to_owned(), json!(["type"]));
        match self
            .backend
            .execute_kw(model, "fields_get", Vec::new(), kwargs, None)
            .await
        {
            Ok(Value::Object(existing)) => candidates
                .iter()
                .filter(|f| existing.contains_key(*f))
                .cloned()
                .collect(),
            _ => candidates.to_vec(),
        }
    }

    /// Company partners expand to their child contacts; individuals expand
    /// to their parent and siblings. Non-partner related models pass their
    /// IDs through unexpanded.
    async fn expand_partner_ids(
        &self,
        related_model: &str,
        related_rows: &[Map<String, Value>],
        related_ids: Vec<i64>,
    ) -> Vec<i64> {
        if related_model != "res.partner" {
            return related_ids;
        }

        let mut expanded: BTreeSet<i64> = related_ids.into_iter().collect();

        for row in related_rows {
            let id = row.get("id").and_then(Value::as_i64).unwrap_or(0);
            let is_company = row
                .get("is_company")
                .and_then(Value::as_bool)
                .unwrap_or(false);

            if is_company {
                expanded.extend(self.partner_children(id).await);
            } else if let Some(parent_id) = extract_relation_id(row.get("parent_id")) {
                expanded.insert(parent_id);
                expanded.extend(self.partner_children(parent_id).await);
            }
        }

        expanded.into_iter().collect()
    }

    async fn partner_children(&self, parent_id: i64) -> Vec<i64> {
        let mut kwargs = Map::new();
        kwargs.insert("limit".to_owned(), json!(100));
        match self
            .backend
            .execute_kw(
                "res.partner",
                "search",
                vec![json!([["parent_id", "=", parent_id]])],
                kwargs,
                None,
            )
            .await
        {
            Ok(Value::Array(ids)) => ids.iter().filter_map(Value::as_i64).collect(),
            _ => Vec::new(),
        }
    }
}

/// `parent_id` can arrive as `[id, name]`, a bare id, or false
fn extract_relation_id(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::Array(pair) => pair.first().and_then(Value::as_i64),
        Value::Object(map) => map.get("id").and_then(Value::as_i64),
        _ => None,
    }
}

fn generate_suggestions(
    query: &str,
    results: &BTreeMap<String, Vec<Map<String, Value>>>,
    strategies_used: &BTreeSet<String>,
) -> Vec<String> {
    let mut suggestions = Vec::new();

    if results.is_empty() {
        suggestions.push(format!(
            "No results found for '{query}'. Try broader search terms or search a different model."
        ));
        suggestions.push(
            "Use odoo_core_search_read with an ilike domain to search specific fields.".to_owned(),
        );
        return suggestions;
    }

    if let Some(partners) = results.get("res.partner")
        && let Some(first) = partners.first()
    {
        let id = first.get("id").and_then(Value::as_i64).unwrap_or(0);
        let name = first
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(query);
        suggestions.push(format!("Found partner '{name}'."));
        suggestions.push(format!(
            "Use odoo_core_search_read with domain [[\"partner_id\", \"=\", {id}]] to find more related records."
        ));
    }

    if strategies_used.contains("related_models") {
        suggestions.push("Results include records found via related model expansion.".to_owned());
    }
    if strategies_used.contains("chatter_search") {
        suggestions.push(
            "Some results matched via chatter message content, not record fields.".to_owned(),
        );
    }
    if results.len() > 1 {
        suggestions.push(format!(
            "Results found across models: {}.",
            results.keys().cloned().collect::<Vec<_>>().join(", ")
        ));
    }

    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use odoo_mcp_core::OdooError;

    /// Scripted backend: routes calls through a closure
    struct FakeBackend {
        respond: Box<dyn Fn(&str, &str, &Value) -> Value + Send + Sync>,
    }

    #[async_trait]
    impl Backend for FakeBackend {
        async fn execute_kw(
            &self,
            model: &str,
            method: &str,
            args: Vec<Value>,
            _kwargs: Map<String, Value>,
            _context: Option<&Map<String, Value>>,
        ) -> Result<Value, OdooError> {
            let first = args.first().cloned().unwrap_or(Value::Null);
            Ok((self.respond)(model, method, &first))
        }

        async fn search_read(
            &self,
            model: &str,
            domain: Value,
            _fields: &[&str],
            _limit: Option<u32>,
            _offset: u32,
            _order: Option<&str>,
        ) -> Result<Vec<Map<String, Value>>, OdooError> {
            let value = (self.respond)(model, "search_read", &domain);
            Ok(value
                .as_array()
                .map(|rows| {
                    rows.iter()
                        .filter_map(|row| row.as_object().cloned())
                        .collect()
                })
                .unwrap_or_default())
        }

        async fn search_count(&self, model: &str, domain: Value) -> Result<i64, OdooError> {
            Ok((self.respond)(model, "search_count", &domain)
                .as_i64()
                .unwrap_or(0))
        }
    }

    fn params(query: &str, model: &str, max_depth: u32) -> DeepSearchParams {
        DeepSearchParams {
            query: query.to_owned(),
            model: Some(model.to_owned()),
            max_depth,
            limit: 20,
            fields: None,
            exhaustive: false,
        }
    }

    #[tokio::test]
    async fn stops_at_first_level_with_results() {
        let backend = FakeBackend {
            respond: Box::new(|model, method, domain| {
                if model == "sale.order" && method == "search_read" {
                    let text = domain.to_string();
                    if text.contains("\"=\"") {
                        return json!([{"id": 7, "name": "S00007"}]);
                    }
                }
                json!([])
            }),
        };
        let engine = ProgressiveSearch::new(Arc::new(backend));
        let result = engine.search(params("S00007", "sale.order", 3)).await;

        assert_eq!(result.depth_reached, 1);
        assert_eq!(result.total_results, 1);
        assert_eq!(result.strategies_used, vec!["exact_match".to_owned()]);
        assert_eq!(result.search_log.len(), 1);
        assert_eq!(result.search_log[0].results_found, 1);
    }

    #[tokio::test]
    async fn related_expansion_reaches_level_four() {
        // No direct matches on sale.order; "acme" matches partner 1, a
        // company with child contact 2; orders for partners [1, 2] exist.
        let backend = FakeBackend {
            respond: Box::new(|model, method, first| {
                match (model, method) {
                    ("sale.order", "search_read") => {
                        if first.to_string().contains("partner_id") {
                            json!([
                                {"id": 31, "name": "S00031", "partner_id": [1, "Acme"]},
                                {"id": 32, "name": "S00032", "partner_id": [2, "Acme Contact"]},
                            ])
                        } else {
                            json!([])
                        }
                    }
                    ("sale.order", "fields_get") => json!({
                        "note": {"type": "html"},
                        "origin": {"type": "char"},
                    }),
                    ("res.partner", "search_read") => json!([
                        {"id": 1, "is_company": true, "parent_id": false},
                    ]),
                    ("res.partner", "search") => json!([2]),
                    _ => json!([]),
                }
            }),
        };
        let engine = ProgressiveSearch::new(Arc::new(backend));
        let result = engine.search(params("acme", "sale.order", 5)).await;

        assert_eq!(result.depth_reached, 4);
        assert_eq!(result.total_results, 2);
        assert!(result.strategies_used.contains(&"related_models".to_owned()));
        let log_levels: Vec<u32> = result.search_log.iter().map(|e| e.level).collect();
        assert_eq!(log_levels, vec![1, 2, 3, 4]);
        assert!(
            result
                .suggestions
                .iter()
                .any(|s| s.contains("related model expansion"))
        );
    }

    #[tokio::test]
    async fn chatter_level_reads_matched_records() {
        let backend = FakeBackend {
            respond: Box::new(|model, method, _| match (model, method) {
                ("mail.message", "search_read") => json!([
                    {"res_id": 9}, {"res_id": 9}, {"res_id": 11},
                ]),
                ("helpdesk.ticket", "read") => json!([
                    {"id": 9, "name": "Printer on fire"},
                    {"id": 11, "name": "Printer still on fire"},
                ]),
                ("helpdesk.ticket", "fields_get") => json!({"description": {"type": "html"}}),
                _ => json!([]),
            }),
        };
        let engine = ProgressiveSearch::new(Arc::new(backend));
        let result = engine.search(params("fire", "helpdesk.ticket", 5)).await;

        assert_eq!(result.depth_reached, 5);
        assert_eq!(result.total_results, 2);
        assert!(result.strategies_used.contains(&"chatter_search".to_owned()));
    }

    #[tokio::test]
    async fn exhaustive_mode_runs_all_levels() {
        let backend = FakeBackend {
            respond: Box::new(|model, method, domain| {
                if model == "product.product"
                    && method == "search_read"
                    && domain.to_string().contains("\"=\"")
                {
                    return json!([{"id": 1, "name": "Widget"}]);
                }
                json!([])
            }),
        };
        let engine = ProgressiveSearch::new(Arc::new(backend));
        let mut p = params("Widget", "product.product", 5);
        p.exhaustive = true;
        let result = engine.search(p).await;

        // product.product has no chatter and no related models, but all
        // five levels are attempted and logged
        assert_eq!(result.depth_reached, 5);
        assert_eq!(result.search_log.len(), 5);
        assert_eq!(result.total_results, 1);
    }

    #[tokio::test]
    async fn unlisted_model_falls_back_to_name_search() {
        let config = search_config_for("x.custom.model");
        assert_eq!(config.name_field, "name");
        assert_eq!(config.search_fields, vec!["name".to_owned()]);
        assert!(config.deep_search_fields.is_empty());
        assert!(!config.has_chatter);
    }

    #[test]
    fn relation_id_extraction_forms() {
        assert_eq!(extract_relation_id(Some(&json!(5))), Some(5));
        assert_eq!(extract_relation_id(Some(&json!([5, "Parent"]))), Some(5));
        assert_eq!(extract_relation_id(Some(&json!({"id": 5}))), Some(5));
        assert_eq!(extract_relation_id(Some(&json!(false))), None);
        assert_eq!(extract_relation_id(None), None);
    }
}
