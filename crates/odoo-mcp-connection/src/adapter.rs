//! The wire adapter contract
//!
//! One capability trait over a small primitive set; the convenience calls
//! (`search_read`, `search_count`, `fields_get`) are provided methods that
//! dispatch to `execute_kw`.

use async_trait::async_trait;
use odoo_mcp_core::{OdooError, WireProtocol};
use serde_json::{Map, Value, json};

/// Contract implemented by every wire adapter
///
/// Adapters normalize only at the deserialization level: many-to-one tuples
/// stay as `[id, name]`, dates stay verbatim strings, binary fields are
/// base64 strings. Domain-level normalization happens in the tool layer.
#[async_trait]
pub trait OdooAdapter: Send + Sync {
    /// Which wire protocol this adapter speaks
    fn protocol(&self) -> WireProtocol;

    /// Install the immutable per-connection base context
    ///
    /// Called once before `authenticate`; per-call contexts are merged over
    /// this by shallow overlay at invocation time.
    fn set_base_context(&mut self, context: Map<String, Value>);

    /// Authenticate and return the backend uid
    ///
    /// A uid of 0/false from the backend is an authentication failure.
    async fn authenticate(&mut self, db: &str, login: &str, credential: &str)
    -> Result<i64, OdooError>;

    /// Execute a backend ORM method
    async fn execute_kw(
        &self,
        model: &str,
        method: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
        context: Option<&Map<String, Value>>,
    ) -> Result<Value, OdooError>;

    /// The backend's self-description
    async fn version_info(&self) -> Result<Value, OdooError>;

    /// Release network resources; safe to call on any exit path
    async fn close(&self);

    /// Search and read records
    async fn search_read(
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
            Value::Null | Value::Bool(false) => Ok(Vec::new()),
            other => Err(OdooError::Rpc(odoo_mcp_core::RpcFault::new(format!(
                "unexpected search_read result shape: {other}"
            )))),
        }
    }

    /// Count records matching a domain
    async fn search_count(&self, model: &str, domain: Value) -> Result<i64, OdooError> {
        let result = self
            .execute_kw(model, "search_count", vec![domain], Map::new(), None)
            .await?;
        Ok(result.as_i64().unwrap_or(0))
    }

    /// Field metadata for a model
    async fn fields_get(
        &self,
        model: &str,
        attributes: &[&str],
    ) -> Result<Map<String, Value>, OdooError> {
        let mut kwargs = Map::new();
        if !attributes.is_empty() {
            kwargs.insert("attributes".to_owned(), json!(attributes));
        }
        let result = self
            .execute_kw(model, "fields_get", Vec::new(), kwargs, None)
            .await?;
        match result {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }
}

/// Shallow overlay of a per-call context onto the base context
///
/// The base is never mutated; the call context wins on key conflicts.
pub fn merged_context(
    base: &Map<String, Value>,
    call: Option<&Map<String, Value>>,
) -> Option<Map<String, Value>> {
    match call {
        Some(call) if !base.is_empty() => {
            let mut merged = base.clone();
            for (k, v) in call {
                merged.insert(k.clone(), v.clone());
            }
            Some(merged)
        }
        Some(call) => Some(call.clone()),
        None if !base.is_empty() => Some(base.clone()),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_context_overlays_base() {
        let mut base = Map::new();
        base.insert("lang".to_owned(), json!("en_US"));
        base.insert("tz".to_owned(), json!("UTC"));

        let mut call = Map::new();
        call.insert("lang".to_owned(), json!("pt_PT"));

        let merged = merged_context(&base, Some(&call)).expect("merged");
        assert_eq!(merged["lang"], json!("pt_PT"));
        assert_eq!(merged["tz"], json!("UTC"));
        // base untouched
        assert_eq!(base["lang"], json!("en_US"));
    }

    #[test]
    fn empty_base_passes_call_through() {
        let base = Map::new();
        assert!(merged_context(&base, None).is_none());

        let mut call = Map::new();
        call.insert("active_test".to_owned(), json!(false));
        let merged = merged_context(&base, Some(&call)).expect("merged");
        assert_eq!(merged.len(), 1);
    }
}
