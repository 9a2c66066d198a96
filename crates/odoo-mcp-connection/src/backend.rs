//! Backend surface consumed by the registry, search, resource, and tool
//! layers
//!
//! The manager implements it with health checks and retry; tests substitute
//! scripted fakes.

use async_trait::async_trait;
use odoo_mcp_core::OdooError;
use serde_json::{Map, Value};

use crate::manager::ConnectionManager;

#[async_trait]
pub trait Backend: Send + Sync {
    async fn execute_kw(
        &self,
        model: &str,
        method: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
        context: Option<&Map<String, Value>>,
    ) -> Result<Value, OdooError>;

    async fn search_read(
        &self,
        model: &str,
        domain: Value,
        fields: &[&str],
        limit: Option<u32>,
        offset: u32,
        order: Option<&str>,
    ) -> Result<Vec<Map<String, Value>>, OdooError>;

    async fn search_count(&self, model: &str, domain: Value) -> Result<i64, OdooError>;
}

#[async_trait]
impl Backend for ConnectionManager {
    async fn execute_kw(
        &self,
        model: &str,
        method: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
        context: Option<&Map<String, Value>>,
    ) -> Result<Value, OdooError> {
        Self::execute_kw(self, model, method, args, kwargs, context).await
    }

    async fn search_read(
        &self,
        model: &str,
        domain: Value,
        fields: &[&str],
        limit: Option<u32>,
        offset: u32,
        order: Option<&str>,
    ) -> Result<Vec<Map<String, Value>>, OdooError> {
        Self::search_read(self, model, domain, fields, limit, offset, order).await
    }

    async fn search_count(&self, model: &str, domain: Value) -> Result<i64, OdooError> {
        Self::search_count(self, model, domain).await
    }
}
