//! Registry data model
//!
//! The same shape backs all three construction paths (static file, live
//! introspection, merged), so the whole registry serializes to and from the
//! static JSON format.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Backend field types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Char,
    Text,
    Html,
    Integer,
    Float,
    Monetary,
    Boolean,
    Date,
    Datetime,
    Binary,
    Selection,
    Many2one,
    One2many,
    Many2many,
    Reference,
    /// Dynamic properties (Odoo 17+)
    Properties,
    /// Anything the introspection pass did not recognize
    #[serde(other)]
    Unknown,
}

impl FieldType {
    pub const fn is_relational(self) -> bool {
        matches!(self, Self::Many2one | Self::One2many | Self::Many2many)
    }

    pub fn parse(raw: &str) -> Self {
        serde_json::from_value(Value::String(raw.to_owned())).unwrap_or(Self::Unknown)
    }
}

/// Metadata for a single model field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default = "default_store")]
    pub store: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    /// Target model for relational fields; may point outside the registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<Vec<(String, String)>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<String>,
    #[serde(default)]
    pub compute: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends: Option<Vec<String>>,
}

/// Metadata for a model method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_accepts_kwargs")]
    pub accepts_kwargs: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decorator: Option<String>,
}

/// Metadata for a backend model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub transient: bool,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldInfo>,
    #[serde(default)]
    pub methods: BTreeMap<String, MethodInfo>,
    /// Ordered `(value, label)` pairs of the state selection, when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub states: Option<Vec<(String, String)>>,
    #[serde(default)]
    pub parent_models: Vec<String>,
    #[serde(default)]
    pub has_chatter: bool,
}

/// How a registry snapshot was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryBuildMode {
    Static,
    Dynamic,
    Merged,
}

/// A complete registry snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default)]
    pub models: BTreeMap<String, ModelInfo>,
    #[serde(default)]
    pub version: String,
    pub build_mode: RegistryBuildMode,
    #[serde(default)]
    pub build_timestamp: String,
    #[serde(default)]
    pub model_count: usize,
    #[serde(default)]
    pub field_count: usize,
}

impl Registry {
    pub fn new(build_mode: RegistryBuildMode) -> Self {
        Self {
            models: BTreeMap::new(),
            version: String::new(),
            build_mode,
            build_timestamp: chrono::Utc::now().to_rfc3339(),
            model_count: 0,
            field_count: 0,
        }
    }

    pub fn update_counts(&mut self) {
        self.model_count = self.models.len();
        self.field_count = self.models.values().map(|m| m.fields.len()).sum();
    }
}

fn default_store() -> bool {
    true
}
fn default_accepts_kwargs() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_type_parses_wire_names() {
        assert_eq!(FieldType::parse("many2one"), FieldType::Many2one);
        assert_eq!(FieldType::parse("char"), FieldType::Char);
        assert_eq!(FieldType::parse("properties"), FieldType::Properties);
        assert_eq!(FieldType::parse("something_new"), FieldType::Unknown);
    }

    #[test]
    fn relational_classification() {
        assert!(FieldType::Many2one.is_relational());
        assert!(FieldType::One2many.is_relational());
        assert!(FieldType::Many2many.is_relational());
        assert!(!FieldType::Char.is_relational());
        assert!(!FieldType::Reference.is_relational());
    }

    #[test]
    fn registry_serde_round_trip() {
        let mut registry = Registry::new(RegistryBuildMode::Static);
        registry.models.insert(
            "sale.order".to_owned(),
            ModelInfo {
                model: "sale.order".to_owned(),
                name: "Sales Order".to_owned(),
                description: None,
                transient: false,
                fields: BTreeMap::from([(
                    "state".to_owned(),
                    FieldInfo {
                        name: "state".to_owned(),
                        label: "Status".to_owned(),
                        field_type: FieldType::Selection,
                        required: false,
                        readonly: true,
                        store: true,
                        help: None,
                        relation: None,
                        selection: Some(vec![
                            ("draft".to_owned(), "Quotation".to_owned()),
                            ("sale".to_owned(), "Sales Order".to_owned()),
                        ]),
                        default: None,
                        groups: None,
                        compute: false,
                        depends: None,
                    },
                )]),
                methods: BTreeMap::new(),
                states: Some(vec![("draft".to_owned(), "Quotation".to_owned())]),
                parent_models: vec!["mail.thread".to_owned()],
                has_chatter: true,
            },
        );
        registry.update_counts();

        let json = serde_json::to_string(&registry).expect("serializes");
        let back: Registry = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(back.model_count, 1);
        assert_eq!(back.field_count, 1);
        let model = &back.models["sale.order"];
        assert!(model.has_chatter);
        assert_eq!(
            model.fields["state"].selection.as_ref().map(Vec::len),
            Some(2)
        );
    }
}
