//! Response normalization
//!
//! Applied to every record before it leaves a tool: relational `[id, name]`
//! pairs become `{id, name}` objects, the backend's `false` empty markers
//! become `""` or `null` by field kind, datetimes are reshaped to RFC 3339,
//! binary payloads are dropped unless requested, and HTML is stripped to
//! plain text. Normalization is idempotent.

use std::sync::OnceLock;

use odoo_mcp_config::DisplayConfig;
use odoo_mcp_registry::{FieldType, ModelInfo};
use regex::Regex;
use serde_json::{Map, Value, json};

fn datetime_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{4}-\d{2}-\d{2}) (\d{2}:\d{2}:\d{2})$").expect("valid datetime regex")
    })
}

/// Normalize a batch of records in place
pub fn normalize_records(
    records: &mut [Map<String, Value>],
    model: Option<&ModelInfo>,
    display: &DisplayConfig,
    requested_fields: Option<&[&str]>,
) {
    for record in records {
        normalize_record(record, model, display, requested_fields);
    }
}

/// Normalize one record in place
pub fn normalize_record(
    record: &mut Map<String, Value>,
    model: Option<&ModelInfo>,
    display: &DisplayConfig,
    requested_fields: Option<&[&str]>,
) {
    let mut binary_fields: Vec<String> = Vec::new();

    for (key, value) in record.iter_mut() {
        let field_type = model
            .and_then(|m| m.fields.get(key))
            .map(|f| f.field_type);

        // Binary fields are dropped unless the caller asked for them
        if field_type == Some(FieldType::Binary)
            && !requested_fields.is_some_and(|fields| fields.contains(&key.as_str()))
        {
            binary_fields.push(key.clone());
            continue;
        }

        normalize_value(value, field_type, display);
    }

    for key in binary_fields {
        record.remove(&key);
    }
}

fn normalize_value(value: &mut Value, field_type: Option<FieldType>, display: &DisplayConfig) {
    // Relational [id, name] pair -> {id, name}
    if display.normalize_relational
        && let Value::Array(pair) = &*value
        && pair.len() == 2
        && pair[0].is_i64()
        && pair[1].is_string()
        && field_type.is_none_or(|t| t == FieldType::Many2one || t == FieldType::Reference)
    {
        *value = json!({"id": pair[0], "name": pair[1]});
        return;
    }

    // The backend's false empty marker, shaped by field kind
    if *value == Value::Bool(false) {
        match field_type {
            Some(FieldType::Char | FieldType::Text | FieldType::Html) => {
                *value = Value::String(String::new());
            }
            Some(
                FieldType::Date
                | FieldType::Datetime
                | FieldType::Many2one
                | FieldType::Reference,
            ) => {
                *value = Value::Null;
            }
            _ => {}
        }
        return;
    }

    if let Value::String(s) = value {
        // "YYYY-MM-DD HH:MM:SS" -> "YYYY-MM-DDTHH:MM:SSZ"
        if let Some(caps) = datetime_re().captures(s) {
            *s = format!("{}T{}Z", &caps[1], &caps[2]);
            return;
        }
        if display.strip_html && field_type == Some(FieldType::Html) {
            *s = strip_html(s);
        }
    }
}

/// Strip HTML to plain text: block elements become newlines, tags are
/// removed, entities are decoded
pub fn strip_html(html: &str) -> String {
    static BREAKS: OnceLock<Regex> = OnceLock::new();
    static TAGS: OnceLock<Regex> = OnceLock::new();

    if html.is_empty() {
        return String::new();
    }

    let breaks = BREAKS.get_or_init(|| {
        Regex::new(r"(?i)<br\s*/?>|</p>|</div>|</li>|</tr>").expect("valid break regex")
    });
    let tags = TAGS.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid tag regex"));

    let text = breaks.replace_all(html, "\n");
    let text = tags.replace_all(&text, "");
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .trim()
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use odoo_mcp_registry::FieldInfo;
    use std::collections::BTreeMap;

    fn display() -> DisplayConfig {
        DisplayConfig::default()
    }

    fn model_with(fields: &[(&str, FieldType)]) -> ModelInfo {
        ModelInfo {
            model: "test.model".to_owned(),
            name: "Test".to_owned(),
            description: None,
            transient: false,
            fields: fields
                .iter()
                .map(|(name, field_type)| {
                    (
                        (*name).to_owned(),
                        FieldInfo {
                            name: (*name).to_owned(),
                            label: (*name).to_owned(),
                            field_type: *field_type,
                            required: false,
                            readonly: false,
                            store: true,
                            help: None,
                            relation: None,
                            selection: None,
                            default: None,
                            groups: None,
                            compute: false,
                            depends: None,
                        },
                    )
                })
                .collect(),
            methods: BTreeMap::new(),
            states: None,
            parent_models: Vec::new(),
            has_chatter: false,
        }
    }

    fn record(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn relational_pair_becomes_object() {
        let mut rec = record(&[("partner_id", json!([7, "Acme"]))]);
        normalize_record(&mut rec, None, &display(), None);
        assert_eq!(rec["partner_id"], json!({"id": 7, "name": "Acme"}));
    }

    #[test]
    fn false_markers_shaped_by_field_kind() {
        let model = model_with(&[
            ("name", FieldType::Char),
            ("date_order", FieldType::Datetime),
            ("partner_id", FieldType::Many2one),
            ("active", FieldType::Boolean),
        ]);
        let mut rec = record(&[
            ("name", json!(false)),
            ("date_order", json!(false)),
            ("partner_id", json!(false)),
            ("active", json!(false)),
        ]);
        normalize_record(&mut rec, Some(&model), &display(), None);
        assert_eq!(rec["name"], json!(""));
        assert_eq!(rec["date_order"], Value::Null);
        assert_eq!(rec["partner_id"], Value::Null);
        assert_eq!(rec["active"], json!(false));
    }

    #[test]
    fn datetimes_become_rfc3339() {
        let mut rec = record(&[("create_date", json!("2024-03-01 14:30:00"))]);
        normalize_record(&mut rec, None, &display(), None);
        assert_eq!(rec["create_date"], json!("2024-03-01T14:30:00Z"));
        // Plain dates stay verbatim
        let mut rec = record(&[("date", json!("2024-03-01"))]);
        normalize_record(&mut rec, None, &display(), None);
        assert_eq!(rec["date"], json!("2024-03-01"));
    }

    #[test]
    fn binary_dropped_unless_requested() {
        let model = model_with(&[("datas", FieldType::Binary), ("name", FieldType::Char)]);
        let mut rec = record(&[("datas", json!("QUJD")), ("name", json!("file.pdf"))]);
        normalize_record(&mut rec, Some(&model), &display(), None);
        assert!(!rec.contains_key("datas"));
        assert!(rec.contains_key("name"));

        let mut rec = record(&[("datas", json!("QUJD"))]);
        normalize_record(&mut rec, Some(&model), &display(), Some(&["datas"]));
        assert_eq!(rec["datas"], json!("QUJD"));
    }

    #[test]
    fn html_stripped_to_text() {
        let model = model_with(&[("note", FieldType::Html)]);
        let mut rec = record(&[(
            "note",
            json!("<p>First line</p><p>Second &amp; third</p>"),
        )]);
        normalize_record(&mut rec, Some(&model), &display(), None);
        assert_eq!(rec["note"], json!("First line\nSecond & third"));
    }

    #[test]
    fn normalization_is_idempotent() {
        let model = model_with(&[
            ("name", FieldType::Char),
            ("note", FieldType::Html),
            ("partner_id", FieldType::Many2one),
            ("date_order", FieldType::Datetime),
        ]);
        let mut rec = record(&[
            ("name", json!(false)),
            ("note", json!("<b>Bold</b> move")),
            ("partner_id", json!([3, "Partner"])),
            ("date_order", json!("2024-01-05 09:00:00")),
        ]);
        normalize_record(&mut rec, Some(&model), &display(), None);
        let once = rec.clone();
        normalize_record(&mut rec, Some(&model), &display(), None);
        assert_eq!(rec, once);
    }

    #[test]
    fn strip_html_handles_entities_and_blocks() {
        assert_eq!(strip_html(""), "");
        assert_eq!(strip_html("plain"), "plain");
        assert_eq!(
            strip_html("a&nbsp;&lt;b&gt;&quot;c&quot;&#39;d&#39;"),
            "a <b>\"c\"'d'"
        );
        assert_eq!(strip_html("line1<br/>line2<br>line3"), "line1\nline2\nline3");
    }
}
