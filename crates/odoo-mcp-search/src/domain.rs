//! Domain validation and construction
//!
//! Domains are prefix-notation filter expressions: condition triples plus
//! the logical operators `&`, `|`, `!`. Validation errors carry an
//! actionable suggestion; the builder is internal plumbing, not a tool.

use serde_json::{Value, json};
use thiserror::Error;

/// Comparison operators the backend accepts
const VALID_OPERATORS: &[&str] = &[
    "=", "!=", ">", ">=", "<", "<=", "like", "not like", "ilike", "not ilike", "=like", "=ilike",
    "in", "not in", "child_of", "parent_of",
];

const LOGICAL_OPERATORS: &[&str] = &["&", "|", "!"];

const LIST_OPERATORS: &[&str] = &["in", "not in"];

/// A malformed domain, with guidance on how to fix it
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DomainError {
    pub message: String,
    pub suggestion: String,
}

impl DomainError {
    fn new(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }
}

/// Validate a domain expression
///
/// Each element must be a `[field, operator, value]` triple or a logical
/// operator; `in`/`not in` require list values; the prefix notation must be
/// well-formed (every operator finds its operands). The empty domain is
/// valid and matches everything.
pub fn validate_domain(domain: &Value) -> Result<(), DomainError> {
    let Value::Array(elements) = domain else {
        return Err(DomainError::new(
            "Domain must be a list.",
            "Wrap your domain in a list, e.g. [[\"field\", \"=\", value]].",
        ));
    };

    for (index, element) in elements.iter().enumerate() {
        match element {
            Value::String(op) => {
                if !LOGICAL_OPERATORS.contains(&op.as_str()) {
                    return Err(DomainError::new(
                        format!("Invalid logical operator '{op}'."),
                        format!(
                            "Valid logical operators are: {}.",
                            LOGICAL_OPERATORS.join(", ")
                        ),
                    ));
                }
            }
            Value::Array(parts) => validate_condition(parts)?,
            other => {
                return Err(DomainError::new(
                    format!("Invalid domain element at index {index}: {other}."),
                    "Each element must be a condition [field, operator, value] or a logical operator ('&', '|', '!').",
                ));
            }
        }
    }

    validate_prefix_notation(elements)
}

fn validate_condition(parts: &[Value]) -> Result<(), DomainError> {
    if parts.len() != 3 {
        return Err(DomainError::new(
            format!(
                "Domain condition must have exactly 3 elements, got {}.",
                parts.len()
            ),
            "Each condition should be [field, operator, value].",
        ));
    }

    let Some(field) = parts[0].as_str() else {
        return Err(DomainError::new(
            format!("Field name must be a string, got {}.", parts[0]),
            "The first element of a condition is the field name.",
        ));
    };
    let Some(operator) = parts[1].as_str() else {
        return Err(DomainError::new(
            format!("Operator must be a string, got {}.", parts[1]),
            "The second element of a condition is the operator.",
        ));
    };

    if !VALID_OPERATORS.contains(&operator) {
        let mut sorted = VALID_OPERATORS.to_vec();
        sorted.sort_unstable();
        return Err(DomainError::new(
            format!("Invalid operator '{operator}'."),
            format!("Valid operators: {}.", sorted.join(", ")),
        ));
    }

    if LIST_OPERATORS.contains(&operator) && !parts[2].is_array() {
        let value = &parts[2];
        let hint = if operator == "in" {
            format!(
                "Change [\"{field}\", \"{operator}\", {value}] to [\"{field}\", \"{operator}\", [{value}]] or use [\"{field}\", \"=\", {value}] for single values."
            )
        } else {
            format!(
                "Change [\"{field}\", \"{operator}\", {value}] to [\"{field}\", \"{operator}\", [{value}]]."
            )
        };
        return Err(DomainError::new(
            format!(
                "Operator '{operator}' requires a list value, got {value}."
            ),
            hint,
        ));
    }

    Ok(())
}

/// Check operand counts for the prefix-notation operators
///
/// Implicit AND joins are fine; only clearly broken prefix notation is
/// rejected.
fn validate_prefix_notation(elements: &[Value]) -> Result<(), DomainError> {
    let mut pos = 0;
    while pos < elements.len() {
        pos = consume_operand(elements, pos)?;
    }
    Ok(())
}

fn consume_operand(elements: &[Value], pos: usize) -> Result<usize, DomainError> {
    let Some(element) = elements.get(pos) else {
        return Err(DomainError::new(
            "Unexpected end of domain: a logical operator is missing its operand(s).",
            "'&' and '|' take two operands, '!' takes one, all in prefix position.",
        ));
    };
    match element.as_str() {
        Some("!") => consume_operand(elements, pos + 1),
        Some("&" | "|") => {
            let next = consume_operand(elements, pos + 1)?;
            consume_operand(elements, next)
        }
        _ => Ok(pos + 1),
    }
}

/// Fluent builder for domains used by the deep search engine
#[derive(Debug, Default)]
pub struct DomainBuilder {
    conditions: Vec<Value>,
}

impl DomainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn equals(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(json!([field, "=", value.into()]));
        self
    }

    #[must_use]
    pub fn contains(mut self, field: &str, value: &str) -> Self {
        self.conditions.push(json!([field, "ilike", value]));
        self
    }

    #[must_use]
    pub fn in_list(mut self, field: &str, values: impl Into<Value>) -> Self {
        self.conditions.push(json!([field, "in", values.into()]));
        self
    }

    /// Combine builders with OR in prefix notation
    pub fn any(builders: impl IntoIterator<Item = Self>) -> Self {
        let conditions: Vec<Value> = builders
            .into_iter()
            .flat_map(|b| b.conditions)
            .collect();
        Self {
            conditions: or_join(conditions),
        }
    }

    pub fn build(self) -> Value {
        Value::Array(self.conditions)
    }
}

/// OR across every whitespace-separated word of `query` in every field
///
/// `(["name", "email"], "john acme")` produces three `|` operators in
/// front of the four ilike conditions.
pub fn build_multi_word_ilike_domain(fields: &[&str], query: &str) -> Value {
    let words: Vec<&str> = query.split_whitespace().collect();
    if words.is_empty() || fields.is_empty() {
        return json!([]);
    }

    let conditions: Vec<Value> = fields
        .iter()
        .flat_map(|field| {
            words
                .iter()
                .map(move |word| json!([field, "ilike", word]))
        })
        .collect();
    Value::Array(or_join(conditions))
}

fn or_join(conditions: Vec<Value>) -> Vec<Value> {
    if conditions.len() <= 1 {
        return conditions;
    }
    let mut out = vec![json!("|"); conditions.len() - 1];
    out.extend(conditions);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_domain_is_valid() {
        assert!(validate_domain(&json!([])).is_ok());
    }

    #[test]
    fn simple_conditions_validate() {
        assert!(validate_domain(&json!([["state", "=", "draft"]])).is_ok());
        assert!(
            validate_domain(&json!([
                ["amount", ">=", 1000],
                ["state", "=", "posted"],
            ]))
            .is_ok()
        );
        assert!(
            validate_domain(&json!([["partner_id.country_id.code", "=", "PT"]])).is_ok()
        );
    }

    #[test]
    fn prefix_or_validates() {
        let domain = json!(["|", ["state", "=", "draft"], ["state", "=", "sent"]]);
        assert!(validate_domain(&domain).is_ok());
    }

    #[test]
    fn negation_validates() {
        assert!(validate_domain(&json!(["!", ["active", "=", false]])).is_ok());
    }

    #[test]
    fn dangling_operator_rejected() {
        let err = validate_domain(&json!(["|", ["state", "=", "draft"]]))
            .expect_err("dangling | must fail");
        assert!(err.message.contains("operand"));
    }

    #[test]
    fn wrong_arity_rejected() {
        let err =
            validate_domain(&json!([["state", "="]])).expect_err("2-element condition must fail");
        assert!(err.message.contains("3 elements"));
    }

    #[test]
    fn unknown_operator_rejected() {
        let err = validate_domain(&json!([["state", "==", "draft"]]))
            .expect_err("'==' is not a valid operator");
        assert!(err.message.contains("=="));
        assert!(err.suggestion.contains("ilike"));
    }

    #[test]
    fn in_requires_list_value() {
        let err = validate_domain(&json!([["id", "in", 5]])).expect_err("scalar in must fail");
        assert!(err.suggestion.contains('['));
        assert!(validate_domain(&json!([["id", "in", [5]]])).is_ok());
    }

    #[test]
    fn non_list_domain_rejected() {
        assert!(validate_domain(&json!({"field": "x"})).is_err());
        assert!(validate_domain(&json!("state = draft")).is_err());
    }

    #[test]
    fn multi_word_ilike_shape() {
        let domain = build_multi_word_ilike_domain(&["name", "email"], "john acme");
        let elements = domain.as_array().expect("array");
        // 4 conditions, 3 leading ORs
        assert_eq!(elements.len(), 7);
        assert_eq!(elements[0], json!("|"));
        assert_eq!(elements[3], json!(["name", "ilike", "john"]));
        assert!(validate_domain(&domain).is_ok());
    }

    #[test]
    fn builder_or_combination_is_well_formed() {
        let domain = DomainBuilder::any([
            DomainBuilder::new().equals("state", "draft"),
            DomainBuilder::new().contains("name", "acme"),
            DomainBuilder::new().in_list("id", json!([1, 2])),
        ])
        .build();
        assert!(validate_domain(&domain).is_ok());
        assert_eq!(domain.as_array().expect("array").len(), 5);
    }
}
