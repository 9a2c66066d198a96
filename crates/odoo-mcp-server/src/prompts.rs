//! Prompt provider
//!
//! A small set of guidance prompts: orientation on the connected instance,
//! model exploration, and error recovery.

use serde_json::{Map, Value};

use crate::protocol::{
    GetPromptResult, PromptArgumentDescriptor, PromptContent, PromptDescriptor, PromptMessage,
    PromptsListResult,
};

pub struct PromptProvider {
    server_version: String,
    database: String,
    toolset_names: Vec<String>,
}

impl PromptProvider {
    pub fn new(server_version: String, database: String, toolset_names: Vec<String>) -> Self {
        Self {
            server_version,
            database,
            toolset_names,
        }
    }

    pub fn list(&self) -> PromptsListResult {
        PromptsListResult {
            prompts: vec![
                PromptDescriptor {
                    name: "odoo_overview".to_owned(),
                    description: "Orientation on the connected Odoo instance and available tools"
                        .to_owned(),
                    arguments: Vec::new(),
                },
                PromptDescriptor {
                    name: "explore_model".to_owned(),
                    description: "Guided exploration of one Odoo model's fields and workflows"
                        .to_owned(),
                    arguments: vec![PromptArgumentDescriptor {
                        name: "model".to_owned(),
                        description: "Technical model name, e.g. sale.order".to_owned(),
                        required: true,
                    }],
                },
                PromptDescriptor {
                    name: "error_recovery".to_owned(),
                    description: "Steps to recover from a structured Odoo error response".to_owned(),
                    arguments: vec![PromptArgumentDescriptor {
                        name: "error".to_owned(),
                        description: "The error response JSON returned by a tool".to_owned(),
                        required: false,
                    }],
                },
            ],
        }
    }

    pub fn get(&self, name: &str, arguments: Option<&Map<String, Value>>) -> Option<GetPromptResult> {
        let text = match name {
            "odoo_overview" => format!(
                "You are connected to an Odoo {version} instance (database '{db}'). \
                 Available toolsets: {toolsets}. \
                 Start with odoo_core_list_toolsets to see every tool, and read \
                 odoo://system/info for connection details. Use odoo_core_deep_search \
                 when you don't know which model holds the data you need.",
                version = self.server_version,
                db = self.database,
                toolsets = self.toolset_names.join(", "),
            ),
            "explore_model" => {
                let model = arguments
                    .and_then(|args| args.get("model"))
                    .and_then(Value::as_str)?;
                format!(
                    "Explore the Odoo model '{model}': \
                     1) Call odoo_core_fields_get with model='{model}' to see its fields. \
                     2) Read odoo://model/{model}/states for its workflow states, if any. \
                     3) Use odoo_core_search_read with a small limit to sample real records. \
                     4) Check required fields before attempting odoo_core_create."
                )
            }
            "error_recovery" => {
                let error = arguments
                    .and_then(|args| args.get("error"))
                    .and_then(Value::as_str)
                    .unwrap_or("the last error response");
                format!(
                    "Recover from this Odoo error: {error}. \
                     Read the 'category', 'code', and 'suggestion' fields. \
                     If retry=true, fix the input per the suggestion and retry the same tool. \
                     For validation errors, call odoo_core_fields_get to verify field names, \
                     types, and required flags. For state errors, read the record first to see \
                     its current state."
                )
            }
            _ => return None,
        };

        Some(GetPromptResult {
            messages: vec![PromptMessage {
                role: "user",
                content: PromptContent::Text { text },
            }],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> PromptProvider {
        PromptProvider::new(
            "17.0".to_owned(),
            "prod".to_owned(),
            vec!["core".to_owned(), "sales".to_owned()],
        )
    }

    #[test]
    fn lists_three_prompts() {
        let prompts = provider().list();
        assert_eq!(prompts.prompts.len(), 3);
        assert!(prompts.prompts.iter().any(|p| p.name == "explore_model"));
    }

    #[test]
    fn explore_model_requires_the_model_argument() {
        let provider = provider();
        assert!(provider.get("explore_model", None).is_none());

        let mut args = Map::new();
        args.insert("model".to_owned(), json!("sale.order"));
        let result = provider
            .get("explore_model", Some(&args))
            .expect("renders");
        let PromptContent::Text { text } = &result.messages[0].content;
        assert!(text.contains("sale.order"));
        assert!(text.contains("odoo_core_fields_get"));
    }

    #[test]
    fn unknown_prompt_is_none() {
        assert!(provider().get("nope", None).is_none());
    }
}
