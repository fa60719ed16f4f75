//! Built-in tools.

use std::fmt::Write;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::{Tool, ToolDefinition, ToolError, ToolHandler, ToolRegistry, ToolResult, parse_arguments};

/// Registry holding every built-in tool.
pub fn builtin_registry() -> ToolRegistry {
    ToolRegistry::new()
        .with_tool(CurrentTimeTool::tool())
        .with_tool(WordCountTool::tool())
}

/// Reports the current UTC time.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentTimeTool;

#[derive(Debug, Default, Deserialize)]
struct CurrentTimeArgs {
    #[serde(default)]
    format: Option<String>,
}

impl CurrentTimeTool {
    /// The tool, ready to register.
    pub fn tool() -> Tool {
        Tool::new(
            ToolDefinition {
                name: "current_time".to_string(),
                description: "Get the current date and time in UTC.".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "format": {
                            "type": "string",
                            "description": "Optional strftime format, e.g. %Y-%m-%d"
                        }
                    }
                }),
            },
            Self,
        )
    }
}

#[async_trait]
impl ToolHandler for CurrentTimeTool {
    async fn call(&self, _user_id: Uuid, arguments: &str) -> Result<ToolResult, ToolError> {
        let args: CurrentTimeArgs = match parse_arguments(arguments) {
            Ok(args) => args,
            Err(e) => return Ok(ToolResult::failure(e.to_string())),
        };

        let now = Utc::now();
        let mut data = json!({
            "utc": now.to_rfc3339(),
            "unix": now.timestamp(),
        });

        if let Some(format) = args.format {
            let mut formatted = String::new();
            // chrono reports unknown specifiers as a fmt error
            if write!(formatted, "{}", now.format(&format)).is_err() {
                return Ok(ToolResult::failure(format!(
                    "invalid time format: {}",
                    format
                )));
            }
            data["formatted"] = json!(formatted);
        }

        Ok(ToolResult::success(format!("Current time is {}", now.to_rfc3339())).with_data(data))
    }
}

/// Counts words, characters and lines of a text.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordCountTool;

#[derive(Debug, Deserialize)]
struct WordCountArgs {
    text: String,
}

impl WordCountTool {
    /// The tool, ready to register.
    pub fn tool() -> Tool {
        Tool::new(
            ToolDefinition {
                name: "word_count".to_string(),
                description: "Count the words, characters and lines of a text.".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "text": {"type": "string", "description": "Text to analyse"}
                    },
                    "required": ["text"]
                }),
            },
            Self,
        )
    }
}

#[async_trait]
impl ToolHandler for WordCountTool {
    async fn call(&self, _user_id: Uuid, arguments: &str) -> Result<ToolResult, ToolError> {
        let args: WordCountArgs = match parse_arguments(arguments) {
            Ok(args) => args,
            Err(e) => return Ok(ToolResult::failure(e.to_string())),
        };

        let words = args.text.split_whitespace().count();
        let characters = args.text.chars().count();
        let lines = args.text.lines().count();

        Ok(
            ToolResult::success(format!("{} words", words)).with_data(json!({
                "words": words,
                "characters": characters,
                "lines": lines,
            })),
        )
    }
}
