//! Tool registry and execution gateway.
//!
//! Tools are registered as [`Tool`] values (a definition plus a handler) in
//! an explicit [`ToolRegistry`] that is injected into the chat service, so
//! tests can substitute fakes without any global state.

mod builtin;

pub use builtin::{CurrentTimeTool, WordCountTool, builtin_registry};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Errors raised by a tool handler.
///
/// The orchestrator reports these in-band as a failed tool result; they
/// never abort a stream.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The argument string is not valid JSON for the tool.
    #[error("invalid arguments: {0}")]
    InvalidArguments(#[from] serde_json::Error),

    /// The tool ran but could not complete.
    #[error("{0}")]
    ExecutionFailed(String),
}

/// Definition of a tool as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// What the tool does, for the model.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    pub parameters: serde_json::Value,
}

/// Outcome of a tool execution, written to the client as the tool result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool succeeded.
    pub success: bool,
    /// Human-readable summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Structured output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Error description when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    /// A successful result with a summary message.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// A failed result carrying an error description.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Attach structured output.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Executes one tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool for `user_id` with the complete JSON `arguments` string.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] if the tool could not run. Expected failures,
    /// such as bad arguments, may instead be reported as a failed
    /// [`ToolResult`].
    async fn call(&self, user_id: Uuid, arguments: &str) -> Result<ToolResult, ToolError>;
}

/// A callable tool: its definition plus the handler that runs it.
#[derive(Clone)]
pub struct Tool {
    /// What the model sees.
    pub definition: ToolDefinition,
    /// What runs when the model calls it.
    pub handler: Arc<dyn ToolHandler>,
}

impl Tool {
    /// Create a tool from a definition and a handler.
    pub fn new(definition: ToolDefinition, handler: impl ToolHandler + 'static) -> Self {
        Self {
            definition,
            handler: Arc::new(handler),
        }
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

/// Name-keyed set of tools available to a chat service.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, replacing any tool registered under the same name.
    pub fn register(&mut self, tool: Tool) {
        let name = tool.definition.name.clone();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "tool registered twice, replacing");
        }
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with_tool(mut self, tool: Tool) -> Self {
        self.register(tool);
        self
    }

    /// Definitions of all registered tools, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<_> = self.tools.values().map(|t| t.definition.clone()).collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tool is registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run the tool named `name`.
    ///
    /// An unknown tool yields a failed [`ToolResult`], not an error.
    ///
    /// # Errors
    ///
    /// Propagates the handler's [`ToolError`].
    pub async fn execute(
        &self,
        user_id: Uuid,
        name: &str,
        arguments: &str,
    ) -> Result<ToolResult, ToolError> {
        let Some(tool) = self.tools.get(name) else {
            tracing::warn!(tool = name, "unknown tool requested");
            return Ok(ToolResult::failure(format!("unknown tool: {}", name)));
        };

        tracing::debug!(tool = name, %user_id, "executing tool");
        tool.handler.call(user_id, arguments).await
    }
}

/// Parse a complete tool argument string.
///
/// Arguments are buffered until the tool call is complete and parsed exactly
/// once here. A blank string is treated as an empty object.
///
/// # Errors
///
/// Returns [`ToolError::InvalidArguments`] if the string is not valid JSON
/// for `T`.
pub fn parse_arguments<T: DeserializeOwned>(arguments: &str) -> Result<T, ToolError> {
    let arguments = if arguments.trim().is_empty() {
        "{}"
    } else {
        arguments
    };
    Ok(serde_json::from_str(arguments)?)
}
