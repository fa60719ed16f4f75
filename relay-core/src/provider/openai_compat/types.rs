//! Serde request/response structs for OpenAI-compatible Chat Completions APIs.
//!
//! Kept private to the `openai_compat` module.

use serde::{Deserialize, Serialize};

/// SSE "[DONE]" marker sent by OpenAI-compatible streaming APIs.
pub(in super::super) const SSE_DONE_MARKER: &str = "[DONE]";

/// A single message in the API request body.
#[derive(Debug, Serialize)]
pub(in super::super) struct ApiMessage {
    /// Message role ("system", "user", "assistant", or "tool").
    pub(in super::super) role: String,
    pub(in super::super) content: String,
}

/// Request body for a streaming Chat Completions API call.
#[derive(Debug, Serialize)]
pub(in super::super) struct StreamingApiRequest {
    /// Model identifier.
    pub(in super::super) model: String,
    /// Conversation messages.
    pub(in super::super) messages: Vec<ApiMessage>,
    /// Maximum tokens to generate.
    pub(in super::super) max_tokens: u32,
    /// Must be `true` for streaming calls.
    pub(in super::super) stream: bool,
    /// Asks for a trailing usage chunk.
    pub(in super::super) stream_options: StreamOptions,
    /// Optional tool definitions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(in super::super) tools: Option<Vec<OaiTool>>,
    /// Omitted when `None` so the API default (`"auto"`) applies implicitly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(in super::super) tool_choice: Option<String>,
}

/// Streaming options of a Chat Completions request.
#[derive(Debug, Serialize)]
pub(in super::super) struct StreamOptions {
    pub(in super::super) include_usage: bool,
}

/// Tool definition in OpenAI-compatible format.
#[derive(Debug, Serialize)]
pub(in super::super) struct OaiTool {
    #[serde(rename = "type")]
    pub(in super::super) tool_type: String,
    pub(in super::super) function: OaiFunction,
}

/// Function definition within a tool.
#[derive(Debug, Serialize)]
pub(in super::super) struct OaiFunction {
    pub(in super::super) name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(in super::super) description: Option<String>,
    pub(in super::super) parameters: serde_json::Value,
}

/// Error response body from the API.
#[derive(Debug, Deserialize)]
pub(in super::super) struct ApiError {
    pub(in super::super) error: ErrorDetail,
}

/// Detail inside an API error response.
#[derive(Debug, Deserialize)]
pub(in super::super) struct ErrorDetail {
    pub(in super::super) message: String,
}

/// An SSE streaming response chunk.
#[derive(Debug, Deserialize)]
pub(in super::super) struct StreamChunk {
    /// Empty on the trailing usage chunk.
    #[serde(default)]
    pub(in super::super) choices: Vec<StreamChoice>,
    #[serde(default)]
    pub(in super::super) usage: Option<ApiUsage>,
}

/// A choice in a streaming response chunk.
#[derive(Debug, Deserialize)]
pub(in super::super) struct StreamChoice {
    #[serde(default)]
    pub(in super::super) delta: StreamDelta,
    #[serde(default)]
    pub(in super::super) finish_reason: Option<String>,
}

/// Delta content in a streaming choice.
#[derive(Debug, Default, Deserialize)]
pub(in super::super) struct StreamDelta {
    #[serde(default)]
    pub(in super::super) content: Option<String>,
    #[serde(default)]
    pub(in super::super) tool_calls: Option<Vec<OaiToolCallDelta>>,
}

/// Tool call fragment inside a streaming delta.
#[derive(Debug, Deserialize)]
pub(in super::super) struct OaiToolCallDelta {
    pub(in super::super) index: usize,
    #[serde(default)]
    pub(in super::super) id: Option<String>,
    #[serde(default, rename = "type")]
    pub(in super::super) call_type: Option<String>,
    #[serde(default)]
    pub(in super::super) function: Option<OaiFunctionDelta>,
}

/// Function name and argument fragment of a tool call delta.
#[derive(Debug, Deserialize)]
pub(in super::super) struct OaiFunctionDelta {
    #[serde(default)]
    pub(in super::super) name: Option<String>,
    #[serde(default)]
    pub(in super::super) arguments: Option<String>,
}

/// Token usage reported on the trailing chunk.
#[derive(Debug, Deserialize)]
pub(in super::super) struct ApiUsage {
    #[serde(default)]
    pub(in super::super) prompt_tokens: u32,
    #[serde(default)]
    pub(in super::super) completion_tokens: u32,
    #[serde(default)]
    pub(in super::super) total_tokens: u32,
}
