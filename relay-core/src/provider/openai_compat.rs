//! Streaming provider for OpenAI-compatible Chat Completions APIs.
//!
//! OpenAI and DeepSeek share one wire format, so a single
//! [`OpenAiCompatProvider`] serves both; only the endpoint differs.

mod types;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;

use self::types::{
    ApiError, ApiMessage, OaiFunction, OaiTool, SSE_DONE_MARKER, StreamChunk, StreamOptions,
    StreamingApiRequest,
};
use super::{
    LlmProvider, ProviderError, ProviderEvent, ProviderStream, RawToolCallDelta, TurnRequest,
};
use crate::message::Role;
use crate::protocol::Usage;
use crate::tools::ToolDefinition;

/// Build the wire message list, with the system prompt first.
fn build_api_messages(request: &TurnRequest) -> Vec<ApiMessage> {
    let system = request
        .system_prompt
        .as_ref()
        .filter(|prompt| !prompt.is_empty())
        .map(|prompt| ApiMessage {
            role: Role::System.as_str().to_string(),
            content: prompt.clone(),
        });

    system
        .into_iter()
        .chain(request.messages.iter().map(|m| ApiMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        }))
        .collect()
}

/// Convert tool definitions to the OpenAI-compatible tool format.
///
/// Returns `None` when the input slice is empty so that `tools` can be omitted
/// from the serialized request body.
fn to_oai_tools(tools: &[ToolDefinition]) -> Option<Vec<OaiTool>> {
    if tools.is_empty() {
        return None;
    }
    Some(
        tools
            .iter()
            .map(|t| OaiTool {
                tool_type: "function".to_string(),
                function: OaiFunction {
                    name: t.name.clone(),
                    description: Some(t.description.clone()).filter(|d| !d.is_empty()),
                    parameters: t.parameters.clone(),
                },
            })
            .collect(),
    )
}

/// Map one parsed SSE chunk onto a provider event.
///
/// Returns `None` for chunks that carry nothing the accumulator uses, such
/// as the leading role-only delta.
fn to_provider_event(chunk: StreamChunk) -> Option<ProviderEvent> {
    let mut event = ProviderEvent {
        usage: chunk.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }),
        ..ProviderEvent::default()
    };

    if let Some(choice) = chunk.choices.into_iter().next() {
        event.text = choice.delta.content.unwrap_or_default();
        event.finish_reason = choice.finish_reason;
        event.tool_calls = choice
            .delta
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let (name, arguments) = match tc.function {
                    Some(f) => (f.name, f.arguments),
                    None => (None, None),
                };
                RawToolCallDelta {
                    index: tc.index,
                    id: tc.id,
                    call_type: tc.call_type,
                    name,
                    arguments,
                }
            })
            .collect();
    }

    let empty = event.text.is_empty()
        && event.tool_calls.is_empty()
        && event.finish_reason.is_none()
        && event.usage.is_none();
    (!empty).then_some(event)
}

/// Generic provider for OpenAI-compatible Chat Completions APIs.
#[derive(Debug, Clone)]
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    name: String,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiCompatProvider {
    /// Create a provider posting to `endpoint` (a full Chat Completions URL).
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            name: name.into(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens,
        }
    }

    /// The Chat Completions URL requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The model identifier sent with each request.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, request: &TurnRequest) -> StreamingApiRequest {
        let tools = to_oai_tools(&request.tools);
        StreamingApiRequest {
            model: self.model.clone(),
            messages: build_api_messages(request),
            max_tokens: self.max_tokens,
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
            tool_choice: tools.as_ref().map(|_| "auto".to_string()),
            tools,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream_turn(&self, request: TurnRequest) -> Result<ProviderStream, ProviderError> {
        let body = self.build_request(&request);
        let endpoint = self.endpoint.clone();

        tracing::debug!(endpoint, model = %self.model, "openai_compat: POST streaming request");
        let response = self
            .client
            .post(&endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        let status = response.status();
        tracing::debug!(
            status = status.as_u16(),
            "openai_compat: streaming response status"
        );

        if status == reqwest::StatusCode::UNAUTHORIZED {
            let message = match response.json::<ApiError>().await {
                Ok(body) => body.error.message,
                Err(_) => "Invalid API key".to_string(),
            };
            return Err(ProviderError::AuthenticationError(message));
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ProviderError::RequestFailed(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        Ok(Box::pin(async_stream::stream! {
            tracing::debug!(endpoint, "openai_compat: SSE stream started");
            let mut sse_stream = response.bytes_stream().eventsource();

            while let Some(event) = sse_stream.next().await {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        yield Err(ProviderError::RequestFailed(e.to_string()));
                        return;
                    }
                };

                if event.data == SSE_DONE_MARKER {
                    tracing::debug!(endpoint, "openai_compat: SSE stream ended");
                    return;
                }

                match serde_json::from_str::<StreamChunk>(&event.data) {
                    Ok(chunk) => {
                        if let Some(event) = to_provider_event(chunk) {
                            yield Ok(event);
                        }
                    }
                    Err(e) => {
                        yield Err(ProviderError::ProviderError {
                            message: format!("Failed to parse SSE: {}", e),
                        });
                        return;
                    }
                }
            }

            tracing::debug!(endpoint, "openai_compat: SSE stream ended without [DONE]");
        }))
    }
}

#[cfg(test)]
mod tests;
