//! LLM provider abstraction layer.
//!
//! A provider is a black-box source of an ordered event sequence for one
//! model turn. [`LlmProvider::stream_turn`] opens that sequence; the
//! [`stream`](crate::stream) module normalizes it into chunks.

mod factory;
mod mock;
mod openai_compat;

pub use factory::create_provider;
pub use mock::MockProvider;
pub use openai_compat::OpenAiCompatProvider;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::message::Message;
use crate::protocol::Usage;
use crate::tools::ToolDefinition;

/// Error type for provider operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider returned an error response.
    #[error("provider error: {message}")]
    ProviderError {
        /// The error message from the provider.
        message: String,
    },

    /// Request failed due to network or connection issues.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// Authentication failed (e.g., invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationError(String),

    /// No API key was found in the environment or the config file.
    #[error("missing API key: {0}")]
    MissingApiKey(String),

    /// The configured provider name is not supported.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

/// Everything a provider needs to start one model turn.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    /// Conversation history, oldest first, ending with the user message.
    pub messages: Vec<Message>,
    /// Optional system prompt sent before the history.
    pub system_prompt: Option<String>,
    /// Tools the model may call.
    pub tools: Vec<ToolDefinition>,
}

/// A fragment of one tool call, as reported by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawToolCallDelta {
    /// Stream position of the tool call this fragment belongs to.
    pub index: usize,
    /// Tool call id, usually only on the first fragment.
    pub id: Option<String>,
    /// Call type, `"function"` for every current provider.
    pub call_type: Option<String>,
    /// Tool name, usually only on the first fragment.
    pub name: Option<String>,
    /// Partial JSON arguments.
    pub arguments: Option<String>,
}

/// One raw event of a provider stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderEvent {
    /// Text fragment, empty when the event carries none.
    pub text: String,
    /// Tool call fragments observed in this event.
    pub tool_calls: Vec<RawToolCallDelta>,
    /// Provider finish reason, reported once near the end of the turn.
    pub finish_reason: Option<String>,
    /// Token usage, reported once at the end of the turn.
    pub usage: Option<Usage>,
}

impl ProviderEvent {
    /// An event carrying only a text fragment.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// An event carrying a single tool call fragment.
    pub fn tool_call(delta: RawToolCallDelta) -> Self {
        Self {
            tool_calls: vec![delta],
            ..Self::default()
        }
    }

    /// An event reporting the finish reason.
    pub fn finish(reason: impl Into<String>) -> Self {
        Self {
            finish_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// An event reporting token usage.
    pub fn usage(usage: Usage) -> Self {
        Self {
            usage: Some(usage),
            ..Self::default()
        }
    }
}

/// Owned stream of provider events. Dropping it releases the transport.
pub type ProviderStream = Pin<Box<dyn Stream<Item = Result<ProviderEvent, ProviderError>> + Send>>;

/// Trait for LLM providers.
///
/// Implementations must be thread-safe (`Send + Sync`) for use
/// in async contexts.
///
/// # Examples
///
/// ```
/// use futures::StreamExt;
/// use relay_core::message::{Message, Role};
/// use relay_core::provider::{LlmProvider, MockProvider, ProviderEvent, TurnRequest};
///
/// # async fn example() {
/// let provider = MockProvider::new().with_turn(vec![ProviderEvent::text("Hi")]);
/// let request = TurnRequest {
///     messages: vec![Message::new(Role::User, "Hello")],
///     ..TurnRequest::default()
/// };
///
/// let mut stream = provider.stream_turn(request).await.unwrap();
/// let event = stream.next().await.unwrap().unwrap();
/// assert_eq!(event.text, "Hi");
/// # }
/// ```
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short provider name used in logs.
    fn name(&self) -> &str;

    /// Start a streaming model turn.
    ///
    /// # Errors
    ///
    /// Returns an error if the turn could not be started at all. Failures
    /// after the stream is open arrive as `Err` items of the stream.
    async fn stream_turn(&self, request: TurnRequest) -> Result<ProviderStream, ProviderError>;
}
