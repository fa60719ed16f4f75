//! Chat turn service.
//!
//! [`ChatService::stream_reply`] runs one user turn end to end: persist the
//! user message, start the provider stream, accumulate deltas on a spawned
//! task and let the [`StreamOrchestrator`] write the wire protocol.

mod orchestrator;

pub use orchestrator::{StreamOrchestrator, StreamSummary, TurnContext};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{Config, StreamConfig};
use crate::message::{Message, Role};
use crate::protocol::{FinishReason, ResponseSink, StreamError, StreamWriter, Usage};
use crate::provider::{LlmProvider, ProviderError, TurnRequest};
use crate::session::StoredMessage;
use crate::storage::{MessageStore, StorageError};
use crate::stream::spawn_accumulator;
use crate::text::estimate_tokens;
use crate::tools::ToolRegistry;

/// Error type for chat turns.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    /// Writing the wire protocol failed.
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    /// The provider could not start the turn.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The user message could not be stored or history loaded.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The turn was cancelled by the caller.
    #[error("turn cancelled")]
    Cancelled,
}

/// One user message to answer.
#[derive(Debug, Clone)]
pub struct TurnInput {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
}

/// Result of a completed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Id announced in the start part.
    pub message_id: String,
    pub user_message: StoredMessage,
    /// `None` if saving the reply failed; the failure is logged.
    pub assistant_message: Option<StoredMessage>,
    pub text: String,
    pub finish_reason: Option<FinishReason>,
    pub usage: Option<Usage>,
    /// Number of tool calls executed.
    pub tool_calls: usize,
}

/// Answers user turns with a streaming provider.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use relay_core::chat::{ChatService, TurnInput};
/// use relay_core::protocol::MemorySink;
/// use relay_core::provider::{MockProvider, ProviderEvent};
/// use relay_core::storage::MemoryStore;
/// use relay_core::tools::ToolRegistry;
/// use tokio_util::sync::CancellationToken;
/// use uuid::Uuid;
///
/// # async fn example() {
/// let provider = MockProvider::new().with_turn(vec![
///     ProviderEvent::text("Hi!"),
///     ProviderEvent::finish("stop"),
/// ]);
/// let service = ChatService::new(
///     Box::new(provider),
///     Arc::new(MemoryStore::new()),
///     ToolRegistry::new(),
/// );
///
/// let sink = MemorySink::new();
/// let input = TurnInput {
///     session_id: Uuid::new_v4(),
///     user_id: Uuid::new_v4(),
///     content: "Hello".to_string(),
/// };
/// let outcome = service
///     .stream_reply(Box::new(sink.clone()), input, CancellationToken::new())
///     .await
///     .unwrap();
/// assert_eq!(outcome.text, "Hi!");
/// assert!(sink.lines()[1].starts_with("0:"));
/// # }
/// ```
pub struct ChatService {
    provider: Box<dyn LlmProvider>,
    store: Arc<dyn MessageStore>,
    tools: ToolRegistry,
    system_prompt: Option<String>,
    stream_config: StreamConfig,
}

impl ChatService {
    /// Create a service with default stream settings and no system prompt.
    pub fn new(
        provider: Box<dyn LlmProvider>,
        store: Arc<dyn MessageStore>,
        tools: ToolRegistry,
    ) -> Self {
        Self {
            provider,
            store,
            tools,
            system_prompt: None,
            stream_config: StreamConfig::default(),
        }
    }

    /// Create a service from application configuration.
    ///
    /// Builds the provider with
    /// [`create_provider`](crate::provider::create_provider) and applies the
    /// configured system prompt and stream settings.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if the configured provider cannot be created.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn MessageStore>,
        tools: ToolRegistry,
    ) -> Result<Self, ProviderError> {
        let provider = crate::provider::create_provider(config)?;
        let service = Self::new(provider, store, tools).with_stream_config(config.stream.clone());
        Ok(match config.system_prompt {
            Some(ref prompt) => service.with_system_prompt(prompt),
            None => service,
        })
    }

    /// Set the system prompt sent with every turn.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set channel capacity and history limit.
    #[must_use]
    pub fn with_stream_config(mut self, stream_config: StreamConfig) -> Self {
        self.stream_config = stream_config;
        self
    }

    /// The message store turns are persisted to.
    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    /// Answer `input`, streaming the reply to `sink`.
    ///
    /// Nothing is written to the sink if the user message cannot be stored
    /// or the provider fails to start the turn.
    ///
    /// # Errors
    ///
    /// - [`TurnError::Storage`] if the user message or history fails
    /// - [`TurnError::Provider`] if the provider cannot start the turn
    /// - [`TurnError::Stream`] if the sink cannot stream or a write fails
    /// - [`TurnError::Cancelled`] if `cancel` fires mid-turn
    pub async fn stream_reply(
        &self,
        sink: Box<dyn ResponseSink>,
        input: TurnInput,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome, TurnError> {
        let user_message = self
            .store
            .save_message(
                input.session_id,
                Role::User,
                &input.content,
                estimate_tokens(&input.content),
            )
            .await?;

        let history: Vec<Message> = self
            .store
            .recent_messages(input.session_id, self.stream_config.history_limit)
            .await?
            .iter()
            .map(StoredMessage::to_message)
            .collect();

        let request = TurnRequest {
            messages: history,
            system_prompt: self.system_prompt.clone(),
            tools: self.tools.definitions(),
        };

        tracing::debug!(
            provider = self.provider.name(),
            session_id = %input.session_id,
            history = request.messages.len(),
            tools = request.tools.len(),
            "starting turn"
        );
        let provider_stream = self.provider.stream_turn(request).await?;

        let mut writer = StreamWriter::start(sink)?;
        let chunks = spawn_accumulator(
            provider_stream,
            self.stream_config.channel_capacity,
            cancel.clone(),
        );

        let message_id = Uuid::new_v4().to_string();
        let turn = TurnContext {
            session_id: input.session_id,
            user_id: input.user_id,
            user_message_id: user_message.id,
            message_id: message_id.clone(),
        };

        let summary = StreamOrchestrator::new(
            &mut writer,
            &self.tools,
            self.store.as_ref(),
            turn,
            cancel.clone(),
        )
        .run(chunks)
        .await;

        // A stalled sink must not hold a cancelled turn open.
        let closed = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TurnError::Cancelled),
            result = writer.close() => result.map_err(TurnError::from),
        };
        let summary = summary?;
        closed?;

        tracing::info!(
            message_id = %message_id,
            finish_reason = ?summary.finish_reason.as_ref().map(FinishReason::as_str),
            tool_calls = summary.tool_calls,
            "turn completed"
        );

        Ok(TurnOutcome {
            message_id,
            user_message,
            assistant_message: summary.assistant_message,
            text: summary.text,
            finish_reason: summary.finish_reason,
            usage: summary.usage,
            tool_calls: summary.tool_calls,
        })
    }
}
