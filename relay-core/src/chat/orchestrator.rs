//! Per-turn stream orchestration.
//!
//! Drives one turn through `STARTED → STREAMING → TOOL_DISPATCH* →
//! STEP_FINISHED → MESSAGE_FINISHED`, writing every chunk through the
//! [`StreamWriter`] in protocol order, then persists the assembled text and
//! annotates the stream with the stored ids.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::TurnError;
use crate::message::Role;
use crate::protocol::{FinishReason, StreamError, StreamWriter, Usage};
use crate::session::StoredMessage;
use crate::storage::MessageStore;
use crate::stream::{Chunk, ToolCall, ToolCallDelta};
use crate::text::estimate_tokens;
use crate::tools::{ToolRegistry, ToolResult};

/// Identifiers of the turn being streamed.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub session_id: Uuid,
    pub user_id: Uuid,
    /// Id of the already persisted user message.
    pub user_message_id: Uuid,
    /// Id announced in the start part.
    pub message_id: String,
}

/// What a finished orchestration produced.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSummary {
    /// Concatenated text deltas.
    pub text: String,
    /// Reason from the terminal chunk, if one arrived.
    pub finish_reason: Option<FinishReason>,
    pub usage: Option<Usage>,
    /// Number of tool calls executed.
    pub tool_calls: usize,
    /// The persisted assistant message, if saving succeeded.
    pub assistant_message: Option<StoredMessage>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageAnnotation {
    user_message_id: String,
    message_id: String,
}

/// Client-side state of one streamed tool call.
#[derive(Debug, Default)]
struct ToolCallStream {
    id: String,
    name: String,
    started: bool,
    /// Argument text seen before the start part could be written.
    held_arguments: String,
}

/// Skip non-fatal construction errors; anything else ends the turn.
fn check(result: Result<(), StreamError>) -> Result<(), TurnError> {
    match result {
        Err(e) if !e.is_fatal() => {
            tracing::warn!(error = %e, "orchestrator: skipping invalid part");
            Ok(())
        }
        other => other.map_err(TurnError::Stream),
    }
}

/// Await a sink write unless the turn is cancelled first.
async fn guarded(
    cancel: &CancellationToken,
    write: impl Future<Output = Result<(), StreamError>>,
) -> Result<(), TurnError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TurnError::Cancelled),
        result = write => check(result),
    }
}

/// Writes one turn's chunks to the client.
pub struct StreamOrchestrator<'a> {
    writer: &'a mut StreamWriter,
    tools: &'a ToolRegistry,
    store: &'a dyn MessageStore,
    turn: TurnContext,
    cancel: CancellationToken,
    text: String,
    tool_streams: HashMap<usize, ToolCallStream>,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
    tool_calls: usize,
}

impl<'a> StreamOrchestrator<'a> {
    /// Create an orchestrator writing to `writer`.
    pub fn new(
        writer: &'a mut StreamWriter,
        tools: &'a ToolRegistry,
        store: &'a dyn MessageStore,
        turn: TurnContext,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            writer,
            tools,
            store,
            turn,
            cancel,
            text: String::new(),
            tool_streams: HashMap::new(),
            finish_reason: None,
            usage: None,
            tool_calls: 0,
        }
    }

    /// Stream every chunk, then persist and annotate.
    ///
    /// The assistant text is persisted on every path, including write
    /// failures and cancellation. The annotation is only written while the
    /// writer is healthy and the turn is not cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`TurnError::Stream`] on a fatal write failure and
    /// [`TurnError::Cancelled`] when `cancel` fires.
    pub async fn run(mut self, chunks: mpsc::Receiver<Chunk>) -> Result<StreamSummary, TurnError> {
        let streamed = self.stream(chunks).await;
        if let Err(e) = &streamed {
            tracing::warn!(
                message_id = %self.turn.message_id,
                error = %e,
                "orchestrator: stream ended early"
            );
        }

        let assistant_message = self.persist().await;

        if streamed.is_ok() && !self.writer.is_failed() {
            self.annotate().await;
        }

        streamed.map(|()| StreamSummary {
            text: self.text,
            finish_reason: self.finish_reason,
            usage: self.usage,
            tool_calls: self.tool_calls,
            assistant_message,
        })
    }

    async fn stream(&mut self, mut chunks: mpsc::Receiver<Chunk>) -> Result<(), TurnError> {
        guarded(&self.cancel, self.writer.write_start(&self.turn.message_id)).await?;

        loop {
            let chunk = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(TurnError::Cancelled),
                chunk = chunks.recv() => chunk,
            };

            let Some(chunk) = chunk else {
                break;
            };

            if !chunk.text.is_empty() {
                self.text.push_str(&chunk.text);
                guarded(&self.cancel, self.writer.write_text(&chunk.text)).await?;
            }

            for delta in &chunk.tool_call_deltas {
                self.forward_tool_delta(delta).await?;
            }

            if chunk.done {
                for call in &chunk.completed_tool_calls {
                    self.dispatch(call).await?;
                }
                let reason = chunk.finish_reason.unwrap_or(FinishReason::Unknown);
                return self.finish(reason, chunk.usage).await;
            }
        }

        if self.cancel.is_cancelled() {
            return Err(TurnError::Cancelled);
        }

        // The accumulator always ends with a terminal chunk unless it died.
        tracing::error!("orchestrator: chunk channel closed without a terminal chunk");
        self.finish(FinishReason::Error, None).await
    }

    async fn forward_tool_delta(&mut self, delta: &ToolCallDelta) -> Result<(), TurnError> {
        let state = self.tool_streams.entry(delta.index).or_default();

        if state.id.is_empty()
            && let Some(id) = &delta.id
        {
            state.id = id.clone();
        }
        if state.name.is_empty()
            && let Some(name) = &delta.name
        {
            state.name = name.clone();
        }

        if !state.started {
            if state.id.is_empty() || state.name.is_empty() {
                state.held_arguments.push_str(&delta.arguments);
                return Ok(());
            }

            guarded(&self.cancel, self.writer.write_tool_call_start(&state.id, &state.name)).await?;
            state.started = true;

            if !state.held_arguments.is_empty() {
                let held = std::mem::take(&mut state.held_arguments);
                guarded(
                    &self.cancel,
                    self.writer.write_tool_call_arg_delta(&state.id, &held),
                )
                .await?;
            }
        }

        if !delta.arguments.is_empty() {
            guarded(
                &self.cancel,
                self.writer.write_tool_call_arg_delta(&state.id, &delta.arguments),
            )
            .await?;
        }
        Ok(())
    }

    async fn dispatch(&mut self, call: &ToolCall) -> Result<(), TurnError> {
        if call.id.is_empty() || call.name.is_empty() {
            tracing::warn!(
                tool_call_id = %call.id,
                tool = %call.name,
                "orchestrator: skipping incomplete tool call"
            );
            return Ok(());
        }

        guarded(
            &self.cancel,
            self.writer.write_tool_call(&call.id, &call.name, &call.parsed_arguments()),
        )
        .await?;

        let execution = self
            .tools
            .execute(self.turn.user_id, &call.name, &call.arguments);
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(TurnError::Cancelled),
            result = execution => result,
        };
        self.tool_calls += 1;

        match result {
            Ok(result) => {
                tracing::debug!(
                    tool = %call.name,
                    success = result.success,
                    "orchestrator: tool executed"
                );
                guarded(&self.cancel, self.writer.write_tool_result(&call.id, &result)).await
            }
            Err(e) => {
                tracing::error!(tool = %call.name, error = %e, "orchestrator: tool execution failed");
                let result = ToolResult::failure(format!("Failed to execute tool: {}", e));
                guarded(&self.cancel, self.writer.write_tool_result(&call.id, &result)).await
            }
        }
    }

    async fn finish(&mut self, reason: FinishReason, usage: Option<Usage>) -> Result<(), TurnError> {
        let is_continued = reason.is_tool_calls();

        guarded(
            &self.cancel,
            self.writer.write_finish_step(&reason, usage.as_ref(), is_continued),
        )
        .await?;

        // No second model call follows a tool-calls step.
        if !is_continued {
            guarded(&self.cancel, self.writer.write_finish_message(&reason, usage.as_ref())).await?;
        }

        self.finish_reason = Some(reason);
        self.usage = usage;
        Ok(())
    }

    async fn persist(&self) -> Option<StoredMessage> {
        let token_count = match self.usage {
            Some(usage) => usage.completion_tokens,
            None => estimate_tokens(&self.text),
        };

        match self
            .store
            .save_message(self.turn.session_id, Role::Assistant, &self.text, token_count)
            .await
        {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::error!(
                    session_id = %self.turn.session_id,
                    error = %e,
                    "orchestrator: failed to save streamed response"
                );
                None
            }
        }
    }

    async fn annotate(&mut self) {
        let annotation = MessageAnnotation {
            user_message_id: self.turn.user_message_id.to_string(),
            message_id: self.turn.message_id.clone(),
        };
        if let Err(e) = guarded(&self.cancel, self.writer.write_annotation(&annotation)).await {
            tracing::warn!(error = %e, "orchestrator: failed to write annotation");
        }
    }
}
