//! Delta accumulation.
//!
//! Turns a provider's raw event stream into normalized [`Chunk`]s on a
//! bounded channel. Tool call fragments are reassembled per stream index by
//! a [`ToolCallAccumulator`]; argument text is only concatenated here and
//! parsed once the call is complete.

use std::collections::BTreeMap;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::protocol::{FinishReason, Usage};
use crate::provider::{ProviderStream, RawToolCallDelta};

/// A tool call fragment as forwarded to the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallDelta {
    /// Stream position of the tool call.
    pub index: usize,
    /// Tool call id, when this fragment carries one.
    pub id: Option<String>,
    /// Tool name, when this fragment carries one.
    pub name: Option<String>,
    /// Argument text of this fragment, possibly empty.
    pub arguments: String,
}

/// A fully assembled tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    /// Call type reported by the provider, `"function"` by default.
    pub call_type: String,
    pub name: String,
    /// Complete JSON argument text, not yet validated.
    pub arguments: String,
}

impl ToolCall {
    /// Arguments parsed as JSON, or the raw text as a JSON string when they
    /// do not parse.
    pub fn parsed_arguments(&self) -> serde_json::Value {
        serde_json::from_str(&self.arguments)
            .unwrap_or_else(|_| serde_json::Value::String(self.arguments.clone()))
    }
}

/// Normalized unit of one model turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chunk {
    /// Text fragment, possibly empty.
    pub text: String,
    /// Tool call fragments observed in the underlying event.
    pub tool_call_deltas: Vec<ToolCallDelta>,
    /// Assembled tool calls; only set on a terminal chunk whose reason is
    /// [`FinishReason::ToolCalls`].
    pub completed_tool_calls: Vec<ToolCall>,
    /// Whether this is the last chunk of the turn.
    pub done: bool,
    /// Why the turn ended; only set on the terminal chunk.
    pub finish_reason: Option<FinishReason>,
    /// Token usage; only set on the terminal chunk.
    pub usage: Option<Usage>,
}

impl Chunk {
    /// A non-terminal chunk.
    pub fn delta(text: impl Into<String>, tool_call_deltas: Vec<ToolCallDelta>) -> Self {
        Self {
            text: text.into(),
            tool_call_deltas,
            ..Self::default()
        }
    }

    /// The terminal chunk of a turn.
    ///
    /// `completed_tool_calls` is dropped unless `reason` is
    /// [`FinishReason::ToolCalls`].
    pub fn terminal(
        reason: FinishReason,
        usage: Option<Usage>,
        completed_tool_calls: Vec<ToolCall>,
    ) -> Self {
        let completed_tool_calls = if reason.is_tool_calls() {
            completed_tool_calls
        } else {
            Vec::new()
        };
        Self {
            completed_tool_calls,
            done: true,
            finish_reason: Some(reason),
            usage,
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
struct PendingToolCall {
    id: String,
    call_type: String,
    name: String,
    arguments: String,
}

/// Per-turn reassembly of tool calls, keyed by stream index.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    entries: BTreeMap<usize, PendingToolCall>,
}

impl ToolCallAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one provider fragment and return it in normalized form.
    ///
    /// The first non-empty `id`, `type` and `name` seen for an index are
    /// kept; later values never replace them. Argument text is always
    /// appended.
    pub fn apply(&mut self, delta: &RawToolCallDelta) -> ToolCallDelta {
        let entry = self.entries.entry(delta.index).or_default();

        let id = delta.id.as_deref().filter(|id| !id.is_empty());
        let name = delta.name.as_deref().filter(|name| !name.is_empty());
        if let Some(id) = id
            && entry.id.is_empty()
        {
            entry.id = id.to_string();
        }
        if let Some(name) = name
            && entry.name.is_empty()
        {
            entry.name = name.to_string();
        }
        if let Some(call_type) = delta.call_type.as_deref().filter(|t| !t.is_empty())
            && entry.call_type.is_empty()
        {
            entry.call_type = call_type.to_string();
        }

        let arguments = delta.arguments.clone().unwrap_or_default();
        entry.arguments.push_str(&arguments);

        ToolCallDelta {
            index: delta.index,
            id: id.map(str::to_string),
            name: name.map(str::to_string),
            arguments,
        }
    }

    /// Whether no fragment has been seen.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Materialize every entry, in ascending index order.
    pub fn finish(self) -> Vec<ToolCall> {
        self.entries
            .into_values()
            .map(|entry| ToolCall {
                id: entry.id,
                call_type: if entry.call_type.is_empty() {
                    "function".to_string()
                } else {
                    entry.call_type
                },
                name: entry.name,
                arguments: entry.arguments,
            })
            .collect()
    }
}

/// Spawn the accumulator task for one turn.
///
/// The returned receiver yields chunks in provider order and ends after the
/// terminal chunk. Cancelling `cancel` stops the task without a terminal
/// chunk; the provider stream is dropped on every exit path.
pub fn spawn_accumulator(
    stream: ProviderStream,
    capacity: usize,
    cancel: CancellationToken,
) -> mpsc::Receiver<Chunk> {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(run_accumulator(stream, tx, cancel));
    rx
}

/// Send `chunk` unless the turn is cancelled or the receiver is gone.
async fn send(tx: &mpsc::Sender<Chunk>, cancel: &CancellationToken, chunk: Chunk) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::debug!("accumulator: cancelled while sending");
            false
        }
        result = tx.send(chunk) => {
            if result.is_err() {
                tracing::debug!("accumulator: receiver dropped");
            }
            result.is_ok()
        }
    }
}

async fn run_accumulator(
    mut stream: ProviderStream,
    tx: mpsc::Sender<Chunk>,
    cancel: CancellationToken,
) {
    let mut tool_calls = ToolCallAccumulator::new();
    let mut finish_reason = None;
    let mut usage = None;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("accumulator: cancelled while reading provider");
                return;
            }
            next = stream.next() => next,
        };

        let event = match next {
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "accumulator: provider stream failed");
                send(&tx, &cancel, Chunk::terminal(FinishReason::Error, usage, Vec::new())).await;
                return;
            }
            None => break,
        };

        if let Some(reason) = event.finish_reason.as_deref() {
            finish_reason = Some(FinishReason::from_provider(reason));
        }
        if event.usage.is_some() {
            usage = event.usage;
        }

        let deltas: Vec<_> = event.tool_calls.iter().map(|d| tool_calls.apply(d)).collect();
        if event.text.is_empty() && deltas.is_empty() {
            continue;
        }
        if !send(&tx, &cancel, Chunk::delta(event.text, deltas)).await {
            return;
        }
    }

    let reason = finish_reason.unwrap_or(FinishReason::Stop);
    tracing::debug!(finish_reason = %reason, "accumulator: provider stream ended");
    send(&tx, &cancel, Chunk::terminal(reason, usage, tool_calls.finish())).await;
}
