//! Data stream wire protocol.
//!
//! Every semantic event of a chat turn is written as one *part*: a single
//! line of the form `<tag>:<json>\n`, flushed to the client immediately.
//! [`StreamWriter`] owns the framing; it knows nothing about LLM semantics.

mod sink;

pub use sink::{MemorySink, ResponseSink, StreamingSink};

use std::fmt;

use serde::{Serialize, Serializer};

/// Header announcing the protocol version to the client SDK.
pub const PROTOCOL_VERSION_HEADER: &str = "X-Vercel-AI-Data-Stream";

/// Protocol version written in [`PROTOCOL_VERSION_HEADER`].
pub const PROTOCOL_VERSION: &str = "v1";

/// Headers set on the sink when a stream starts.
const STREAM_HEADERS: &[(&str, &str)] = &[
    ("Content-Type", "text/plain; charset=utf-8"),
    ("Cache-Control", "no-cache"),
    ("Connection", "keep-alive"),
    (PROTOCOL_VERSION_HEADER, PROTOCOL_VERSION),
];

/// Type discriminator of a wire part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartType {
    /// Text delta (`0`).
    Text,
    /// Arbitrary data array (`2`).
    Data,
    /// Error message (`3`).
    Error,
    /// Message annotation (`8`).
    Annotation,
    /// Complete tool call (`9`).
    ToolCall,
    /// Tool call result (`a`).
    ToolResult,
    /// Tool call streaming start (`b`).
    ToolCallStart,
    /// Tool call argument delta (`c`).
    ToolCallArgDelta,
    /// Final finish marker for the whole turn (`d`).
    FinishMessage,
    /// Finish marker for one model call (`e`).
    FinishStep,
    /// Message start carrying the message id (`f`).
    Start,
}

impl PartType {
    /// The one-character tag written before the colon.
    pub fn tag(self) -> &'static str {
        match self {
            PartType::Text => "0",
            PartType::Data => "2",
            PartType::Error => "3",
            PartType::Annotation => "8",
            PartType::ToolCall => "9",
            PartType::ToolResult => "a",
            PartType::ToolCallStart => "b",
            PartType::ToolCallArgDelta => "c",
            PartType::FinishMessage => "d",
            PartType::FinishStep => "e",
            PartType::Start => "f",
        }
    }
}

/// Why the model stopped generating.
///
/// Serialized with the protocol's hyphenated names. Provider reasons that have
/// no protocol equivalent are carried through verbatim as
/// [`FinishReason::Unrecognized`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    /// Natural end of the response.
    Stop,
    /// Token limit reached.
    Length,
    /// Output withheld by a content filter.
    ContentFilter,
    /// The model requested tool calls.
    ToolCalls,
    /// The provider stream failed.
    Error,
    /// Provider reported some other reason.
    Other,
    /// Provider did not say.
    Unknown,
    /// A provider reason this protocol version does not know about.
    Unrecognized(String),
}

impl FinishReason {
    /// Map an upstream provider finish reason onto the protocol enum.
    ///
    /// Accepts both the underscore spelling used by OpenAI-compatible APIs
    /// (`tool_calls`, `content_filter`) and the protocol's hyphenated
    /// spelling. An empty reason maps to [`FinishReason::Stop`].
    pub fn from_provider(reason: &str) -> Self {
        match reason {
            "" | "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            "tool_calls" | "tool-calls" => FinishReason::ToolCalls,
            "content_filter" | "content-filter" => FinishReason::ContentFilter,
            "error" => FinishReason::Error,
            "other" => FinishReason::Other,
            "unknown" => FinishReason::Unknown,
            other => FinishReason::Unrecognized(other.to_string()),
        }
    }

    /// Wire spelling of this reason.
    pub fn as_str(&self) -> &str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ContentFilter => "content-filter",
            FinishReason::ToolCalls => "tool-calls",
            FinishReason::Error => "error",
            FinishReason::Other => "other",
            FinishReason::Unknown => "unknown",
            FinishReason::Unrecognized(reason) => reason,
        }
    }

    /// Whether the model stopped to request tool calls.
    pub fn is_tool_calls(&self) -> bool {
        matches!(self, FinishReason::ToolCalls)
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FinishReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Token usage statistics for one model call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    /// Tokens in the prompt.
    pub prompt_tokens: u32,
    /// Tokens in the completion.
    pub completion_tokens: u32,
    /// Prompt plus completion.
    pub total_tokens: u32,
}

/// Errors produced by [`StreamWriter`].
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The response sink cannot flush incrementally.
    #[error("streaming not supported")]
    StreamingUnsupported,

    /// `write_start` was called with an empty message id.
    #[error("messageId cannot be empty")]
    EmptyMessageId,

    /// A tool part was written with an empty tool call id.
    #[error("toolCallId cannot be empty")]
    EmptyToolCallId,

    /// A tool part was written with an empty tool name.
    #[error("toolName cannot be empty")]
    EmptyToolName,

    /// The payload could not be serialized.
    #[error("failed to marshal data: {0}")]
    EncodingFailed(#[from] serde_json::Error),

    /// The sink rejected a write or a flush.
    #[error("write failed: {0}")]
    WriteFailed(#[source] std::io::Error),

    /// The sink accepted fewer bytes than requested.
    #[error("partial write: wrote {written} of {expected} bytes")]
    PartialWrite {
        /// Bytes accepted by the sink.
        written: usize,
        /// Bytes in the part.
        expected: usize,
    },

    /// A previous transport failure closed the stream.
    #[error("stream closed after a transport failure")]
    Closed,
}

impl StreamError {
    /// Whether the error ends the turn.
    ///
    /// Construction errors (empty ids and names) reject a single part and
    /// leave the stream usable. Everything else is fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            StreamError::EmptyMessageId | StreamError::EmptyToolCallId | StreamError::EmptyToolName
        )
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartPart<'a> {
    message_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolCallPart<'a> {
    tool_call_id: &'a str,
    tool_name: &'a str,
    args: &'a serde_json::Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolResultPart<'a, T: Serialize + ?Sized> {
    tool_call_id: &'a str,
    result: &'a T,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolCallStartPart<'a> {
    tool_call_id: &'a str,
    tool_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolCallArgDeltaPart<'a> {
    tool_call_id: &'a str,
    args_text_delta: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FinishStepPart<'a> {
    finish_reason: &'a FinishReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<&'a Usage>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    is_continued: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FinishMessagePart<'a> {
    finish_reason: &'a FinishReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<&'a Usage>,
}

/// Frame one part as `<tag>:<json>\n`.
///
/// JSON encoding escapes every newline inside the payload, so the result is
/// always exactly one line.
///
/// # Errors
///
/// Returns [`StreamError::EncodingFailed`] if the payload cannot be serialized.
pub fn encode_part<T: Serialize + ?Sized>(
    part: PartType,
    payload: &T,
) -> Result<String, StreamError> {
    let json = serde_json::to_string(payload)?;
    let mut line = String::with_capacity(json.len() + 3);
    line.push_str(part.tag());
    line.push(':');
    line.push_str(&json);
    line.push('\n');
    Ok(line)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Open,
    Failed,
    Closed,
}

/// Writes protocol parts to a streaming response sink.
///
/// Parts are written in call order and flushed one by one; nothing is
/// batched or reordered. A transport failure poisons the writer: subsequent
/// writes return [`StreamError::Closed`] without touching the sink.
///
/// # Examples
///
/// ```
/// use relay_core::protocol::{MemorySink, StreamWriter};
///
/// # async fn example() -> Result<(), relay_core::protocol::StreamError> {
/// let sink = MemorySink::new();
/// let mut writer = StreamWriter::start(Box::new(sink.clone()))?;
/// writer.write_start("msg-1").await?;
/// writer.write_text("Hello").await?;
/// writer.close().await?;
///
/// assert_eq!(sink.lines(), vec![r#"f:{"messageId":"msg-1"}"#, r#"0:"Hello""#]);
/// # Ok(())
/// # }
/// ```
pub struct StreamWriter {
    sink: Box<dyn StreamingSink>,
    state: WriterState,
}

impl fmt::Debug for StreamWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamWriter")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl StreamWriter {
    /// Resolve the sink's streaming capability and set the stream headers.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::StreamingUnsupported`] if the sink cannot flush
    /// incrementally. No header is set in that case.
    pub fn start(sink: Box<dyn ResponseSink>) -> Result<Self, StreamError> {
        let mut sink = sink
            .into_streaming()
            .ok_or(StreamError::StreamingUnsupported)?;

        for (name, value) in STREAM_HEADERS {
            sink.set_header(name, value);
        }

        Ok(Self {
            sink,
            state: WriterState::Open,
        })
    }

    /// Whether a transport failure has poisoned this writer.
    pub fn is_failed(&self) -> bool {
        self.state == WriterState::Failed
    }

    /// Write the message start part (`f`).
    pub async fn write_start(&mut self, message_id: &str) -> Result<(), StreamError> {
        if message_id.is_empty() {
            return Err(StreamError::EmptyMessageId);
        }
        self.write_part(PartType::Start, &StartPart { message_id })
            .await
    }

    /// Write a text delta (`0`). The text is JSON-encoded, so newlines,
    /// quotes and control characters survive the line framing.
    pub async fn write_text(&mut self, text: &str) -> Result<(), StreamError> {
        self.write_part(PartType::Text, text).await
    }

    /// Write an arbitrary data array (`2`).
    pub async fn write_data(&mut self, data: &[serde_json::Value]) -> Result<(), StreamError> {
        self.write_part(PartType::Data, data).await
    }

    /// Write an error part (`3`). The stream stays open.
    pub async fn write_error(&mut self, message: &str) -> Result<(), StreamError> {
        self.write_part(PartType::Error, message).await
    }

    /// Write a message annotation (`8`), wrapped in a one-element array.
    pub async fn write_annotation<T: Serialize + ?Sized>(
        &mut self,
        annotation: &T,
    ) -> Result<(), StreamError> {
        self.write_part(PartType::Annotation, &[annotation]).await
    }

    /// Write a fully assembled tool call (`9`). `args` is written verbatim.
    pub async fn write_tool_call(
        &mut self,
        tool_call_id: &str,
        tool_name: &str,
        args: &serde_json::Value,
    ) -> Result<(), StreamError> {
        check_tool_ids(tool_call_id, tool_name)?;
        self.write_part(
            PartType::ToolCall,
            &ToolCallPart {
                tool_call_id,
                tool_name,
                args,
            },
        )
        .await
    }

    /// Write a tool result (`a`).
    pub async fn write_tool_result<T: Serialize + ?Sized>(
        &mut self,
        tool_call_id: &str,
        result: &T,
    ) -> Result<(), StreamError> {
        if tool_call_id.is_empty() {
            return Err(StreamError::EmptyToolCallId);
        }
        self.write_part(
            PartType::ToolResult,
            &ToolResultPart {
                tool_call_id,
                result,
            },
        )
        .await
    }

    /// Write the start of a streaming tool call (`b`).
    pub async fn write_tool_call_start(
        &mut self,
        tool_call_id: &str,
        tool_name: &str,
    ) -> Result<(), StreamError> {
        check_tool_ids(tool_call_id, tool_name)?;
        self.write_part(
            PartType::ToolCallStart,
            &ToolCallStartPart {
                tool_call_id,
                tool_name,
            },
        )
        .await
    }

    /// Write an incremental fragment of tool call arguments (`c`).
    /// An empty fragment is written as-is.
    pub async fn write_tool_call_arg_delta(
        &mut self,
        tool_call_id: &str,
        args_text_delta: &str,
    ) -> Result<(), StreamError> {
        if tool_call_id.is_empty() {
            return Err(StreamError::EmptyToolCallId);
        }
        self.write_part(
            PartType::ToolCallArgDelta,
            &ToolCallArgDeltaPart {
                tool_call_id,
                args_text_delta,
            },
        )
        .await
    }

    /// Write the finish marker of one model call (`e`).
    pub async fn write_finish_step(
        &mut self,
        reason: &FinishReason,
        usage: Option<&Usage>,
        is_continued: bool,
    ) -> Result<(), StreamError> {
        self.write_part(
            PartType::FinishStep,
            &FinishStepPart {
                finish_reason: reason,
                usage,
                is_continued,
            },
        )
        .await
    }

    /// Write the final finish marker of the turn (`d`).
    pub async fn write_finish_message(
        &mut self,
        reason: &FinishReason,
        usage: Option<&Usage>,
    ) -> Result<(), StreamError> {
        self.write_part(
            PartType::FinishMessage,
            &FinishMessagePart {
                finish_reason: reason,
                usage,
            },
        )
        .await
    }

    /// Flush anything still buffered in the sink.
    ///
    /// Idempotent: only the first call on a healthy writer flushes.
    pub async fn close(&mut self) -> Result<(), StreamError> {
        if self.state != WriterState::Open {
            return Ok(());
        }
        self.state = WriterState::Closed;
        self.sink.flush().await.map_err(StreamError::WriteFailed)
    }

    async fn write_part<T: Serialize + ?Sized>(
        &mut self,
        part: PartType,
        payload: &T,
    ) -> Result<(), StreamError> {
        if self.state != WriterState::Open {
            return Err(StreamError::Closed);
        }

        let line = encode_part(part, payload)?;
        let expected = line.len();

        let written = match self.sink.write(line.as_bytes()).await {
            Ok(n) => n,
            Err(e) => {
                self.state = WriterState::Failed;
                return Err(StreamError::WriteFailed(e));
            }
        };
        if written != expected {
            self.state = WriterState::Failed;
            return Err(StreamError::PartialWrite { written, expected });
        }

        if let Err(e) = self.sink.flush().await {
            self.state = WriterState::Failed;
            return Err(StreamError::WriteFailed(e));
        }

        tracing::trace!(tag = part.tag(), bytes = expected, "protocol: part written");
        Ok(())
    }
}

fn check_tool_ids(tool_call_id: &str, tool_name: &str) -> Result<(), StreamError> {
    if tool_call_id.is_empty() {
        return Err(StreamError::EmptyToolCallId);
    }
    if tool_name.is_empty() {
        return Err(StreamError::EmptyToolName);
    }
    Ok(())
}

#[cfg(test)]
mod tests;
