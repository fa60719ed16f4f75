use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use super::*;

/// A sink that can only deliver a fully buffered body.
struct BufferedSink;

impl ResponseSink for BufferedSink {
    fn into_streaming(self: Box<Self>) -> Option<Box<dyn StreamingSink>> {
        None
    }
}

/// Accepts at most `limit` bytes per write and reports success.
#[derive(Clone)]
struct ShortWriteSink {
    limit: usize,
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl ShortWriteSink {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            writes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

impl ResponseSink for ShortWriteSink {
    fn into_streaming(self: Box<Self>) -> Option<Box<dyn StreamingSink>> {
        Some(self)
    }
}

#[async_trait]
impl StreamingSink for ShortWriteSink {
    fn set_header(&mut self, _name: &str, _value: &str) {}

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = buf.len().min(self.limit);
        self.writes.lock().unwrap().push(buf[..n].to_vec());
        Ok(n)
    }

    async fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Fails every write with a broken pipe.
struct BrokenPipeSink;

impl ResponseSink for BrokenPipeSink {
    fn into_streaming(self: Box<Self>) -> Option<Box<dyn StreamingSink>> {
        Some(self)
    }
}

#[async_trait]
impl StreamingSink for BrokenPipeSink {
    fn set_header(&mut self, _name: &str, _value: &str) {}

    async fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away"))
    }

    async fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn memory_writer() -> (MemorySink, StreamWriter) {
    let sink = MemorySink::new();
    let writer = StreamWriter::start(Box::new(sink.clone())).unwrap();
    (sink, writer)
}

/// Split a wire line into its tag and parsed JSON payload.
fn parse_line(line: &str) -> (&str, serde_json::Value) {
    let (tag, payload) = line.split_once(':').unwrap();
    (tag, serde_json::from_str(payload).unwrap())
}

// -- start / headers --

#[test]
fn test_start_rejects_buffered_sink() {
    let result = StreamWriter::start(Box::new(BufferedSink));
    assert!(matches!(result, Err(StreamError::StreamingUnsupported)));
}

#[test]
fn test_start_sets_stream_headers() {
    let (sink, _writer) = memory_writer();
    assert_eq!(
        sink.header("content-type").as_deref(),
        Some("text/plain; charset=utf-8")
    );
    assert_eq!(sink.header("Cache-Control").as_deref(), Some("no-cache"));
    assert_eq!(sink.header("Connection").as_deref(), Some("keep-alive"));
    assert_eq!(
        sink.header(PROTOCOL_VERSION_HEADER).as_deref(),
        Some(PROTOCOL_VERSION)
    );
}

// -- part encoding --

#[test]
fn test_part_type_tags() {
    assert_eq!(PartType::Text.tag(), "0");
    assert_eq!(PartType::Data.tag(), "2");
    assert_eq!(PartType::Error.tag(), "3");
    assert_eq!(PartType::Annotation.tag(), "8");
    assert_eq!(PartType::ToolCall.tag(), "9");
    assert_eq!(PartType::ToolResult.tag(), "a");
    assert_eq!(PartType::ToolCallStart.tag(), "b");
    assert_eq!(PartType::ToolCallArgDelta.tag(), "c");
    assert_eq!(PartType::FinishMessage.tag(), "d");
    assert_eq!(PartType::FinishStep.tag(), "e");
    assert_eq!(PartType::Start.tag(), "f");
}

#[test]
fn test_encode_part_is_single_line() {
    let line = encode_part(PartType::Text, "line one\nline two\r\n").unwrap();
    assert!(line.ends_with('\n'));
    assert_eq!(line.matches('\n').count(), 1);
    assert_eq!(line, "0:\"line one\\nline two\\r\\n\"\n");
}

#[tokio::test]
async fn test_write_text_round_trips_special_characters() {
    let samples = [
        "plain",
        "multi\nline\ntext",
        "with \"quotes\" and \\backslashes\\",
        "tabs\there",
        "unicode: héllo wörld 你好 🚀",
        "control \u{0001}\u{001f}",
        "",
    ];

    let (sink, mut writer) = memory_writer();
    for sample in samples {
        writer.write_text(sample).await.unwrap();
    }

    let lines = sink.lines();
    assert_eq!(lines.len(), samples.len());
    for (line, sample) in lines.iter().zip(samples) {
        let (tag, payload) = parse_line(line);
        assert_eq!(tag, "0");
        assert_eq!(payload, json!(sample));
    }
}

#[tokio::test]
async fn test_write_start() {
    let (sink, mut writer) = memory_writer();
    writer.write_start("msg-123").await.unwrap();

    let lines = sink.lines();
    assert_eq!(lines, vec![r#"f:{"messageId":"msg-123"}"#]);
}

#[tokio::test]
async fn test_write_start_empty_id_writes_nothing() {
    let (sink, mut writer) = memory_writer();
    let result = writer.write_start("").await;

    assert!(matches!(result, Err(StreamError::EmptyMessageId)));
    assert!(sink.contents().is_empty());
}

#[tokio::test]
async fn test_tool_parts_reject_empty_fields() {
    let (sink, mut writer) = memory_writer();

    assert!(matches!(
        writer.write_tool_call_start("", "get_weather").await,
        Err(StreamError::EmptyToolCallId)
    ));
    assert!(matches!(
        writer.write_tool_call_start("call_1", "").await,
        Err(StreamError::EmptyToolName)
    ));
    assert!(matches!(
        writer.write_tool_call("", "get_weather", &json!({})).await,
        Err(StreamError::EmptyToolCallId)
    ));
    assert!(matches!(
        writer.write_tool_call("call_1", "", &json!({})).await,
        Err(StreamError::EmptyToolName)
    ));
    assert!(matches!(
        writer.write_tool_call_arg_delta("", "{}").await,
        Err(StreamError::EmptyToolCallId)
    ));
    assert!(matches!(
        writer.write_tool_result("", &json!({"success": true})).await,
        Err(StreamError::EmptyToolCallId)
    ));

    assert!(sink.contents().is_empty());

    // Construction errors leave the stream usable.
    writer.write_text("still here").await.unwrap();
    assert_eq!(sink.lines(), vec![r#"0:"still here""#]);
}

#[tokio::test]
async fn test_write_tool_parts() {
    let (sink, mut writer) = memory_writer();
    writer
        .write_tool_call_start("call_1", "get_weather")
        .await
        .unwrap();
    writer
        .write_tool_call_arg_delta("call_1", "{\"loc\":")
        .await
        .unwrap();
    writer.write_tool_call_arg_delta("call_1", "").await.unwrap();
    writer
        .write_tool_call("call_1", "get_weather", &json!({"loc": "SF"}))
        .await
        .unwrap();
    writer
        .write_tool_result("call_1", &json!({"success": true, "data": {"temp": 18}}))
        .await
        .unwrap();

    let lines = sink.lines();
    assert_eq!(lines.len(), 5);
    assert_eq!(
        lines[0],
        r#"b:{"toolCallId":"call_1","toolName":"get_weather"}"#
    );
    assert_eq!(
        lines[1],
        r#"c:{"toolCallId":"call_1","argsTextDelta":"{\"loc\":"}"#
    );
    assert_eq!(lines[2], r#"c:{"toolCallId":"call_1","argsTextDelta":""}"#);
    assert_eq!(
        lines[3],
        r#"9:{"toolCallId":"call_1","toolName":"get_weather","args":{"loc":"SF"}}"#
    );

    let (tag, payload) = parse_line(&lines[4]);
    assert_eq!(tag, "a");
    assert_eq!(payload["toolCallId"], "call_1");
    assert_eq!(payload["result"]["data"]["temp"], 18);
}

#[tokio::test]
async fn test_write_tool_call_string_args_verbatim() {
    let (sink, mut writer) = memory_writer();
    writer
        .write_tool_call("call_1", "echo", &json!("not json {"))
        .await
        .unwrap();

    let lines = sink.lines();
    let (_, payload) = parse_line(&lines[0]);
    assert_eq!(payload["args"], "not json {");
}

#[tokio::test]
async fn test_write_annotation_wraps_in_array() {
    let (sink, mut writer) = memory_writer();
    writer
        .write_annotation(&json!({"userMessageId": "u1", "messageId": "m1"}))
        .await
        .unwrap();

    let lines = sink.lines();
    let (tag, payload) = parse_line(&lines[0]);
    assert_eq!(tag, "8");
    assert_eq!(payload, json!([{"userMessageId": "u1", "messageId": "m1"}]));
}

#[tokio::test]
async fn test_write_data_and_error() {
    let (sink, mut writer) = memory_writer();
    writer.write_data(&[json!(1), json!("two")]).await.unwrap();
    writer.write_error("something broke").await.unwrap();
    writer.write_text("after error").await.unwrap();

    assert_eq!(
        sink.lines(),
        vec![
            r#"2:[1,"two"]"#,
            r#"3:"something broke""#,
            r#"0:"after error""#
        ]
    );
}

// -- finish markers --

#[tokio::test]
async fn test_finish_step_continued_for_tool_calls() {
    let (sink, mut writer) = memory_writer();
    writer
        .write_finish_step(&FinishReason::ToolCalls, None, true)
        .await
        .unwrap();

    assert_eq!(
        sink.lines(),
        vec![r#"e:{"finishReason":"tool-calls","isContinued":true}"#]
    );
}

#[tokio::test]
async fn test_finish_step_and_message_with_usage() {
    let usage = Usage {
        prompt_tokens: 5,
        completion_tokens: 3,
        total_tokens: 8,
    };
    let (sink, mut writer) = memory_writer();
    writer
        .write_finish_step(&FinishReason::Stop, Some(&usage), false)
        .await
        .unwrap();
    writer
        .write_finish_message(&FinishReason::Stop, Some(&usage))
        .await
        .unwrap();

    let lines = sink.lines();
    assert_eq!(
        lines[0],
        r#"e:{"finishReason":"stop","usage":{"promptTokens":5,"completionTokens":3,"totalTokens":8}}"#
    );
    assert_eq!(
        lines[1],
        r#"d:{"finishReason":"stop","usage":{"promptTokens":5,"completionTokens":3,"totalTokens":8}}"#
    );
}

#[test]
fn test_finish_reason_mapping() {
    assert_eq!(FinishReason::from_provider("stop"), FinishReason::Stop);
    assert_eq!(FinishReason::from_provider(""), FinishReason::Stop);
    assert_eq!(FinishReason::from_provider("length"), FinishReason::Length);
    assert_eq!(
        FinishReason::from_provider("tool_calls"),
        FinishReason::ToolCalls
    );
    assert_eq!(
        FinishReason::from_provider("content_filter"),
        FinishReason::ContentFilter
    );
    assert_eq!(FinishReason::from_provider("error"), FinishReason::Error);
    assert_eq!(
        FinishReason::from_provider("insufficient_system_resource"),
        FinishReason::Unrecognized("insufficient_system_resource".to_string())
    );
}

#[test]
fn test_finish_reason_serialization() {
    assert_eq!(
        serde_json::to_string(&FinishReason::ToolCalls).unwrap(),
        "\"tool-calls\""
    );
    assert_eq!(
        serde_json::to_string(&FinishReason::ContentFilter).unwrap(),
        "\"content-filter\""
    );
    assert_eq!(
        serde_json::to_string(&FinishReason::Unrecognized("pause_turn".to_string())).unwrap(),
        "\"pause_turn\""
    );
    assert_eq!(FinishReason::Length.to_string(), "length");
}

// -- transport failures --

#[tokio::test]
async fn test_partial_write_poisons_writer() {
    let sink = ShortWriteSink::new(5);
    let mut writer = StreamWriter::start(Box::new(sink.clone())).unwrap();

    let result = writer.write_text("Hello, world").await;
    assert!(matches!(
        result,
        Err(StreamError::PartialWrite { written: 5, expected: 17 })
    ));
    assert!(writer.is_failed());

    let result = writer.write_text("more").await;
    assert!(matches!(result, Err(StreamError::Closed)));
    assert_eq!(sink.write_count(), 1, "no write after a partial write");
}

#[tokio::test]
async fn test_write_error_poisons_writer() {
    let mut writer = StreamWriter::start(Box::new(BrokenPipeSink)).unwrap();

    let result = writer.write_start("msg-1").await;
    assert!(matches!(result, Err(StreamError::WriteFailed(_))));
    assert!(result.unwrap_err().is_fatal());

    assert!(matches!(
        writer.write_text("x").await,
        Err(StreamError::Closed)
    ));
    // Closing a failed writer does not touch the sink.
    assert!(writer.close().await.is_ok());
}

#[test]
fn test_error_fatality() {
    assert!(!StreamError::EmptyMessageId.is_fatal());
    assert!(!StreamError::EmptyToolCallId.is_fatal());
    assert!(!StreamError::EmptyToolName.is_fatal());
    assert!(StreamError::Closed.is_fatal());
    assert!(
        StreamError::PartialWrite {
            written: 1,
            expected: 2
        }
        .is_fatal()
    );
}

// -- flushing / close --

#[tokio::test]
async fn test_every_part_is_flushed() {
    let (sink, mut writer) = memory_writer();
    writer.write_start("m").await.unwrap();
    writer.write_text("a").await.unwrap();
    writer.write_text("b").await.unwrap();
    assert_eq!(sink.flush_count(), 3);
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let (sink, mut writer) = memory_writer();
    writer.write_text("done").await.unwrap();

    writer.close().await.unwrap();
    writer.close().await.unwrap();

    assert_eq!(sink.flush_count(), 2, "one flush for the part, one for close");
    assert_eq!(sink.lines(), vec![r#"0:"done""#]);
}
