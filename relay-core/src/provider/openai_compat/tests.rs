use super::*;
use crate::message::Message;

fn parse(json: &str) -> StreamChunk {
    serde_json::from_str(json).unwrap()
}

fn provider() -> OpenAiCompatProvider {
    OpenAiCompatProvider::new(
        "openai",
        "https://api.openai.com/v1/chat/completions",
        "sk-test",
        "gpt-4o-mini",
        1024,
    )
}

// -- request building --

#[test]
fn test_streaming_request_serialization() {
    let request = TurnRequest {
        messages: vec![Message::new(Role::User, "Hello")],
        ..TurnRequest::default()
    };

    let json = serde_json::to_value(provider().build_request(&request)).unwrap();
    assert_eq!(json["model"], "gpt-4o-mini");
    assert_eq!(json["stream"], true);
    assert_eq!(json["stream_options"]["include_usage"], true);
    assert_eq!(json["max_tokens"], 1024);
    assert_eq!(json["messages"][0]["role"], "user");
    assert_eq!(json["messages"][0]["content"], "Hello");
    assert!(json.get("tools").is_none());
    assert!(
        json.get("tool_choice").is_none(),
        "tool_choice must be absent when no tools"
    );
}

#[test]
fn test_system_prompt_goes_first() {
    let request = TurnRequest {
        messages: vec![
            Message::new(Role::User, "Hi"),
            Message::new(Role::Assistant, "Hello!"),
            Message::new(Role::User, "How are you?"),
        ],
        system_prompt: Some("You are a helpful assistant.".to_string()),
        tools: Vec::new(),
    };

    let messages = build_api_messages(&request);
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0].role, "system");
    assert_eq!(messages[0].content, "You are a helpful assistant.");
    assert_eq!(messages[3].content, "How are you?");
}

#[test]
fn test_empty_system_prompt_is_skipped() {
    let request = TurnRequest {
        messages: vec![Message::new(Role::User, "Hi")],
        system_prompt: Some(String::new()),
        tools: Vec::new(),
    };

    let messages = build_api_messages(&request);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, "user");
}

#[test]
fn test_request_with_tools() {
    let request = TurnRequest {
        messages: vec![Message::new(Role::User, "What's the weather?")],
        system_prompt: None,
        tools: vec![ToolDefinition {
            name: "get_weather".to_string(),
            description: "Get weather".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {"location": {"type": "string"}}
            }),
        }],
    };

    let json = serde_json::to_value(provider().build_request(&request)).unwrap();
    assert_eq!(json["tools"][0]["type"], "function");
    assert_eq!(json["tools"][0]["function"]["name"], "get_weather");
    assert_eq!(json["tools"][0]["function"]["description"], "Get weather");
    assert_eq!(json["tool_choice"], "auto");
}

#[test]
fn test_to_oai_tools_empty() {
    assert!(to_oai_tools(&[]).is_none());
}

// -- SSE chunk mapping --

#[test]
fn test_text_delta_chunk() {
    let chunk = parse(
        r#"{
            "id": "chatcmpl-123",
            "choices": [{"index": 0, "delta": {"content": "Hello"}, "finish_reason": null}]
        }"#,
    );

    let event = to_provider_event(chunk).unwrap();
    assert_eq!(event.text, "Hello");
    assert!(event.tool_calls.is_empty());
    assert!(event.finish_reason.is_none());
}

#[test]
fn test_role_only_chunk_is_skipped() {
    // First SSE event often has role but no content.
    let chunk = parse(
        r#"{
            "id": "chatcmpl-123",
            "choices": [{"index": 0, "delta": {"role": "assistant", "content": ""}, "finish_reason": null}]
        }"#,
    );

    assert!(to_provider_event(chunk).is_none());
}

#[test]
fn test_tool_call_delta_chunk() {
    let chunk = parse(
        r#"{
            "choices": [{
                "index": 0,
                "delta": {
                    "tool_calls": [{
                        "index": 0,
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "get_weather", "arguments": ""}
                    }]
                },
                "finish_reason": null
            }]
        }"#,
    );

    let event = to_provider_event(chunk).unwrap();
    assert_eq!(
        event.tool_calls,
        vec![RawToolCallDelta {
            index: 0,
            id: Some("call_1".to_string()),
            call_type: Some("function".to_string()),
            name: Some("get_weather".to_string()),
            arguments: Some(String::new()),
        }]
    );
}

#[test]
fn test_tool_call_argument_fragment_chunk() {
    let chunk = parse(
        r#"{
            "choices": [{
                "index": 0,
                "delta": {"tool_calls": [{"index": 1, "function": {"arguments": "{\"loc\":"}}]}
            }]
        }"#,
    );

    let event = to_provider_event(chunk).unwrap();
    let delta = &event.tool_calls[0];
    assert_eq!(delta.index, 1);
    assert!(delta.id.is_none());
    assert!(delta.name.is_none());
    assert_eq!(delta.arguments.as_deref(), Some(r#"{"loc":"#));
}

#[test]
fn test_finish_reason_chunk() {
    let chunk = parse(
        r#"{
            "id": "chatcmpl-123",
            "choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}]
        }"#,
    );

    let event = to_provider_event(chunk).unwrap();
    assert_eq!(event.finish_reason.as_deref(), Some("tool_calls"));
}

#[test]
fn test_trailing_usage_chunk() {
    let chunk = parse(
        r#"{
            "id": "chatcmpl-123",
            "choices": [],
            "usage": {"prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8}
        }"#,
    );

    let event = to_provider_event(chunk).unwrap();
    assert_eq!(
        event.usage,
        Some(Usage {
            prompt_tokens: 5,
            completion_tokens: 3,
            total_tokens: 8,
        })
    );
    assert!(event.text.is_empty());
}

#[test]
fn test_api_error_parsing() {
    let json = r#"{
        "error": {
            "message": "Incorrect API key provided",
            "type": "invalid_request_error",
            "code": "invalid_api_key"
        }
    }"#;

    let error: ApiError = serde_json::from_str(json).unwrap();
    assert_eq!(error.error.message, "Incorrect API key provided");
}

#[test]
fn test_done_marker() {
    assert_eq!(SSE_DONE_MARKER, "[DONE]");
}
