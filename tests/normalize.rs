// tests/normalize.rs

use tokentap::normalize::normalize;
use tokentap::types::NormalizedMessage;

#[test]
fn openai_messages_concatenate_into_total_text() {
    let body = br#"{
        "model": "gpt-4o",
        "messages": [
            {"role": "system", "content": "You are terse."},
            {"role": "user", "content": "Say hello"}
        ]
    }"#;

    let normalized = normalize(body, "/v1/chat/completions").unwrap();

    assert_eq!(normalized.model, "gpt-4o");
    assert_eq!(
        normalized.messages,
        vec![
            NormalizedMessage {
                role: "system".to_string(),
                content: "You are terse.".to_string(),
            },
            NormalizedMessage {
                role: "user".to_string(),
                content: "Say hello".to_string(),
            },
        ]
    );
    // total_text is exactly the message contents joined in order.
    assert_eq!(
        normalized.total_text,
        normalized
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    );
}

#[test]
fn anthropic_system_prompt_becomes_leading_message() {
    let body = br#"{
        "model": "claude-sonnet-4",
        "system": "Be helpful.",
        "messages": [
            {"role": "user", "content": "hi"}
        ]
    }"#;

    let normalized = normalize(body, "/v1/messages").unwrap();

    assert_eq!(normalized.messages[0].role, "system");
    assert_eq!(normalized.messages[0].content, "Be helpful.");
    assert_eq!(normalized.messages[1].role, "user");
    assert!(normalized.total_text.contains("Be helpful."));
}

#[test]
fn anthropic_content_blocks_are_flattened() {
    let body = br#"{
        "model": "claude-sonnet-4",
        "system": [
            {"type": "text", "text": "Part one. "},
            {"type": "text", "text": "Part two."}
        ],
        "messages": [
            {"role": "user", "content": [
                {"type": "text", "text": "look at "},
                {"type": "image", "source": {"data": "zzzz"}},
                {"type": "text", "text": "this"}
            ]}
        ]
    }"#;

    let normalized = normalize(body, "/v1/messages").unwrap();

    assert_eq!(normalized.messages[0].content, "Part one. Part two.");
    assert_eq!(normalized.messages[1].content, "look at this");
}

#[test]
fn system_field_is_ignored_on_openai_paths() {
    let body = br#"{"system": "not a prompt", "messages": []}"#;
    let normalized = normalize(body, "/v1/chat/completions").unwrap();
    assert!(normalized.messages.is_empty());
}

#[test]
fn empty_body_yields_no_event() {
    assert!(normalize(b"", "/v1/chat/completions").is_none());
}

#[test]
fn invalid_json_yields_no_event() {
    assert!(normalize(b"not json at all", "/v1/chat/completions").is_none());
    assert!(normalize(&[0xff, 0xfe, 0x00], "/v1/chat/completions").is_none());
}

#[test]
fn missing_fields_degrade_to_defaults() {
    let normalized = normalize(b"{}", "/v1/chat/completions").unwrap();
    assert_eq!(normalized.model, "unknown");
    assert!(normalized.messages.is_empty());
    assert_eq!(normalized.total_text, "");

    // A message with no role or content still normalizes.
    let normalized = normalize(br#"{"messages": [{}]}"#, "/v1/chat/completions").unwrap();
    assert_eq!(
        normalized.messages,
        vec![NormalizedMessage {
            role: String::new(),
            content: String::new(),
        }]
    );
}

#[test]
fn non_text_content_degrades_to_empty() {
    let body = br#"{"messages": [{"role": "user", "content": 42}]}"#;
    let normalized = normalize(body, "/v1/chat/completions").unwrap();
    assert_eq!(normalized.messages[0].content, "");
}
