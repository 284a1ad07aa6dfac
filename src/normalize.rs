use serde::Deserialize;

use crate::types::{NormalizedMessage, NormalizedRequest};

/// Path fragment that marks an Anthropic messages-endpoint request.
const ANTHROPIC_MESSAGES_PATH: &str = "/v1/messages";

/// Message content as it appears on the wire: a plain string for classic
/// OpenAI bodies, or a list of typed blocks for Anthropic (and newer OpenAI)
/// bodies.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
    Other(serde::de::IgnoredAny),
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<WireContent>,
}

/// Request body shape shared by both providers; Anthropic additionally
/// carries a top-level `system` prompt.
#[derive(Debug, Deserialize)]
struct WireRequest {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    system: Option<WireContent>,
    #[serde(default)]
    messages: Option<Vec<WireMessage>>,
}

impl WireContent {
    /// Flattens wire content into plain text. Non-text blocks (images, tool
    /// results without text) contribute nothing.
    fn into_text(self) -> String {
        match self {
            WireContent::Text(text) => text,
            WireContent::Blocks(blocks) => blocks
                .into_iter()
                .filter_map(|block| match block.kind.as_deref() {
                    None | Some("text") => block.text,
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
            WireContent::Other(_) => String::new(),
        }
    }
}

/// Converts a provider-specific request body into the canonical shape.
///
/// Returns `None` when the body is empty or is not valid JSON (including
/// invalid UTF-8); the caller still forwards such bodies byte-for-byte.
/// Malformed-but-valid-JSON input degrades to empty/default fields and never
/// errors.
pub fn normalize(body: &[u8], path: &str) -> Option<NormalizedRequest> {
    if body.is_empty() {
        return None;
    }

    let parsed: WireRequest = serde_json::from_slice(body).ok()?;
    let anthropic = path.contains(ANTHROPIC_MESSAGES_PATH);

    let mut messages = Vec::new();

    // Anthropic carries the system prompt outside the messages array; fold it
    // in as the leading message so downstream consumers see one conversation.
    if anthropic {
        if let Some(system) = parsed.system {
            messages.push(NormalizedMessage {
                role: "system".to_string(),
                content: system.into_text(),
            });
        }
    }

    for message in parsed.messages.unwrap_or_default() {
        messages.push(NormalizedMessage {
            role: message.role.unwrap_or_default(),
            content: message.content.map(WireContent::into_text).unwrap_or_default(),
        });
    }

    let total_text = messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    Some(NormalizedRequest {
        model: parsed.model.unwrap_or_else(|| "unknown".to_string()),
        total_text,
        messages,
    })
}
