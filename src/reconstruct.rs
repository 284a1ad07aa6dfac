use bytes::BytesMut;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

use crate::types::{ReconstructedResponse, ReconstructionStatus};

/// The only streaming chunk type the reconstructor understands. Anything else
/// (including Anthropic event frames, which carry `type` instead of `object`)
/// halts reconstruction for the rest of the response.
const STREAM_CHUNK_OBJECT: &str = "chat.completion.chunk";

/// Per-tool-call accumulation state within one choice.
#[derive(Debug, PartialEq)]
enum ToolCallAccumulator {
    Function {
        id: Option<String>,
        name: String,
        arguments: String,
    },
    /// A delta declared a non-"function" type for this index; all later
    /// deltas for it are dropped.
    Unsupported,
}

impl Default for ToolCallAccumulator {
    fn default() -> Self {
        ToolCallAccumulator::Function {
            id: None,
            name: String::new(),
            arguments: String::new(),
        }
    }
}

#[derive(Debug, Default, PartialEq)]
struct ChoiceAccumulator {
    role: Option<String>,
    content: String,
    reasoning: String,
    finish_reason: Option<String>,
    logprobs: Vec<Value>,
    tool_calls: HashMap<u64, ToolCallAccumulator>,
}

/// Rebuilds one complete chat-completion object from an ordered stream of SSE
/// bytes. Owned by a single response-handling task; chunks must be fed in
/// arrival order because content and tool-call-argument concatenation is
/// order-sensitive.
#[derive(Debug, Default)]
pub struct StreamReconstructor {
    buffer: BytesMut,
    top_level: Map<String, Value>,
    choices: HashMap<u64, ChoiceAccumulator>,
    halted: bool,
}

impl StreamReconstructor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a raw chunk of upstream bytes. Chunk boundaries need not align
    /// with SSE line boundaries; partial lines are buffered.
    pub fn feed_bytes(&mut self, chunk: &[u8]) {
        if self.halted {
            return;
        }

        self.buffer.extend_from_slice(chunk);

        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line = self.buffer.split_to(newline_pos + 1);
            self.feed_line(&String::from_utf8_lossy(&line));
            if self.halted {
                return;
            }
        }
    }

    fn feed_line(&mut self, line: &str) {
        let line = line.trim();

        // Keep-alive comments, event names, and blank frame separators.
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim();

        if data == "[DONE]" {
            tracing::trace!("received [DONE] marker");
            return;
        }

        // A malformed line is skipped; it does not abort the stream.
        let chunk: Value = match serde_json::from_str(data) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!("skipping unparseable SSE line: {}", e);
                return;
            }
        };

        self.apply_chunk(chunk);
    }

    fn apply_chunk(&mut self, chunk: Value) {
        let Value::Object(fields) = chunk else {
            self.halt("non-object chunk");
            return;
        };

        if fields.get("object").and_then(Value::as_str) != Some(STREAM_CHUNK_OBJECT) {
            self.halt("unrecognized chunk object type");
            return;
        }

        for (key, value) in fields {
            if key == "choices" {
                if let Value::Array(entries) = value {
                    for entry in entries {
                        self.apply_choice(entry);
                    }
                }
            } else {
                // Last-writer-wins for every top-level field (id, created,
                // model, usage, ...).
                self.top_level.insert(key, value);
            }
        }
    }

    fn apply_choice(&mut self, entry: Value) {
        let Value::Object(entry) = entry else {
            return;
        };

        let index = entry.get("index").and_then(Value::as_u64).unwrap_or(0);
        let choice = self.choices.entry(index).or_default();

        if let Some(reason) = entry.get("finish_reason").and_then(Value::as_str) {
            // Monotonic: overwritten when present, never cleared by a null.
            choice.finish_reason = Some(reason.to_string());
        }

        if let Some(logprobs) = entry.get("logprobs") {
            if !logprobs.is_null() {
                choice.logprobs.push(logprobs.clone());
            }
        }

        if let Some(delta) = entry.get("delta").and_then(Value::as_object) {
            if choice.role.is_none() {
                if let Some(role) = delta.get("role").and_then(Value::as_str) {
                    choice.role = Some(role.to_string());
                }
            }

            let reasoning = delta
                .get("reasoning")
                .or_else(|| delta.get("reasoning_content"))
                .and_then(Value::as_str);
            if let Some(text) = reasoning {
                choice.reasoning.push_str(text);
            }

            if let Some(text) = delta.get("content").and_then(Value::as_str) {
                choice.content.push_str(text);
            }

            if let Some(Value::Array(tool_deltas)) = delta.get("tool_calls") {
                for tool_delta in tool_deltas {
                    apply_tool_call(&mut choice.tool_calls, tool_delta);
                }
            }
        }
    }

    fn halt(&mut self, reason: &str) {
        tracing::debug!("halting reconstruction: {}", reason);
        self.halted = true;
        self.buffer.clear();
    }

    /// Consumes the reconstructor and returns the merged completion object,
    /// choices ordered ascending by index. Tool-call arguments stay opaque
    /// concatenated strings; downstream consumers parse them if needed.
    pub fn finalize(mut self) -> ReconstructedResponse {
        // A trailing line without a newline is still a complete SSE line once
        // the stream ends.
        if !self.halted && !self.buffer.is_empty() {
            let tail = self.buffer.split();
            self.feed_line(&String::from_utf8_lossy(&tail));
        }

        let mut indices: Vec<u64> = self.choices.keys().copied().collect();
        indices.sort_unstable();

        let choices: Vec<Value> = indices
            .into_iter()
            .map(|index| {
                let acc = self
                    .choices
                    .remove(&index)
                    .unwrap_or_default();
                render_choice(index, acc)
            })
            .collect();

        let mut body = self.top_level;
        body.insert("choices".to_string(), Value::Array(choices));

        ReconstructedResponse {
            status: if self.halted {
                ReconstructionStatus::Halted
            } else {
                ReconstructionStatus::Complete
            },
            body: Value::Object(body),
        }
    }
}

fn render_choice(index: u64, acc: ChoiceAccumulator) -> Value {
    let mut message = Map::new();
    message.insert("role".to_string(), json!(acc.role));
    message.insert("content".to_string(), json!(acc.content));
    if !acc.reasoning.is_empty() {
        message.insert("reasoning".to_string(), json!(acc.reasoning));
    }
    if !acc.tool_calls.is_empty() {
        message.insert(
            "tool_calls".to_string(),
            render_tool_calls(acc.tool_calls),
        );
    }

    let mut choice = Map::new();
    choice.insert("index".to_string(), json!(index));
    choice.insert("message".to_string(), Value::Object(message));
    choice.insert("finish_reason".to_string(), json!(acc.finish_reason));
    if !acc.logprobs.is_empty() {
        choice.insert("logprobs".to_string(), Value::Array(acc.logprobs));
    }

    Value::Object(choice)
}

fn render_tool_calls(tool_calls: HashMap<u64, ToolCallAccumulator>) -> Value {
    let mut indices: Vec<u64> = tool_calls.keys().copied().collect();
    indices.sort_unstable();

    let mut tool_calls = tool_calls;
    Value::Array(
        indices
            .into_iter()
            .filter_map(|index| tool_calls.remove(&index).map(|acc| (index, acc)))
            .map(|(index, acc)| match acc {
                ToolCallAccumulator::Function {
                    id,
                    name,
                    arguments,
                } => json!({
                    "index": index,
                    "id": id,
                    "type": "function",
                    "function": { "name": name, "arguments": arguments },
                }),
                ToolCallAccumulator::Unsupported => json!({
                    "index": index,
                    "type": "unsupported",
                }),
            })
            .collect(),
    )
}

fn apply_tool_call(tool_calls: &mut HashMap<u64, ToolCallAccumulator>, delta: &Value) {
    let Value::Object(delta) = delta else {
        return;
    };

    let index = delta.get("index").and_then(Value::as_u64).unwrap_or(0);
    let acc = tool_calls.entry(index).or_default();

    if let Some(kind) = delta.get("type").and_then(Value::as_str) {
        if kind != "function" {
            *acc = ToolCallAccumulator::Unsupported;
            return;
        }
    }

    let ToolCallAccumulator::Function {
        id,
        name,
        arguments,
    } = acc
    else {
        return;
    };

    if id.is_none() {
        if let Some(value) = delta.get("id").and_then(Value::as_str) {
            *id = Some(value.to_string());
        }
    }

    if let Some(function) = delta.get("function").and_then(Value::as_object) {
        if let Some(fragment) = function.get("name").and_then(Value::as_str) {
            name.push_str(fragment);
        }
        if let Some(fragment) = function.get("arguments").and_then(Value::as_str) {
            arguments.push_str(fragment);
        }
    }
}
