use chrono::{DateTime, Utc};
use serde::Serialize;

/// One message extracted from a request body, in conversation order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NormalizedMessage {
    pub role: String,
    pub content: String,
}

/// Canonical form of a request body, independent of provider shape.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedRequest {
    pub model: String,
    /// All message text joined in order, used only for token counting.
    pub total_text: String,
    pub messages: Vec<NormalizedMessage>,
}

/// One observability event per inbound request. Built once the body is fully
/// read, immutable afterwards.
#[derive(Clone, Debug, Serialize)]
pub struct RequestEvent {
    pub received_at: DateTime<Utc>,
    pub upstream_label: String,
    pub model: String,
    pub token_count: usize,
    pub messages: Vec<NormalizedMessage>,
    /// Original decoded JSON body, retained verbatim for audit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_body: Option<serde_json::Value>,
    pub path: String,
}

impl RequestEvent {
    /// Key shared with the reconstructed response so a sink can pair them.
    pub fn correlation_key(&self) -> String {
        correlation_key(&self.received_at)
    }
}

/// Filesystem-safe timestamp key tying a response back to its request.
pub fn correlation_key(received_at: &DateTime<Utc>) -> String {
    received_at.format("%Y%m%dT%H%M%S%.6fZ").to_string()
}

/// Whether a reconstruction ran to the end of the stream or was halted on an
/// unrecognized chunk type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconstructionStatus {
    Complete,
    Halted,
}

/// Provider-shaped completion object rebuilt from streamed deltas.
#[derive(Clone, Debug, Serialize)]
pub struct ReconstructedResponse {
    pub status: ReconstructionStatus,
    pub body: serde_json::Value,
}
