use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use tokio::sync::mpsc;

use crate::types::{ReconstructedResponse, RequestEvent};

/// Receives structured observability events from the relay. Implementations
/// own all naming, directory, and serialization concerns; they must be safe
/// for concurrent invocation across request tasks.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn on_request_event(&self, event: &RequestEvent);

    /// `correlation_key` matches `RequestEvent::correlation_key()` of the
    /// originating request.
    async fn on_response_reconstructed(
        &self,
        response: &ReconstructedResponse,
        correlation_key: &str,
    );
}

/// Optionally receives every raw upstream chunk verbatim, in arrival order,
/// for byte-exact audit logging.
#[async_trait]
pub trait RawChunkSink: Send + Sync {
    async fn on_chunk(&self, correlation_key: &str, chunk: &Bytes);
}

/// Persists each event as a pretty-printed JSON file under the prompts
/// directory. Write failures are logged and never fail the request.
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    async fn write_json<T: serde::Serialize>(&self, filename: String, value: &T) {
        let path = self.dir.join(filename);
        let json = match serde_json::to_vec_pretty(value) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("failed to serialize event: {}", e);
                return;
            }
        };
        if let Err(e) = tokio::fs::write(&path, json).await {
            tracing::warn!("failed to write {}: {}", path.display(), e);
        }
    }
}

#[async_trait]
impl EventSink for FileSink {
    async fn on_request_event(&self, event: &RequestEvent) {
        self.write_json(format!("{}_request.json", event.correlation_key()), event)
            .await;
    }

    async fn on_response_reconstructed(
        &self,
        response: &ReconstructedResponse,
        correlation_key: &str,
    ) {
        self.write_json(format!("{}_response.json", correlation_key), response)
            .await;
    }
}

/// Appends every raw upstream chunk to `<key>_stream.raw` for byte-exact
/// replay of a streamed response.
pub struct RawFileSink {
    dir: PathBuf,
}

impl RawFileSink {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl RawChunkSink for RawFileSink {
    async fn on_chunk(&self, correlation_key: &str, chunk: &Bytes) {
        let path = self.dir.join(format!("{}_stream.raw", correlation_key));
        let result = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            tokio::io::AsyncWriteExt::write_all(&mut file, chunk).await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!("failed to append to {}: {}", path.display(), e);
        }
    }
}

/// One event flowing from the relay to an in-process consumer (dashboard,
/// aggregator) over a bounded channel.
#[derive(Debug)]
pub enum SinkEvent {
    Request(RequestEvent),
    Response {
        response: ReconstructedResponse,
        correlation_key: String,
    },
}

/// Forwards events into a bounded tokio channel. If the consumer falls behind
/// or goes away, events are dropped with a warning rather than stalling the
/// relay.
pub struct ChannelSink {
    tx: mpsc::Sender<SinkEvent>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<SinkEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    fn send(&self, event: SinkEvent) {
        if let Err(e) = self.tx.try_send(event) {
            tracing::warn!("dropping sink event: {}", e);
        }
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn on_request_event(&self, event: &RequestEvent) {
        self.send(SinkEvent::Request(event.clone()));
    }

    async fn on_response_reconstructed(
        &self,
        response: &ReconstructedResponse,
        correlation_key: &str,
    ) {
        self.send(SinkEvent::Response {
            response: response.clone(),
            correlation_key: correlation_key.to_string(),
        });
    }
}
