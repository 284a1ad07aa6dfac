use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
    Router,
};
use bytes::Bytes;
use futures::StreamExt;
use http_body_util::BodyExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::middleware::{self, RequestMeta};
use crate::reconstruct::StreamReconstructor;
use crate::sink::{EventSink, RawChunkSink};
use crate::tokens::TokenCounter;
use crate::types::correlation_key;

/// Shared, read-only state: one instance for the whole process, cloned per
/// request. Request tasks share nothing mutable.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub client: reqwest::Client,
    pub sink: Arc<dyn EventSink>,
    pub raw_sink: Option<Arc<dyn RawChunkSink>>,
    pub counter: Arc<dyn TokenCounter>,
}

/// Builds the proxy router: every method on every path is relayed upstream.
pub fn router(state: AppState) -> Router {
    Router::new()
        .fallback(proxy_handler)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::capture_request,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Relays one inbound request to the configured upstream and duplexes a
/// streaming response to the caller and the reconstructor.
pub async fn proxy_handler(State(state): State<AppState>, req: Request) -> Response {
    let key = req
        .extensions()
        .get::<RequestMeta>()
        .map(|meta| meta.correlation_key.clone())
        .unwrap_or_else(|| correlation_key(&chrono::Utc::now()));

    // Path and query are appended to the configured origin verbatim.
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let upstream_url = format!(
        "{}{}",
        state.config.upstream_origin.trim_end_matches('/'),
        path_and_query
    );

    tracing::debug!("proxying request to: {}", upstream_url);

    let (parts, body) = req.into_parts();

    // The middleware already buffered the body, so this collect is in-memory.
    let body_bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            tracing::error!("failed to read buffered request body: {}", e);
            return text_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read body");
        }
    };

    // Host and Content-Length are recomputed by the client. Accept-Encoding
    // is dropped to force an identity response: the client does not
    // decompress, and a compressed body would be unreadable to the
    // reconstructor and mislabeled once Content-Encoding is stripped.
    let mut headers = parts.headers;
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::ACCEPT_ENCODING);

    let upstream_response = match state
        .client
        .request(parts.method, upstream_url.as_str())
        .headers(headers)
        .body(body_bytes)
        .send()
        .await
    {
        Ok(resp) => resp,
        Err(e) => {
            tracing::error!("failed to proxy request: {}", e);
            return text_response(StatusCode::BAD_GATEWAY, &format!("Upstream error: {}", e));
        }
    };

    let status = upstream_response.status();
    let response_headers = relay_headers(upstream_response.headers());
    let content_type = upstream_response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !content_type.contains("text/event-stream") {
        // One-shot response: relay status, headers, and body atomically.
        let body = match upstream_response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!("failed to read upstream body: {}", e);
                return text_response(StatusCode::BAD_GATEWAY, &format!("Upstream error: {}", e));
            }
        };
        return build_response(status, response_headers, Body::from(body));
    }

    tracing::debug!("upstream response is an event stream, starting tee");

    // Stream-tee: the spawned task reads upstream chunks one at a time,
    // feeding the reconstructor and the audit sink before handing each chunk
    // to the caller's response stream.
    let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(32);

    let sink = state.sink.clone();
    let raw_sink = state.raw_sink.clone();
    tokio::spawn(async move {
        handle_stream_tee(upstream_response, tx, sink, raw_sink, key).await;
    });

    let body = Body::from_stream(ReceiverStream::new(rx));
    build_response(status, response_headers, body)
}

/// Forwards chunks to the client while feeding the reconstructor, strictly
/// one chunk at a time, in arrival order.
async fn handle_stream_tee(
    upstream_response: reqwest::Response,
    client_tx: mpsc::Sender<Result<Bytes, std::io::Error>>,
    sink: Arc<dyn EventSink>,
    raw_sink: Option<Arc<dyn RawChunkSink>>,
    key: String,
) {
    let mut reconstructor = StreamReconstructor::new();
    let mut stream = upstream_response.bytes_stream();

    loop {
        match stream.next().await {
            Some(Ok(chunk)) => {
                reconstructor.feed_bytes(&chunk);

                if let Some(raw) = &raw_sink {
                    raw.on_chunk(&key, &chunk).await;
                }

                if client_tx.send(Ok(chunk)).await.is_err() {
                    // Normal termination: the caller went away, stop reading
                    // and emit whatever was accumulated.
                    tracing::debug!("client disconnected mid-stream");
                    break;
                }
            }
            Some(Err(e)) => {
                tracing::error!("error reading upstream body: {}", e);
                let _ = client_tx
                    .send(Err(std::io::Error::other(e.to_string())))
                    .await;
                break;
            }
            None => break,
        }
    }

    let reconstructed = reconstructor.finalize();
    tracing::info!(
        status = ?reconstructed.status,
        correlation_key = %key,
        "response stream complete"
    );
    sink.on_response_reconstructed(&reconstructed, &key).await;
}

/// Upstream headers minus the ones invalidated by re-framing the body.
fn relay_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = upstream.clone();
    headers.remove(header::CONTENT_ENCODING);
    headers.remove(header::TRANSFER_ENCODING);
    headers.remove(header::CONTENT_LENGTH);
    headers
}

fn build_response(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn text_response(status: StatusCode, message: &str) -> Response {
    let mut response = Response::new(Body::from(message.to_string()));
    *response.status_mut() = status;
    response
}
