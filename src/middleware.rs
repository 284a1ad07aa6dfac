use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use http_body_util::BodyExt;

use crate::normalize::normalize;
use crate::proxy::AppState;
use crate::types::{correlation_key, RequestEvent};

/// Correlation info carried from body capture to the proxy handler.
#[derive(Clone, Debug)]
pub struct RequestMeta {
    pub correlation_key: String,
}

/// Buffers the inbound body, normalizes it, emits a `RequestEvent` when the
/// body is a recognizable chat request, then restores the body so the proxy
/// handler can forward it byte-for-byte.
pub async fn capture_request(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let collected = match req.body_mut().collect().await {
        Ok(collected) => collected,
        Err(e) => {
            tracing::error!("failed to read request body: {}", e);
            let mut response = Response::new(Body::from("Failed to read request body"));
            *response.status_mut() = axum::http::StatusCode::BAD_REQUEST;
            return response;
        }
    };
    let body_bytes = collected.to_bytes();

    let received_at = Utc::now();
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    if let Some(normalized) = normalize(&body_bytes, req.uri().path()) {
        let event = RequestEvent {
            received_at,
            upstream_label: state.config.upstream_label(),
            model: normalized.model,
            token_count: state.counter.count(&normalized.total_text),
            messages: normalized.messages,
            raw_body: serde_json::from_slice(&body_bytes).ok(),
            path,
        };

        tracing::info!(
            model = %event.model,
            tokens = event.token_count,
            path = %event.path,
            "captured request"
        );
        state.sink.on_request_event(&event).await;
    } else {
        // Empty or non-JSON body: no event, but the request is still proxied.
        tracing::debug!(path = %path, "request body not normalizable, forwarding untouched");
    }

    req.extensions_mut().insert(RequestMeta {
        correlation_key: correlation_key(&received_at),
    });

    *req.body_mut() = Body::from(body_bytes);

    next.run(req).await
}
