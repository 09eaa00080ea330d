//! Public HTTP Front: the public-facing side of the tunnel. Classifies the
//! inbound request by Host header, dispatches it to the addressed agent's
//! duplex channel, and streams the agent's response back to the caller.

use std::collections::HashMap;

use axum::body::Body;
use bytes::Bytes;
use axum::extract::{Request, State};
use axum::http::header::{HeaderName, HeaderValue, CONTENT_TYPE, HOST, TRANSFER_ENCODING};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use http_body_util::BodyExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use crate::protocol::{Frame, RequestId, RequestMeta};
use crate::relay::pending::RESPONSE_DEADLINE;
use crate::relay::RelayState;

const REQUEST_CHUNK_SIZE: usize = 16 * 1024;

const LANDING_PAGE: &str = "tunnelforge: no agent selected for this host\n";

/// First dot-separated label of `host`, stripped of a trailing port.
fn first_label(host: &str) -> &str {
    let host = host.split(':').next().unwrap_or(host);
    host.split('.').next().unwrap_or(host)
}

fn is_landing_label(label: &str) -> bool {
    label.eq_ignore_ascii_case("localhost")
        || label
            .chars()
            .next()
            .map(|c| c.is_ascii_digit())
            .unwrap_or(true)
}

/// Handles every public HTTP request, regardless of method or path.
pub async fn handle_public_request(State(state): State<RelayState>, req: Request) -> Response {
    let host = req
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let label = first_label(&host);

    if is_landing_label(label) {
        return (StatusCode::OK, LANDING_PAGE).into_response();
    }
    let agent_id = label.to_string();

    if !state.registry.is_online(&agent_id) {
        return (StatusCode::NOT_FOUND, "tunnel offline").into_response();
    }

    dispatch(state, agent_id, req).await
}

async fn dispatch(state: RelayState, agent_id: String, req: Request) -> Response {
    let method = req.method().to_string();
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let mut has_body = false;
    let mut headers = HashMap::new();
    for name in req.headers().keys() {
        if name == HOST || name == TRANSFER_ENCODING {
            continue;
        }
        let values: Vec<&str> = req
            .headers()
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        if !values.is_empty() {
            headers.insert(name.to_string(), values.join(", "));
        }
    }
    if req
        .headers()
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(|len| len > 0)
        .unwrap_or(false)
        || req.headers().contains_key(TRANSFER_ENCODING)
    {
        has_body = true;
    }

    let id = RequestId::new();
    let body_rx = state.pending.insert(id);

    let channel = match state.registry.get(&agent_id) {
        Some(channel) => channel,
        None => {
            state.pending.remove(&id);
            return (StatusCode::NOT_FOUND, "tunnel offline").into_response();
        }
    };

    let meta = RequestMeta {
        method,
        path,
        headers,
        has_body,
    };
    if let Err(e) = channel.send(Frame::RequestHeader { id, meta }).await {
        warn!(request_id = %id, error = %e, "failed to dispatch request header to agent");
        state.pending.remove(&id);
        return (StatusCode::BAD_GATEWAY, "failed to reach agent").into_response();
    }

    if has_body {
        let body = req.into_body();
        match body.collect().await {
            Ok(collected) => {
                let bytes = collected.to_bytes();
                for chunk in bytes.chunks(REQUEST_CHUNK_SIZE) {
                    let frame = Frame::RequestBodyChunk {
                        id,
                        chunk: Bytes::copy_from_slice(chunk),
                    };
                    if channel.send(frame).await.is_err() {
                        break;
                    }
                }
            }
            Err(e) => {
                warn!(request_id = %id, error = %e, "failed to read request body");
            }
        }
    }
    let _ = channel.send(Frame::RequestEof { id }).await;

    match tokio::time::timeout(RESPONSE_DEADLINE, body_rx).await {
        Ok(Ok(head)) => build_response(head),
        Ok(Err(_)) => {
            // Sender dropped without fulfilling -- treat as a timeout too.
            state.pending.remove(&id);
            state.active.close(&id);
            (StatusCode::GATEWAY_TIMEOUT, "agent did not respond").into_response()
        }
        Err(_) => {
            state.pending.remove(&id);
            state.active.close(&id);
            (StatusCode::GATEWAY_TIMEOUT, "agent did not respond").into_response()
        }
    }
}

fn build_response(head: crate::relay::pending::ResponseHead) -> Response {
    let status =
        StatusCode::from_u16(head.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let stream = ReceiverStream::new(head.body_rx).map(Ok::<_, std::io::Error>);
    let body = Body::from_stream(stream);

    let mut builder = Response::builder().status(status);
    if let Some(h) = builder.headers_mut() {
        if let Ok(value) = HeaderValue::from_str(&head.content_type) {
            h.insert(CONTENT_TYPE, value);
        }
        for (name, values) in &head.headers {
            if name.eq_ignore_ascii_case("content-type") || name.eq_ignore_ascii_case("transfer-encoding")
            {
                continue;
            }
            let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
                continue;
            };
            for value in values {
                if let Ok(header_value) = HeaderValue::from_str(value) {
                    h.append(header_name.clone(), header_value);
                }
            }
        }
    }

    builder
        .body(body)
        .unwrap_or_else(|_| (StatusCode::INTERNAL_SERVER_ERROR, "response build failed").into_response())
}

