//! Intake: accepts the Agent's WebSocket upgrade, reads response-direction
//! frames off it, and feeds them into the pending/active-channel tables.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::protocol::Frame;
use crate::relay::registry::AgentChannel;
use crate::relay::RelayState;

/// `GET /tunnel?clientId=<agent-id>` -- the duplex channel upgrade endpoint.
pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<RelayState>,
) -> Response {
    let agent_id = match params.get("clientId") {
        Some(id) if !id.is_empty() => id.clone(),
        _ => return (StatusCode::BAD_REQUEST, "missing clientId query parameter").into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, agent_id, state))
}

async fn handle_socket(socket: WebSocket, agent_id: String, state: RelayState) {
    let (sink, mut stream) = socket.split();
    let channel = Arc::new(AgentChannel::new(sink));
    state.registry.register(agent_id.clone(), channel.clone());
    info!(agent_id = %agent_id, "agent connected");

    loop {
        let message = match stream.next().await {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                warn!(agent_id = %agent_id, error = %e, "error reading from agent channel");
                break;
            }
            None => {
                info!(agent_id = %agent_id, "agent channel closed");
                break;
            }
        };

        let data = match message {
            Message::Binary(data) => Bytes::from(data.to_vec()),
            Message::Close(_) => {
                info!(agent_id = %agent_id, "agent sent close frame");
                break;
            }
            _ => continue,
        };

        let frame = match Frame::decode(data) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(e) => {
                warn!(agent_id = %agent_id, error = %e, "dropping malformed frame from agent");
                continue;
            }
        };

        match frame {
            Frame::ResponseHeader {
                id,
                status,
                content_type,
                headers,
            } => {
                let status = status.min(u16::MAX as u32) as u16;
                if let Some(body_tx) = state
                    .pending
                    .fulfill(id, status, content_type, headers.0)
                {
                    state.active.insert(id, body_tx);
                } else {
                    debug!(request_id = %id, "response header for unknown/expired request");
                }
            }
            Frame::ResponseBodyChunk { id, chunk } => {
                if !state.active.push(&id, chunk).await {
                    debug!(request_id = %id, "response chunk for unknown/closed request");
                }
            }
            Frame::ResponseEof { id } => {
                state.active.close(&id);
            }
            Frame::Heartbeat => {}
            Frame::RequestHeader { .. } | Frame::RequestBodyChunk { .. } | Frame::RequestEof { .. } => {
                debug!(agent_id = %agent_id, "ignoring unexpected request-direction frame on relay side");
            }
        }
    }

    state.registry.unregister_if_current(&agent_id, &channel);
    info!(agent_id = %agent_id, "agent disconnected");
}
