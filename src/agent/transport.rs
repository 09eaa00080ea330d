//! Transport Client: opens and re-opens the duplex channel to the Relay,
//! sends heartbeats, assembles incoming requests, and dispatches them onto
//! the request pipeline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::agent::admin::AgentState;
use crate::agent::context::TunnelContext;
use crate::agent::incoming::IncomingRequestTable;
use crate::agent::pipeline::Pipeline;
use crate::protocol::{Frame, RequestId, ResponseHeaders};
use crate::rules::{RequestLogEntry, RuleStore};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const RECONNECT_DELAY: Duration = Duration::from_secs(3);
const RESPONSE_CHUNK_SIZE: usize = 16 * 1024;

/// Configuration for one agent connection.
#[derive(Debug, Clone)]
pub struct AgentTransportConfig {
    pub relay_url: Url,
    pub agent_id: String,
}

impl AgentTransportConfig {
    fn channel_url(&self) -> Url {
        let mut url = self.relay_url.clone();
        url.query_pairs_mut().append_pair("clientId", &self.agent_id);
        url
    }
}

type WsSink = futures::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Runs the supervisor loop forever: connect, pump until closed, sleep, retry.
/// Returns only when `shutdown` is cancelled.
pub async fn run(
    config: AgentTransportConfig,
    store: Arc<RuleStore>,
    pipeline: Arc<Pipeline>,
    state: Arc<AgentState>,
    shutdown: CancellationToken,
) {
    loop {
        if shutdown.is_cancelled() {
            return;
        }

        info!(agent_id = %config.agent_id, url = %config.channel_url(), "connecting to relay");
        match tokio_tungstenite::connect_async(config.channel_url().as_str()).await {
            Ok((stream, _response)) => {
                state.set_connected(true);
                let (sink, stream) = stream.split();
                let sink = Arc::new(Mutex::new(sink));

                let heartbeat_cancel = CancellationToken::new();
                let heartbeat_task = tokio::spawn(heartbeat_loop(sink.clone(), heartbeat_cancel.clone()));

                run_read_loop(stream, sink.clone(), store.clone(), pipeline.clone(), shutdown.clone()).await;

                heartbeat_cancel.cancel();
                let _ = heartbeat_task.await;
                state.set_connected(false);
            }
            Err(e) => {
                warn!(error = %e, "failed to connect to relay");
            }
        }

        if shutdown.is_cancelled() {
            return;
        }
        state.record_reconnect();
        tokio::select! {
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            _ = shutdown.cancelled() => return,
        }
    }
}

async fn heartbeat_loop(sink: Arc<Mutex<WsSink>>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let frame = Frame::Heartbeat.encode();
                let mut sink = sink.lock().await;
                if let Err(e) = sink.send(Message::Binary(frame.to_vec().into())).await {
                    warn!(error = %e, "heartbeat send failed, terminating heartbeat task");
                    return;
                }
            }
            _ = cancel.cancelled() => return,
        }
    }
}

async fn run_read_loop(
    mut stream: futures::stream::SplitStream<
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    >,
    sink: Arc<Mutex<WsSink>>,
    store: Arc<RuleStore>,
    pipeline: Arc<Pipeline>,
    shutdown: CancellationToken,
) {
    let incoming = Arc::new(IncomingRequestTable::new());

    loop {
        let message = tokio::select! {
            msg = stream.next() => msg,
            _ = shutdown.cancelled() => return,
        };

        let Some(message) = message else {
            info!("relay channel closed");
            return;
        };

        let data = match message {
            Ok(Message::Binary(data)) => Bytes::from(data.to_vec()),
            Ok(Message::Close(_)) => {
                info!("relay sent close frame");
                return;
            }
            Ok(_) => continue,
            Err(e) => {
                error!(error = %e, "error reading from relay channel");
                return;
            }
        };

        let frame = match Frame::decode(data) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(e) => {
                warn!(error = %e, "dropping malformed frame from relay");
                continue;
            }
        };

        match frame {
            Frame::RequestHeader { id, meta } => {
                incoming.create(id, meta.method, meta.path, meta.headers, meta.has_body);
            }
            Frame::RequestBodyChunk { id, chunk } => {
                incoming.append_body(&id, &chunk);
            }
            Frame::RequestEof { id } => {
                if let Some(request) = incoming.take(&id) {
                    let sink = sink.clone();
                    let store = store.clone();
                    let pipeline = pipeline.clone();
                    tokio::spawn(async move {
                        dispatch(id, request, store, pipeline, sink).await;
                    });
                }
            }
            Frame::Heartbeat => {}
            // Response-direction frames never arrive on this side of the channel.
            Frame::ResponseHeader { .. }
            | Frame::ResponseBodyChunk { .. }
            | Frame::ResponseEof { .. } => {
                debug!("ignoring unexpected response-direction frame on agent side");
            }
        }
    }
}

async fn dispatch(
    id: RequestId,
    request: crate::agent::incoming::IncomingRequest,
    store: Arc<RuleStore>,
    pipeline: Arc<Pipeline>,
    sink: Arc<Mutex<WsSink>>,
) {
    let body = request.body.map(|b| b.freeze());
    let preview: String = body
        .as_ref()
        .map(|b| {
            let take = b.len().min(4096);
            String::from_utf8_lossy(&b[..take]).to_string()
        })
        .unwrap_or_default();
    let content_length = body.as_ref().map(|b| b.len()).unwrap_or(0);

    let request_headers_snapshot: HashMap<String, String> = request.headers.clone();
    let mut ctx = TunnelContext::new(id, request.method.clone(), request.path.clone(), request.headers, body);

    pipeline.run(&mut ctx).await;

    let entry = RequestLogEntry {
        request_id: id.to_string(),
        timestamp: chrono::Utc::now(),
        method: ctx.method.clone(),
        path: ctx.path.clone(),
        status: ctx.status,
        duration_ms: ctx.elapsed_ms(),
        applied_chaos_rule: ctx.applied_chaos_rule.clone(),
        applied_mock_rule: ctx.applied_mock_rule.clone(),
        target_url: ctx.target_url.clone(),
        request_headers: request_headers_snapshot,
        request_body_preview: preview,
        request_content_length: content_length,
        response_headers: ctx.response_headers.as_map().clone(),
    };
    store.append_log(entry);

    if let Err(e) = send_response(id, &ctx, sink).await {
        error!(error = %e, request_id = %id, "failed to send response frames to relay");
    }
}

async fn send_response(
    id: RequestId,
    ctx: &TunnelContext,
    sink: Arc<Mutex<WsSink>>,
) -> crate::error::Result<()> {
    let header = Frame::ResponseHeader {
        id,
        status: ctx.status as u32,
        content_type: ctx.content_type.clone(),
        headers: ResponseHeaders(ctx.response_headers.as_map().clone()),
    };
    send_frame(&sink, header).await?;

    for chunk in ctx.response_body.chunks(RESPONSE_CHUNK_SIZE) {
        let frame = Frame::ResponseBodyChunk {
            id,
            chunk: Bytes::copy_from_slice(chunk),
        };
        send_frame(&sink, frame).await?;
    }

    send_frame(&sink, Frame::ResponseEof { id }).await
}

async fn send_frame(sink: &Arc<Mutex<WsSink>>, frame: Frame) -> crate::error::Result<()> {
    let encoded = frame.encode();
    let mut sink = sink.lock().await;
    sink.send(Message::Binary(encoded.to_vec().into())).await?;
    Ok(())
}
