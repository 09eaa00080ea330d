//! Agent Registry: maps agent id to the live duplex channel for that agent.
//!
//! Exactly one channel is addressable per agent id at a time. If an agent
//! reconnects under the same id, the new channel replaces the old one
//! (last-writer-wins, per spec §9's open question); the previous connection
//! is left to run until its own read loop observes a close or error and
//! removes itself, at which point any of its still-pending requests have
//! already timed out independently in the pending table.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use dashmap::DashMap;
use futures::stream::SplitSink;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::protocol::Frame;

/// The write half of one agent's duplex channel, serialized behind a mutex
/// so the intake read loop and the egress proxy never interleave frames.
pub struct AgentChannel {
    sink: Mutex<SplitSink<WebSocket, Message>>,
}

impl AgentChannel {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }

    pub async fn send(&self, frame: Frame) -> Result<()> {
        use futures::SinkExt;
        let encoded = frame.encode();
        let mut sink = self.sink.lock().await;
        sink.send(Message::Binary(encoded.to_vec().into())).await?;
        Ok(())
    }
}

/// Concurrent agent-id -> channel map.
#[derive(Default)]
pub struct AgentRegistry {
    inner: DashMap<String, Arc<AgentChannel>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the channel for an agent id, returning it.
    pub fn register(&self, agent_id: String, channel: Arc<AgentChannel>) -> Arc<AgentChannel> {
        self.inner.insert(agent_id, channel.clone());
        channel
    }

    pub fn get(&self, agent_id: &str) -> Option<Arc<AgentChannel>> {
        self.inner.get(agent_id).map(|entry| entry.value().clone())
    }

    /// Remove the registry entry for `agent_id` only if it still points at
    /// `current` -- avoids an orphaned connection's cleanup clobbering a
    /// fresher reconnect that has already replaced it.
    pub fn unregister_if_current(&self, agent_id: &str, current: &Arc<AgentChannel>) {
        self.inner
            .remove_if(agent_id, |_, existing| Arc::ptr_eq(existing, current));
    }

    pub async fn send_to(&self, agent_id: &str, frame: Frame) -> Result<()> {
        match self.get(agent_id) {
            Some(channel) => channel.send(frame).await,
            None => Err(Error::UnknownAgent {
                agent_id: agent_id.to_string(),
            }),
        }
    }

    pub fn is_online(&self, agent_id: &str) -> bool {
        self.inner.contains_key(agent_id)
    }

    pub fn online_count(&self) -> usize {
        self.inner.len()
    }
}
