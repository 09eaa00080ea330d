//! Pending-request bookkeeping on the Relay side: a one-shot slot that the
//! intake loop fills in when the agent's response-header frame arrives, and
//! a streaming body-chunk channel that the intake loop feeds until the
//! agent's response-EOF frame closes it.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};

use crate::protocol::RequestId;

/// How long the Public HTTP Front waits for a response header before giving
/// up and answering 504 (spec §4.4/§7).
pub const RESPONSE_DEADLINE: Duration = Duration::from_secs(30);

/// Backpressure bound on the body-chunk channel between the intake read loop
/// and the egress handler streaming the response body out.
const BODY_CHANNEL_CAPACITY: usize = 64;

/// Everything the egress handler needs once a response header has arrived.
pub struct ResponseHead {
    pub status: u16,
    pub content_type: String,
    pub headers: HashMap<String, Vec<String>>,
    pub body_rx: mpsc::Receiver<Bytes>,
}

/// Table of requests awaiting a response header from their agent.
#[derive(Default)]
pub struct PendingTable {
    inner: DashMap<RequestId, oneshot::Sender<ResponseHead>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request before any frames are sent to the agent, so the
    /// header can never race ahead of this entry.
    pub fn insert(&self, id: RequestId) -> oneshot::Receiver<ResponseHead> {
        let (tx, rx) = oneshot::channel();
        self.inner.insert(id, tx);
        rx
    }

    /// Called by the intake loop on a response-header frame. Returns the
    /// writer end of a fresh body-chunk channel for the active-channel table
    /// to feed, or `None` if nobody is waiting (already timed out, or a
    /// stray duplicate header).
    pub fn fulfill(
        &self,
        id: RequestId,
        status: u16,
        content_type: String,
        headers: HashMap<String, Vec<String>>,
    ) -> Option<mpsc::Sender<Bytes>> {
        let (_, tx) = self.inner.remove(&id)?;
        let (body_tx, body_rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);
        let head = ResponseHead {
            status,
            content_type,
            headers,
            body_rx,
        };
        // Ignore send errors: the egress handler may have already timed out
        // and dropped its receiver between our remove() and this send.
        let _ = tx.send(head);
        Some(body_tx)
    }

    /// Remove a pending entry without fulfilling it, e.g. on timeout.
    pub fn remove(&self, id: &RequestId) {
        self.inner.remove(id);
    }
}

/// Table of response-body channels currently streaming, keyed by request id.
/// An entry exists from the moment `PendingTable::fulfill` creates it until
/// the response-EOF frame (or a timeout) closes it.
#[derive(Default)]
pub struct ActiveChannelTable {
    inner: DashMap<RequestId, mpsc::Sender<Bytes>>,
}

impl ActiveChannelTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: RequestId, sender: mpsc::Sender<Bytes>) {
        self.inner.insert(id, sender);
    }

    /// Push a body chunk, awaiting backpressure if the channel is full.
    /// Returns `false` if there is no active channel for this id (already
    /// closed or never registered) so the caller can drop the frame.
    pub async fn push(&self, id: &RequestId, chunk: Bytes) -> bool {
        let sender = match self.inner.get(id) {
            Some(entry) => entry.value().clone(),
            None => return false,
        };
        sender.send(chunk).await.is_ok()
    }

    /// Close (and remove) the channel for `id`; dropping the sender ends the
    /// receiver stream on the egress side.
    pub fn close(&self, id: &RequestId) {
        self.inner.remove(id);
    }
}
