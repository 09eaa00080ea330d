//! Tracks in-flight requests on the Agent side between their request-header
//! frame and their request-EOF frame.

use std::collections::HashMap;

use bytes::BytesMut;
use dashmap::DashMap;

use crate::protocol::RequestId;

/// One request being assembled from request-header/body-chunk/EOF frames.
pub struct IncomingRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub has_body: bool,
    pub body: Option<BytesMut>,
}

/// Concurrent map of in-flight incoming requests, keyed by request id.
#[derive(Default)]
pub struct IncomingRequestTable {
    inner: DashMap<RequestId, IncomingRequest>,
}

impl IncomingRequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &self,
        id: RequestId,
        method: String,
        path: String,
        headers: HashMap<String, String>,
        has_body: bool,
    ) {
        self.inner.insert(
            id,
            IncomingRequest {
                method,
                path,
                headers,
                has_body,
                body: if has_body { Some(BytesMut::new()) } else { None },
            },
        );
    }

    /// Append a body chunk; silently dropped if the entry is missing or has
    /// no body buffer (defensive, per spec §4.3).
    pub fn append_body(&self, id: &RequestId, chunk: &[u8]) {
        if let Some(mut entry) = self.inner.get_mut(id) {
            if let Some(buf) = entry.body.as_mut() {
                buf.extend_from_slice(chunk);
            }
        }
    }

    /// Remove and return the completed request on EOF.
    pub fn take(&self, id: &RequestId) -> Option<IncomingRequest> {
        self.inner.remove(id).map(|(_, req)| req)
    }
}
