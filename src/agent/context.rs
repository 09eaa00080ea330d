//! Per-request mutable state threaded through the Agent's request pipeline.

use std::collections::HashMap;
use std::time::Instant;

use bytes::Bytes;

use crate::protocol::RequestId;

/// Case-insensitive header map that preserves multiple values per key
/// (needed for things like repeated `Set-Cookie` on the response side).
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    inner: HashMap<String, Vec<String>>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_single_valued(src: HashMap<String, String>) -> Self {
        let mut inner = HashMap::new();
        for (k, v) in src {
            inner.insert(k.to_ascii_lowercase(), vec![v]);
        }
        Self { inner }
    }

    pub fn insert(&mut self, key: &str, value: String) {
        self.inner
            .entry(key.to_ascii_lowercase())
            .or_default()
            .push(value);
    }

    pub fn set(&mut self, key: &str, value: String) {
        self.inner.insert(key.to_ascii_lowercase(), vec![value]);
    }

    pub fn get_first(&self, key: &str) -> Option<&str> {
        self.inner
            .get(&key.to_ascii_lowercase())
            .and_then(|v| v.first())
            .map(|s| s.as_str())
    }

    pub fn get_all(&self, key: &str) -> &[String] {
        self.inner
            .get(&key.to_ascii_lowercase())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn remove(&mut self, key: &str) {
        self.inner.remove(&key.to_ascii_lowercase());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.inner.iter()
    }

    pub fn as_map(&self) -> &HashMap<String, Vec<String>> {
        &self.inner
    }

    pub fn to_single_valued(&self) -> HashMap<String, String> {
        self.inner
            .iter()
            .map(|(k, v)| (k.clone(), v.join(", ")))
            .collect()
    }
}

/// Per-request mutable record used only inside the Agent pipeline.
pub struct TunnelContext {
    pub request_id: RequestId,
    pub method: String,
    pub path: String,
    pub request_headers: HeaderMap,
    pub request_body: Option<Bytes>,

    pub target_url: String,

    pub status: u16,
    pub content_type: String,
    pub response_body: Bytes,
    pub response_headers: HeaderMap,

    pub is_handled: bool,
    pub started_at: Instant,

    pub applied_chaos_rule: Option<String>,
    pub applied_mock_rule: Option<String>,
}

impl TunnelContext {
    pub fn new(
        request_id: RequestId,
        method: String,
        path: String,
        request_headers: HashMap<String, String>,
        request_body: Option<Bytes>,
    ) -> Self {
        Self {
            request_id,
            method,
            path,
            request_headers: HeaderMap::from_single_valued(request_headers),
            request_body,
            target_url: String::new(),
            status: 200,
            content_type: "application/octet-stream".to_string(),
            response_body: Bytes::new(),
            response_headers: HeaderMap::new(),
            is_handled: false,
            started_at: Instant::now(),
            applied_chaos_rule: None,
            applied_mock_rule: None,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }
}
