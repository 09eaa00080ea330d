//! LocalForwarder: the fourth and final pipeline stage. Performs the actual
//! outbound HTTP call to `ctx.target_url` against the local service.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Method};
use tracing::error;

use crate::agent::context::TunnelContext;
use crate::agent::pipeline::Stage;

const FORWARD_TIMEOUT: Duration = Duration::from_secs(30);

/// Headers that describe the prior hop, never forwarded onward.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
    "te",
];

fn is_hop_by_hop(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    HOP_BY_HOP_HEADERS.contains(&lower.as_str()) || lower.starts_with("proxy-")
}

pub struct LocalForwarder {
    client: Client,
}

impl LocalForwarder {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(FORWARD_TIMEOUT)
            .build()
            .expect("reqwest client builds with static configuration");
        Self { client }
    }
}

impl Default for LocalForwarder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Stage for LocalForwarder {
    async fn process(&self, ctx: &mut TunnelContext) {
        let method = Method::from_bytes(ctx.method.as_bytes()).unwrap_or(Method::GET);

        let mut builder = self.client.request(method, &ctx.target_url);
        for (name, values) in ctx.request_headers.iter() {
            if is_hop_by_hop(name) {
                continue;
            }
            for value in values {
                builder = builder.header(name, value);
            }
        }
        if let Some(body) = ctx.request_body.clone() {
            builder = builder.body(body);
        }

        match builder.send().await {
            Ok(response) => {
                ctx.status = response.status().as_u16();
                ctx.content_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "application/octet-stream".to_string());

                for (name, value) in response.headers() {
                    if name.as_str().eq_ignore_ascii_case("content-type") {
                        continue;
                    }
                    if let Ok(value_str) = value.to_str() {
                        ctx.response_headers.insert(name.as_str(), value_str.to_string());
                    }
                }

                match response.bytes().await {
                    Ok(body) => ctx.response_body = body,
                    Err(e) => {
                        error!(error = %e, "failed reading local service response body");
                        ctx.response_body = Bytes::new();
                    }
                }
            }
            Err(e) => {
                error!(error = %e, target = %ctx.target_url, "local service unreachable");
                ctx.status = 502;
                ctx.content_type = "text/plain".to_string();
                ctx.response_body = Bytes::from(format!("Bad Gateway: {e}"));
                ctx.response_headers = Default::default();
            }
        }
    }
}
