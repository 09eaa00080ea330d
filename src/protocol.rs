//! Binary frame protocol for the Relay<->Agent duplex channel.
//!
//! Every frame except the standalone heartbeat begins with a 16-byte
//! [`RequestId`], then a 1-byte type tag, then type-specific payload. All
//! multi-byte integers are little-endian. See spec §6 for the exact wire
//! layout of each frame type.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};

/// 128-bit opaque identifier correlating all frames of one public request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub [u8; 16]);

impl RequestId {
    /// Generate a fresh, uniformly random request id.
    pub fn new() -> Self {
        Self(*uuid::Uuid::new_v4().as_bytes())
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", uuid::Uuid::from_bytes(self.0))
    }
}

/// Relay->Agent request-header JSON payload (frame 0x10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMeta {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(rename = "hasBody", default)]
    pub has_body: bool,
}

/// Agent->Relay response-header payload (frame 0x01). Multi-valued headers
/// are preserved as lists, matching §6's `map str -> list<str>` layout.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResponseHeaders(pub HashMap<String, Vec<String>>);

/// A decoded tunnel frame.
#[derive(Debug, Clone)]
pub enum Frame {
    /// 0x00 heartbeat, single byte, no request id.
    Heartbeat,
    /// 0x10 Relay->Agent request header.
    RequestHeader { id: RequestId, meta: RequestMeta },
    /// 0x11 Relay->Agent request body chunk.
    RequestBodyChunk { id: RequestId, chunk: Bytes },
    /// 0x12 Relay->Agent request EOF.
    RequestEof { id: RequestId },
    /// 0x01 Agent->Relay response header.
    ResponseHeader {
        id: RequestId,
        status: u32,
        content_type: String,
        headers: ResponseHeaders,
    },
    /// 0x02 Agent->Relay response body chunk.
    ResponseBodyChunk { id: RequestId, chunk: Bytes },
    /// 0x03 Agent->Relay response EOF.
    ResponseEof { id: RequestId },
}

mod type_tag {
    pub const HEARTBEAT: u8 = 0x00;
    pub const RESP_HEADER: u8 = 0x01;
    pub const RESP_BODY_CHUNK: u8 = 0x02;
    pub const RESP_EOF: u8 = 0x03;
    pub const REQ_HEADER: u8 = 0x10;
    pub const REQ_BODY_CHUNK: u8 = 0x11;
    pub const REQ_EOF: u8 = 0x12;
}

/// Minimum frame size (id + type byte) for any frame that carries a request id.
const MIN_FRAMED_SIZE: usize = 17;

impl Frame {
    /// Encode this frame into a single logical message for the duplex channel.
    pub fn encode(&self) -> Bytes {
        match self {
            Frame::Heartbeat => {
                let mut buf = BytesMut::with_capacity(1);
                buf.put_u8(type_tag::HEARTBEAT);
                buf.freeze()
            }
            Frame::RequestHeader { id, meta } => {
                let json = serde_json::to_vec(meta).expect("RequestMeta always serializes");
                let mut buf = BytesMut::with_capacity(17 + 4 + json.len());
                buf.put_slice(&id.0);
                buf.put_u8(type_tag::REQ_HEADER);
                buf.put_u32_le(json.len() as u32);
                buf.put_slice(&json);
                buf.freeze()
            }
            Frame::RequestBodyChunk { id, chunk } => {
                let mut buf = BytesMut::with_capacity(17 + chunk.len());
                buf.put_slice(&id.0);
                buf.put_u8(type_tag::REQ_BODY_CHUNK);
                buf.put_slice(chunk);
                buf.freeze()
            }
            Frame::RequestEof { id } => {
                let mut buf = BytesMut::with_capacity(17);
                buf.put_slice(&id.0);
                buf.put_u8(type_tag::REQ_EOF);
                buf.freeze()
            }
            Frame::ResponseHeader {
                id,
                status,
                content_type,
                headers,
            } => {
                let ct_bytes = content_type.as_bytes();
                let hdr_json =
                    serde_json::to_vec(&headers.0).expect("ResponseHeaders always serializes");
                let mut buf =
                    BytesMut::with_capacity(17 + 4 + 4 + ct_bytes.len() + 4 + hdr_json.len());
                buf.put_slice(&id.0);
                buf.put_u8(type_tag::RESP_HEADER);
                buf.put_u32_le(*status);
                buf.put_u32_le(ct_bytes.len() as u32);
                buf.put_slice(ct_bytes);
                buf.put_u32_le(hdr_json.len() as u32);
                buf.put_slice(&hdr_json);
                buf.freeze()
            }
            Frame::ResponseBodyChunk { id, chunk } => {
                let mut buf = BytesMut::with_capacity(17 + chunk.len());
                buf.put_slice(&id.0);
                buf.put_u8(type_tag::RESP_BODY_CHUNK);
                buf.put_slice(chunk);
                buf.freeze()
            }
            Frame::ResponseEof { id } => {
                let mut buf = BytesMut::with_capacity(17);
                buf.put_slice(&id.0);
                buf.put_u8(type_tag::RESP_EOF);
                buf.freeze()
            }
        }
    }

    /// Decode one logical message into a frame.
    ///
    /// Returns `Ok(None)` for an unknown type byte — per §4.1 an unknown type
    /// must be dropped silently rather than terminating the channel. Returns
    /// `Err` for frames shorter than their minimum declared size or with
    /// inconsistent length prefixes.
    pub fn decode(mut data: Bytes) -> Result<Option<Frame>> {
        if data.is_empty() {
            return Err(Error::malformed("empty frame"));
        }

        if data.len() == 1 && data[0] == type_tag::HEARTBEAT {
            return Ok(Some(Frame::Heartbeat));
        }

        if data.len() < MIN_FRAMED_SIZE {
            return Err(Error::malformed(format!(
                "frame too short: {} bytes",
                data.len()
            )));
        }

        let mut id_bytes = [0u8; 16];
        id_bytes.copy_from_slice(&data[0..16]);
        let id = RequestId(id_bytes);
        let type_byte = data[16];
        data.advance(17);

        match type_byte {
            type_tag::HEARTBEAT => Ok(Some(Frame::Heartbeat)),
            type_tag::REQ_HEADER => {
                if data.len() < 4 {
                    return Err(Error::malformed("request header: missing length prefix"));
                }
                let meta_len = data.get_u32_le() as usize;
                if data.remaining() < meta_len {
                    return Err(Error::malformed("request header: truncated JSON"));
                }
                let json = data.split_to(meta_len);
                let meta: RequestMeta = serde_json::from_slice(&json)
                    .map_err(|e| Error::malformed(format!("request header JSON: {e}")))?;
                Ok(Some(Frame::RequestHeader { id, meta }))
            }
            type_tag::REQ_BODY_CHUNK => Ok(Some(Frame::RequestBodyChunk { id, chunk: data })),
            type_tag::REQ_EOF => Ok(Some(Frame::RequestEof { id })),
            type_tag::RESP_HEADER => {
                if data.len() < 4 {
                    return Err(Error::malformed("response header: missing status"));
                }
                let status = data.get_u32_le();
                if data.len() < 4 {
                    return Err(Error::malformed("response header: missing ct length"));
                }
                let ct_len = data.get_u32_le() as usize;
                if data.remaining() < ct_len {
                    return Err(Error::malformed("response header: truncated content-type"));
                }
                let content_type = String::from_utf8(data.split_to(ct_len).to_vec())
                    .map_err(|e| Error::malformed(format!("content-type not UTF-8: {e}")))?;
                if data.len() < 4 {
                    return Err(Error::malformed("response header: missing hdr length"));
                }
                let hdr_len = data.get_u32_le() as usize;
                if data.remaining() < hdr_len {
                    return Err(Error::malformed("response header: truncated headers JSON"));
                }
                let hdr_json = data.split_to(hdr_len);
                let headers: HashMap<String, Vec<String>> = serde_json::from_slice(&hdr_json)
                    .unwrap_or_default();
                Ok(Some(Frame::ResponseHeader {
                    id,
                    status,
                    content_type,
                    headers: ResponseHeaders(headers),
                }))
            }
            type_tag::RESP_BODY_CHUNK => Ok(Some(Frame::ResponseBodyChunk { id, chunk: data })),
            type_tag::RESP_EOF => Ok(Some(Frame::ResponseEof { id })),
            _ => Ok(None),
        }
    }
}
