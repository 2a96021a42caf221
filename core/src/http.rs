//! HTTP/1.1 wire types for the single request shape the client sends.
//!
//! # Design
//! The request is built as plain bytes before any socket is touched, so the
//! exact wire form can be asserted in tests without a server. The response
//! side is described by `ResponseHead`, the parsed result of the status and
//! header block, whose `Framing` decides which body decoder runs.

use serde::Serialize;

use crate::config::Endpoint;
use crate::error::FetchError;
use crate::types::OutboundRequest;

/// How the end of the response body is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// No framing header seen (yet).
    Unknown,
    /// `Content-Length: n`.
    FixedLength(u64),
    /// `Transfer-Encoding: chunked`.
    Chunked,
}

impl Framing {
    /// Resolve `Unknown` to an empty fixed-length body. A response with
    /// neither header must not leave the reader waiting for bytes that will
    /// never arrive on a keep-alive socket.
    pub fn resolve(self) -> Framing {
        match self {
            Framing::Unknown => Framing::FixedLength(0),
            other => other,
        }
    }
}

/// The parts of a response head the client acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub framing: Framing,
    /// The server sent `Connection: close`.
    pub close: bool,
}

/// A serialized POST ready to be written in one go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub bytes: Vec<u8>,
}

impl HttpRequest {
    /// Build `POST <path> HTTP/1.1` with a form-encoded body for `req`.
    pub fn fetch_by_ticket(endpoint: &Endpoint, req: &OutboundRequest) -> Result<Self, FetchError> {
        let body = encode_form(req)?;

        let head = format!(
            "POST {path} HTTP/1.1\r\n\
             Host: {host}\r\n\
             Content-Type: application/x-www-form-urlencoded\r\n\
             Content-Length: {len}\r\n\
             Connection: keep-alive\r\n\
             \r\n",
            path = endpoint.request_path,
            host = endpoint.host_header,
            len = body.len(),
        );

        let mut bytes = Vec::with_capacity(head.len() + body.len());
        bytes.extend_from_slice(head.as_bytes());
        bytes.extend_from_slice(body.as_bytes());
        Ok(Self { bytes })
    }

    /// Everything after the blank line.
    pub fn body(&self) -> &[u8] {
        match self.bytes.windows(4).position(|w| w == b"\r\n\r\n") {
            Some(pos) => &self.bytes[pos + 4..],
            None => &[],
        }
    }
}

/// URL-encode `form` as a request body. Nothing is sent when it fails.
fn encode_form<T: Serialize>(form: &T) -> Result<String, FetchError> {
    serde_urlencoded::to_string(form)
        .map_err(|e| FetchError::Protocol(format!("cannot form-encode request: {e}")))
}
