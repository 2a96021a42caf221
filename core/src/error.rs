//! Error types for the SSO ticket client.
//!
//! # Design
//! Each variant is one failure class the caller may want to tell apart.
//! `Connect` keeps the underlying `io::Error` because the OS errno is the
//! only useful diagnostic when the SSO host is unreachable. The other
//! transport failures are flattened to messages: by the time they surface
//! the connection has already been discarded and nothing can be retried.

use std::io;

use thiserror::Error;

/// Errors returned by `SsoClient::fetch_by_ticket` and friends.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The TCP connection could not be established. Never retried.
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The request could not be written, even after one reconnect.
    #[error("transport error: {0}")]
    Transport(String),

    /// The connection closed or failed while reading the response.
    #[error("read error: {0}")]
    Read(String),

    /// The response violated HTTP/1.1 framing.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The exchange deadline or a socket timeout elapsed.
    #[error("exchange timed out")]
    Timeout,

    /// The body was not a valid SSO JSON envelope.
    #[error("deserialization failed: {0}")]
    Deserialization(String),
}

impl FetchError {
    /// Map a read-side `io::Error`, keeping timeouts distinguishable.
    pub(crate) fn from_read(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => FetchError::Timeout,
            io::ErrorKind::UnexpectedEof => {
                FetchError::Read("connection closed mid-response".to_string())
            }
            _ => FetchError::Read(err.to_string()),
        }
    }
}

/// Errors produced while loading `ClientConfig` from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} is not a valid {expected}: {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("{0} must not be empty")]
    Empty(&'static str),
}
