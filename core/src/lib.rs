//! Blocking HTTP/1.1 client for the SSO ticket lookup service.
//!
//! # Overview
//! Exchanges an SSO ticket for the service's JSON response over one
//! persistent TCP connection. The caller passes four strings (ticket, client
//! IP, user agent, renew flag) and gets back the complete response body.
//!
//! # Design
//! - `Transport` owns the single keep-alive socket and masks one stale
//!   connection per exchange by reconnecting.
//! - `head::scan_head` reads the status and header block and extracts the
//!   framing; `body` has one decoder per framing mode.
//! - `SsoClient` composes them as an explicit head → framing → body state
//!   machine and never returns a partially read body.
//! - Settings are an immutable `ClientConfig` fixed at construction.

pub mod body;
pub mod client;
pub mod config;
pub mod error;
pub mod head;
pub mod http;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

pub use client::{Fetched, SsoClient};
pub use config::{ClientConfig, Endpoint};
pub use error::{ConfigError, FetchError};
pub use http::{Framing, HttpRequest, ResponseHead};
pub use transport::{Connector, Stream, TcpConnector, Transport};
pub use types::{OutboundRequest, SsoUserDept, SsoUserInfo, TicketDetail, TicketResponse};
