//! The exchange engine: one POST, one fully decoded response body.
//!
//! # Design
//! `SsoClient` owns its `Transport` and therefore the one keep-alive socket.
//! Every method that talks to the service takes `&mut self`, so exchanges on
//! a client are serialized by construction; callers that share a client
//! across threads put it behind a `Mutex`.
//!
//! Reading a response is an explicit state machine (`Phase`): scan the head,
//! decide the framing, decode the body. Each state has one step function and
//! only `Done` leaves the loop, so a body is never returned before its
//! framing's terminal condition holds.
//!
//! A request is written at most once per connection that accepted it. After
//! the bytes are out any failure is returned as is: the service may already
//! have acted on it (a `renew=1` lookup extends the ticket).

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::body::{decode_chunked, decode_fixed};
use crate::config::ClientConfig;
use crate::error::FetchError;
use crate::head::scan_head;
use crate::http::{Framing, HttpRequest, ResponseHead};
use crate::transport::{Connector, TcpConnector, Transport};
use crate::types::{OutboundRequest, TicketResponse};

/// Synchronous client for the SSO ticket lookup.
pub struct SsoClient<C: Connector = TcpConnector> {
    config: ClientConfig,
    transport: Transport<C>,
}

impl SsoClient<TcpConnector> {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, TcpConnector)
    }
}

impl<C: Connector> SsoClient<C> {
    pub fn with_connector(config: ClientConfig, connector: C) -> Self {
        let transport = Transport::new(connector, &config);
        Self { config, transport }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &Transport<C> {
        &self.transport
    }

    /// Close the cached connection; the next lookup reconnects.
    pub fn disconnect(&mut self) {
        self.transport.discard();
    }

    /// Exchange `ticket` for the service's response body.
    pub fn fetch_by_ticket(
        &mut self,
        ticket: &str,
        renew: bool,
        client_ip: &str,
        user_agent: &str,
    ) -> Result<Fetched, FetchError> {
        self.fetch(&OutboundRequest::new(ticket, renew, client_ip, user_agent))
    }

    pub fn fetch(&mut self, req: &OutboundRequest) -> Result<Fetched, FetchError> {
        let started = Instant::now();
        let request = HttpRequest::fetch_by_ticket(&self.config.endpoint, req)?;
        self.transport
            .begin_exchange(self.config.deadline.map(|d| started + d))?;

        match self.exchange(&request) {
            Ok((head, body)) => {
                if head.close {
                    self.transport.discard();
                }
                let fetched = Fetched {
                    status: head.status,
                    body,
                    elapsed: started.elapsed(),
                    reconnected: self.transport.reconnected(),
                };
                debug!(
                    status = fetched.status,
                    framing = ?head.framing,
                    len = fetched.body.len(),
                    elapsed_ms = fetched.elapsed.as_secs_f64() * 1000.0,
                    reconnected = fetched.reconnected,
                    "sso exchange complete"
                );
                Ok(fetched)
            }
            Err(err) => {
                self.transport.discard();
                warn!(error = %err, "sso exchange failed");
                Err(err)
            }
        }
    }

    fn exchange(&mut self, request: &HttpRequest) -> Result<(ResponseHead, Vec<u8>), FetchError> {
        self.transport.write(&request.bytes)?;
        self.read_response()
    }

    fn read_response(&mut self) -> Result<(ResponseHead, Vec<u8>), FetchError> {
        let mut phase = Phase::Head;
        loop {
            phase = match phase {
                Phase::Head => Phase::Framing(scan_head(&mut self.transport)?),
                Phase::Framing(head) => Phase::Body(decide_framing(head)),
                Phase::Body(head) => {
                    let body = self.decode_body(head.framing)?;
                    Phase::Done(head, body)
                }
                Phase::Done(head, body) => return Ok((head, body)),
            };
        }
    }

    fn decode_body(&mut self, framing: Framing) -> Result<Vec<u8>, FetchError> {
        let max_body = self.config.max_body_size;
        match framing {
            Framing::FixedLength(len) => decode_fixed(&mut self.transport, len, max_body),
            Framing::Chunked => decode_chunked(&mut self.transport, max_body),
            Framing::Unknown => Ok(Vec::new()),
        }
    }
}

enum Phase {
    Head,
    Framing(ResponseHead),
    Body(ResponseHead),
    Done(ResponseHead, Vec<u8>),
}

fn decide_framing(mut head: ResponseHead) -> ResponseHead {
    if head.framing == Framing::Unknown {
        debug!(status = head.status, "no framing header, treating body as empty");
    }
    head.framing = head.framing.resolve();
    head
}

/// A completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    /// HTTP status of the response. The service reports lookup failures in
    /// the body, so non-2xx statuses are returned rather than raised.
    pub status: u16,
    pub body: Vec<u8>,
    /// Wall-clock time from request build to last body byte.
    pub elapsed: Duration,
    /// A stale connection was replaced during this exchange.
    pub reconnected: bool,
}

impl Fetched {
    pub fn text(&self) -> Result<&str, FetchError> {
        std::str::from_utf8(&self.body)
            .map_err(|e| FetchError::Protocol(format!("body is not UTF-8: {e}")))
    }

    pub fn into_text(self) -> Result<String, FetchError> {
        String::from_utf8(self.body)
            .map_err(|e| FetchError::Protocol(format!("body is not UTF-8: {e}")))
    }

    /// Decode the body as the service's `{"err": ..., "detail": ...}` JSON.
    pub fn ticket_response(&self) -> Result<TicketResponse, FetchError> {
        serde_json::from_slice(&self.body).map_err(|e| FetchError::Deserialization(e.to_string()))
    }
}
