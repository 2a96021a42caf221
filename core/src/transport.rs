//! Persistent connection to the SSO service.
//!
//! # Design
//! `Transport` owns at most one buffered connection and is the only code that
//! opens, replaces or drops it. A connection is never repaired: any failure
//! that leaves the byte stream in an unknown state discards it, and the next
//! exchange connects afresh.
//!
//! A keep-alive socket the peer closed while idle is caught before the next
//! request goes out: `begin_exchange` checks it without blocking and
//! replaces it. One that slips past shows up on the write as a zero-byte
//! write or a broken pipe, and each exchange gets one reconnect for that.
//! Once the request is on the wire nothing is resent; a read failure ends
//! the exchange.
//!
//! An exchange deadline bounds connects as well as reads and writes.
//!
//! The socket is reached through the `Connector` and `Stream` traits so that
//! tests can drive the exact byte sequences they need without a server.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::{ClientConfig, Endpoint};
use crate::error::FetchError;

/// Reconnects allowed per exchange.
pub const MAX_RECONNECTS: u32 = 1;

const READ_SCRATCH: usize = 8 * 1024;

/// A byte stream the transport can put a timeout on.
pub trait Stream: Read + Write {
    /// Apply `timeout` to subsequent reads and writes.
    fn set_io_timeout(&self, timeout: Duration) -> io::Result<()>;

    /// Check an idle connection without blocking. True when it can no
    /// longer carry a request: the peer closed or reset it, or sent bytes
    /// nobody asked for.
    fn is_stale(&self) -> io::Result<bool>;
}

impl Stream for TcpStream {
    fn set_io_timeout(&self, timeout: Duration) -> io::Result<()> {
        self.set_read_timeout(Some(timeout))?;
        self.set_write_timeout(Some(timeout))
    }

    fn is_stale(&self) -> io::Result<bool> {
        self.set_nonblocking(true)?;
        let mut byte = [0u8; 1];
        let peeked = self.peek(&mut byte);
        self.set_nonblocking(false)?;
        match peeked {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(false),
            Err(_) => Ok(true),
        }
    }
}

/// Opens new connections to an endpoint.
pub trait Connector {
    type Stream: Stream;

    fn connect(&mut self, endpoint: &Endpoint, timeout: Duration) -> io::Result<Self::Stream>;
}

/// Plain TCP. Tries every resolved address in order, all within one
/// `timeout`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&mut self, endpoint: &Endpoint, timeout: Duration) -> io::Result<TcpStream> {
        let give_up = Instant::now() + timeout;
        let mut last_err = None;
        for addr in endpoint.authority().to_socket_addrs()? {
            let left = give_up.saturating_duration_since(Instant::now());
            if left.is_zero() {
                last_err = Some(io::Error::from(io::ErrorKind::TimedOut));
                break;
            }
            match TcpStream::connect_timeout(&addr, left) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
        }))
    }
}

enum WriteFailure {
    /// The peer is gone; a fresh connection may succeed.
    Stale(String),
    Fatal(FetchError),
}

pub struct Transport<C: Connector> {
    connector: C,
    endpoint: Endpoint,
    connect_timeout: Duration,
    io_timeout: Duration,
    max_line_len: usize,
    conn: Option<BufReader<C::Stream>>,
    deadline: Option<Instant>,
    retries_left: u32,
    reconnected: bool,
    bytes_read: u64,
}

impl<C: Connector> Transport<C> {
    pub fn new(connector: C, config: &ClientConfig) -> Self {
        Self {
            connector,
            endpoint: config.endpoint.clone(),
            connect_timeout: config.connect_timeout,
            io_timeout: config.io_timeout,
            max_line_len: config.max_line_len,
            conn: None,
            deadline: None,
            retries_left: MAX_RECONNECTS,
            reconnected: false,
            bytes_read: 0,
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Reset per-exchange state (deadline, reconnect budget, read counter)
    /// and drop a cached connection that cannot be reused.
    pub fn begin_exchange(&mut self, deadline: Option<Instant>) -> Result<(), FetchError> {
        self.deadline = deadline;
        self.retries_left = MAX_RECONNECTS;
        self.reconnected = false;
        self.bytes_read = 0;
        let Some(conn) = self.conn.as_ref() else {
            return Ok(());
        };

        let usable = if !conn.buffer().is_empty() {
            // Bytes left over from the previous response would be read as
            // the start of this one.
            warn!(
                leftover = conn.buffer().len(),
                "dropping connection with unread bytes"
            );
            false
        } else {
            match conn.get_ref().is_stale() {
                Ok(false) => match conn.get_ref().set_io_timeout(self.io_timeout) {
                    Ok(()) => true,
                    Err(e) => {
                        debug!(error = %e, "could not reset socket timeout, reconnecting");
                        false
                    }
                },
                Ok(true) => {
                    debug!("idle connection closed by peer, reconnecting");
                    false
                }
                Err(e) => {
                    debug!(error = %e, "idle check failed, reconnecting");
                    false
                }
            }
        };
        if !usable {
            self.discard();
            self.reconnected = true;
        }
        Ok(())
    }

    /// Whether a reconnect happened during the current exchange.
    pub fn reconnected(&self) -> bool {
        self.reconnected
    }

    /// Response bytes read during the current exchange.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Spend the exchange's reconnect budget. Returns false once it is gone.
    pub fn take_retry(&mut self) -> bool {
        if self.retries_left == 0 {
            return false;
        }
        self.retries_left -= 1;
        self.reconnected = true;
        true
    }

    /// Return the cached connection, opening one if needed.
    pub fn acquire(&mut self) -> Result<&mut BufReader<C::Stream>, FetchError> {
        if self.conn.is_none() {
            let timeout = match self.remaining()? {
                Some(left) => left.min(self.connect_timeout),
                None => self.connect_timeout,
            };
            let addr = self.endpoint.authority();
            let stream = match self.connector.connect(&self.endpoint, timeout) {
                Ok(stream) => stream,
                Err(_) if self.deadline.is_some_and(|d| Instant::now() >= d) => {
                    return Err(FetchError::Timeout);
                }
                Err(source) => return Err(FetchError::Connect { addr, source }),
            };
            stream
                .set_io_timeout(self.io_timeout)
                .map_err(|source| FetchError::Connect {
                    addr: addr.clone(),
                    source,
                })?;
            debug!(%addr, "connected to sso service");
            self.conn = Some(BufReader::new(stream));
        }
        self.arm()?;
        self.conn
            .as_mut()
            .ok_or_else(|| FetchError::Transport("connection unavailable".to_string()))
    }

    /// Drop the cached connection. The next `acquire` reconnects.
    pub fn discard(&mut self) {
        if self.conn.take().is_some() {
            debug!(addr = %self.endpoint.authority(), "discarded connection");
        }
    }

    /// Write all of `bytes`, reconnecting once if the connection turns out
    /// to be stale.
    pub fn write(&mut self, bytes: &[u8]) -> Result<usize, FetchError> {
        loop {
            let conn = self.acquire()?;
            let reason = match write_request(conn.get_mut(), bytes) {
                Ok(()) => return Ok(bytes.len()),
                Err(WriteFailure::Fatal(err)) => {
                    self.discard();
                    return Err(err);
                }
                Err(WriteFailure::Stale(reason)) => reason,
            };
            self.discard();
            if !self.take_retry() {
                return Err(FetchError::Transport(format!(
                    "write failed after reconnect: {reason}"
                )));
            }
            warn!(%reason, "stale connection, reconnecting");
        }
    }

    /// Read one line, stripping the CRLF (or bare LF) terminator.
    pub fn read_line(&mut self) -> Result<Vec<u8>, FetchError> {
        let limit = self.max_line_len;
        let mut line = Vec::new();
        loop {
            self.arm()?;
            let conn = self
                .conn
                .as_mut()
                .ok_or_else(|| FetchError::Read("not connected".to_string()))?;
            let available = match conn.fill_buf() {
                Ok(buf) => buf,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(FetchError::from_read(e)),
            };
            if available.is_empty() {
                let msg = if line.is_empty() {
                    "connection closed before line"
                } else {
                    "connection closed mid-line"
                };
                return Err(FetchError::Read(msg.to_string()));
            }

            let (take, done) = match available.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (available.len(), false),
            };
            if line.len() + take > limit {
                return Err(FetchError::Protocol(format!(
                    "line longer than {limit} bytes"
                )));
            }
            line.extend_from_slice(&available[..take]);
            conn.consume(take);
            self.bytes_read += take as u64;

            if done {
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(line);
            }
        }
    }

    /// One underlying read into `buf`. Returns 0 only at EOF.
    pub fn read_some(&mut self, buf: &mut [u8]) -> Result<usize, FetchError> {
        loop {
            self.arm()?;
            let conn = self
                .conn
                .as_mut()
                .ok_or_else(|| FetchError::Read("not connected".to_string()))?;
            match conn.read(buf) {
                Ok(n) => {
                    self.bytes_read += n as u64;
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(FetchError::from_read(e)),
            }
        }
    }

    /// Append exactly `n` bytes to `out`, issuing as many reads as needed.
    pub fn read_exact_into(&mut self, n: u64, out: &mut Vec<u8>) -> Result<(), FetchError> {
        let mut scratch = [0u8; READ_SCRATCH];
        let mut read_so_far = 0u64;
        while read_so_far < n {
            let want = (n - read_so_far).min(READ_SCRATCH as u64) as usize;
            let got = self.read_some(&mut scratch[..want])?;
            if got == 0 {
                return Err(FetchError::Read(format!(
                    "connection closed after {read_so_far} of {n} bytes"
                )));
            }
            out.extend_from_slice(&scratch[..got]);
            read_so_far += got as u64;
        }
        Ok(())
    }

    pub fn read_exact(&mut self, n: u64) -> Result<Vec<u8>, FetchError> {
        let mut out = Vec::with_capacity(n.min(READ_SCRATCH as u64) as usize);
        self.read_exact_into(n, &mut out)?;
        Ok(out)
    }

    /// Time left before the exchange deadline; `None` without one.
    fn remaining(&self) -> Result<Option<Duration>, FetchError> {
        let Some(deadline) = self.deadline else {
            return Ok(None);
        };
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Err(FetchError::Timeout);
        }
        Ok(Some(left))
    }

    /// Clamp the socket timeout to what is left of the deadline.
    fn arm(&mut self) -> Result<(), FetchError> {
        let Some(remaining) = self.remaining()? else {
            return Ok(());
        };
        if let Some(conn) = self.conn.as_ref() {
            conn.get_ref()
                .set_io_timeout(remaining.min(self.io_timeout))
                .map_err(|e| FetchError::Transport(format!("set socket timeout: {e}")))?;
        }
        Ok(())
    }
}

fn write_request<S: Write>(stream: &mut S, bytes: &[u8]) -> Result<(), WriteFailure> {
    let mut written = 0;
    while written < bytes.len() {
        match stream.write(&bytes[written..]) {
            Ok(0) => {
                return Err(WriteFailure::Stale(format!(
                    "zero-byte write after {written} of {} bytes",
                    bytes.len()
                )))
            }
            Ok(n) => written += n,
            Err(e) => match classify_write_error(e) {
                Some(failure) => return Err(failure),
                None => continue,
            },
        }
    }
    loop {
        match stream.flush() {
            Ok(()) => return Ok(()),
            Err(e) => match classify_write_error(e) {
                Some(failure) => return Err(failure),
                None => continue,
            },
        }
    }
}

/// `None` means the call was interrupted and should be repeated.
fn classify_write_error(err: io::Error) -> Option<WriteFailure> {
    match err.kind() {
        io::ErrorKind::Interrupted => None,
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::UnexpectedEof => Some(WriteFailure::Stale(err.to_string())),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
            Some(WriteFailure::Fatal(FetchError::Timeout))
        }
        _ => Some(WriteFailure::Fatal(FetchError::Transport(err.to_string()))),
    }
}
