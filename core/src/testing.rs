//! Scripted in-memory streams for unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::rc::Rc;
use std::time::Duration;

use crate::config::Endpoint;
use crate::transport::{Connector, Stream};

#[derive(Debug, Clone, Copy)]
pub(crate) enum WriteStep {
    Zero,
    Fail(io::ErrorKind),
}

/// A stream that replays canned read results and records writes.
///
/// Each queued read is returned by one `read` call (split if the caller's
/// buffer is smaller). An exhausted queue reads as EOF.
#[derive(Debug, Default)]
pub(crate) struct ScriptedStream {
    reads: VecDeque<io::Result<Vec<u8>>>,
    writes: VecDeque<WriteStep>,
    written: Rc<RefCell<Vec<u8>>>,
    closed_when_idle: bool,
}

impl ScriptedStream {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Deliver `data` as one read.
    pub(crate) fn read(mut self, data: &[u8]) -> Self {
        self.reads.push_back(Ok(data.to_vec()));
        self
    }

    /// Deliver `data` one `size`-byte read at a time.
    pub(crate) fn read_in_pieces(mut self, data: &[u8], size: usize) -> Self {
        for piece in data.chunks(size.max(1)) {
            self.reads.push_back(Ok(piece.to_vec()));
        }
        self
    }

    pub(crate) fn read_error(mut self, kind: io::ErrorKind) -> Self {
        self.reads.push_back(Err(io::Error::from(kind)));
        self
    }

    /// Script the next unscripted `write` call.
    pub(crate) fn write_step(mut self, step: WriteStep) -> Self {
        self.writes.push_back(step);
        self
    }

    /// Report the connection as closed by the peer when checked between
    /// exchanges.
    pub(crate) fn closed_when_idle(mut self) -> Self {
        self.closed_when_idle = true;
        self
    }

    pub(crate) fn written(&self) -> Rc<RefCell<Vec<u8>>> {
        Rc::clone(&self.written)
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reads.pop_front() {
            None => Ok(0),
            Some(Err(e)) => Err(e),
            Some(Ok(data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    self.reads.push_front(Ok(data[n..].to_vec()));
                }
                Ok(n)
            }
        }
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.writes.pop_front() {
            Some(WriteStep::Zero) => Ok(0),
            Some(WriteStep::Fail(kind)) => Err(io::Error::from(kind)),
            None => {
                self.written.borrow_mut().extend_from_slice(buf);
                Ok(buf.len())
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Stream for ScriptedStream {
    fn set_io_timeout(&self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }

    fn is_stale(&self) -> io::Result<bool> {
        Ok(self.closed_when_idle)
    }
}

/// Hands out queued streams, then refuses connections.
#[derive(Debug, Default)]
pub(crate) struct ScriptedConnector {
    streams: VecDeque<ScriptedStream>,
    pub(crate) connects: usize,
    /// Connect timeout passed to each call.
    pub(crate) timeouts: Vec<Duration>,
}

impl ScriptedConnector {
    pub(crate) fn new(streams: Vec<ScriptedStream>) -> Self {
        Self {
            streams: streams.into(),
            connects: 0,
            timeouts: Vec::new(),
        }
    }
}

impl Connector for ScriptedConnector {
    type Stream = ScriptedStream;

    fn connect(&mut self, _endpoint: &Endpoint, timeout: Duration) -> io::Result<ScriptedStream> {
        self.timeouts.push(timeout);
        let stream = self
            .streams
            .pop_front()
            .ok_or_else(|| io::Error::from(io::ErrorKind::ConnectionRefused))?;
        self.connects += 1;
        Ok(stream)
    }
}
