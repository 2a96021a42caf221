//! Body reconstruction properties over arbitrarily fragmented streams.

use std::io::{self, Read, Write};
use std::time::Duration;

use proptest::collection::vec;
use proptest::prelude::*;
use sso_core::{ClientConfig, Connector, Endpoint, SsoClient, Stream};

/// Serves a canned response `piece` bytes per read, swallowing writes.
struct Fragmented {
    data: Vec<u8>,
    pos: usize,
    piece: usize,
}

impl Read for Fragmented {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.piece.min(buf.len()).min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl Write for Fragmented {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Stream for Fragmented {
    fn set_io_timeout(&self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }

    fn is_stale(&self) -> io::Result<bool> {
        Ok(false)
    }
}

struct OneConnection(Option<Fragmented>);

impl Connector for OneConnection {
    type Stream = Fragmented;

    fn connect(&mut self, _endpoint: &Endpoint, _timeout: Duration) -> io::Result<Fragmented> {
        self.0
            .take()
            .ok_or_else(|| io::Error::from(io::ErrorKind::ConnectionRefused))
    }
}

fn fetch(response: Vec<u8>, piece: usize) -> Vec<u8> {
    let connector = OneConnection(Some(Fragmented {
        data: response,
        pos: 0,
        piece,
    }));
    let config = ClientConfig::new(Endpoint::new("127.0.0.1", 80));
    let mut client = SsoClient::with_connector(config, connector);
    client
        .fetch_by_ticket("abc123", false, "127.0.0.1", "proptest")
        .unwrap()
        .body
}

/// Encode `data` as chunks whose sizes cycle through `sizes`.
fn encode_chunked(data: &[u8], sizes: &[usize]) -> Vec<u8> {
    let mut wire = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
    let mut rest = data;
    let mut i = 0;
    while !rest.is_empty() {
        let size = sizes[i % sizes.len()].min(rest.len());
        wire.extend_from_slice(format!("{size:x}\r\n").as_bytes());
        wire.extend_from_slice(&rest[..size]);
        wire.extend_from_slice(b"\r\n");
        rest = &rest[size..];
        i += 1;
    }
    wire.extend_from_slice(b"0\r\n\r\n");
    wire
}

proptest! {
    #[test]
    fn chunked_decoding_reconstructs_body(
        data in vec(any::<u8>(), 0..4096),
        sizes in vec(1usize..600, 1..16),
        piece in 1usize..32,
    ) {
        let body = fetch(encode_chunked(&data, &sizes), piece);
        prop_assert_eq!(body, data);
    }

    #[test]
    fn fixed_length_decoding_reconstructs_body(
        data in vec(any::<u8>(), 0..4096),
        piece in 1usize..32,
    ) {
        let mut wire = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", data.len()).into_bytes();
        wire.extend_from_slice(&data);
        let body = fetch(wire, piece);
        prop_assert_eq!(body, data);
    }
}
