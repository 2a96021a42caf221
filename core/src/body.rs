//! Response body decoders, one per framing mode.
//!
//! Both decoders return either the complete body or an error; a body whose
//! terminal condition was not reached is never handed back.

use crate::error::FetchError;
use crate::transport::{Connector, Transport};

/// Trailer fields accepted after the last chunk.
const MAX_CHUNK_TRAILER_LINES: usize = 100;

/// Read exactly `len` bytes as the body.
pub fn decode_fixed<C: Connector>(
    transport: &mut Transport<C>,
    len: u64,
    max_body: u64,
) -> Result<Vec<u8>, FetchError> {
    if len > max_body {
        return Err(FetchError::Protocol(format!(
            "content length {len} exceeds limit of {max_body} bytes"
        )));
    }
    let mut body = Vec::with_capacity(len.min(64 * 1024) as usize);
    transport.read_exact_into(len, &mut body)?;
    Ok(body)
}

/// Decode a chunked body into one contiguous buffer.
///
/// Chunk extensions are ignored and trailer fields discarded. `max_body`
/// bounds both a single chunk and the assembled body.
pub fn decode_chunked<C: Connector>(
    transport: &mut Transport<C>,
    max_body: u64,
) -> Result<Vec<u8>, FetchError> {
    let mut body = Vec::new();
    loop {
        let size_line = transport.read_line()?;
        let size = parse_chunk_size(&size_line)?;
        if size > max_body || body.len() as u64 + size > max_body {
            return Err(FetchError::Protocol(format!(
                "chunk of {size} bytes exceeds limit of {max_body} bytes"
            )));
        }

        if size == 0 {
            skip_trailers(transport)?;
            return Ok(body);
        }

        transport.read_exact_into(size, &mut body)?;
        let terminator = transport.read_line()?;
        if !terminator.is_empty() {
            return Err(FetchError::Protocol(format!(
                "expected CRLF after {size}-byte chunk"
            )));
        }
    }
}

/// Parse the hex size at the start of a chunk-size line.
fn parse_chunk_size(line: &[u8]) -> Result<u64, FetchError> {
    let text = String::from_utf8_lossy(line);
    let hex = text.split(';').next().unwrap_or("").trim();
    if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(FetchError::Protocol(format!("malformed chunk size {text:?}")));
    }
    u64::from_str_radix(hex, 16)
        .map_err(|_| FetchError::Protocol(format!("chunk size {hex:?} out of range")))
}

fn skip_trailers<C: Connector>(transport: &mut Transport<C>) -> Result<(), FetchError> {
    for _ in 0..MAX_CHUNK_TRAILER_LINES {
        if transport.read_line()?.is_empty() {
            return Ok(());
        }
    }
    Err(FetchError::Protocol(
        "trailer section not terminated".to_string(),
    ))
}
