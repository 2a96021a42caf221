//! Status line and header block scanning.
//!
//! Only three headers matter to the client: `Transfer-Encoding`,
//! `Content-Length` and `Connection`. Everything else is read and dropped.

use tracing::trace;

use crate::error::FetchError;
use crate::http::{Framing, ResponseHead};
use crate::transport::{Connector, Transport};

/// Header lines accepted before the block is declared unterminated.
pub const MAX_HEADER_LINES: usize = 100;

/// Read one response head, up to and including the blank line.
///
/// Interim `1xx` heads are consumed and skipped. The returned framing may
/// still be `Unknown`; the caller decides what that means.
pub fn scan_head<C: Connector>(transport: &mut Transport<C>) -> Result<ResponseHead, FetchError> {
    loop {
        let status_line = transport.read_line()?;
        let status = parse_status_line(&status_line)?;

        let mut framing = Framing::Unknown;
        let mut close = false;
        let mut terminated = false;
        for _ in 0..MAX_HEADER_LINES {
            let line = transport.read_line()?;
            if line.is_empty() {
                terminated = true;
                break;
            }
            apply_header(&line, &mut framing, &mut close);
        }
        if !terminated {
            return Err(FetchError::Protocol(format!(
                "header block not terminated within {MAX_HEADER_LINES} lines"
            )));
        }

        if (100..200).contains(&status) {
            trace!(status, "skipping interim response");
            continue;
        }
        return Ok(ResponseHead {
            status,
            framing,
            close,
        });
    }
}

fn parse_status_line(line: &[u8]) -> Result<u16, FetchError> {
    let text = String::from_utf8_lossy(line);
    let malformed = || FetchError::Protocol(format!("malformed status line {text:?}"));

    let mut parts = text.split_ascii_whitespace();
    let version = parts.next().ok_or_else(malformed)?;
    if !version.starts_with("HTTP/") {
        return Err(malformed());
    }
    let code = parts.next().ok_or_else(malformed)?;
    if code.len() != 3 {
        return Err(malformed());
    }
    code.parse().map_err(|_| malformed())
}

/// Fold one header line into the framing and connection flags.
///
/// `Transfer-Encoding: chunked` wins over any `Content-Length`, seen before
/// or after it. A `Content-Length` that is not a number counts as 0.
fn apply_header(line: &[u8], framing: &mut Framing, close: &mut bool) {
    let text = String::from_utf8_lossy(line);
    let Some((name, value)) = text.split_once(':') else {
        return;
    };
    let name = name.trim();
    let value = value.trim();

    if name.eq_ignore_ascii_case("transfer-encoding") {
        if value
            .split(',')
            .any(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
        {
            *framing = Framing::Chunked;
        }
    } else if name.eq_ignore_ascii_case("content-length") {
        if *framing != Framing::Chunked {
            *framing = Framing::FixedLength(value.parse().unwrap_or(0));
        }
    } else if name.eq_ignore_ascii_case("connection") {
        *close = value
            .split(',')
            .any(|token| token.trim().eq_ignore_ascii_case("close"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClientConfig, Endpoint};
    use crate::testing::{ScriptedConnector, ScriptedStream};

    fn scan(raw: &[u8]) -> Result<ResponseHead, FetchError> {
        let config = ClientConfig::new(Endpoint::new("127.0.0.1", 9));
        let stream = ScriptedStream::new().read_in_pieces(raw, 7);
        let mut t = Transport::new(ScriptedConnector::new(vec![stream]), &config);
        t.begin_exchange(None)?;
        t.acquire()?;
        scan_head(&mut t)
    }

    #[test]
    fn content_length_head() {
        let head = scan(b"HTTP/1.1 200 OK\r\nContent-Length: 13\r\n\r\n").unwrap();
        assert_eq!(head.status, 200);
        assert_eq!(head.framing, Framing::FixedLength(13));
        assert!(!head.close);
    }

    #[test]
    fn chunked_head() {
        let head = scan(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n").unwrap();
        assert_eq!(head.framing, Framing::Chunked);
    }

    #[test]
    fn header_names_are_case_insensitive() {
        let head = scan(b"HTTP/1.1 200 OK\r\ntransfer-encoding: Chunked\r\n\r\n").unwrap();
        assert_eq!(head.framing, Framing::Chunked);
        let head = scan(b"HTTP/1.1 200 OK\r\nCONTENT-LENGTH:7\r\n\r\n").unwrap();
        assert_eq!(head.framing, Framing::FixedLength(7));
    }

    #[test]
    fn content_length_tolerates_whitespace() {
        let head = scan(b"HTTP/1.1 200 OK\r\nContent-Length: \t 42  \r\n\r\n").unwrap();
        assert_eq!(head.framing, Framing::FixedLength(42));
    }

    #[test]
    fn non_numeric_content_length_is_zero() {
        let head = scan(b"HTTP/1.1 200 OK\r\nContent-Length: many\r\n\r\n").unwrap();
        assert_eq!(head.framing, Framing::FixedLength(0));
    }

    #[test]
    fn chunked_wins_over_content_length_in_either_order() {
        let head = scan(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nContent-Length: 5\r\n\r\n",
        )
        .unwrap();
        assert_eq!(head.framing, Framing::Chunked);
        let head = scan(
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nTransfer-Encoding: gzip, chunked\r\n\r\n",
        )
        .unwrap();
        assert_eq!(head.framing, Framing::Chunked);
    }

    #[test]
    fn no_framing_header_stays_unknown() {
        let head = scan(b"HTTP/1.1 204 No Content\r\nServer: sso\r\n\r\n").unwrap();
        assert_eq!(head.status, 204);
        assert_eq!(head.framing, Framing::Unknown);
    }

    #[test]
    fn connection_close_is_recorded() {
        let head =
            scan(b"HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 0\r\n\r\n").unwrap();
        assert!(head.close);
        let head = scan(b"HTTP/1.1 200 OK\r\nConnection: keep-alive\r\n\r\n").unwrap();
        assert!(!head.close);
    }

    #[test]
    fn non_success_status_is_not_an_error() {
        let head = scan(b"HTTP/1.1 410 Gone\r\nContent-Length: 2\r\n\r\n").unwrap();
        assert_eq!(head.status, 410);
    }

    #[test]
    fn interim_response_is_skipped() {
        let head = scan(
            b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\n",
        )
        .unwrap();
        assert_eq!(head.status, 200);
        assert_eq!(head.framing, Framing::FixedLength(3));
    }

    #[test]
    fn garbage_status_line_is_protocol_error() {
        let err = scan(b"SSH-2.0-OpenSSH\r\n\r\n").unwrap_err();
        assert!(matches!(err, FetchError::Protocol(_)));
        let err = scan(b"HTTP/1.1 2000 OK\r\n\r\n").unwrap_err();
        assert!(matches!(err, FetchError::Protocol(_)));
    }

    #[test]
    fn endless_header_block_is_protocol_error() {
        let mut raw = b"HTTP/1.1 200 OK\r\n".to_vec();
        for i in 0..=MAX_HEADER_LINES {
            raw.extend_from_slice(format!("X-Filler-{i}: y\r\n").as_bytes());
        }
        let err = scan(&raw).unwrap_err();
        assert!(matches!(err, FetchError::Protocol(_)), "{err}");
    }

    #[test]
    fn close_before_blank_line_is_read_error() {
        let err = scan(b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n").unwrap_err();
        assert!(matches!(err, FetchError::Read(_)));
    }
}
