//! Incremental HTTP/1.1 response framing.
//!
//! Lines are terminated by `CR LF`; the terminator may straddle two reads.
//! The header block ends with an empty line. Bodies are either a fixed
//! number of bytes or a sequence of chunks:
//!
//! ```text
//! <hex size>[;ext] CRLF <size bytes> CRLF ... 0 CRLF [trailer CRLF]* CRLF
//! ```

use super::header::{merge_field, parse_status_line, split_field, HttpHeader};
use crate::runtime::decoder::take_exact;
use crate::runtime::{Buffer, DecodeError, DecodeStatus, Decoder};
use bytes::{Bytes, BytesMut};
use std::collections::BTreeMap;

/// Longest line accepted, terminator included.
pub const MAX_LINE_LEN: usize = 16 * 1024;

/// One `CR LF` terminated line, returned without the terminator.
///
/// Bytes are mapped one to one onto chars (ISO-8859-1), so any byte
/// sequence is accepted.
#[derive(Debug)]
pub struct LineDecoder {
    line: Vec<u8>,
    max_len: usize,
    value: Option<String>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::with_max_len(MAX_LINE_LEN)
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            line: Vec::new(),
            max_len,
            value: None,
        }
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineDecoder {
    type Output = String;

    fn process(&mut self, buf: &mut Buffer) -> DecodeStatus {
        if self.value.is_some() {
            return DecodeStatus::Done;
        }

        let mut used = 0;
        let mut complete = false;
        for &b in buf.pending() {
            used += 1;
            self.line.push(b);
            if self.line.ends_with(b"\r\n") {
                complete = true;
                break;
            }
        }
        buf.consume(used);

        if !complete {
            if self.line.len() >= self.max_len {
                return DecodeStatus::Error(DecodeError::TooLong {
                    len: self.line.len(),
                    max: self.max_len,
                });
            }
            return DecodeStatus::Refill;
        }

        self.line.truncate(self.line.len() - 2);
        self.value = Some(self.line.iter().map(|&b| char::from(b)).collect());
        self.line.clear();
        DecodeStatus::Done
    }

    fn get(&mut self) -> Option<String> {
        self.value.take()
    }

    fn reset(&mut self) {
        self.line.clear();
        self.value = None;
    }
}

/// Status line and fields up to the empty line.
#[derive(Debug, Default)]
pub struct HeaderDecoder {
    line: LineDecoder,
    status_line: Option<String>,
    fields: BTreeMap<String, String>,
    value: Option<HttpHeader>,
}

impl HeaderDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for HeaderDecoder {
    type Output = HttpHeader;

    fn process(&mut self, buf: &mut Buffer) -> DecodeStatus {
        if self.value.is_some() {
            return DecodeStatus::Done;
        }

        loop {
            match self.line.process(buf) {
                DecodeStatus::Done => {}
                other => return other,
            }
            let line = self.line.get().unwrap_or_default();
            self.line.reset();

            let Some(status_line) = self.status_line.take() else {
                if let Err(e) = parse_status_line(&line) {
                    return DecodeStatus::Error(e);
                }
                self.status_line = Some(line);
                continue;
            };

            if line.is_empty() {
                let fields = std::mem::take(&mut self.fields);
                return match HttpHeader::new(status_line, fields) {
                    Ok(header) => {
                        self.value = Some(header);
                        DecodeStatus::Done
                    }
                    Err(e) => DecodeStatus::Error(e),
                };
            }

            match split_field(&line) {
                Ok((name, value)) => merge_field(&mut self.fields, name, value),
                Err(e) => return DecodeStatus::Error(e),
            }
            self.status_line = Some(status_line);
        }
    }

    fn get(&mut self) -> Option<HttpHeader> {
        self.value.take()
    }

    fn reset(&mut self) {
        self.line.reset();
        self.status_line = None;
        self.fields.clear();
        self.value = None;
    }
}

/// Exactly `len` body bytes.
#[derive(Debug)]
pub struct FixedLengthDecoder {
    len: usize,
    body: BytesMut,
    /// Latched on completion until `reset`.
    done: bool,
    value: Option<Bytes>,
}

impl FixedLengthDecoder {
    /// `len` comes from the peer, so the body grows only as bytes arrive.
    pub fn new(len: usize) -> Self {
        Self {
            len,
            body: BytesMut::new(),
            done: false,
            value: None,
        }
    }
}

impl Decoder for FixedLengthDecoder {
    type Output = Bytes;

    fn process(&mut self, buf: &mut Buffer) -> DecodeStatus {
        if self.done {
            return DecodeStatus::Done;
        }
        let n = (self.len - self.body.len()).min(buf.len());
        self.body.extend_from_slice(&buf.pending()[..n]);
        buf.consume(n);
        if self.body.len() < self.len {
            return DecodeStatus::Refill;
        }
        self.value = Some(std::mem::take(&mut self.body).freeze());
        self.done = true;
        DecodeStatus::Done
    }

    fn get(&mut self) -> Option<Bytes> {
        self.value.take()
    }

    fn reset(&mut self) {
        self.body.clear();
        self.done = false;
        self.value = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    Size,
    Data,
    DataEnd,
    Trailer,
    Done,
}

/// Chunked transfer-encoding body, reassembled.
#[derive(Debug)]
pub struct ChunkedDecoder {
    state: ChunkState,
    line: LineDecoder,
    remaining: usize,
    crlf: [u8; 2],
    crlf_filled: usize,
    body: BytesMut,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self {
            state: ChunkState::Size,
            line: LineDecoder::new(),
            remaining: 0,
            crlf: [0; 2],
            crlf_filled: 0,
            body: BytesMut::new(),
        }
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a chunk-size line, ignoring extensions after `;`.
fn parse_chunk_size(line: &str) -> Result<usize, DecodeError> {
    let size = line.split(';').next().unwrap_or_default().trim();
    usize::from_str_radix(size, 16).map_err(|_| DecodeError::InvalidChunkSize(line.to_string()))
}

impl Decoder for ChunkedDecoder {
    type Output = Bytes;

    fn process(&mut self, buf: &mut Buffer) -> DecodeStatus {
        loop {
            match self.state {
                ChunkState::Size => {
                    match self.line.process(buf) {
                        DecodeStatus::Done => {}
                        other => return other,
                    }
                    let line = self.line.get().unwrap_or_default();
                    self.line.reset();
                    self.remaining = match parse_chunk_size(&line) {
                        Ok(size) => size,
                        Err(e) => return DecodeStatus::Error(e),
                    };
                    self.state = if self.remaining == 0 {
                        ChunkState::Trailer
                    } else {
                        ChunkState::Data
                    };
                }
                ChunkState::Data => {
                    let n = self.remaining.min(buf.len());
                    self.body.extend_from_slice(&buf.pending()[..n]);
                    buf.consume(n);
                    self.remaining -= n;
                    if self.remaining > 0 {
                        return DecodeStatus::Refill;
                    }
                    self.crlf_filled = 0;
                    self.state = ChunkState::DataEnd;
                }
                ChunkState::DataEnd => {
                    if !take_exact(buf, &mut self.crlf, &mut self.crlf_filled) {
                        return DecodeStatus::Refill;
                    }
                    if &self.crlf != b"\r\n" {
                        return DecodeStatus::Error(DecodeError::MissingChunkTerminator);
                    }
                    self.state = ChunkState::Size;
                }
                ChunkState::Trailer => {
                    match self.line.process(buf) {
                        DecodeStatus::Done => {}
                        other => return other,
                    }
                    let line = self.line.get().unwrap_or_default();
                    self.line.reset();
                    if line.is_empty() {
                        self.state = ChunkState::Done;
                    }
                }
                ChunkState::Done => return DecodeStatus::Done,
            }
        }
    }

    fn get(&mut self) -> Option<Bytes> {
        if self.state != ChunkState::Done {
            return None;
        }
        Some(std::mem::take(&mut self.body).freeze())
    }

    fn reset(&mut self) {
        self.state = ChunkState::Size;
        self.line.reset();
        self.remaining = 0;
        self.crlf_filled = 0;
        self.body.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::connection::tests::{MockStream, Step};
    use crate::runtime::decoder::tests::feed_fragments;
    use crate::runtime::{Connection, ConnectionId, Encode, Outbox, Protocol};

    const WIKI: &[u8] = b"4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";

    #[test]
    fn test_line_split_between_cr_and_lf() {
        let mut dec = LineDecoder::new();
        let status = feed_fragments(&mut dec, b"HTTP/1.1 200 OK\r\n", &[16], 64);
        assert_eq!(status, DecodeStatus::Done);
        assert_eq!(dec.get().as_deref(), Some("HTTP/1.1 200 OK"));
    }

    #[test]
    fn test_line_leaves_following_bytes() {
        let mut buf = Buffer::new(64);
        buf.put_slice(b"first\r\nsecond");
        let mut dec = LineDecoder::new();
        assert_eq!(dec.process(&mut buf), DecodeStatus::Done);
        assert_eq!(dec.get().as_deref(), Some("first"));
        assert_eq!(buf.pending(), b"second");
    }

    #[test]
    fn test_lone_cr_is_part_of_line() {
        let mut buf = Buffer::new(64);
        buf.put_slice(b"a\rb\r\n");
        let mut dec = LineDecoder::new();
        assert_eq!(dec.process(&mut buf), DecodeStatus::Done);
        assert_eq!(dec.get().as_deref(), Some("a\rb"));
    }

    #[test]
    fn test_line_too_long() {
        let mut buf = Buffer::new(64);
        buf.put_slice(b"0123456789");
        let mut dec = LineDecoder::with_max_len(8);
        assert!(matches!(
            dec.process(&mut buf),
            DecodeStatus::Error(DecodeError::TooLong { .. })
        ));
    }

    #[test]
    fn test_header_block() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nVary: a\r\nVary: b\r\n\r\nhello";
        let mut buf = Buffer::new(128);
        buf.put_slice(raw);
        let mut dec = HeaderDecoder::new();
        assert_eq!(dec.process(&mut buf), DecodeStatus::Done);
        let header = dec.get().unwrap();
        assert_eq!(header.code(), 200);
        assert_eq!(header.content_length(), Some(5));
        assert_eq!(header.get("Vary"), Some("a; b"));
        assert_eq!(buf.pending(), b"hello");
    }

    #[test]
    fn test_header_block_fragmented() {
        let raw = b"HTTP/1.0 301 Moved\r\nLocation: /x\r\n\r\n";
        for cut in 1..raw.len() {
            let mut dec = HeaderDecoder::new();
            assert_eq!(feed_fragments(&mut dec, raw, &[cut], 64), DecodeStatus::Done);
            let header = dec.get().unwrap();
            assert_eq!(header.code(), 301);
            assert_eq!(header.get("location"), Some("/x"));
        }
    }

    #[test]
    fn test_header_round_trip() {
        let raw = b"HTTP/1.1 404 Not Found\r\nContent-Type: text/plain\r\nServer: x\r\n\r\n";
        let mut buf = Buffer::new(128);
        buf.put_slice(raw);
        let mut dec = HeaderDecoder::new();
        assert_eq!(dec.process(&mut buf), DecodeStatus::Done);
        let header = dec.get().unwrap();

        let mut out = Buffer::new(128);
        assert!(out.put_encoded(&header));
        assert_eq!(out.pending(), raw);
        assert_eq!(header.encoded_len(), raw.len());
    }

    #[test]
    fn test_header_round_trip_keeps_high_bytes() {
        let raw = b"HTTP/1.1 200 OK\r\nX-Name: caf\xe9\r\n\r\n";
        let mut buf = Buffer::new(128);
        buf.put_slice(raw);
        let mut dec = HeaderDecoder::new();
        assert_eq!(dec.process(&mut buf), DecodeStatus::Done);
        let header = dec.get().unwrap();
        assert_eq!(header.get("X-Name"), Some("caf\u{e9}"));

        let mut out = Buffer::new(128);
        assert!(out.put_encoded(&header));
        assert_eq!(out.pending(), raw);
    }

    #[test]
    fn test_bad_status_line() {
        let mut buf = Buffer::new(64);
        buf.put_slice(b"HTTP/1.1 OK\r\n");
        let mut dec = HeaderDecoder::new();
        assert!(matches!(
            dec.process(&mut buf),
            DecodeStatus::Error(DecodeError::MalformedStatusLine(_))
        ));
    }

    #[test]
    fn test_fixed_length() {
        let mut dec = FixedLengthDecoder::new(6);
        assert_eq!(feed_fragments(&mut dec, b"abcdef", &[1, 4], 4), DecodeStatus::Done);
        assert_eq!(dec.get().as_deref(), Some(&b"abcdef"[..]));

        let mut empty = FixedLengthDecoder::new(0);
        let mut buf = Buffer::new(4);
        assert_eq!(empty.process(&mut buf), DecodeStatus::Done);
        assert_eq!(empty.get().as_deref(), Some(&b""[..]));
    }

    #[test]
    fn test_fixed_length_done_latches_until_reset() {
        let mut buf = Buffer::new(8);
        buf.put_slice(b"abcd");
        let mut dec = FixedLengthDecoder::new(2);
        assert_eq!(dec.process(&mut buf), DecodeStatus::Done);
        assert_eq!(dec.get().as_deref(), Some(&b"ab"[..]));

        // Still done, nothing more taken and no second value
        assert_eq!(dec.process(&mut buf), DecodeStatus::Done);
        assert_eq!(dec.get(), None);
        assert_eq!(buf.pending(), b"cd");

        dec.reset();
        assert_eq!(dec.process(&mut buf), DecodeStatus::Done);
        assert_eq!(dec.get().as_deref(), Some(&b"cd"[..]));
    }

    #[test]
    fn test_huge_declared_lengths_do_not_preallocate() {
        let mut buf = Buffer::new(8);
        buf.put_slice(b"ab");
        let mut fixed = FixedLengthDecoder::new(usize::MAX);
        assert_eq!(fixed.process(&mut buf), DecodeStatus::Refill);

        let mut buf = Buffer::new(64);
        buf.put_slice(b"FFFFFFFFFFFFFFFF\r\nab");
        let status = ChunkedDecoder::new().process(&mut buf);
        // Too wide for a 32-bit usize, otherwise waits for more data
        assert!(
            matches!(status, DecodeStatus::Refill | DecodeStatus::Error(DecodeError::InvalidChunkSize(_))),
            "{status:?}"
        );
    }

    #[test]
    fn test_chunked_body() {
        let mut buf = Buffer::new(64);
        buf.put_slice(WIKI);
        let mut dec = ChunkedDecoder::new();
        assert_eq!(dec.process(&mut buf), DecodeStatus::Done);
        assert_eq!(dec.get().as_deref(), Some(&b"Wikipedia"[..]));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_chunked_every_split_point() {
        for cut in 1..WIKI.len() {
            let mut dec = ChunkedDecoder::new();
            assert_eq!(feed_fragments(&mut dec, WIKI, &[cut], 64), DecodeStatus::Done);
            assert_eq!(dec.get().as_deref(), Some(&b"Wikipedia"[..]), "cut at {cut}");
        }
    }

    #[test]
    fn test_chunked_extensions_and_trailers() {
        let raw = b"A;name=value\r\n0123456789\r\n0\r\nExpires: never\r\n\r\n";
        let mut buf = Buffer::new(64);
        buf.put_slice(raw);
        let mut dec = ChunkedDecoder::new();
        assert_eq!(dec.process(&mut buf), DecodeStatus::Done);
        assert_eq!(dec.get().as_deref(), Some(&b"0123456789"[..]));
    }

    #[test]
    fn test_chunked_errors() {
        let mut buf = Buffer::new(64);
        buf.put_slice(b"zz\r\n");
        assert!(matches!(
            ChunkedDecoder::new().process(&mut buf),
            DecodeStatus::Error(DecodeError::InvalidChunkSize(_))
        ));

        let mut buf = Buffer::new(64);
        buf.put_slice(b"2\r\nabXY");
        assert_eq!(
            ChunkedDecoder::new().process(&mut buf),
            DecodeStatus::Error(DecodeError::MissingChunkTerminator)
        );
    }

    /// Counts headers handed to it.
    #[derive(Default)]
    struct HeaderProbe {
        seen: usize,
    }

    impl Protocol for HeaderProbe {
        type Decoder = HeaderDecoder;
        type Outbound = i32;

        fn decoder(&self) -> HeaderDecoder {
            HeaderDecoder::new()
        }

        fn on_message(&mut self, _conn: ConnectionId, _msg: HttpHeader, _outbox: &mut Outbox<i32>) {
            self.seen += 1;
        }
    }

    #[test]
    fn test_bad_header_line_closes_connection() {
        let raw = b"HTTP/1.1 200 OK\r\nBadHeader\r\n\r\n".to_vec();
        let mut probe = HeaderProbe::default();
        let stream = MockStream::new(vec![Step::Data(raw)]);
        let mut conn: Connection<_, HeaderProbe> = Connection::new(stream, 64, probe.decoder());
        let mut outbox = Outbox::new();

        let err = conn.on_readable(0, &mut probe, &mut outbox).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        assert!(conn.close());
        assert_eq!(probe.seen, 0);
    }
}
