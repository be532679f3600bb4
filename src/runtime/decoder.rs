//! Incremental decoder framework.
//!
//! A decoder is a resumable state machine fed from a connection's input
//! `Buffer`. Each call to `process` consumes whatever bytes it can make use
//! of and reports one of three outcomes:
//!
//! - `Done`: a value is ready; take it with `get`, then `reset` before reuse
//! - `Refill`: every available byte has been absorbed, more are needed
//! - `Error`: the input violates the framing; the connection must be dropped
//!
//! Bytes a decoder has validated are moved out of the buffer (or kept in
//! decoder state), never re-read, so a frame may be split across any number
//! of refills.
//!
//! The same decoders run outside the reactor through `BlockingReader`,
//! which satisfies `Refill` with a blocking read on the underlying stream.

use crate::runtime::Buffer;
use std::io::{self, Read};
use thiserror::Error;

/// Framing violations reported by decoders.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("negative length prefix: {0}")]
    NegativeLength(i32),

    #[error("length prefix {len} exceeds limit of {max} bytes")]
    TooLong { len: usize, max: usize },

    #[error("text field is not valid UTF-8")]
    InvalidUtf8,

    #[error("malformed status line: {0:?}")]
    MalformedStatusLine(String),

    #[error("header line without \": \" separator: {0:?}")]
    MissingSeparator(String),

    #[error("invalid chunk size: {0:?}")]
    InvalidChunkSize(String),

    #[error("chunk data not followed by CRLF")]
    MissingChunkTerminator,

    #[error("end of stream before the frame was complete")]
    UnexpectedEof,
}

/// Outcome of one `Decoder::process` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeStatus {
    Done,
    Refill,
    Error(DecodeError),
}

/// Resumable decoder for one kind of frame.
pub trait Decoder {
    /// Value produced by one completed decode cycle.
    type Output;

    /// Consume bytes from `buf` and advance the state machine.
    ///
    /// `buf` is in fill mode on entry and is left in fill mode on return.
    fn process(&mut self, buf: &mut Buffer) -> DecodeStatus;

    /// Move the decoded value out. Only `Some` right after `Done`.
    fn get(&mut self) -> Option<Self::Output>;

    /// Prepare for the next frame.
    fn reset(&mut self);
}

/// Move up to `dst.len() - *filled` bytes from the front of `buf` into
/// `dst[*filled..]`. Returns true once `dst` is complete.
pub(crate) fn take_exact(buf: &mut Buffer, dst: &mut [u8], filled: &mut usize) -> bool {
    let n = (dst.len() - *filled).min(buf.len());
    dst[*filled..*filled + n].copy_from_slice(&buf.pending()[..n]);
    buf.consume(n);
    *filled += n;
    *filled == dst.len()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Waiting,
    Done,
}

/// Big-endian `i32`.
#[derive(Debug)]
pub struct IntDecoder {
    state: State,
    scratch: [u8; 4],
    filled: usize,
    value: Option<i32>,
}

impl IntDecoder {
    pub fn new() -> Self {
        Self {
            state: State::Waiting,
            scratch: [0; 4],
            filled: 0,
            value: None,
        }
    }
}

impl Default for IntDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for IntDecoder {
    type Output = i32;

    fn process(&mut self, buf: &mut Buffer) -> DecodeStatus {
        if self.state == State::Done {
            return DecodeStatus::Done;
        }
        if !take_exact(buf, &mut self.scratch, &mut self.filled) {
            return DecodeStatus::Refill;
        }
        self.value = Some(i32::from_be_bytes(self.scratch));
        self.state = State::Done;
        DecodeStatus::Done
    }

    fn get(&mut self) -> Option<i32> {
        self.value.take()
    }

    fn reset(&mut self) {
        self.state = State::Waiting;
        self.filled = 0;
        self.value = None;
    }
}

/// Failure while driving a decoder over a blocking stream.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("framing error: {0}")]
    Decode(#[from] DecodeError),
}

/// Drives decoders over a blocking stream.
///
/// Bytes read past the end of one frame stay in the internal buffer and are
/// seen by the next `read` call.
pub struct BlockingReader<R> {
    stream: R,
    buffer: Buffer,
}

impl<R: Read> BlockingReader<R> {
    pub fn new(stream: R, buffer_size: usize) -> Self {
        Self {
            stream,
            buffer: Buffer::new(buffer_size),
        }
    }

    /// Decode one value, reading from the stream whenever the decoder asks
    /// for more input. End-of-stream before `Done` is `UnexpectedEof`.
    pub fn read<D: Decoder>(&mut self, decoder: &mut D) -> Result<D::Output, StreamError> {
        loop {
            match decoder.process(&mut self.buffer) {
                DecodeStatus::Done => {
                    let value = decoder.get();
                    decoder.reset();
                    return value.ok_or_else(|| {
                        StreamError::Io(io::Error::new(
                            io::ErrorKind::Other,
                            "decoder reported done without a value",
                        ))
                    });
                }
                DecodeStatus::Refill => {
                    if self.buffer.is_full() {
                        return Err(StreamError::Io(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "decoder stalled on a full buffer",
                        )));
                    }
                    match self.buffer.fill_from(&mut self.stream) {
                        Ok(0) => return Err(DecodeError::UnexpectedEof.into()),
                        Ok(_) => {}
                        Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                DecodeStatus::Error(e) => return Err(e.into()),
            }
        }
    }

    /// Append everything up to end-of-stream to `dst`, buffered bytes first.
    pub fn read_to_end(&mut self, dst: &mut Vec<u8>) -> io::Result<usize> {
        let buffered = self.buffer.len();
        dst.extend_from_slice(self.buffer.pending());
        self.buffer.clear();
        Ok(buffered + self.stream.read_to_end(dst)?)
    }

    /// Bytes received but not yet decoded.
    pub fn buffered(&self) -> &[u8] {
        self.buffer.pending()
    }

    pub fn get_ref(&self) -> &R {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.stream
    }

    pub fn into_inner(self) -> R {
        self.stream
    }
}
