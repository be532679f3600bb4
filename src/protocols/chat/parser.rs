//! Chat record codec.

use crate::runtime::{Buffer, DecodeError, DecodeStatus, Decoder, Encode, IntDecoder};
use bytes::BufMut;
use std::fmt;

/// Default upper bound for one length-prefixed field.
pub const MAX_FIELD_LEN: usize = 1024 * 1024;

/// One chat record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub login: String,
    pub text: String,
}

impl Message {
    pub fn new(login: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            text: text.into(),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.login, self.text)
    }
}

impl Encode for Message {
    fn encoded_len(&self) -> usize {
        8 + self.login.len() + self.text.len()
    }

    fn encode<B: BufMut>(&self, dst: &mut B) {
        dst.put_i32(self.login.len() as i32);
        dst.put_slice(self.login.as_bytes());
        dst.put_i32(self.text.len() as i32);
        dst.put_slice(self.text.as_bytes());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StringState {
    Length,
    Bytes,
    Done,
}

/// Length-prefixed UTF-8 string: big-endian `i32` byte count, then bytes.
#[derive(Debug)]
pub struct StringDecoder {
    state: StringState,
    len: IntDecoder,
    expected: usize,
    bytes: Vec<u8>,
    max_len: usize,
    value: Option<String>,
}

impl StringDecoder {
    pub fn new() -> Self {
        Self::with_max_len(MAX_FIELD_LEN)
    }

    /// Reject declared lengths above `max_len`.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            state: StringState::Length,
            len: IntDecoder::new(),
            expected: 0,
            bytes: Vec::new(),
            max_len,
            value: None,
        }
    }
}

impl Default for StringDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for StringDecoder {
    type Output = String;

    fn process(&mut self, buf: &mut Buffer) -> DecodeStatus {
        loop {
            match self.state {
                StringState::Length => {
                    match self.len.process(buf) {
                        DecodeStatus::Done => {}
                        other => return other,
                    }
                    let declared = self.len.get().unwrap_or_default();
                    if declared < 0 {
                        return DecodeStatus::Error(DecodeError::NegativeLength(declared));
                    }
                    let declared = declared as usize;
                    if declared > self.max_len {
                        return DecodeStatus::Error(DecodeError::TooLong {
                            len: declared,
                            max: self.max_len,
                        });
                    }
                    self.expected = declared;
                    self.bytes.clear();
                    self.bytes.reserve(declared);
                    self.state = StringState::Bytes;
                }
                StringState::Bytes => {
                    let n = (self.expected - self.bytes.len()).min(buf.len());
                    self.bytes.extend_from_slice(&buf.pending()[..n]);
                    buf.consume(n);
                    if self.bytes.len() < self.expected {
                        return DecodeStatus::Refill;
                    }
                    match String::from_utf8(std::mem::take(&mut self.bytes)) {
                        Ok(s) => self.value = Some(s),
                        Err(_) => return DecodeStatus::Error(DecodeError::InvalidUtf8),
                    }
                    self.state = StringState::Done;
                }
                StringState::Done => return DecodeStatus::Done,
            }
        }
    }

    fn get(&mut self) -> Option<String> {
        self.value.take()
    }

    fn reset(&mut self) {
        self.state = StringState::Length;
        self.len.reset();
        self.expected = 0;
        self.bytes.clear();
        self.value = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageState {
    Login,
    Text,
    Done,
}

/// Decodes one chat record: login string, then text string.
#[derive(Debug)]
pub struct MessageDecoder {
    state: MessageState,
    field: StringDecoder,
    login: Option<String>,
    value: Option<Message>,
}

impl MessageDecoder {
    pub fn new() -> Self {
        Self::with_max_len(MAX_FIELD_LEN)
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            state: MessageState::Login,
            field: StringDecoder::with_max_len(max_len),
            login: None,
            value: None,
        }
    }
}

impl Default for MessageDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MessageDecoder {
    type Output = Message;

    fn process(&mut self, buf: &mut Buffer) -> DecodeStatus {
        loop {
            match self.state {
                MessageState::Login => {
                    match self.field.process(buf) {
                        DecodeStatus::Done => {}
                        other => return other,
                    }
                    self.login = self.field.get();
                    self.field.reset();
                    self.state = MessageState::Text;
                }
                MessageState::Text => {
                    match self.field.process(buf) {
                        DecodeStatus::Done => {}
                        other => return other,
                    }
                    let text = self.field.get().unwrap_or_default();
                    self.field.reset();
                    let login = self.login.take().unwrap_or_default();
                    self.value = Some(Message { login, text });
                    self.state = MessageState::Done;
                }
                MessageState::Done => return DecodeStatus::Done,
            }
        }
    }

    fn get(&mut self) -> Option<Message> {
        self.value.take()
    }

    fn reset(&mut self) {
        self.state = MessageState::Login;
        self.field.reset();
        self.login = None;
        self.value = None;
    }
}
