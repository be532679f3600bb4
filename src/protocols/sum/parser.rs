//! Sum request decoder.

use crate::runtime::decoder::take_exact;
use crate::runtime::{Buffer, DecodeStatus, Decoder};

/// Bytes in one request: two big-endian `i32`.
pub const RECORD_LEN: usize = 8;

/// Decodes one request into the sum of its two operands.
///
/// Never fails: every 8-byte pattern is a valid request.
#[derive(Debug, Default)]
pub struct SumDecoder {
    scratch: [u8; RECORD_LEN],
    filled: usize,
    value: Option<i32>,
}

impl SumDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for SumDecoder {
    type Output = i32;

    fn process(&mut self, buf: &mut Buffer) -> DecodeStatus {
        if self.value.is_some() {
            return DecodeStatus::Done;
        }
        if !take_exact(buf, &mut self.scratch, &mut self.filled) {
            return DecodeStatus::Refill;
        }
        let (a, b) = self.scratch.split_at(4);
        let a = i32::from_be_bytes([a[0], a[1], a[2], a[3]]);
        let b = i32::from_be_bytes([b[0], b[1], b[2], b[3]]);
        self.value = Some(a.wrapping_add(b));
        DecodeStatus::Done
    }

    fn get(&mut self) -> Option<i32> {
        self.value.take()
    }

    fn reset(&mut self) {
        self.filled = 0;
        self.value = None;
    }
}

/// Encode one request.
pub fn encode_request(a: i32, b: i32) -> [u8; RECORD_LEN] {
    let mut out = [0u8; RECORD_LEN];
    out[..4].copy_from_slice(&a.to_be_bytes());
    out[4..].copy_from_slice(&b.to_be_bytes());
    out
}
