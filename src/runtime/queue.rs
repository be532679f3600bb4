//! Outbound message queue.
//!
//! Messages are kept unserialized until the output buffer has room for the
//! whole encoding. A message is only removed from the queue once it has been
//! written into the buffer in full, so a peer never sees a torn record.

use crate::runtime::Buffer;
use bytes::BufMut;
use std::collections::VecDeque;

/// A message that can be serialized onto the wire.
pub trait Encode {
    /// Exact number of bytes `encode` will write.
    fn encoded_len(&self) -> usize;

    /// Serialize into `dst`, which is guaranteed to hold `encoded_len` bytes.
    fn encode<B: BufMut>(&self, dst: &mut B);
}

/// Big-endian 32-bit integer, as used by the sum protocol replies.
impl Encode for i32 {
    fn encoded_len(&self) -> usize {
        4
    }

    fn encode<B: BufMut>(&self, dst: &mut B) {
        dst.put_i32(*self);
    }
}

/// FIFO of messages waiting for output buffer space.
#[derive(Debug)]
pub struct OutboundQueue<T> {
    messages: VecDeque<T>,
}

impl<T: Encode> OutboundQueue<T> {
    pub fn new() -> Self {
        Self {
            messages: VecDeque::new(),
        }
    }

    pub fn push(&mut self, msg: T) {
        self.messages.push_back(msg);
    }

    /// Serialize queued messages into `out` in order, stopping at the first
    /// one that does not fit. Returns how many messages were moved.
    pub fn fill(&mut self, out: &mut Buffer) -> usize {
        let mut moved = 0;
        while let Some(msg) = self.messages.front() {
            if !out.put_encoded(msg) {
                break;
            }
            self.messages.pop_front();
            moved += 1;
        }
        moved
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop every pending message.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

impl<T: Encode> Default for OutboundQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
