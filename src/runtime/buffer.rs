//! Bounded per-connection byte buffers.
//!
//! A `Buffer` is a fixed-capacity byte region with a single fill cursor.
//! Bytes that have been received (or serialized) but not yet consumed
//! (or written) live in `[0, len)`; spare capacity is `[len, capacity)`.
//!
//! ## Fill Mode
//!
//! Every operation leaves the buffer ready to accept more bytes: consuming
//! from the front shifts the unconsumed tail back to offset zero. Read,
//! decode and write logic can therefore interleave freely on a connection
//! without ever observing a half-flipped buffer, and undecoded bytes are
//! never dropped across refills.

use crate::runtime::queue::Encode;
use std::io::{self, Read, Write};

/// Fixed-capacity byte buffer that is always in fill mode.
pub struct Buffer {
    /// Backing storage, allocated once.
    data: Box<[u8]>,
    /// Number of pending bytes at the front of `data`.
    len: usize,
}

impl Buffer {
    /// Create an empty buffer with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of pending bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if no bytes are pending.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Spare capacity available for new bytes.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.len
    }

    /// Check if there is no spare capacity left.
    pub fn is_full(&self) -> bool {
        self.len == self.data.len()
    }

    /// Pending bytes, oldest first.
    pub fn pending(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Spare region to be filled by the caller, followed by `commit`.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.len..]
    }

    /// Mark `n` bytes of the spare region as filled.
    pub fn commit(&mut self, n: usize) {
        debug_assert!(n <= self.remaining(), "commit past capacity");
        self.len += n.min(self.remaining());
    }

    /// Drop `n` bytes from the front and shift the tail to offset zero.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.len);
        if n == 0 {
            return;
        }
        self.data.copy_within(n..self.len, 0);
        self.len -= n;
    }

    /// Discard all pending bytes.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Copy as much of `src` as fits, returning the number of bytes copied.
    pub fn put_slice(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.remaining());
        self.data[self.len..self.len + n].copy_from_slice(&src[..n]);
        self.len += n;
        n
    }

    /// Serialize `msg` into the spare region if, and only if, it fits whole.
    ///
    /// Returns `false` (leaving the buffer untouched) when it does not.
    pub fn put_encoded<E: Encode>(&mut self, msg: &E) -> bool {
        let needed = msg.encoded_len();
        if needed > self.remaining() {
            return false;
        }
        let mut dst: &mut [u8] = &mut self.data[self.len..self.len + needed];
        msg.encode(&mut dst);
        debug_assert!(dst.is_empty(), "encoded_len disagrees with encode");
        self.len += needed;
        true
    }

    /// Perform one read from `src` into the spare region.
    ///
    /// `Ok(0)` means end-of-stream; callers must not call this on a full
    /// buffer. `WouldBlock` is passed through untouched.
    pub fn fill_from<R: Read>(&mut self, src: &mut R) -> io::Result<usize> {
        debug_assert!(!self.is_full(), "fill_from on a full buffer");
        let n = src.read(&mut self.data[self.len..])?;
        self.len += n;
        Ok(n)
    }

    /// Perform one write of the pending bytes to `dst`, consuming what was
    /// accepted. Partial writes leave the rest pending.
    pub fn drain_to<W: Write>(&mut self, dst: &mut W) -> io::Result<usize> {
        if self.len == 0 {
            return Ok(0);
        }
        let n = dst.write(&self.data[..self.len])?;
        self.consume(n);
        Ok(n)
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.len)
            .field("capacity", &self.data.len())
            .finish()
    }
}
