//! Per-connection state machine.
//!
//! A `Connection` owns one socket together with its input buffer, output
//! buffer, frame decoder and outbound queue. The event loop calls
//! `on_readable` / `on_writable` when the poller reports readiness; both
//! drive the same pump:
//!
//! 1. write pending output while the socket accepts it
//! 2. move queued messages into the output buffer (whole messages only)
//! 3. decode buffered input while our own queue is empty (backpressure)
//! 4. read more input while the socket has data and the buffer has room
//!
//! until none of the steps makes progress. Afterwards the desired interest
//! set is recomputed from `{closing, input spare, output pending}` alone.
//! An empty interest set means the connection has nothing left to do and
//! must be torn down.
//!
//! mio readiness is edge-triggered, so the connection remembers whether the
//! socket is still readable / writable and only waits for a new event after
//! the kernel has reported `WouldBlock`.

use crate::runtime::decoder::{DecodeStatus, Decoder};
use crate::runtime::protocol::{ConnectionId, Outbox, Protocol};
use crate::runtime::queue::{Encode, OutboundQueue};
use crate::runtime::Buffer;
use mio::event::Source;
use mio::{Interest, Registry, Token};
use slab::Slab;
use std::io::{self, Read, Write};
use tracing::{trace, warn};

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Outgoing connect still in progress.
    Connecting,
    /// Reading and writing.
    Open,
    /// Peer sent end-of-stream; remaining output is still flushed.
    Closing,
    /// Torn down.
    Closed,
}

/// Interest set for the given connection state.
///
/// READ while not closing and the input buffer has room; WRITE while the
/// output buffer holds bytes. `None` means teardown.
pub fn interest_for(closing: bool, input_spare: usize, output_pending: usize) -> Option<Interest> {
    let read = !closing && input_spare > 0;
    let write = output_pending > 0;
    match (read, write) {
        (true, true) => Some(Interest::READABLE.add(Interest::WRITABLE)),
        (true, false) => Some(Interest::READABLE),
        (false, true) => Some(Interest::WRITABLE),
        (false, false) => None,
    }
}

/// A single connection context.
pub struct Connection<S, P: Protocol> {
    stream: S,
    state: ConnState,
    input: Buffer,
    output: Buffer,
    decoder: P::Decoder,
    queue: OutboundQueue<P::Outbound>,
    /// Socket reported readable and no `WouldBlock` seen since.
    read_ready: bool,
    /// Socket reported writable and no `WouldBlock` seen since.
    write_ready: bool,
    /// Bytes the decoder has consumed for the frame in progress.
    frame_len: usize,
    /// Interest the connection wants.
    interest: Option<Interest>,
    /// Interest currently registered with the poller.
    registered: Option<Interest>,
}

impl<S: Read + Write, P: Protocol> Connection<S, P> {
    /// Wrap an established stream.
    pub fn new(stream: S, buffer_size: usize, decoder: P::Decoder) -> Self {
        Self {
            stream,
            state: ConnState::Open,
            input: Buffer::new(buffer_size),
            output: Buffer::new(buffer_size),
            decoder,
            queue: OutboundQueue::new(),
            read_ready: false,
            write_ready: false,
            frame_len: 0,
            interest: Some(Interest::READABLE),
            registered: None,
        }
    }

    /// Wrap a stream whose connect has not completed yet.
    pub fn connecting(stream: S, buffer_size: usize, decoder: P::Decoder) -> Self {
        let mut conn = Self::new(stream, buffer_size, decoder);
        conn.state = ConnState::Connecting;
        conn.interest = Some(Interest::WRITABLE);
        conn
    }

    /// Connect completed; start the normal read/write cycle.
    pub fn on_connected(&mut self) {
        if self.state == ConnState::Connecting {
            self.state = ConnState::Open;
            self.update_interest();
        }
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnState::Closed
    }

    /// Desired interest, `None` once the connection should be torn down.
    pub fn interest(&self) -> Option<Interest> {
        self.interest
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn input(&self) -> &Buffer {
        &self.input
    }

    pub fn output(&self) -> &Buffer {
        &self.output
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// The socket became readable.
    pub fn on_readable(
        &mut self,
        id: ConnectionId,
        protocol: &mut P,
        outbox: &mut Outbox<P::Outbound>,
    ) -> io::Result<()> {
        self.read_ready = true;
        self.pump(id, protocol, outbox)
    }

    /// The socket became writable.
    pub fn on_writable(
        &mut self,
        id: ConnectionId,
        protocol: &mut P,
        outbox: &mut Outbox<P::Outbound>,
    ) -> io::Result<()> {
        self.write_ready = true;
        self.pump(id, protocol, outbox)
    }

    /// Queue a message for this peer and push out whatever fits.
    pub fn enqueue(
        &mut self,
        msg: P::Outbound,
        id: ConnectionId,
        protocol: &mut P,
        outbox: &mut Outbox<P::Outbound>,
    ) -> io::Result<()> {
        if self.state == ConnState::Closed {
            return Ok(());
        }
        if self.admit(msg, id) {
            self.pump(id, protocol, outbox)
        } else {
            Ok(())
        }
    }

    /// Queue `msg` unless it can never fit in the output buffer.
    fn admit(&mut self, msg: P::Outbound, id: ConnectionId) -> bool {
        if msg.encoded_len() > self.output.capacity() {
            warn!(
                conn_id = id,
                len = msg.encoded_len(),
                capacity = self.output.capacity(),
                "Dropping message larger than the output buffer"
            );
            return false;
        }
        self.queue.push(msg);
        true
    }

    /// Tear the connection down. Returns `false` if it was already closed.
    pub fn close(&mut self) -> bool {
        if self.state == ConnState::Closed {
            return false;
        }
        self.state = ConnState::Closed;
        self.interest = None;
        self.queue.clear();
        self.input.clear();
        self.output.clear();
        self.decoder.reset();
        self.frame_len = 0;
        true
    }

    fn pump(
        &mut self,
        id: ConnectionId,
        protocol: &mut P,
        outbox: &mut Outbox<P::Outbound>,
    ) -> io::Result<()> {
        if matches!(self.state, ConnState::Connecting | ConnState::Closed) {
            return Ok(());
        }

        loop {
            let wrote = self.write_out()?;
            let staged = self.queue.fill(&mut self.output) > 0;
            let decoded = self.process_in(id, protocol, outbox)?;
            let read = self.read_in(id)?;
            if !(wrote || staged || decoded || read) {
                break;
            }
        }

        self.update_interest();
        Ok(())
    }

    /// Decode buffered input until the decoder needs more bytes or our own
    /// queue backs up.
    fn process_in(
        &mut self,
        id: ConnectionId,
        protocol: &mut P,
        outbox: &mut Outbox<P::Outbound>,
    ) -> io::Result<bool> {
        let mut progress = false;
        while self.queue.is_empty() {
            let before = self.input.len();
            let status = self.decoder.process(&mut self.input);
            self.frame_len += before - self.input.len();
            match status {
                DecodeStatus::Done => {
                    // A frame that took no bytes would be decoded forever
                    if self.frame_len == 0 {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "decoder completed an empty frame",
                        ));
                    }
                    self.frame_len = 0;
                    if let Some(msg) = self.decoder.get() {
                        protocol.on_message(id, msg, outbox);
                    }
                    self.decoder.reset();
                    for reply in outbox.take_replies() {
                        self.admit(reply, id);
                    }
                    progress = true;
                }
                DecodeStatus::Refill => break,
                DecodeStatus::Error(e) => {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, e));
                }
            }
        }
        Ok(progress)
    }

    fn read_in(&mut self, id: ConnectionId) -> io::Result<bool> {
        if !self.read_ready || self.state != ConnState::Open || self.input.is_full() {
            return Ok(false);
        }
        match self.input.fill_from(&mut self.stream) {
            Ok(0) => {
                trace!(conn_id = id, "End of stream");
                self.state = ConnState::Closing;
                Ok(true)
            }
            Ok(n) => {
                trace!(conn_id = id, bytes = n, "Read");
                Ok(true)
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.read_ready = false;
                Ok(false)
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => Ok(true),
            Err(e) => Err(e),
        }
    }

    fn write_out(&mut self) -> io::Result<bool> {
        if !self.write_ready || self.output.is_empty() {
            return Ok(false);
        }
        match self.output.drain_to(&mut self.stream) {
            Ok(0) => Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0")),
            Ok(_) => Ok(true),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.write_ready = false;
                Ok(false)
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => Ok(true),
            Err(e) => Err(e),
        }
    }

    fn update_interest(&mut self) {
        self.interest = match self.state {
            ConnState::Connecting => Some(Interest::WRITABLE),
            ConnState::Closed => None,
            ConnState::Open | ConnState::Closing => interest_for(
                self.state == ConnState::Closing,
                self.input.remaining(),
                self.output.len(),
            ),
        };
    }
}

impl<S: Source, P: Protocol> Connection<S, P> {
    /// Bring the poller registration in line with the desired interest.
    pub fn sync_registration(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        match (self.registered, self.interest) {
            (None, Some(interest)) => {
                registry.register(&mut self.stream, token, interest)?;
                self.registered = Some(interest);
            }
            (Some(current), Some(interest)) if current != interest => {
                registry.reregister(&mut self.stream, token, interest)?;
                self.registered = Some(interest);
            }
            _ => {}
        }
        Ok(())
    }

    /// Remove the socket from the poller, ignoring errors.
    pub fn deregister(&mut self, registry: &Registry) {
        if self.registered.take().is_some() {
            let _ = registry.deregister(&mut self.stream);
        }
    }
}

/// Registry of live connections using slab allocation.
///
/// Provides O(1) insert, lookup, and remove operations.
pub struct ConnectionRegistry<C> {
    connections: Slab<C>,
    max_connections: usize,
}

impl<C> ConnectionRegistry<C> {
    /// Create a new registry with specified maximum capacity.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: Slab::with_capacity(max_connections.min(4096)),
            max_connections,
        }
    }

    /// Insert a new connection into the registry.
    ///
    /// Returns `None` if the registry is at capacity.
    pub fn insert(&mut self, conn: C) -> Option<ConnectionId> {
        if self.connections.len() >= self.max_connections {
            return None;
        }
        Some(self.connections.insert(conn))
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut C> {
        self.connections.get_mut(id)
    }

    /// Remove a connection; unknown ids are ignored.
    pub fn remove(&mut self, id: ConnectionId) -> Option<C> {
        self.connections.try_remove(id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains(id)
    }

    pub fn is_full(&self) -> bool {
        self.connections.len() >= self.max_connections
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Ids of all live connections.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|(id, _)| id).collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::runtime::decoder::{DecodeError, IntDecoder};
    use std::collections::VecDeque;

    /// Scripted in-memory socket.
    pub(crate) enum Step {
        Data(Vec<u8>),
        WouldBlock,
        Eof,
    }

    pub(crate) struct MockStream {
        pub reads: VecDeque<Step>,
        pub written: Vec<u8>,
        /// Bytes the peer will still accept before `WouldBlock`.
        pub write_budget: usize,
    }

    impl MockStream {
        pub fn new(reads: Vec<Step>) -> Self {
            Self {
                reads: reads.into(),
                written: Vec::new(),
                write_budget: usize::MAX,
            }
        }
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(Step::Data(mut bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    if n < bytes.len() {
                        self.reads.push_front(Step::Data(bytes.split_off(n)));
                    }
                    Ok(n)
                }
                Some(Step::Eof) => {
                    self.reads.push_front(Step::Eof);
                    Ok(0)
                }
                Some(Step::WouldBlock) | None => Err(io::ErrorKind::WouldBlock.into()),
            }
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.write_budget == 0 {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let n = buf.len().min(self.write_budget);
            self.write_budget -= n;
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Doubles every big-endian i32 it receives.
    struct Doubler {
        seen: Vec<i32>,
    }

    impl Protocol for Doubler {
        type Decoder = IntDecoder;
        type Outbound = i32;

        fn decoder(&self) -> IntDecoder {
            IntDecoder::new()
        }

        fn on_message(&mut self, _conn: ConnectionId, msg: i32, outbox: &mut Outbox<i32>) {
            self.seen.push(msg);
            outbox.reply(msg.wrapping_mul(2));
        }
    }

    /// Yields each byte, rejecting 0xff.
    struct ByteDecoder(Option<u8>);

    impl Decoder for ByteDecoder {
        type Output = u8;

        fn process(&mut self, buf: &mut Buffer) -> DecodeStatus {
            match buf.pending().first().copied() {
                None => DecodeStatus::Refill,
                Some(0xff) => DecodeStatus::Error(DecodeError::InvalidUtf8),
                Some(b) => {
                    buf.consume(1);
                    self.0 = Some(b);
                    DecodeStatus::Done
                }
            }
        }

        fn get(&mut self) -> Option<u8> {
            self.0.take()
        }

        fn reset(&mut self) {
            self.0 = None;
        }
    }

    struct ByteSink(Vec<u8>);

    impl Protocol for ByteSink {
        type Decoder = ByteDecoder;
        type Outbound = i32;

        fn decoder(&self) -> ByteDecoder {
            ByteDecoder(None)
        }

        fn on_message(&mut self, _conn: ConnectionId, msg: u8, _outbox: &mut Outbox<i32>) {
            self.0.push(msg);
        }
    }

    fn ints(values: &[i32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    #[test]
    fn test_interest_table() {
        let rw = Interest::READABLE.add(Interest::WRITABLE);
        assert_eq!(interest_for(false, 10, 0), Some(Interest::READABLE));
        assert_eq!(interest_for(false, 10, 4), Some(rw));
        assert_eq!(interest_for(false, 0, 4), Some(Interest::WRITABLE));
        assert_eq!(interest_for(false, 0, 0), None);
        assert_eq!(interest_for(true, 10, 4), Some(Interest::WRITABLE));
        assert_eq!(interest_for(true, 0, 4), Some(Interest::WRITABLE));
        assert_eq!(interest_for(true, 10, 0), None);
        assert_eq!(interest_for(true, 0, 0), None);
    }

    #[test]
    fn test_fragmented_input_replies_in_order() {
        let bytes = ints(&[3, -7]);
        let stream = MockStream::new(vec![
            Step::Data(bytes[..3].to_vec()),
            Step::Data(bytes[3..6].to_vec()),
            Step::Data(bytes[6..].to_vec()),
            Step::WouldBlock,
        ]);
        let mut proto = Doubler { seen: Vec::new() };
        let mut outbox = Outbox::new();
        let mut conn: Connection<_, Doubler> = Connection::new(stream, 64, proto.decoder());

        conn.on_readable(0, &mut proto, &mut outbox).unwrap();
        assert_eq!(proto.seen, vec![3, -7]);
        // Not yet known writable: replies wait in the output buffer
        assert_eq!(conn.output().pending(), &ints(&[6, -14])[..]);
        assert_eq!(
            conn.interest(),
            Some(Interest::READABLE.add(Interest::WRITABLE))
        );

        conn.on_writable(0, &mut proto, &mut outbox).unwrap();
        assert_eq!(conn.stream().written, ints(&[6, -14]));
        assert_eq!(conn.interest(), Some(Interest::READABLE));
    }

    #[test]
    fn test_eof_flushes_then_tears_down() {
        let stream = MockStream::new(vec![Step::Data(ints(&[5])), Step::Eof]);
        let mut proto = Doubler { seen: Vec::new() };
        let mut outbox = Outbox::new();
        let mut conn: Connection<_, Doubler> = Connection::new(stream, 64, proto.decoder());

        conn.on_readable(0, &mut proto, &mut outbox).unwrap();
        assert_eq!(conn.state(), ConnState::Closing);
        // Pending reply keeps the connection alive for writing only
        assert_eq!(conn.interest(), Some(Interest::WRITABLE));

        conn.on_writable(0, &mut proto, &mut outbox).unwrap();
        assert_eq!(conn.stream().written, ints(&[10]));
        assert_eq!(conn.interest(), None);
    }

    #[test]
    fn test_half_record_discarded_on_eof() {
        let stream = MockStream::new(vec![Step::Data(vec![0, 0]), Step::Eof]);
        let mut proto = Doubler { seen: Vec::new() };
        let mut outbox = Outbox::new();
        let mut conn: Connection<_, Doubler> = Connection::new(stream, 64, proto.decoder());

        conn.on_readable(0, &mut proto, &mut outbox).unwrap();
        assert!(proto.seen.is_empty());
        assert_eq!(conn.interest(), None);
    }

    #[test]
    fn test_backpressure_pauses_decoding() {
        // Output buffer holds a single reply
        let stream = MockStream::new(vec![Step::Data(ints(&[1, 2, 3])), Step::WouldBlock]);
        let mut proto = Doubler { seen: Vec::new() };
        let mut outbox = Outbox::new();
        let mut conn: Connection<_, Doubler> = Connection::new(stream, 4, proto.decoder());

        conn.on_readable(0, &mut proto, &mut outbox).unwrap();
        // First record decoded and staged; second decoded but queued;
        // the third waits in the input buffer.
        assert_eq!(proto.seen, vec![1, 2]);
        assert_eq!(conn.queued(), 1);
        assert_eq!(conn.output().len(), 4);
        assert!(conn.input().is_full());
        assert_eq!(conn.interest(), Some(Interest::WRITABLE));

        conn.on_writable(0, &mut proto, &mut outbox).unwrap();
        assert_eq!(proto.seen, vec![1, 2, 3]);
        assert_eq!(conn.stream().written, ints(&[2, 4, 6]));
    }

    #[test]
    fn test_partial_writes_resume() {
        let mut stream = MockStream::new(vec![Step::Data(ints(&[1, 2])), Step::WouldBlock]);
        stream.write_budget = 5;
        let mut proto = Doubler { seen: Vec::new() };
        let mut outbox = Outbox::new();
        let mut conn: Connection<_, Doubler> = Connection::new(stream, 64, proto.decoder());

        conn.on_writable(0, &mut proto, &mut outbox).unwrap();
        conn.on_readable(0, &mut proto, &mut outbox).unwrap();
        assert_eq!(conn.stream().written.len(), 5);
        assert_eq!(conn.output().len(), 3);
        assert!(conn.interest().unwrap().is_writable());
    }

    #[test]
    fn test_enqueue_when_writable() {
        let stream = MockStream::new(vec![]);
        let mut proto = Doubler { seen: Vec::new() };
        let mut outbox = Outbox::new();
        let mut conn: Connection<_, Doubler> = Connection::new(stream, 8, proto.decoder());

        conn.on_writable(0, &mut proto, &mut outbox).unwrap();
        conn.enqueue(42, 0, &mut proto, &mut outbox).unwrap();
        assert_eq!(conn.stream().written, ints(&[42]));
        assert!(conn.output().is_empty());
    }

    #[test]
    fn test_decode_error_reported() {
        let stream = MockStream::new(vec![Step::Data(vec![1, 2, 0xff, 3])]);
        let mut proto = ByteSink(Vec::new());
        let mut outbox = Outbox::new();
        let mut conn: Connection<_, ByteSink> = Connection::new(stream, 16, proto.decoder());

        let err = conn.on_readable(0, &mut proto, &mut outbox).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        // Bytes after the bad one never reach the handler
        assert_eq!(proto.0, vec![1, 2]);
    }

    #[test]
    fn test_small_input_buffer_still_progresses() {
        let stream = MockStream::new(vec![Step::Data(vec![0, 0, 0]), Step::WouldBlock]);
        let mut proto = Doubler { seen: Vec::new() };
        let mut outbox = Outbox::new();
        // Decoder absorbs bytes, so a two-byte buffer still makes progress
        let mut conn: Connection<_, Doubler> = Connection::new(stream, 2, proto.decoder());

        conn.on_readable(0, &mut proto, &mut outbox).unwrap();
        assert!(proto.seen.is_empty());
        assert_eq!(conn.interest(), Some(Interest::READABLE));
    }

    #[test]
    fn test_reply_larger_than_output_dropped() {
        let stream = MockStream::new(vec![Step::Data(ints(&[3, 4])), Step::Eof]);
        let mut proto = Doubler { seen: Vec::new() };
        let mut outbox = Outbox::new();
        // Four-byte replies can never fit a two-byte output buffer
        let mut conn: Connection<_, Doubler> = Connection::new(stream, 2, proto.decoder());

        conn.on_writable(0, &mut proto, &mut outbox).unwrap();
        conn.on_readable(0, &mut proto, &mut outbox).unwrap();

        // Decoding kept going past the dropped replies
        assert_eq!(proto.seen, vec![3, 4]);
        assert_eq!(conn.queued(), 0);
        assert!(conn.stream().written.is_empty());
        assert_eq!(conn.interest(), None);
    }

    /// Completes a frame without looking at the input.
    struct EmptyFrames;

    impl Decoder for EmptyFrames {
        type Output = ();

        fn process(&mut self, _buf: &mut Buffer) -> DecodeStatus {
            DecodeStatus::Done
        }

        fn get(&mut self) -> Option<()> {
            Some(())
        }

        fn reset(&mut self) {}
    }

    struct EmptyCounter(usize);

    impl Protocol for EmptyCounter {
        type Decoder = EmptyFrames;
        type Outbound = i32;

        fn decoder(&self) -> EmptyFrames {
            EmptyFrames
        }

        fn on_message(&mut self, _conn: ConnectionId, _msg: (), _outbox: &mut Outbox<i32>) {
            self.0 += 1;
        }
    }

    #[test]
    fn test_empty_frame_is_an_error() {
        let stream = MockStream::new(vec![Step::WouldBlock]);
        let mut proto = EmptyCounter(0);
        let mut outbox = Outbox::new();
        let mut conn: Connection<_, EmptyCounter> = Connection::new(stream, 8, proto.decoder());

        let err = conn.on_readable(0, &mut proto, &mut outbox).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(proto.0, 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let stream = MockStream::new(vec![]);
        let proto = Doubler { seen: Vec::new() };
        let mut conn: Connection<_, Doubler> = Connection::new(stream, 8, proto.decoder());

        assert!(conn.close());
        assert!(!conn.close());
        assert!(conn.is_closed());
        assert_eq!(conn.interest(), None);
    }

    #[test]
    fn test_enqueue_after_close_discarded() {
        let stream = MockStream::new(vec![]);
        let mut proto = Doubler { seen: Vec::new() };
        let mut outbox = Outbox::new();
        let mut conn: Connection<_, Doubler> = Connection::new(stream, 8, proto.decoder());

        conn.close();
        conn.enqueue(1, 0, &mut proto, &mut outbox).unwrap();
        assert_eq!(conn.queued(), 0);
        assert!(conn.output().is_empty());
    }

    #[test]
    fn test_connection_registry() {
        let mut registry = ConnectionRegistry::new(2);

        let id1 = registry.insert("a").unwrap();
        let id2 = registry.insert("b").unwrap();

        // At capacity
        assert!(registry.is_full());
        assert!(registry.insert("c").is_none());

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get_mut(id2).copied(), Some("b"));

        registry.remove(id1);
        assert!(!registry.contains(id1));
        assert!(registry.remove(id1).is_none());
        assert_eq!(registry.ids(), vec![id2]);
    }
}
