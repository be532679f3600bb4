//! Single-threaded readiness runtime.
//!
//! Shared abstractions:
//! - `Buffer`: bounded per-connection byte region, always in fill mode
//! - `Decoder`: resumable frame decoder reporting DONE / REFILL / ERROR
//! - `OutboundQueue`: unserialized outgoing messages, committed whole
//! - `Connection`: per-socket state machine and interest computation
//! - `Reactor`: the mio event loop dispatching readiness to connections

mod buffer;
pub mod connection;
pub mod decoder;
pub mod protocol;
pub mod queue;
pub mod reactor;
mod token;

pub use buffer::Buffer;
pub use connection::{interest_for, ConnState, Connection};
pub use decoder::{BlockingReader, DecodeError, DecodeStatus, Decoder, IntDecoder, StreamError};
pub use protocol::{ConnectionId, Outbox, Protocol};
pub use queue::{Encode, OutboundQueue};
pub use reactor::{Notifier, Reactor};

/// Sizing knobs shared by every endpoint.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Capacity of each connection's input and output buffer.
    pub buffer_size: usize,
    /// Connections accepted beyond this are closed immediately.
    pub max_connections: usize,
    /// Readiness events fetched per poll.
    pub events_capacity: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            buffer_size: 1024,
            max_connections: 1024,
            events_capacity: 256,
        }
    }
}
