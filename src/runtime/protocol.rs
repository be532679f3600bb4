//! Protocol handler contract for the event loop.
//!
//! A protocol supplies one decoder per connection and reacts to every
//! decoded message. Responses are not written directly; they are staged in
//! an `Outbox` and the event loop routes them onto outbound queues.

use crate::runtime::decoder::Decoder;
use crate::runtime::queue::Encode;
use std::net::SocketAddr;

/// Identifier of a live connection within one event loop.
pub type ConnectionId = usize;

/// Application logic plugged into the event loop.
pub trait Protocol {
    /// Per-connection frame decoder.
    type Decoder: Decoder;
    /// Messages sent back to peers.
    type Outbound: Encode;

    /// Fresh decoder for a new connection.
    fn decoder(&self) -> Self::Decoder;

    /// Handle one decoded message from `conn`.
    fn on_message(
        &mut self,
        conn: ConnectionId,
        msg: <Self::Decoder as Decoder>::Output,
        outbox: &mut Outbox<Self::Outbound>,
    );

    /// A connection was accepted or established.
    fn on_open(&mut self, _conn: ConnectionId, _peer: SocketAddr) {}

    /// A connection was torn down.
    fn on_close(&mut self, _conn: ConnectionId) {}
}

/// Messages produced while handling input.
#[derive(Debug)]
pub struct Outbox<T> {
    replies: Vec<T>,
    broadcasts: Vec<T>,
}

impl<T> Outbox<T> {
    pub fn new() -> Self {
        Self {
            replies: Vec::new(),
            broadcasts: Vec::new(),
        }
    }

    /// Send `msg` back to the connection that produced the input.
    pub fn reply(&mut self, msg: T) {
        self.replies.push(msg);
    }

    /// Send `msg` to every live connection, the sender included.
    pub fn broadcast(&mut self, msg: T) {
        self.broadcasts.push(msg);
    }

    pub(crate) fn take_replies(&mut self) -> std::vec::Drain<'_, T> {
        self.replies.drain(..)
    }

    pub(crate) fn take_broadcasts(&mut self) -> Vec<T> {
        std::mem::take(&mut self.broadcasts)
    }

    pub(crate) fn has_broadcasts(&self) -> bool {
        !self.broadcasts.is_empty()
    }
}

impl<T> Default for Outbox<T> {
    fn default() -> Self {
        Self::new()
    }
}
