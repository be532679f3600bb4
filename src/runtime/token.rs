//! Poll token assignment.
//!
//! Connection tokens are slab keys; the two highest token values are
//! reserved for the listener and the cross-thread waker.

use crate::runtime::protocol::ConnectionId;
use mio::Token;

/// Token of the listening socket.
pub const LISTENER_TOKEN: Token = Token(usize::MAX);

/// Token of the cross-thread waker.
pub const WAKER_TOKEN: Token = Token(usize::MAX - 1);

/// What a readiness event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Listener,
    Waker,
    Connection(ConnectionId),
}

impl Source {
    pub fn from_token(token: Token) -> Self {
        match token {
            LISTENER_TOKEN => Source::Listener,
            WAKER_TOKEN => Source::Waker,
            Token(id) => Source::Connection(id),
        }
    }
}

/// Token for a connection slot.
pub fn connection_token(conn_id: ConnectionId) -> Token {
    debug_assert!(conn_id < WAKER_TOKEN.0, "connection id collides with reserved token");
    Token(conn_id)
}
