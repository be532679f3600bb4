//! Chat server and client protocol handlers.

use super::parser::{Message, MessageDecoder};
use crate::runtime::{ConnectionId, Outbox, Protocol};
use std::io::{self, Write};
use std::net::SocketAddr;
use tracing::{debug, info, warn};

/// Relays every received record to all connected clients.
#[derive(Debug)]
pub struct ChatServer {
    max_field_len: usize,
    relayed: u64,
}

impl ChatServer {
    /// Fields longer than `max_field_len` bytes close the sender.
    pub fn new(max_field_len: usize) -> Self {
        Self {
            max_field_len,
            relayed: 0,
        }
    }

    pub fn relayed(&self) -> u64 {
        self.relayed
    }
}

impl Protocol for ChatServer {
    type Decoder = MessageDecoder;
    type Outbound = Message;

    fn decoder(&self) -> MessageDecoder {
        MessageDecoder::with_max_len(self.max_field_len)
    }

    fn on_message(&mut self, conn: ConnectionId, msg: Message, outbox: &mut Outbox<Message>) {
        debug!(conn_id = conn, login = %msg.login, len = msg.text.len(), "Relaying message");
        self.relayed += 1;
        outbox.broadcast(msg);
    }

    fn on_open(&mut self, conn: ConnectionId, peer: SocketAddr) {
        info!(conn_id = conn, peer = %peer, "Client joined");
    }

    fn on_close(&mut self, conn: ConnectionId) {
        info!(conn_id = conn, "Client left");
    }
}

/// Client side: prints every received record as `login: text`.
#[derive(Debug)]
pub struct ChatPrinter<W> {
    out: W,
    max_field_len: usize,
}

impl ChatPrinter<io::Stdout> {
    pub fn stdout(max_field_len: usize) -> Self {
        Self::new(io::stdout(), max_field_len)
    }
}

impl<W: Write> ChatPrinter<W> {
    pub fn new(out: W, max_field_len: usize) -> Self {
        Self { out, max_field_len }
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }
}

impl<W: Write> Protocol for ChatPrinter<W> {
    type Decoder = MessageDecoder;
    type Outbound = Message;

    fn decoder(&self) -> MessageDecoder {
        MessageDecoder::with_max_len(self.max_field_len)
    }

    fn on_message(&mut self, _conn: ConnectionId, msg: Message, _outbox: &mut Outbox<Message>) {
        if let Err(e) = writeln!(self.out, "{msg}").and_then(|()| self.out.flush()) {
            warn!(error = %e, "Failed to print message");
        }
    }

    fn on_close(&mut self, _conn: ConnectionId) {
        info!("Disconnected from server");
    }
}
