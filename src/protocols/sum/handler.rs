//! Sum protocol handler.

use crate::protocols::sum::SumDecoder;
use crate::runtime::{ConnectionId, Outbox, Protocol};
use std::net::SocketAddr;
use tracing::{debug, trace};

/// Replies to every request with the sum of its operands.
#[derive(Debug, Default)]
pub struct SumServer {
    /// Requests answered since start.
    answered: u64,
}

impl SumServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answered(&self) -> u64 {
        self.answered
    }
}

impl Protocol for SumServer {
    type Decoder = SumDecoder;
    type Outbound = i32;

    fn decoder(&self) -> SumDecoder {
        SumDecoder::new()
    }

    fn on_message(&mut self, conn: ConnectionId, sum: i32, outbox: &mut Outbox<i32>) {
        trace!(conn_id = conn, sum, "Sum computed");
        self.answered += 1;
        outbox.reply(sum);
    }

    fn on_open(&mut self, conn: ConnectionId, peer: SocketAddr) {
        debug!(conn_id = conn, peer = %peer, "Sum client connected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::sum::parser::encode_request;
    use crate::runtime::connection::tests::{MockStream, Step};
    use crate::runtime::Connection;

    #[test]
    fn test_sum_server_replies_in_order() {
        let mut bytes = encode_request(2, 3).to_vec();
        bytes.extend_from_slice(&encode_request(10, -4));
        let stream = MockStream::new(vec![Step::Data(bytes), Step::Eof]);

        let mut server = SumServer::new();
        let mut outbox = Outbox::new();
        let mut conn: Connection<_, SumServer> = Connection::new(stream, 1024, server.decoder());

        conn.on_writable(0, &mut server, &mut outbox).unwrap();
        conn.on_readable(0, &mut server, &mut outbox).unwrap();

        let mut expected = 5i32.to_be_bytes().to_vec();
        expected.extend_from_slice(&6i32.to_be_bytes());
        assert_eq!(conn.stream().written, expected);
        assert_eq!(server.answered(), 2);
        // Peer closed and everything is flushed
        assert_eq!(conn.interest(), None);
    }

    #[test]
    fn test_undersized_buffer_drops_replies_explicitly() {
        let mut bytes = encode_request(2, 3).to_vec();
        bytes.extend_from_slice(&encode_request(1, 1));
        let stream = MockStream::new(vec![Step::Data(bytes), Step::Eof]);

        let mut server = SumServer::new();
        let mut outbox = Outbox::new();
        let mut conn: Connection<_, SumServer> = Connection::new(stream, 2, server.decoder());

        conn.on_writable(0, &mut server, &mut outbox).unwrap();
        conn.on_readable(0, &mut server, &mut outbox).unwrap();

        // Every record is still decoded; replies that cannot fit are dropped
        assert_eq!(server.answered(), 2);
        assert_eq!(conn.queued(), 0);
        assert!(conn.stream().written.is_empty());
        assert_eq!(conn.interest(), None);
    }
}
