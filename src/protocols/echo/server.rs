//! Single-socket UDP echo-plus event loop.

use crate::runtime::{Buffer, Notifier, RuntimeOptions};
use mio::net::UdpSocket;
use mio::{Events, Interest, Poll, Token};
use std::io;
use std::net::SocketAddr;
use tracing::{debug, info, trace, warn};

const SOCKET_TOKEN: Token = Token(0);

/// Write `src` incremented bytewise into `dst`. Returns the length written.
pub fn echo_plus(src: &[u8], dst: &mut [u8]) -> usize {
    let n = src.len().min(dst.len());
    for (out, &b) in dst[..n].iter_mut().zip(src) {
        *out = b.wrapping_add(1);
    }
    n
}

/// UDP server answering each datagram with its echo-plus transform.
pub struct UdpEchoServer {
    poll: Poll,
    events: Events,
    socket: UdpSocket,
    notifier: Notifier<()>,
    input: Buffer,
    output: Buffer,
    /// Destination of the reply sitting in `output`.
    peer: Option<SocketAddr>,
    interest: Interest,
    echoed: u64,
}

impl UdpEchoServer {
    /// Bind to `addr`. Datagrams longer than `options.buffer_size` are
    /// truncated by the kernel.
    pub fn bind(addr: SocketAddr, options: &RuntimeOptions) -> io::Result<Self> {
        let poll = Poll::new()?;
        let notifier = Notifier::new(poll.registry())?;
        let mut socket = UdpSocket::bind(addr)?;
        poll.registry()
            .register(&mut socket, SOCKET_TOKEN, Interest::READABLE)?;

        Ok(Self {
            poll,
            events: Events::with_capacity(options.events_capacity),
            socket,
            notifier,
            input: Buffer::new(options.buffer_size),
            output: Buffer::new(options.buffer_size),
            peer: None,
            interest: Interest::READABLE,
            echoed: 0,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Handle for stopping the server from another thread.
    pub fn notifier(&self) -> Notifier<()> {
        self.notifier.clone()
    }

    pub fn echoed(&self) -> u64 {
        self.echoed
    }

    /// Serve until shut down through the notifier.
    pub fn run(&mut self) -> io::Result<()> {
        info!(addr = %self.local_addr()?, "UDP echo server started");

        loop {
            if self.notifier.is_shutdown() {
                info!(echoed = self.echoed, "UDP echo server stopped");
                return Ok(());
            }

            match self.poll.poll(&mut self.events, None) {
                Ok(()) => {}
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            let mut socket_ready = false;
            for event in self.events.iter() {
                if event.token() == SOCKET_TOKEN {
                    socket_ready = true;
                }
            }
            // Waker events carry nothing but the shutdown flag
            self.notifier.drain();

            if socket_ready {
                self.service()?;
            }
        }
    }

    /// Alternate between sending the pending reply and receiving the next
    /// datagram until the socket would block.
    fn service(&mut self) -> io::Result<()> {
        loop {
            if let Some(peer) = self.peer {
                match self.socket.send_to(self.output.pending(), peer) {
                    Ok(sent) => {
                        if sent < self.output.len() {
                            warn!(peer = %peer, sent, len = self.output.len(), "Short datagram send");
                        }
                        trace!(peer = %peer, len = sent, "Reply sent");
                        self.output.clear();
                        self.peer = None;
                        self.echoed += 1;
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                        return self.set_interest(Interest::WRITABLE);
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        // The datagram is lost; keep serving others
                        warn!(peer = %peer, error = %e, "Failed to send reply");
                        self.output.clear();
                        self.peer = None;
                    }
                }
            }

            self.input.clear();
            match self.socket.recv_from(self.input.spare_mut()) {
                Ok((n, peer)) => {
                    self.input.commit(n);
                    debug!(peer = %peer, len = n, "Received datagram");
                    let written = echo_plus(self.input.pending(), self.output.spare_mut());
                    self.output.commit(written);
                    self.peer = Some(peer);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return self.set_interest(Interest::READABLE);
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    // ICMP errors from earlier sends surface here
                    debug!(error = %e, "Receive error");
                }
            }
        }
    }

    fn set_interest(&mut self, interest: Interest) -> io::Result<()> {
        if self.interest != interest {
            self.poll
                .registry()
                .reregister(&mut self.socket, SOCKET_TOKEN, interest)?;
            self.interest = interest;
        }
        Ok(())
    }
}
