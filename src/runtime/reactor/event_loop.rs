//! mio event loop implementation.
//!
//! Readiness-based model: poll tells us when sockets are ready, then the
//! owning `Connection` performs non-blocking reads and writes.
//! Uses epoll on Linux, kqueue on macOS.
//!
//! Per ready token the loop services connect completion first, then
//! write readiness, then read readiness, so a connection that has drained
//! its output can be torn down before new input is looked at. Callback
//! errors never leave the loop: they close the offending connection and
//! serving continues for everyone else.

use crate::runtime::connection::{ConnState, Connection, ConnectionRegistry};
use crate::runtime::protocol::{ConnectionId, Outbox, Protocol};
use crate::runtime::reactor::Notifier;
use crate::runtime::token::{connection_token, Source, LISTENER_TOKEN};
use crate::runtime::RuntimeOptions;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll};
use std::io;
use std::net::SocketAddr;
use tracing::{debug, error, info, trace, warn};

/// Readiness flags copied out of a mio event.
#[derive(Debug, Clone, Copy)]
struct Ready {
    token: mio::Token,
    readable: bool,
    writable: bool,
    error: bool,
}

impl Ready {
    fn from_event(event: &mio::event::Event) -> Self {
        Self {
            token: event.token(),
            readable: event.is_readable() || event.is_read_closed(),
            writable: event.is_writable() || event.is_write_closed(),
            error: event.is_error(),
        }
    }
}

/// Single-threaded reactor serving one protocol.
pub struct Reactor<P: Protocol> {
    poll: Poll,
    events: Events,
    ready: Vec<Ready>,
    listener: Option<TcpListener>,
    connections: ConnectionRegistry<Connection<TcpStream, P>>,
    protocol: P,
    outbox: Outbox<P::Outbound>,
    notifier: Notifier<P::Outbound>,
    buffer_size: usize,
    /// Why the outgoing connect failed, reported by `run`.
    connect_error: Option<io::Error>,
}

impl<P: Protocol> Reactor<P>
where
    P::Outbound: Clone,
{
    fn with_poll(poll: Poll, protocol: P, options: &RuntimeOptions) -> io::Result<Self> {
        let notifier = Notifier::new(poll.registry())?;
        Ok(Self {
            poll,
            events: Events::with_capacity(options.events_capacity),
            ready: Vec::with_capacity(options.events_capacity),
            listener: None,
            connections: ConnectionRegistry::new(options.max_connections),
            protocol,
            outbox: Outbox::new(),
            notifier,
            buffer_size: options.buffer_size,
            connect_error: None,
        })
    }

    /// Listen on `addr` and serve every accepted connection.
    pub fn bind(addr: SocketAddr, protocol: P, options: &RuntimeOptions) -> io::Result<Self> {
        let poll = Poll::new()?;
        let mut reactor = Self::with_poll(poll, protocol, options)?;

        let mut listener = TcpListener::from_std(create_listener(addr)?);
        reactor
            .poll
            .registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
        reactor.listener = Some(listener);
        Ok(reactor)
    }

    /// Start a non-blocking connect to `addr`. `run` returns once that
    /// connection has been torn down.
    pub fn connect(addr: SocketAddr, protocol: P, options: &RuntimeOptions) -> io::Result<Self> {
        let poll = Poll::new()?;
        let mut reactor = Self::with_poll(poll, protocol, options)?;

        let stream = TcpStream::connect(addr)?;
        let decoder = reactor.protocol.decoder();
        let conn = Connection::connecting(stream, reactor.buffer_size, decoder);
        let id = reactor
            .connections
            .insert(conn)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "connection limit is zero"))?;
        if let Some(conn) = reactor.connections.get_mut(id) {
            conn.sync_registration(reactor.poll.registry(), connection_token(id))?;
        }
        debug!(conn_id = id, addr = %addr, "Connecting");
        Ok(reactor)
    }

    /// Address of the listening socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match &self.listener {
            Some(listener) => listener.local_addr(),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "reactor has no listener",
            )),
        }
    }

    /// Handle for feeding messages in from other threads.
    ///
    /// Every item sent is enqueued on every live connection.
    pub fn notifier(&self) -> Notifier<P::Outbound> {
        self.notifier.clone()
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Run until shut down through the notifier, or, for a client, until
    /// its connection is gone.
    pub fn run(&mut self) -> io::Result<()> {
        info!(
            listening = self.listener.is_some(),
            buffer_size = self.buffer_size,
            "Event loop started"
        );

        loop {
            if self.notifier.is_shutdown() {
                self.close_all();
                info!("Event loop stopped");
                return Ok(());
            }
            if self.listener.is_none() && self.connections.is_empty() {
                if let Some(e) = self.connect_error.take() {
                    return Err(e);
                }
                info!("Connection finished, event loop stopped");
                return Ok(());
            }

            match self.poll.poll(&mut self.events, None) {
                Ok(()) => {}
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            let mut ready = std::mem::take(&mut self.ready);
            ready.extend(self.events.iter().map(Ready::from_event));
            for event in ready.drain(..) {
                self.dispatch(event);
                self.flush_broadcasts();
            }
            self.ready = ready;
        }
    }

    fn dispatch(&mut self, event: Ready) {
        match Source::from_token(event.token) {
            Source::Listener => self.accept_connections(),
            Source::Waker => self.drain_notifier(),
            Source::Connection(id) => {
                if let Err(e) = self.handle_connection_event(id, event) {
                    debug!(conn_id = id, error = %e, "Connection error");
                    self.close_connection(id);
                }
            }
        }
    }

    fn accept_connections(&mut self) {
        let Some(listener) = self.listener.as_ref() else {
            return;
        };

        loop {
            match listener.accept() {
                Ok((stream, peer)) => {
                    if self.connections.is_full() {
                        warn!(peer = %peer, "Connection limit reached");
                        continue;
                    }
                    let _ = stream.set_nodelay(true);

                    let conn = Connection::new(stream, self.buffer_size, self.protocol.decoder());
                    let Some(id) = self.connections.insert(conn) else {
                        continue;
                    };
                    let registered = match self.connections.get_mut(id) {
                        Some(conn) => {
                            conn.sync_registration(self.poll.registry(), connection_token(id))
                        }
                        None => Ok(()),
                    };
                    if let Err(e) = registered {
                        warn!(conn_id = id, error = %e, "Failed to register connection");
                        self.connections.remove(id);
                        continue;
                    }

                    self.protocol.on_open(id, peer);
                    debug!(conn_id = id, peer = %peer, "Accepted connection");
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(error = %e, "Accept error");
                    break;
                }
            }
        }
    }

    fn handle_connection_event(&mut self, id: ConnectionId, event: Ready) -> io::Result<()> {
        // Stale event for a connection that is already gone
        let Some(conn) = self.connections.get_mut(id) else {
            return Ok(());
        };

        if conn.state() == ConnState::Connecting {
            if !(event.writable || event.error) {
                return Ok(());
            }
            let peer = match finish_connect(conn.stream()) {
                Ok(Some(peer)) => peer,
                Ok(None) => return Ok(()),
                Err(e) => {
                    self.connect_error = Some(io::Error::new(e.kind(), e.to_string()));
                    return Err(e);
                }
            };
            conn.on_connected();
            self.protocol.on_open(id, peer);
            info!(conn_id = id, peer = %peer, "Connected");
        }

        if event.writable || event.error {
            conn.on_writable(id, &mut self.protocol, &mut self.outbox)?;
        }
        if event.readable || event.error {
            conn.on_readable(id, &mut self.protocol, &mut self.outbox)?;
        }

        self.settle(id)
    }

    /// Apply the connection's desired interest, tearing it down when there
    /// is nothing left to do.
    fn settle(&mut self, id: ConnectionId) -> io::Result<()> {
        let Some(conn) = self.connections.get_mut(id) else {
            return Ok(());
        };
        if conn.interest().is_none() {
            trace!(conn_id = id, "Nothing left to do");
            self.close_connection(id);
            return Ok(());
        }
        conn.sync_registration(self.poll.registry(), connection_token(id))
    }

    fn drain_notifier(&mut self) {
        for msg in self.notifier.drain() {
            self.deliver_to_all(msg);
        }
    }

    fn flush_broadcasts(&mut self) {
        while self.outbox.has_broadcasts() {
            for msg in self.outbox.take_broadcasts() {
                self.deliver_to_all(msg);
            }
        }
    }

    fn deliver_to_all(&mut self, msg: P::Outbound) {
        for id in self.connections.ids() {
            let Some(conn) = self.connections.get_mut(id) else {
                continue;
            };
            let result = match conn.enqueue(msg.clone(), id, &mut self.protocol, &mut self.outbox) {
                Ok(()) => self.settle(id),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                debug!(conn_id = id, error = %e, "Connection error");
                self.close_connection(id);
            }
        }
    }

    fn close_connection(&mut self, id: ConnectionId) {
        if let Some(mut conn) = self.connections.remove(id) {
            conn.deregister(self.poll.registry());
            if conn.close() {
                self.protocol.on_close(id);
                debug!(conn_id = id, "Connection closed");
            }
        }
    }

    fn close_all(&mut self) {
        for id in self.connections.ids() {
            self.close_connection(id);
        }
    }
}

/// Complete a non-blocking connect. `Ok(None)` means still in progress.
fn finish_connect(stream: &TcpStream) -> io::Result<Option<SocketAddr>> {
    if let Some(e) = stream.take_error()? {
        return Err(e);
    }
    match stream.peer_addr() {
        Ok(peer) => Ok(Some(peer)),
        Err(ref e) if e.kind() == io::ErrorKind::NotConnected => Ok(None),
        Err(e) => Err(e),
    }
}

/// Create a non-blocking TCP listener with SO_REUSEADDR.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    Ok(socket.into())
}
