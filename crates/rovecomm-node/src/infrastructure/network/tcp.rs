//! Connection-oriented RoveComm transport.
//!
//! One listening socket accepts peers that want our fan-out ("incoming"
//! peers).  Connections we open ourselves, to send to or subscribe at a
//! remote node, are "outgoing" peers.  Every peer gets its own
//! [`FrameAccumulator`], because TCP delivers a byte stream and packets may
//! arrive split across reads or several to a read.
//!
//! All sockets are non-blocking and registered with one `mio::Poll`.  `read`
//! polls with a zero timeout, so it never parks the dispatch thread.
//!
//! # Failure isolation
//!
//! A peer that disconnects, errors, or sends a malformed header is closed
//! and removed on its own.  The listener and all other peers carry on.
//!
//! # Outbound data
//!
//! Writes go through a per-peer outbound buffer.  Bytes the kernel does not
//! take immediately (a full send buffer, or a connect still in progress)
//! stay queued and are retried on every `read`, so a frame is either sent
//! whole or not started.

use std::collections::{BTreeSet, HashMap};
use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, Shutdown, SocketAddr, SocketAddrV4};
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use rovecomm_core::protocol::DEFAULT_TCP_BACKLOG;
use rovecomm_core::{encode_packet, Endpoint, FrameAccumulator, Packet};
use socket2::{Domain, Protocol as SockProtocol, Socket, Type};
use tracing::{debug, info, warn};

use crate::application::transport::{Protocol, Transport, TransportError};

const LISTENER: Token = Token(0);
const EVENT_CAPACITY: usize = 128;
const READ_CHUNK: usize = 16 * 1024;
/// A peer whose unsent bytes exceed this is not given more frames.
const MAX_OUTBOUND_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Incoming,
    Outgoing,
}

struct Peer {
    endpoint: Endpoint,
    direction: Direction,
    stream: TcpStream,
    inbox: FrameAccumulator,
    outbox: Vec<u8>,
}

struct Listening {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    port: u16,
}

enum Outcome {
    Keep,
    Disconnected,
    Failed(String),
}

pub struct TcpTransport {
    backlog: i32,
    listening: Option<Listening>,
    peers: HashMap<Token, Peer>,
    incoming: HashMap<Endpoint, Token>,
    outgoing: HashMap<Endpoint, Token>,
    /// Peers registered since the last `read`; drained once regardless of
    /// readiness events.
    unpolled: Vec<Token>,
    next_token: usize,
    connect_attempts: usize,
    read_buf: Vec<u8>,
}

impl TcpTransport {
    pub fn new(backlog: i32) -> Self {
        Self {
            backlog,
            listening: None,
            peers: HashMap::new(),
            incoming: HashMap::new(),
            outgoing: HashMap::new(),
            unpolled: Vec::new(),
            next_token: LISTENER.0 + 1,
            connect_attempts: 0,
            read_buf: vec![0u8; READ_CHUNK],
        }
    }

    /// Opens an outgoing connection to `endpoint` unless one already exists.
    ///
    /// The connect is non-blocking: it succeeds as soon as the attempt has
    /// started.  Frames queued before the handshake completes are sent once
    /// it does.
    ///
    /// # Errors
    ///
    /// [`TransportError::NotInitialized`] before `init`, or
    /// [`TransportError::ConnectFailed`] if the attempt cannot be started.
    pub fn connect(&mut self, endpoint: Endpoint) -> Result<(), TransportError> {
        self.connect_peer(endpoint).map(|_| ())
    }

    /// Number of connection attempts actually started.
    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts
    }

    pub fn is_connected(&self, endpoint: Endpoint) -> bool {
        self.outgoing.contains_key(&endpoint) || self.incoming.contains_key(&endpoint)
    }

    /// Endpoints of the peers that connected to us.
    pub fn incoming_peers(&self) -> Vec<Endpoint> {
        let mut peers: Vec<Endpoint> = self.incoming.keys().copied().collect();
        peers.sort();
        peers
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    fn connect_peer(&mut self, endpoint: Endpoint) -> Result<Token, TransportError> {
        if let Some(token) = self.outgoing.get(&endpoint) {
            return Ok(*token);
        }
        if self.listening.is_none() {
            return Err(TransportError::NotInitialized);
        }

        self.connect_attempts += 1;
        let connect_failed = |source| TransportError::ConnectFailed { endpoint, source };
        let stream = TcpStream::connect(SocketAddr::from(endpoint)).map_err(connect_failed)?;
        let token = self
            .register_peer(stream, endpoint, Direction::Outgoing)
            .map_err(connect_failed)?;
        debug!("tcp connect to {endpoint} started");
        Ok(token)
    }

    fn register_peer(
        &mut self,
        mut stream: TcpStream,
        endpoint: Endpoint,
        direction: Direction,
    ) -> io::Result<Token> {
        let listening = self
            .listening
            .as_ref()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;

        let token = Token(self.next_token);
        self.next_token += 1;
        listening.poll.registry().register(
            &mut stream,
            token,
            Interest::READABLE | Interest::WRITABLE,
        )?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("TCP_NODELAY not set for {endpoint}: {e}");
        }

        let previous = match direction {
            Direction::Incoming => self.incoming.insert(endpoint, token),
            Direction::Outgoing => self.outgoing.insert(endpoint, token),
        };
        if let Some(stale) = previous {
            self.peers.remove(&stale);
        }
        self.peers.insert(
            token,
            Peer {
                endpoint,
                direction,
                stream,
                inbox: FrameAccumulator::new(),
                outbox: Vec::new(),
            },
        );
        self.unpolled.push(token);
        Ok(token)
    }

    fn close_peer(&mut self, token: Token, how: Shutdown) {
        let Some(mut peer) = self.peers.remove(&token) else {
            return;
        };
        if let Some(listening) = self.listening.as_ref() {
            if let Err(e) = listening.poll.registry().deregister(&mut peer.stream) {
                debug!("deregistering {} failed: {e}", peer.endpoint);
            }
        }
        peer.stream.shutdown(how).ok();

        let map = match peer.direction {
            Direction::Incoming => &mut self.incoming,
            Direction::Outgoing => &mut self.outgoing,
        };
        if map.get(&peer.endpoint) == Some(&token) {
            map.remove(&peer.endpoint);
        }
    }

    /// Appends one whole frame to a peer's outbound buffer and flushes.
    fn queue_frame(&mut self, token: Token, frame: &[u8]) -> io::Result<()> {
        let peer = self
            .peers
            .get_mut(&token)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        if peer.outbox.len() + frame.len() > MAX_OUTBOUND_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("outbound buffer for {} is full", peer.endpoint),
            ));
        }

        peer.outbox.extend_from_slice(frame);
        if let Err(e) = flush_outbound(peer) {
            let endpoint = peer.endpoint;
            warn!("tcp write to {endpoint} failed, closing: {e}");
            self.close_peer(token, Shutdown::Both);
            return Err(e);
        }
        Ok(())
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_TCP_BACKLOG)
    }
}

impl Transport for TcpTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Tcp
    }

    fn init(&mut self, port: u16) -> Result<(), TransportError> {
        let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));

        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(SockProtocol::TCP))
            .map_err(bind_error(port))?;
        if let Err(e) = socket.set_reuse_address(true) {
            warn!("SO_REUSEADDR not set on tcp listener: {e}");
        }
        set_reuse_port(&socket);
        socket.set_nonblocking(true).map_err(bind_error(port))?;
        socket.bind(&addr.into()).map_err(bind_error(port))?;
        socket.listen(self.backlog).map_err(bind_error(port))?;

        let std_listener: std::net::TcpListener = socket.into();
        let bound_port = std_listener.local_addr().map_err(bind_error(port))?.port();
        let mut listener = TcpListener::from_std(std_listener);
        let poll = Poll::new().map_err(bind_error(port))?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .map_err(bind_error(port))?;

        if self.listening.is_some() {
            debug!("tcp transport re-initialized; closing previous listener");
            self.shutdown();
        }
        self.listening = Some(Listening {
            poll,
            events: Events::with_capacity(EVENT_CAPACITY),
            listener,
            port: bound_port,
        });
        info!("tcp transport listening on port {bound_port}");
        Ok(())
    }

    fn local_port(&self) -> Option<u16> {
        self.listening.as_ref().map(|l| l.port)
    }

    fn shutdown(&mut self) {
        if self.listening.is_none() {
            return;
        }
        let tokens: Vec<Token> = self.peers.keys().copied().collect();
        for token in tokens {
            self.close_peer(token, Shutdown::Write);
        }
        self.unpolled.clear();
        self.listening = None;
        info!("tcp transport shut down");
    }

    fn write(&mut self, packet: &Packet) -> usize {
        let frame = encode_packet(packet);
        let tokens: Vec<Token> = self.incoming.values().copied().collect();

        tokens
            .into_iter()
            .filter(|token| self.queue_frame(*token, &frame).is_ok())
            .count()
    }

    fn send_to(&mut self, packet: &Packet, endpoint: Endpoint) -> Result<usize, TransportError> {
        let token = match self.incoming.get(&endpoint) {
            Some(token) => *token,
            None => self.connect_peer(endpoint)?,
        };

        let frame = encode_packet(packet);
        self.queue_frame(token, &frame)
            .map(|()| frame.len())
            .map_err(|source| TransportError::Send { endpoint, source })
    }

    fn subscribe_to(&mut self, endpoint: Endpoint) -> Result<(), TransportError> {
        self.connect(endpoint)
    }

    /// Closes the outgoing connection to `endpoint`, which drops us from
    /// its incoming peers.  A no-op when there is none.
    fn unsubscribe_from(&mut self, endpoint: Endpoint) -> Result<(), TransportError> {
        if let Some(token) = self.outgoing.get(&endpoint).copied() {
            self.close_peer(token, Shutdown::Both);
            info!("tcp connection to {endpoint} closed");
        }
        Ok(())
    }

    fn accept_incoming(&mut self) -> usize {
        let Some(listening) = self.listening.as_ref() else {
            return 0;
        };

        let mut pending = Vec::new();
        loop {
            match listening.listener.accept() {
                Ok(pair) => pending.push(pair),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("tcp accept failed: {e}");
                    break;
                }
            }
        }

        let mut accepted = 0;
        for (stream, addr) in pending {
            let endpoint = match Endpoint::try_from(addr) {
                Ok(endpoint) => endpoint,
                Err(e) => {
                    warn!("closing tcp connection: {e}");
                    continue;
                }
            };
            match self.register_peer(stream, endpoint, Direction::Incoming) {
                Ok(_) => {
                    info!("tcp peer connected: {endpoint}");
                    accepted += 1;
                }
                Err(e) => warn!("could not register tcp peer {endpoint}: {e}"),
            }
        }
        accepted
    }

    fn read(&mut self) -> Vec<Packet> {
        let Some(listening) = self.listening.as_mut() else {
            return Vec::new();
        };

        if let Err(e) = listening
            .poll
            .poll(&mut listening.events, Some(Duration::ZERO))
        {
            if e.kind() != io::ErrorKind::Interrupted {
                warn!("tcp poll failed: {e}");
            }
        }

        let mut ready: BTreeSet<Token> = listening
            .events
            .iter()
            .map(|event| event.token())
            .filter(|token| *token != LISTENER)
            .collect();
        ready.extend(self.unpolled.drain(..));
        ready.extend(
            self.peers
                .iter()
                .filter(|(_, peer)| !peer.outbox.is_empty())
                .map(|(token, _)| *token),
        );

        let mut packets = Vec::new();
        for token in ready {
            let Some(peer) = self.peers.get_mut(&token) else {
                continue;
            };
            let endpoint = peer.endpoint;

            let outcome = match flush_outbound(peer) {
                Err(e) => Outcome::Failed(format!("write error: {e}")),
                Ok(()) => {
                    let inbound = drain_inbound(peer, &mut self.read_buf);
                    match take_frames(peer, &mut packets) {
                        Err(e) => Outcome::Failed(e),
                        Ok(()) => inbound,
                    }
                }
            };

            match outcome {
                Outcome::Keep => {}
                Outcome::Disconnected => {
                    info!("tcp peer disconnected: {endpoint}");
                    self.close_peer(token, Shutdown::Both);
                }
                Outcome::Failed(reason) => {
                    warn!("closing tcp peer {endpoint}: {reason}");
                    self.close_peer(token, Shutdown::Both);
                }
            }
        }
        packets
    }
}

// ── Per-peer I/O ──────────────────────────────────────────────────────────────

/// Reads until the socket would block.
fn drain_inbound(peer: &mut Peer, buf: &mut [u8]) -> Outcome {
    loop {
        match peer.stream.read(buf) {
            Ok(0) => return Outcome::Disconnected,
            Ok(n) => peer.inbox.push(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            // NotConnected: an outgoing connect is still in progress.
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::NotConnected
                ) =>
            {
                return Outcome::Keep
            }
            Err(e) => return Outcome::Failed(format!("read error: {e}")),
        }
    }
}

/// Moves every complete frame out of the peer's accumulator.
fn take_frames(peer: &mut Peer, packets: &mut Vec<Packet>) -> Result<(), String> {
    loop {
        match peer.inbox.next_frame() {
            Ok(Some(packet)) => packets.push(packet.with_source(peer.endpoint)),
            Ok(None) => return Ok(()),
            Err(e) => return Err(format!("framing error: {e}")),
        }
    }
}

/// Writes as much of the outbound buffer as the socket accepts.
fn flush_outbound(peer: &mut Peer) -> io::Result<()> {
    while !peer.outbox.is_empty() {
        match peer.stream.write(&peer.outbox) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
            Ok(n) => {
                peer.outbox.drain(..n);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::NotConnected
                ) =>
            {
                return Ok(())
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn bind_error(port: u16) -> impl Fn(io::Error) -> TransportError {
    move |source| TransportError::Bind { port, source }
}

#[cfg(all(
    unix,
    not(any(target_os = "solaris", target_os = "illumos", target_os = "cygwin"))
))]
fn set_reuse_port(socket: &Socket) {
    if let Err(e) = socket.set_reuse_port(true) {
        warn!("SO_REUSEPORT not set on tcp listener: {e}");
    }
}

#[cfg(not(all(
    unix,
    not(any(target_os = "solaris", target_os = "illumos", target_os = "cygwin"))
)))]
fn set_reuse_port(_socket: &Socket) {}
