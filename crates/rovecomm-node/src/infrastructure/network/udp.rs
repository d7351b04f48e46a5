//! Connectionless RoveComm transport.
//!
//! The node binds one non-blocking UDP socket on all interfaces.  Outbound
//! fan-out goes to a bounded subscriber set; peers join that set by sending
//! a subscribe packet (data ID 3) and leave it with an unsubscribe packet
//! (data ID 4).  Both system packets are still delivered to the runtime
//! after the subscriber set has been updated.
//!
//! # Why non-blocking? (for beginners)
//!
//! The dispatch loop polls UDP and TCP from one thread.  A blocking
//! `recv_from` would park that thread until a datagram arrived and starve
//! the TCP side.  In non-blocking mode `recv_from` returns `WouldBlock`
//! immediately when the socket is empty, so `read` drains whatever has
//! arrived and returns.

use std::collections::BTreeSet;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};

use rovecomm_core::protocol::{
    system, DEFAULT_MAX_SUBSCRIBERS, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
use rovecomm_core::{decode_packet, encode_packet, DecodeError, Endpoint, Packet};
use tracing::{debug, info, warn};

use crate::application::transport::{Protocol, Transport, TransportError};

/// Upper bound on datagrams consumed by one `read`, so a flood on UDP
/// cannot starve the TCP transport.
const MAX_DATAGRAMS_PER_READ: usize = 256;

pub struct UdpTransport {
    socket: Option<UdpSocket>,
    subscribers: BTreeSet<Endpoint>,
    max_subscribers: usize,
    recv_buf: Vec<u8>,
}

impl UdpTransport {
    pub fn new(max_subscribers: usize) -> Self {
        Self {
            socket: None,
            subscribers: BTreeSet::new(),
            max_subscribers,
            recv_buf: vec![0u8; HEADER_SIZE + MAX_PAYLOAD_SIZE],
        }
    }

    /// Adds `endpoint` to the fan-out set.
    ///
    /// Returns `Ok(false)` if it was already subscribed.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::SubscriberLimitReached`] when the set is full.
    pub fn subscribe(&mut self, endpoint: Endpoint) -> Result<bool, TransportError> {
        if self.subscribers.contains(&endpoint) {
            return Ok(false);
        }
        if self.subscribers.len() >= self.max_subscribers {
            return Err(TransportError::SubscriberLimitReached {
                max: self.max_subscribers,
            });
        }
        self.subscribers.insert(endpoint);
        info!("udp subscriber added: {endpoint}");
        Ok(true)
    }

    /// Removes `endpoint` from the fan-out set.  Returns `true` if it was there.
    pub fn unsubscribe(&mut self, endpoint: Endpoint) -> bool {
        let removed = self.subscribers.remove(&endpoint);
        if removed {
            info!("udp subscriber removed: {endpoint}");
        }
        removed
    }

    /// Current subscribers, in endpoint order.
    pub fn subscribers(&self) -> Vec<Endpoint> {
        self.subscribers.iter().copied().collect()
    }

    fn handle_system_packet(&mut self, packet: &Packet, source: Endpoint) {
        match packet.data_id() {
            system::SUBSCRIBE => match self.subscribe(source) {
                Ok(true) => {}
                Ok(false) => debug!("{source} is already subscribed"),
                Err(e) => warn!("rejecting subscription from {source}: {e}"),
            },
            system::UNSUBSCRIBE => {
                self.unsubscribe(source);
            }
            _ => {}
        }
    }

    fn decode_datagram(&mut self, len: usize, source: Endpoint) -> Option<Packet> {
        match decode_packet(&self.recv_buf[..len]) {
            Ok(packet) => {
                let packet = packet.with_source(source);
                self.handle_system_packet(&packet, source);
                Some(packet)
            }
            Err(DecodeError::UnsupportedVersion(version)) => {
                warn!("dropping datagram from {source}: protocol version {version}, expected 3");
                None
            }
            Err(e) => {
                warn!("dropping undecodable datagram from {source}: {e}");
                None
            }
        }
    }
}

impl Default for UdpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SUBSCRIBERS)
    }
}

impl Transport for UdpTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Udp
    }

    fn init(&mut self, port: u16) -> Result<(), TransportError> {
        let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
        let socket =
            UdpSocket::bind(addr).map_err(|source| TransportError::Bind { port, source })?;
        socket
            .set_nonblocking(true)
            .map_err(|source| TransportError::Bind { port, source })?;

        if self.socket.replace(socket).is_some() {
            debug!("udp transport re-initialized; previous socket closed");
        }
        info!("udp transport listening on {:?}", self.local_port());
        Ok(())
    }

    fn local_port(&self) -> Option<u16> {
        self.socket
            .as_ref()
            .and_then(|s| s.local_addr().ok())
            .map(|a| a.port())
    }

    fn shutdown(&mut self) {
        if self.socket.take().is_some() {
            self.subscribers.clear();
            info!("udp transport shut down");
        }
    }

    fn write(&mut self, packet: &Packet) -> usize {
        let Some(socket) = self.socket.as_ref() else {
            return 0;
        };

        let bytes = encode_packet(packet);
        let mut delivered = 0;
        for subscriber in &self.subscribers {
            match socket.send_to(&bytes, SocketAddr::from(*subscriber)) {
                Ok(_) => delivered += 1,
                Err(e) => warn!("udp send of {packet} to {subscriber} failed: {e}"),
            }
        }
        delivered
    }

    fn send_to(&mut self, packet: &Packet, endpoint: Endpoint) -> Result<usize, TransportError> {
        let socket = self.socket.as_ref().ok_or(TransportError::NotInitialized)?;
        socket
            .send_to(&encode_packet(packet), SocketAddr::from(endpoint))
            .map_err(|source| TransportError::Send { endpoint, source })
    }

    fn subscribe_to(&mut self, endpoint: Endpoint) -> Result<(), TransportError> {
        self.send_to(&Packet::empty(system::SUBSCRIBE), endpoint)?;
        debug!("sent udp subscribe request to {endpoint}");
        Ok(())
    }

    fn unsubscribe_from(&mut self, endpoint: Endpoint) -> Result<(), TransportError> {
        self.send_to(&Packet::empty(system::UNSUBSCRIBE), endpoint)?;
        debug!("sent udp unsubscribe request to {endpoint}");
        Ok(())
    }

    fn read(&mut self) -> Vec<Packet> {
        let mut packets = Vec::new();

        for _ in 0..MAX_DATAGRAMS_PER_READ {
            let Some(socket) = self.socket.as_ref() else {
                break;
            };
            let (len, addr) = match socket.recv_from(&mut self.recv_buf) {
                Ok(pair) => pair,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if is_transient(&e) => continue,
                Err(e) => {
                    warn!("udp recv error: {e}");
                    break;
                }
            };

            let source = match Endpoint::try_from(addr) {
                Ok(source) => source,
                Err(e) => {
                    debug!("ignoring datagram: {e}");
                    continue;
                }
            };

            if let Some(packet) = self.decode_datagram(len, source) {
                packets.push(packet);
            }
        }

        packets
    }
}

/// Errors after which the socket is still usable.  `ConnectionReset` is how
/// Windows reports an ICMP port-unreachable from an earlier send.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::ConnectionReset
    )
}
