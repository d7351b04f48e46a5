//! The transport abstraction shared by the UDP and TCP implementations.

use std::io;

use rovecomm_core::{Endpoint, Packet};
use thiserror::Error;

/// Error type for transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The operation needs a socket but `init` has not succeeded.
    #[error("transport is not initialized")]
    NotInitialized,

    /// The socket could not be bound or put into listening mode.
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    /// The subscriber set is full.
    #[error("subscriber limit of {max} reached")]
    SubscriberLimitReached { max: usize },

    /// An outbound TCP connection could not be started.
    #[error("failed to connect to {endpoint}: {source}")]
    ConnectFailed {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },

    /// A send failed at the socket level.
    #[error("send to {endpoint} failed: {source}")]
    Send {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },
}

/// Which transport a packet travelled over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Udp,
    Tcp,
}

/// A set of [`Protocol`]s used to select transports for an operation.
///
/// Bit values: `TCP = 1`, `UDP = 2`, `ALL = 3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Protocols(pub u8);

impl Protocols {
    pub const NONE: Protocols = Protocols(0);
    pub const TCP: Protocols = Protocols(0b01);
    pub const UDP: Protocols = Protocols(0b10);
    pub const ALL: Protocols = Protocols(0b11);

    pub fn contains(self, protocol: Protocol) -> bool {
        self.0 & Protocols::from(protocol).0 != 0
    }
}

impl From<Protocol> for Protocols {
    fn from(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Tcp => Protocols::TCP,
            Protocol::Udp => Protocols::UDP,
        }
    }
}

impl std::ops::BitOr for Protocols {
    type Output = Protocols;

    fn bitor(self, rhs: Self) -> Self::Output {
        Protocols(self.0 | rhs.0)
    }
}

/// One network transport owned by the dispatch runtime.
///
/// Every method is non-blocking: `read` returns whatever complete packets
/// are available right now, and never waits for more.
pub trait Transport: Send {
    fn protocol(&self) -> Protocol;

    /// Binds the transport to `port` on all interfaces.  Port 0 picks a free
    /// port; see [`Transport::local_port`].
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Bind`] if the port cannot be bound.  The
    /// transport stays uninitialized.
    fn init(&mut self, port: u16) -> Result<(), TransportError>;

    /// The port actually bound, once initialized.
    fn local_port(&self) -> Option<u16>;

    /// Closes every socket.  Calling it again is a no-op.
    fn shutdown(&mut self);

    /// Sends `packet` to every subscriber (UDP) or incoming peer (TCP).
    /// Returns how many destinations the send succeeded for.
    fn write(&mut self, packet: &Packet) -> usize;

    /// Sends `packet` to one endpoint and returns the number of bytes queued.
    ///
    /// UDP hands the datagram to the socket directly.  TCP may queue the
    /// frame behind a connect that is still in progress; if that connect
    /// later fails, the frame is dropped with the connection and logged.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the packet could not be handed to
    /// the socket or queued.
    fn send_to(&mut self, packet: &Packet, endpoint: Endpoint) -> Result<usize, TransportError>;

    /// Asks `endpoint` to include this node in its fan-out writes.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the request could not be sent.
    fn subscribe_to(&mut self, endpoint: Endpoint) -> Result<(), TransportError>;

    /// Undoes [`Transport::subscribe_to`]: asks `endpoint` to stop sending
    /// its fan-out here.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the request could not be sent.
    fn unsubscribe_from(&mut self, endpoint: Endpoint) -> Result<(), TransportError>;

    /// Collects every packet that is complete right now, each stamped with
    /// its source endpoint.
    fn read(&mut self) -> Vec<Packet>;

    /// Accepts pending inbound connections.  Returns how many were accepted.
    /// Connectionless transports accept nothing.
    fn accept_incoming(&mut self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_mask_bits() {
        assert_eq!(Protocols::TCP.0, 1);
        assert_eq!(Protocols::UDP.0, 2);
        assert_eq!(Protocols::TCP | Protocols::UDP, Protocols::ALL);
    }

    #[test]
    fn test_mask_contains() {
        assert!(Protocols::ALL.contains(Protocol::Udp));
        assert!(Protocols::ALL.contains(Protocol::Tcp));
        assert!(Protocols::UDP.contains(Protocol::Udp));
        assert!(!Protocols::UDP.contains(Protocol::Tcp));
        assert!(!Protocols::NONE.contains(Protocol::Tcp));
    }
}
