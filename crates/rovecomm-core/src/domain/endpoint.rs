//! IPv4 endpoint value type.
//!
//! RoveComm boards are addressed by IPv4 address and port only.  An
//! [`Endpoint`] is a plain `Copy` value: it is used as a map key by the
//! transports (subscriber sets, per-peer socket tables) and stamped onto
//! received packets as their source.

use std::cmp::Ordering;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;

use thiserror::Error;

/// Error type for endpoint parsing and conversion.
#[derive(Debug, Error, PartialEq)]
pub enum EndpointError {
    /// The text is not four dot-separated integers in 0–255 (plus a port,
    /// where one is expected).
    #[error("invalid endpoint format: {0:?}")]
    InvalidFormat(String),

    /// The socket address is not IPv4.
    #[error("unsupported address family: {0}")]
    UnsupportedFamily(SocketAddr),
}

/// IPv4 address plus port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    octets: [u8; 4],
    port: u16,
}

impl Endpoint {
    pub const fn new(octets: [u8; 4], port: u16) -> Self {
        Self { octets, port }
    }

    /// Builds an endpoint from four separate octets.
    pub const fn from_octets(a: u8, b: u8, c: u8, d: u8, port: u16) -> Self {
        Self::new([a, b, c, d], port)
    }

    /// Parses a dotted-quad address (`"192.168.2.103"`) and attaches `port`.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::InvalidFormat`] unless `address` is exactly
    /// four dot-separated decimal integers, each in 0–255.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rovecomm_core::Endpoint;
    ///
    /// let ep = Endpoint::parse("192.168.2.103", 11000).unwrap();
    /// assert_eq!(ep.address_string(), "192.168.2.103");
    /// assert!(Endpoint::parse("192.168.2", 11000).is_err());
    /// ```
    pub fn parse(address: &str, port: u16) -> Result<Self, EndpointError> {
        let invalid = || EndpointError::InvalidFormat(address.to_string());

        let mut octets = [0u8; 4];
        let mut parts = address.split('.');
        for slot in octets.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            // u8::from_str accepts a leading '+', which is not a dotted quad.
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            *slot = part.parse().map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self::new(octets, port))
    }

    pub fn octets(&self) -> [u8; 4] {
        self.octets
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns a copy of this endpoint with a different port.
    pub fn with_port(&self, port: u16) -> Self {
        Self::new(self.octets, port)
    }

    /// The address part only, `"a.b.c.d"`.
    pub fn address_string(&self) -> String {
        let [a, b, c, d] = self.octets;
        format!("{a}.{b}.{c}.{d}")
    }

    pub fn ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.octets)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.octets;
        write!(f, "{a}.{b}.{c}.{d}:{}", self.port)
    }
}

/// Ordered by port first, then by address.
impl Ord for Endpoint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.port
            .cmp(&other.port)
            .then_with(|| self.octets.cmp(&other.octets))
    }
}

impl PartialOrd for Endpoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Parses `"a.b.c.d:port"`.
impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, port) = s
            .rsplit_once(':')
            .ok_or_else(|| EndpointError::InvalidFormat(s.to_string()))?;
        let port: u16 = port
            .parse()
            .map_err(|_| EndpointError::InvalidFormat(s.to_string()))?;
        Self::parse(address, port)
    }
}

impl TryFrom<SocketAddr> for Endpoint {
    type Error = EndpointError;

    fn try_from(addr: SocketAddr) -> Result<Self, Self::Error> {
        match addr {
            SocketAddr::V4(v4) => Ok(Self::new(v4.ip().octets(), v4.port())),
            SocketAddr::V6(_) => Err(EndpointError::UnsupportedFamily(addr)),
        }
    }
}

impl From<Endpoint> for SocketAddr {
    fn from(ep: Endpoint) -> Self {
        SocketAddr::V4(SocketAddrV4::new(ep.ip(), ep.port))
    }
}
