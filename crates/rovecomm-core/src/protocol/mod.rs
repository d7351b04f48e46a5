//! Protocol module: element types, packets, the binary codec, and TCP framing.

pub mod codec;
pub mod framing;
pub mod packet;
pub mod system;
pub mod types;

pub use codec::{
    build_packet, decode_packet, encode, encode_packet, size_of, DecodeError, EncodeError,
    WireHeader,
};
pub use framing::FrameAccumulator;
pub use packet::{Packet, PayloadError};
pub use types::{Element, ElementType};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Protocol version byte carried in every header.
pub const PROTOCOL_VERSION: u8 = 3;

/// Size of the packet header in bytes.
pub const HEADER_SIZE: usize = 6;

/// Largest payload (count × element width) a single packet may carry.
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Default UDP port for RoveComm traffic.
pub const DEFAULT_UDP_PORT: u16 = 11000;

/// Default TCP port for RoveComm traffic.
pub const DEFAULT_TCP_PORT: u16 = 12000;

/// Pending-connection backlog for the TCP listener.
pub const DEFAULT_TCP_BACKLOG: i32 = 5;

/// Maximum number of UDP subscribers a node fans out to.
pub const DEFAULT_MAX_SUBSCRIBERS: usize = 10;
