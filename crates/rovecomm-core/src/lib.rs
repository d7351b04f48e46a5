//! # rovecomm-core
//!
//! Shared library for RoveComm nodes: the binary packet codec, TCP stream
//! framing, the IPv4 [`Endpoint`] value type, and the data-ID manifest.
//!
//! This crate has no dependencies on sockets or threads. The transports and
//! the dispatch runtime live in `rovecomm-node`.
//!
//! # Architecture overview (for beginners)
//!
//! RoveComm is a small application-layer protocol used by the boards of a
//! rover (drive, arm, science, power, …) to exchange typed records.  Every
//! record is one packet: a 6-byte header naming the data ID, the number of
//! elements and their numeric type, followed by the elements themselves.
//!
//! - **`protocol`** – How bytes travel over the network.  Typed slices are
//!   encoded into packets, packets are decoded back into typed vectors, and a
//!   frame accumulator cuts a TCP byte stream into whole packets.
//!
//! - **`domain`** – Value types with no I/O: the `Endpoint` (IPv4 + port)
//!   and the `Manifest`, the static table that says which element type and
//!   count belong to each data ID.

pub mod domain;
pub mod protocol;

pub use domain::endpoint::{Endpoint, EndpointError};
pub use domain::manifest::{Manifest, ManifestEntry, StaticManifest};
pub use protocol::codec::{
    build_packet, decode_packet, encode, encode_packet, size_of, DecodeError, EncodeError,
};
pub use protocol::framing::FrameAccumulator;
pub use protocol::packet::{Packet, PayloadError};
pub use protocol::types::{Element, ElementType};
