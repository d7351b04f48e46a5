//! Binary codec for RoveComm packets.
//!
//! Wire format:
//! ```text
//! [version:1][data_id:2][element_count:2][element_type:1][payload:N]
//! ```
//! Total header size: 6 bytes. All multi-byte integers are big-endian and
//! `N = element_count × width(element_type)`.
//!
//! Decoding copies the payload verbatim.  Byte-order conversion into host
//! values is done by [`Packet::elements`], so the TCP framing layer only
//! needs the header to know where a frame ends.

use thiserror::Error;

use crate::domain::manifest::Manifest;
use crate::protocol::packet::Packet;
use crate::protocol::types::{Element, ElementType};
use crate::protocol::{HEADER_SIZE, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION};

/// Errors that can occur while encoding a packet.
#[derive(Debug, Error, PartialEq)]
pub enum EncodeError {
    /// The host element type cannot be written as the declared element type.
    #[error("cannot write {host:?} values as {declared:?} elements")]
    TypeMismatch {
        declared: ElementType,
        host: ElementType,
    },

    /// The payload would exceed the 16-bit length limit.
    #[error("payload of {size} bytes exceeds the {max} byte limit")]
    SizeOverflow { size: usize, max: usize },

    /// The manifest declares a different element count for this data ID.
    #[error("data id {data_id} carries {expected} elements per the manifest, got {actual}")]
    CountMismatch {
        data_id: u16,
        expected: u16,
        actual: usize,
    },

    /// The manifest declares a different element type for this data ID.
    #[error("data id {data_id} carries {expected:?} elements per the manifest, got {actual:?}")]
    ManifestTypeMismatch {
        data_id: u16,
        expected: ElementType,
        actual: ElementType,
    },

    /// Data ID 0 selects every packet and is never sent.
    #[error("data id 0 is the wildcard and cannot be sent")]
    WildcardDataId,
}

/// Errors that can occur while decoding a packet.
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    /// The byte slice is shorter than a header.
    #[error("truncated packet: need at least {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },

    /// The header's element count does not match the payload length.
    #[error("payload length mismatch: header declares {declared} bytes, {available} present")]
    LengthMismatch { declared: usize, available: usize },

    /// The element type code is not one of the nine known codes.
    #[error("unknown element type code: {0}")]
    UnknownType(u8),

    /// The header carries a protocol version other than 3.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// The header announces a payload larger than a packet may carry.
    #[error("announced payload of {size} bytes exceeds the {max} byte limit")]
    SizeOverflow { size: usize, max: usize },
}

// ── Header ────────────────────────────────────────────────────────────────────

/// The fixed 6-byte header that precedes every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireHeader {
    pub data_id: u16,
    pub element_count: u16,
    pub element_type: ElementType,
}

impl WireHeader {
    /// Parses the header at the start of `bytes`.
    ///
    /// Only the first [`HEADER_SIZE`] bytes are inspected; anything after
    /// them is ignored.
    ///
    /// # Errors
    ///
    /// [`DecodeError::Truncated`], [`DecodeError::UnsupportedVersion`],
    /// [`DecodeError::UnknownType`] or [`DecodeError::SizeOverflow`].
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        require_len(bytes, HEADER_SIZE)?;

        let version = bytes[0];
        if version != PROTOCOL_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }

        let header = Self {
            data_id: u16::from_be_bytes([bytes[1], bytes[2]]),
            element_count: u16::from_be_bytes([bytes[3], bytes[4]]),
            element_type: ElementType::try_from(bytes[5])?,
        };
        if header.payload_len() > MAX_PAYLOAD_SIZE {
            return Err(DecodeError::SizeOverflow {
                size: header.payload_len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(header)
    }

    /// Payload length announced by this header.
    pub fn payload_len(&self) -> usize {
        self.element_count as usize * self.element_type.width()
    }

    /// Total frame length: header plus payload.
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.payload_len()
    }

    fn write_to(&self, buf: &mut Vec<u8>) {
        buf.push(PROTOCOL_VERSION);
        buf.extend_from_slice(&self.data_id.to_be_bytes());
        buf.extend_from_slice(&self.element_count.to_be_bytes());
        buf.push(self.element_type.code());
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a packet into header + payload bytes.
///
/// The packet's invariants were checked when it was built, so this cannot
/// fail.
pub fn encode_packet(packet: &Packet) -> Vec<u8> {
    let header = WireHeader {
        data_id: packet.data_id(),
        element_count: packet.element_count(),
        element_type: packet.element_type(),
    };

    let mut buf = Vec::with_capacity(packet.wire_len());
    header.write_to(&mut buf);
    buf.extend_from_slice(packet.payload());
    buf
}

/// Builds a packet from typed values, checking them against `manifest`.
///
/// When the manifest knows `data_id`, the declared element type and count
/// must match.  Unknown IDs are trusted as given.
///
/// # Errors
///
/// Any [`EncodeError`] variant.
pub fn build_packet<T: Element>(
    data_id: u16,
    element_type: ElementType,
    elements: &[T],
    manifest: &dyn Manifest,
) -> Result<Packet, EncodeError> {
    if let Some(entry) = manifest.lookup(data_id) {
        if entry.element_type != element_type {
            return Err(EncodeError::ManifestTypeMismatch {
                data_id,
                expected: entry.element_type,
                actual: element_type,
            });
        }
        if entry.element_count as usize != elements.len() {
            return Err(EncodeError::CountMismatch {
                data_id,
                expected: entry.element_count,
                actual: elements.len(),
            });
        }
    }

    Packet::new(data_id, element_type, elements)
}

/// Encodes typed values under `data_id` into wire bytes.
///
/// Same checks as [`build_packet`].
///
/// # Errors
///
/// Any [`EncodeError`] variant.
///
/// # Examples
///
/// ```rust
/// use rovecomm_core::{encode, ElementType, StaticManifest};
///
/// let manifest = StaticManifest::builtin();
/// let bytes = encode(2000, ElementType::UInt8, &[1u8], &manifest).unwrap();
/// assert_eq!(bytes, vec![3, 0x07, 0xD0, 0x00, 0x01, 0x01, 0x01]);
/// ```
pub fn encode<T: Element>(
    data_id: u16,
    element_type: ElementType,
    elements: &[T],
    manifest: &dyn Manifest,
) -> Result<Vec<u8>, EncodeError> {
    build_packet(data_id, element_type, elements, manifest).map(|p| encode_packet(&p))
}

/// Decodes exactly one packet from `bytes`.
///
/// The slice must hold the whole frame and nothing more; use
/// [`crate::protocol::FrameAccumulator`] to cut frames out of a stream.
///
/// # Errors
///
/// Any [`DecodeError`] variant.
///
/// # Examples
///
/// ```rust
/// use rovecomm_core::{decode_packet, ElementType};
///
/// let packet = decode_packet(&[3, 0x04, 0x4C, 0x00, 0x01, 0x01, 0x01]).unwrap();
/// assert_eq!(packet.data_id(), 1100);
/// assert_eq!(packet.element_type(), ElementType::UInt8);
/// assert_eq!(packet.elements::<u8>().unwrap(), vec![1]);
/// ```
pub fn decode_packet(bytes: &[u8]) -> Result<Packet, DecodeError> {
    let header = WireHeader::parse(bytes)?;
    let body = &bytes[HEADER_SIZE..];

    if body.len() != header.payload_len() {
        return Err(DecodeError::LengthMismatch {
            declared: header.payload_len(),
            available: body.len(),
        });
    }

    Packet::from_wire(
        header.data_id,
        header.element_type,
        header.element_count,
        body.to_vec(),
    )
}

/// Width in bytes of the element type with header code `code`.
///
/// # Errors
///
/// Returns [`DecodeError::UnknownType`] for codes outside 0–8.
pub fn size_of(code: u8) -> Result<usize, DecodeError> {
    ElementType::try_from(code).map(ElementType::width)
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn require_len(bytes: &[u8], needed: usize) -> Result<(), DecodeError> {
    if bytes.len() < needed {
        Err(DecodeError::Truncated {
            needed,
            available: bytes.len(),
        })
    } else {
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
