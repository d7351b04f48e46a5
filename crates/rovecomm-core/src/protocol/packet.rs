//! The [`Packet`] type: one data ID plus a typed, fixed-count payload.
//!
//! The payload is stored in wire order (big-endian).  Conversion to host
//! values happens only in [`Packet::elements`], which checks the stored
//! element type against the requested Rust type first.

use std::fmt;

use thiserror::Error;

use crate::domain::endpoint::Endpoint;
use crate::protocol::codec::{DecodeError, EncodeError};
use crate::protocol::system;
use crate::protocol::types::{Element, ElementType};
use crate::protocol::MAX_PAYLOAD_SIZE;

/// Errors returned by the typed payload accessors.
#[derive(Debug, Error, PartialEq)]
pub enum PayloadError {
    /// The packet holds a different element type from the one requested.
    #[error("payload holds {stored:?} elements, cannot read them as {requested:?}")]
    TypeMismatch {
        stored: ElementType,
        requested: ElementType,
    },
}

/// One RoveComm packet.
///
/// Invariant: `payload.len() == element_count * element_type.width()`.
/// Every constructor enforces it, and the fields are private so it cannot be
/// broken afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    data_id: u16,
    element_type: ElementType,
    element_count: u16,
    payload: Vec<u8>,
    source: Option<Endpoint>,
}

impl Packet {
    /// Builds a packet from a slice of host values.
    ///
    /// # Errors
    ///
    /// - [`EncodeError::TypeMismatch`] if `T` cannot be stored as `element_type`.
    /// - [`EncodeError::SizeOverflow`] if the payload would exceed 65535 bytes.
    /// - [`EncodeError::WildcardDataId`] if `data_id` is the "any" wildcard.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rovecomm_core::{ElementType, Packet};
    ///
    /// let packet = Packet::new(2101, ElementType::Float32, &[48.2f32]).unwrap();
    /// assert_eq!(packet.element_count(), 1);
    /// assert_eq!(packet.elements::<f32>().unwrap(), vec![48.2]);
    /// ```
    pub fn new<T: Element>(
        data_id: u16,
        element_type: ElementType,
        elements: &[T],
    ) -> Result<Self, EncodeError> {
        if data_id == system::ANY {
            return Err(EncodeError::WildcardDataId);
        }
        if !T::accepts(element_type) {
            return Err(EncodeError::TypeMismatch {
                declared: element_type,
                host: T::KIND,
            });
        }

        let size = elements.len() * element_type.width();
        if size > MAX_PAYLOAD_SIZE {
            return Err(EncodeError::SizeOverflow {
                size,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let mut payload = Vec::with_capacity(size);
        for value in elements {
            value.write_be(&mut payload);
        }

        Ok(Self {
            data_id,
            element_type,
            // size <= 65535 and width >= 1, so the count fits in a u16.
            element_count: elements.len() as u16,
            payload,
            source: None,
        })
    }

    /// Builds a packet around payload bytes that are already in wire order.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::SizeOverflow`] if the shape exceeds the packet
    /// size limit, or [`DecodeError::LengthMismatch`] if `payload` does not
    /// hold exactly `element_count` elements of `element_type`.
    pub fn from_wire(
        data_id: u16,
        element_type: ElementType,
        element_count: u16,
        payload: Vec<u8>,
    ) -> Result<Self, DecodeError> {
        let declared = element_count as usize * element_type.width();
        if declared > MAX_PAYLOAD_SIZE {
            return Err(DecodeError::SizeOverflow {
                size: declared,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        if payload.len() != declared {
            return Err(DecodeError::LengthMismatch {
                declared,
                available: payload.len(),
            });
        }
        Ok(Self {
            data_id,
            element_type,
            element_count,
            payload,
            source: None,
        })
    }

    /// A zero-element packet, used for system requests such as subscribe.
    pub fn empty(data_id: u16) -> Self {
        Self {
            data_id,
            element_type: ElementType::UInt8,
            element_count: 0,
            payload: Vec::new(),
            source: None,
        }
    }

    /// Returns a copy of this packet stamped with the endpoint it came from.
    pub fn with_source(mut self, source: Endpoint) -> Self {
        self.source = Some(source);
        self
    }

    pub fn data_id(&self) -> u16 {
        self.data_id
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn element_count(&self) -> u16 {
        self.element_count
    }

    /// The raw payload bytes, big-endian.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The endpoint the packet was received from, if it came off a socket.
    pub fn source(&self) -> Option<Endpoint> {
        self.source
    }

    /// Size of the encoded packet (header + payload).
    pub fn wire_len(&self) -> usize {
        crate::protocol::HEADER_SIZE + self.payload.len()
    }

    /// Decodes the payload into host values.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::TypeMismatch`] if `T` does not match the
    /// packet's element type.
    pub fn elements<T: Element>(&self) -> Result<Vec<T>, PayloadError> {
        if !T::accepts(self.element_type) {
            return Err(PayloadError::TypeMismatch {
                stored: self.element_type,
                requested: T::KIND,
            });
        }
        Ok(self
            .payload
            .chunks_exact(self.element_type.width())
            .map(T::read_be)
            .collect())
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "packet(id={}, {}x{:?}",
            self.data_id, self.element_count, self.element_type
        )?;
        if let Some(src) = self.source {
            write!(f, ", from {src}")?;
        }
        write!(f, ")")
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
