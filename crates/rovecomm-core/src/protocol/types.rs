//! Element types carried in a packet payload.
//!
//! Every packet holds a homogeneous array of one [`ElementType`].  The type
//! code travels in the last header byte; the width tells the codec how many
//! bytes each element occupies.  Multi-byte values are big-endian on the
//! wire, floats included (their IEEE-754 bit pattern is written in network
//! order like any other 32/64-bit value).

use serde::{Deserialize, Serialize};

use crate::protocol::codec::DecodeError;

/// Numeric type of the elements in a packet payload.
///
/// The serde names match the type names used in manifest files
/// (`"UINT8_T"`, `"FLOAT_T"`, …).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ElementType {
    #[serde(rename = "INT8_T")]
    Int8 = 0,
    #[serde(rename = "UINT8_T")]
    UInt8 = 1,
    #[serde(rename = "INT16_T")]
    Int16 = 2,
    #[serde(rename = "UINT16_T")]
    UInt16 = 3,
    #[serde(rename = "INT32_T")]
    Int32 = 4,
    #[serde(rename = "UINT32_T")]
    UInt32 = 5,
    #[serde(rename = "FLOAT_T")]
    Float32 = 6,
    #[serde(rename = "DOUBLE_T")]
    Float64 = 7,
    #[serde(rename = "CHAR")]
    Char = 8,
}

impl ElementType {
    /// Every element type, in type-code order.
    pub const ALL: [ElementType; 9] = [
        ElementType::Int8,
        ElementType::UInt8,
        ElementType::Int16,
        ElementType::UInt16,
        ElementType::Int32,
        ElementType::UInt32,
        ElementType::Float32,
        ElementType::Float64,
        ElementType::Char,
    ];

    /// Width of one element on the wire, in bytes.
    pub const fn width(self) -> usize {
        match self {
            ElementType::Int8 | ElementType::UInt8 | ElementType::Char => 1,
            ElementType::Int16 | ElementType::UInt16 => 2,
            ElementType::Int32 | ElementType::UInt32 | ElementType::Float32 => 4,
            ElementType::Float64 => 8,
        }
    }

    /// The type code written into the header.
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ElementType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ElementType::Int8),
            1 => Ok(ElementType::UInt8),
            2 => Ok(ElementType::Int16),
            3 => Ok(ElementType::UInt16),
            4 => Ok(ElementType::Int32),
            5 => Ok(ElementType::UInt32),
            6 => Ok(ElementType::Float32),
            7 => Ok(ElementType::Float64),
            8 => Ok(ElementType::Char),
            other => Err(DecodeError::UnknownType(other)),
        }
    }
}

// ── Host element types ────────────────────────────────────────────────────────

/// A Rust value that can be stored as a packet element.
///
/// Implemented for `i8`, `u8`, `i16`, `u16`, `i32`, `u32`, `f32` and `f64`.
/// `u8` also carries [`ElementType::Char`] payloads.
pub trait Element: Copy + Send + Sync + 'static {
    /// The element type this host type maps to by default.
    const KIND: ElementType;

    /// Returns `true` if values of this type may be stored as `ty`.
    fn accepts(ty: ElementType) -> bool {
        ty == Self::KIND
    }

    /// Appends the big-endian bytes of `self` to `out`.
    fn write_be(self, out: &mut Vec<u8>);

    /// Reads one value from exactly `Self::KIND.width()` big-endian bytes.
    fn read_be(bytes: &[u8]) -> Self;
}

macro_rules! impl_element {
    ($ty:ty, $kind:expr, $width:expr) => {
        impl Element for $ty {
            const KIND: ElementType = $kind;

            fn write_be(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_be_bytes());
            }

            fn read_be(bytes: &[u8]) -> Self {
                let mut raw = [0u8; $width];
                raw.copy_from_slice(bytes);
                <$ty>::from_be_bytes(raw)
            }
        }
    };
}

impl_element!(i8, ElementType::Int8, 1);
impl_element!(i16, ElementType::Int16, 2);
impl_element!(u16, ElementType::UInt16, 2);
impl_element!(i32, ElementType::Int32, 4);
impl_element!(u32, ElementType::UInt32, 4);
impl_element!(f32, ElementType::Float32, 4);
impl_element!(f64, ElementType::Float64, 8);

impl Element for u8 {
    const KIND: ElementType = ElementType::UInt8;

    fn accepts(ty: ElementType) -> bool {
        matches!(ty, ElementType::UInt8 | ElementType::Char)
    }

    fn write_be(self, out: &mut Vec<u8>) {
        out.push(self);
    }

    fn read_be(bytes: &[u8]) -> Self {
        bytes[0]
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
