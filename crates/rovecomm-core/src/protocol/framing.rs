//! Reassembly of RoveComm packets from a TCP byte stream.
//!
//! TCP delivers bytes, not packets: one `recv` may return half a header, or
//! the tail of one packet followed by the start of the next.  A
//! [`FrameAccumulator`] keeps whatever has arrived for one peer and hands out
//! whole packets as soon as their last byte is present.
//!
//! # States
//!
//! - Fewer than 6 bytes buffered: waiting for a header.
//! - 6 or more bytes: the header is parsed and gives the total frame length.
//!   Once that many bytes are buffered, exactly one frame is split off and
//!   decoded; the remainder stays for the next frame.

use tracing::trace;

use crate::protocol::codec::{decode_packet, DecodeError, WireHeader};
use crate::protocol::packet::Packet;
use crate::protocol::HEADER_SIZE;

/// Per-peer inbound buffer.
#[derive(Debug, Default)]
pub struct FrameAccumulator {
    buf: Vec<u8>,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends freshly received bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Splits off and decodes the next complete frame, if one is buffered.
    ///
    /// Returns `Ok(None)` while the frame is still incomplete; partial data
    /// is never discarded.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] when the buffered header is malformed
    /// (unknown type code, wrong version, or a payload over the size limit).  The stream cannot be
    /// resynchronised after that, so the caller should drop the peer.
    pub fn next_frame(&mut self) -> Result<Option<Packet>, DecodeError> {
        if self.buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        let header = WireHeader::parse(&self.buf[..HEADER_SIZE])?;
        let total = header.frame_len();
        if self.buf.len() < total {
            return Ok(None);
        }

        let frame: Vec<u8> = self.buf.drain(..total).collect();
        trace!(
            "frame for data id {} complete ({total} bytes, {} left buffered)",
            header.data_id,
            self.buf.len()
        );
        decode_packet(&frame).map(Some)
    }

    /// Drains every complete frame currently buffered, in arrival order.
    ///
    /// # Errors
    ///
    /// Stops at the first malformed header; packets decoded before it are
    /// lost with the error, matching the "drop the peer" policy.
    pub fn drain_frames(&mut self) -> Result<Vec<Packet>, DecodeError> {
        let mut packets = Vec::new();
        while let Some(packet) = self.next_frame()? {
            packets.push(packet);
        }
        Ok(packets)
    }

    /// Number of bytes waiting for the rest of their frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
