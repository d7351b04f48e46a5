//! Reserved system data IDs.
//!
//! IDs 1–6 are handled by the protocol itself.  ID 0 is the "any" wildcard:
//! it selects every packet when registering a callback and is never sent.

/// Wildcard ID.  Never appears on the wire.
pub const ANY: u16 = 0;
/// Liveness probe; answered with [`PING_REPLY`].
pub const PING: u16 = 1;
pub const PING_REPLY: u16 = 2;
/// Ask the receiver to add the sender to its UDP fan-out set.
pub const SUBSCRIBE: u16 = 3;
/// Ask the receiver to remove the sender from its UDP fan-out set.
pub const UNSUBSCRIBE: u16 = 4;
/// Synthesised locally when a datagram carries an unknown protocol version.
pub const INVALID_VERSION: u16 = 5;
pub const NO_DATA: u16 = 6;

/// Returns `true` for IDs owned by the protocol rather than by a board.
pub fn is_system_id(data_id: u16) -> bool {
    data_id <= NO_DATA
}
