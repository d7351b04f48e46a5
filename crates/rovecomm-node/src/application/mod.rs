//! Application layer of a RoveComm node.
//!
//! Everything here works against the [`transport::Transport`] trait and never
//! touches a socket directly, so it can be driven by the mock transport in
//! tests.
//!
//! # Sub-modules
//!
//! - **`transport`** – The trait both transports implement, the protocol
//!   selection mask, and the shared transport error type.
//!
//! - **`callbacks`** – The registry mapping data IDs (plus the "any"
//!   wildcard) to user callbacks.
//!
//! - **`dispatch`** – The [`dispatch::ServerManager`]: owns the two transports,
//!   runs the background poll loop, routes packets to callbacks or the
//!   pending queue, and exposes the thread-safe public API.

pub mod callbacks;
pub mod dispatch;
pub mod transport;
