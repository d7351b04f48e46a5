//! Infrastructure layer for a RoveComm node.
//!
//! Contains OS-facing adapters: the UDP and TCP socket transports and the
//! TOML config file.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `rovecomm_core`, but MUST NOT be imported by the `application` layer.

pub mod network;
pub mod storage;
