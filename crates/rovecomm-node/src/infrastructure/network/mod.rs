//! Network infrastructure for a RoveComm node.
//!
//! # Sub-modules
//!
//! - **`udp`** – Connectionless transport: one bound socket, a bounded
//!   subscriber set for fan-out, subscribe/unsubscribe handling.
//!
//! - **`tcp`** – Connection-oriented transport: listener, per-peer sockets
//!   polled through `mio`, and stream reassembly into packets.
//!
//! - **`mock`** – In-memory transport for tests of the dispatch runtime.

pub mod mock;
pub mod tcp;
pub mod udp;

use std::sync::Arc;

use rovecomm_core::Manifest;

use crate::application::dispatch::ServerManager;
use crate::infrastructure::storage::config::NodeConfig;

pub use tcp::TcpTransport;
pub use udp::UdpTransport;

/// Builds a runtime over real sockets, configured from `config`.
///
/// Nothing is bound until [`ServerManager::init`] is called.
pub fn build_server(config: &NodeConfig, manifest: Arc<dyn Manifest>) -> ServerManager {
    let network = &config.network;
    ServerManager::new(
        Box::new(UdpTransport::new(network.max_subscribers)),
        Box::new(TcpTransport::new(network.tcp_backlog)),
        manifest,
        config.runtime_settings(),
    )
}
