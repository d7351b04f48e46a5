//! RoveComm node binary.
//!
//! Binds the UDP and TCP transports, subscribes to the endpoints listed in
//! the config file (and on the command line), and logs every packet it
//! receives until Ctrl+C.
//!
//! # Usage
//!
//! ```text
//! rovecomm-node [OPTIONS]
//!
//! Options:
//!   --config <PATH>        Config file [default: rovecomm.toml]
//!   --udp-port <PORT>      Override [network].udp_port
//!   --tcp-port <PORT>      Override [network].tcp_port
//!   --subscribe <ENDPOINT> Peer UDP endpoint, a.b.c.d:port or a board name (repeatable);
//!                          TCP subscribes to the same address on --tcp-port
//!   --log-level <LEVEL>    Override [node].log_level
//! ```
//!
//! # Environment variables
//!
//! | Variable          | Equivalent flag |
//! |-------------------|-----------------|
//! | `ROVECOMM_CONFIG` | `--config`      |
//! | `ROVECOMM_UDP_PORT` | `--udp-port`  |
//! | `ROVECOMM_TCP_PORT` | `--tcp-port`  |
//! | `RUST_LOG`        | overrides `--log-level` entirely |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use rovecomm_core::protocol::system;
use rovecomm_core::Endpoint;
use rovecomm_node::application::transport::Protocols;
use rovecomm_node::infrastructure::network::build_server;
use rovecomm_node::infrastructure::storage::config::{
    load_config, NodeConfig, DEFAULT_CONFIG_FILE,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// RoveComm node.
///
/// Speaks the RoveComm protocol over UDP and TCP and logs the traffic it
/// receives.
#[derive(Debug, Parser)]
#[command(
    name = "rovecomm-node",
    about = "RoveComm UDP/TCP node with packet dispatch",
    version
)]
struct Cli {
    /// Path of the TOML config file.  A missing file means all defaults.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE, env = "ROVECOMM_CONFIG")]
    config: PathBuf,

    /// UDP port to bind, overriding the config file.
    #[arg(long, env = "ROVECOMM_UDP_PORT")]
    udp_port: Option<u16>,

    /// TCP port to listen on, overriding the config file.
    #[arg(long, env = "ROVECOMM_TCP_PORT")]
    tcp_port: Option<u16>,

    /// Peer to subscribe to at startup, as `a.b.c.d:port` or a board name.
    #[arg(long)]
    subscribe: Vec<String>,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Loads the config file and applies the command-line overrides.
    fn into_node_config(self) -> anyhow::Result<NodeConfig> {
        let mut config = load_config(&self.config)
            .with_context(|| format!("loading config from {}", self.config.display()))?;

        if let Some(port) = self.udp_port {
            config.network.udp_port = port;
        }
        if let Some(port) = self.tcp_port {
            config.network.tcp_port = port;
        }
        if let Some(level) = self.log_level {
            config.node.log_level = level;
        }
        config.subscribe.extend(self.subscribe);
        Ok(config)
    }
}

/// Where to subscribe for one `subscribe` entry.
///
/// Entries name the peer's UDP endpoint.  The TCP subscription goes to the
/// same address on the TCP port, which all nodes share through
/// `[network].tcp_port`.
fn subscription_targets(endpoint: Endpoint, tcp_port: u16) -> [(Endpoint, Protocols); 2] {
    [
        (endpoint, Protocols::UDP),
        (endpoint.with_port(tcp_port), Protocols::TCP),
    ]
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_node_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.node.log_level)),
        )
        .init();

    let subscriptions = config.subscriptions()?;
    let server = build_server(&config, Arc::new(config.manifest()));
    server.init().context("starting rovecomm runtime")?;

    info!(
        "RoveComm node starting: udp={:?}, tcp={:?}",
        server.udp_port(),
        server.tcp_port()
    );

    server.set_callback(system::ANY, |packet| {
        if system::is_system_id(packet.data_id()) {
            debug!("received {packet}");
        } else {
            info!("received {packet}");
        }
    });

    for &endpoint in &subscriptions {
        for (target, mask) in subscription_targets(endpoint, config.network.tcp_port) {
            if server.subscribe_to(target, mask) == 0 {
                warn!("subscription request to {target} ({mask:?}) was not sent");
            } else {
                info!("subscription request sent to {target} ({mask:?})");
            }
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("listening for Ctrl+C")?;
    info!("received Ctrl+C, shutting down");

    for &endpoint in &subscriptions {
        for (target, mask) in subscription_targets(endpoint, config.network.tcp_port) {
            server.unsubscribe_from(target, mask);
        }
    }
    server.shutdown();
    info!("RoveComm node stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
