//! TOML-based configuration for a RoveComm node.
//!
//! Example:
//!
//! ```toml
//! subscribe = ["192.168.2.100:11000", "Drive"]
//!
//! [node]
//! log_level = "debug"
//!
//! [network]
//! udp_port = 11000
//! tcp_port = 12000
//! max_subscribers = 10
//!
//! [[manifest]]
//! data_id = 4000
//! element_count = 2
//! element_type = "UINT16_T"
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent from the TOML file, so an empty
//! file (or no file at all) yields the standard RoveComm ports and limits.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rovecomm_core::domain::manifest::board;
use rovecomm_core::protocol::{
    DEFAULT_MAX_SUBSCRIBERS, DEFAULT_TCP_BACKLOG, DEFAULT_TCP_PORT, DEFAULT_UDP_PORT,
};
use rovecomm_core::{Endpoint, EndpointError, ManifestEntry, StaticManifest};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::dispatch::RuntimeSettings;

/// File name used when no config path is given.
pub const DEFAULT_CONFIG_FILE: &str = "rovecomm.toml";

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A `subscribe` entry is not an `a.b.c.d:port` endpoint.
    #[error("invalid subscribe endpoint {value:?}: {source}")]
    InvalidEndpoint {
        value: String,
        #[source]
        source: EndpointError,
    },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level node configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    /// Peer UDP endpoints to subscribe to at startup, as `"a.b.c.d:port"`.
    /// The TCP subscription uses the same address on `network.tcp_port`.
    #[serde(default)]
    pub subscribe: Vec<String>,
    #[serde(default)]
    pub node: NodeSettings,
    #[serde(default)]
    pub network: NetworkConfig,
    /// Extra manifest entries, merged over the built-in table.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub manifest: Vec<ManifestEntry>,
}

/// General node behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSettings {
    /// `tracing` level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Ports and limits for both transports and the dispatch loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    #[serde(default = "default_udp_port")]
    pub udp_port: u16,
    #[serde(default = "default_tcp_port")]
    pub tcp_port: u16,
    /// Pending-connection backlog for the TCP listener.
    #[serde(default = "default_tcp_backlog")]
    pub tcp_backlog: i32,
    /// Size cap of the UDP subscriber set.
    #[serde(default = "default_max_subscribers")]
    pub max_subscribers: usize,
    /// Idle sleep of the dispatch loop, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Capacity of the queue of packets no callback claimed.
    #[serde(default = "default_max_queued_packets")]
    pub max_queued_packets: usize,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_udp_port() -> u16 {
    DEFAULT_UDP_PORT
}
fn default_tcp_port() -> u16 {
    DEFAULT_TCP_PORT
}
fn default_tcp_backlog() -> i32 {
    DEFAULT_TCP_BACKLOG
}
fn default_max_subscribers() -> usize {
    DEFAULT_MAX_SUBSCRIBERS
}
fn default_poll_interval_ms() -> u64 {
    10
}
fn default_max_queued_packets() -> usize {
    1024
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            udp_port: default_udp_port(),
            tcp_port: default_tcp_port(),
            tcp_backlog: default_tcp_backlog(),
            max_subscribers: default_max_subscribers(),
            poll_interval_ms: default_poll_interval_ms(),
            max_queued_packets: default_max_queued_packets(),
        }
    }
}

impl NodeConfig {
    /// Dispatch runtime settings derived from the `[network]` section.
    pub fn runtime_settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            udp_port: self.network.udp_port,
            tcp_port: self.network.tcp_port,
            poll_interval: Duration::from_millis(self.network.poll_interval_ms),
            max_queued_packets: self.network.max_queued_packets,
        }
    }

    /// The built-in manifest with the `[[manifest]]` entries applied on top.
    pub fn manifest(&self) -> StaticManifest {
        let mut manifest = StaticManifest::builtin();
        manifest.extend(self.manifest.iter().copied());
        manifest
    }

    /// Parses the `subscribe` list.
    ///
    /// An entry is either `a.b.c.d:port` or a board name such as `"Drive"`,
    /// which resolves to that board's address on `network.udp_port`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEndpoint`] for the first bad entry.
    pub fn subscriptions(&self) -> Result<Vec<Endpoint>, ConfigError> {
        self.subscribe
            .iter()
            .map(|value| match value.parse::<Endpoint>() {
                Ok(endpoint) => Ok(endpoint),
                Err(source) => board(value)
                    .map(|b| b.endpoint(self.network.udp_port))
                    .ok_or_else(|| ConfigError::InvalidEndpoint {
                        value: value.clone(),
                        source,
                    }),
            })
            .collect()
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Loads `NodeConfig` from `path`, returning `NodeConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<NodeConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(NodeConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &NodeConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
