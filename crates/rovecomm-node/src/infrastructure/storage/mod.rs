//! Storage infrastructure: the TOML node configuration file.

pub mod config;
