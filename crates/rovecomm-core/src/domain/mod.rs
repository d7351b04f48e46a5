//! Domain value types: network endpoints and the data-ID manifest.

pub mod endpoint;
pub mod manifest;
