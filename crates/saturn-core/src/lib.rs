//! Saturn L2 Core
//!
//! Process-wide configuration for the node, built once at startup and
//! shared read-only with the control plane and the retrieval client.

pub mod address;
pub mod config;

pub use address::{AddressError, FilAddress, Network, Protocol};
pub use config::{ConfigDocument, ConfigError, NodeConfig, DEFAULT_GATEWAY_URL, DEFAULT_PORT};
