//! Node configuration
//!
//! Raw values are collected by the binary (flags or environment) and turned
//! into a [`NodeConfig`] exactly once. Libraries only ever see the validated,
//! immutable result.

use crate::address::{AddressError, FilAddress};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Port the control plane listens on when none is configured
pub const DEFAULT_PORT: u16 = 5500;

/// Upstream gateway queried when none is configured
pub const DEFAULT_GATEWAY_URL: &str = "https://ipfs.io/ipfs";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid PORT value '{value}': {reason}")]
    InvalidPort { value: String, reason: String },

    #[error("No FIL_WALLET_ADDRESS provided. Please set the environment variable.")]
    MissingWalletAddress,

    #[error("Invalid FIL_WALLET_ADDRESS format: {0}")]
    InvalidWalletAddress(#[from] AddressError),
}

impl ConfigError {
    /// Process exit code for this failure. Each kind gets its own code.
    pub fn exit_code(&self) -> u8 {
        match self {
            ConfigError::InvalidPort { .. } => 1,
            ConfigError::MissingWalletAddress => 2,
            ConfigError::InvalidWalletAddress(_) => 3,
        }
    }
}

/// Immutable process-wide configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Control plane port (0 picks a free port)
    pub port: u16,
    /// Wallet address shown on the dashboard
    pub wallet: FilAddress,
    /// Base URL of the upstream gateway
    pub gateway_url: String,
    /// Serve the dashboard from this directory instead of the bundled copy
    pub webui_dir: Option<PathBuf>,
}

impl NodeConfig {
    /// Build the configuration from raw, unvalidated values.
    ///
    /// Missing values fall back to their defaults, except the wallet address
    /// which is required.
    pub fn from_raw(
        port: Option<&str>,
        wallet: Option<&str>,
        gateway_url: Option<&str>,
        webui_dir: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let port = parse_port(port)?;

        let wallet = match wallet {
            None | Some("") => return Err(ConfigError::MissingWalletAddress),
            Some(w) => FilAddress::parse(w)?,
        };

        Ok(Self {
            port,
            wallet,
            gateway_url: resolve_gateway_url(gateway_url),
            webui_dir,
        })
    }

    /// The JSON document served on `/config`
    pub fn document(&self) -> ConfigDocument {
        ConfigDocument {
            fil_wallet_address: self.wallet.to_string(),
        }
    }
}

/// Public view of the configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigDocument {
    pub fil_wallet_address: String,
}

/// Parse a port, treating an absent or empty value as the default
pub fn parse_port(raw: Option<&str>) -> Result<u16, ConfigError> {
    match raw {
        None | Some("") => Ok(DEFAULT_PORT),
        Some(value) => value.parse::<u16>().map_err(|e| ConfigError::InvalidPort {
            value: value.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Gateway base URL, or the default when absent or empty
pub fn resolve_gateway_url(raw: Option<&str>) -> String {
    match raw {
        None | Some("") => DEFAULT_GATEWAY_URL.to_string(),
        Some(url) => url.to_string(),
    }
}
