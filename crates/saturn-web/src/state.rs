//! Application state for the control plane

use bytes::Bytes;
use saturn_core::NodeConfig;
use std::sync::Arc;

use crate::assets::AssetStore;
use crate::Result;

/// Shared, read-only state handed to every handler
#[derive(Clone)]
pub struct AppState {
    /// Node configuration
    pub config: Arc<NodeConfig>,
    /// `/config` body, serialized once at startup
    config_json: Bytes,
    /// Dashboard assets
    pub assets: Arc<dyn AssetStore>,
}

impl AppState {
    pub fn new(config: Arc<NodeConfig>, assets: Arc<dyn AssetStore>) -> Result<Self> {
        let config_json = Bytes::from(serde_json::to_vec(&config.document())?);

        Ok(Self {
            config,
            config_json,
            assets,
        })
    }

    pub fn config_json(&self) -> Bytes {
        self.config_json.clone()
    }

    /// Dashboard path the bare `/webui` redirects to
    pub fn address_page(&self) -> String {
        format!("/webui/address/{}", self.config.wallet)
    }
}
