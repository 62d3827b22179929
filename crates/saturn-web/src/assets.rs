//! Dashboard asset stores

use async_trait::async_trait;
use bytes::Bytes;
use rust_embed::RustEmbed;
use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};

use crate::{Error, Result};

/// Entry served when a dashboard path has no matching asset
pub const INDEX_HTML: &str = "index.html";

/// A read-only tree of dashboard files, addressed by `/`-separated relative paths
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Whether `path` names a file in the store
    async fn exists(&self, path: &str) -> bool;

    /// Read the file at `path`
    async fn read(&self, path: &str) -> Result<Bytes>;
}

#[derive(RustEmbed)]
#[folder = "webui/"]
struct Bundle;

/// The dashboard compiled into the binary
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedAssets;

#[async_trait]
impl AssetStore for EmbeddedAssets {
    async fn exists(&self, path: &str) -> bool {
        Bundle::get(path).is_some()
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        let file = Bundle::get(path).ok_or_else(|| Error::NotFound(path.to_string()))?;
        Ok(match file.data {
            Cow::Borrowed(data) => Bytes::from_static(data),
            Cow::Owned(data) => Bytes::from(data),
        })
    }
}

/// A dashboard served from a directory on disk
#[derive(Debug, Clone)]
pub struct DirAssets {
    root: PathBuf,
}

impl DirAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a request path below the root, refusing anything that could escape it
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(Error::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl AssetStore for DirAssets {
    async fn exists(&self, path: &str) -> bool {
        let Ok(full) = self.resolve(path) else {
            return false;
        };
        tokio::fs::metadata(&full)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        let full = self.resolve(path)?;
        match tokio::fs::read(&full).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(path.to_string()))
            }
            Err(source) => Err(Error::Read {
                path: path.to_string(),
                source,
            }),
        }
    }
}
