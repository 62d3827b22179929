//! Saturn L2 content retrieval
//!
//! Fetches content by CID from an upstream HTTP gateway and hands it back
//! as a stream. Upstream failures come back as typed errors, never as an
//! empty or partial success.

pub mod address;
pub mod client;
pub mod stream;

pub use address::ContentAddress;
pub use client::{ContentFetcher, GatewayFetchClient};
pub use stream::{is_cancellation, ContentStream};

pub use reqwest::StatusCode;
pub use tokio_util::sync::CancellationToken;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Retrieval of {cid} failed: upstream responded {status}")]
    RetrievalFailed { cid: String, status: StatusCode },

    #[error("Invalid CID: {0}")]
    InvalidCid(String),

    #[error("Invalid gateway URL: {0}")]
    InvalidGatewayUrl(String),
}

/// Failures that happen before the upstream produced a response
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("{0}")]
    Request(#[from] reqwest::Error),

    #[error("request cancelled")]
    Cancelled,
}

impl Error {
    /// Status observed on the upstream, if it answered at all
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::RetrievalFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Transport(TransportError::Cancelled))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
