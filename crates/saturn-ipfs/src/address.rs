//! Content addresses

use cid::Cid;
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// A CID naming a piece of content.
///
/// Parsing happens on the caller's side; the retrieval client only ever
/// sees addresses that already decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentAddress(Cid);

impl ContentAddress {
    pub fn new(cid: Cid) -> Self {
        Self(cid)
    }

    /// Decode a CID string (v0 base58btc or any multibase v1)
    pub fn parse(s: &str) -> Result<Self> {
        Cid::try_from(s)
            .map(Self)
            .map_err(|e| Error::InvalidCid(format!("{}: {}", s, e)))
    }

    pub fn cid(&self) -> &Cid {
        &self.0
    }

    pub fn codec(&self) -> u64 {
        self.0.codec()
    }

    pub fn is_v0(&self) -> bool {
        self.0.version() == cid::Version::V0
    }
}

impl From<Cid> for ContentAddress {
    fn from(cid: Cid) -> Self {
        Self(cid)
    }
}

impl FromStr for ContentAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
