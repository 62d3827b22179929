//! Filecoin wallet address validation
//!
//! The node never signs or pays with the wallet address. It only has to
//! reject malformed values at startup and echo the accepted string back to
//! the dashboard, so the address keeps its original textual form.

use blake2::digest::consts::U4;
use blake2::{Blake2b, Digest};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of the blake2b checksum appended to non-ID payloads.
pub const CHECKSUM_LEN: usize = 4;

/// secp256k1 and actor payloads are 20 byte hashes.
pub const PAYLOAD_HASH_LEN: usize = 20;

/// BLS public keys.
pub const BLS_PUBLIC_KEY_LEN: usize = 48;

/// Upper bound for a delegated sub-address.
pub const MAX_SUBADDRESS_LEN: usize = 54;

/// Longest non-delegated address: prefix plus base32 of a BLS key and checksum.
pub const MAX_ADDRESS_STRING_LEN: usize = 2 + 84;

/// Longest delegated address: prefix, namespace, separator, base32 sub-address and checksum.
pub const MAX_DELEGATED_STRING_LEN: usize = 2 + 19 + 1 + 93;

type Blake2b32 = Blake2b<U4>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,

    #[error("invalid address length")]
    InvalidLength,

    #[error("unknown address network")]
    UnknownNetwork,

    #[error("unknown address protocol")]
    UnknownProtocol,

    #[error("invalid address payload")]
    InvalidPayload,

    #[error("invalid address checksum")]
    InvalidChecksum,
}

/// Network an address belongs to, taken from its first character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    /// `f` prefix
    Mainnet,
    /// `t` prefix
    Testnet,
}

impl Network {
    fn from_prefix(c: u8) -> Option<Self> {
        match c {
            b'f' => Some(Network::Mainnet),
            b't' => Some(Network::Testnet),
            _ => None,
        }
    }
}

/// Address protocol, taken from the second character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Numeric actor ID
    Id,
    /// Hash of a secp256k1 public key
    Secp256k1,
    /// Hash of actor constructor data
    Actor,
    /// BLS public key
    Bls,
    /// Namespaced sub-address (e.g. Ethereum accounts under `f410`)
    Delegated,
}

impl Protocol {
    fn from_digit(c: u8) -> Option<Self> {
        match c {
            b'0' => Some(Protocol::Id),
            b'1' => Some(Protocol::Secp256k1),
            b'2' => Some(Protocol::Actor),
            b'3' => Some(Protocol::Bls),
            b'4' => Some(Protocol::Delegated),
            _ => None,
        }
    }

    fn code(self) -> u8 {
        match self {
            Protocol::Id => 0,
            Protocol::Secp256k1 => 1,
            Protocol::Actor => 2,
            Protocol::Bls => 3,
            Protocol::Delegated => 4,
        }
    }
}

/// A validated Filecoin address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilAddress {
    raw: String,
    network: Network,
    protocol: Protocol,
}

impl FilAddress {
    /// Validate an address string
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        if s.is_empty() {
            return Err(AddressError::Empty);
        }

        let bytes = s.as_bytes();
        if bytes.len() < 3 {
            return Err(AddressError::InvalidLength);
        }

        let network = Network::from_prefix(bytes[0]).ok_or(AddressError::UnknownNetwork)?;
        let protocol = Protocol::from_digit(bytes[1]).ok_or(AddressError::UnknownProtocol)?;

        let max_len = match protocol {
            Protocol::Delegated => MAX_DELEGATED_STRING_LEN,
            _ => MAX_ADDRESS_STRING_LEN,
        };
        if bytes.len() > max_len {
            return Err(AddressError::InvalidLength);
        }

        let raw = &s[2..];
        match protocol {
            Protocol::Id => validate_id(raw)?,
            Protocol::Delegated => validate_delegated(raw)?,
            Protocol::Secp256k1 | Protocol::Actor | Protocol::Bls => {
                validate_hashed(protocol, raw)?
            }
        }

        Ok(Self {
            raw: s.to_string(),
            network,
            protocol,
        })
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for FilAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FilAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for FilAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

fn validate_id(raw: &str) -> Result<(), AddressError> {
    // u64::MAX has 20 digits
    if raw.len() > 20 {
        return Err(AddressError::InvalidLength);
    }
    parse_decimal(raw).map(|_| ())
}

fn validate_delegated(raw: &str) -> Result<(), AddressError> {
    let (namespace, subaddr) = raw.split_once('f').ok_or(AddressError::InvalidPayload)?;

    if namespace.len() > 19 {
        return Err(AddressError::InvalidLength);
    }
    let namespace = parse_decimal(namespace)?;
    if namespace > i64::MAX as u64 {
        return Err(AddressError::InvalidPayload);
    }

    let (payload, checksum) = decode_with_checksum(subaddr)?;
    if payload.len() > MAX_SUBADDRESS_LEN {
        return Err(AddressError::InvalidLength);
    }

    let mut buf = unsigned_varint::encode::u64_buffer();
    let namespace = unsigned_varint::encode::u64(namespace, &mut buf);
    let expected = Blake2b32::new()
        .chain_update([Protocol::Delegated.code()])
        .chain_update(namespace)
        .chain_update(&payload)
        .finalize();

    if expected.as_slice() != checksum.as_slice() {
        return Err(AddressError::InvalidChecksum);
    }
    Ok(())
}

fn validate_hashed(protocol: Protocol, raw: &str) -> Result<(), AddressError> {
    let (payload, checksum) = decode_with_checksum(raw)?;

    let expected_len = match protocol {
        Protocol::Bls => BLS_PUBLIC_KEY_LEN,
        _ => PAYLOAD_HASH_LEN,
    };
    if payload.len() != expected_len {
        return Err(AddressError::InvalidPayload);
    }

    let expected = Blake2b32::new()
        .chain_update([protocol.code()])
        .chain_update(&payload)
        .finalize();

    if expected.as_slice() != checksum.as_slice() {
        return Err(AddressError::InvalidChecksum);
    }
    Ok(())
}

fn parse_decimal(raw: &str) -> Result<u64, AddressError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AddressError::InvalidPayload);
    }
    raw.parse::<u64>().map_err(|_| AddressError::InvalidPayload)
}

/// Decode lowercase unpadded base32 and split off the trailing checksum
fn decode_with_checksum(raw: &str) -> Result<(Vec<u8>, [u8; CHECKSUM_LEN]), AddressError> {
    // Only the lowercase RFC 4648 alphabet is valid in an address
    if raw.is_empty()
        || !raw
            .bytes()
            .all(|b| b.is_ascii_lowercase() || (b'2'..=b'7').contains(&b))
    {
        return Err(AddressError::InvalidPayload);
    }

    let decoded = base32::decode(
        base32::Alphabet::Rfc4648 { padding: false },
        &raw.to_ascii_uppercase(),
    )
    .ok_or(AddressError::InvalidPayload)?;

    if decoded.len() < CHECKSUM_LEN {
        return Err(AddressError::InvalidLength);
    }

    let split = decoded.len() - CHECKSUM_LEN;
    let mut checksum = [0u8; CHECKSUM_LEN];
    checksum.copy_from_slice(&decoded[split..]);
    let mut payload = decoded;
    payload.truncate(split);

    Ok((payload, checksum))
}
